use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{GenmediaError, Result};

/// Top-level genmedia configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub provider: ProviderConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub jobs: JobsConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub resolver: ResolverConfig,
    #[serde(default)]
    pub gateway: GatewayConfig,
}

/// Remote generation provider (Vertex AI).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub project_id: String,
    #[serde(default = "default_location")]
    pub location: String,
    #[serde(default = "default_video_model")]
    pub video_model: String,
    #[serde(default = "default_image_model")]
    pub image_model: String,
    #[serde(default = "default_upscale_model")]
    pub upscale_model: String,
    /// OAuth bearer token for the provider API. Usually `${VERTEX_ACCESS_TOKEN}`.
    #[serde(default)]
    pub access_token: Option<String>,
    /// Override for the regional endpoint (tests, proxies).
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

impl ProviderConfig {
    /// Base URL of the regional Vertex endpoint.
    pub fn endpoint(&self) -> String {
        match &self.base_url {
            Some(url) => url.trim_end_matches('/').to_string(),
            None => format!("https://{}-aiplatform.googleapis.com", self.location),
        }
    }
}

fn default_location() -> String { "us-central1".to_string() }
fn default_video_model() -> String { "veo-3.1-generate-preview".to_string() }
fn default_image_model() -> String { "gemini-3-pro-image-preview".to_string() }
fn default_upscale_model() -> String { "imagen-4.0-upscale-preview".to_string() }
fn default_request_timeout() -> u64 { 300 }

/// Backoff settings shared by every retried remote call.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RetryConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_initial_delay")]
    pub initial_delay_ms: u64,
    #[serde(default = "default_max_delay")]
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_delay_ms: default_initial_delay(),
            max_delay_ms: default_max_delay(),
        }
    }
}

fn default_max_attempts() -> u32 { 5 }
fn default_initial_delay() -> u64 { 5_000 }
fn default_max_delay() -> u64 { 60_000 }

/// Polling cadence for `await_completion`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobsConfig {
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_max_wait")]
    pub max_wait_secs: u64,
}

impl JobsConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn max_wait(&self) -> Duration {
        Duration::from_secs(self.max_wait_secs)
    }
}

impl Default for JobsConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval(),
            max_wait_secs: default_max_wait(),
        }
    }
}

fn default_poll_interval() -> u64 { 10_000 }
fn default_max_wait() -> u64 { 600 }

/// Local artifact and workflow storage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
    /// Prefix joined with a blob path to form a locator.
    #[serde(default = "default_public_base_url")]
    pub public_base_url: String,
}

impl StorageConfig {
    /// Resolve the data directory (expand ~).
    pub fn data_dir(&self) -> PathBuf {
        expand_home(&self.data_dir)
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            public_base_url: default_public_base_url(),
        }
    }
}

fn default_data_dir() -> String { "~/.genmedia/data".to_string() }
fn default_public_base_url() -> String { "http://127.0.0.1:8420/files".to_string() }

/// Graph reference resolution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolverConfig {
    #[serde(default = "default_max_concurrent_lookups")]
    pub max_concurrent_lookups: usize,
    /// Top-level node data keys holding artifact ids.
    #[serde(default = "default_reference_keys")]
    pub reference_keys: Vec<String>,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            max_concurrent_lookups: default_max_concurrent_lookups(),
            reference_keys: default_reference_keys(),
        }
    }
}

fn default_max_concurrent_lookups() -> usize { 8 }
fn default_reference_keys() -> Vec<String> {
    vec!["assetRef".into(), "imageRef".into(), "videoRef".into()]
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
    #[serde(default)]
    pub api_keys: Vec<ApiKeyConfig>,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            api_keys: vec![],
        }
    }
}

fn default_bind() -> String { "127.0.0.1:8420".to_string() }

/// A bearer key and the caller identity it stands for.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ApiKeyConfig {
    pub key: String,
    pub user_id: String,
    #[serde(default)]
    pub email: String,
}

impl AppConfig {
    /// Load config from a TOML file, with env var expansion.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|_| GenmediaError::ConfigNotFound(path.display().to_string()))?;

        // Expand ${ENV_VAR} references
        let expanded = expand_env_vars(&content);

        toml::from_str(&expanded).map_err(|e| GenmediaError::Config(e.to_string()))
    }

    /// Default config location: `~/.genmedia/config.toml`.
    pub fn default_path() -> PathBuf {
        expand_home("~/.genmedia/config.toml")
    }
}

fn expand_home(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs_home() {
            return home.join(rest);
        }
    }
    PathBuf::from(path)
}

/// Expand `${ENV_VAR}` patterns in a string.
fn expand_env_vars(input: &str) -> String {
    let mut result = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(c) = chars.next() {
        if c == '$' && chars.peek() == Some(&'{') {
            chars.next(); // consume '{'
            let mut var_name = String::new();
            for c in chars.by_ref() {
                if c == '}' {
                    break;
                }
                var_name.push(c);
            }
            match std::env::var(&var_name) {
                Ok(val) => result.push_str(&val),
                // Keep original if env var not set
                Err(_) => result.push_str(&format!("${{{}}}", var_name)),
            }
        } else {
            result.push(c);
        }
    }
    result
}

fn dirs_home() -> Option<PathBuf> {
    std::env::var("HOME").ok().map(PathBuf::from)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expand_env_vars() {
        std::env::set_var("TEST_GENMEDIA_VAR", "hello");
        let result = expand_env_vars("key = \"${TEST_GENMEDIA_VAR}\"");
        assert_eq!(result, "key = \"hello\"");
        std::env::remove_var("TEST_GENMEDIA_VAR");
    }

    #[test]
    fn test_expand_env_vars_missing() {
        let result = expand_env_vars("key = \"${NONEXISTENT_GENMEDIA_VAR}\"");
        assert_eq!(result, "key = \"${NONEXISTENT_GENMEDIA_VAR}\"");
    }

    #[test]
    fn test_defaults_from_minimal_toml() {
        let toml_str = r#"
[provider]
project_id = "studio"
"#;
        let config: AppConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.provider.location, "us-central1");
        assert_eq!(config.provider.video_model, "veo-3.1-generate-preview");
        assert_eq!(config.provider.image_model, "gemini-3-pro-image-preview");
        assert_eq!(config.provider.upscale_model, "imagen-4.0-upscale-preview");
        assert_eq!(config.retry, RetryConfig::default());
        assert_eq!(config.retry.max_attempts, 5);
        assert_eq!(config.retry.initial_delay_ms, 5_000);
        assert_eq!(config.retry.max_delay_ms, 60_000);
        assert_eq!(config.resolver.reference_keys, vec!["assetRef", "imageRef", "videoRef"]);
        assert_eq!(config.gateway.bind, "127.0.0.1:8420");
        assert!(config.gateway.api_keys.is_empty());
    }

    #[test]
    fn test_endpoint_override() {
        let toml_str = r#"
[provider]
project_id = "studio"
location = "europe-west4"
"#;
        let mut config: AppConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(
            config.provider.endpoint(),
            "https://europe-west4-aiplatform.googleapis.com"
        );

        config.provider.base_url = Some("http://localhost:9000/".into());
        assert_eq!(config.provider.endpoint(), "http://localhost:9000");
    }
}
