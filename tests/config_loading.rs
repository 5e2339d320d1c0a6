use std::io::Write;
use std::time::Duration;

use genmedia_core::config::AppConfig;
use genmedia_core::error::GenmediaError;

#[test]
fn test_load_full_config_from_file() {
    let toml_content = r#"
[provider]
project_id = "acme-media"
location = "europe-west4"
video_model = "veo-3.1-fast-generate-preview"
access_token = "ya29.test"
request_timeout_secs = 60

[retry]
max_attempts = 3
initial_delay_ms = 1000
max_delay_ms = 8000

[jobs]
poll_interval_ms = 2500
max_wait_secs = 120

[storage]
data_dir = "/tmp/genmedia-test"
public_base_url = "https://cdn.example.com/media"

[resolver]
max_concurrent_lookups = 16
reference_keys = ["imageRef", "maskRef"]

[gateway]
bind = "0.0.0.0:9999"

[[gateway.api_keys]]
key = "gm_ci_key"
user_id = "ci"
email = "ci@example.com"
"#;

    let mut tmp = tempfile::NamedTempFile::new().expect("create temp file");
    tmp.write_all(toml_content.as_bytes()).expect("write toml");

    let config = AppConfig::load(tmp.path()).expect("load config");

    assert_eq!(config.provider.project_id, "acme-media");
    assert_eq!(
        config.provider.endpoint(),
        "https://europe-west4-aiplatform.googleapis.com"
    );
    assert_eq!(config.provider.video_model, "veo-3.1-fast-generate-preview");
    assert_eq!(config.provider.access_token, Some("ya29.test".to_string()));

    assert_eq!(config.retry.max_attempts, 3);
    assert_eq!(config.jobs.poll_interval(), Duration::from_millis(2500));
    assert_eq!(config.jobs.max_wait(), Duration::from_secs(120));

    assert_eq!(
        config.storage.data_dir(),
        std::path::PathBuf::from("/tmp/genmedia-test")
    );
    assert_eq!(config.resolver.max_concurrent_lookups, 16);
    assert_eq!(config.resolver.reference_keys, vec!["imageRef", "maskRef"]);

    assert_eq!(config.gateway.bind, "0.0.0.0:9999");
    assert_eq!(config.gateway.api_keys.len(), 1);
    assert_eq!(config.gateway.api_keys[0].user_id, "ci");
}

#[test]
fn test_env_var_expansion_in_config() {
    std::env::set_var("GENMEDIA_TEST_ACCESS_TOKEN", "expanded-token");

    let toml_content = r#"
[provider]
project_id = "acme-media"
access_token = "${GENMEDIA_TEST_ACCESS_TOKEN}"
"#;

    let mut tmp = tempfile::NamedTempFile::new().expect("create temp file");
    tmp.write_all(toml_content.as_bytes()).expect("write toml");

    let config = AppConfig::load(tmp.path()).expect("load config");
    assert_eq!(config.provider.access_token, Some("expanded-token".to_string()));

    std::env::remove_var("GENMEDIA_TEST_ACCESS_TOKEN");
}

#[test]
fn test_minimal_config_uses_defaults() {
    let toml_content = r#"
[provider]
project_id = "acme-media"
"#;

    let mut tmp = tempfile::NamedTempFile::new().expect("create temp file");
    tmp.write_all(toml_content.as_bytes()).expect("write toml");

    let config = AppConfig::load(tmp.path()).expect("load config");

    assert_eq!(config.provider.location, "us-central1");
    assert!(config.provider.access_token.is_none());

    // Backoff: 5s doubling to a 60s cap, five attempts.
    assert_eq!(config.retry.max_attempts, 5);
    assert_eq!(config.retry.initial_delay_ms, 5_000);
    assert_eq!(config.retry.max_delay_ms, 60_000);

    assert_eq!(config.jobs.poll_interval(), Duration::from_secs(10));
    assert_eq!(config.jobs.max_wait(), Duration::from_secs(600));
    assert_eq!(config.resolver.max_concurrent_lookups, 8);
    assert_eq!(
        config.resolver.reference_keys,
        vec!["assetRef", "imageRef", "videoRef"]
    );
    assert_eq!(config.gateway.bind, "127.0.0.1:8420");
    assert!(config.gateway.api_keys.is_empty());
}

#[test]
fn test_missing_provider_section_is_error() {
    let mut tmp = tempfile::NamedTempFile::new().expect("create temp file");
    tmp.write_all(b"[jobs]\nmax_wait_secs = 5\n").expect("write toml");

    let err = AppConfig::load(tmp.path()).unwrap_err();
    assert!(matches!(err, GenmediaError::Config(_)));
}

#[test]
fn test_missing_file_is_config_not_found() {
    let dir = tempfile::tempdir().expect("create temp dir");
    let err = AppConfig::load(&dir.path().join("absent.toml")).unwrap_err();
    assert!(matches!(err, GenmediaError::ConfigNotFound(_)));
}
