use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{GenmediaError, Result};

/// Identifier of a stored artifact.
#[derive(Debug, Clone, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ArtifactId(pub String);

impl ArtifactId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for ArtifactId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<&str> for ArtifactId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl std::fmt::Display for ArtifactId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// What an artifact contains.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactKind {
    Image,
    Video,
}

impl ArtifactKind {
    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "image" => Ok(Self::Image),
            "video" => Ok(Self::Video),
            other => Err(GenmediaError::InvalidInput(format!(
                "asset_type must be 'image' or 'video', got '{}'",
                other
            ))),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Image => "image",
            Self::Video => "video",
        }
    }

    /// Pick a MIME type and file extension, honouring an explicit MIME hint.
    pub fn mime_and_extension(self, hint: Option<&str>) -> (String, &'static str) {
        match self {
            Self::Image => match hint {
                Some(m) if !m.contains("png") => (m.to_string(), "jpg"),
                Some(m) => (m.to_string(), "png"),
                None => ("image/png".to_string(), "png"),
            },
            Self::Video => (hint.unwrap_or("video/mp4").to_string(), "mp4"),
        }
    }
}

impl std::fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How an artifact entered the library.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactSource {
    Generated,
    Upload,
}

impl ArtifactSource {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Generated => "generated",
            Self::Upload => "upload",
        }
    }
}

/// Input to `ArtifactStore::put`.
#[derive(Debug, Clone)]
pub struct NewArtifact {
    pub bytes: Vec<u8>,
    pub kind: ArtifactKind,
    pub owner_id: String,
    pub prompt: Option<String>,
    pub mime_type: Option<String>,
    pub source: ArtifactSource,
    /// Provider job that produced the artifact. A store writes at most one
    /// artifact per job id.
    pub source_job: Option<String>,
}

/// Metadata of a stored artifact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactRecord {
    pub id: ArtifactId,
    pub owner_id: String,
    #[serde(rename = "asset_type")]
    pub kind: ArtifactKind,
    pub mime_type: String,
    #[serde(skip)]
    pub blob_path: String,
    #[serde(rename = "url")]
    pub locator: String,
    pub prompt: Option<String>,
    pub source: ArtifactSource,
    pub created_at: DateTime<Utc>,
}

/// Outcome of resolving one artifact reference. Absence is a value, not an error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedLocator {
    pub exists: bool,
    pub locator: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<ArtifactKind>,
}

impl ResolvedLocator {
    pub fn found(record: &ArtifactRecord) -> Self {
        Self {
            exists: true,
            locator: Some(record.locator.clone()),
            mime_type: Some(record.mime_type.clone()),
            kind: Some(record.kind),
        }
    }

    pub fn missing() -> Self {
        Self {
            exists: false,
            locator: None,
            mime_type: None,
            kind: None,
        }
    }
}

// ── Generation jobs ──────────────────────────────────────────────

/// A media generation request as submitted by a caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationRequest {
    pub prompt: String,
    #[serde(default = "default_kind")]
    pub kind: ArtifactKind,
    #[serde(default)]
    pub first_frame: Option<String>,
    #[serde(default)]
    pub last_frame: Option<String>,
    #[serde(default)]
    pub reference_images: Vec<String>,
    #[serde(default = "default_aspect_ratio")]
    pub aspect_ratio: String,
    #[serde(default = "default_duration")]
    pub duration_seconds: u32,
    #[serde(default = "default_generate_audio")]
    pub generate_audio: bool,
    #[serde(default)]
    pub seed: Option<u64>,
}

fn default_kind() -> ArtifactKind { ArtifactKind::Video }
fn default_aspect_ratio() -> String { "16:9".to_string() }
fn default_duration() -> u32 { 8 }
fn default_generate_audio() -> bool { true }

impl GenerationRequest {
    pub fn video(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            kind: ArtifactKind::Video,
            first_frame: None,
            last_frame: None,
            reference_images: vec![],
            aspect_ratio: default_aspect_ratio(),
            duration_seconds: default_duration(),
            generate_audio: default_generate_audio(),
            seed: None,
        }
    }

    /// Long-running jobs only produce video; images go through
    /// [`ImageRequest`].
    pub fn validate(&self) -> Result<()> {
        if self.prompt.trim().is_empty() {
            return Err(GenmediaError::InvalidInput("prompt is required".into()));
        }
        if self.kind != ArtifactKind::Video {
            return Err(GenmediaError::InvalidInput(format!(
                "generation jobs produce video, got kind '{}'; use image generation instead",
                self.kind
            )));
        }
        Ok(())
    }
}

// ── Images ───────────────────────────────────────────────────────

/// A synchronous image generation request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageRequest {
    pub prompt: String,
    /// Base64 images (data URLs allowed) used as visual ingredients.
    #[serde(default)]
    pub reference_images: Vec<String>,
    #[serde(default = "default_image_aspect_ratio")]
    pub aspect_ratio: String,
    #[serde(default = "default_image_resolution")]
    pub resolution: String,
}

fn default_image_aspect_ratio() -> String { "1:1".to_string() }
fn default_image_resolution() -> String { "1K".to_string() }

impl ImageRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            reference_images: vec![],
            aspect_ratio: default_image_aspect_ratio(),
            resolution: default_image_resolution(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.prompt.trim().is_empty() {
            return Err(GenmediaError::InvalidInput("prompt is required".into()));
        }
        Ok(())
    }
}

/// One image returned by the provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneratedImage {
    pub data_base64: String,
    pub mime_type: String,
    /// Library id, when the best-effort save succeeded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stored: Option<ArtifactId>,
}

/// Upscale an existing image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpscaleRequest {
    pub image: String,
    #[serde(default = "default_upscale_factor")]
    pub upscale_factor: String,
    #[serde(default = "default_output_mime_type")]
    pub output_mime_type: String,
}

fn default_upscale_factor() -> String { "x2".to_string() }
fn default_output_mime_type() -> String { "image/png".to_string() }

impl UpscaleRequest {
    pub fn new(image: impl Into<String>) -> Self {
        Self {
            image: image.into(),
            upscale_factor: default_upscale_factor(),
            output_mime_type: default_output_mime_type(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.image.trim().is_empty() {
            return Err(GenmediaError::InvalidInput("image is required".into()));
        }
        if !matches!(self.upscale_factor.as_str(), "x2" | "x3" | "x4") {
            return Err(GenmediaError::InvalidInput(format!(
                "upscale_factor must be x2, x3 or x4, got '{}'",
                self.upscale_factor
            )));
        }
        Ok(())
    }
}

/// Result of an upscale call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpscaledImage {
    pub data_base64: String,
    pub mime_type: String,
}

/// Provider acknowledgement of a submission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmittedJob {
    pub job_id: String,
}

/// Normalised provider answer to a status check.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProviderPoll {
    pub done: bool,
    #[serde(default)]
    pub result: Option<serde_json::Value>,
    #[serde(default)]
    pub error: Option<serde_json::Value>,
    #[serde(default)]
    pub progress_percent: Option<u8>,
}

/// Lifecycle of a job as seen by the orchestrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Submitted,
    Polling,
    Complete,
    Failed,
}

impl JobState {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobState::Complete | JobState::Failed)
    }
}

/// Where the generated bytes live.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ArtifactPayload {
    /// Base64-encoded bytes returned inline by the provider.
    Inline { data_base64: String, mime_type: String },
    /// The provider wrote the result to its own storage.
    Remote { uri: String },
}

/// The artifact a completed job produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneratedArtifact {
    pub payload: ArtifactPayload,
    /// Library id, when persistence succeeded.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stored: Option<ArtifactId>,
}

/// Status reported to callers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum JobStatus {
    Processing { progress: u8 },
    Complete(GeneratedArtifact),
    Failed { reason: String },
    /// `await_completion` gave up waiting; the job may still finish.
    TimedOut { progress: u8 },
    /// `await_completion` was cancelled by the caller.
    Cancelled,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Complete(_) | JobStatus::Failed { .. })
    }

    pub fn progress(&self) -> u8 {
        match self {
            JobStatus::Processing { progress } | JobStatus::TimedOut { progress } => *progress,
            JobStatus::Complete(_) => 100,
            _ => 0,
        }
    }
}

/// An authenticated caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Caller {
    pub user_id: String,
    pub email: String,
}

impl Caller {
    pub fn new(user_id: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            email: email.into(),
        }
    }
}
