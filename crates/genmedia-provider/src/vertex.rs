use std::time::Duration;

use futures::future::BoxFuture;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use genmedia_core::config::ProviderConfig;
use genmedia_core::error::{classify_provider_error, GenmediaError, Result};
use genmedia_core::media::{clean_base64, decode_base64, sniff_image_mime};
use genmedia_core::traits::GenerationProvider;
use genmedia_core::types::{
    GeneratedImage, GenerationRequest, ImageRequest, ProviderPoll, SubmittedJob, UpscaleRequest,
    UpscaledImage,
};

/// At most this many style references are forwarded per request.
const MAX_REFERENCE_IMAGES: usize = 3;

/// Reference images smaller than this are not real images.
const MIN_REFERENCE_BYTES: usize = 100;

/// Vertex AI long-running prediction client (Veo video models).
pub struct VertexClient {
    http: Client,
    config: ProviderConfig,
}

impl VertexClient {
    pub fn new(config: ProviderConfig) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| GenmediaError::Config(format!("HTTP client: {}", e)))?;
        Ok(Self { http, config })
    }

    fn model_url(&self, model: &str, method: &str) -> String {
        format!(
            "{}/v1/projects/{}/locations/{}/publishers/google/models/{}:{}",
            self.config.endpoint(),
            self.config.project_id,
            self.config.location,
            model,
            method
        )
    }

    fn token(&self) -> Result<&str> {
        self.config
            .access_token
            .as_deref()
            .filter(|t| !t.trim().is_empty() && !t.starts_with("${"))
            .ok_or_else(|| GenmediaError::Config("Vertex: access_token is required".into()))
    }

    async fn post_json<B: Serialize, R: for<'de> Deserialize<'de>>(
        &self,
        url: &str,
        body: &B,
    ) -> Result<R> {
        let token = self.token()?;
        let response = self
            .http
            .post(url)
            .bearer_auth(token)
            .json(body)
            .send()
            .await
            .map_err(|e| GenmediaError::RemoteUnavailable(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "unknown".to_string());
            return Err(error_for_status(status, &body));
        }

        response
            .json::<R>()
            .await
            .map_err(|e| GenmediaError::Provider(format!("unreadable response: {}", e)))
    }
}

fn error_for_status(status: StatusCode, body: &str) -> GenmediaError {
    let message = if status == StatusCode::TOO_MANY_REQUESTS {
        format!("429 RESOURCE_EXHAUSTED: {}", body)
    } else {
        format!("API error: {} - {}", status.as_u16(), body)
    };
    classify_provider_error(Some(status.as_u16()), message)
}

/// Operation names look like `projects/p/locations/l/publishers/google/models/m/operations/id`.
/// Status checks must go to the model that issued the operation.
fn model_of_operation(operation: &str) -> Option<&str> {
    let (_, rest) = operation.split_once("/models/")?;
    rest.split('/').next().filter(|m| !m.is_empty())
}

// ── Request types ────────────────────────────────────────────────

#[derive(Serialize)]
struct PredictRequest {
    instances: Vec<VideoInstance>,
    parameters: VideoParameters,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct VideoInstance {
    prompt: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    image: Option<InlineImage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    last_frame: Option<InlineImage>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    reference_images: Vec<ReferenceImage>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct InlineImage {
    bytes_base64_encoded: String,
    mime_type: String,
}

impl InlineImage {
    fn from_data(data: &str) -> Self {
        Self {
            mime_type: sniff_mime(data),
            bytes_base64_encoded: clean_base64(data),
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ReferenceImage {
    image: InlineImage,
    reference_type: &'static str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct VideoParameters {
    aspect_ratio: String,
    sample_count: u32,
    duration_seconds: u32,
    generate_audio: bool,
    resolution: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    seed: Option<u64>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct FetchOperationRequest<'a> {
    operation_name: &'a str,
}

// ── Response types ───────────────────────────────────────────────

#[derive(Deserialize)]
struct OperationHandle {
    name: String,
}

#[derive(Deserialize, Default)]
struct OperationState {
    #[serde(default)]
    done: bool,
    #[serde(default)]
    response: Option<serde_json::Value>,
    #[serde(default)]
    error: Option<serde_json::Value>,
    #[serde(default)]
    metadata: Option<OperationMetadata>,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct OperationMetadata {
    #[serde(default)]
    progress_percent: Option<f64>,
}

// ── Image types (generateContent / predict) ──────────────────────

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ContentRequest {
    contents: Vec<Content>,
    generation_config: ImageGenerationConfig,
}

#[derive(Serialize, Deserialize, Default)]
struct Content {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct Part {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    inline_data: Option<Blob>,
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Blob {
    mime_type: String,
    data: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ImageGenerationConfig {
    response_modalities: Vec<&'static str>,
    image_config: ImageConfig,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ImageConfig {
    aspect_ratio: String,
    image_size: String,
}

#[derive(Deserialize, Default)]
struct ContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize, Default)]
struct Candidate {
    #[serde(default)]
    content: Content,
}

#[derive(Serialize)]
struct UpscalePredictRequest {
    instances: Vec<UpscaleInstance>,
    parameters: UpscaleParameters,
}

#[derive(Serialize)]
struct UpscaleInstance {
    prompt: &'static str,
    image: UpscaleImage,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct UpscaleImage {
    bytes_base64_encoded: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct UpscaleParameters {
    mode: &'static str,
    upscale_config: UpscaleConfig,
    output_options: OutputOptions,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct UpscaleConfig {
    upscale_factor: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct OutputOptions {
    mime_type: String,
}

#[derive(Deserialize, Default)]
struct PredictResponse {
    #[serde(default)]
    predictions: Vec<Prediction>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Prediction {
    #[serde(default)]
    bytes_base64_encoded: Option<String>,
    #[serde(default)]
    mime_type: Option<String>,
}

/// MIME type from a `data:` URL, defaulting to PNG for bare base64.
fn sniff_mime(data: &str) -> String {
    data.strip_prefix("data:")
        .and_then(|rest| rest.split_once(';'))
        .map(|(mime, _)| mime.to_string())
        .filter(|mime| !mime.is_empty())
        .unwrap_or_else(|| "image/png".to_string())
}

fn build_request(request: &GenerationRequest) -> PredictRequest {
    let instance = VideoInstance {
        prompt: request.prompt.clone(),
        image: request.first_frame.as_deref().map(InlineImage::from_data),
        last_frame: request.last_frame.as_deref().map(InlineImage::from_data),
        reference_images: request
            .reference_images
            .iter()
            .take(MAX_REFERENCE_IMAGES)
            .map(|data| ReferenceImage {
                image: InlineImage::from_data(data),
                reference_type: "style",
            })
            .collect(),
    };

    PredictRequest {
        instances: vec![instance],
        parameters: VideoParameters {
            aspect_ratio: request.aspect_ratio.clone(),
            sample_count: 1,
            duration_seconds: request.duration_seconds,
            generate_audio: request.generate_audio,
            resolution: "1080p",
            seed: request.seed,
        },
    }
}

/// Usable reference images as inline parts. Undecodable, tiny, or
/// non-PNG/JPEG inputs are skipped with a warning.
fn reference_parts(references: &[String]) -> Vec<Part> {
    references
        .iter()
        .enumerate()
        .filter_map(|(index, data)| {
            let bytes = match decode_base64(data) {
                Ok(bytes) => bytes,
                Err(e) => {
                    warn!(index, error = %e, "Skipping undecodable reference image");
                    return None;
                }
            };
            if bytes.len() < MIN_REFERENCE_BYTES {
                warn!(index, size = bytes.len(), "Skipping reference image: too small");
                return None;
            }
            let Some(mime_type) = sniff_image_mime(&bytes) else {
                warn!(index, "Skipping reference image: not PNG or JPEG");
                return None;
            };
            Some(Part {
                text: None,
                inline_data: Some(Blob {
                    mime_type: mime_type.to_string(),
                    data: clean_base64(data),
                }),
            })
        })
        .collect()
}

fn build_image_request(request: &ImageRequest) -> ContentRequest {
    let mut parts = reference_parts(&request.reference_images);
    let prompt = if parts.is_empty() {
        request.prompt.clone()
    } else {
        format!(
            "Use the provided reference image(s) as visual ingredients: carry over their \
             subjects, objects, colors, textures and style.\n\nGeneration request: {}",
            request.prompt
        )
    };
    parts.push(Part {
        text: Some(prompt),
        inline_data: None,
    });

    ContentRequest {
        contents: vec![Content {
            role: Some("user".to_string()),
            parts,
        }],
        generation_config: ImageGenerationConfig {
            response_modalities: vec!["TEXT", "IMAGE"],
            image_config: ImageConfig {
                aspect_ratio: request.aspect_ratio.clone(),
                image_size: request.resolution.clone(),
            },
        },
    }
}

fn build_upscale_request(request: &UpscaleRequest) -> UpscalePredictRequest {
    UpscalePredictRequest {
        instances: vec![UpscaleInstance {
            prompt: "Upscale the image",
            image: UpscaleImage {
                bytes_base64_encoded: clean_base64(&request.image),
            },
        }],
        parameters: UpscaleParameters {
            mode: "upscale",
            upscale_config: UpscaleConfig {
                upscale_factor: request.upscale_factor.clone(),
            },
            output_options: OutputOptions {
                mime_type: request.output_mime_type.clone(),
            },
        },
    }
}

impl GenerationProvider for VertexClient {
    fn submit(&self, request: &GenerationRequest) -> BoxFuture<'_, Result<SubmittedJob>> {
        let request = request.clone();
        Box::pin(async move {
            request.validate()?;
            let url = self.model_url(&self.config.video_model, "predictLongRunning");
            let body = build_request(&request);

            let handle: OperationHandle = self.post_json(&url, &body).await?;
            debug!(operation = %handle.name, "Video generation submitted");
            Ok(SubmittedJob { job_id: handle.name })
        })
    }

    fn poll(&self, job_id: &str) -> BoxFuture<'_, Result<ProviderPoll>> {
        let job_id = job_id.to_string();
        Box::pin(async move {
            let model = model_of_operation(&job_id).unwrap_or(&self.config.video_model);
            let url = self.model_url(model, "fetchPredictOperation");
            let body = FetchOperationRequest {
                operation_name: &job_id,
            };

            let state: OperationState = self.post_json(&url, &body).await?;
            let progress_percent = state
                .metadata
                .and_then(|m| m.progress_percent)
                .map(|p| p.clamp(0.0, 100.0) as u8);

            Ok(ProviderPoll {
                done: state.done,
                result: state.response,
                error: state.error,
                progress_percent,
            })
        })
    }

    fn generate_images(
        &self,
        request: &ImageRequest,
    ) -> BoxFuture<'_, Result<Vec<GeneratedImage>>> {
        let request = request.clone();
        Box::pin(async move {
            request.validate()?;
            let url = self.model_url(&self.config.image_model, "generateContent");
            let body = build_image_request(&request);

            let response: ContentResponse = self.post_json(&url, &body).await?;
            let images: Vec<GeneratedImage> = response
                .candidates
                .into_iter()
                .next()
                .map(|c| c.content.parts)
                .unwrap_or_default()
                .into_iter()
                .filter_map(|part| part.inline_data)
                .map(|blob| GeneratedImage {
                    data_base64: blob.data,
                    mime_type: blob.mime_type,
                    stored: None,
                })
                .collect();

            if images.is_empty() {
                return Err(GenmediaError::Provider("No images generated".into()));
            }
            debug!(count = images.len(), "Images generated");
            Ok(images)
        })
    }

    fn upscale(&self, request: &UpscaleRequest) -> BoxFuture<'_, Result<UpscaledImage>> {
        let request = request.clone();
        Box::pin(async move {
            request.validate()?;
            let url = self.model_url(&self.config.upscale_model, "predict");
            let body = build_upscale_request(&request);

            let response: PredictResponse = self.post_json(&url, &body).await?;
            response
                .predictions
                .into_iter()
                .next()
                .and_then(|p| {
                    let data = p.bytes_base64_encoded.filter(|d| !d.is_empty())?;
                    Some(UpscaledImage {
                        data_base64: data,
                        mime_type: p.mime_type.unwrap_or_else(|| request.output_mime_type.clone()),
                    })
                })
                .ok_or_else(|| GenmediaError::Provider("No upscaled image returned".into()))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use genmedia_core::error::ErrorKind;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    macro_rules! model_path {
        ($model:literal, $method:literal) => {
            concat!(
                "/v1/projects/studio/locations/us-central1/publishers/google/models/",
                $model,
                ":",
                $method
            )
        };
    }

    const SUBMIT_PATH: &str = model_path!("veo-3.1-generate-preview", "predictLongRunning");
    const FETCH_PATH: &str = model_path!("veo-3.1-generate-preview", "fetchPredictOperation");
    const IMAGE_PATH: &str = model_path!("gemini-3-pro-image-preview", "generateContent");
    const UPSCALE_PATH: &str = model_path!("imagen-4.0-upscale-preview", "predict");

    /// A PNG signature padded past the reference size floor.
    fn png_reference() -> String {
        let mut bytes = b"\x89PNG\r\n\x1a\n".to_vec();
        bytes.resize(128, 0);
        genmedia_core::media::encode_base64(&bytes)
    }

    fn client(server: &MockServer) -> VertexClient {
        VertexClient::new(ProviderConfig {
            project_id: "studio".into(),
            location: "us-central1".into(),
            video_model: "veo-3.1-generate-preview".into(),
            image_model: "gemini-3-pro-image-preview".into(),
            upscale_model: "imagen-4.0-upscale-preview".into(),
            access_token: Some("test-token".into()),
            base_url: Some(server.uri()),
            request_timeout_secs: 5,
        })
        .unwrap()
    }

    #[test]
    fn test_build_request_shape() {
        let mut request = GenerationRequest::video("a fox at dawn");
        request.first_frame = Some("data:image/jpeg;base64,AAAA".into());
        request.reference_images = vec!["AAAA".into(); 5];
        request.seed = Some(7);

        let body = serde_json::to_value(build_request(&request)).unwrap();
        let instance = &body["instances"][0];
        assert_eq!(instance["prompt"], "a fox at dawn");
        assert_eq!(instance["image"]["mimeType"], "image/jpeg");
        assert_eq!(instance["image"]["bytesBase64Encoded"], "AAAA");
        assert!(instance.get("lastFrame").is_none());
        assert_eq!(instance["referenceImages"].as_array().unwrap().len(), 3);
        assert_eq!(instance["referenceImages"][0]["referenceType"], "style");
        assert_eq!(body["parameters"]["sampleCount"], 1);
        assert_eq!(body["parameters"]["resolution"], "1080p");
        assert_eq!(body["parameters"]["seed"], 7);
    }

    #[test]
    fn test_model_of_operation() {
        let operation = "projects/p/locations/l/publishers/google/models/veo-2/operations/42";
        assert_eq!(model_of_operation(operation), Some("veo-2"));
        assert_eq!(model_of_operation("operations/42"), None);
    }

    #[tokio::test]
    async fn test_submit_returns_operation_name() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(SUBMIT_PATH))
            .and(header("authorization", "Bearer test-token"))
            .and(body_partial_json(json!({"instances": [{"prompt": "a fox"}]})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"name": "op-1"})))
            .mount(&server)
            .await;

        let job = client(&server)
            .submit(&GenerationRequest::video("a fox"))
            .await
            .unwrap();
        assert_eq!(job.job_id, "op-1");
    }

    #[tokio::test]
    async fn test_submit_classifies_quota_errors() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(SUBMIT_PATH))
            .respond_with(ResponseTemplate::new(429).set_body_string("quota"))
            .mount(&server)
            .await;

        let err = client(&server)
            .submit(&GenerationRequest::video("a fox"))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::RateLimited);
        assert!(err.to_string().contains("429 RESOURCE_EXHAUSTED: quota"));
    }

    #[tokio::test]
    async fn test_submit_bad_request_is_not_retryable() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(SUBMIT_PATH))
            .respond_with(ResponseTemplate::new(400).set_body_string("prompt blocked"))
            .mount(&server)
            .await;

        let err = client(&server)
            .submit(&GenerationRequest::video("a fox"))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn test_poll_maps_operation_state() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(FETCH_PATH))
            .and(body_partial_json(json!({"operationName": "op-1"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "done": false,
                "metadata": {"progressPercent": 42.5}
            })))
            .mount(&server)
            .await;

        let poll = client(&server).poll("op-1").await.unwrap();
        assert!(!poll.done);
        assert_eq!(poll.progress_percent, Some(42));
        assert!(poll.result.is_none());
    }

    #[test]
    fn test_image_request_filters_references() {
        let mut request = ImageRequest::new("a lighthouse");
        request.reference_images = vec![
            format!("data:image/png;base64,{}", png_reference()),
            "aGVsbG8=".into(),
            "!!!".into(),
        ];

        let body = serde_json::to_value(build_image_request(&request)).unwrap();
        let parts = body["contents"][0]["parts"].as_array().unwrap();
        assert_eq!(parts.len(), 2);
        assert_eq!(parts[0]["inlineData"]["mimeType"], "image/png");
        assert_eq!(parts[0]["inlineData"]["data"], png_reference());
        assert!(parts[1]["text"].as_str().unwrap().ends_with("a lighthouse"));
        assert_eq!(body["generationConfig"]["imageConfig"]["aspectRatio"], "1:1");
        assert_eq!(body["generationConfig"]["imageConfig"]["imageSize"], "1K");
    }

    #[test]
    fn test_image_request_without_usable_references_uses_bare_prompt() {
        let mut request = ImageRequest::new("a lighthouse");
        request.reference_images = vec!["aGVsbG8=".into()];
        let body = serde_json::to_value(build_image_request(&request)).unwrap();
        let parts = body["contents"][0]["parts"].as_array().unwrap();
        assert_eq!(parts.len(), 1);
        assert_eq!(parts[0]["text"], "a lighthouse");
    }

    #[tokio::test]
    async fn test_generate_images_collects_inline_parts() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(IMAGE_PATH))
            .and(header("authorization", "Bearer test-token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "candidates": [{"content": {"parts": [
                    {"text": "Here you go"},
                    {"inlineData": {"mimeType": "image/png", "data": "iVBORw0KGgo="}}
                ]}}]
            })))
            .mount(&server)
            .await;

        let images = client(&server)
            .generate_images(&ImageRequest::new("a lighthouse"))
            .await
            .unwrap();
        assert_eq!(images.len(), 1);
        assert_eq!(images[0].data_base64, "iVBORw0KGgo=");
        assert_eq!(images[0].mime_type, "image/png");
    }

    #[tokio::test]
    async fn test_generate_images_without_images_is_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(IMAGE_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "candidates": [{"content": {"parts": [{"text": "I cannot draw that"}]}}]
            })))
            .mount(&server)
            .await;

        let err = client(&server)
            .generate_images(&ImageRequest::new("a lighthouse"))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("No images generated"));
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn test_upscale_round_trip() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(UPSCALE_PATH))
            .and(body_partial_json(json!({
                "instances": [{"image": {"bytesBase64Encoded": "AAAA"}}],
                "parameters": {"mode": "upscale", "upscaleConfig": {"upscaleFactor": "x4"}}
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "predictions": [{"bytesBase64Encoded": "QkJCQg=="}]
            })))
            .mount(&server)
            .await;

        let mut request = UpscaleRequest::new("data:image/png;base64,AAAA");
        request.upscale_factor = "x4".into();
        let upscaled = client(&server).upscale(&request).await.unwrap();
        assert_eq!(upscaled.data_base64, "QkJCQg==");
        assert_eq!(upscaled.mime_type, "image/png");
    }

    #[tokio::test]
    async fn test_missing_token_is_config_error() {
        let server = MockServer::start().await;
        let mut config = client(&server).config;
        config.access_token = None;
        let err = VertexClient::new(config)
            .unwrap()
            .poll("op-1")
            .await
            .unwrap_err();
        assert!(matches!(err, GenmediaError::Config(_)));
    }
}
