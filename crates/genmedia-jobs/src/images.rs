use std::sync::Arc;

use tracing::{info, warn};

use genmedia_core::error::Result;
use genmedia_core::media::decode_base64;
use genmedia_core::traits::{ArtifactStore, GenerationProvider};
use genmedia_core::types::*;
use genmedia_provider::RetryPolicy;

/// Direct image calls. Unlike video jobs these answer in one request, so
/// there is no handle to poll; the retry policy governs the call itself.
pub struct ImageService {
    provider: Arc<dyn GenerationProvider>,
    store: Arc<dyn ArtifactStore>,
    retry: RetryPolicy,
}

impl ImageService {
    pub fn new(
        provider: Arc<dyn GenerationProvider>,
        store: Arc<dyn ArtifactStore>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            provider,
            store,
            retry,
        }
    }

    /// Generate images and save each one to the owner's library.
    ///
    /// Saving is best-effort and per image: a failed write leaves that
    /// image's `stored` empty and never fails the call.
    pub async fn generate(
        &self,
        request: &ImageRequest,
        owner_id: &str,
    ) -> Result<Vec<GeneratedImage>> {
        request.validate()?;

        let (mut images, attempts) = self
            .retry
            .run("generate_images", None, || self.provider.generate_images(request))
            .await?;
        info!(count = images.len(), attempts, "Images generated");

        for (index, image) in images.iter_mut().enumerate() {
            match self.save(image, request, owner_id).await {
                Ok(id) => image.stored = Some(id),
                Err(e) => warn!(
                    index,
                    owner_id,
                    error = %e,
                    "Generated image not saved to library"
                ),
            }
        }
        Ok(images)
    }

    async fn save(
        &self,
        image: &GeneratedImage,
        request: &ImageRequest,
        owner_id: &str,
    ) -> Result<ArtifactId> {
        let bytes = decode_base64(&image.data_base64)?;
        self.store
            .put(NewArtifact {
                bytes,
                kind: ArtifactKind::Image,
                owner_id: owner_id.to_string(),
                prompt: Some(request.prompt.clone()),
                mime_type: Some(image.mime_type.clone()),
                source: ArtifactSource::Generated,
                source_job: None,
            })
            .await
    }

    /// Upscale one image. The result is returned to the caller only.
    pub async fn upscale(&self, request: &UpscaleRequest) -> Result<UpscaledImage> {
        request.validate()?;
        let (image, attempts) = self
            .retry
            .run("upscale", None, || self.provider.upscale(request))
            .await?;
        info!(attempts, factor = %request.upscale_factor, "Image upscaled");
        Ok(image)
    }
}
