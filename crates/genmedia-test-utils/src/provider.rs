use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;

use futures::future::BoxFuture;

use genmedia_core::error::{GenmediaError, Result};
use genmedia_core::traits::GenerationProvider;
use genmedia_core::media::clean_base64;
use genmedia_core::types::{
    GeneratedImage, GenerationRequest, ImageRequest, ProviderPoll, SubmittedJob, UpscaleRequest,
    UpscaledImage,
};

/// A provider that replays queued outcomes.
///
/// Once the submit queue is empty, `submit` succeeds with `job-{n}`. Once the
/// poll queue is empty, `poll` repeats the fallback set with
/// [`ScriptedProvider::poll_forever`], or fails if there is none. Image
/// calls default to one PNG image; upscale echoes its input.
#[derive(Default)]
pub struct ScriptedProvider {
    submits: Mutex<VecDeque<Result<SubmittedJob>>>,
    polls: Mutex<VecDeque<Result<ProviderPoll>>>,
    fallback_poll: Mutex<Option<ProviderPoll>>,
    images: Mutex<VecDeque<Result<Vec<GeneratedImage>>>>,
    upscales: Mutex<VecDeque<Result<UpscaledImage>>>,
    submitted: Mutex<Vec<GenerationRequest>>,
    submit_calls: AtomicU32,
    poll_calls: AtomicU32,
    image_calls: AtomicU32,
    upscale_calls: AtomicU32,
}

impl ScriptedProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_submit(self, outcome: Result<SubmittedJob>) -> Self {
        self.submits.lock().unwrap().push_back(outcome);
        self
    }

    pub fn on_poll(self, outcome: Result<ProviderPoll>) -> Self {
        self.polls.lock().unwrap().push_back(outcome);
        self
    }

    pub fn on_images(self, outcome: Result<Vec<GeneratedImage>>) -> Self {
        self.images.lock().unwrap().push_back(outcome);
        self
    }

    pub fn on_upscale(self, outcome: Result<UpscaledImage>) -> Self {
        self.upscales.lock().unwrap().push_back(outcome);
        self
    }

    /// Answer every poll beyond the queue with `poll`.
    pub fn poll_forever(self, poll: ProviderPoll) -> Self {
        *self.fallback_poll.lock().unwrap() = Some(poll);
        self
    }

    pub fn submit_calls(&self) -> u32 {
        self.submit_calls.load(Ordering::SeqCst)
    }

    pub fn poll_calls(&self) -> u32 {
        self.poll_calls.load(Ordering::SeqCst)
    }

    pub fn image_calls(&self) -> u32 {
        self.image_calls.load(Ordering::SeqCst)
    }

    pub fn upscale_calls(&self) -> u32 {
        self.upscale_calls.load(Ordering::SeqCst)
    }

    /// Requests received by `submit`, in order.
    pub fn submitted(&self) -> Vec<GenerationRequest> {
        self.submitted.lock().unwrap().clone()
    }
}

impl GenerationProvider for ScriptedProvider {
    fn submit(&self, request: &GenerationRequest) -> BoxFuture<'_, Result<SubmittedJob>> {
        let n = self.submit_calls.fetch_add(1, Ordering::SeqCst) + 1;
        self.submitted.lock().unwrap().push(request.clone());
        let outcome = self.submits.lock().unwrap().pop_front().unwrap_or_else(|| {
            Ok(SubmittedJob {
                job_id: format!("job-{}", n),
            })
        });
        Box::pin(async move { outcome })
    }

    fn poll(&self, _job_id: &str) -> BoxFuture<'_, Result<ProviderPoll>> {
        self.poll_calls.fetch_add(1, Ordering::SeqCst);
        let queued = self.polls.lock().unwrap().pop_front();
        let outcome = match queued {
            Some(outcome) => outcome,
            None => match self.fallback_poll.lock().unwrap().clone() {
                Some(poll) => Ok(poll),
                None => Err(GenmediaError::Provider("poll script exhausted".into())),
            },
        };
        Box::pin(async move { outcome })
    }

    fn generate_images(
        &self,
        _request: &ImageRequest,
    ) -> BoxFuture<'_, Result<Vec<GeneratedImage>>> {
        self.image_calls.fetch_add(1, Ordering::SeqCst);
        let outcome = self.images.lock().unwrap().pop_front().unwrap_or_else(|| {
            Ok(vec![png_image("iVBORw0KGgo=")])
        });
        Box::pin(async move { outcome })
    }

    fn upscale(&self, request: &UpscaleRequest) -> BoxFuture<'_, Result<UpscaledImage>> {
        self.upscale_calls.fetch_add(1, Ordering::SeqCst);
        let echo = UpscaledImage {
            data_base64: clean_base64(&request.image),
            mime_type: request.output_mime_type.clone(),
        };
        let outcome = self
            .upscales
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Ok(echo));
        Box::pin(async move { outcome })
    }
}

/// An unsaved PNG image as a provider returns it.
pub fn png_image(data_base64: &str) -> GeneratedImage {
    GeneratedImage {
        data_base64: data_base64.to_string(),
        mime_type: "image/png".to_string(),
        stored: None,
    }
}
