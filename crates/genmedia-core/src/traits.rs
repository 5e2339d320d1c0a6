use std::collections::HashMap;

use futures::future::BoxFuture;
use futures::stream::{self, StreamExt};

use crate::error::Result;
use crate::graph::{WorkflowDocument, WorkflowScope, WorkflowSummary};
use crate::types::*;

/// Remote generation provider. Video jobs are long-running and addressed by
/// an opaque id; image calls answer directly.
pub trait GenerationProvider: Send + Sync + 'static {
    /// Start a generation job. Returns as soon as the provider issued an id.
    fn submit(&self, request: &GenerationRequest) -> BoxFuture<'_, Result<SubmittedJob>>;

    /// Read the current state of a job. A pure read on the provider side.
    fn poll(&self, job_id: &str) -> BoxFuture<'_, Result<ProviderPoll>>;

    /// Generate images in a single call. An empty answer is an error.
    fn generate_images(&self, request: &ImageRequest)
        -> BoxFuture<'_, Result<Vec<GeneratedImage>>>;

    /// Upscale one image in a single call.
    fn upscale(&self, request: &UpscaleRequest) -> BoxFuture<'_, Result<UpscaledImage>>;
}

/// Artifact storage: blobs plus a metadata record per artifact id.
pub trait ArtifactStore: Send + Sync + 'static {
    /// Store an artifact and return its id.
    fn put(&self, artifact: NewArtifact) -> BoxFuture<'_, Result<ArtifactId>>;

    /// Look up an artifact. Missing artifacts yield `GenmediaError::NotFound`.
    fn get(&self, id: &ArtifactId) -> BoxFuture<'_, Result<ArtifactRecord>>;

    /// Delete an artifact's blob and metadata.
    fn delete(&self, id: &ArtifactId) -> BoxFuture<'_, Result<()>>;

    /// Newest-first listing of one owner's artifacts.
    fn list(
        &self,
        owner_id: &str,
        kind: Option<ArtifactKind>,
        limit: usize,
    ) -> BoxFuture<'_, Result<Vec<ArtifactRecord>>>;

    /// Look up many artifacts. Each id's outcome is independent.
    ///
    /// The default issues `get` calls with at most `concurrency` in flight.
    /// Backends with a native multi-get should override it.
    fn batch_get<'a>(
        &'a self,
        ids: &'a [ArtifactId],
        concurrency: usize,
    ) -> BoxFuture<'a, HashMap<ArtifactId, Result<ArtifactRecord>>> {
        Box::pin(async move {
            stream::iter(ids.iter().cloned())
                .map(|id| async move {
                    let outcome = self.get(&id).await;
                    (id, outcome)
                })
                .buffer_unordered(concurrency.max(1))
                .collect::<HashMap<_, _>>()
                .await
        })
    }
}

/// Workflow persistence.
pub trait WorkflowRepository: Send + Sync + 'static {
    /// Load a workflow verbatim. Missing workflows yield `GenmediaError::NotFound`.
    fn load(&self, workflow_id: &str) -> BoxFuture<'_, Result<WorkflowDocument>>;

    /// Insert or replace a workflow.
    fn save(&self, workflow: &WorkflowDocument) -> BoxFuture<'_, Result<()>>;

    /// Whether `caller_id` owns the workflow. Missing workflows yield
    /// `GenmediaError::NotFound`.
    fn check_ownership(&self, workflow_id: &str, caller_id: &str) -> BoxFuture<'_, Result<bool>>;

    /// Newest-first listing for a scope.
    fn list(&self, scope: WorkflowScope, caller_id: &str)
        -> BoxFuture<'_, Result<Vec<WorkflowSummary>>>;

    /// Remove a workflow. Referenced artifacts are left alone.
    fn delete(&self, workflow_id: &str) -> BoxFuture<'_, Result<()>>;
}
