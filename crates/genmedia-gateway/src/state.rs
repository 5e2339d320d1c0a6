use std::sync::Arc;

use genmedia_core::config::GatewayConfig;
use genmedia_core::traits::ArtifactStore;
use genmedia_graph::WorkflowService;
use genmedia_jobs::{ImageService, JobOrchestrator};

/// Shared application state for axum handlers.
pub struct AppState {
    pub config: GatewayConfig,
    pub jobs: JobOrchestrator,
    pub images: ImageService,
    pub store: Arc<dyn ArtifactStore>,
    pub workflows: WorkflowService,
}
