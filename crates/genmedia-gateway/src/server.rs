use std::path::PathBuf;
use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tracing::info;

use crate::routes;
use crate::state::AppState;

/// Assemble the API router. `files_dir`, when given, is served under `/files`.
pub fn build_router(state: Arc<AppState>, files_dir: Option<PathBuf>) -> Router {
    let mut app = Router::new()
        .route("/api/health", get(routes::health))
        // Generation
        .route("/api/generate/video", post(routes::generate_video))
        .route("/api/generate/video/status", post(routes::video_status))
        .route("/api/generate/image", post(routes::generate_image))
        .route("/api/generate/upscale", post(routes::upscale_image))
        // Library
        .route("/api/library", get(routes::list_assets))
        .route("/api/library/save", post(routes::save_asset))
        .route(
            "/api/library/{id}",
            get(routes::get_asset).delete(routes::delete_asset),
        )
        // Workflows
        .route("/api/workflows", get(routes::list_workflows))
        .route("/api/workflows/save", post(routes::save_workflow))
        .route(
            "/api/workflows/{id}",
            get(routes::get_workflow)
                .put(routes::update_workflow)
                .delete(routes::delete_workflow),
        )
        .route("/api/workflows/{id}/clone", post(routes::clone_workflow))
        .route("/api/graphs/resolve", post(routes::resolve_graph));

    if let Some(dir) = files_dir {
        app = app.nest_service("/files", ServeDir::new(dir));
    }

    app.layer(CorsLayer::permissive()).with_state(state)
}

/// HTTP gateway server built on axum.
pub struct GatewayServer {
    state: Arc<AppState>,
    files_dir: Option<PathBuf>,
}

impl GatewayServer {
    pub fn new(state: AppState, files_dir: Option<PathBuf>) -> Self {
        Self {
            state: Arc::new(state),
            files_dir,
        }
    }

    /// Run the gateway server until the cancellation token is triggered.
    pub async fn run(&self, shutdown: CancellationToken) -> anyhow::Result<()> {
        let bind = self.state.config.bind.clone();
        let app = build_router(self.state.clone(), self.files_dir.clone());

        let listener = TcpListener::bind(&bind).await?;
        info!(bind = %bind, "Gateway listening");

        axum::serve(listener, app)
            .with_graceful_shutdown(async move { shutdown.cancelled().await })
            .await?;

        info!("Gateway shut down");
        Ok(())
    }
}
