use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::info;

use genmedia_core::error::GenmediaError;
use genmedia_core::graph::{WorkflowDraft, WorkflowGraph, WorkflowScope};
use genmedia_core::media::decode_base64;
use genmedia_core::types::*;
use genmedia_jobs::JobHandle;

use crate::error::ApiError;
use crate::middleware::Authenticated;
use crate::state::AppState;

type ApiResult = Result<Json<Value>, ApiError>;

const DEFAULT_LIBRARY_LIMIT: usize = 50;

// GET /api/health
pub async fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

// ── Generation ───────────────────────────────────────────────────

// POST /api/generate/video
pub async fn generate_video(
    State(state): State<Arc<AppState>>,
    Authenticated(caller): Authenticated,
    Json(request): Json<GenerationRequest>,
) -> ApiResult {
    let handle = state.jobs.submit(&request, &caller.user_id).await?;
    Ok(Json(json!({
        "operation_name": handle.id,
        "status": "processing",
    })))
}

#[derive(Deserialize)]
pub struct StatusBody {
    pub operation_name: String,
    #[serde(default)]
    pub prompt: Option<String>,
}

// POST /api/generate/video/status
pub async fn video_status(
    State(state): State<Arc<AppState>>,
    Authenticated(caller): Authenticated,
    Json(body): Json<StatusBody>,
) -> ApiResult {
    if body.operation_name.trim().is_empty() {
        return Err(GenmediaError::InvalidInput("operation_name is required".into()).into());
    }
    let mut handle = JobHandle::resume(
        body.operation_name,
        caller.user_id,
        ArtifactKind::Video,
        body.prompt.unwrap_or_default(),
    );
    let status = state.jobs.poll(&mut handle).await?;
    Ok(Json(status_body(&status)))
}

/// Wire shape of a status check.
fn status_body(status: &JobStatus) -> Value {
    match status {
        JobStatus::Processing { progress } | JobStatus::TimedOut { progress } => json!({
            "status": "processing",
            "progress": progress,
        }),
        JobStatus::Complete(artifact) => {
            let mut body = json!({ "status": "complete", "progress": 100 });
            match &artifact.payload {
                ArtifactPayload::Inline { data_base64, mime_type } => {
                    body["video_base64"] = json!(data_base64);
                    body["mime_type"] = json!(mime_type);
                }
                ArtifactPayload::Remote { uri } => {
                    body["storage_uri"] = json!(uri);
                }
            }
            if let Some(id) = &artifact.stored {
                body["asset_id"] = json!(id);
            }
            body
        }
        JobStatus::Failed { reason } => json!({
            "status": "failed",
            "error": { "message": reason },
        }),
        JobStatus::Cancelled => json!({ "status": "cancelled" }),
    }
}

// POST /api/generate/image
pub async fn generate_image(
    State(state): State<Arc<AppState>>,
    Authenticated(caller): Authenticated,
    Json(request): Json<ImageRequest>,
) -> ApiResult {
    let images = state.images.generate(&request, &caller.user_id).await?;
    let asset_ids: Vec<&ArtifactId> = images.iter().filter_map(|i| i.stored.as_ref()).collect();
    Ok(Json(json!({
        "images": images.iter().map(|i| &i.data_base64).collect::<Vec<_>>(),
        "mime_types": images.iter().map(|i| &i.mime_type).collect::<Vec<_>>(),
        "asset_ids": asset_ids,
    })))
}

// POST /api/generate/upscale
pub async fn upscale_image(
    State(state): State<Arc<AppState>>,
    Authenticated(_caller): Authenticated,
    Json(request): Json<UpscaleRequest>,
) -> ApiResult {
    let upscaled = state.images.upscale(&request).await?;
    Ok(Json(json!({
        "image": upscaled.data_base64,
        "mime_type": upscaled.mime_type,
    })))
}

// ── Library ──────────────────────────────────────────────────────

#[derive(Deserialize)]
pub struct SaveAssetBody {
    pub data: String,
    pub asset_type: String,
    #[serde(default)]
    pub prompt: Option<String>,
    #[serde(default)]
    pub mime_type: Option<String>,
}

// POST /api/library/save
pub async fn save_asset(
    State(state): State<Arc<AppState>>,
    Authenticated(caller): Authenticated,
    Json(body): Json<SaveAssetBody>,
) -> ApiResult {
    let kind = ArtifactKind::parse(&body.asset_type)?;
    let bytes = decode_base64(&body.data)?;
    let id = state
        .store
        .put(NewArtifact {
            bytes,
            kind,
            owner_id: caller.user_id.clone(),
            prompt: body.prompt,
            mime_type: body.mime_type,
            source: ArtifactSource::Upload,
            source_job: None,
        })
        .await?;
    let record = state.store.get(&id).await?;

    info!(asset_id = %id, user_id = %caller.user_id, kind = %kind, "Saved asset");
    Ok(Json(json!({ "id": record.id, "url": record.locator })))
}

#[derive(Deserialize)]
pub struct LibraryQuery {
    #[serde(default)]
    pub asset_type: Option<String>,
    #[serde(default)]
    pub limit: Option<usize>,
}

// GET /api/library
pub async fn list_assets(
    State(state): State<Arc<AppState>>,
    Authenticated(caller): Authenticated,
    Query(q): Query<LibraryQuery>,
) -> ApiResult {
    let kind = q.asset_type.as_deref().map(ArtifactKind::parse).transpose()?;
    let limit = q.limit.unwrap_or(DEFAULT_LIBRARY_LIMIT);
    let assets = state.store.list(&caller.user_id, kind, limit).await?;
    Ok(Json(json!({ "count": assets.len(), "assets": assets })))
}

/// Load an artifact the caller owns.
async fn owned_asset(
    state: &AppState,
    id: &ArtifactId,
    caller: &Caller,
) -> Result<ArtifactRecord, ApiError> {
    let record = state.store.get(id).await?;
    if record.owner_id != caller.user_id {
        return Err(GenmediaError::PermissionDenied("Access denied".into()).into());
    }
    Ok(record)
}

// GET /api/library/{id}
pub async fn get_asset(
    State(state): State<Arc<AppState>>,
    Authenticated(caller): Authenticated,
    Path(id): Path<String>,
) -> ApiResult {
    let record = owned_asset(&state, &ArtifactId(id), &caller).await?;
    Ok(Json(json!(record)))
}

// DELETE /api/library/{id}
pub async fn delete_asset(
    State(state): State<Arc<AppState>>,
    Authenticated(caller): Authenticated,
    Path(id): Path<String>,
) -> ApiResult {
    let id = ArtifactId(id);
    owned_asset(&state, &id, &caller).await?;
    state.store.delete(&id).await?;
    info!(asset_id = %id, user_id = %caller.user_id, "Deleted asset");
    Ok(Json(json!({ "status": "deleted", "id": id })))
}

// ── Workflows ────────────────────────────────────────────────────

// POST /api/workflows/save
pub async fn save_workflow(
    State(state): State<Arc<AppState>>,
    Authenticated(caller): Authenticated,
    Json(draft): Json<WorkflowDraft>,
) -> ApiResult {
    let id = state.workflows.create(draft, &caller).await?;
    Ok(Json(json!({ "id": id })))
}

#[derive(Deserialize)]
pub struct ScopeQuery {
    #[serde(default)]
    pub scope: Option<String>,
}

// GET /api/workflows?scope=my|public
pub async fn list_workflows(
    State(state): State<Arc<AppState>>,
    Authenticated(caller): Authenticated,
    Query(q): Query<ScopeQuery>,
) -> ApiResult {
    let scope = WorkflowScope::parse(q.scope.as_deref().unwrap_or("my"))?;
    let workflows = state.workflows.list(scope, &caller).await?;
    Ok(Json(json!({ "workflows": workflows })))
}

// GET /api/workflows/{id}
pub async fn get_workflow(
    State(state): State<Arc<AppState>>,
    Authenticated(caller): Authenticated,
    Path(id): Path<String>,
) -> ApiResult {
    let doc = state.workflows.get(&id, &caller).await?;
    Ok(Json(json!(doc)))
}

// PUT /api/workflows/{id}
pub async fn update_workflow(
    State(state): State<Arc<AppState>>,
    Authenticated(caller): Authenticated,
    Path(id): Path<String>,
    Json(draft): Json<WorkflowDraft>,
) -> ApiResult {
    state.workflows.update(&id, draft, &caller).await?;
    Ok(Json(json!({ "message": "Workflow updated successfully" })))
}

// DELETE /api/workflows/{id}
pub async fn delete_workflow(
    State(state): State<Arc<AppState>>,
    Authenticated(caller): Authenticated,
    Path(id): Path<String>,
) -> ApiResult {
    state.workflows.delete(&id, &caller).await?;
    Ok(Json(json!({ "message": "Workflow deleted successfully" })))
}

// POST /api/workflows/{id}/clone
pub async fn clone_workflow(
    State(state): State<Arc<AppState>>,
    Authenticated(caller): Authenticated,
    Path(id): Path<String>,
) -> ApiResult {
    let id = state.workflows.clone_workflow(&id, &caller).await?;
    Ok(Json(json!({ "id": id })))
}

// POST /api/graphs/resolve
pub async fn resolve_graph(
    State(state): State<Arc<AppState>>,
    Authenticated(_caller): Authenticated,
    Json(graph): Json<WorkflowGraph>,
) -> ApiResult {
    let resolved = state.workflows.resolve_graph(&graph).await?;
    Ok(Json(json!(resolved)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_body_shapes() {
        assert_eq!(
            status_body(&JobStatus::Processing { progress: 40 }),
            json!({"status": "processing", "progress": 40})
        );
        assert_eq!(
            status_body(&JobStatus::Failed { reason: "blocked".into() }),
            json!({"status": "failed", "error": {"message": "blocked"}})
        );

        let inline = status_body(&JobStatus::Complete(GeneratedArtifact {
            payload: ArtifactPayload::Inline {
                data_base64: "AAAA".into(),
                mime_type: "video/mp4".into(),
            },
            stored: Some(ArtifactId::from("a-1")),
        }));
        assert_eq!(inline["video_base64"], "AAAA");
        assert_eq!(inline["asset_id"], "a-1");

        let remote = status_body(&JobStatus::Complete(GeneratedArtifact {
            payload: ArtifactPayload::Remote { uri: "gs://b/v.mp4".into() },
            stored: None,
        }));
        assert_eq!(remote["storage_uri"], "gs://b/v.mp4");
        assert!(remote.get("asset_id").is_none());
    }
}
