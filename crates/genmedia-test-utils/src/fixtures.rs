use chrono::{Duration, Utc};
use serde_json::json;

use genmedia_core::graph::{Node, WorkflowDocument, WorkflowGraph};
use genmedia_core::types::ProviderPoll;

/// A job still running at `progress` percent.
pub fn poll_processing(progress: u8) -> ProviderPoll {
    ProviderPoll {
        done: false,
        result: None,
        error: None,
        progress_percent: Some(progress),
    }
}

/// A finished job carrying inline video bytes in the Veo response shape.
pub fn poll_inline_video(data_base64: &str) -> ProviderPoll {
    ProviderPoll {
        done: true,
        result: Some(json!({
            "generateVideoResponse": {
                "generatedSamples": [
                    {"video": {"bytesBase64Encoded": data_base64}}
                ]
            }
        })),
        error: None,
        progress_percent: Some(100),
    }
}

/// A finished job whose video only lives in provider storage.
pub fn poll_remote_video(uri: &str) -> ProviderPoll {
    ProviderPoll {
        done: true,
        result: Some(json!({"videos": [{"gcsUri": uri, "mimeType": "video/mp4"}]})),
        error: None,
        progress_percent: None,
    }
}

/// A job the provider reports as failed.
pub fn poll_provider_error(message: &str) -> ProviderPoll {
    ProviderPoll {
        done: true,
        result: None,
        error: Some(json!({"code": 3, "message": message})),
        progress_percent: None,
    }
}

/// Build a workflow owned by `owner_id`, created `age_secs` seconds ago.
pub fn workflow_doc(
    id: &str,
    owner_id: &str,
    is_public: bool,
    age_secs: i64,
    graph: WorkflowGraph,
) -> WorkflowDocument {
    let created = Utc::now() - Duration::seconds(age_secs);
    WorkflowDocument {
        id: id.to_string(),
        name: format!("Workflow {}", id),
        description: String::new(),
        is_public,
        thumbnail_ref: None,
        created_at: created,
        updated_at: created,
        owner_id: owner_id.to_string(),
        owner_email: format!("{}@example.com", owner_id),
        graph,
    }
}

/// A single image-generation node pointing at `image_ref`.
pub fn image_node(id: &str, image_ref: &str) -> Node {
    Node::new(id, "imageGen")
        .with_data("prompt", json!("a lighthouse at night"))
        .with_data("imageRef", json!(image_ref))
}
