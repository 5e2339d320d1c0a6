//! Turning raw provider poll answers into caller-facing statuses.

use serde_json::Value;

use genmedia_core::types::{ArtifactPayload, GeneratedArtifact, JobStatus, ProviderPoll};

const DEFAULT_VIDEO_MIME: &str = "video/mp4";

/// Locations of the generated sample, in the order they are tried.
const SAMPLE_POINTERS: &[&str] = &["/generateVideoResponse/generatedSamples/0/video", "/videos/0"];

/// Map one poll answer to a status. Never fails: anything unrecognisable on a
/// finished job becomes `Failed` with a description of what was received.
pub fn interpret_poll(poll: &ProviderPoll) -> JobStatus {
    if !poll.done {
        return JobStatus::Processing {
            progress: poll.progress_percent.unwrap_or(0).min(100),
        };
    }

    if let Some(error) = poll.error.as_ref().filter(|e| !e.is_null()) {
        return JobStatus::Failed {
            reason: error_message(error),
        };
    }

    match &poll.result {
        Some(result) => match extract_payload(result) {
            Some(payload) => JobStatus::Complete(GeneratedArtifact {
                payload,
                stored: None,
            }),
            None => JobStatus::Failed {
                reason: format!(
                    "Unrecognized result payload (top-level keys: [{}])",
                    top_level_keys(result)
                ),
            },
        },
        None => JobStatus::Failed {
            reason: format!(
                "Job finished without a result or error (top-level keys: [{}])",
                serde_json::to_value(poll)
                    .map(|v| top_level_keys(&v))
                    .unwrap_or_default()
            ),
        },
    }
}

fn extract_payload(result: &Value) -> Option<ArtifactPayload> {
    SAMPLE_POINTERS
        .iter()
        .filter_map(|pointer| result.pointer(pointer))
        .find_map(sample_payload)
}

fn sample_payload(sample: &Value) -> Option<ArtifactPayload> {
    if let Some(data) = sample.get("bytesBase64Encoded").and_then(Value::as_str) {
        let mime_type = sample
            .get("mimeType")
            .and_then(Value::as_str)
            .unwrap_or(DEFAULT_VIDEO_MIME);
        return Some(ArtifactPayload::Inline {
            data_base64: data.to_string(),
            mime_type: mime_type.to_string(),
        });
    }
    ["uri", "gcsUri"]
        .iter()
        .find_map(|key| sample.get(*key).and_then(Value::as_str))
        .map(|uri| ArtifactPayload::Remote {
            uri: uri.to_string(),
        })
}

fn error_message(error: &Value) -> String {
    match error.get("message").and_then(Value::as_str) {
        Some(message) => message.to_string(),
        None => match error.as_str() {
            Some(s) => s.to_string(),
            None => error.to_string(),
        },
    }
}

/// Comma-separated keys of a JSON object with a non-null value.
fn top_level_keys(value: &Value) -> String {
    match value.as_object() {
        Some(map) => map
            .iter()
            .filter(|(_, v)| !v.is_null())
            .map(|(k, _)| k.as_str())
            .collect::<Vec<_>>()
            .join(", "),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn finished(result: Value) -> ProviderPoll {
        ProviderPoll {
            done: true,
            result: Some(result),
            error: None,
            progress_percent: None,
        }
    }

    #[test]
    fn test_processing_progress() {
        let poll = ProviderPoll {
            progress_percent: Some(37),
            ..Default::default()
        };
        assert_eq!(interpret_poll(&poll), JobStatus::Processing { progress: 37 });
        assert_eq!(
            interpret_poll(&ProviderPoll::default()),
            JobStatus::Processing { progress: 0 }
        );

        let overshoot = ProviderPoll {
            progress_percent: Some(140),
            ..Default::default()
        };
        assert_eq!(interpret_poll(&overshoot).progress(), 100);
    }

    #[test]
    fn test_generated_samples_inline() {
        let status = interpret_poll(&finished(json!({
            "generateVideoResponse": {
                "generatedSamples": [{"video": {"bytesBase64Encoded": "AAAA", "uri": "gs://x"}}]
            }
        })));
        assert_eq!(
            status,
            JobStatus::Complete(GeneratedArtifact {
                payload: ArtifactPayload::Inline {
                    data_base64: "AAAA".into(),
                    mime_type: "video/mp4".into(),
                },
                stored: None,
            })
        );
    }

    #[test]
    fn test_videos_remote_uri() {
        let status = interpret_poll(&finished(json!({
            "@type": "type.googleapis.com/cloud.ai.large_models.vision.GenerateVideoResponse",
            "videos": [{"gcsUri": "gs://bucket/out.mp4", "mimeType": "video/mp4"}]
        })));
        match status {
            JobStatus::Complete(artifact) => assert_eq!(
                artifact.payload,
                ArtifactPayload::Remote { uri: "gs://bucket/out.mp4".into() }
            ),
            other => panic!("unexpected status: {:?}", other),
        }
    }

    #[test]
    fn test_unrecognized_payload_lists_keys() {
        let status = interpret_poll(&finished(json!({
            "raiMediaFilteredCount": 1,
            "raiMediaFilteredReasons": ["unsafe"]
        })));
        match status {
            JobStatus::Failed { reason } => {
                assert!(reason.contains("raiMediaFilteredCount"), "{}", reason);
                assert!(reason.contains("raiMediaFilteredReasons"), "{}", reason);
            }
            other => panic!("unexpected status: {:?}", other),
        }
    }

    #[test]
    fn test_done_without_anything() {
        let poll = ProviderPoll {
            done: true,
            ..Default::default()
        };
        match interpret_poll(&poll) {
            JobStatus::Failed { reason } => assert!(reason.contains("done"), "{}", reason),
            other => panic!("unexpected status: {:?}", other),
        }
    }

    #[test]
    fn test_provider_error_message() {
        let poll = ProviderPoll {
            done: true,
            error: Some(json!({"code": 3, "message": "prompt violates policy"})),
            ..Default::default()
        };
        assert_eq!(
            interpret_poll(&poll),
            JobStatus::Failed { reason: "prompt violates policy".into() }
        );

        let poll = ProviderPoll {
            done: true,
            error: Some(json!({"code": 13})),
            ..Default::default()
        };
        assert_eq!(
            interpret_poll(&poll),
            JobStatus::Failed { reason: r#"{"code":13}"#.into() }
        );
    }
}
