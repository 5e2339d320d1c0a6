use serde::{Deserialize, Serialize};

use genmedia_core::types::{ArtifactId, ArtifactKind, GenerationRequest, JobState, JobStatus};

/// What happened to the generated artifact on the storage side.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum Persistence {
    /// No completed artifact has been seen yet.
    Pending,
    Stored { artifact_id: ArtifactId },
    /// The one write attempt failed. Never retried for this handle.
    Failed { reason: String },
    /// The provider kept the result in its own storage; nothing to write.
    NotApplicable,
}

/// Caller-held state of one generation job.
///
/// The orchestrator keeps nothing between calls; everything it needs to
/// continue a job travels in the handle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobHandle {
    /// Provider-issued operation id.
    pub id: String,
    pub owner_id: String,
    pub prompt: String,
    pub kind: ArtifactKind,
    state: JobState,
    attempts: u32,
    terminal: Option<JobStatus>,
    persistence: Persistence,
}

impl JobHandle {
    pub(crate) fn submitted(
        id: String,
        owner_id: &str,
        request: &GenerationRequest,
        attempts: u32,
    ) -> Self {
        Self {
            id,
            owner_id: owner_id.to_string(),
            prompt: request.prompt.clone(),
            kind: request.kind,
            state: JobState::Submitted,
            attempts,
            terminal: None,
            persistence: Persistence::Pending,
        }
    }

    /// Rebuild a handle for an operation submitted earlier, e.g. by another
    /// process. Only the provider knows its progress.
    pub fn resume(
        id: impl Into<String>,
        owner_id: impl Into<String>,
        kind: ArtifactKind,
        prompt: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            owner_id: owner_id.into(),
            prompt: prompt.into(),
            kind,
            state: JobState::Polling,
            attempts: 0,
            terminal: None,
            persistence: Persistence::Pending,
        }
    }

    pub fn state(&self) -> JobState {
        self.state
    }

    /// Attempts consumed by the most recent remote call.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn terminal_status(&self) -> Option<&JobStatus> {
        self.terminal.as_ref()
    }

    pub fn persistence(&self) -> &Persistence {
        &self.persistence
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    pub(crate) fn begin_poll(&mut self) {
        if !self.state.is_terminal() {
            self.state = JobState::Polling;
        }
    }

    pub(crate) fn record_attempts(&mut self, attempts: u32) {
        self.attempts = attempts;
    }

    pub(crate) fn set_persistence(&mut self, persistence: Persistence) {
        self.persistence = persistence;
    }

    /// Enter a terminal state. A handle that is already terminal keeps its
    /// first outcome.
    pub(crate) fn finish(&mut self, status: JobStatus) {
        if self.state.is_terminal() {
            return;
        }
        self.state = match status {
            JobStatus::Complete(_) => JobState::Complete,
            _ => JobState::Failed,
        };
        self.terminal = Some(status);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use genmedia_core::types::{ArtifactPayload, GeneratedArtifact};

    fn handle() -> JobHandle {
        JobHandle::submitted("op-1".into(), "u1", &GenerationRequest::video("a fox"), 1)
    }

    #[test]
    fn test_lifecycle_transitions() {
        let mut h = handle();
        assert_eq!(h.state(), JobState::Submitted);
        assert_eq!(h.persistence(), &Persistence::Pending);

        h.begin_poll();
        assert_eq!(h.state(), JobState::Polling);

        h.finish(JobStatus::Failed { reason: "blocked".into() });
        assert_eq!(h.state(), JobState::Failed);
        assert!(h.is_terminal());
    }

    #[test]
    fn test_terminal_state_is_final() {
        let mut h = handle();
        let complete = JobStatus::Complete(GeneratedArtifact {
            payload: ArtifactPayload::Remote { uri: "gs://b/v.mp4".into() },
            stored: None,
        });
        h.finish(complete.clone());
        h.finish(JobStatus::Failed { reason: "late".into() });
        h.begin_poll();

        assert_eq!(h.state(), JobState::Complete);
        assert_eq!(h.terminal_status(), Some(&complete));
    }

    #[test]
    fn test_resumed_handle_starts_polling() {
        let h = JobHandle::resume("op-9", "u2", ArtifactKind::Video, "");
        assert_eq!(h.state(), JobState::Polling);
        assert_eq!(h.attempts(), 0);
        assert!(h.terminal_status().is_none());
    }
}
