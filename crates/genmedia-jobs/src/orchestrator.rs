use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use genmedia_core::error::{GenmediaError, Result};
use genmedia_core::media::decode_base64;
use genmedia_core::traits::{ArtifactStore, GenerationProvider};
use genmedia_core::types::*;
use genmedia_provider::RetryPolicy;

use crate::job::{JobHandle, Persistence};
use crate::payload::interpret_poll;

/// Drives generation jobs from submission to a terminal outcome.
///
/// Stateless between calls: the provider owns the job, the caller owns the
/// [`JobHandle`]. Submission and polling each get their own retry budget.
pub struct JobOrchestrator {
    provider: Arc<dyn GenerationProvider>,
    store: Arc<dyn ArtifactStore>,
    retry: RetryPolicy,
}

impl JobOrchestrator {
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

    /// Start a job. Returns as soon as the provider has issued an id.
    pub async fn submit(&self, request: &GenerationRequest, owner_id: &str) -> Result<JobHandle> {
        request.validate()?;
        let (job, attempts) = self
            .retry
            .run("submit", None, || self.provider.submit(request))
            .await?;

        info!(job_id = %job.job_id, owner_id, attempts, "Generation job submitted");
        Ok(JobHandle::submitted(job.job_id, owner_id, request, attempts))
    }

    /// One status check. A terminal handle answers from its cached outcome
    /// without contacting the provider.
    pub async fn poll(&self, handle: &mut JobHandle) -> Result<JobStatus> {
        if let Some(status) = handle.terminal_status() {
            return Ok(status.clone());
        }
        handle.begin_poll();
        let fetched = self.fetch(&handle.id, None).await;
        self.settle(handle, fetched).await
    }

    /// Poll every `poll_interval` until the job is terminal, `max_wait` has
    /// elapsed (`TimedOut`), or `cancel` fires (`Cancelled`).
    ///
    /// The deadline and `cancel` interrupt provider calls and their retry
    /// backoff. Once a poll has produced an answer, interpreting it and
    /// saving the artifact run to completion.
    pub async fn await_completion(
        &self,
        handle: &mut JobHandle,
        poll_interval: Duration,
        max_wait: Duration,
        cancel: &CancellationToken,
    ) -> Result<JobStatus> {
        let deadline = Instant::now() + max_wait;
        let mut progress = 0u8;

        loop {
            if cancel.is_cancelled() {
                return Ok(JobStatus::Cancelled);
            }
            if let Some(status) = handle.terminal_status() {
                return Ok(status.clone());
            }
            handle.begin_poll();

            let job_id = handle.id.clone();
            let fetched = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Ok(JobStatus::Cancelled),
                fetched = self.fetch(&job_id, Some(cancel)) => fetched,
                _ = tokio::time::sleep_until(deadline) => {
                    info!(job_id = %handle.id, progress, "Deadline reached during provider call");
                    return Ok(JobStatus::TimedOut { progress });
                }
            };
            let status = match self.settle(handle, fetched).await {
                Err(GenmediaError::Cancelled) => return Ok(JobStatus::Cancelled),
                other => other?,
            };

            if status.is_terminal() {
                return Ok(status);
            }
            progress = progress.max(status.progress());

            let now = Instant::now();
            if now >= deadline {
                info!(job_id = %handle.id, progress, "Stopped waiting for job");
                return Ok(JobStatus::TimedOut { progress });
            }

            let pause = poll_interval.min(deadline - now);
            debug!(job_id = %handle.id, progress, "Job still processing");
            tokio::select! {
                _ = tokio::time::sleep(pause) => {}
                _ = cancel.cancelled() => return Ok(JobStatus::Cancelled),
            }
        }
    }

    /// Ask the provider, retrying quota failures.
    async fn fetch(
        &self,
        job_id: &str,
        cancel: Option<&CancellationToken>,
    ) -> Result<(ProviderPoll, u32)> {
        self.retry
            .run("poll", cancel, || self.provider.poll(job_id))
            .await
    }

    /// Fold one provider answer into the handle.
    async fn settle(
        &self,
        handle: &mut JobHandle,
        fetched: Result<(ProviderPoll, u32)>,
    ) -> Result<JobStatus> {
        let poll = match fetched {
            Ok((poll, attempts)) => {
                handle.record_attempts(attempts);
                poll
            }
            Err(GenmediaError::RetryExhausted { attempts, last }) => {
                handle.record_attempts(attempts);
                let status = JobStatus::Failed {
                    reason: last.root_cause().to_string(),
                };
                handle.finish(status.clone());
                return Ok(status);
            }
            Err(e) => return Err(e),
        };

        let mut status = interpret_poll(&poll);
        match &mut status {
            JobStatus::Complete(artifact) => {
                artifact.stored = self.persist_once(handle, &artifact.payload).await;
                info!(
                    job_id = %handle.id,
                    stored = artifact.stored.is_some(),
                    "Generation job complete"
                );
            }
            JobStatus::Failed { reason } => {
                warn!(job_id = %handle.id, reason = %reason, "Generation job failed");
            }
            _ => {}
        }

        if status.is_terminal() {
            handle.finish(status.clone());
        }
        Ok(status)
    }

    /// The single write attempt for a completed handle. Failures are reported
    /// and swallowed: the generation itself succeeded.
    async fn persist_once(
        &self,
        handle: &mut JobHandle,
        payload: &ArtifactPayload,
    ) -> Option<ArtifactId> {
        match handle.persistence() {
            Persistence::Pending => {}
            Persistence::Stored { artifact_id } => return Some(artifact_id.clone()),
            _ => return None,
        }

        let ArtifactPayload::Inline {
            data_base64,
            mime_type,
        } = payload
        else {
            handle.set_persistence(Persistence::NotApplicable);
            return None;
        };

        let outcome = match decode_base64(data_base64) {
            Ok(bytes) => {
                self.store
                    .put(NewArtifact {
                        bytes,
                        kind: handle.kind,
                        owner_id: handle.owner_id.clone(),
                        prompt: Some(handle.prompt.clone()).filter(|p| !p.is_empty()),
                        mime_type: Some(mime_type.clone()),
                        source: ArtifactSource::Generated,
                        source_job: Some(handle.id.clone()),
                    })
                    .await
            }
            Err(e) => Err(e),
        };

        match outcome {
            Ok(artifact_id) => {
                info!(job_id = %handle.id, artifact_id = %artifact_id, "Saved generated artifact");
                handle.set_persistence(Persistence::Stored {
                    artifact_id: artifact_id.clone(),
                });
                Some(artifact_id)
            }
            Err(e) => {
                warn!(
                    job_id = %handle.id,
                    error = %e,
                    "Generated artifact could not be saved; returning it unsaved"
                );
                handle.set_persistence(Persistence::Failed {
                    reason: e.to_string(),
                });
                None
            }
        }
    }
}
