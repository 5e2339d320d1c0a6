use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{error, warn};

use genmedia_core::config::RetryConfig;
use genmedia_core::error::{ErrorKind, GenmediaError, Result};

/// What to do after a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Sleep for `delay`, then try again.
    Retry { delay: Duration },
    /// Deterministic failure: surface the error as-is.
    GiveUp,
    /// Retryable failure, but the attempt ceiling is reached.
    Exhausted,
}

impl RetryDecision {
    pub fn should_retry(&self) -> bool {
        matches!(self, RetryDecision::Retry { .. })
    }
}

/// Exponential backoff for quota errors. Pure: no clock, no sleeping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: u32,
    initial_delay: Duration,
    max_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, initial_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            initial_delay,
            max_delay,
        }
    }

    pub fn from_config(config: &RetryConfig) -> Self {
        Self::new(
            config.max_attempts,
            Duration::from_millis(config.initial_delay_ms),
            Duration::from_millis(config.max_delay_ms),
        )
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Decide after the zero-based `attempt` failed with `kind`.
    pub fn decide(&self, attempt: u32, kind: ErrorKind) -> RetryDecision {
        if !kind.is_retryable() {
            return RetryDecision::GiveUp;
        }
        if attempt.saturating_add(1) >= self.max_attempts {
            return RetryDecision::Exhausted;
        }
        RetryDecision::Retry {
            delay: self.backoff(attempt),
        }
    }

    /// `min(initial * 2^attempt, max)`.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let initial_ms = self.initial_delay.as_millis() as u64;
        let factor = 1u64.checked_shl(attempt).unwrap_or(u64::MAX);
        let ms = initial_ms.saturating_mul(factor);
        Duration::from_millis(ms).min(self.max_delay)
    }

    /// Drive `call` until it succeeds, fails deterministically, or the
    /// attempt ceiling is hit. Returns the value and the attempts consumed.
    ///
    /// Backoff sleeps are cooperative and abort with `Cancelled` when `cancel`
    /// fires.
    pub async fn run<T, F, Fut>(
        &self,
        operation: &str,
        cancel: Option<&CancellationToken>,
        mut call: F,
    ) -> Result<(T, u32)>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt = 0u32;
        loop {
            let err = match call().await {
                Ok(value) => return Ok((value, attempt + 1)),
                Err(e) => e,
            };

            match self.decide(attempt, err.kind()) {
                RetryDecision::GiveUp => return Err(err),
                RetryDecision::Exhausted => {
                    error!(
                        operation,
                        attempts = attempt + 1,
                        error = %err,
                        "All retries exhausted"
                    );
                    return Err(GenmediaError::RetryExhausted {
                        attempts: attempt + 1,
                        last: Box::new(err),
                    });
                }
                RetryDecision::Retry { delay } => {
                    warn!(
                        operation,
                        attempt = attempt + 1,
                        max_attempts = self.max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "Retrying provider call"
                    );
                    match cancel {
                        Some(token) => {
                            tokio::select! {
                                _ = tokio::time::sleep(delay) => {}
                                _ = token.cancelled() => return Err(GenmediaError::Cancelled),
                            }
                        }
                        None => tokio::time::sleep(delay).await,
                    }
                    attempt += 1;
                }
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&RetryConfig::default())
    }
}
