//! Bounded retry for store I/O.
//!
//! Only `StoreUnavailable` is retried; every other error is returned on the
//! first attempt. Backoff doubles from `initial_backoff_ms` up to
//! `max_backoff_ms`. The cancellation token is checked before every attempt,
//! while a call is in flight, and during backoff sleeps.

use std::future::Future;
use std::time::Duration;

use ontobase_ontology::{OntoError, Result};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff_ms: 50,
            max_backoff_ms: 1_000,
        }
    }
}

impl RetryPolicy {
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Delay after failed attempt number `attempt` (1-based).
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 1u64 << attempt.saturating_sub(1).min(20);
        let ms = self
            .initial_backoff_ms
            .saturating_mul(factor)
            .min(self.max_backoff_ms);
        Duration::from_millis(ms)
    }
}

pub async fn with_retry<T, F, Fut>(
    policy: &RetryPolicy,
    cancel: &CancellationToken,
    operation: &str,
    mut call: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 0u32;

    loop {
        if cancel.is_cancelled() {
            return Err(OntoError::Cancelled);
        }
        attempt += 1;

        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(OntoError::Cancelled),
            outcome = call() => outcome,
        };

        match outcome {
            Ok(value) => return Ok(value),
            Err(OntoError::StoreUnavailable { message, .. }) if attempt < max_attempts => {
                let delay = policy.backoff(attempt);
                tracing::warn!(
                    operation,
                    attempt,
                    max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %message,
                    "store unavailable; retrying"
                );
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return Err(OntoError::Cancelled),
                    _ = tokio::time::sleep(delay) => {}
                }
            }
            Err(OntoError::StoreUnavailable { message, .. }) => {
                return Err(OntoError::StoreUnavailable {
                    attempts: attempt,
                    message,
                });
            }
            Err(other) => return Err(other),
        }
    }
}
