use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::{GenerationBackend, GenerationRequest};
use crate::cancel::CancellationToken;
use crate::error::BackendError;

/// What to do when a chunk's retries are exhausted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExhaustionPolicy {
    /// Abort the whole document
    FailFast,
    /// Substitute the original text and continue
    Degrade,
}

/// Retry policy for backend calls
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Total calls per request, first attempt included
    pub max_attempts: u32,
    /// Delay before the first retry
    pub backoff_ms: u64,
    /// Growth factor between retries
    pub backoff_multiplier: f64,
    /// Upper bound on a single delay
    pub max_backoff_ms: u64,
    /// Timeout applied to each call; `None` waits indefinitely
    pub call_timeout_ms: Option<u64>,
    pub on_exhaustion: ExhaustionPolicy,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_ms: 1000,
            backoff_multiplier: 2.0,
            max_backoff_ms: 30_000,
            call_timeout_ms: Some(180_000),
            on_exhaustion: ExhaustionPolicy::Degrade,
        }
    }
}

impl RetryPolicy {
    /// Delay after the given failed attempt (1-based); a server's
    /// `retry_after` is honored up to `max_backoff_ms`
    pub fn delay_after(&self, attempt: u32, error: &BackendError) -> Duration {
        let exponent = attempt.saturating_sub(1).min(32) as i32;
        let scaled = self.backoff_ms as f64 * self.backoff_multiplier.max(1.0).powi(exponent);
        let ceiling = Duration::from_millis(self.max_backoff_ms);
        let delay = Duration::from_millis(scaled.min(self.max_backoff_ms as f64) as u64);

        match error {
            BackendError::RateLimited {
                retry_after: Some(wait),
            } => delay.max((*wait).min(ceiling)),
            _ => delay,
        }
    }

    pub fn call_timeout(&self) -> Option<Duration> {
        self.call_timeout_ms.map(Duration::from_millis)
    }
}

/// Why a retried call gave up
#[derive(Debug, Clone)]
pub struct CallFailure {
    pub error: BackendError,
    /// Calls actually issued
    pub attempts: u32,
}

/// Call the backend until `accept` takes the output, the error is not
/// retryable, attempts run out, or the token is cancelled.
///
/// `accept` validates raw output; returning `Err` (usually `Malformed`)
/// counts as a failed attempt. Returns the accepted value and the number
/// of calls made.
pub async fn call_with_retry<T, F>(
    backend: &dyn GenerationBackend,
    request: &GenerationRequest,
    policy: &RetryPolicy,
    cancel: &CancellationToken,
    label: &str,
    mut accept: F,
) -> Result<(T, u32), CallFailure>
where
    F: FnMut(&str) -> Result<T, BackendError>,
{
    let mut last_error = BackendError::Permanent("no attempts allowed".to_string());

    for attempt in 1..=policy.max_attempts {
        if cancel.is_cancelled() {
            return Err(CallFailure {
                error: BackendError::Cancelled,
                attempts: attempt - 1,
            });
        }
        if attempt > 1 {
            info!(
                "{}: retry {} of {}",
                label,
                attempt - 1,
                policy.max_attempts - 1
            );
        }

        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(BackendError::Cancelled),
            result = call_once(backend, request, policy.call_timeout()) => result,
        };

        let error = match outcome.and_then(|output| accept(&output)) {
            Ok(value) => return Ok((value, attempt)),
            Err(error) => error,
        };

        if matches!(error, BackendError::Cancelled) || !error.is_retryable() {
            warn!("{}: attempt {} failed, not retrying: {}", label, attempt, error);
            return Err(CallFailure {
                error,
                attempts: attempt,
            });
        }

        warn!("{}: attempt {} failed: {}", label, attempt, error);

        if attempt < policy.max_attempts {
            let delay = policy.delay_after(attempt, &error);
            tokio::select! {
                _ = cancel.cancelled() => {
                    return Err(CallFailure {
                        error: BackendError::Cancelled,
                        attempts: attempt,
                    });
                }
                _ = tokio::time::sleep(delay) => {}
            }
        }

        last_error = error;
    }

    Err(CallFailure {
        error: last_error,
        attempts: policy.max_attempts,
    })
}

async fn call_once(
    backend: &dyn GenerationBackend,
    request: &GenerationRequest,
    timeout: Option<Duration>,
) -> Result<String, BackendError> {
    match timeout {
        Some(limit) => tokio::time::timeout(limit, backend.generate(request))
            .await
            .unwrap_or(Err(BackendError::Timeout(limit))),
        None => backend.generate(request).await,
    }
}
