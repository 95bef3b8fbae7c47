//! Error/Retry Envelope (C13): exponential backoff with jitter around calls
//! to the LLM, `VectorBackend`, and `WebBackend`.
//!
//! Grounded on the aggregator's `retry_handler` (`max_retries=3,
//! base_delay=1.0, max_delay=10.0, exponential_base=2.0, jitter=True`) and
//! on §4.13's envelope contract.

use crate::error::{RagError, Result};
use rand::Rng;
use std::future::Future;
use std::time::Duration;
use tracing::warn;

/// Configuration for the retry envelope.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub factor: f64,
    /// Jitter multiplier range applied to each computed delay.
    pub jitter_range: (f64, f64),
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(10),
            factor: 2.0,
            jitter_range: (0.5, 1.5),
        }
    }
}

impl RetryConfig {
    fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let raw = self.base_delay.as_secs_f64() * self.factor.powi(attempt as i32);
        let capped = raw.min(self.max_delay.as_secs_f64());
        let jitter = rand::thread_rng().gen_range(self.jitter_range.0..=self.jitter_range.1);
        Duration::from_secs_f64(capped * jitter)
    }
}

/// Execute `operation` under the retry envelope. Non-retryable errors (see
/// [`RagError::is_retryable`]) propagate on the first attempt; retryable
/// errors are retried up to `config.max_retries` times with backoff+jitter
/// between attempts. On exhaustion, the last observed error is returned so
/// the caller can decide a fallback.
pub async fn retry_with_backoff<T, F, Fut>(config: &RetryConfig, mut operation: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt = 0;
    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(err) if !err.is_retryable() => return Err(err),
            Err(err) => {
                if attempt >= config.max_retries {
                    warn!(
                        attempt,
                        error = %err,
                        "retry envelope exhausted"
                    );
                    return Err(err);
                }
                let delay = config.delay_for_attempt(attempt);
                warn!(attempt, delay_ms = delay.as_millis() as u64, error = %err, "retrying after backoff");
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}

/// Outcome of a retry-enveloped call, matching §4.13's
/// `(ok, result, message)` tuple contract for callers that want to inspect
/// success without matching on the error type.
pub struct RetryOutcome<T> {
    pub ok: bool,
    pub result: Option<T>,
    pub message: Option<String>,
}

impl<T> RetryOutcome<T> {
    #[must_use]
    pub fn success(value: T) -> Self {
        Self {
            ok: true,
            result: Some(value),
            message: None,
        }
    }

    #[must_use]
    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            ok: false,
            result: None,
            message: Some(message.into()),
        }
    }
}

/// Run `operation` under the retry envelope and collapse the result into a
/// [`RetryOutcome`] rather than propagating the error.
pub async fn retry_to_outcome<T, F, Fut>(config: &RetryConfig, operation: F) -> RetryOutcome<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    match retry_with_backoff(config, operation).await {
        Ok(value) => RetryOutcome::success(value),
        Err(err) => RetryOutcome::failure(err.to_string()),
    }
}

/// Classify a raw error condition into a `RagError` suitable for the
/// envelope's retryability check. Backend adapters should prefer
/// constructing `RagError` directly where possible; this exists for
/// collaborators that surface only a transport status.
#[must_use]
pub fn classify_transport_error(message: impl Into<String>, is_5xx_or_timeout: bool) -> RagError {
    if is_5xx_or_timeout {
        RagError::backend_unavailable(message)
    } else {
        RagError::invalid_input(message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast_config() -> RetryConfig {
        RetryConfig {
            max_retries: 3,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(5),
            factor: 2.0,
            jitter_range: (1.0, 1.0),
        }
    }

    #[tokio::test]
    async fn succeeds_without_retry() {
        let calls = AtomicU32::new(0);
        let result = retry_with_backoff(&fast_config(), || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Ok::<_, RagError>(42) }
        })
        .await;
        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn retries_then_succeeds() {
        let calls = AtomicU32::new(0);
        let result = retry_with_backoff(&fast_config(), || {
            let attempt = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if attempt < 2 {
                    Err(RagError::backend_unavailable("transient"))
                } else {
                    Ok(99)
                }
            }
        })
        .await;
        assert_eq!(result.unwrap(), 99);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn exhausts_after_max_retries() {
        let calls = AtomicU32::new(0);
        let result: Result<i32> = retry_with_backoff(&fast_config(), || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(RagError::backend_unavailable("down")) }
        })
        .await;
        assert!(result.is_err());
        // one initial attempt + max_retries retries
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn non_retryable_short_circuits_immediately() {
        let calls = AtomicU32::new(0);
        let result: Result<i32> = retry_with_backoff(&fast_config(), || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(RagError::invalid_input("bad")) }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn outcome_wraps_success_and_failure() {
        let ok: RetryOutcome<i32> = retry_to_outcome(&fast_config(), || async { Ok(1) }).await;
        assert!(ok.ok);
        assert_eq!(ok.result, Some(1));

        let err: RetryOutcome<i32> =
            retry_to_outcome(&fast_config(), || async { Err(RagError::invalid_input("bad")) })
                .await;
        assert!(!err.ok);
        assert!(err.message.is_some());
    }
}
