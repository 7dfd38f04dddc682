use std::future::Future;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

/// Attempt budget and backoff seed for [`with_retry`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total number of runs, including the first one.
    pub max_attempts: u32,
    /// Wait after the first failure; doubled after every further failure.
    pub initial_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, initial_delay: Duration) -> Self {
        Self {
            max_attempts,
            initial_delay,
        }
    }

    /// Backoff after the given (1-indexed) failed attempt: `initial_delay * 2^(attempt-1)`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.initial_delay.saturating_mul(factor)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_secs(1))
    }
}

#[derive(Debug, Error)]
pub enum RetryError {
    #[error("{label}: exhausted retries after {attempts} attempt(s): {last_error:#}")]
    ExhaustedRetries {
        label: String,
        attempts: u32,
        last_error: anyhow::Error,
    },
}

impl RetryError {
    pub fn last_error(&self) -> &anyhow::Error {
        match self {
            RetryError::ExhaustedRetries { last_error, .. } => last_error,
        }
    }
}

/// Retries an async operation with exponential backoff
///
/// # Parameters
/// - `label`: Name used in logs and in the final error (usually the source name)
/// - `policy`: Attempt budget and initial delay
/// - `operation`: Closure returning a future
///
/// # Returns
/// Either the first successful result or [`RetryError::ExhaustedRetries`]
/// wrapping the error of the last attempt. Earlier failures are only logged.
pub async fn with_retry<F, Fut, T>(
    label: &str,
    policy: RetryPolicy,
    mut operation: F,
) -> Result<T, RetryError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = anyhow::Result<T>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 1;
    loop {
        match operation().await {
            Ok(val) => {
                if attempt > 1 {
                    debug!(source = label, attempt, "Succeeded after retry");
                }
                return Ok(val);
            }
            Err(err) if attempt >= max_attempts => {
                return Err(RetryError::ExhaustedRetries {
                    label: label.to_string(),
                    attempts: attempt,
                    last_error: err,
                });
            }
            Err(err) => {
                let delay = policy.delay_for(attempt);
                warn!(
                    source = label,
                    attempt,
                    max_attempts,
                    ?delay,
                    "Attempt failed: {err:#}. Retrying..."
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tokio::time::Instant;

    #[test]
    fn test_delay_doubles_per_attempt() {
        let policy = RetryPolicy::new(5, Duration::from_millis(250));
        assert_eq!(policy.delay_for(1), Duration::from_millis(250));
        assert_eq!(policy.delay_for(2), Duration::from_millis(500));
        assert_eq!(policy.delay_for(3), Duration::from_secs(1));
        assert_eq!(policy.delay_for(4), Duration::from_secs(2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_always_failing_runs_exactly_max_attempts() {
        let calls = AtomicU32::new(0);
        let started = Instant::now();

        let result: Result<(), _> = with_retry("flaky", RetryPolicy::default(), || {
            let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
            async move { Err(anyhow!("failure on attempt {n}")) }
        })
        .await;

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        let err = result.unwrap_err();
        assert_eq!(err.last_error().to_string(), "failure on attempt 3");
        assert!(err.to_string().contains("exhausted retries after 3 attempt(s)"));
        assert!(err.to_string().starts_with("flaky:"));

        // 1s after the first failure, 2s after the second, none after the last.
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_secs(3), "{elapsed:?}");
        assert!(elapsed < Duration::from_secs(4), "{elapsed:?}");
    }

    #[tokio::test(start_paused = true)]
    async fn test_stops_after_first_success() {
        let calls = AtomicU32::new(0);

        let result = with_retry("recovering", RetryPolicy::new(5, Duration::from_secs(1)), || {
            let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
            async move {
                if n < 2 {
                    Err(anyhow!("not yet"))
                } else {
                    Ok(n)
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), 2);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_delay_saturates_for_long_backoff() {
        let policy = RetryPolicy::new(u32::MAX, Duration::from_secs(u64::MAX / 4));
        assert_eq!(policy.delay_for(4), Duration::MAX);
        assert_eq!(policy.delay_for(u32::MAX), Duration::MAX);
    }

    #[test_log::test(tokio::test(start_paused = true))]
    async fn test_retry_with_delay_beyond_millisecond_range() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::new(2, Duration::from_secs(u64::MAX / 2));

        let result = with_retry("glacial", policy, || {
            let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
            async move {
                if n == 1 {
                    Err(anyhow!("first attempt"))
                } else {
                    Ok(n)
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_immediate_success_does_not_retry() {
        let calls = AtomicU32::new(0);
        let result = with_retry("steady", RetryPolicy::default(), || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Ok::<_, anyhow::Error>("ok") }
        })
        .await;
        assert_eq!(result.unwrap(), "ok");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_zero_attempts_still_runs_once() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = with_retry("once", RetryPolicy::new(0, Duration::ZERO), || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(anyhow!("boom")) }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
