//! Retry policy with exponential backoff.
//!
//! Only rate-limited and server failures are retried. The delay before retry
//! `n` (1-indexed) is `base_delay * 2^(n-1)`, raised to a server `Retry-After`
//! hint when one is given, and always capped at `max_delay`.

use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::ClientConfig;
use crate::error::{Error, Result};

/// Retry policy implementation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Maximum number of retries after the first attempt
    pub max_retries: u32,
    /// Delay before the first retry
    pub base_delay: Duration,
    /// Maximum delay between retries
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: ClientConfig::DEFAULT_MAX_RETRIES,
            base_delay: ClientConfig::DEFAULT_RETRY_BASE_DELAY,
            max_delay: ClientConfig::DEFAULT_RETRY_MAX_DELAY,
        }
    }
}

impl RetryPolicy {
    /// Create a new retry policy
    pub fn new(max_retries: u32, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_retries,
            base_delay,
            max_delay,
        }
    }

    /// A policy that never retries.
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    pub(crate) fn from_config(config: &ClientConfig) -> Self {
        Self::new(
            config.max_retries,
            config.retry_base_delay,
            config.retry_max_delay,
        )
    }

    /// Delay before retry `retry` (1-indexed), without any server hint.
    pub fn delay_for_retry(&self, retry: u32) -> Duration {
        let exponent = retry.saturating_sub(1).min(31);
        self.base_delay
            .checked_mul(1u32 << exponent)
            .map_or(self.max_delay, |delay| delay.min(self.max_delay))
    }

    /// Delay before retrying `error`, honoring its `Retry-After` hint.
    pub fn delay_for_error(&self, retry: u32, error: &Error) -> Duration {
        let delay = self.delay_for_retry(retry);
        match error.retry_after() {
            Some(hint) => delay.max(hint).min(self.max_delay),
            None => delay,
        }
    }

    /// Run `operation` until it succeeds, fails permanently, or the retry
    /// budget is spent. The operation receives the 1-indexed attempt number.
    ///
    /// # Errors
    /// Returns the last error unchanged.
    pub async fn execute<F, Fut, T>(&self, mut operation: F) -> Result<T>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt = 1;
        loop {
            match operation(attempt).await {
                Ok(value) => {
                    if attempt > 1 {
                        debug!(attempt, "Retry succeeded");
                    }
                    return Ok(value);
                }
                Err(error) => {
                    if !error.is_retryable() || attempt > self.max_retries {
                        return Err(error);
                    }

                    let delay = self.delay_for_error(attempt, &error);
                    warn!(
                        attempt,
                        max_retries = self.max_retries,
                        delay_ms = delay.as_millis() as u64,
                        error = %error,
                        "Retrying after error"
                    );

                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ErrorKind;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn policy(max_retries: u32) -> RetryPolicy {
        RetryPolicy::new(max_retries, Duration::from_millis(100), Duration::from_secs(2))
    }

    #[test]
    fn test_exponential_delays() {
        let policy = policy(5);
        assert_eq!(policy.delay_for_retry(1), Duration::from_millis(100));
        assert_eq!(policy.delay_for_retry(2), Duration::from_millis(200));
        assert_eq!(policy.delay_for_retry(3), Duration::from_millis(400));
        assert_eq!(policy.delay_for_retry(5), Duration::from_millis(1600));
        assert_eq!(policy.delay_for_retry(6), Duration::from_secs(2));
        assert_eq!(policy.delay_for_retry(u32::MAX), Duration::from_secs(2));
    }

    #[test]
    fn test_retry_after_hint_raises_delay_within_cap() {
        let policy = policy(3);
        let hinted = Error::from_response(429, b"", None, Some(Duration::from_millis(700)));
        assert_eq!(policy.delay_for_error(1, &hinted), Duration::from_millis(700));

        let small_hint = Error::from_response(429, b"", None, Some(Duration::from_millis(10)));
        assert_eq!(policy.delay_for_error(2, &small_hint), Duration::from_millis(200));

        let huge_hint = Error::from_response(503, b"", None, Some(Duration::from_secs(120)));
        assert_eq!(policy.delay_for_error(1, &huge_hint), Duration::from_secs(2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_until_success() {
        let calls = AtomicU32::new(0);
        let result = policy(3)
            .execute(|attempt| {
                calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if attempt < 3 {
                        Err(Error::from_response(500, b"boom", None, None))
                    } else {
                        Ok(attempt)
                    }
                }
            })
            .await;

        assert_eq!(result.unwrap(), 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_non_retryable_error_returns_immediately() {
        let calls = AtomicU32::new(0);
        let result: Result<()> = policy(5)
            .execute(|_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(Error::from_response(401, b"bad key", None, None)) }
            })
            .await;

        assert_eq!(result.unwrap_err().kind(), ErrorKind::Authentication);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhaustion_surfaces_last_error() {
        let calls = AtomicU32::new(0);
        let result: Result<()> = policy(2)
            .execute(|attempt| {
                calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    Err(Error::from_response(503, format!("attempt {attempt}").as_bytes(), None, None))
                }
            })
            .await;

        let err = result.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Server);
        assert_eq!(err.message(), "attempt 3");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_retries_makes_one_attempt() {
        let calls = AtomicU32::new(0);
        let result: Result<()> = RetryPolicy::none()
            .execute(|_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(Error::from_response(429, b"", None, None)) }
            })
            .await;

        assert_eq!(result.unwrap_err().kind(), ErrorKind::RateLimited);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
