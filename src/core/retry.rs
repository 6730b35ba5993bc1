//! Bounded exponential-backoff retry for rate-limited provider calls.
//!
//! Only rate-limit failures are retried. Anything else is surfaced to the
//! caller on the first occurrence so a misconfigured key or a malformed
//! request does not burn through the attempt budget.

use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Default attempt budget for synthesis calls.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Default delay before the first retry (milliseconds).
pub const DEFAULT_INITIAL_DELAY_MS: u64 = 1000;

/// Errors that can tell the retry loop whether they are worth retrying.
pub trait RetryClassify {
    /// `true` when the provider asked the caller to slow down.
    fn is_rate_limited(&self) -> bool;
}

/// Retry policy. Stateless and reusable across invocations.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total number of calls allowed, including the first one.
    /// Default: 3
    pub max_attempts: u32,

    /// Wait before the first retry (milliseconds).
    /// Default: 1000ms
    pub initial_delay_ms: u64,

    /// Multiplier applied per retry.
    /// Default: 2.0
    pub backoff_multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            initial_delay_ms: DEFAULT_INITIAL_DELAY_MS,
            backoff_multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    /// Create a doubling policy with the given budget.
    pub fn new(max_attempts: u32, initial_delay: Duration) -> Self {
        Self {
            max_attempts,
            initial_delay_ms: initial_delay.as_millis() as u64,
            ..Default::default()
        }
    }

    /// Delay to wait after the given failed attempt (1-based):
    /// `initial_delay * multiplier^(attempt-1)`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let base = self.initial_delay_ms as f64;
        let delay = base * self.backoff_multiplier.powi(attempt.saturating_sub(1) as i32);
        Duration::from_millis(delay as u64)
    }

    /// Whether another call is allowed after `attempt` calls were made.
    pub fn should_retry(&self, attempt: u32) -> bool {
        attempt < self.max_attempts
    }

    /// Run `operation` under this policy. See [`with_retry`].
    pub async fn run<T, E, F, Fut>(&self, operation: F) -> Result<T, E>
    where
        E: RetryClassify + std::fmt::Display,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        retry_with_policy(self, operation).await
    }
}

/// Invoke `operation`, retrying rate-limited failures with doubling backoff.
///
/// After failed attempt `n` (1-based) the loop sleeps
/// `initial_delay * 2^(n-1)` before trying again, as long as fewer than
/// `max_attempts` calls were made. The sleep is a tokio timer, so other tasks
/// keep running. Non-rate-limit failures return immediately; exhausting the
/// budget returns the last failure.
pub async fn with_retry<T, E, F, Fut>(
    operation: F,
    max_attempts: u32,
    initial_delay: Duration,
) -> Result<T, E>
where
    E: RetryClassify + std::fmt::Display,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let policy = RetryPolicy::new(max_attempts, initial_delay);
    retry_with_policy(&policy, operation).await
}

async fn retry_with_policy<T, E, F, Fut>(policy: &RetryPolicy, mut operation: F) -> Result<T, E>
where
    E: RetryClassify + std::fmt::Display,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let mut attempt: u32 = 0;

    loop {
        attempt += 1;
        match operation().await {
            Ok(value) => {
                if attempt > 1 {
                    debug!("Call succeeded on attempt {}", attempt);
                }
                return Ok(value);
            }
            Err(e) if e.is_rate_limited() && policy.should_retry(attempt) => {
                let delay = policy.delay_for(attempt);
                warn!(
                    "Rate limited on attempt {}/{}: {}. Retrying in {}ms",
                    attempt,
                    policy.max_attempts,
                    e,
                    delay.as_millis()
                );
                tokio::time::sleep(delay).await;
            }
            Err(e) => {
                if e.is_rate_limited() {
                    warn!("Rate limit persisted after {} attempts: {}", attempt, e);
                } else {
                    debug!("Non-retryable failure on attempt {}: {}", attempt, e);
                }
                return Err(e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tokio::time::Instant;

    #[derive(Debug, PartialEq)]
    enum TestError {
        Limited,
        Broken,
    }

    impl std::fmt::Display for TestError {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            match self {
                TestError::Limited => write!(f, "429 too many requests"),
                TestError::Broken => write!(f, "bad request"),
            }
        }
    }

    impl RetryClassify for TestError {
        fn is_rate_limited(&self) -> bool {
            matches!(self, TestError::Limited)
        }
    }

    #[test]
    fn test_default_policy() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_attempts, 3);
        assert_eq!(policy.initial_delay_ms, 1000);
        assert_eq!(policy.backoff_multiplier, 2.0);
    }

    #[test]
    fn test_delay_doubles() {
        let policy = RetryPolicy::new(5, Duration::from_millis(100));
        assert_eq!(policy.delay_for(1), Duration::from_millis(100));
        assert_eq!(policy.delay_for(2), Duration::from_millis(200));
        assert_eq!(policy.delay_for(3), Duration::from_millis(400));
    }

    #[test]
    fn test_should_retry() {
        let policy = RetryPolicy::new(3, Duration::from_millis(1));
        assert!(policy.should_retry(1));
        assert!(policy.should_retry(2));
        assert!(!policy.should_retry(3));
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limited_twice_then_succeeds() {
        let calls = Arc::new(AtomicU32::new(0));
        let start = Instant::now();

        let counter = calls.clone();
        let result = with_retry(
            move || {
                let counter = counter.clone();
                async move {
                    let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
                    if n <= 2 { Err(TestError::Limited) } else { Ok(n) }
                }
            },
            3,
            Duration::from_millis(100),
        )
        .await;

        assert_eq!(result, Ok(3));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        // 100ms + 200ms of backoff
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_millis(300) && elapsed < Duration::from_millis(310));
    }

    #[tokio::test(start_paused = true)]
    async fn test_non_rate_limit_failure_is_not_retried() {
        let calls = Arc::new(AtomicU32::new(0));
        let start = Instant::now();

        let counter = calls.clone();
        let result: Result<(), TestError> = with_retry(
            move || {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err(TestError::Broken)
                }
            },
            3,
            Duration::from_millis(100),
        )
        .await;

        assert_eq!(result, Err(TestError::Broken));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(start.elapsed() < Duration::from_millis(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_attempts_return_last_failure() {
        let calls = Arc::new(AtomicU32::new(0));
        let start = Instant::now();

        let counter = calls.clone();
        let result: Result<(), TestError> = with_retry(
            move || {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err(TestError::Limited)
                }
            },
            3,
            Duration::from_millis(50),
        )
        .await;

        assert_eq!(result, Err(TestError::Limited));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        // No sleep after the final attempt
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_millis(150) && elapsed < Duration::from_millis(160));
    }

    #[tokio::test(start_paused = true)]
    async fn test_policy_run() {
        let policy = RetryPolicy::new(2, Duration::from_millis(10));
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let result = policy
            .run(move || {
                let counter = counter.clone();
                async move {
                    if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                        Err(TestError::Limited)
                    } else {
                        Ok("done")
                    }
                }
            })
            .await;
        tokio_test::assert_ok!(result);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
