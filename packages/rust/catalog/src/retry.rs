//! Retry with exponential backoff for transient catalog failures.
//!
//! Only errors classified [`Severity::Retryable`] are retried; everything
//! else surfaces immediately. The delay after attempt `n` (zero-based) is
//! `base_delay * 2^n`, and no delay follows the final attempt.

use std::time::Duration;

use tracing::warn;

use kbsync_shared::{Result, Severity};

/// Attempt count and backoff base for retryable operations.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Total attempts, including the first (minimum 1).
    pub max_attempts: u32,
    /// Delay before the first retry; doubles each attempt.
    pub base_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
        }
    }

    /// Backoff delay after the given zero-based attempt.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay * 2u32.saturating_pow(attempt)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_millis(1000))
    }
}

/// Source of delay between attempts. Abstracted so backoff sequences can be
/// asserted in tests without waiting on the clock.
#[allow(async_fn_in_trait)]
pub trait Sleeper {
    async fn sleep(&self, duration: Duration);
}

/// Production sleeper backed by the tokio timer.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioSleeper;

impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Runs an operation under a [`RetryPolicy`].
pub struct RetryExecutor<S = TokioSleeper> {
    policy: RetryPolicy,
    sleeper: S,
}

impl RetryExecutor<TokioSleeper> {
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            policy,
            sleeper: TokioSleeper,
        }
    }
}

impl<S: Sleeper> RetryExecutor<S> {
    pub fn with_sleeper(policy: RetryPolicy, sleeper: S) -> Self {
        Self { policy, sleeper }
    }

    /// Run `operation` until it succeeds, a non-retryable error occurs, or
    /// attempts are exhausted. The last error is returned as-is so callers
    /// keep its severity.
    pub async fn execute<T, F, Fut>(&self, operation_name: &str, mut operation: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt = 0u32;

        loop {
            match operation().await {
                Ok(value) => return Ok(value),
                Err(err) if err.severity() == Severity::Retryable => {
                    attempt += 1;
                    if attempt >= self.policy.max_attempts {
                        warn!(
                            operation = operation_name,
                            attempts = attempt,
                            error = %err,
                            "retries exhausted"
                        );
                        return Err(err);
                    }

                    let delay = self.policy.delay_for(attempt - 1);
                    warn!(
                        operation = operation_name,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "transient failure, backing off"
                    );
                    self.sleeper.sleep(delay).await;
                }
                Err(err) => return Err(err),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::Mutex;
    use std::sync::atomic::{AtomicU32, Ordering};

    use kbsync_shared::KbSyncError;

    /// Records requested delays instead of sleeping.
    #[derive(Default)]
    struct RecordingSleeper {
        delays: Mutex<Vec<Duration>>,
    }

    impl Sleeper for &RecordingSleeper {
        async fn sleep(&self, duration: Duration) {
            self.delays.lock().unwrap().push(duration);
        }
    }

    fn transient() -> KbSyncError {
        KbSyncError::Server {
            status: 503,
            message: "unavailable".into(),
        }
    }

    #[tokio::test]
    async fn succeeds_without_retry() {
        let sleeper = RecordingSleeper::default();
        let executor =
            RetryExecutor::with_sleeper(RetryPolicy::new(3, Duration::from_millis(100)), &sleeper);

        let result: Result<i32> = executor.execute("op", || async { Ok(42) }).await;

        assert_eq!(result.unwrap(), 42);
        assert!(sleeper.delays.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn backoff_doubles_per_attempt() {
        let sleeper = RecordingSleeper::default();
        let executor =
            RetryExecutor::with_sleeper(RetryPolicy::new(4, Duration::from_millis(100)), &sleeper);
        let calls = AtomicU32::new(0);

        let result: Result<&str> = executor
            .execute("op", || {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n < 3 {
                        Err(transient())
                    } else {
                        Ok("done")
                    }
                }
            })
            .await;

        assert_eq!(result.unwrap(), "done");
        assert_eq!(calls.load(Ordering::SeqCst), 4);
        assert_eq!(
            *sleeper.delays.lock().unwrap(),
            vec![
                Duration::from_millis(100),
                Duration::from_millis(200),
                Duration::from_millis(400),
            ]
        );
    }

    #[tokio::test]
    async fn no_delay_after_final_attempt() {
        let sleeper = RecordingSleeper::default();
        let executor =
            RetryExecutor::with_sleeper(RetryPolicy::new(3, Duration::from_millis(100)), &sleeper);

        let result: Result<()> = executor.execute("op", || async { Err(transient()) }).await;

        assert!(matches!(result, Err(KbSyncError::Server { .. })));
        // 3 attempts, delays only between them.
        assert_eq!(sleeper.delays.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn non_retryable_errors_surface_immediately() {
        let sleeper = RecordingSleeper::default();
        let executor =
            RetryExecutor::with_sleeper(RetryPolicy::new(5, Duration::from_millis(100)), &sleeper);
        let calls = AtomicU32::new(0);

        let result: Result<()> = executor
            .execute("op", || {
                calls.fetch_add(1, Ordering::SeqCst);
                async {
                    Err(KbSyncError::Unauthorized {
                        message: "bad key".into(),
                    })
                }
            })
            .await;

        assert!(matches!(result, Err(KbSyncError::Unauthorized { .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(sleeper.delays.lock().unwrap().is_empty());
    }

    #[test]
    fn delay_sequence() {
        let policy = RetryPolicy::new(3, Duration::from_millis(250));
        assert_eq!(policy.delay_for(0), Duration::from_millis(250));
        assert_eq!(policy.delay_for(1), Duration::from_millis(500));
        assert_eq!(policy.delay_for(2), Duration::from_millis(1000));
    }

    #[test]
    fn zero_attempts_clamps_to_one() {
        assert_eq!(RetryPolicy::new(0, Duration::ZERO).max_attempts, 1);
    }
}
