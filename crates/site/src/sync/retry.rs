//! Exponential-backoff retry for fallible async operations.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use tracing::warn;

/// Bounded retry with doubling delay.
///
/// `max_attempts` counts the first attempt, so the default of 6 means one
/// attempt plus five retries, waiting 1s, 2s, 4s, 8s and 16s in between.
/// A `max_attempts` of 0 is treated as a single attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: u32,
    initial_delay: Duration,
}

impl RetryPolicy {
    pub const DEFAULT_MAX_ATTEMPTS: u32 = 6;
    pub const DEFAULT_INITIAL_DELAY: Duration = Duration::from_millis(1000);

    #[must_use]
    pub const fn new(max_attempts: u32, initial_delay: Duration) -> Self {
        Self {
            max_attempts,
            initial_delay,
        }
    }

    /// Attempts actually made before giving up.
    #[must_use]
    pub const fn attempts(&self) -> u32 {
        if self.max_attempts == 0 {
            1
        } else {
            self.max_attempts
        }
    }

    #[must_use]
    pub const fn initial_delay(&self) -> Duration {
        self.initial_delay
    }

    /// Run `op` until it succeeds or the attempts are used up.
    ///
    /// The error of the final attempt is returned unchanged. No delay follows
    /// a success or the final attempt.
    ///
    /// # Errors
    ///
    /// Returns the last error produced by `op` once every attempt has failed.
    pub async fn run<T, E, F, Fut>(&self, operation: &str, mut op: F) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Display,
    {
        let attempts = self.attempts();
        let mut delay = self.initial_delay;
        let mut attempt = 1;

        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(err) if attempt < attempts => {
                    warn!(
                        operation,
                        attempt,
                        max_attempts = attempts,
                        delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                        error = %err,
                        "Remote operation failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    delay = delay.saturating_mul(2);
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(Self::DEFAULT_MAX_ATTEMPTS, Self::DEFAULT_INITIAL_DELAY)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    use tokio::time::Instant;

    use super::*;

    /// Operation failing until attempt `succeed_on` (never if `None`).
    fn flaky(
        calls: &Arc<AtomicU32>,
        succeed_on: Option<u32>,
    ) -> impl FnMut() -> std::future::Ready<Result<u32, String>> {
        let calls = Arc::clone(calls);
        move || {
            let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
            std::future::ready(match succeed_on {
                Some(k) if n >= k => Ok(n),
                _ => Err(format!("failure #{n}")),
            })
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_always_failing_op_runs_exactly_n_times() {
        for n in 1..=7 {
            let calls = Arc::new(AtomicU32::new(0));
            let policy = RetryPolicy::new(n, Duration::from_millis(10));

            let result = policy.run("test", flaky(&calls, None)).await;

            assert_eq!(calls.load(Ordering::SeqCst), n);
            assert_eq!(result, Err(format!("failure #{n}")));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_on_attempt_k_stops_retrying() {
        for k in 1..=6 {
            let calls = Arc::new(AtomicU32::new(0));
            let result = RetryPolicy::default()
                .run("test", flaky(&calls, Some(k)))
                .await;

            assert_eq!(result, Ok(k));
            assert_eq!(calls.load(Ordering::SeqCst), k);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_backoff_doubles_and_skips_delay_after_success() {
        let calls = Arc::new(AtomicU32::new(0));
        let start = Instant::now();

        let result = RetryPolicy::default()
            .run("test", flaky(&calls, Some(4)))
            .await;

        // 1s + 2s + 4s before the fourth (successful) attempt, nothing after.
        let elapsed = start.elapsed();
        assert_eq!(result, Ok(4));
        assert!(elapsed >= Duration::from_millis(7000), "{elapsed:?}");
        assert!(elapsed < Duration::from_millis(7100), "{elapsed:?}");
    }

    #[tokio::test(start_paused = true)]
    async fn test_immediate_success_has_no_delay() {
        let calls = Arc::new(AtomicU32::new(0));
        let start = Instant::now();

        let result = RetryPolicy::default()
            .run("test", flaky(&calls, Some(1)))
            .await;

        assert_eq!(result, Ok(1));
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_attempts_means_single_attempt() {
        let calls = Arc::new(AtomicU32::new(0));
        let start = Instant::now();

        let result = RetryPolicy::new(0, Duration::from_secs(1))
            .run("test", flaky(&calls, None))
            .await;

        assert_eq!(result, Err("failure #1".to_string()));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(start.elapsed(), Duration::ZERO);
    }
}
