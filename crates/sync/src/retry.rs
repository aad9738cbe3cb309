//! Bounded retry with fixed backoff.
//!
//! The single place retry policy is defined. Callers hand in a zero-argument
//! async operation and get back either its first success or the error of the
//! last attempt; rollback and user-facing reporting stay with the caller.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use tracing::{debug, warn};

use crate::config::CartSyncConfig;

/// Re-attempts a fallible async operation a bounded number of times.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryExecutor {
    max_attempts: u32,
    backoff: Duration,
}

impl RetryExecutor {
    /// Create an executor. `max_attempts` below one is treated as one.
    #[must_use]
    pub fn new(max_attempts: u32, backoff: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            backoff,
        }
    }

    /// Executor using the configured attempt count and backoff.
    #[must_use]
    pub fn from_config(config: &CartSyncConfig) -> Self {
        Self::new(config.retry_attempts, config.retry_backoff)
    }

    /// Total attempts per call.
    #[must_use]
    pub const fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Run `operation` until it succeeds or the attempts are used up.
    ///
    /// # Errors
    ///
    /// Returns the error of the final attempt.
    pub async fn run<T, E, F, Fut>(&self, label: &str, mut operation: F) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Display,
    {
        let mut attempt = 1;
        loop {
            match operation().await {
                Ok(value) => return Ok(value),
                Err(e) if attempt < self.max_attempts => {
                    debug!(
                        operation = label,
                        attempt,
                        max_attempts = self.max_attempts,
                        error = %e,
                        "Remote call failed, retrying"
                    );
                    tokio::time::sleep(self.backoff).await;
                    attempt += 1;
                }
                Err(e) => {
                    warn!(
                        operation = label,
                        attempts = attempt,
                        error = %e,
                        "Remote call failed after final attempt"
                    );
                    return Err(e);
                }
            }
        }
    }
}

impl Default for RetryExecutor {
    fn default() -> Self {
        Self::from_config(&CartSyncConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Instant;

    use super::*;

    #[tokio::test]
    async fn test_returns_first_success() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let executor = RetryExecutor::new(3, Duration::ZERO);

        let result: Result<u32, String> = executor
            .run("test", || async move {
                let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
                if n < 2 { Err(format!("attempt {n} failed")) } else { Ok(n) }
            })
            .await;

        assert_eq!(result, Ok(2));
        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_surfaces_final_error_after_bounded_attempts() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let executor = RetryExecutor::new(3, Duration::ZERO);

        let result: Result<(), String> = executor
            .run("test", || async move {
                let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
                Err(format!("attempt {n} failed"))
            })
            .await;

        assert_eq!(result, Err("attempt 3 failed".to_string()));
        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_backoff_between_attempts() {
        let executor = RetryExecutor::new(3, Duration::from_millis(10));
        let started = Instant::now();

        let _: Result<(), &str> = executor.run("test", || async { Err("down") }).await;

        // Two sleeps between three attempts
        assert!(started.elapsed() >= Duration::from_millis(20));
    }

    #[test]
    fn test_zero_attempts_clamped_to_one() {
        assert_eq!(RetryExecutor::new(0, Duration::ZERO).max_attempts(), 1);
        assert_eq!(RetryExecutor::default().max_attempts(), 3);
    }
}
