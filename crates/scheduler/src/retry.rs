//! Shared retry policy for resolution call sites
//!
//! One policy object owns the attempt limit, the inter-attempt delay and the
//! per-attempt timeout. Call sites hand it an async operation and a
//! cancellation token; the policy decides when to try again.

use crate::CancellationToken;
use std::future::Future;
use std::time::Duration;

/// Classification hook for errors produced by retried operations
pub trait Retryable: std::fmt::Display {
    /// Whether another attempt may succeed
    fn is_retryable(&self) -> bool;

    /// Error value used when an attempt exceeds the policy timeout
    fn timed_out() -> Self;
}

/// Why a retried operation gave up
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryError<E> {
    /// The token was cancelled before an attempt settled
    Cancelled,
    /// The last attempt failed with a terminal or exhausted error
    Failed(E),
}

/// Bounded retry policy
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts including the first one
    pub max_attempts: u32,

    /// Delay before the second attempt
    pub delay: Duration,

    /// Multiplier applied to the delay after each failed attempt (1.0 = fixed)
    pub backoff: f32,

    /// Upper bound on a single attempt
    pub timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            delay: Duration::from_secs(1),
            backoff: 1.0,
            timeout: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    /// Create a fixed-delay policy
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            delay,
            ..Default::default()
        }
    }

    /// Set the per-attempt timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the backoff multiplier
    pub fn with_backoff(mut self, backoff: f32) -> Self {
        self.backoff = if backoff.is_finite() { backoff.max(1.0) } else { 1.0 };
        self
    }

    /// Delay to wait after the given failed attempt (1-based)
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1) as i32;
        self.delay.mul_f32(self.backoff.powi(exponent))
    }

    /// Run `op` until it succeeds, fails terminally, exhausts the attempt
    /// budget, or `token` is cancelled.
    ///
    /// `op` receives the 1-based attempt number.
    pub async fn run<T, E, F, Fut>(&self, token: &CancellationToken, mut op: F) -> Result<T, RetryError<E>>
    where
        E: Retryable,
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let mut attempt = 1;

        loop {
            let result = tokio::select! {
                biased;
                _ = token.cancelled() => return Err(RetryError::Cancelled),
                settled = tokio::time::timeout(self.timeout, op(attempt)) => {
                    settled.unwrap_or_else(|_| Err(E::timed_out()))
                }
            };

            match result {
                Ok(value) => return Ok(value),
                Err(error) if error.is_retryable() && attempt < self.max_attempts => {
                    let delay = self.delay_after(attempt);
                    tracing::warn!(attempt, max = self.max_attempts, ?delay, "attempt failed, retrying: {}", error);

                    tokio::select! {
                        biased;
                        _ = token.cancelled() => return Err(RetryError::Cancelled),
                        _ = tokio::time::sleep(delay) => {}
                    }
                    attempt += 1;
                }
                Err(error) => return Err(RetryError::Failed(error)),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[derive(Debug, Clone, PartialEq)]
    enum TestError {
        Flaky,
        Fatal,
        TimedOut,
    }

    impl std::fmt::Display for TestError {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "{:?}", self)
        }
    }

    impl Retryable for TestError {
        fn is_retryable(&self) -> bool {
            matches!(self, TestError::Flaky | TestError::TimedOut)
        }

        fn timed_out() -> Self {
            TestError::TimedOut
        }
    }

    #[test]
    fn test_default_policy() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_attempts, 3);
        assert_eq!(policy.delay, Duration::from_secs(1));
        assert_eq!(policy.timeout, Duration::from_secs(30));
    }

    #[test]
    fn test_fixed_delay() {
        let policy = RetryPolicy::new(4, Duration::from_millis(200));
        assert_eq!(policy.delay_after(1), Duration::from_millis(200));
        assert_eq!(policy.delay_after(3), Duration::from_millis(200));
    }

    #[test]
    fn test_backoff_delay() {
        let policy = RetryPolicy::new(4, Duration::from_millis(100)).with_backoff(2.0);
        assert_eq!(policy.delay_after(1), Duration::from_millis(100));
        assert_eq!(policy.delay_after(2), Duration::from_millis(200));
        assert_eq!(policy.delay_after(3), Duration::from_millis(400));
    }

    #[test]
    fn test_zero_attempts_clamped_to_one() {
        let policy = RetryPolicy::new(0, Duration::ZERO);
        assert_eq!(policy.max_attempts, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_until_success() {
        let policy = RetryPolicy::new(3, Duration::from_millis(100));
        let token = CancellationToken::new();
        let calls = Cell::new(0);

        let result = policy
            .run(&token, |attempt| {
                calls.set(calls.get() + 1);
                async move {
                    if attempt < 3 {
                        Err(TestError::Flaky)
                    } else {
                        Ok("done")
                    }
                }
            })
            .await;

        assert_eq!(result, Ok("done"));
        assert_eq!(calls.get(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_gives_up_after_max_attempts() {
        let policy = RetryPolicy::new(2, Duration::from_millis(100));
        let token = CancellationToken::new();
        let calls = Cell::new(0);

        let result: Result<(), _> = policy
            .run(&token, |_| {
                calls.set(calls.get() + 1);
                async { Err(TestError::Flaky) }
            })
            .await;

        assert_eq!(result, Err(RetryError::Failed(TestError::Flaky)));
        assert_eq!(calls.get(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_terminal_error_not_retried() {
        let policy = RetryPolicy::new(5, Duration::from_millis(100));
        let token = CancellationToken::new();
        let calls = Cell::new(0);

        let result: Result<(), _> = policy
            .run(&token, |_| {
                calls.set(calls.get() + 1);
                async { Err(TestError::Fatal) }
            })
            .await;

        assert_eq!(result, Err(RetryError::Failed(TestError::Fatal)));
        assert_eq!(calls.get(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_attempt_timeout_is_retried() {
        let policy = RetryPolicy::new(2, Duration::from_millis(10)).with_timeout(Duration::from_secs(1));
        let token = CancellationToken::new();

        let result = policy
            .run(&token, |attempt| async move {
                if attempt == 1 {
                    tokio::time::sleep(Duration::from_secs(60)).await;
                }
                Ok::<_, TestError>(attempt)
            })
            .await;

        assert_eq!(result, Ok(2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_during_delay() {
        let policy = RetryPolicy::new(3, Duration::from_secs(10));
        let token = CancellationToken::new();
        let canceller = token.clone();

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            canceller.cancel();
        });

        let result: Result<(), _> = policy.run(&token, |_| async { Err(TestError::Flaky) }).await;
        assert_eq!(result, Err(RetryError::Cancelled));
    }
}
