//! Bounded retry with exponential backoff.
//!
//! Attempt `n` (1-based) that fails waits `min(base * 2^(n-1), max_delay)`
//! before attempt `n + 1`. There is no jitter: deliveries are few and the
//! delay schedule is part of the observable contract.

use std::future::Future;
use std::time::{Duration, Instant};

use crate::config::{SenderConfig, MAX_BACKOFF};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Attempts after the first one.
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(500),
            max_delay: MAX_BACKOFF,
        }
    }
}

impl From<&SenderConfig> for RetryPolicy {
    fn from(config: &SenderConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            base_delay: config.backoff_base(),
            max_delay: MAX_BACKOFF,
        }
    }
}

impl RetryPolicy {
    /// Delay after the failed attempt `attempt` (1-based).
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let base = self.base_delay.as_millis() as u64;
        let exponential = base.saturating_mul(2_u64.saturating_pow(attempt.saturating_sub(1)));
        Duration::from_millis(exponential.min(self.max_delay.as_millis() as u64))
    }
}

/// Errors that can steer the retry loop.
pub trait Retryable {
    /// Whether another attempt is worth making.
    fn is_retryable(&self) -> bool;

    /// Whether this failure should replace `previous` as the reported one.
    fn supersedes(&self, _previous: &Self) -> bool {
        true
    }
}

#[derive(Debug, Clone)]
pub struct RetryResult<T, E> {
    /// The value, or the failure chosen by [`Retryable::supersedes`].
    pub result: Result<T, E>,
    /// Attempts made (1 = no retries needed).
    pub attempts: u32,
    pub total_duration: Duration,
}

impl<T, E> RetryResult<T, E> {
    pub fn into_result(self) -> Result<T, E> {
        self.result
    }
}

/// Run `operation` until it succeeds, fails with a non-retryable error or
/// the policy is exhausted. `operation` receives the 1-based attempt number.
pub async fn execute_with_retry_async<T, E, F, Fut>(
    policy: &RetryPolicy,
    mut operation: F,
) -> RetryResult<T, E>
where
    E: Retryable,
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let start = Instant::now();
    let mut attempt = 1;
    let mut reported = match operation(attempt).await {
        Ok(value) => {
            return RetryResult {
                result: Ok(value),
                attempts: attempt,
                total_duration: start.elapsed(),
            };
        }
        Err(error) => error,
    };
    let mut retryable = reported.is_retryable();

    while retryable && attempt <= policy.max_retries {
        tokio::time::sleep(policy.delay_after(attempt)).await;
        attempt += 1;
        match operation(attempt).await {
            Ok(value) => {
                return RetryResult {
                    result: Ok(value),
                    attempts: attempt,
                    total_duration: start.elapsed(),
                };
            }
            Err(error) => {
                retryable = error.is_retryable();
                if error.supersedes(&reported) {
                    reported = error;
                }
            }
        }
    }

    RetryResult {
        result: Err(reported),
        attempts: attempt,
        total_duration: start.elapsed(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[derive(Debug, PartialEq)]
    enum Failure {
        Network(u32),
        Status(u32),
        Fatal,
    }

    impl Retryable for Failure {
        fn is_retryable(&self) -> bool {
            !matches!(self, Failure::Fatal)
        }

        fn supersedes(&self, previous: &Self) -> bool {
            matches!(self, Failure::Network(_)) || !matches!(previous, Failure::Network(_))
        }
    }

    fn policy(max_retries: u32) -> RetryPolicy {
        RetryPolicy {
            max_retries,
            base_delay: Duration::from_millis(500),
            max_delay: MAX_BACKOFF,
        }
    }

    #[test]
    fn delay_doubles_up_to_the_cap() {
        let p = policy(5);
        assert_eq!(p.delay_after(1), Duration::from_millis(500));
        assert_eq!(p.delay_after(2), Duration::from_millis(1000));
        assert_eq!(p.delay_after(3), Duration::from_millis(2000));
        assert_eq!(p.delay_after(4), Duration::from_millis(3000));
        assert_eq!(p.delay_after(40), Duration::from_millis(3000));
    }

    #[tokio::test(start_paused = true)]
    async fn succeeds_after_transient_failures() {
        let calls = AtomicU32::new(0);
        let started = tokio::time::Instant::now();
        let result = execute_with_retry_async(&policy(3), |attempt| {
            calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if attempt < 3 {
                    Err(Failure::Status(attempt))
                } else {
                    Ok(attempt)
                }
            }
        })
        .await;
        assert_eq!(result.result, Ok(3));
        assert_eq!(result.attempts, 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        // 500ms + 1000ms of backoff
        assert_eq!(started.elapsed(), Duration::from_millis(1500));
    }

    #[tokio::test(start_paused = true)]
    async fn exhaustion_prefers_the_last_network_failure() {
        let result = execute_with_retry_async(&policy(2), |attempt| async move {
            match attempt {
                1 => Err::<(), _>(Failure::Network(1)),
                _ => Err(Failure::Status(attempt)),
            }
        })
        .await;
        assert_eq!(result.attempts, 3);
        assert_eq!(result.result, Err(Failure::Network(1)));

        let statuses = execute_with_retry_async(&policy(1), |attempt| async move {
            Err::<(), _>(Failure::Status(attempt))
        })
        .await;
        assert_eq!(statuses.result, Err(Failure::Status(2)));
    }

    #[tokio::test(start_paused = true)]
    async fn fatal_errors_stop_immediately() {
        let result =
            execute_with_retry_async(&policy(3), |_| async { Err::<(), _>(Failure::Fatal) }).await;
        assert_eq!(result.attempts, 1);
        assert_eq!(result.result, Err(Failure::Fatal));
    }

    #[tokio::test(start_paused = true)]
    async fn zero_retries_means_one_attempt() {
        let started = tokio::time::Instant::now();
        let result = execute_with_retry_async(&policy(0), |attempt| async move {
            Err::<(), _>(Failure::Status(attempt))
        })
        .await;
        assert_eq!(result.attempts, 1);
        assert_eq!(started.elapsed(), Duration::ZERO);
    }
}
