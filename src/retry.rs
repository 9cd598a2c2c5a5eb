//! Retry with exponential backoff.
//!
//! A [`RetryPolicy`] describes how many attempts to make and how long to
//! sleep between them; [`retry`] drives an async operation under a policy,
//! consulting a predicate to decide which errors are worth another attempt.
//!
//! After the n-th failed attempt (1-based) the call sleeps
//!
//! ```text
//! clamp(multiplier × 2^(n−1), min_wait, max_wait)
//! ```
//!
//! and no sleep follows the final attempt.

use std::future::Future;
use std::time::Duration;

use thiserror::Error;
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first. Values below 1 act as 1.
    pub max_attempts: u32,
    pub multiplier: Duration,
    pub min_wait: Duration,
    pub max_wait: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, multiplier: Duration, min_wait: Duration, max_wait: Duration) -> Self {
        Self {
            max_attempts,
            multiplier,
            min_wait,
            max_wait,
        }
    }

    /// Policy for token requests and playlist lookups: 3 attempts,
    /// waits between 2s and 10s.
    pub fn token() -> Self {
        Self::new(3, Duration::from_secs(1), Duration::from_secs(2), Duration::from_secs(10))
    }

    /// Policy for the time-windowed NVD query: 3 attempts, multiplier 2s,
    /// waits between 4s and 30s.
    pub fn time_window() -> Self {
        Self::new(3, Duration::from_secs(2), Duration::from_secs(4), Duration::from_secs(30))
    }

    /// Retry immediately, without sleeping. Intended for tests.
    pub fn immediate(max_attempts: u32) -> Self {
        Self::new(max_attempts, Duration::ZERO, Duration::ZERO, Duration::ZERO)
    }

    /// Sleep that follows the `failed_attempt`-th failure (1-based).
    pub fn backoff(&self, failed_attempt: u32) -> Duration {
        let exp = failed_attempt.saturating_sub(1).min(31);
        let raw = self.multiplier.saturating_mul(1u32 << exp);
        raw.max(self.min_wait).min(self.max_wait.max(self.min_wait))
    }

    fn attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }
}

/// Why [`retry`] gave up.
#[derive(Error, Debug)]
pub enum RetryError<E> {
    /// Every attempt failed with a retryable error; `last` is the final one.
    #[error("retries exhausted after {attempts} attempts")]
    Exhausted { attempts: u32, last: E },

    /// An attempt failed with an error the predicate refused to retry.
    #[error("non-retryable failure")]
    Fatal(E),
}

impl<E> RetryError<E> {
    pub fn into_inner(self) -> E {
        match self {
            RetryError::Exhausted { last, .. } => last,
            RetryError::Fatal(e) => e,
        }
    }
}

/// Run `op` until it succeeds, fails fatally, or the policy runs out.
///
/// `op` receives the 1-based attempt number. Sleeps use
/// `tokio::time::sleep`, so the calling task blocks for the backoff.
pub async fn retry<T, E, F, Fut, P>(
    policy: &RetryPolicy,
    is_retryable: P,
    mut op: F,
) -> Result<T, RetryError<E>>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    P: Fn(&E) -> bool,
    E: std::fmt::Display,
{
    let attempts = policy.attempts();
    let mut attempt = 1;

    loop {
        match op(attempt).await {
            Ok(value) => return Ok(value),
            Err(err) if !is_retryable(&err) => return Err(RetryError::Fatal(err)),
            Err(err) if attempt >= attempts => {
                return Err(RetryError::Exhausted {
                    attempts: attempt,
                    last: err,
                })
            }
            Err(err) => {
                let delay = policy.backoff(attempt);
                warn!(
                    "attempt {}/{} failed: {}; retrying in {:?}",
                    attempt, attempts, err, delay
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
    use std::cell::Cell;

    #[test]
    fn test_token_backoff_schedule() {
        let p = RetryPolicy::token();
        assert_eq!(p.backoff(1), Duration::from_secs(2));
        assert_eq!(p.backoff(2), Duration::from_secs(2));
        assert_eq!(p.backoff(3), Duration::from_secs(4));
        assert_eq!(p.backoff(4), Duration::from_secs(8));
        assert_eq!(p.backoff(5), Duration::from_secs(10));
        assert_eq!(p.backoff(40), Duration::from_secs(10));
    }

    #[test]
    fn test_time_window_backoff_schedule() {
        let p = RetryPolicy::time_window();
        assert_eq!(p.backoff(1), Duration::from_secs(4));
        assert_eq!(p.backoff(2), Duration::from_secs(4));
        assert_eq!(p.backoff(3), Duration::from_secs(8));
        assert_eq!(p.backoff(5), Duration::from_secs(30));
    }

    /// Fails `failures` times, then succeeds.
    async fn flaky(calls: &Cell<u32>, failures: u32) -> Result<&'static str, String> {
        calls.set(calls.get() + 1);
        if calls.get() <= failures {
            Err(format!("network down (call {})", calls.get()))
        } else {
            Ok("ok")
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_three_failures_exhaust_three_attempts() {
        let calls = Cell::new(0);
        let result = retry(&RetryPolicy::time_window(), |_: &String| true, |_| {
            flaky(&calls, 3)
        })
        .await;

        assert_eq!(calls.get(), 3);
        match result {
            Err(RetryError::Exhausted { attempts, last }) => {
                assert_eq!(attempts, 3);
                assert!(last.contains("call 3"));
            }
            other => panic!("expected exhaustion, got {:?}", other.map(|_| ())),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_three_failures_then_success_with_four_attempts() {
        let calls = Cell::new(0);
        let policy = RetryPolicy {
            max_attempts: 4,
            ..RetryPolicy::time_window()
        };
        let started = tokio::time::Instant::now();
        let result = retry(&policy, |_: &String| true, |_| flaky(&calls, 3)).await;

        assert_eq!(result.unwrap(), "ok");
        assert_eq!(calls.get(), 4);
        // 4s + 4s + 8s of backoff on the paused clock.
        assert_eq!(started.elapsed(), Duration::from_secs(16));
    }

    #[tokio::test(start_paused = true)]
    async fn test_fatal_error_stops_immediately() {
        let calls = Cell::new(0);
        let result = retry(
            &RetryPolicy::token(),
            |e: &String| !e.contains("call 1"),
            |_| flaky(&calls, 5),
        )
        .await;
        assert_eq!(calls.get(), 1);
        assert!(matches!(result, Err(RetryError::Fatal(_))));
    }

    #[tokio::test]
    async fn test_attempt_number_is_passed_through() {
        let seen = std::sync::Mutex::new(Vec::new());
        let _ = retry(&RetryPolicy::immediate(3), |_: &String| true, |n| {
            seen.lock().unwrap().push(n);
            async move { Err::<(), _>(format!("fail {}", n)) }
        })
        .await;
        assert_eq!(*seen.lock().unwrap(), vec![1, 2, 3]);
    }
}
