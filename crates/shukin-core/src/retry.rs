//! Retry policy for fallible SDK calls.
//!
//! A policy wraps an async operation, sleeping between attempts on the tokio
//! clock. It carries no state between runs, so the same policy value can be
//! shared by every call site.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq)]
pub enum Backoff {
    Fixed(Duration),
    /// `initial * base^(attempt - 1)`, capped at `max`.
    Exponential {
        initial: Duration,
        base: f64,
        max: Duration,
    },
}

impl Backoff {
    pub fn delay_for(&self, attempt: u32) -> Duration {
        match self {
            Backoff::Fixed(delay) => *delay,
            Backoff::Exponential { initial, base, max } => {
                let exp = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
                let millis = initial.as_millis() as f64 * base.powi(exp);
                let capped = millis.min(max.as_millis() as f64).max(0.0);
                Duration::from_millis(capped as u64)
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff: Backoff,
}

impl Default for RetryPolicy {
    /// Three attempts five seconds apart, the cadence used for ad reloads.
    fn default() -> Self {
        Self::fixed(3, Duration::from_secs(5))
    }
}

impl RetryPolicy {
    pub fn fixed(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            backoff: Backoff::Fixed(delay),
        }
    }

    pub fn none() -> Self {
        Self::fixed(1, Duration::ZERO)
    }

    /// Runs `op` until it succeeds or attempts run out; returns the last
    /// error in the latter case.
    pub async fn run<T, E, F, Fut>(&self, label: &str, mut op: F) -> Result<T, E>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Display,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            match op(attempt).await {
                Ok(value) => {
                    if attempt > 1 {
                        debug!(label, attempt, "succeeded after retry");
                    }
                    return Ok(value);
                }
                Err(err) if attempt < max_attempts => {
                    let delay = self.backoff.delay_for(attempt);
                    warn!(label, attempt, max_attempts, ?delay, error = %err, "attempt failed; retrying");
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => {
                    warn!(label, attempt, error = %err, "giving up");
                    return Err(err);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::time::Instant;

    use super::{Backoff, RetryPolicy};

    #[test]
    fn exponential_backoff_is_capped() {
        let backoff = Backoff::Exponential {
            initial: Duration::from_millis(100),
            base: 2.0,
            max: Duration::from_millis(500),
        };
        assert_eq!(backoff.delay_for(1), Duration::from_millis(100));
        assert_eq!(backoff.delay_for(3), Duration::from_millis(400));
        assert_eq!(backoff.delay_for(10), Duration::from_millis(500));
    }

    #[tokio::test(start_paused = true)]
    async fn retries_until_success_with_fixed_delay() {
        let policy = RetryPolicy::fixed(3, Duration::from_secs(5));
        let started = Instant::now();
        let result: Result<u32, String> = policy
            .run("flaky", |attempt| async move {
                if attempt < 3 {
                    Err(format!("attempt {attempt} failed"))
                } else {
                    Ok(attempt)
                }
            })
            .await;
        assert_eq!(result, Ok(3));
        assert_eq!(started.elapsed(), Duration::from_secs(10));
    }

    #[tokio::test(start_paused = true)]
    async fn returns_last_error_when_exhausted() {
        let policy = RetryPolicy::fixed(2, Duration::from_secs(1));
        let result: Result<(), String> = policy
            .run("always", |attempt| async move { Err(format!("boom {attempt}")) })
            .await;
        assert_eq!(result, Err("boom 2".to_string()));
    }

    #[tokio::test]
    async fn single_attempt_policy_does_not_sleep() {
        let result: Result<(), &str> = RetryPolicy::none().run("once", |_| async { Err("nope") }).await;
        assert_eq!(result, Err("nope"));
    }
}
