//! Bounded retry with exponential backoff and jitter.

use std::future::Future;
use std::time::Duration;

use rand::Rng;

/// Retry policy with capped exponential backoff.
///
/// The delay before attempt `n + 1` is
/// `min(cap, base * 2^n) + random(0, delay)`; the random term spreads
/// simultaneous retriers apart.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts, the first call included.
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub cap: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(200),
            cap: Duration::from_secs(5),
        }
    }
}

impl RetryPolicy {
    /// Creates a policy with explicit bounds.
    pub fn new(max_attempts: u32, base_delay: Duration, cap: Duration) -> Self {
        Self {
            max_attempts,
            base_delay,
            cap,
        }
    }

    /// Backoff delay after a failed attempt (0-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponential = self
            .base_delay
            .saturating_mul(2u32.saturating_pow(attempt.min(31)));
        let delay = exponential.min(self.cap);
        let jitter_ms = rand::thread_rng().gen_range(0..=delay.as_millis() as u64);
        delay + Duration::from_millis(jitter_ms)
    }

    /// Runs an operation, sleeping between failed attempts until the
    /// budget is spent. The last error is returned as-is.
    pub async fn run<T, E, F, Fut>(&self, mut op: F) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: std::fmt::Display,
    {
        let mut attempt = 0u32;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(err) => {
                    attempt += 1;
                    if attempt >= self.max_attempts {
                        tracing::warn!(attempt, error = %err, "retry budget exhausted");
                        return Err(err);
                    }
                    let delay = self.delay_for(attempt - 1);
                    tracing::debug!(
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "retrying after failure"
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
}
