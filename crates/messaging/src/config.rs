//! Messaging configuration loaded from environment variables.

use std::time::Duration;

use crate::breaker::CircuitBreaker;
use crate::retry::RetryPolicy;

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// Delivery tuning with sensible defaults.
///
/// Reads from environment variables:
/// - `SAGA_QUEUE`: queue the saga consumer listens on (default: `"saga_queue"`)
/// - `OUTBOX_BATCH_SIZE`: rows drained per relay pass (default: `50`)
/// - `OUTBOX_POLL_INTERVAL_MS`: relay idle sleep (default: `500`)
/// - `RETRY_MAX_ATTEMPTS`: publish attempts per row (default: `3`)
/// - `RETRY_BASE_DELAY_MS` / `RETRY_CAP_MS`: backoff bounds (default: `200` / `5000`)
/// - `BREAKER_FAILURE_THRESHOLD`: consecutive failures before opening (default: `3`)
/// - `BREAKER_COOL_DOWN_MS`: open duration before a trial call (default: `30000`)
/// - `CONSUMER_RETRY_BUDGET`: deliveries before dead-lettering (default: `3`)
#[derive(Debug, Clone)]
pub struct MessagingConfig {
    pub queue: String,
    pub batch_size: usize,
    pub poll_interval_ms: u64,
    pub retry_max_attempts: u32,
    pub retry_base_delay_ms: u64,
    pub retry_cap_ms: u64,
    pub breaker_failure_threshold: u32,
    pub breaker_cool_down_ms: u64,
    pub consumer_retry_budget: u32,
}

impl MessagingConfig {
    /// Loads configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self {
            queue: std::env::var("SAGA_QUEUE").unwrap_or_else(|_| "saga_queue".to_string()),
            batch_size: env_parse("OUTBOX_BATCH_SIZE", 50),
            poll_interval_ms: env_parse("OUTBOX_POLL_INTERVAL_MS", 500),
            retry_max_attempts: env_parse("RETRY_MAX_ATTEMPTS", 3),
            retry_base_delay_ms: env_parse("RETRY_BASE_DELAY_MS", 200),
            retry_cap_ms: env_parse("RETRY_CAP_MS", 5000),
            breaker_failure_threshold: env_parse("BREAKER_FAILURE_THRESHOLD", 3),
            breaker_cool_down_ms: env_parse("BREAKER_COOL_DOWN_MS", 30_000),
            consumer_retry_budget: env_parse("CONSUMER_RETRY_BUDGET", 3),
        }
    }

    /// Builds the retry policy these settings describe.
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.retry_max_attempts,
            Duration::from_millis(self.retry_base_delay_ms),
            Duration::from_millis(self.retry_cap_ms),
        )
    }

    /// Builds a fresh circuit breaker from these settings.
    pub fn breaker(&self) -> CircuitBreaker {
        CircuitBreaker::new(
            self.breaker_failure_threshold,
            Duration::from_millis(self.breaker_cool_down_ms),
        )
    }

    /// Relay and consumer idle sleep.
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

impl Default for MessagingConfig {
    fn default() -> Self {
        Self {
            queue: "saga_queue".to_string(),
            batch_size: 50,
            poll_interval_ms: 500,
            retry_max_attempts: 3,
            retry_base_delay_ms: 200,
            retry_cap_ms: 5000,
            breaker_failure_threshold: 3,
            breaker_cool_down_ms: 30_000,
            consumer_retry_budget: 3,
        }
    }
}
