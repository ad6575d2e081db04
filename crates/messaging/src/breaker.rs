//! Three-state circuit breaker.

use std::future::Future;
use std::sync::Mutex;
use std::time::Duration;

use thiserror::Error;
use tokio::time::Instant;

/// Circuit breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerState {
    /// Normal operation, calls pass through.
    Closed,
    /// Tripped; calls fail immediately for the cool-down period.
    Open,
    /// Cool-down elapsed; exactly one trial call probes the dependency.
    HalfOpen,
}

/// Error returned by a guarded call.
#[derive(Debug, Error)]
pub enum BreakerError<E: std::error::Error> {
    /// Rejected without touching the dependency.
    #[error("Circuit breaker is open")]
    Open,

    /// The call went through and failed.
    #[error(transparent)]
    Inner(E),
}

#[derive(Debug)]
struct BreakerInner {
    state: BreakerState,
    consecutive_failures: u32,
    opened_at: Option<Instant>,
    trial_in_flight: bool,
}

/// Guards a dependency against repeated failures.
///
/// Closed counts consecutive failures and trips open at the threshold.
/// While open, calls fail fast with [`BreakerError::Open`] and never
/// reach the dependency; failures are reported, never masked. After the
/// cool-down one trial call is admitted: success closes the breaker and
/// resets the count, failure reopens it and restarts the cool-down.
#[derive(Debug)]
pub struct CircuitBreaker {
    failure_threshold: u32,
    cool_down: Duration,
    inner: Mutex<BreakerInner>,
}

impl CircuitBreaker {
    /// Creates a closed breaker.
    pub fn new(failure_threshold: u32, cool_down: Duration) -> Self {
        Self {
            failure_threshold,
            cool_down,
            inner: Mutex::new(BreakerInner {
                state: BreakerState::Closed,
                consecutive_failures: 0,
                opened_at: None,
                trial_in_flight: false,
            }),
        }
    }

    /// Current state, with the open-to-half-open transition applied.
    pub fn state(&self) -> BreakerState {
        let mut inner = self.inner.lock().unwrap();
        self.refresh(&mut inner);
        inner.state
    }

    fn refresh(&self, inner: &mut BreakerInner) {
        if inner.state == BreakerState::Open
            && let Some(opened_at) = inner.opened_at
            && opened_at.elapsed() >= self.cool_down
        {
            inner.state = BreakerState::HalfOpen;
            inner.trial_in_flight = false;
        }
    }

    fn admit(&self) -> Result<(), ()> {
        let mut inner = self.inner.lock().unwrap();
        self.refresh(&mut inner);
        match inner.state {
            BreakerState::Closed => Ok(()),
            BreakerState::Open => Err(()),
            BreakerState::HalfOpen => {
                if inner.trial_in_flight {
                    Err(())
                } else {
                    inner.trial_in_flight = true;
                    Ok(())
                }
            }
        }
    }

    fn on_success(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.state = BreakerState::Closed;
        inner.consecutive_failures = 0;
        inner.opened_at = None;
        inner.trial_in_flight = false;
    }

    fn on_failure(&self) {
        let mut inner = self.inner.lock().unwrap();
        match inner.state {
            BreakerState::HalfOpen => {
                // Failed trial call, back to the start of the cool-down.
                inner.state = BreakerState::Open;
                inner.opened_at = Some(Instant::now());
                inner.trial_in_flight = false;
                tracing::warn!("circuit breaker reopened after failed trial");
            }
            _ => {
                inner.consecutive_failures += 1;
                if inner.consecutive_failures >= self.failure_threshold {
                    inner.state = BreakerState::Open;
                    inner.opened_at = Some(Instant::now());
                    tracing::warn!(
                        failures = inner.consecutive_failures,
                        "circuit breaker opened"
                    );
                }
            }
        }
    }

    /// Runs an operation under the breaker.
    pub async fn call<T, E, F, Fut>(&self, op: F) -> Result<T, BreakerError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: std::error::Error,
    {
        if self.admit().is_err() {
            metrics::counter!("breaker_rejections_total").increment(1);
            return Err(BreakerError::Open);
        }

        match op().await {
            Ok(value) => {
                self.on_success();
                Ok(value)
            }
            Err(err) => {
                self.on_failure();
                Err(BreakerError::Inner(err))
            }
        }
    }
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::new(3, Duration::from_secs(30))
    }
}
