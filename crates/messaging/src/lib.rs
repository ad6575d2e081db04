//! Reliable message delivery.
//!
//! Everything between the durable store and the broker lives here: the
//! [`OutboxRelay`] that drains committed outbox rows to the transport,
//! the [`IdempotentConsumer`] that deduplicates, retries, and
//! dead-letters inbound deliveries, and the [`RetryPolicy`] and
//! [`CircuitBreaker`] both are built on.

pub mod breaker;
pub mod config;
pub mod consumer;
pub mod error;
pub mod publisher;
pub mod retry;

pub use breaker::{BreakerError, BreakerState, CircuitBreaker};
pub use config::MessagingConfig;
pub use consumer::{Consumed, IdempotentConsumer, MessageHandler};
pub use error::{MessagingError, Result};
pub use publisher::OutboxRelay;
pub use retry::RetryPolicy;
