//! Outbox event records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A to-be-published event written in the same transaction as the
/// business state change it announces.
///
/// A row with a non-null `published_at` is never republished. Rows are
/// visible to the relay only after the owning transaction commits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutboxEvent {
    /// Monotonic identifier; the relay drains in `id` order.
    pub id: i64,
    /// The order this event belongs to.
    pub aggregate_id: String,
    /// Routing event type, e.g. `order.created`.
    pub event_type: String,
    /// Serialized event body.
    pub payload: Value,
    pub created_at: DateTime<Utc>,
    /// Set once the event has been handed to the transport.
    pub published_at: Option<DateTime<Utc>>,
}

impl OutboxEvent {
    /// Returns true if the event still awaits publishing.
    pub fn is_unpublished(&self) -> bool {
        self.published_at.is_none()
    }
}

/// An outbox event about to be inserted; the store assigns `id` and
/// `created_at`.
#[derive(Debug, Clone)]
pub struct NewOutboxEvent {
    pub aggregate_id: String,
    pub event_type: String,
    pub payload: Value,
}

impl NewOutboxEvent {
    /// Creates a new outbox event for the given aggregate.
    pub fn new(
        aggregate_id: impl Into<String>,
        event_type: impl Into<String>,
        payload: Value,
    ) -> Self {
        Self {
            aggregate_id: aggregate_id.into(),
            event_type: event_type.into(),
            payload,
        }
    }
}
