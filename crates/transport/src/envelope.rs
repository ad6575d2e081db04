//! The wire-level message envelope.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// JSON envelope every published message is wrapped in.
///
/// Field names are part of the wire contract shared with external
/// consumers, hence the camelCase renames.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageEnvelope {
    /// Event type, also used as the topic routing key (e.g. `order.created`).
    #[serde(rename = "eventType")]
    pub event_type: String,

    /// Identifier of the aggregate the event is about.
    #[serde(rename = "aggregateId")]
    pub aggregate_id: String,

    /// Event body.
    pub payload: Value,

    /// When the event was created on the producer side.
    pub timestamp: DateTime<Utc>,
}

impl MessageEnvelope {
    /// Creates an envelope timestamped now.
    pub fn new(
        event_type: impl Into<String>,
        aggregate_id: impl Into<String>,
        payload: Value,
    ) -> Self {
        Self {
            event_type: event_type.into(),
            aggregate_id: aggregate_id.into(),
            payload,
            timestamp: Utc::now(),
        }
    }

    /// Deduplication key for this envelope: `aggregateId:eventType`.
    pub fn idempotency_key(&self) -> String {
        format!("{}:{}", self.aggregate_id, self.event_type)
    }
}
