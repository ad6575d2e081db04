//! Dead letter records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A message whose retry budget was exhausted.
///
/// Dead letters require manual disposition (requeue or discard) and are
/// never auto-deleted by the engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeadLetterRecord {
    pub id: i64,
    /// Full original message payload.
    pub original_message: Value,
    /// The queue the message was consumed from.
    pub queue: String,
    /// Last failure message.
    pub error: String,
    /// Delivery attempts made before giving up.
    pub attempts: u32,
    pub first_failed_at: DateTime<Utc>,
    pub last_failed_at: DateTime<Utc>,
}

/// A dead letter about to be inserted; the store assigns `id`.
#[derive(Debug, Clone)]
pub struct NewDeadLetter {
    pub original_message: Value,
    pub queue: String,
    pub error: String,
    pub attempts: u32,
    pub first_failed_at: DateTime<Utc>,
    pub last_failed_at: DateTime<Utc>,
}

impl NewDeadLetter {
    /// Creates a dead letter whose failure window is the current instant.
    pub fn now(
        original_message: Value,
        queue: impl Into<String>,
        error: impl Into<String>,
        attempts: u32,
    ) -> Self {
        let at = Utc::now();
        Self {
            original_message,
            queue: queue.into(),
            error: error.into(),
            attempts,
            first_failed_at: at,
            last_failed_at: at,
        }
    }
}
