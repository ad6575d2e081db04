//! Idempotency key records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A deduplication claim for a delivered message.
///
/// The key is unique; a duplicate insert attempt means the message was
/// already handled and is never treated as an error. For business
/// messages the key is `orderId:eventType`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdempotencyRecord {
    pub key: String,
    /// Cached handler outcome, set after successful processing.
    pub result: Option<Value>,
    pub seen_at: DateTime<Utc>,
}

impl IdempotencyRecord {
    /// Creates a fresh claim with no result yet.
    pub fn claim(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            result: None,
            seen_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn claim_has_no_result() {
        let record = IdempotencyRecord::claim("ORD-1:order.created");
        assert_eq!(record.key, "ORD-1:order.created");
        assert!(record.result.is_none());
    }
}
