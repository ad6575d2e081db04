//! Store error types.

use thiserror::Error;

/// Errors that can occur during store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// An active (non-terminal) saga execution already exists for this order.
    #[error("Active saga execution already exists for order {order_id}")]
    ActiveExecutionExists { order_id: String },

    /// The requested row does not exist.
    #[error("Not found: {0}")]
    NotFound(String),

    /// A persisted value could not be decoded.
    #[error("Corrupt record: {0}")]
    Corrupt(String),

    /// Database error.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Convenience type alias for store results.
pub type Result<T> = std::result::Result<T, StoreError>;
