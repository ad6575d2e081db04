use thiserror::Error;

/// Errors surfaced by a message transport.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The broker refused or dropped the operation.
    #[error("Transport unavailable: {0}")]
    Unavailable(String),

    /// The queue was never declared.
    #[error("Unknown queue: {0}")]
    UnknownQueue(String),

    /// Envelope (de)serialization failed.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for transport operations.
pub type Result<T> = std::result::Result<T, TransportError>;
