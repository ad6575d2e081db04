use thiserror::Error;

/// Errors surfaced by the messaging layer.
#[derive(Debug, Error)]
pub enum MessagingError {
    /// Durable store failure.
    #[error("Store error: {0}")]
    Store(#[from] store::StoreError),

    /// Broker failure.
    #[error("Transport error: {0}")]
    Transport(#[from] transport::TransportError),

    /// A message handler rejected the delivery.
    #[error("Handler failed: {0}")]
    Handler(String),
}

/// Result type for messaging operations.
pub type Result<T> = std::result::Result<T, MessagingError>;
