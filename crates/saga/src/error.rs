use thiserror::Error;

/// Errors surfaced by intake and orchestration.
#[derive(Debug, Error)]
pub enum SagaError {
    /// A non-terminal execution already exists for the order.
    #[error("Saga already running for order {0}")]
    AlreadyRunning(String),

    /// The order row is missing.
    #[error("Order not found: {0}")]
    OrderNotFound(String),

    /// Intake validation failed.
    #[error(transparent)]
    Domain(#[from] domain::DomainError),

    /// Durable store failure.
    #[error("Store error: {0}")]
    Store(store::StoreError),

    /// Payload (de)serialization failed.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<store::StoreError> for SagaError {
    fn from(err: store::StoreError) -> Self {
        match err {
            store::StoreError::ActiveExecutionExists { order_id } => {
                SagaError::AlreadyRunning(order_id)
            }
            other => SagaError::Store(other),
        }
    }
}
