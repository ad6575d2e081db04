//! Domain error types.

use thiserror::Error;

/// Errors raised by the order domain.
#[derive(Debug, Error)]
pub enum DomainError {
    /// Intake validation failed; nothing was persisted.
    #[error("Validation failed: {0}")]
    Validation(String),
}
