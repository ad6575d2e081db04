//! The external service client seam.

use async_trait::async_trait;
use domain::Order;
use serde_json::Value;
use thiserror::Error;

/// Errors a service client can report.
///
/// The distinction matters to the orchestrator only in logging; both
/// variants fail the step and trigger compensation.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ClientError {
    /// The service understood the request and said no.
    #[error("{0}")]
    Rejected(String),

    /// The service could not be reached or answered garbage.
    #[error("Service unavailable: {0}")]
    Unavailable(String),
}

/// A downstream service a saga step talks to.
///
/// `execute` performs the step's forward action and returns the
/// service's result payload; `compensate` undoes a previously
/// successful `execute` and must be idempotent.
#[async_trait]
pub trait ServiceClient: Send + Sync {
    /// Performs the forward action for an order.
    async fn execute(&self, order: &Order) -> Result<Value, ClientError>;

    /// Undoes a previously successful action for an order.
    async fn compensate(&self, order: &Order) -> Result<(), ClientError>;
}
