//! Saga step definition.

use std::sync::Arc;

use domain::OrderStatus;

use crate::client::ServiceClient;

/// One step of the saga: a named action with its status transitions
/// and the client that performs it.
#[derive(Clone)]
pub struct SagaStep {
    /// Stable step name, recorded on the execution.
    pub name: &'static str,
    /// Order status reached when the action succeeds.
    pub milestone: OrderStatus,
    /// Order status recorded when the action fails.
    pub failure_status: OrderStatus,
    /// Client performing the action and its compensation.
    pub client: Arc<dyn ServiceClient>,
}

impl SagaStep {
    /// Creates a step. The failure status must be one of the
    /// step-specific failure states, never a terminal one.
    pub fn new(
        name: &'static str,
        milestone: OrderStatus,
        failure_status: OrderStatus,
        client: Arc<dyn ServiceClient>,
    ) -> Self {
        debug_assert!(failure_status.is_step_failure());
        Self {
            name,
            milestone,
            failure_status,
            client,
        }
    }
}

impl std::fmt::Debug for SagaStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SagaStep")
            .field("name", &self.name)
            .field("milestone", &self.milestone)
            .field("failure_status", &self.failure_status)
            .finish_non_exhaustive()
    }
}
