//! Customer management service client (order approval).

use std::collections::HashSet;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use domain::Order;
use serde_json::{Value, json};

use crate::client::{ClientError, ServiceClient};

#[derive(Debug, Default)]
struct InMemoryCmsState {
    approvals: HashSet<String>,
    execute_calls: u32,
    compensate_calls: u32,
    fail_on_execute: bool,
    fail_on_compensate: bool,
}

/// In-memory CMS client for testing.
#[derive(Debug, Clone, Default)]
pub struct InMemoryCmsClient {
    state: Arc<RwLock<InMemoryCmsState>>,
}

impl InMemoryCmsClient {
    /// Creates a new in-memory CMS client.
    pub fn new() -> Self {
        Self::default()
    }

    /// Configures approval calls to fail until cleared.
    pub fn set_fail_on_execute(&self, fail: bool) {
        self.state.write().unwrap().fail_on_execute = fail;
    }

    /// Configures rejection calls to fail until cleared.
    pub fn set_fail_on_compensate(&self, fail: bool) {
        self.state.write().unwrap().fail_on_compensate = fail;
    }

    /// Returns the number of currently approved orders.
    pub fn approval_count(&self) -> usize {
        self.state.read().unwrap().approvals.len()
    }

    /// Returns how many approval calls were made.
    pub fn execute_calls(&self) -> u32 {
        self.state.read().unwrap().execute_calls
    }

    /// Returns how many rejection calls were made.
    pub fn compensate_calls(&self) -> u32 {
        self.state.read().unwrap().compensate_calls
    }
}

#[async_trait]
impl ServiceClient for InMemoryCmsClient {
    async fn execute(&self, order: &Order) -> Result<Value, ClientError> {
        let mut state = self.state.write().unwrap();
        state.execute_calls += 1;

        if state.fail_on_execute {
            return Err(ClientError::Unavailable("CMS unreachable".to_string()));
        }
        if order.customer_id.is_empty() {
            return Err(ClientError::Rejected("missing customer_id".to_string()));
        }

        state.approvals.insert(order.id.to_string());
        Ok(json!({
            "approval_id": format!("CMS-{}", order.id),
            "status": "approved",
        }))
    }

    async fn compensate(&self, order: &Order) -> Result<(), ClientError> {
        let mut state = self.state.write().unwrap();
        state.compensate_calls += 1;

        if state.fail_on_compensate {
            return Err(ClientError::Unavailable("CMS unreachable".to_string()));
        }

        // Rejecting an unknown approval is fine, compensation is idempotent.
        state.approvals.remove(&order.id.to_string());
        Ok(())
    }
}
