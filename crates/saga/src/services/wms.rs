//! Warehouse management service client (inventory allocation).

use std::collections::HashSet;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use domain::Order;
use serde_json::{Value, json};

use crate::client::{ClientError, ServiceClient};

#[derive(Debug, Default)]
struct InMemoryWmsState {
    allocations: HashSet<String>,
    execute_calls: u32,
    compensate_calls: u32,
    fail_on_execute: bool,
    fail_on_compensate: bool,
}

/// In-memory WMS client for testing.
#[derive(Debug, Clone, Default)]
pub struct InMemoryWmsClient {
    state: Arc<RwLock<InMemoryWmsState>>,
}

impl InMemoryWmsClient {
    /// Creates a new in-memory WMS client.
    pub fn new() -> Self {
        Self::default()
    }

    /// Configures allocation calls to fail with "insufficient inventory".
    pub fn set_fail_on_execute(&self, fail: bool) {
        self.state.write().unwrap().fail_on_execute = fail;
    }

    /// Configures release calls to fail until cleared.
    pub fn set_fail_on_compensate(&self, fail: bool) {
        self.state.write().unwrap().fail_on_compensate = fail;
    }

    /// Returns the number of currently held allocations.
    pub fn allocation_count(&self) -> usize {
        self.state.read().unwrap().allocations.len()
    }

    /// Returns how many allocation calls were made.
    pub fn execute_calls(&self) -> u32 {
        self.state.read().unwrap().execute_calls
    }

    /// Returns how many release calls were made.
    pub fn compensate_calls(&self) -> u32 {
        self.state.read().unwrap().compensate_calls
    }
}

#[async_trait]
impl ServiceClient for InMemoryWmsClient {
    async fn execute(&self, order: &Order) -> Result<Value, ClientError> {
        let mut state = self.state.write().unwrap();
        state.execute_calls += 1;

        if state.fail_on_execute {
            return Err(ClientError::Rejected(
                "insufficient inventory".to_string(),
            ));
        }
        if order.items.is_empty() {
            return Err(ClientError::Rejected("no items to allocate".to_string()));
        }

        state.allocations.insert(order.id.to_string());
        Ok(json!({
            "allocation_id": format!("ALLOC-{}", order.id),
            "status": "allocated",
        }))
    }

    async fn compensate(&self, order: &Order) -> Result<(), ClientError> {
        let mut state = self.state.write().unwrap();
        state.compensate_calls += 1;

        if state.fail_on_compensate {
            return Err(ClientError::Unavailable("WMS unreachable".to_string()));
        }

        state.allocations.remove(&order.id.to_string());
        Ok(())
    }
}
