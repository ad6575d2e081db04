//! Route optimization service client (delivery route planning).

use std::collections::HashSet;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use domain::Order;
use serde_json::{Value, json};

use crate::client::{ClientError, ServiceClient};

#[derive(Debug, Default)]
struct InMemoryRosState {
    routes: HashSet<String>,
    execute_calls: u32,
    compensate_calls: u32,
    fail_on_execute: bool,
    fail_on_compensate: bool,
}

/// In-memory ROS client for testing.
#[derive(Debug, Clone, Default)]
pub struct InMemoryRosClient {
    state: Arc<RwLock<InMemoryRosState>>,
}

impl InMemoryRosClient {
    /// Creates a new in-memory ROS client.
    pub fn new() -> Self {
        Self::default()
    }

    /// Configures planning calls to fail with "route not found".
    pub fn set_fail_on_execute(&self, fail: bool) {
        self.state.write().unwrap().fail_on_execute = fail;
    }

    /// Configures cancellation calls to fail until cleared.
    pub fn set_fail_on_compensate(&self, fail: bool) {
        self.state.write().unwrap().fail_on_compensate = fail;
    }

    /// Returns the number of currently planned routes.
    pub fn route_count(&self) -> usize {
        self.state.read().unwrap().routes.len()
    }

    /// Returns how many planning calls were made.
    pub fn execute_calls(&self) -> u32 {
        self.state.read().unwrap().execute_calls
    }

    /// Returns how many cancellation calls were made.
    pub fn compensate_calls(&self) -> u32 {
        self.state.read().unwrap().compensate_calls
    }
}

#[async_trait]
impl ServiceClient for InMemoryRosClient {
    async fn execute(&self, order: &Order) -> Result<Value, ClientError> {
        let mut state = self.state.write().unwrap();
        state.execute_calls += 1;

        if state.fail_on_execute {
            return Err(ClientError::Rejected("route not found".to_string()));
        }
        if order.shipping_address.is_incomplete() {
            return Err(ClientError::Rejected(
                "missing shipping_address".to_string(),
            ));
        }

        state.routes.insert(order.id.to_string());
        Ok(json!({
            "route_id": format!("ROUTE-{}", order.id),
            "estimated_delivery": "2-3 days",
        }))
    }

    async fn compensate(&self, order: &Order) -> Result<(), ClientError> {
        let mut state = self.state.write().unwrap();
        state.compensate_calls += 1;

        if state.fail_on_compensate {
            return Err(ClientError::Unavailable("ROS unreachable".to_string()));
        }

        state.routes.remove(&order.id.to_string());
        Ok(())
    }
}
