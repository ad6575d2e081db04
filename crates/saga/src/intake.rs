//! Order intake: the write-side entry point.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use common::OrderId;
use domain::Order;
use store::{DurableStore, NewOutboxEvent};

use crate::error::SagaError;
use crate::order_flow::EVENT_ORDER_CREATED;

/// Receipt returned to the submitter immediately on acceptance.
///
/// Acceptance is definitive: the order row and its `order.created`
/// outbox event are committed together, so the saga will run even if
/// everything downstream is down right now.
#[derive(Debug, Clone)]
pub struct IntakeReceipt {
    pub order_id: OrderId,
    pub accepted_at: DateTime<Utc>,
}

/// Validates and accepts incoming orders.
pub struct OrderIntake<S> {
    store: Arc<S>,
}

impl<S> OrderIntake<S>
where
    S: DurableStore,
{
    /// Creates an intake over a store.
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Accepts an order, or rejects it without persisting anything.
    #[tracing::instrument(skip(self, order), fields(order_id = %order.id))]
    pub async fn submit(&self, order: Order) -> Result<IntakeReceipt, SagaError> {
        order.validate()?;

        let payload = serde_json::to_value(&order)?;
        self.store
            .insert_order_with_event(
                &order,
                NewOutboxEvent::new(order.id.as_str(), EVENT_ORDER_CREATED, payload),
            )
            .await?;

        metrics::counter!("orders_accepted_total").increment(1);
        tracing::info!("order accepted");
        Ok(IntakeReceipt {
            order_id: order.id,
            accepted_at: Utc::now(),
        })
    }
}
