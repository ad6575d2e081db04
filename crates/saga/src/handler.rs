//! Bridges `order.created` deliveries to the orchestrator.

use std::sync::Arc;

use async_trait::async_trait;
use domain::Order;
use messaging::{MessageHandler, MessagingError};
use serde_json::{Value, json};
use store::DurableStore;
use transport::Delivery;

use crate::orchestrator::SagaOrchestrator;
use crate::order_flow::SAGA_TYPE;

/// Message handler that starts a saga per accepted order.
///
/// Runs behind the idempotent consumer, so a given `order.created`
/// event reaches the orchestrator once. Handler errors (bad payload,
/// store trouble, an execution already in flight) propagate so the
/// consumer can requeue and eventually dead-letter the message.
pub struct OrderCreatedHandler<S> {
    orchestrator: Arc<SagaOrchestrator<S>>,
}

impl<S> OrderCreatedHandler<S> {
    /// Creates a handler over an orchestrator.
    pub fn new(orchestrator: Arc<SagaOrchestrator<S>>) -> Self {
        Self { orchestrator }
    }
}

#[async_trait]
impl<S> MessageHandler for OrderCreatedHandler<S>
where
    S: DurableStore,
{
    async fn handle(&self, delivery: &Delivery) -> messaging::Result<Value> {
        let order: Order = serde_json::from_value(delivery.envelope.payload.clone())
            .map_err(|e| MessagingError::Handler(format!("invalid order payload: {e}")))?;

        let execution = self
            .orchestrator
            .execute(&order)
            .await
            .map_err(|e| MessagingError::Handler(e.to_string()))?;

        Ok(json!({
            "saga_type": SAGA_TYPE,
            "saga_id": execution.saga_id,
            "status": execution.status,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::order_flow::standard_steps;
    use crate::services::{InMemoryCmsClient, InMemoryRosClient, InMemoryWmsClient};
    use common::{MessageId, OrderId};
    use domain::{Money, OrderItem, ShippingAddress};
    use store::InMemoryStore;
    use transport::MessageEnvelope;

    fn order_created_delivery(order: &Order) -> Delivery {
        Delivery {
            message_id: MessageId::new(),
            queue: "saga_queue".to_string(),
            routing_key: "order.created".to_string(),
            envelope: MessageEnvelope::new(
                "order.created",
                order.id.as_str(),
                serde_json::to_value(order).unwrap(),
            ),
            delivery_count: 1,
        }
    }

    fn setup() -> (Arc<InMemoryStore>, OrderCreatedHandler<InMemoryStore>) {
        let store = Arc::new(InMemoryStore::new());
        let steps = standard_steps(
            Arc::new(InMemoryCmsClient::new()),
            Arc::new(InMemoryRosClient::new()),
            Arc::new(InMemoryWmsClient::new()),
        );
        let orchestrator = Arc::new(SagaOrchestrator::new(store.clone(), steps));
        (store, OrderCreatedHandler::new(orchestrator))
    }

    #[tokio::test]
    async fn runs_the_saga_and_reports_the_outcome() {
        let (store, handler) = setup();
        let order = Order::new(
            OrderId::new("ORD-1"),
            "CUST-123",
            vec![OrderItem::new("PROD-001", 1, Money::from_cents(2999))],
            ShippingAddress::new("123 Main St", "Springfield", "12345"),
        );
        store
            .insert_order_with_event(
                &order,
                store::NewOutboxEvent::new("ORD-1", "order.created", json!({})),
            )
            .await
            .unwrap();

        let result = handler.handle(&order_created_delivery(&order)).await.unwrap();
        assert_eq!(result["status"], "CONFIRMED");
    }

    #[tokio::test]
    async fn garbage_payload_is_a_handler_error() {
        let (_store, handler) = setup();
        let delivery = Delivery {
            message_id: MessageId::new(),
            queue: "saga_queue".to_string(),
            routing_key: "order.created".to_string(),
            envelope: MessageEnvelope::new("order.created", "ORD-1", json!({"nope": true})),
            delivery_count: 1,
        };

        let err = handler.handle(&delivery).await.unwrap_err();
        assert!(matches!(err, MessagingError::Handler(_)));
    }
}
