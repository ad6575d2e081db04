//! In-memory durable store for tests and single-process use.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use common::{OrderId, SagaId};
use domain::{Order, OrderStatus};
use serde_json::Value;
use tokio::sync::RwLock;

use crate::dead_letter::{DeadLetterRecord, NewDeadLetter};
use crate::error::{Result, StoreError};
use crate::execution::SagaExecution;
use crate::idempotency::IdempotencyRecord;
use crate::outbox::{NewOutboxEvent, OutboxEvent};
use crate::store::DurableStore;

#[derive(Default)]
struct Inner {
    orders: HashMap<OrderId, Order>,
    outbox: Vec<OutboxEvent>,
    next_outbox_id: i64,
    idempotency: HashMap<String, IdempotencyRecord>,
    executions: HashMap<SagaId, SagaExecution>,
    dead_letters: Vec<DeadLetterRecord>,
    next_dead_letter_id: i64,
}

impl Inner {
    fn push_outbox(&mut self, event: NewOutboxEvent) -> i64 {
        self.next_outbox_id += 1;
        let id = self.next_outbox_id;
        self.outbox.push(OutboxEvent {
            id,
            aggregate_id: event.aggregate_id,
            event_type: event.event_type,
            payload: event.payload,
            created_at: Utc::now(),
            published_at: None,
        });
        id
    }
}

/// In-memory store implementation.
///
/// Provides the same contract as the PostgreSQL implementation; all
/// state lives behind one `RwLock`, which serializes the multi-row
/// writes the SQL implementation does transactionally.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    inner: Arc<RwLock<Inner>>,
}

impl InMemoryStore {
    /// Creates a new empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the total number of outbox rows (published or not).
    pub async fn outbox_len(&self) -> usize {
        self.inner.read().await.outbox.len()
    }

    /// Returns all outbox events of a given type, for test assertions.
    pub async fn outbox_events_of_type(&self, event_type: &str) -> Vec<OutboxEvent> {
        self.inner
            .read()
            .await
            .outbox
            .iter()
            .filter(|e| e.event_type == event_type)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl DurableStore for InMemoryStore {
    async fn insert_order_with_event(&self, order: &Order, event: NewOutboxEvent) -> Result<i64> {
        let mut inner = self.inner.write().await;
        inner.orders.insert(order.id.clone(), order.clone());
        Ok(inner.push_outbox(event))
    }

    async fn get_order(&self, id: &OrderId) -> Result<Option<Order>> {
        Ok(self.inner.read().await.orders.get(id).cloned())
    }

    async fn update_order_status(&self, id: &OrderId, status: OrderStatus) -> Result<()> {
        let mut inner = self.inner.write().await;
        let order = inner
            .orders
            .get_mut(id)
            .ok_or_else(|| StoreError::NotFound(format!("order {id}")))?;
        order.status = status;
        Ok(())
    }

    async fn append_outbox_event(&self, event: NewOutboxEvent) -> Result<i64> {
        let mut inner = self.inner.write().await;
        Ok(inner.push_outbox(event))
    }

    async fn unpublished_events(&self, limit: usize) -> Result<Vec<OutboxEvent>> {
        let inner = self.inner.read().await;
        let mut events: Vec<_> = inner
            .outbox
            .iter()
            .filter(|e| e.is_unpublished())
            .cloned()
            .collect();
        events.sort_by_key(|e| e.id);
        events.truncate(limit);
        Ok(events)
    }

    async fn mark_published(&self, event_id: i64) -> Result<()> {
        let mut inner = self.inner.write().await;
        if let Some(event) = inner.outbox.iter_mut().find(|e| e.id == event_id)
            && event.published_at.is_none()
        {
            event.published_at = Some(Utc::now());
        }
        Ok(())
    }

    async fn claim_idempotency_key(&self, key: &str) -> Result<bool> {
        let mut inner = self.inner.write().await;
        if inner.idempotency.contains_key(key) {
            return Ok(false);
        }
        inner
            .idempotency
            .insert(key.to_string(), IdempotencyRecord::claim(key));
        Ok(true)
    }

    async fn record_idempotency_result(&self, key: &str, result: Value) -> Result<()> {
        let mut inner = self.inner.write().await;
        if let Some(record) = inner.idempotency.get_mut(key) {
            record.result = Some(result);
        }
        Ok(())
    }

    async fn release_idempotency_key(&self, key: &str) -> Result<()> {
        self.inner.write().await.idempotency.remove(key);
        Ok(())
    }

    async fn get_idempotency_record(&self, key: &str) -> Result<Option<IdempotencyRecord>> {
        Ok(self.inner.read().await.idempotency.get(key).cloned())
    }

    async fn insert_execution(&self, execution: &SagaExecution) -> Result<()> {
        let mut inner = self.inner.write().await;
        let active_exists = inner
            .executions
            .values()
            .any(|e| e.order_id == execution.order_id && !e.is_terminal());
        if active_exists {
            return Err(StoreError::ActiveExecutionExists {
                order_id: execution.order_id.to_string(),
            });
        }
        inner
            .executions
            .insert(execution.saga_id, execution.clone());
        Ok(())
    }

    async fn update_execution(&self, execution: &SagaExecution) -> Result<()> {
        let mut inner = self.inner.write().await;
        if !inner.executions.contains_key(&execution.saga_id) {
            return Err(StoreError::NotFound(format!(
                "saga execution {}",
                execution.saga_id
            )));
        }
        inner
            .executions
            .insert(execution.saga_id, execution.clone());
        Ok(())
    }

    async fn get_execution(&self, saga_id: SagaId) -> Result<Option<SagaExecution>> {
        Ok(self.inner.read().await.executions.get(&saga_id).cloned())
    }

    async fn active_execution_for_order(
        &self,
        order_id: &OrderId,
    ) -> Result<Option<SagaExecution>> {
        Ok(self
            .inner
            .read()
            .await
            .executions
            .values()
            .find(|e| &e.order_id == order_id && !e.is_terminal())
            .cloned())
    }

    async fn insert_dead_letter(&self, dead: NewDeadLetter) -> Result<i64> {
        let mut inner = self.inner.write().await;
        inner.next_dead_letter_id += 1;
        let id = inner.next_dead_letter_id;
        inner.dead_letters.push(DeadLetterRecord {
            id,
            original_message: dead.original_message,
            queue: dead.queue,
            error: dead.error,
            attempts: dead.attempts,
            first_failed_at: dead.first_failed_at,
            last_failed_at: dead.last_failed_at,
        });
        Ok(id)
    }

    async fn dead_letters(&self, queue: &str) -> Result<Vec<DeadLetterRecord>> {
        Ok(self
            .inner
            .read()
            .await
            .dead_letters
            .iter()
            .filter(|d| d.queue == queue)
            .cloned()
            .collect())
    }

    async fn take_dead_letter(&self, id: i64) -> Result<Option<DeadLetterRecord>> {
        let mut inner = self.inner.write().await;
        let pos = inner.dead_letters.iter().position(|d| d.id == id);
        Ok(pos.map(|p| inner.dead_letters.remove(p)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use domain::{Money, OrderItem, ShippingAddress};
    use serde_json::json;

    fn test_order(id: &str) -> Order {
        Order::new(
            OrderId::new(id),
            "CUST-123",
            vec![OrderItem::new("PROD-001", 1, Money::from_cents(2999))],
            ShippingAddress::new("123 Main St", "Springfield", "12345"),
        )
    }

    fn created_event(order: &Order) -> NewOutboxEvent {
        NewOutboxEvent::new(
            order.id.as_str(),
            "order.created",
            serde_json::to_value(order).unwrap(),
        )
    }

    #[tokio::test]
    async fn intake_writes_order_and_event_together() {
        let store = InMemoryStore::new();
        let order = test_order("ORD-1");

        let event_id = store
            .insert_order_with_event(&order, created_event(&order))
            .await
            .unwrap();

        assert_eq!(event_id, 1);
        assert!(store.get_order(&order.id).await.unwrap().is_some());
        let pending = store.unpublished_events(10).await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].event_type, "order.created");
        assert_eq!(pending[0].aggregate_id, "ORD-1");
    }

    #[tokio::test]
    async fn outbox_ids_are_monotonic_and_ordered() {
        let store = InMemoryStore::new();
        for i in 0..5 {
            store
                .append_outbox_event(NewOutboxEvent::new(
                    format!("ORD-{i}"),
                    "order.created",
                    json!({}),
                ))
                .await
                .unwrap();
        }

        let events = store.unpublished_events(10).await.unwrap();
        let ids: Vec<i64> = events.iter().map(|e| e.id).collect();
        assert_eq!(ids, vec![1, 2, 3, 4, 5]);

        let limited = store.unpublished_events(2).await.unwrap();
        assert_eq!(limited.len(), 2);
        assert_eq!(limited[0].id, 1);
    }

    #[tokio::test]
    async fn published_rows_leave_the_drain_set() {
        let store = InMemoryStore::new();
        let id = store
            .append_outbox_event(NewOutboxEvent::new("ORD-1", "order.created", json!({})))
            .await
            .unwrap();

        store.mark_published(id).await.unwrap();
        assert!(store.unpublished_events(10).await.unwrap().is_empty());

        // Marking twice is a no-op.
        store.mark_published(id).await.unwrap();
        assert_eq!(store.outbox_len().await, 1);
    }

    #[tokio::test]
    async fn idempotency_claim_is_exclusive() {
        let store = InMemoryStore::new();
        assert!(store.claim_idempotency_key("ORD-1:order.created").await.unwrap());
        assert!(!store.claim_idempotency_key("ORD-1:order.created").await.unwrap());

        store
            .record_idempotency_result("ORD-1:order.created", json!({"handled": true}))
            .await
            .unwrap();
        let record = store
            .get_idempotency_record("ORD-1:order.created")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(record.result, Some(json!({"handled": true})));

        store
            .release_idempotency_key("ORD-1:order.created")
            .await
            .unwrap();
        assert!(store.claim_idempotency_key("ORD-1:order.created").await.unwrap());
    }

    #[tokio::test]
    async fn one_active_execution_per_order() {
        let store = InMemoryStore::new();
        let first = SagaExecution::new(OrderId::new("ORD-1"), &["a"]);
        store.insert_execution(&first).await.unwrap();

        let second = SagaExecution::new(OrderId::new("ORD-1"), &["a"]);
        let err = store.insert_execution(&second).await.unwrap_err();
        assert!(matches!(err, StoreError::ActiveExecutionExists { .. }));

        // A different order is unaffected.
        let other = SagaExecution::new(OrderId::new("ORD-2"), &["a"]);
        store.insert_execution(&other).await.unwrap();
    }

    #[tokio::test]
    async fn terminal_execution_allows_resubmission() {
        let store = InMemoryStore::new();
        let mut first = SagaExecution::new(OrderId::new("ORD-1"), &["a"]);
        store.insert_execution(&first).await.unwrap();

        first.status = OrderStatus::Failed;
        store.update_execution(&first).await.unwrap();
        assert!(
            store
                .active_execution_for_order(&OrderId::new("ORD-1"))
                .await
                .unwrap()
                .is_none()
        );

        let second = SagaExecution::new(OrderId::new("ORD-1"), &["a"]);
        store.insert_execution(&second).await.unwrap();

        // The failed execution stays for audit.
        assert!(store.get_execution(first.saga_id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn update_unknown_execution_fails() {
        let store = InMemoryStore::new();
        let execution = SagaExecution::new(OrderId::new("ORD-1"), &["a"]);
        let err = store.update_execution(&execution).await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }

    #[tokio::test]
    async fn dead_letters_kept_until_taken() {
        let store = InMemoryStore::new();
        let id = store
            .insert_dead_letter(NewDeadLetter::now(
                json!({"order_id": "ORD-1"}),
                "saga_queue",
                "handler exploded",
                3,
            ))
            .await
            .unwrap();

        let letters = store.dead_letters("saga_queue").await.unwrap();
        assert_eq!(letters.len(), 1);
        assert_eq!(letters[0].attempts, 3);
        assert!(store.dead_letters("other_queue").await.unwrap().is_empty());

        let taken = store.take_dead_letter(id).await.unwrap().unwrap();
        assert_eq!(taken.error, "handler exploded");
        assert!(store.dead_letters("saga_queue").await.unwrap().is_empty());
        assert!(store.take_dead_letter(id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn order_status_update() {
        let store = InMemoryStore::new();
        let order = test_order("ORD-1");
        store
            .insert_order_with_event(&order, created_event(&order))
            .await
            .unwrap();

        store
            .update_order_status(&order.id, OrderStatus::Confirmed)
            .await
            .unwrap();
        let stored = store.get_order(&order.id).await.unwrap().unwrap();
        assert_eq!(stored.status, OrderStatus::Confirmed);

        let err = store
            .update_order_status(&OrderId::new("ORD-404"), OrderStatus::Failed)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }
}
