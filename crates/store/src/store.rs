//! The durable store trait.

use async_trait::async_trait;
use common::{OrderId, SagaId};
use domain::{Order, OrderStatus};
use serde_json::Value;

use crate::dead_letter::{DeadLetterRecord, NewDeadLetter};
use crate::error::Result;
use crate::execution::SagaExecution;
use crate::idempotency::IdempotencyRecord;
use crate::outbox::{NewOutboxEvent, OutboxEvent};

/// Single source of truth for orders, outbox events, idempotency keys,
/// saga executions, and dead letters.
///
/// Implementations must make [`insert_order_with_event`] atomic (both
/// rows or neither), back [`claim_idempotency_key`] with a uniqueness
/// guarantee safe under concurrent duplicate deliveries, and reject a
/// second non-terminal execution for the same order in
/// [`insert_execution`].
///
/// [`insert_order_with_event`]: DurableStore::insert_order_with_event
/// [`claim_idempotency_key`]: DurableStore::claim_idempotency_key
/// [`insert_execution`]: DurableStore::insert_execution
#[async_trait]
pub trait DurableStore: Send + Sync {
    // --- orders ---

    /// Writes the order row and its outbox event in one transaction.
    ///
    /// Resubmission of an existing order id replaces the order row (the
    /// previous terminal execution remains for audit). Returns the
    /// outbox event id.
    async fn insert_order_with_event(&self, order: &Order, event: NewOutboxEvent) -> Result<i64>;

    /// Fetches an order by id.
    async fn get_order(&self, id: &OrderId) -> Result<Option<Order>>;

    /// Updates the status on the order row.
    async fn update_order_status(&self, id: &OrderId, status: OrderStatus) -> Result<()>;

    // --- outbox ---

    /// Appends an outbox event outside of an intake transaction
    /// (terminal saga notifications). Returns the event id.
    async fn append_outbox_event(&self, event: NewOutboxEvent) -> Result<i64>;

    /// Returns up to `limit` unpublished events ordered by id.
    async fn unpublished_events(&self, limit: usize) -> Result<Vec<OutboxEvent>>;

    /// Marks an event as published. Publishing an already published row
    /// is a no-op, keeping the claim idempotent across relay instances.
    async fn mark_published(&self, event_id: i64) -> Result<()>;

    // --- idempotency ---

    /// Atomically claims an idempotency key.
    ///
    /// Returns `true` if the key was inserted, `false` if it already
    /// existed (duplicate delivery, already handled).
    async fn claim_idempotency_key(&self, key: &str) -> Result<bool>;

    /// Records the cached handler outcome for a claimed key.
    async fn record_idempotency_result(&self, key: &str, result: Value) -> Result<()>;

    /// Releases a claim after a failed handler run so a redelivery can
    /// retry.
    async fn release_idempotency_key(&self, key: &str) -> Result<()>;

    /// Fetches an idempotency record by key.
    async fn get_idempotency_record(&self, key: &str) -> Result<Option<IdempotencyRecord>>;

    // --- saga executions ---

    /// Inserts a fresh execution.
    ///
    /// Fails with [`StoreError::ActiveExecutionExists`] when a
    /// non-terminal execution already exists for the order.
    ///
    /// [`StoreError::ActiveExecutionExists`]: crate::StoreError::ActiveExecutionExists
    async fn insert_execution(&self, execution: &SagaExecution) -> Result<()>;

    /// Persists the current execution state (status, steps, error,
    /// completion time).
    async fn update_execution(&self, execution: &SagaExecution) -> Result<()>;

    /// Fetches an execution by saga id.
    async fn get_execution(&self, saga_id: SagaId) -> Result<Option<SagaExecution>>;

    /// Returns the non-terminal execution for an order, if any.
    async fn active_execution_for_order(&self, order_id: &OrderId)
    -> Result<Option<SagaExecution>>;

    // --- dead letters ---

    /// Records a message that exhausted its retry budget. Returns the
    /// dead letter id.
    async fn insert_dead_letter(&self, dead: NewDeadLetter) -> Result<i64>;

    /// Lists dead letters for a queue, oldest first.
    async fn dead_letters(&self, queue: &str) -> Result<Vec<DeadLetterRecord>>;

    /// Removes a dead letter for manual disposition (requeue or
    /// discard), returning it.
    async fn take_dead_letter(&self, id: i64) -> Result<Option<DeadLetterRecord>>;
}
