//! PostgreSQL-backed durable store.

use async_trait::async_trait;
use common::{OrderId, SagaId};
use domain::{Order, OrderStatus};
use serde_json::Value;
use sqlx::{PgPool, Row, postgres::PgRow};
use uuid::Uuid;

use crate::dead_letter::{DeadLetterRecord, NewDeadLetter};
use crate::error::{Result, StoreError};
use crate::execution::{SagaExecution, SagaStepRecord, StepStatus};
use crate::idempotency::IdempotencyRecord;
use crate::outbox::{NewOutboxEvent, OutboxEvent};
use crate::store::DurableStore;

/// PostgreSQL implementation of [`DurableStore`].
///
/// Multi-row writes run in transactions; the idempotency claim and the
/// one-active-execution-per-order rule are backed by unique constraints
/// so they hold across concurrent processes.
#[derive(Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Creates a new PostgreSQL store.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> std::result::Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("../../migrations").run(&self.pool).await
    }

    fn row_to_order(row: PgRow) -> Result<Order> {
        let status_raw: String = row.try_get("status")?;
        let status = OrderStatus::parse(&status_raw)
            .ok_or_else(|| StoreError::Corrupt(format!("unknown order status {status_raw:?}")))?;
        Ok(Order {
            id: OrderId::new(row.try_get::<String, _>("id")?),
            customer_id: row.try_get("customer_id")?,
            items: serde_json::from_value(row.try_get("items")?)?,
            shipping_address: serde_json::from_value(row.try_get("shipping_address")?)?,
            status,
            created_at: row.try_get("created_at")?,
        })
    }

    fn row_to_outbox_event(row: PgRow) -> Result<OutboxEvent> {
        Ok(OutboxEvent {
            id: row.try_get("id")?,
            aggregate_id: row.try_get("aggregate_id")?,
            event_type: row.try_get("event_type")?,
            payload: row.try_get("payload")?,
            created_at: row.try_get("created_at")?,
            published_at: row.try_get("published_at")?,
        })
    }

    fn row_to_step(row: PgRow) -> Result<SagaStepRecord> {
        let status_raw: String = row.try_get("status")?;
        let status = StepStatus::parse(&status_raw)
            .ok_or_else(|| StoreError::Corrupt(format!("unknown step status {status_raw:?}")))?;
        Ok(SagaStepRecord {
            name: row.try_get("name")?,
            status,
            result: row.try_get("result")?,
            error: row.try_get("error")?,
            executed_at: row.try_get("executed_at")?,
        })
    }

    fn row_to_execution(row: PgRow, steps: Vec<SagaStepRecord>) -> Result<SagaExecution> {
        let status_raw: String = row.try_get("status")?;
        let status = OrderStatus::parse(&status_raw)
            .ok_or_else(|| StoreError::Corrupt(format!("unknown saga status {status_raw:?}")))?;
        Ok(SagaExecution {
            saga_id: SagaId::from_uuid(row.try_get::<Uuid, _>("saga_id")?),
            order_id: OrderId::new(row.try_get::<String, _>("order_id")?),
            status,
            steps,
            error: row.try_get("error")?,
            started_at: row.try_get("started_at")?,
            completed_at: row.try_get("completed_at")?,
        })
    }

    async fn steps_for(&self, saga_id: SagaId) -> Result<Vec<SagaStepRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT name, status, result, error, executed_at
            FROM saga_steps
            WHERE saga_id = $1
            ORDER BY position ASC
            "#,
        )
        .bind(saga_id.as_uuid())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::row_to_step).collect()
    }

    fn row_to_dead_letter(row: PgRow) -> Result<DeadLetterRecord> {
        Ok(DeadLetterRecord {
            id: row.try_get("id")?,
            original_message: row.try_get("original_message")?,
            queue: row.try_get("queue")?,
            error: row.try_get("error")?,
            attempts: row.try_get::<i32, _>("attempts")? as u32,
            first_failed_at: row.try_get("first_failed_at")?,
            last_failed_at: row.try_get("last_failed_at")?,
        })
    }
}

#[async_trait]
impl DurableStore for PostgresStore {
    async fn insert_order_with_event(&self, order: &Order, event: NewOutboxEvent) -> Result<i64> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO orders (id, customer_id, items, shipping_address, status, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (id) DO UPDATE SET
                customer_id = EXCLUDED.customer_id,
                items = EXCLUDED.items,
                shipping_address = EXCLUDED.shipping_address,
                status = EXCLUDED.status,
                created_at = EXCLUDED.created_at
            "#,
        )
        .bind(order.id.as_str())
        .bind(&order.customer_id)
        .bind(serde_json::to_value(&order.items)?)
        .bind(serde_json::to_value(&order.shipping_address)?)
        .bind(order.status.as_str())
        .bind(order.created_at)
        .execute(&mut *tx)
        .await?;

        let event_id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO outbox_events (aggregate_id, event_type, payload, created_at)
            VALUES ($1, $2, $3, now())
            RETURNING id
            "#,
        )
        .bind(&event.aggregate_id)
        .bind(&event.event_type)
        .bind(&event.payload)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        tracing::debug!(order_id = %order.id, event_id, "order accepted with outbox event");
        Ok(event_id)
    }

    async fn get_order(&self, id: &OrderId) -> Result<Option<Order>> {
        let row = sqlx::query(
            r#"
            SELECT id, customer_id, items, shipping_address, status, created_at
            FROM orders
            WHERE id = $1
            "#,
        )
        .bind(id.as_str())
        .fetch_optional(&self.pool)
        .await?;

        row.map(Self::row_to_order).transpose()
    }

    async fn update_order_status(&self, id: &OrderId, status: OrderStatus) -> Result<()> {
        let result = sqlx::query("UPDATE orders SET status = $2 WHERE id = $1")
            .bind(id.as_str())
            .bind(status.as_str())
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(format!("order {id}")));
        }
        Ok(())
    }

    async fn append_outbox_event(&self, event: NewOutboxEvent) -> Result<i64> {
        let event_id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO outbox_events (aggregate_id, event_type, payload, created_at)
            VALUES ($1, $2, $3, now())
            RETURNING id
            "#,
        )
        .bind(&event.aggregate_id)
        .bind(&event.event_type)
        .bind(&event.payload)
        .fetch_one(&self.pool)
        .await?;

        Ok(event_id)
    }

    async fn unpublished_events(&self, limit: usize) -> Result<Vec<OutboxEvent>> {
        let rows = sqlx::query(
            r#"
            SELECT id, aggregate_id, event_type, payload, created_at, published_at
            FROM outbox_events
            WHERE published_at IS NULL
            ORDER BY id ASC
            LIMIT $1
            "#,
        )
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::row_to_outbox_event).collect()
    }

    async fn mark_published(&self, event_id: i64) -> Result<()> {
        sqlx::query("UPDATE outbox_events SET published_at = now() WHERE id = $1 AND published_at IS NULL")
            .bind(event_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn claim_idempotency_key(&self, key: &str) -> Result<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO idempotency_records (key, seen_at)
            VALUES ($1, now())
            ON CONFLICT (key) DO NOTHING
            "#,
        )
        .bind(key)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn record_idempotency_result(&self, key: &str, result: Value) -> Result<()> {
        sqlx::query("UPDATE idempotency_records SET result = $2 WHERE key = $1")
            .bind(key)
            .bind(result)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn release_idempotency_key(&self, key: &str) -> Result<()> {
        sqlx::query("DELETE FROM idempotency_records WHERE key = $1")
            .bind(key)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn get_idempotency_record(&self, key: &str) -> Result<Option<IdempotencyRecord>> {
        let row = sqlx::query("SELECT key, result, seen_at FROM idempotency_records WHERE key = $1")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => Ok(Some(IdempotencyRecord {
                key: row.try_get("key")?,
                result: row.try_get("result")?,
                seen_at: row.try_get("seen_at")?,
            })),
            None => Ok(None),
        }
    }

    async fn insert_execution(&self, execution: &SagaExecution) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO saga_executions (saga_id, order_id, status, error, started_at, completed_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(execution.saga_id.as_uuid())
        .bind(execution.order_id.as_str())
        .bind(execution.status.as_str())
        .bind(&execution.error)
        .bind(execution.started_at)
        .bind(execution.completed_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| {
            if let sqlx::Error::Database(ref db_err) = e
                && db_err.constraint() == Some("uq_active_execution")
            {
                return StoreError::ActiveExecutionExists {
                    order_id: execution.order_id.to_string(),
                };
            }
            StoreError::Database(e)
        })?;

        for (position, step) in execution.steps.iter().enumerate() {
            sqlx::query(
                r#"
                INSERT INTO saga_steps (saga_id, position, name, status, result, error, executed_at)
                VALUES ($1, $2, $3, $4, $5, $6, $7)
                "#,
            )
            .bind(execution.saga_id.as_uuid())
            .bind(position as i32)
            .bind(&step.name)
            .bind(step.status.as_str())
            .bind(&step.result)
            .bind(&step.error)
            .bind(step.executed_at)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn update_execution(&self, execution: &SagaExecution) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            r#"
            UPDATE saga_executions
            SET status = $2, error = $3, completed_at = $4
            WHERE saga_id = $1
            "#,
        )
        .bind(execution.saga_id.as_uuid())
        .bind(execution.status.as_str())
        .bind(&execution.error)
        .bind(execution.completed_at)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(format!(
                "saga execution {}",
                execution.saga_id
            )));
        }

        for (position, step) in execution.steps.iter().enumerate() {
            sqlx::query(
                r#"
                UPDATE saga_steps
                SET status = $3, result = $4, error = $5, executed_at = $6
                WHERE saga_id = $1 AND position = $2
                "#,
            )
            .bind(execution.saga_id.as_uuid())
            .bind(position as i32)
            .bind(step.status.as_str())
            .bind(&step.result)
            .bind(&step.error)
            .bind(step.executed_at)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn get_execution(&self, saga_id: SagaId) -> Result<Option<SagaExecution>> {
        let row = sqlx::query(
            r#"
            SELECT saga_id, order_id, status, error, started_at, completed_at
            FROM saga_executions
            WHERE saga_id = $1
            "#,
        )
        .bind(saga_id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => {
                let steps = self.steps_for(saga_id).await?;
                Ok(Some(Self::row_to_execution(row, steps)?))
            }
            None => Ok(None),
        }
    }

    async fn active_execution_for_order(
        &self,
        order_id: &OrderId,
    ) -> Result<Option<SagaExecution>> {
        let row = sqlx::query(
            r#"
            SELECT saga_id, order_id, status, error, started_at, completed_at
            FROM saga_executions
            WHERE order_id = $1 AND status NOT IN ('CONFIRMED', 'FAILED')
            "#,
        )
        .bind(order_id.as_str())
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => {
                let saga_id = SagaId::from_uuid(row.try_get::<Uuid, _>("saga_id")?);
                let steps = self.steps_for(saga_id).await?;
                Ok(Some(Self::row_to_execution(row, steps)?))
            }
            None => Ok(None),
        }
    }

    async fn insert_dead_letter(&self, dead: NewDeadLetter) -> Result<i64> {
        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO dead_letters
                (original_message, queue, error, attempts, first_failed_at, last_failed_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING id
            "#,
        )
        .bind(&dead.original_message)
        .bind(&dead.queue)
        .bind(&dead.error)
        .bind(dead.attempts as i32)
        .bind(dead.first_failed_at)
        .bind(dead.last_failed_at)
        .fetch_one(&self.pool)
        .await?;

        Ok(id)
    }

    async fn dead_letters(&self, queue: &str) -> Result<Vec<DeadLetterRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT id, original_message, queue, error, attempts, first_failed_at, last_failed_at
            FROM dead_letters
            WHERE queue = $1
            ORDER BY id ASC
            "#,
        )
        .bind(queue)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::row_to_dead_letter).collect()
    }

    async fn take_dead_letter(&self, id: i64) -> Result<Option<DeadLetterRecord>> {
        let row = sqlx::query(
            r#"
            DELETE FROM dead_letters
            WHERE id = $1
            RETURNING id, original_message, queue, error, attempts, first_failed_at, last_failed_at
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Self::row_to_dead_letter).transpose()
    }
}
