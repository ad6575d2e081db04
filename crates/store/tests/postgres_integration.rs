//! PostgreSQL integration tests
//!
//! These tests share one PostgreSQL container and need a running Docker
//! daemon. Run with:
//!
//! ```bash
//! cargo test -p store --test postgres_integration -- --ignored
//! ```

use std::sync::Arc;

use common::OrderId;
use domain::{Money, Order, OrderItem, OrderStatus, ShippingAddress};
use serde_json::json;
use serial_test::serial;
use sqlx::PgPool;
use store::{
    DurableStore, NewDeadLetter, NewOutboxEvent, PostgresStore, SagaExecution, StepStatus,
    StoreError,
};
use testcontainers::{ContainerAsync, runners::AsyncRunner};
use testcontainers_modules::postgres::Postgres;
use tokio::sync::OnceCell;

/// Shared container info - container stays alive for all tests
struct ContainerInfo {
    #[allow(dead_code)] // Container must stay alive for tests
    container: ContainerAsync<Postgres>,
    connection_string: String,
}

static CONTAINER: OnceCell<Arc<ContainerInfo>> = OnceCell::const_new();

async fn get_container_info() -> Arc<ContainerInfo> {
    CONTAINER
        .get_or_init(|| async {
            let container = Postgres::default().start().await.unwrap();

            let host = container.get_host().await.unwrap();
            let port = container.get_host_port_ipv4(5432).await.unwrap();

            let connection_string =
                format!("postgres://postgres:postgres@{}:{}/postgres", host, port);

            let temp_pool = PgPool::connect(&connection_string).await.unwrap();

            sqlx::raw_sql(include_str!(
                "../../../migrations/001_create_saga_tables.sql"
            ))
            .execute(&temp_pool)
            .await
            .unwrap();

            temp_pool.close().await;

            Arc::new(ContainerInfo {
                container,
                connection_string,
            })
        })
        .await
        .clone()
}

/// Get a fresh store with its own pool and cleared tables
async fn get_test_store() -> PostgresStore {
    let info = get_container_info().await;

    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(5)
        .connect(&info.connection_string)
        .await
        .unwrap();

    sqlx::query(
        "TRUNCATE TABLE orders, outbox_events, idempotency_records, saga_steps, saga_executions, dead_letters",
    )
    .execute(&pool)
    .await
    .unwrap();

    PostgresStore::new(pool)
}

fn test_order(id: &str) -> Order {
    Order::new(
        OrderId::new(id),
        "CUST-123",
        vec![OrderItem::new("PROD-001", 2, Money::from_cents(2999))],
        ShippingAddress::new("123 Main St", "Springfield", "12345"),
    )
}

#[tokio::test]
#[serial]
#[ignore = "requires a running Docker daemon"]
async fn order_and_outbox_event_commit_together() {
    let store = get_test_store().await;
    let order = test_order("ORD-1");

    let event_id = store
        .insert_order_with_event(
            &order,
            NewOutboxEvent::new("ORD-1", "order.created", serde_json::to_value(&order).unwrap()),
        )
        .await
        .unwrap();

    let stored = store.get_order(&order.id).await.unwrap().unwrap();
    assert_eq!(stored.customer_id, "CUST-123");
    assert_eq!(stored.status, OrderStatus::Pending);
    assert_eq!(stored.total_amount(), Money::from_cents(5998));

    let pending = store.unpublished_events(10).await.unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].id, event_id);
    assert_eq!(pending[0].event_type, "order.created");
}

#[tokio::test]
#[serial]
#[ignore = "requires a running Docker daemon"]
async fn resubmission_replaces_the_order_row() {
    let store = get_test_store().await;
    let order = test_order("ORD-1");
    store
        .insert_order_with_event(&order, NewOutboxEvent::new("ORD-1", "order.created", json!({})))
        .await
        .unwrap();

    let mut resubmitted = test_order("ORD-1");
    resubmitted.customer_id = "CUST-999".to_string();
    store
        .insert_order_with_event(
            &resubmitted,
            NewOutboxEvent::new("ORD-1", "order.created", json!({})),
        )
        .await
        .unwrap();

    let stored = store.get_order(&order.id).await.unwrap().unwrap();
    assert_eq!(stored.customer_id, "CUST-999");
    assert_eq!(store.unpublished_events(10).await.unwrap().len(), 2);
}

#[tokio::test]
#[serial]
#[ignore = "requires a running Docker daemon"]
async fn mark_published_removes_from_drain_set() {
    let store = get_test_store().await;
    let first = store
        .append_outbox_event(NewOutboxEvent::new("ORD-1", "order.created", json!({})))
        .await
        .unwrap();
    let second = store
        .append_outbox_event(NewOutboxEvent::new("ORD-2", "order.created", json!({})))
        .await
        .unwrap();

    store.mark_published(first).await.unwrap();

    let pending = store.unpublished_events(10).await.unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].id, second);

    // Idempotent across relay instances.
    store.mark_published(first).await.unwrap();
}

#[tokio::test]
#[serial]
#[ignore = "requires a running Docker daemon"]
async fn idempotency_claim_is_exclusive_and_releasable() {
    let store = get_test_store().await;

    assert!(store.claim_idempotency_key("ORD-1:order.created").await.unwrap());
    assert!(!store.claim_idempotency_key("ORD-1:order.created").await.unwrap());

    store
        .record_idempotency_result("ORD-1:order.created", json!({"saga_started": true}))
        .await
        .unwrap();
    let record = store
        .get_idempotency_record("ORD-1:order.created")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(record.result, Some(json!({"saga_started": true})));

    store
        .release_idempotency_key("ORD-1:order.created")
        .await
        .unwrap();
    assert!(store.claim_idempotency_key("ORD-1:order.created").await.unwrap());
}

#[tokio::test]
#[serial]
#[ignore = "requires a running Docker daemon"]
async fn second_active_execution_is_rejected() {
    let store = get_test_store().await;

    let first = SagaExecution::new(OrderId::new("ORD-1"), &["cms_approval", "route_planning"]);
    store.insert_execution(&first).await.unwrap();

    let second = SagaExecution::new(OrderId::new("ORD-1"), &["cms_approval"]);
    let err = store.insert_execution(&second).await.unwrap_err();
    assert!(matches!(err, StoreError::ActiveExecutionExists { .. }));
}

#[tokio::test]
#[serial]
#[ignore = "requires a running Docker daemon"]
async fn execution_updates_persist_step_state() {
    let store = get_test_store().await;

    let mut execution = SagaExecution::new(OrderId::new("ORD-1"), &["cms_approval"]);
    store.insert_execution(&execution).await.unwrap();

    execution.status = OrderStatus::Failed;
    execution.error = Some("route not found".to_string());
    execution.completed_at = Some(chrono::Utc::now());
    execution.steps[0].status = StepStatus::Compensated;
    execution.steps[0].result = Some(json!({"approval_id": "CMS-ORD-1"}));
    store.update_execution(&execution).await.unwrap();

    let loaded = store.get_execution(execution.saga_id).await.unwrap().unwrap();
    assert_eq!(loaded.status, OrderStatus::Failed);
    assert_eq!(loaded.error.as_deref(), Some("route not found"));
    assert_eq!(loaded.steps[0].status, StepStatus::Compensated);
    assert!(loaded.completed_at.is_some());

    // The terminal execution no longer blocks a resubmission.
    assert!(
        store
            .active_execution_for_order(&OrderId::new("ORD-1"))
            .await
            .unwrap()
            .is_none()
    );
    let fresh = SagaExecution::new(OrderId::new("ORD-1"), &["cms_approval"]);
    store.insert_execution(&fresh).await.unwrap();
}

#[tokio::test]
#[serial]
#[ignore = "requires a running Docker daemon"]
async fn dead_letters_are_listed_and_taken() {
    let store = get_test_store().await;

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

    let taken = store.take_dead_letter(id).await.unwrap().unwrap();
    assert_eq!(taken.error, "handler exploded");
    assert!(store.dead_letters("saga_queue").await.unwrap().is_empty());
}
