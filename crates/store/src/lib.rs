//! Durable store for the saga engine.
//!
//! Owns the persisted record types (outbox events, idempotency keys,
//! saga executions, dead letters) and the [`DurableStore`] trait that
//! every component writes through. Two implementations are provided:
//! an in-memory store for tests and single-process use, and a
//! PostgreSQL store backed by sqlx.
//!
//! The store is pure data access: state transitions are decided by the
//! orchestrator and messaging layers, the store only enforces the
//! structural invariants (monotonic outbox ids, unique idempotency
//! keys, at most one active execution per order).

pub mod dead_letter;
pub mod error;
pub mod execution;
pub mod idempotency;
pub mod memory;
pub mod outbox;
pub mod postgres;
pub mod store;

pub use dead_letter::{DeadLetterRecord, NewDeadLetter};
pub use error::{Result, StoreError};
pub use execution::{SagaExecution, SagaStepRecord, StepStatus};
pub use idempotency::IdempotencyRecord;
pub use memory::InMemoryStore;
pub use outbox::{NewOutboxEvent, OutboxEvent};
pub use postgres::PostgresStore;
pub use store::DurableStore;
