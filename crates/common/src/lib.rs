//! Shared identifier types used across the order saga workspace.

pub mod types;

pub use types::{MessageId, OrderId, SagaId};
