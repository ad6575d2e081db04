//! Order processing saga.
//!
//! Orchestration-based: a central [`SagaOrchestrator`] drives the
//! CMS approval → route planning → inventory allocation sequence,
//! compensating completed steps in reverse order when a later step
//! fails. [`OrderIntake`] is the write-side entry point and
//! [`OrderCreatedHandler`] connects the orchestrator to the idempotent
//! consumer.

pub mod client;
pub mod error;
pub mod handler;
pub mod intake;
pub mod order_flow;
pub mod orchestrator;
pub mod services;
pub mod step;

pub use client::{ClientError, ServiceClient};
pub use error::SagaError;
pub use handler::OrderCreatedHandler;
pub use intake::{IntakeReceipt, OrderIntake};
pub use orchestrator::SagaOrchestrator;
pub use step::SagaStep;
