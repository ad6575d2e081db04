//! Message transport layer.
//!
//! Defines the JSON [`MessageEnvelope`] carried on the wire, the
//! [`MessageTransport`] trait the publisher and consumer program
//! against, and an in-memory topic broker with durable-queue semantics
//! (redelivery counts, per-queue prefetch, dead-letter routing) for
//! tests and single-process deployments.

pub mod envelope;
pub mod error;
pub mod memory;
pub mod transport;

pub use envelope::MessageEnvelope;
pub use error::{Result, TransportError};
pub use memory::InMemoryBroker;
pub use transport::{Delivery, MessageTransport};
