//! Order domain model for the saga engine.
//!
//! Holds the order aggregate, its value objects, and the status state
//! machine shared by the order row and the saga execution record. The
//! domain is persistence-free; the durable store and orchestrator build
//! on top of it.

pub mod error;
pub mod order;
pub mod status;

pub use error::DomainError;
pub use order::{Money, Order, OrderItem, ShippingAddress};
pub use status::OrderStatus;
