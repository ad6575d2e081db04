//! The message transport trait.

use async_trait::async_trait;
use common::MessageId;

use crate::envelope::MessageEnvelope;
use crate::error::Result;

/// A message handed to a consumer, awaiting ack or nack.
#[derive(Debug, Clone)]
pub struct Delivery {
    /// Broker-assigned identifier, unique per queued copy.
    pub message_id: MessageId,
    /// Queue the message was consumed from.
    pub queue: String,
    /// Routing key the message was published with.
    pub routing_key: String,
    /// The message itself.
    pub envelope: MessageEnvelope,
    /// How many times this copy has been delivered, this one included.
    pub delivery_count: u32,
}

/// Topic-routed broker the publisher and consumer program against.
///
/// Semantics are at-least-once: a published message is fanned out to
/// every queue whose binding pattern matches the routing key, and a
/// delivery stays owned by the consumer until acked or nacked. Nack
/// with requeue puts the message back at the front of its queue; nack
/// without requeue routes it to the queue's dead-letter queue.
#[async_trait]
pub trait MessageTransport: Send + Sync {
    /// Publishes an envelope under a routing key.
    async fn publish(&self, routing_key: &str, envelope: &MessageEnvelope) -> Result<()>;

    /// Takes the next deliverable message off a queue.
    ///
    /// Returns `None` when the queue is empty or the queue's prefetch
    /// window is full of unacked deliveries.
    async fn receive(&self, queue: &str) -> Result<Option<Delivery>>;

    /// Acknowledges a delivery, removing it from the queue for good.
    async fn ack(&self, delivery: &Delivery) -> Result<()>;

    /// Rejects a delivery. With `requeue` the message becomes
    /// deliverable again; without it the message moves to the
    /// dead-letter queue.
    async fn nack(&self, delivery: &Delivery, requeue: bool) -> Result<()>;

    /// Returns the dead-lettered messages of a queue.
    async fn dead_letters(&self, queue: &str) -> Result<Vec<Delivery>>;
}
