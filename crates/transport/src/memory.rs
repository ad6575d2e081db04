//! In-memory topic broker.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use common::MessageId;

use crate::envelope::MessageEnvelope;
use crate::error::{Result, TransportError};
use crate::transport::{Delivery, MessageTransport};

const DEFAULT_PREFETCH: usize = 10;

/// Returns true if a topic binding pattern matches a routing key.
///
/// `*` matches exactly one dot-separated segment, `#` matches the rest
/// of the key (including nothing).
fn pattern_matches(pattern: &str, routing_key: &str) -> bool {
    fn matches(pattern: &[&str], key: &[&str]) -> bool {
        match (pattern.first(), key.first()) {
            (None, None) => true,
            (Some(&"#"), _) => {
                key.iter()
                    .enumerate()
                    .any(|(i, _)| matches(&pattern[1..], &key[i..]))
                    || matches(&pattern[1..], &[])
            }
            (Some(&"*"), Some(_)) => matches(&pattern[1..], &key[1..]),
            (Some(p), Some(k)) if p == k => matches(&pattern[1..], &key[1..]),
            _ => false,
        }
    }
    let pattern: Vec<&str> = pattern.split('.').collect();
    let key: Vec<&str> = routing_key.split('.').collect();
    matches(&pattern, &key)
}

#[derive(Debug, Clone)]
struct QueuedMessage {
    message_id: MessageId,
    routing_key: String,
    envelope: MessageEnvelope,
    /// Completed deliveries of this copy.
    delivery_count: u32,
}

#[derive(Debug, Default)]
struct Queue {
    prefetch: usize,
    ready: VecDeque<QueuedMessage>,
    unacked: HashMap<MessageId, QueuedMessage>,
    dead: Vec<Delivery>,
}

#[derive(Debug, Default)]
struct BrokerState {
    queues: HashMap<String, Queue>,
    /// Binding pattern to queue name, in declaration order.
    bindings: Vec<(String, String)>,
    fail_publish: bool,
    publish_attempts: u32,
}

/// In-memory broker for tests and single-process deployments.
#[derive(Debug, Clone, Default)]
pub struct InMemoryBroker {
    state: Arc<RwLock<BrokerState>>,
}

impl InMemoryBroker {
    /// Creates a broker with no queues.
    pub fn new() -> Self {
        Self::default()
    }

    /// Declares a queue with the default prefetch window.
    pub fn declare_queue(&self, name: impl Into<String>) {
        self.declare_queue_with_prefetch(name, DEFAULT_PREFETCH);
    }

    /// Declares a queue with an explicit prefetch window.
    pub fn declare_queue_with_prefetch(&self, name: impl Into<String>, prefetch: usize) {
        let mut state = self.state.write().unwrap();
        state.queues.entry(name.into()).or_insert_with(|| Queue {
            prefetch,
            ..Queue::default()
        });
    }

    /// Binds a queue to a routing pattern (e.g. `order.*`).
    pub fn bind(&self, queue: impl Into<String>, pattern: impl Into<String>) {
        let mut state = self.state.write().unwrap();
        state.bindings.push((pattern.into(), queue.into()));
    }

    /// Configures publish calls to fail until cleared.
    pub fn set_fail_publish(&self, fail: bool) {
        self.state.write().unwrap().fail_publish = fail;
    }

    /// Returns how many publish calls were attempted, failed included.
    pub fn publish_attempts(&self) -> u32 {
        self.state.read().unwrap().publish_attempts
    }

    /// Returns the number of ready (deliverable) messages in a queue.
    pub fn queue_depth(&self, queue: &str) -> usize {
        self.state
            .read()
            .unwrap()
            .queues
            .get(queue)
            .map_or(0, |q| q.ready.len())
    }
}

#[async_trait]
impl MessageTransport for InMemoryBroker {
    async fn publish(&self, routing_key: &str, envelope: &MessageEnvelope) -> Result<()> {
        let mut state = self.state.write().unwrap();
        state.publish_attempts += 1;

        if state.fail_publish {
            return Err(TransportError::Unavailable("broker unavailable".to_string()));
        }

        let targets: Vec<String> = state
            .bindings
            .iter()
            .filter(|(pattern, _)| pattern_matches(pattern, routing_key))
            .map(|(_, queue)| queue.clone())
            .collect();

        for name in targets {
            if let Some(queue) = state.queues.get_mut(&name) {
                queue.ready.push_back(QueuedMessage {
                    message_id: MessageId::new(),
                    routing_key: routing_key.to_string(),
                    envelope: envelope.clone(),
                    delivery_count: 0,
                });
            }
        }
        Ok(())
    }

    async fn receive(&self, queue: &str) -> Result<Option<Delivery>> {
        let mut state = self.state.write().unwrap();
        let q = state
            .queues
            .get_mut(queue)
            .ok_or_else(|| TransportError::UnknownQueue(queue.to_string()))?;

        if q.unacked.len() >= q.prefetch {
            return Ok(None);
        }

        let Some(mut message) = q.ready.pop_front() else {
            return Ok(None);
        };
        message.delivery_count += 1;

        let delivery = Delivery {
            message_id: message.message_id,
            queue: queue.to_string(),
            routing_key: message.routing_key.clone(),
            envelope: message.envelope.clone(),
            delivery_count: message.delivery_count,
        };
        q.unacked.insert(message.message_id, message);
        Ok(Some(delivery))
    }

    async fn ack(&self, delivery: &Delivery) -> Result<()> {
        let mut state = self.state.write().unwrap();
        let q = state
            .queues
            .get_mut(&delivery.queue)
            .ok_or_else(|| TransportError::UnknownQueue(delivery.queue.clone()))?;
        q.unacked.remove(&delivery.message_id);
        Ok(())
    }

    async fn nack(&self, delivery: &Delivery, requeue: bool) -> Result<()> {
        let mut state = self.state.write().unwrap();
        let q = state
            .queues
            .get_mut(&delivery.queue)
            .ok_or_else(|| TransportError::UnknownQueue(delivery.queue.clone()))?;

        let Some(message) = q.unacked.remove(&delivery.message_id) else {
            return Ok(());
        };

        if requeue {
            // Redelivered before anything newer on the queue.
            q.ready.push_front(message);
        } else {
            tracing::warn!(
                queue = %delivery.queue,
                routing_key = %delivery.routing_key,
                delivery_count = delivery.delivery_count,
                "message dead-lettered"
            );
            q.dead.push(delivery.clone());
        }
        Ok(())
    }

    async fn dead_letters(&self, queue: &str) -> Result<Vec<Delivery>> {
        let state = self.state.read().unwrap();
        let q = state
            .queues
            .get(queue)
            .ok_or_else(|| TransportError::UnknownQueue(queue.to_string()))?;
        Ok(q.dead.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn order_created(id: &str) -> MessageEnvelope {
        MessageEnvelope::new("order.created", id, json!({"order_id": id}))
    }

    #[test]
    fn topic_patterns() {
        assert!(pattern_matches("order.created", "order.created"));
        assert!(pattern_matches("order.*", "order.created"));
        assert!(pattern_matches("order.*", "order.failed"));
        assert!(!pattern_matches("order.*", "order.shipment.created"));
        assert!(!pattern_matches("order.*", "order"));
        assert!(pattern_matches("order.#", "order"));
        assert!(pattern_matches("order.#", "order.shipment.created"));
        assert!(pattern_matches("#", "anything.at.all"));
        assert!(!pattern_matches("invoice.*", "order.created"));
    }

    #[tokio::test]
    async fn publish_fans_out_to_matching_queues() {
        let broker = InMemoryBroker::new();
        broker.declare_queue("saga_queue");
        broker.declare_queue("audit_queue");
        broker.declare_queue("invoice_queue");
        broker.bind("saga_queue", "order.created");
        broker.bind("audit_queue", "order.*");
        broker.bind("invoice_queue", "invoice.*");

        broker.publish("order.created", &order_created("ORD-1")).await.unwrap();

        assert_eq!(broker.queue_depth("saga_queue"), 1);
        assert_eq!(broker.queue_depth("audit_queue"), 1);
        assert_eq!(broker.queue_depth("invoice_queue"), 0);
    }

    #[tokio::test]
    async fn ack_completes_a_delivery() {
        let broker = InMemoryBroker::new();
        broker.declare_queue("saga_queue");
        broker.bind("saga_queue", "order.*");
        broker.publish("order.created", &order_created("ORD-1")).await.unwrap();

        let delivery = broker.receive("saga_queue").await.unwrap().unwrap();
        assert_eq!(delivery.delivery_count, 1);
        assert_eq!(delivery.envelope.aggregate_id, "ORD-1");

        broker.ack(&delivery).await.unwrap();
        assert!(broker.receive("saga_queue").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn nack_requeue_redelivers_with_bumped_count() {
        let broker = InMemoryBroker::new();
        broker.declare_queue("saga_queue");
        broker.bind("saga_queue", "order.*");
        broker.publish("order.created", &order_created("ORD-1")).await.unwrap();
        broker.publish("order.created", &order_created("ORD-2")).await.unwrap();

        let first = broker.receive("saga_queue").await.unwrap().unwrap();
        broker.nack(&first, true).await.unwrap();

        // The requeued message comes back before ORD-2.
        let redelivered = broker.receive("saga_queue").await.unwrap().unwrap();
        assert_eq!(redelivered.envelope.aggregate_id, "ORD-1");
        assert_eq!(redelivered.delivery_count, 2);
        assert_eq!(redelivered.message_id, first.message_id);
    }

    #[tokio::test]
    async fn nack_without_requeue_dead_letters() {
        let broker = InMemoryBroker::new();
        broker.declare_queue("saga_queue");
        broker.bind("saga_queue", "order.*");
        broker.publish("order.created", &order_created("ORD-1")).await.unwrap();

        let delivery = broker.receive("saga_queue").await.unwrap().unwrap();
        broker.nack(&delivery, false).await.unwrap();

        assert!(broker.receive("saga_queue").await.unwrap().is_none());
        let dead = broker.dead_letters("saga_queue").await.unwrap();
        assert_eq!(dead.len(), 1);
        assert_eq!(dead[0].envelope.aggregate_id, "ORD-1");
    }

    #[tokio::test]
    async fn prefetch_bounds_unacked_deliveries() {
        let broker = InMemoryBroker::new();
        broker.declare_queue_with_prefetch("saga_queue", 2);
        broker.bind("saga_queue", "order.*");
        for i in 0..3 {
            broker
                .publish("order.created", &order_created(&format!("ORD-{i}")))
                .await
                .unwrap();
        }

        let first = broker.receive("saga_queue").await.unwrap().unwrap();
        let _second = broker.receive("saga_queue").await.unwrap().unwrap();
        assert!(broker.receive("saga_queue").await.unwrap().is_none());

        broker.ack(&first).await.unwrap();
        assert!(broker.receive("saga_queue").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn publish_failure_is_injected_and_counted() {
        let broker = InMemoryBroker::new();
        broker.declare_queue("saga_queue");
        broker.bind("saga_queue", "order.*");

        broker.set_fail_publish(true);
        let err = broker
            .publish("order.created", &order_created("ORD-1"))
            .await
            .unwrap_err();
        assert!(matches!(err, TransportError::Unavailable(_)));
        assert_eq!(broker.queue_depth("saga_queue"), 0);

        broker.set_fail_publish(false);
        broker.publish("order.created", &order_created("ORD-1")).await.unwrap();
        assert_eq!(broker.publish_attempts(), 2);
    }

    #[tokio::test]
    async fn unknown_queue_is_an_error() {
        let broker = InMemoryBroker::new();
        let err = broker.receive("nope").await.unwrap_err();
        assert!(matches!(err, TransportError::UnknownQueue(_)));
    }
}
