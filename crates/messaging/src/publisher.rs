//! Outbox relay: drains committed outbox rows to the transport.

use std::sync::Arc;
use std::time::Duration;

use store::DurableStore;
use tokio::sync::watch;
use transport::{MessageEnvelope, MessageTransport};

use crate::breaker::{BreakerError, CircuitBreaker};
use crate::error::Result;
use crate::retry::RetryPolicy;

const DEFAULT_BATCH_SIZE: usize = 50;
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Publishes unpublished outbox rows, oldest first.
///
/// Each row is published under its event type as routing key, wrapped
/// in retry and circuit breaker. A row is marked published only after
/// the transport accepted it, so delivery is at-least-once: a crash
/// between publish and mark leads to a redelivery, never a loss. A
/// publish failure leaves the row and everything behind it for the next
/// drain, preserving per-aggregate order.
pub struct OutboxRelay<S, T> {
    store: Arc<S>,
    transport: Arc<T>,
    retry: RetryPolicy,
    breaker: CircuitBreaker,
    batch_size: usize,
    poll_interval: Duration,
}

impl<S, T> OutboxRelay<S, T>
where
    S: DurableStore,
    T: MessageTransport,
{
    /// Creates a relay with default retry, breaker, and batch settings.
    pub fn new(store: Arc<S>, transport: Arc<T>) -> Self {
        Self {
            store,
            transport,
            retry: RetryPolicy::default(),
            breaker: CircuitBreaker::default(),
            batch_size: DEFAULT_BATCH_SIZE,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    /// Replaces the retry policy.
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Replaces the circuit breaker.
    pub fn with_breaker(mut self, breaker: CircuitBreaker) -> Self {
        self.breaker = breaker;
        self
    }

    /// Sets the maximum rows drained per pass.
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    /// Sets the idle sleep between drain passes.
    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Drains one batch. Returns how many rows were published.
    ///
    /// A publish failure stops the batch; the remaining rows stay
    /// eligible and are retried on the next pass.
    pub async fn drain_once(&self) -> Result<usize> {
        let events = self.store.unpublished_events(self.batch_size).await?;
        let mut published = 0;

        for event in events {
            let envelope = MessageEnvelope {
                event_type: event.event_type.clone(),
                aggregate_id: event.aggregate_id.clone(),
                payload: event.payload.clone(),
                timestamp: event.created_at,
            };

            let outcome = self
                .retry
                .run(|| {
                    self.breaker
                        .call(|| self.transport.publish(&event.event_type, &envelope))
                })
                .await;

            match outcome {
                Ok(()) => {
                    self.store.mark_published(event.id).await?;
                    metrics::counter!("outbox_published_total").increment(1);
                    published += 1;
                }
                Err(BreakerError::Open) => {
                    tracing::warn!(event_id = event.id, "publish rejected, circuit open");
                    break;
                }
                Err(BreakerError::Inner(err)) => {
                    metrics::counter!("outbox_publish_failures_total").increment(1);
                    tracing::warn!(
                        event_id = event.id,
                        event_type = %event.event_type,
                        error = %err,
                        "publish failed, leaving batch for next drain"
                    );
                    break;
                }
            }
        }

        Ok(published)
    }

    /// Drains in a loop until the shutdown signal flips to `true`.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        loop {
            match self.drain_once().await {
                Ok(n) if n > 0 => tracing::debug!(published = n, "outbox drained"),
                Ok(_) => {}
                Err(err) => tracing::error!(error = %err, "outbox drain failed"),
            }

            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
                _ = tokio::time::sleep(self.poll_interval) => {}
            }
        }
        tracing::info!("outbox relay stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::breaker::BreakerState;
    use serde_json::json;
    use store::{InMemoryStore, NewOutboxEvent};
    use transport::InMemoryBroker;

    fn broker_with_queue() -> Arc<InMemoryBroker> {
        let broker = InMemoryBroker::new();
        broker.declare_queue("saga_queue");
        broker.bind("saga_queue", "order.*");
        Arc::new(broker)
    }

    fn quick_retry() -> RetryPolicy {
        RetryPolicy::new(3, Duration::from_millis(10), Duration::from_millis(50))
    }

    #[tokio::test(start_paused = true)]
    async fn drains_in_order_and_marks_published() {
        let store = Arc::new(InMemoryStore::new());
        let broker = broker_with_queue();
        for i in 0..3 {
            store
                .append_outbox_event(NewOutboxEvent::new(
                    format!("ORD-{i}"),
                    "order.created",
                    json!({"n": i}),
                ))
                .await
                .unwrap();
        }

        let relay = OutboxRelay::new(store.clone(), broker.clone()).with_retry(quick_retry());
        let published = relay.drain_once().await.unwrap();

        assert_eq!(published, 3);
        assert!(store.unpublished_events(10).await.unwrap().is_empty());
        assert_eq!(broker.queue_depth("saga_queue"), 3);

        let first = broker.receive("saga_queue").await.unwrap().unwrap();
        assert_eq!(first.envelope.aggregate_id, "ORD-0");
    }

    #[tokio::test(start_paused = true)]
    async fn failure_aborts_the_batch_and_keeps_rows() {
        let store = Arc::new(InMemoryStore::new());
        let broker = broker_with_queue();
        for i in 0..2 {
            store
                .append_outbox_event(NewOutboxEvent::new(
                    format!("ORD-{i}"),
                    "order.created",
                    json!({}),
                ))
                .await
                .unwrap();
        }
        broker.set_fail_publish(true);

        let relay = OutboxRelay::new(store.clone(), broker.clone()).with_retry(quick_retry());
        let published = relay.drain_once().await.unwrap();

        assert_eq!(published, 0);
        assert_eq!(store.unpublished_events(10).await.unwrap().len(), 2);
        // Three retry attempts for the first row, none for the second.
        assert_eq!(broker.publish_attempts(), 3);

        broker.set_fail_publish(false);
        tokio::time::advance(Duration::from_secs(31)).await;
        let published = relay.drain_once().await.unwrap();
        assert_eq!(published, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn open_breaker_skips_the_network_entirely() {
        let store = Arc::new(InMemoryStore::new());
        let broker = broker_with_queue();
        store
            .append_outbox_event(NewOutboxEvent::new("ORD-1", "order.created", json!({})))
            .await
            .unwrap();
        broker.set_fail_publish(true);

        let relay = OutboxRelay::new(store.clone(), broker.clone())
            .with_retry(quick_retry())
            .with_breaker(CircuitBreaker::new(3, Duration::from_secs(30)));

        // Three failed attempts trip the breaker.
        relay.drain_once().await.unwrap();
        assert_eq!(broker.publish_attempts(), 3);

        // While open the drain makes no network attempt at all.
        relay.drain_once().await.unwrap();
        assert_eq!(broker.publish_attempts(), 3);

        // After the cool-down the trial call goes through and recovers.
        broker.set_fail_publish(false);
        tokio::time::advance(Duration::from_secs(31)).await;
        let published = relay.drain_once().await.unwrap();
        assert_eq!(published, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn run_stops_on_shutdown() {
        let store = Arc::new(InMemoryStore::new());
        let broker = broker_with_queue();
        let relay = OutboxRelay::new(store, broker).with_poll_interval(Duration::from_millis(50));

        let (tx, rx) = watch::channel(false);
        let task = tokio::spawn(async move { relay.run(rx).await });

        tokio::time::sleep(Duration::from_millis(120)).await;
        tx.send(true).unwrap();
        task.await.unwrap();
    }
}
