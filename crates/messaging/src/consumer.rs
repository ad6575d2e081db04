//! Idempotent consumer: deduplicates, retries, and dead-letters.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use store::{DurableStore, NewDeadLetter};
use tokio::sync::watch;
use transport::{Delivery, MessageTransport};

use crate::error::{MessagingError, Result};

const DEFAULT_RETRY_BUDGET: u32 = 3;
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Business logic invoked once per unique message.
#[async_trait]
pub trait MessageHandler: Send + Sync {
    /// Processes a delivery. The returned value is cached on the
    /// idempotency record so duplicates can be answered without rework.
    async fn handle(&self, delivery: &Delivery) -> Result<Value>;
}

/// Outcome of a single poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Consumed {
    /// Queue empty or prefetch window full.
    Idle,
    /// Handler ran and the delivery was acked.
    Handled,
    /// Duplicate of an already handled message; acked without the handler.
    Duplicate,
    /// Handler failed, message requeued for another attempt.
    Retried,
    /// Retry budget exhausted, message dead-lettered.
    DeadLettered,
}

/// Consumes a queue with exactly-once handler effects.
///
/// Every delivery is keyed by `aggregateId:eventType` and claimed in
/// the idempotency store before the handler runs. A lost claim means
/// the message was already handled; it is acked and dropped. A handler
/// failure releases the claim and requeues while `delivery_count` is
/// under the retry budget; after that the full message and its failure
/// history are persisted as a dead letter and the broker routes the
/// message to the dead-letter queue.
pub struct IdempotentConsumer<S, T> {
    store: Arc<S>,
    transport: Arc<T>,
    queue: String,
    retry_budget: u32,
    poll_interval: Duration,
}

impl<S, T> IdempotentConsumer<S, T>
where
    S: DurableStore,
    T: MessageTransport,
{
    /// Creates a consumer for a queue with the default retry budget.
    pub fn new(store: Arc<S>, transport: Arc<T>, queue: impl Into<String>) -> Self {
        Self {
            store,
            transport,
            queue: queue.into(),
            retry_budget: DEFAULT_RETRY_BUDGET,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    /// Sets how many deliveries a message gets before dead-lettering.
    pub fn with_retry_budget(mut self, retry_budget: u32) -> Self {
        self.retry_budget = retry_budget;
        self
    }

    /// Sets the idle sleep between polls.
    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Takes and processes at most one delivery.
    pub async fn poll_once(&self, handler: &dyn MessageHandler) -> Result<Consumed> {
        let Some(delivery) = self.transport.receive(&self.queue).await? else {
            return Ok(Consumed::Idle);
        };

        let key = delivery.envelope.idempotency_key();
        if !self.store.claim_idempotency_key(&key).await? {
            tracing::debug!(%key, "duplicate delivery, acking without handler");
            metrics::counter!("consumer_duplicates_total").increment(1);
            self.transport.ack(&delivery).await?;
            return Ok(Consumed::Duplicate);
        }

        match handler.handle(&delivery).await {
            Ok(result) => {
                self.store.record_idempotency_result(&key, result).await?;
                self.transport.ack(&delivery).await?;
                metrics::counter!("consumer_handled_total").increment(1);
                Ok(Consumed::Handled)
            }
            Err(err) => {
                // The claim must not outlive the failed attempt, or the
                // redelivery would be mistaken for a duplicate.
                self.store.release_idempotency_key(&key).await?;

                if delivery.delivery_count < self.retry_budget {
                    tracing::warn!(
                        %key,
                        delivery_count = delivery.delivery_count,
                        error = %err,
                        "handler failed, requeueing"
                    );
                    self.transport.nack(&delivery, true).await?;
                    Ok(Consumed::Retried)
                } else {
                    tracing::error!(
                        %key,
                        delivery_count = delivery.delivery_count,
                        error = %err,
                        "retry budget exhausted, dead-lettering"
                    );
                    let original = serde_json::to_value(&delivery.envelope)
                        .map_err(store::StoreError::from)?;
                    self.store
                        .insert_dead_letter(NewDeadLetter::now(
                            original,
                            &self.queue,
                            err.to_string(),
                            delivery.delivery_count,
                        ))
                        .await?;
                    self.transport.nack(&delivery, false).await?;
                    metrics::counter!("consumer_dead_lettered_total").increment(1);
                    Ok(Consumed::DeadLettered)
                }
            }
        }
    }

    /// Polls in a loop until the shutdown signal flips to `true`.
    pub async fn run(&self, handler: &dyn MessageHandler, mut shutdown: watch::Receiver<bool>) {
        loop {
            match self.poll_once(handler).await {
                Ok(Consumed::Idle) => {
                    tokio::select! {
                        changed = shutdown.changed() => {
                            if changed.is_err() || *shutdown.borrow() {
                                break;
                            }
                        }
                        _ = tokio::time::sleep(self.poll_interval) => {}
                    }
                }
                Ok(_) => {
                    if *shutdown.borrow() {
                        break;
                    }
                }
                Err(err) => {
                    tracing::error!(error = %err, "consumer poll failed");
                    tokio::time::sleep(self.poll_interval).await;
                }
            }
        }
        tracing::info!(queue = %self.queue, "consumer stopped");
    }
}
