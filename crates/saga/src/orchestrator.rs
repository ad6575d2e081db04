//! The saga orchestrator.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use domain::{Order, OrderStatus};
use serde_json::json;
use store::{DurableStore, NewOutboxEvent, SagaExecution, StepStatus};

use crate::error::SagaError;
use crate::order_flow::{EVENT_ORDER_CONFIRMED, EVENT_ORDER_FAILED};
use crate::step::SagaStep;

const DEFAULT_STEP_TIMEOUT: Duration = Duration::from_secs(30);

/// Drives one saga execution per order through its steps.
///
/// Steps run strictly in order, each action under a timeout. The first
/// failure stops the forward path and compensates every previously
/// successful step in reverse order. A failed compensation halts
/// compensation entirely and leaves the step `CompensationFailed` for
/// manual intervention; it is never retried automatically. The terminal
/// execution status is `Confirmed` or `Failed`, and both emit an
/// outbox event announcing the outcome.
pub struct SagaOrchestrator<S> {
    store: Arc<S>,
    steps: Vec<SagaStep>,
    step_timeout: Duration,
}

impl<S> SagaOrchestrator<S>
where
    S: DurableStore,
{
    /// Creates an orchestrator over an ordered step list.
    pub fn new(store: Arc<S>, steps: Vec<SagaStep>) -> Self {
        Self {
            store,
            steps,
            step_timeout: DEFAULT_STEP_TIMEOUT,
        }
    }

    /// Sets the per-action timeout.
    pub fn with_step_timeout(mut self, step_timeout: Duration) -> Self {
        self.step_timeout = step_timeout;
        self
    }

    /// Runs the saga for an order to its terminal status.
    ///
    /// Fails with [`SagaError::AlreadyRunning`] when a non-terminal
    /// execution exists for the order and [`SagaError::OrderNotFound`]
    /// when the order row was never accepted; step failures are not
    /// errors, they end in a `Failed` execution.
    #[tracing::instrument(skip(self, order), fields(order_id = %order.id))]
    pub async fn execute(&self, order: &Order) -> Result<SagaExecution, SagaError> {
        if self.store.get_order(&order.id).await?.is_none() {
            return Err(SagaError::OrderNotFound(order.id.to_string()));
        }

        metrics::counter!("saga_executions_total").increment(1);
        let started = std::time::Instant::now();

        let step_names: Vec<&str> = self.steps.iter().map(|s| s.name).collect();
        let mut execution = SagaExecution::new(order.id.clone(), &step_names);
        self.store.insert_execution(&execution).await?;

        for (idx, step) in self.steps.iter().enumerate() {
            tracing::info!(step = step.name, "saga step started");
            execution.steps[idx].status = StepStatus::InProgress;
            execution.steps[idx].executed_at = Some(Utc::now());
            self.store.update_execution(&execution).await?;

            let outcome = tokio::time::timeout(self.step_timeout, step.client.execute(order)).await;
            let error = match outcome {
                Ok(Ok(result)) => {
                    execution.steps[idx].status = StepStatus::Success;
                    execution.steps[idx].result = Some(result);
                    execution.status = step.milestone;
                    self.store.update_order_status(&order.id, step.milestone).await?;
                    self.store.update_execution(&execution).await?;
                    tracing::info!(step = step.name, status = %step.milestone, "saga step succeeded");
                    continue;
                }
                Ok(Err(err)) => err.to_string(),
                Err(_) => format!(
                    "{} timed out after {}s",
                    step.name,
                    self.step_timeout.as_secs()
                ),
            };

            tracing::warn!(step = step.name, error = %error, "saga step failed");
            metrics::counter!("saga_step_failures_total").increment(1);
            execution.steps[idx].status = StepStatus::Failed;
            execution.steps[idx].error = Some(error.clone());
            execution.status = step.failure_status;
            self.store
                .update_order_status(&order.id, step.failure_status)
                .await?;
            self.store.update_execution(&execution).await?;

            self.compensate(&mut execution, order, idx).await?;

            execution.status = OrderStatus::Failed;
            execution.error = Some(error.clone());
            execution.completed_at = Some(Utc::now());
            self.store
                .update_order_status(&order.id, OrderStatus::Failed)
                .await?;
            self.store.update_execution(&execution).await?;
            self.store
                .append_outbox_event(NewOutboxEvent::new(
                    order.id.as_str(),
                    EVENT_ORDER_FAILED,
                    json!({
                        "order_id": order.id,
                        "saga_id": execution.saga_id,
                        "error": error,
                    }),
                ))
                .await?;

            metrics::counter!("saga_failed_total").increment(1);
            metrics::histogram!("saga_duration_seconds").record(started.elapsed().as_secs_f64());
            tracing::warn!(saga_id = %execution.saga_id, reason = %error, "saga failed");
            return Ok(execution);
        }

        execution.status = OrderStatus::Confirmed;
        execution.completed_at = Some(Utc::now());
        self.store
            .update_order_status(&order.id, OrderStatus::Confirmed)
            .await?;
        self.store.update_execution(&execution).await?;
        self.store
            .append_outbox_event(NewOutboxEvent::new(
                order.id.as_str(),
                EVENT_ORDER_CONFIRMED,
                json!({
                    "order_id": order.id,
                    "saga_id": execution.saga_id,
                }),
            ))
            .await?;

        let duration = started.elapsed().as_secs_f64();
        metrics::counter!("saga_confirmed_total").increment(1);
        metrics::histogram!("saga_duration_seconds").record(duration);
        tracing::info!(saga_id = %execution.saga_id, duration, "saga confirmed");
        Ok(execution)
    }

    /// Undoes previously successful steps in reverse order.
    ///
    /// A compensation failure or timeout marks the step
    /// `CompensationFailed` and halts; earlier steps keep whatever
    /// side effects they had.
    #[tracing::instrument(skip(self, execution, order))]
    async fn compensate(
        &self,
        execution: &mut SagaExecution,
        order: &Order,
        failed_idx: usize,
    ) -> Result<(), SagaError> {
        execution.status = OrderStatus::Compensating;
        self.store
            .update_order_status(&order.id, OrderStatus::Compensating)
            .await?;
        self.store.update_execution(execution).await?;

        for idx in (0..failed_idx).rev() {
            let step = &self.steps[idx];
            if execution.steps[idx].status != StepStatus::Success {
                continue;
            }

            let outcome =
                tokio::time::timeout(self.step_timeout, step.client.compensate(order)).await;
            let error = match outcome {
                Ok(Ok(())) => {
                    execution.steps[idx].status = StepStatus::Compensated;
                    self.store.update_execution(execution).await?;
                    tracing::info!(step = step.name, "step compensated");
                    continue;
                }
                Ok(Err(err)) => err.to_string(),
                Err(_) => format!(
                    "compensation timed out after {}s",
                    self.step_timeout.as_secs()
                ),
            };

            execution.steps[idx].status = StepStatus::CompensationFailed;
            execution.steps[idx].error = Some(error.clone());
            self.store.update_execution(execution).await?;
            metrics::counter!("saga_compensation_failures_total").increment(1);
            tracing::error!(
                step = step.name,
                error = %error,
                "compensation failed, manual intervention required"
            );
            break;
        }

        Ok(())
    }
}
