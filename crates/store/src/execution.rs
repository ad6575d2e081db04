//! Saga execution records.

use chrono::{DateTime, Utc};
use common::{OrderId, SagaId};
use domain::OrderStatus;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Status of a single saga step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StepStatus {
    /// Step has not started.
    #[default]
    Pending,

    /// Step action is executing.
    InProgress,

    /// Step action succeeded.
    Success,

    /// Step action failed; compensation of prior steps follows.
    Failed,

    /// Step was undone after a later failure.
    Compensated,

    /// Compensation itself failed; manual intervention required.
    CompensationFailed,
}

impl StepStatus {
    /// Returns the status name as persisted.
    pub fn as_str(&self) -> &'static str {
        match self {
            StepStatus::Pending => "PENDING",
            StepStatus::InProgress => "IN_PROGRESS",
            StepStatus::Success => "SUCCESS",
            StepStatus::Failed => "FAILED",
            StepStatus::Compensated => "COMPENSATED",
            StepStatus::CompensationFailed => "COMPENSATION_FAILED",
        }
    }

    /// Parses a persisted status name.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "PENDING" => Some(StepStatus::Pending),
            "IN_PROGRESS" => Some(StepStatus::InProgress),
            "SUCCESS" => Some(StepStatus::Success),
            "FAILED" => Some(StepStatus::Failed),
            "COMPENSATED" => Some(StepStatus::Compensated),
            "COMPENSATION_FAILED" => Some(StepStatus::CompensationFailed),
            _ => None,
        }
    }
}

impl std::fmt::Display for StepStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Execution record of a single saga step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SagaStepRecord {
    pub name: String,
    pub status: StepStatus,
    /// Result payload reported by the service client on success.
    pub result: Option<Value>,
    pub error: Option<String>,
    pub executed_at: Option<DateTime<Utc>>,
}

impl SagaStepRecord {
    /// Creates a pending step record.
    pub fn pending(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            status: StepStatus::Pending,
            result: None,
            error: None,
            executed_at: None,
        }
    }
}

/// Execution record of one saga run for an order.
///
/// At most one non-terminal execution may exist per order; the store
/// enforces this on insert. Executions are never deleted; a failed one
/// is frozen for audit and a resubmitted order gets a new `saga_id`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SagaExecution {
    pub saga_id: SagaId,
    pub order_id: OrderId,
    pub status: OrderStatus,
    pub steps: Vec<SagaStepRecord>,
    pub error: Option<String>,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl SagaExecution {
    /// Creates a fresh execution with all steps pending.
    pub fn new(order_id: OrderId, step_names: &[&str]) -> Self {
        Self {
            saga_id: SagaId::new(),
            order_id,
            status: OrderStatus::Pending,
            steps: step_names
                .iter()
                .map(|name| SagaStepRecord::pending(*name))
                .collect(),
            error: None,
            started_at: Utc::now(),
            completed_at: None,
        }
    }

    /// Returns true if the execution reached a terminal status.
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Looks up a step record by name.
    pub fn step(&self, name: &str) -> Option<&SagaStepRecord> {
        self.steps.iter().find(|s| s.name == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_execution_is_pending() {
        let execution = SagaExecution::new(OrderId::new("ORD-1"), &["a", "b", "c"]);
        assert_eq!(execution.status, OrderStatus::Pending);
        assert!(!execution.is_terminal());
        assert_eq!(execution.steps.len(), 3);
        assert!(
            execution
                .steps
                .iter()
                .all(|s| s.status == StepStatus::Pending)
        );
        assert!(execution.completed_at.is_none());
    }

    #[test]
    fn step_lookup_by_name() {
        let execution = SagaExecution::new(OrderId::new("ORD-1"), &["a", "b"]);
        assert!(execution.step("b").is_some());
        assert!(execution.step("z").is_none());
    }

    #[test]
    fn fresh_executions_get_distinct_saga_ids() {
        let a = SagaExecution::new(OrderId::new("ORD-1"), &[]);
        let b = SagaExecution::new(OrderId::new("ORD-1"), &[]);
        assert_ne!(a.saga_id, b.saga_id);
    }

    #[test]
    fn step_status_parse_roundtrip() {
        for status in [
            StepStatus::Pending,
            StepStatus::InProgress,
            StepStatus::Success,
            StepStatus::Failed,
            StepStatus::Compensated,
            StepStatus::CompensationFailed,
        ] {
            assert_eq!(StepStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(StepStatus::parse("bogus"), None);
    }

    #[test]
    fn execution_serialization_roundtrip() {
        let execution = SagaExecution::new(OrderId::new("ORD-1"), &["cms_approval"]);
        let json = serde_json::to_string(&execution).unwrap();
        let back: SagaExecution = serde_json::from_str(&json).unwrap();
        assert_eq!(back.saga_id, execution.saga_id);
        assert_eq!(back.steps[0].status, StepStatus::Pending);
    }
}
