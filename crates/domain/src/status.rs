//! Order status state machine.

use serde::{Deserialize, Serialize};

/// Status of an order as it moves through the saga.
///
/// Happy path:
/// ```text
/// PENDING ──► CMS_APPROVED ──► ROUTE_PLANNED ──► INVENTORY_ALLOCATED ──► CONFIRMED
/// ```
/// Any step failure diverts to its step-specific failure status, then
/// `COMPENSATING` while compensations run, then `FAILED`. `CONFIRMED`
/// and `FAILED` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    /// Order received, saga not yet progressed.
    #[default]
    Pending,

    /// CMS approval step succeeded.
    CmsApproved,

    /// Route planning step succeeded.
    RoutePlanned,

    /// Inventory allocation step succeeded.
    InventoryAllocated,

    /// All steps succeeded (terminal).
    Confirmed,

    /// CMS approval step failed.
    CmsRejected,

    /// Route planning step failed.
    RouteFailed,

    /// Inventory allocation step failed.
    InventoryFailed,

    /// Compensations for completed steps are running.
    Compensating,

    /// Saga finished after a failure, compensation pass done (terminal).
    Failed,
}

impl OrderStatus {
    /// Returns true if no further transitions are possible.
    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderStatus::Confirmed | OrderStatus::Failed)
    }

    /// Returns true if this is a step-specific failure status.
    pub fn is_step_failure(&self) -> bool {
        matches!(
            self,
            OrderStatus::CmsRejected | OrderStatus::RouteFailed | OrderStatus::InventoryFailed
        )
    }

    /// Returns the status name as persisted.
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "PENDING",
            OrderStatus::CmsApproved => "CMS_APPROVED",
            OrderStatus::RoutePlanned => "ROUTE_PLANNED",
            OrderStatus::InventoryAllocated => "INVENTORY_ALLOCATED",
            OrderStatus::Confirmed => "CONFIRMED",
            OrderStatus::CmsRejected => "CMS_REJECTED",
            OrderStatus::RouteFailed => "ROUTE_FAILED",
            OrderStatus::InventoryFailed => "INVENTORY_FAILED",
            OrderStatus::Compensating => "COMPENSATING",
            OrderStatus::Failed => "FAILED",
        }
    }

    /// Parses a persisted status name.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "PENDING" => Some(OrderStatus::Pending),
            "CMS_APPROVED" => Some(OrderStatus::CmsApproved),
            "ROUTE_PLANNED" => Some(OrderStatus::RoutePlanned),
            "INVENTORY_ALLOCATED" => Some(OrderStatus::InventoryAllocated),
            "CONFIRMED" => Some(OrderStatus::Confirmed),
            "CMS_REJECTED" => Some(OrderStatus::CmsRejected),
            "ROUTE_FAILED" => Some(OrderStatus::RouteFailed),
            "INVENTORY_FAILED" => Some(OrderStatus::InventoryFailed),
            "COMPENSATING" => Some(OrderStatus::Compensating),
            "FAILED" => Some(OrderStatus::Failed),
            _ => None,
        }
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
