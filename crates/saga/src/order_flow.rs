//! Order processing saga constants and standard step list.

use std::sync::Arc;

use domain::OrderStatus;

use crate::client::ServiceClient;
use crate::step::SagaStep;

/// The saga type identifier for order processing.
pub const SAGA_TYPE: &str = "OrderProcessing";

/// Step name: approve the order with the customer management service.
pub const STEP_CMS_APPROVAL: &str = "cms_approval";

/// Step name: plan a delivery route with the route optimization service.
pub const STEP_ROUTE_PLANNING: &str = "route_planning";

/// Step name: allocate stock with the warehouse management service.
pub const STEP_INVENTORY_ALLOCATION: &str = "inventory_allocation";

/// Routing key announcing an accepted order.
pub const EVENT_ORDER_CREATED: &str = "order.created";

/// Routing key announcing a confirmed order.
pub const EVENT_ORDER_CONFIRMED: &str = "order.confirmed";

/// Routing key announcing a failed order.
pub const EVENT_ORDER_FAILED: &str = "order.failed";

/// Builds the standard three-step order flow over the given clients.
pub fn standard_steps(
    cms: Arc<dyn ServiceClient>,
    ros: Arc<dyn ServiceClient>,
    wms: Arc<dyn ServiceClient>,
) -> Vec<SagaStep> {
    vec![
        SagaStep::new(
            STEP_CMS_APPROVAL,
            OrderStatus::CmsApproved,
            OrderStatus::CmsRejected,
            cms,
        ),
        SagaStep::new(
            STEP_ROUTE_PLANNING,
            OrderStatus::RoutePlanned,
            OrderStatus::RouteFailed,
            ros,
        ),
        SagaStep::new(
            STEP_INVENTORY_ALLOCATION,
            OrderStatus::InventoryAllocated,
            OrderStatus::InventoryFailed,
            wms,
        ),
    ]
}
