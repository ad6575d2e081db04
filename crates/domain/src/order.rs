//! The order aggregate and its value objects.

use chrono::{DateTime, Utc};
use common::OrderId;
use serde::{Deserialize, Serialize};

use crate::error::DomainError;
use crate::status::OrderStatus;

/// Money amount in cents to avoid floating point drift.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Money(i64);

impl Money {
    /// Creates an amount from cents (e.g. 2999 = $29.99).
    pub fn from_cents(cents: i64) -> Self {
        Self(cents)
    }

    /// Returns the amount in cents.
    pub fn cents(&self) -> i64 {
        self.0
    }
}

impl std::fmt::Display for Money {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "${}.{:02}", self.0 / 100, (self.0 % 100).abs())
    }
}

/// A single order line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderItem {
    /// Product identifier (SKU).
    pub product_id: String,
    /// Quantity ordered.
    pub quantity: u32,
    /// Unit price.
    pub price: Money,
}

impl OrderItem {
    /// Creates a new order line.
    pub fn new(product_id: impl Into<String>, quantity: u32, price: Money) -> Self {
        Self {
            product_id: product_id.into(),
            quantity,
            price,
        }
    }
}

/// Delivery address for an order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShippingAddress {
    pub street: String,
    pub city: String,
    pub zip: String,
}

impl ShippingAddress {
    /// Creates a shipping address.
    pub fn new(street: impl Into<String>, city: impl Into<String>, zip: impl Into<String>) -> Self {
        Self {
            street: street.into(),
            city: city.into(),
            zip: zip.into(),
        }
    }

    /// Returns true if any required component is missing.
    pub fn is_incomplete(&self) -> bool {
        self.street.is_empty() || self.city.is_empty()
    }
}

/// An order flowing through the saga.
///
/// Created at intake with status `Pending`; mutated only by the
/// orchestrator as steps reach their milestones or fail.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub customer_id: String,
    pub items: Vec<OrderItem>,
    pub shipping_address: ShippingAddress,
    pub status: OrderStatus,
    pub created_at: DateTime<Utc>,
}

impl Order {
    /// Creates a new pending order.
    pub fn new(
        id: OrderId,
        customer_id: impl Into<String>,
        items: Vec<OrderItem>,
        shipping_address: ShippingAddress,
    ) -> Self {
        Self {
            id,
            customer_id: customer_id.into(),
            items,
            shipping_address,
            status: OrderStatus::Pending,
            created_at: Utc::now(),
        }
    }

    /// Validates intake requirements.
    ///
    /// Mirrors the intake boundary contract: an order must carry its own
    /// id, a customer id, at least one item with a positive quantity, and
    /// a shipping address.
    pub fn validate(&self) -> Result<(), DomainError> {
        if self.id.is_empty() {
            return Err(DomainError::Validation("missing order_id".to_string()));
        }
        if self.customer_id.is_empty() {
            return Err(DomainError::Validation("missing customer_id".to_string()));
        }
        if self.items.is_empty() {
            return Err(DomainError::Validation(
                "items must be a non-empty list".to_string(),
            ));
        }
        for (idx, item) in self.items.iter().enumerate() {
            if item.product_id.is_empty() {
                return Err(DomainError::Validation(format!(
                    "item {idx} missing product_id"
                )));
            }
            if item.quantity == 0 {
                return Err(DomainError::Validation(format!(
                    "item {idx} has zero quantity"
                )));
            }
        }
        if self.shipping_address.is_incomplete() {
            return Err(DomainError::Validation(
                "missing shipping_address".to_string(),
            ));
        }
        Ok(())
    }

    /// Total order amount across all lines.
    pub fn total_amount(&self) -> Money {
        let cents = self
            .items
            .iter()
            .map(|i| i.price.cents() * i.quantity as i64)
            .sum();
        Money::from_cents(cents)
    }
}
