//! Order commands.

use common::AggregateId;

use crate::money::Discount;

/// Command to place an order from a cart.
#[derive(Debug, Clone)]
pub struct PlaceOrder {
    pub order_id: AggregateId,
    pub cart_id: AggregateId,
    pub discount: Option<Discount>,
}

impl PlaceOrder {
    /// Creates a PlaceOrder command with a generated order ID.
    pub fn from_cart(cart_id: AggregateId) -> Self {
        Self {
            order_id: AggregateId::new(),
            cart_id,
            discount: None,
        }
    }

    pub fn with_discount(mut self, discount: Discount) -> Self {
        self.discount = Some(discount);
        self
    }
}

#[derive(Debug, Clone)]
pub struct ShipOrder {
    pub order_id: AggregateId,
    pub tracking_number: Option<String>,
}

impl ShipOrder {
    pub fn new(order_id: AggregateId, tracking_number: Option<String>) -> Self {
        Self {
            order_id,
            tracking_number,
        }
    }
}

#[derive(Debug, Clone)]
pub struct CancelOrder {
    pub order_id: AggregateId,
    pub reason: String,
}

impl CancelOrder {
    pub fn new(order_id: AggregateId, reason: impl Into<String>) -> Self {
        Self {
            order_id,
            reason: reason.into(),
        }
    }
}
