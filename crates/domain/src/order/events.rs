//! Order domain events.

use chrono::{DateTime, Utc};
use common::{AggregateId, UserId};
use serde::{Deserialize, Serialize};

use crate::aggregate::DomainEvent;
use crate::money::{Discount, Money};

use super::OrderItem;

/// Events that can occur on an order aggregate. Each carries the owning user
/// for per-user cache eviction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum OrderEvent {
    /// Order was placed from a cart.
    OrderPlaced(OrderPlacedData),

    OrderPaid(OrderPaidData),

    OrderShipped(OrderShippedData),

    OrderDelivered(OrderDeliveredData),

    OrderCancelled(OrderCancelledData),
}

impl DomainEvent for OrderEvent {
    fn event_type(&self) -> &'static str {
        match self {
            OrderEvent::OrderPlaced(_) => "OrderPlaced",
            OrderEvent::OrderPaid(_) => "OrderPaid",
            OrderEvent::OrderShipped(_) => "OrderShipped",
            OrderEvent::OrderDelivered(_) => "OrderDelivered",
            OrderEvent::OrderCancelled(_) => "OrderCancelled",
        }
    }
}

impl OrderEvent {
    pub const TYPES: [&'static str; 5] = [
        "OrderPlaced",
        "OrderPaid",
        "OrderShipped",
        "OrderDelivered",
        "OrderCancelled",
    ];
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderPlacedData {
    pub order_id: AggregateId,
    pub user_id: UserId,
    pub cart_id: AggregateId,
    pub items: Vec<OrderItem>,
    pub subtotal: Money,
    pub discount: Option<Discount>,
    pub total: Money,
    pub placed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderPaidData {
    pub order_id: AggregateId,
    pub user_id: UserId,
    pub payment_id: AggregateId,
    pub paid_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderShippedData {
    pub order_id: AggregateId,
    pub user_id: UserId,
    pub tracking_number: Option<String>,
    pub shipped_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderDeliveredData {
    pub order_id: AggregateId,
    pub user_id: UserId,
    pub delivered_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderCancelledData {
    pub order_id: AggregateId,
    pub user_id: UserId,
    pub reason: String,
    pub cancelled_at: DateTime<Utc>,
}
