//! Order aggregate implementation.

use chrono::{DateTime, Utc};
use common::{AggregateId, UserId};
use serde::{Deserialize, Serialize};
use store::Version;

use crate::aggregate::Aggregate;
use crate::money::{Discount, Money};

use super::events::{
    OrderCancelledData, OrderDeliveredData, OrderPaidData, OrderPlacedData, OrderShippedData,
};
use super::{OrderError, OrderEvent, OrderItem, OrderStatus};

/// Order aggregate root.
///
/// Represents an order from placement to delivery or cancellation. Items and
/// amounts are fixed once placed.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Order {
    /// Unique order identifier.
    id: Option<AggregateId>,

    /// Row version for optimistic concurrency.
    #[serde(skip)]
    version: Version,

    /// User who placed the order.
    user_id: Option<UserId>,

    /// Cart the order was placed from.
    cart_id: Option<AggregateId>,

    /// Current status of the order.
    status: OrderStatus,

    items: Vec<OrderItem>,
    subtotal: Option<Money>,
    discount: Option<Discount>,
    total: Option<Money>,

    /// Payment that settled the order.
    payment_id: Option<AggregateId>,

    tracking_number: Option<String>,
    cancellation_reason: Option<String>,
    placed_at: Option<DateTime<Utc>>,
    updated_at: Option<DateTime<Utc>>,
}

impl Aggregate for Order {
    type Event = OrderEvent;
    type Error = OrderError;

    fn aggregate_type() -> &'static str {
        "Order"
    }

    fn id(&self) -> Option<AggregateId> {
        self.id
    }

    fn version(&self) -> Version {
        self.version
    }

    fn set_version(&mut self, version: Version) {
        self.version = version;
    }

    fn apply(&mut self, event: Self::Event) {
        match event {
            OrderEvent::OrderPlaced(data) => self.apply_order_placed(data),
            OrderEvent::OrderPaid(data) => {
                self.status = OrderStatus::Paid;
                self.payment_id = Some(data.payment_id);
                self.updated_at = Some(data.paid_at);
            }
            OrderEvent::OrderShipped(data) => {
                self.status = OrderStatus::Shipped;
                self.tracking_number = data.tracking_number;
                self.updated_at = Some(data.shipped_at);
            }
            OrderEvent::OrderDelivered(data) => {
                self.status = OrderStatus::Delivered;
                self.updated_at = Some(data.delivered_at);
            }
            OrderEvent::OrderCancelled(data) => {
                self.status = OrderStatus::Cancelled;
                self.cancellation_reason = Some(data.reason);
                self.updated_at = Some(data.cancelled_at);
            }
        }
    }
}

// Query methods
impl Order {
    pub fn user_id(&self) -> Option<UserId> {
        self.user_id
    }

    pub fn cart_id(&self) -> Option<AggregateId> {
        self.cart_id
    }

    pub fn status(&self) -> OrderStatus {
        self.status
    }

    pub fn items(&self) -> &[OrderItem] {
        &self.items
    }

    pub fn subtotal(&self) -> Option<Money> {
        self.subtotal
    }

    pub fn discount(&self) -> Option<Discount> {
        self.discount
    }

    /// Amount due after the discount.
    pub fn total(&self) -> Option<Money> {
        self.total
    }

    pub fn payment_id(&self) -> Option<AggregateId> {
        self.payment_id
    }

    pub fn tracking_number(&self) -> Option<&str> {
        self.tracking_number.as_deref()
    }

    pub fn cancellation_reason(&self) -> Option<&str> {
        self.cancellation_reason.as_deref()
    }

    pub fn placed_at(&self) -> Option<DateTime<Utc>> {
        self.placed_at
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    fn require_placed(&self) -> Result<(AggregateId, UserId), OrderError> {
        match (self.id, self.user_id) {
            (Some(id), Some(user_id)) => Ok((id, user_id)),
            _ => Err(OrderError::NotCreated),
        }
    }

    fn transition_error(&self, action: &'static str) -> OrderError {
        OrderError::InvalidStateTransition {
            current: self.status,
            action,
        }
    }
}

// Command methods (return events)
impl Order {
    /// Places the order with the given item snapshots.
    ///
    /// The subtotal is the sum of line totals; the discount, if any, is
    /// applied to it and never takes the total below zero.
    pub fn place(
        &self,
        order_id: AggregateId,
        user_id: UserId,
        cart_id: AggregateId,
        items: Vec<OrderItem>,
        discount: Option<Discount>,
    ) -> Result<Vec<OrderEvent>, OrderError> {
        if self.id.is_some() {
            return Err(OrderError::AlreadyCreated);
        }
        let Some(first) = items.first() else {
            return Err(OrderError::NoItems);
        };
        if let Some(item) = items.iter().find(|i| i.quantity == 0) {
            return Err(OrderError::InvalidQuantity {
                product_id: item.product_id,
            });
        }

        let currency = first.unit_price.currency();
        let subtotal = Money::sum(
            currency,
            items
                .iter()
                .map(OrderItem::line_total)
                .collect::<Result<Vec<_>, _>>()?,
        )?;
        let total = match discount {
            Some(discount) => discount.apply(subtotal)?,
            None => subtotal,
        };

        Ok(vec![OrderEvent::OrderPlaced(OrderPlacedData {
            order_id,
            user_id,
            cart_id,
            items,
            subtotal,
            discount,
            total,
            placed_at: Utc::now(),
        })])
    }

    /// Records the payment that settled the order. Repeating it with the same
    /// payment is a no-op.
    pub fn mark_paid(&self, payment_id: AggregateId) -> Result<Vec<OrderEvent>, OrderError> {
        let (order_id, user_id) = self.require_placed()?;
        if let Some(paid_by) = self.payment_id {
            if paid_by == payment_id {
                return Ok(vec![]);
            }
            return Err(OrderError::AlreadyPaid {
                payment_id: paid_by,
            });
        }
        if !self.status.can_pay() {
            return Err(self.transition_error("pay"));
        }

        Ok(vec![OrderEvent::OrderPaid(OrderPaidData {
            order_id,
            user_id,
            payment_id,
            paid_at: Utc::now(),
        })])
    }

    pub fn ship(&self, tracking_number: Option<String>) -> Result<Vec<OrderEvent>, OrderError> {
        let (order_id, user_id) = self.require_placed()?;
        if !self.status.can_ship() {
            return Err(self.transition_error("ship"));
        }

        Ok(vec![OrderEvent::OrderShipped(OrderShippedData {
            order_id,
            user_id,
            tracking_number,
            shipped_at: Utc::now(),
        })])
    }

    pub fn deliver(&self) -> Result<Vec<OrderEvent>, OrderError> {
        let (order_id, user_id) = self.require_placed()?;
        if !self.status.can_deliver() {
            return Err(self.transition_error("deliver"));
        }

        Ok(vec![OrderEvent::OrderDelivered(OrderDeliveredData {
            order_id,
            user_id,
            delivered_at: Utc::now(),
        })])
    }

    pub fn cancel(&self, reason: impl Into<String>) -> Result<Vec<OrderEvent>, OrderError> {
        let (order_id, user_id) = self.require_placed()?;
        if !self.status.can_cancel() {
            return Err(self.transition_error("cancel"));
        }

        Ok(vec![OrderEvent::OrderCancelled(OrderCancelledData {
            order_id,
            user_id,
            reason: reason.into(),
            cancelled_at: Utc::now(),
        })])
    }
}

// Apply event helpers
impl Order {
    fn apply_order_placed(&mut self, data: OrderPlacedData) {
        self.id = Some(data.order_id);
        self.user_id = Some(data.user_id);
        self.cart_id = Some(data.cart_id);
        self.status = OrderStatus::Pending;
        self.items = data.items;
        self.subtotal = Some(data.subtotal);
        self.discount = data.discount;
        self.total = Some(data.total);
        self.placed_at = Some(data.placed_at);
        self.updated_at = Some(data.placed_at);
    }
}
