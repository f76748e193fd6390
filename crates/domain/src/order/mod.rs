//! Order aggregate and related types.

mod aggregate;
mod commands;
mod events;
mod items;
mod service;
mod state;

pub use aggregate::Order;
pub use commands::*;
pub use events::{
    OrderCancelledData, OrderDeliveredData, OrderEvent, OrderPaidData, OrderPlacedData,
    OrderShippedData,
};
pub use items::OrderItem;
pub use service::OrderService;
pub use state::OrderStatus;

use common::{AggregateId, ProductId};
use thiserror::Error;

use crate::error::DomainError;
use crate::money::MoneyError;

/// Errors that can occur during order operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OrderError {
    /// Order is not in the expected status.
    #[error("Invalid status transition: cannot {action} from {current} status")]
    InvalidStateTransition {
        current: OrderStatus,
        action: &'static str,
    },

    #[error("Invalid quantity for product {product_id}")]
    InvalidQuantity { product_id: ProductId },

    /// Order has no items.
    #[error("Order has no items")]
    NoItems,

    /// Anonymous carts must be assigned to a user before checkout.
    #[error("Cart {cart_id} has no owner")]
    AnonymousCart { cart_id: AggregateId },

    #[error("Order already paid by payment {payment_id}")]
    AlreadyPaid { payment_id: AggregateId },

    #[error("Order already created")]
    AlreadyCreated,

    #[error("Order not created")]
    NotCreated,

    #[error(transparent)]
    Money(#[from] MoneyError),
}

impl From<OrderError> for DomainError {
    fn from(e: OrderError) -> Self {
        match e {
            OrderError::NoItems
            | OrderError::InvalidQuantity { .. }
            | OrderError::Money(_) => DomainError::Validation(e.to_string()),
            OrderError::InvalidStateTransition { .. }
            | OrderError::AnonymousCart { .. }
            | OrderError::AlreadyPaid { .. }
            | OrderError::AlreadyCreated
            | OrderError::NotCreated => DomainError::invalid_state("Order", e.to_string()),
        }
    }
}
