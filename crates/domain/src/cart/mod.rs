//! Shopping cart aggregate and service.

mod aggregate;
mod commands;
mod events;
mod service;

pub use aggregate::{Cart, CartItem, NewCartItem};
pub use commands::*;
pub use events::{
    CartAssignedToUserData, CartClearedData, CartCreatedData, CartEvent, CartItemAddedData,
    CartItemQuantityChangedData, CartItemRemovedData,
};
pub use service::CartService;

use common::{AggregateId, ProductId};
use thiserror::Error;

use crate::error::DomainError;
use crate::money::Currency;

/// Errors that can occur during cart operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CartError {
    #[error("Cart already created")]
    AlreadyCreated,

    #[error("Cart not created")]
    NotCreated,

    #[error("Invalid quantity: {0}")]
    InvalidQuantity(u32),

    #[error("Item not found in cart: {product_id}")]
    ItemNotFound { product_id: ProductId },

    #[error("Cart is priced in {cart}, item is priced in {item}")]
    CurrencyMismatch { cart: Currency, item: Currency },

    #[error("Cart {cart_id} belongs to another user")]
    OwnedByAnotherUser { cart_id: AggregateId },
}

impl From<CartError> for DomainError {
    fn from(e: CartError) -> Self {
        match e {
            CartError::InvalidQuantity(_) | CartError::CurrencyMismatch { .. } => {
                DomainError::Validation(e.to_string())
            }
            CartError::ItemNotFound { product_id } => DomainError::not_found("CartItem", product_id),
            CartError::AlreadyCreated
            | CartError::NotCreated
            | CartError::OwnedByAnotherUser { .. } => {
                DomainError::invalid_state("Cart", e.to_string())
            }
        }
    }
}
