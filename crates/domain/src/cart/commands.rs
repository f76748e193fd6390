//! Cart commands.

use common::{AggregateId, ProductId, UserId, VariantId};

use super::NewCartItem;

/// Command to create a cart, anonymous unless a user is given.
#[derive(Debug, Clone)]
pub struct CreateCart {
    pub cart_id: AggregateId,
    pub user_id: Option<UserId>,
}

impl CreateCart {
    pub fn anonymous() -> Self {
        Self {
            cart_id: AggregateId::new(),
            user_id: None,
        }
    }

    pub fn for_user(user_id: UserId) -> Self {
        Self {
            cart_id: AggregateId::new(),
            user_id: Some(user_id),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AddCartItem {
    pub cart_id: AggregateId,
    pub item: NewCartItem,
}

impl AddCartItem {
    pub fn new(cart_id: AggregateId, item: NewCartItem) -> Self {
        Self { cart_id, item }
    }
}

/// Command to set a line's quantity. Zero removes the line.
#[derive(Debug, Clone)]
pub struct UpdateCartItemQuantity {
    pub cart_id: AggregateId,
    pub product_id: ProductId,
    pub variant_id: Option<VariantId>,
    pub quantity: u32,
}

impl UpdateCartItemQuantity {
    pub fn new(
        cart_id: AggregateId,
        product_id: ProductId,
        variant_id: Option<VariantId>,
        quantity: u32,
    ) -> Self {
        Self {
            cart_id,
            product_id,
            variant_id,
            quantity,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RemoveCartItem {
    pub cart_id: AggregateId,
    pub product_id: ProductId,
    pub variant_id: Option<VariantId>,
}

impl RemoveCartItem {
    pub fn new(cart_id: AggregateId, product_id: ProductId, variant_id: Option<VariantId>) -> Self {
        Self {
            cart_id,
            product_id,
            variant_id,
        }
    }
}

#[derive(Debug, Clone)]
pub struct AssignCart {
    pub cart_id: AggregateId,
    pub user_id: UserId,
}

impl AssignCart {
    pub fn new(cart_id: AggregateId, user_id: UserId) -> Self {
        Self { cart_id, user_id }
    }
}
