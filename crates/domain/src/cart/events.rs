//! Cart domain events.

use chrono::{DateTime, Utc};
use common::{AggregateId, ProductId, UserId, VariantId};
use serde::{Deserialize, Serialize};

use crate::aggregate::DomainEvent;
use crate::money::Money;

/// Events that can occur on a cart aggregate.
///
/// Every variant carries the owning user (if any) so per-user cache entries
/// can be evicted without loading the cart.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum CartEvent {
    CartCreated(CartCreatedData),

    /// A new product/variant line was added.
    CartItemAdded(CartItemAddedData),

    /// An existing line's quantity changed, including merges of repeated adds.
    CartItemQuantityChanged(CartItemQuantityChangedData),

    CartItemRemoved(CartItemRemovedData),

    /// An anonymous cart was taken over by a signed-in user.
    CartAssignedToUser(CartAssignedToUserData),

    CartCleared(CartClearedData),
}

impl DomainEvent for CartEvent {
    fn event_type(&self) -> &'static str {
        match self {
            CartEvent::CartCreated(_) => "CartCreated",
            CartEvent::CartItemAdded(_) => "CartItemAdded",
            CartEvent::CartItemQuantityChanged(_) => "CartItemQuantityChanged",
            CartEvent::CartItemRemoved(_) => "CartItemRemoved",
            CartEvent::CartAssignedToUser(_) => "CartAssignedToUser",
            CartEvent::CartCleared(_) => "CartCleared",
        }
    }
}

impl CartEvent {
    pub const TYPES: [&'static str; 6] = [
        "CartCreated",
        "CartItemAdded",
        "CartItemQuantityChanged",
        "CartItemRemoved",
        "CartAssignedToUser",
        "CartCleared",
    ];
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CartCreatedData {
    pub cart_id: AggregateId,
    pub user_id: Option<UserId>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CartItemAddedData {
    pub cart_id: AggregateId,
    pub user_id: Option<UserId>,
    pub product_id: ProductId,
    pub variant_id: Option<VariantId>,
    pub product_name: String,
    pub sku: String,
    pub slug: String,
    pub variant_name: Option<String>,
    pub unit_price: Money,
    pub quantity: u32,
    pub added_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CartItemQuantityChangedData {
    pub cart_id: AggregateId,
    pub user_id: Option<UserId>,
    pub product_id: ProductId,
    pub variant_id: Option<VariantId>,
    pub old_quantity: u32,
    pub new_quantity: u32,
    pub changed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CartItemRemovedData {
    pub cart_id: AggregateId,
    pub user_id: Option<UserId>,
    pub product_id: ProductId,
    pub variant_id: Option<VariantId>,
    pub removed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CartAssignedToUserData {
    pub cart_id: AggregateId,
    pub user_id: UserId,
    pub assigned_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CartClearedData {
    pub cart_id: AggregateId,
    pub user_id: Option<UserId>,
    pub cleared_at: DateTime<Utc>,
}
