//! Order line snapshots.

use common::{ProductId, VariantId};
use serde::{Deserialize, Serialize};

use crate::cart::CartItem;
use crate::money::{Money, MoneyError};

/// A line of a placed order.
///
/// Captured from the cart at placement time and never updated afterwards, so
/// later product renames or price changes leave existing orders alone.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderItem {
    pub product_id: ProductId,
    pub product_name: String,
    pub sku: String,
    pub slug: String,
    pub variant_id: Option<VariantId>,
    pub variant_name: Option<String>,
    pub unit_price: Money,
    pub quantity: u32,
}

impl OrderItem {
    pub fn line_total(&self) -> Result<Money, MoneyError> {
        self.unit_price.multiply(self.quantity)
    }
}

impl From<&CartItem> for OrderItem {
    fn from(item: &CartItem) -> Self {
        Self {
            product_id: item.product_id,
            product_name: item.product_name.clone(),
            sku: item.sku.clone(),
            slug: item.slug.clone(),
            variant_id: item.variant_id,
            variant_name: item.variant_name.clone(),
            unit_price: item.unit_price,
            quantity: item.quantity,
        }
    }
}
