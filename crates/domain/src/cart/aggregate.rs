//! Cart aggregate implementation.

use chrono::{DateTime, Utc};
use common::{AggregateId, ProductId, UserId, VariantId};
use serde::{Deserialize, Serialize};
use store::Version;

use crate::aggregate::Aggregate;
use crate::money::{Currency, Money, MoneyError};

use super::events::{
    CartAssignedToUserData, CartClearedData, CartCreatedData, CartItemAddedData,
    CartItemQuantityChangedData, CartItemRemovedData,
};
use super::{CartError, CartEvent};

/// One line in a cart. Unique per product and variant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CartItem {
    pub product_id: ProductId,
    pub variant_id: Option<VariantId>,
    pub product_name: String,
    pub sku: String,
    pub slug: String,
    pub variant_name: Option<String>,
    pub unit_price: Money,
    pub quantity: u32,
}

impl CartItem {
    pub fn line_total(&self) -> Result<Money, MoneyError> {
        self.unit_price.multiply(self.quantity)
    }

    fn is(&self, product_id: ProductId, variant_id: Option<VariantId>) -> bool {
        self.product_id == product_id && self.variant_id == variant_id
    }
}

/// Product details captured when a line is added.
#[derive(Debug, Clone, PartialEq)]
pub struct NewCartItem {
    pub product_id: ProductId,
    pub variant_id: Option<VariantId>,
    pub product_name: String,
    pub sku: String,
    pub slug: String,
    pub variant_name: Option<String>,
    pub unit_price: Money,
    pub quantity: u32,
}

/// Cart aggregate root.
///
/// Anonymous until assigned to a user. All lines share one currency.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Cart {
    id: Option<AggregateId>,

    #[serde(skip)]
    version: Version,

    user_id: Option<UserId>,
    items: Vec<CartItem>,
    created_at: Option<DateTime<Utc>>,
    updated_at: Option<DateTime<Utc>>,
}

impl Aggregate for Cart {
    type Event = CartEvent;
    type Error = CartError;

    fn aggregate_type() -> &'static str {
        "Cart"
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
            CartEvent::CartCreated(data) => {
                self.id = Some(data.cart_id);
                self.user_id = data.user_id;
                self.created_at = Some(data.created_at);
                self.updated_at = Some(data.created_at);
            }
            CartEvent::CartItemAdded(data) => {
                self.items.push(CartItem {
                    product_id: data.product_id,
                    variant_id: data.variant_id,
                    product_name: data.product_name,
                    sku: data.sku,
                    slug: data.slug,
                    variant_name: data.variant_name,
                    unit_price: data.unit_price,
                    quantity: data.quantity,
                });
                self.updated_at = Some(data.added_at);
            }
            CartEvent::CartItemQuantityChanged(data) => {
                if let Some(item) = self
                    .items
                    .iter_mut()
                    .find(|i| i.is(data.product_id, data.variant_id))
                {
                    item.quantity = data.new_quantity;
                }
                self.updated_at = Some(data.changed_at);
            }
            CartEvent::CartItemRemoved(data) => {
                self.items.retain(|i| !i.is(data.product_id, data.variant_id));
                self.updated_at = Some(data.removed_at);
            }
            CartEvent::CartAssignedToUser(data) => {
                self.user_id = Some(data.user_id);
                self.updated_at = Some(data.assigned_at);
            }
            CartEvent::CartCleared(data) => {
                self.items.clear();
                self.updated_at = Some(data.cleared_at);
            }
        }
    }
}

// Query methods
impl Cart {
    pub fn user_id(&self) -> Option<UserId> {
        self.user_id
    }

    pub fn items(&self) -> &[CartItem] {
        &self.items
    }

    pub fn get_item(
        &self,
        product_id: ProductId,
        variant_id: Option<VariantId>,
    ) -> Option<&CartItem> {
        self.items.iter().find(|i| i.is(product_id, variant_id))
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn total_quantity(&self) -> u32 {
        self.items.iter().map(|i| i.quantity).sum()
    }

    /// Currency shared by every line, None while the cart is empty.
    pub fn currency(&self) -> Option<Currency> {
        self.items.first().map(|i| i.unit_price.currency())
    }

    /// Sum of all line totals. An empty cart totals zero in the default currency.
    pub fn total(&self) -> Result<Money, MoneyError> {
        let currency = self.currency().unwrap_or_default();
        Money::sum(
            currency,
            self.items
                .iter()
                .map(CartItem::line_total)
                .collect::<Result<Vec<_>, _>>()?,
        )
    }

    pub fn updated_at(&self) -> Option<DateTime<Utc>> {
        self.updated_at
    }

    fn require_id(&self) -> Result<AggregateId, CartError> {
        self.id.ok_or(CartError::NotCreated)
    }
}

// Command methods (return events)
impl Cart {
    /// Creates a cart, anonymous when `user_id` is None.
    pub fn create(
        &self,
        cart_id: AggregateId,
        user_id: Option<UserId>,
    ) -> Result<Vec<CartEvent>, CartError> {
        if self.id.is_some() {
            return Err(CartError::AlreadyCreated);
        }

        Ok(vec![CartEvent::CartCreated(CartCreatedData {
            cart_id,
            user_id,
            created_at: Utc::now(),
        })])
    }

    /// Adds a line, or increments the quantity of the matching
    /// product+variant line.
    pub fn add_item(&self, item: NewCartItem) -> Result<Vec<CartEvent>, CartError> {
        let cart_id = self.require_id()?;
        if item.quantity == 0 {
            return Err(CartError::InvalidQuantity(item.quantity));
        }
        if let Some(currency) = self.currency()
            && currency != item.unit_price.currency()
        {
            return Err(CartError::CurrencyMismatch {
                cart: currency,
                item: item.unit_price.currency(),
            });
        }

        if let Some(existing) = self.get_item(item.product_id, item.variant_id) {
            let new_quantity = existing
                .quantity
                .checked_add(item.quantity)
                .ok_or(CartError::InvalidQuantity(item.quantity))?;
            return Ok(vec![CartEvent::CartItemQuantityChanged(
                CartItemQuantityChangedData {
                    cart_id,
                    user_id: self.user_id,
                    product_id: item.product_id,
                    variant_id: item.variant_id,
                    old_quantity: existing.quantity,
                    new_quantity,
                    changed_at: Utc::now(),
                },
            )]);
        }

        Ok(vec![CartEvent::CartItemAdded(CartItemAddedData {
            cart_id,
            user_id: self.user_id,
            product_id: item.product_id,
            variant_id: item.variant_id,
            product_name: item.product_name,
            sku: item.sku,
            slug: item.slug,
            variant_name: item.variant_name,
            unit_price: item.unit_price,
            quantity: item.quantity,
            added_at: Utc::now(),
        })])
    }

    /// Sets a line's quantity. Zero removes the line.
    pub fn update_quantity(
        &self,
        product_id: ProductId,
        variant_id: Option<VariantId>,
        quantity: u32,
    ) -> Result<Vec<CartEvent>, CartError> {
        let cart_id = self.require_id()?;
        let existing = self
            .get_item(product_id, variant_id)
            .ok_or(CartError::ItemNotFound { product_id })?;

        if quantity == 0 {
            return self.remove_item(product_id, variant_id);
        }
        if quantity == existing.quantity {
            return Ok(vec![]);
        }

        Ok(vec![CartEvent::CartItemQuantityChanged(
            CartItemQuantityChangedData {
                cart_id,
                user_id: self.user_id,
                product_id,
                variant_id,
                old_quantity: existing.quantity,
                new_quantity: quantity,
                changed_at: Utc::now(),
            },
        )])
    }

    pub fn remove_item(
        &self,
        product_id: ProductId,
        variant_id: Option<VariantId>,
    ) -> Result<Vec<CartEvent>, CartError> {
        let cart_id = self.require_id()?;
        if self.get_item(product_id, variant_id).is_none() {
            return Err(CartError::ItemNotFound { product_id });
        }

        Ok(vec![CartEvent::CartItemRemoved(CartItemRemovedData {
            cart_id,
            user_id: self.user_id,
            product_id,
            variant_id,
            removed_at: Utc::now(),
        })])
    }

    /// Hands an anonymous cart to a user. Re-assigning to the same user is a
    /// no-op; a cart owned by someone else cannot be taken over.
    pub fn assign_user(&self, user_id: UserId) -> Result<Vec<CartEvent>, CartError> {
        let cart_id = self.require_id()?;
        match self.user_id {
            Some(owner) if owner == user_id => Ok(vec![]),
            Some(_) => Err(CartError::OwnedByAnotherUser { cart_id }),
            None => Ok(vec![CartEvent::CartAssignedToUser(CartAssignedToUserData {
                cart_id,
                user_id,
                assigned_at: Utc::now(),
            })]),
        }
    }

    pub fn clear(&self) -> Result<Vec<CartEvent>, CartError> {
        let cart_id = self.require_id()?;
        if self.items.is_empty() {
            return Ok(vec![]);
        }

        Ok(vec![CartEvent::CartCleared(CartClearedData {
            cart_id,
            user_id: self.user_id,
            cleared_at: Utc::now(),
        })])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn usd(amount: i64) -> Money {
        Money::new(amount, Currency::Usd).unwrap()
    }

    fn item(product_id: ProductId, variant_id: Option<VariantId>, quantity: u32) -> NewCartItem {
        NewCartItem {
            product_id,
            variant_id,
            product_name: "T-Shirt".to_string(),
            sku: "TS-001".to_string(),
            slug: "t-shirt".to_string(),
            variant_name: variant_id.map(|_| "Large".to_string()),
            unit_price: usd(1500),
            quantity,
        }
    }

    fn cart(user_id: Option<UserId>) -> Cart {
        let mut cart = Cart::default();
        let events = cart.create(AggregateId::new(), user_id).unwrap();
        cart.apply_events(events);
        cart
    }

    fn run(cart: &mut Cart, events: Result<Vec<CartEvent>, CartError>) {
        cart.apply_events(events.unwrap());
    }

    #[test]
    fn same_product_and_variant_merges() {
        let mut cart = cart(None);
        let product = ProductId::new();
        let variant = Some(VariantId::new());

        let events = cart.add_item(item(product, variant, 2));
        run(&mut cart, events);
        let events = cart.add_item(item(product, variant, 3));
        assert!(matches!(
            events.as_deref(),
            Ok([CartEvent::CartItemQuantityChanged(_)])
        ));
        run(&mut cart, events);

        assert_eq!(cart.items().len(), 1);
        assert_eq!(cart.get_item(product, variant).unwrap().quantity, 5);
        assert_eq!(cart.total().unwrap(), usd(7500));
    }

    #[test]
    fn different_variants_are_separate_lines() {
        let mut cart = cart(None);
        let product = ProductId::new();

        let events = cart.add_item(item(product, Some(VariantId::new()), 1));
        run(&mut cart, events);
        let events = cart.add_item(item(product, None, 1));
        run(&mut cart, events);

        assert_eq!(cart.items().len(), 2);
        assert_eq!(cart.total_quantity(), 2);
    }

    #[test]
    fn zero_quantity_rejected_on_add() {
        let cart = cart(None);
        assert_eq!(
            cart.add_item(item(ProductId::new(), None, 0)),
            Err(CartError::InvalidQuantity(0))
        );
    }

    #[test]
    fn mixed_currencies_rejected() {
        let mut cart = cart(None);
        let events = cart.add_item(item(ProductId::new(), None, 1));
        run(&mut cart, events);

        let mut euro = item(ProductId::new(), None, 1);
        euro.unit_price = Money::new(1000, Currency::Eur).unwrap();
        assert!(matches!(
            cart.add_item(euro),
            Err(CartError::CurrencyMismatch { .. })
        ));
    }

    #[test]
    fn update_quantity_to_zero_removes_line() {
        let mut cart = cart(None);
        let product = ProductId::new();
        let events = cart.add_item(item(product, None, 2));
        run(&mut cart, events);

        assert!(cart.update_quantity(product, None, 2).unwrap().is_empty());

        let events = cart.update_quantity(product, None, 0);
        assert!(matches!(
            events.as_deref(),
            Ok([CartEvent::CartItemRemoved(_)])
        ));
        run(&mut cart, events);
        assert!(cart.is_empty());

        assert_eq!(
            cart.update_quantity(product, None, 1),
            Err(CartError::ItemNotFound {
                product_id: product
            })
        );
    }

    #[test]
    fn assign_user_rules() {
        let owner = UserId::new();
        let mut anonymous = cart(None);

        let events = anonymous.assign_user(owner);
        run(&mut anonymous, events);
        assert_eq!(anonymous.user_id(), Some(owner));

        assert!(anonymous.assign_user(owner).unwrap().is_empty());
        assert!(matches!(
            anonymous.assign_user(UserId::new()),
            Err(CartError::OwnedByAnotherUser { .. })
        ));
    }

    #[test]
    fn clear_empty_cart_is_a_no_op() {
        let mut cart = cart(Some(UserId::new()));
        assert!(cart.clear().unwrap().is_empty());

        let events = cart.add_item(item(ProductId::new(), None, 1));
        run(&mut cart, events);
        let events = cart.clear();
        run(&mut cart, events);
        assert!(cart.is_empty());
        assert_eq!(cart.total().unwrap(), usd(0));
    }

    #[test]
    fn events_carry_the_owner() {
        let owner = UserId::new();
        let cart = cart(Some(owner));
        let events = cart.add_item(item(ProductId::new(), None, 1)).unwrap();
        match &events[0] {
            CartEvent::CartItemAdded(data) => assert_eq!(data.user_id, Some(owner)),
            other => panic!("unexpected event {other:?}"),
        }
    }
}
