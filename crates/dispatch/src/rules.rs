//! Static mapping from event types to the cache entries they make stale.

use cache::keys;
use common::{AggregateId, UserId};
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::HandlerError;

/// A cache entry family derived from an event's `data` object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    /// `category-{category_id}`
    Category,
    /// `category-slug-{slug}`
    CategorySlug,
    /// `category-slug-{old_slug}`, only on slug changes.
    CategoryOldSlug,
    /// `categories-*`
    CategoryListings,
    /// `cart-{cart_id}`
    Cart,
    /// `cart-user-{user_id}`, skipped for anonymous carts.
    CartUser,
    /// `order-{order_id}`
    Order,
    /// `orders-user-{user_id}*`
    OrdersUser,
    /// `payment-{payment_id}`
    Payment,
    /// `order-{order_id}` of the order a payment settles.
    PaymentOrder,
}

/// What to evict from the cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Eviction {
    Key(String),
    Pattern(String),
}

impl Target {
    /// Resolves the target against an event's `data` object.
    ///
    /// Returns None when an optional field (an anonymous cart's user) is
    /// absent, and an error when a required field is missing or malformed.
    pub fn resolve(&self, data: &Value) -> Result<Option<Eviction>, HandlerError> {
        let eviction = match self {
            Target::Category => Eviction::Key(keys::category(field(data, "category_id")?)),
            Target::CategorySlug => {
                Eviction::Key(keys::category_slug(&field::<String>(data, "slug")?))
            }
            Target::CategoryOldSlug => {
                Eviction::Key(keys::category_slug(&field::<String>(data, "old_slug")?))
            }
            Target::CategoryListings => Eviction::Pattern(keys::CATEGORIES_PATTERN.to_string()),
            Target::Cart => Eviction::Key(keys::cart(field(data, "cart_id")?)),
            Target::CartUser => match field::<Option<UserId>>(data, "user_id")? {
                Some(user_id) => Eviction::Key(keys::cart_user(user_id)),
                None => return Ok(None),
            },
            Target::Order => Eviction::Key(keys::order(field(data, "order_id")?)),
            Target::OrdersUser => {
                Eviction::Pattern(keys::orders_user_pattern(field(data, "user_id")?))
            }
            Target::Payment => Eviction::Key(keys::payment(field(data, "payment_id")?)),
            Target::PaymentOrder => {
                Eviction::Key(keys::order(field::<AggregateId>(data, "order_id")?))
            }
        };
        Ok(Some(eviction))
    }
}

fn field<T: DeserializeOwned>(data: &Value, name: &str) -> Result<T, HandlerError> {
    let value = data.get(name).cloned().unwrap_or(Value::Null);
    serde_json::from_value(value)
        .map_err(|e| HandlerError::Payload(format!("field '{name}': {e}")))
}

/// One row of the table.
#[derive(Debug, Clone, Copy)]
pub struct Rule {
    pub event_type: &'static str,
    pub targets: &'static [Target],
}

impl Rule {
    const fn new(event_type: &'static str, targets: &'static [Target]) -> Self {
        Self {
            event_type,
            targets,
        }
    }
}

const CATEGORY: &[Target] = &[Target::Category, Target::CategorySlug, Target::CategoryListings];
const CATEGORY_SLUG_CHANGE: &[Target] = &[
    Target::Category,
    Target::CategorySlug,
    Target::CategoryOldSlug,
    Target::CategoryListings,
];
const CART: &[Target] = &[Target::Cart, Target::CartUser];
const ORDER: &[Target] = &[Target::Order, Target::OrdersUser];
const PAYMENT: &[Target] = &[Target::Payment, Target::PaymentOrder];

pub static RULES: &[Rule] = &[
    Rule::new("CategoryCreated", CATEGORY),
    Rule::new("CategoryRenamed", CATEGORY),
    Rule::new("CategorySlugChanged", CATEGORY_SLUG_CHANGE),
    Rule::new("CategoryMoved", CATEGORY),
    Rule::new("CategoryPathChanged", CATEGORY),
    Rule::new("CategoryStatusChanged", CATEGORY),
    Rule::new("CategoryDetailsUpdated", CATEGORY),
    Rule::new("CartCreated", CART),
    Rule::new("CartItemAdded", CART),
    Rule::new("CartItemQuantityChanged", CART),
    Rule::new("CartItemRemoved", CART),
    Rule::new("CartAssignedToUser", CART),
    Rule::new("CartCleared", CART),
    Rule::new("OrderPlaced", ORDER),
    Rule::new("OrderPaid", ORDER),
    Rule::new("OrderShipped", ORDER),
    Rule::new("OrderDelivered", ORDER),
    Rule::new("OrderCancelled", ORDER),
    Rule::new("PaymentCreated", PAYMENT),
    Rule::new("PaymentProcessing", PAYMENT),
    Rule::new("PaymentSucceeded", PAYMENT),
    Rule::new("PaymentFailed", PAYMENT),
    Rule::new("PaymentRefunded", PAYMENT),
];

/// Cache targets for an event type, if it has a rule.
pub fn targets_for(event_type: &str) -> Option<&'static [Target]> {
    RULES
        .iter()
        .find(|rule| rule.event_type == event_type)
        .map(|rule| rule.targets)
}
