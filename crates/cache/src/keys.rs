//! Cache key layout.
//!
//! Readers populate these keys and the invalidation handlers evict them, so
//! both sides build keys through this module only. The order and payment keys
//! have no HTTP reader yet; they are evicted so a reader added later never
//! serves stale data.

use common::{AggregateId, UserId};

/// Matches every category listing (roots, children pages).
pub const CATEGORIES_PATTERN: &str = "categories-*";

pub fn category(id: AggregateId) -> String {
    format!("category-{id}")
}

pub fn category_slug(slug: &str) -> String {
    format!("category-slug-{slug}")
}

/// Children listing of `parent`, or of the roots when None.
pub fn category_children(parent: Option<AggregateId>) -> String {
    match parent {
        Some(id) => format!("categories-children-{id}"),
        None => "categories-children-root".to_string(),
    }
}

pub fn cart(id: AggregateId) -> String {
    format!("cart-{id}")
}

pub fn cart_user(user_id: UserId) -> String {
    format!("cart-user-{user_id}")
}

pub fn order(id: AggregateId) -> String {
    format!("order-{id}")
}

/// Matches every order listing page of a user.
pub fn orders_user_pattern(user_id: UserId) -> String {
    format!("orders-user-{user_id}*")
}

pub fn payment(id: AggregateId) -> String {
    format!("payment-{id}")
}
