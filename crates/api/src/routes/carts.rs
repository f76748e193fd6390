//! Cart endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use cache::keys;
use chrono::{DateTime, Utc};
use common::{AggregateId, ProductId, UserId, VariantId};
use domain::cart::{AddCartItem, CreateCart};
use domain::{Aggregate, Cart, CartItem, Currency, DomainError, Money, NewCartItem};
use serde::{Deserialize, Serialize};

use super::{parse_aggregate_id, read_through};
use crate::AppState;
use crate::error::ApiError;

// -- Request types --

#[derive(Deserialize)]
pub struct CreateCartRequest {
    pub user_id: Option<UserId>,
}

#[derive(Deserialize)]
pub struct AddItemRequest {
    pub product_id: ProductId,
    pub variant_id: Option<VariantId>,
    pub product_name: String,
    pub sku: String,
    pub slug: String,
    pub variant_name: Option<String>,
    /// Unit price in minor units (cents).
    pub unit_price: i64,
    /// ISO 4217 code.
    pub currency: String,
    pub quantity: u32,
}

impl AddItemRequest {
    fn into_item(self) -> Result<NewCartItem, DomainError> {
        let currency = Currency::parse(&self.currency)?;
        Ok(NewCartItem {
            product_id: self.product_id,
            variant_id: self.variant_id,
            product_name: self.product_name,
            sku: self.sku,
            slug: self.slug,
            variant_name: self.variant_name,
            unit_price: Money::new(self.unit_price, currency)?,
            quantity: self.quantity,
        })
    }
}

// -- Response types --

#[derive(Debug, Serialize, Deserialize)]
pub struct CartResponse {
    pub id: AggregateId,
    pub user_id: Option<UserId>,
    pub items: Vec<CartItem>,
    pub total_quantity: u32,
    /// None while the cart is empty.
    pub total: Option<Money>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl CartResponse {
    fn from_cart(cart: &Cart) -> Result<Self, ApiError> {
        let id = cart
            .id()
            .ok_or_else(|| ApiError::Internal("cart without id".to_string()))?;
        let total = if cart.is_empty() {
            None
        } else {
            Some(cart.total().map_err(DomainError::from)?)
        };
        Ok(Self {
            id,
            user_id: cart.user_id(),
            items: cart.items().to_vec(),
            total_quantity: cart.total_quantity(),
            total,
            updated_at: cart.updated_at(),
        })
    }
}

// -- Handlers --

/// POST /carts: create an anonymous or user-owned cart.
#[tracing::instrument(skip(state, req))]
pub async fn create(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateCartRequest>,
) -> Result<(StatusCode, Json<CartResponse>), ApiError> {
    let cmd = match req.user_id {
        Some(user_id) => CreateCart::for_user(user_id),
        None => CreateCart::anonymous(),
    };
    let result = state.carts.create_cart(cmd).await?;
    Ok((
        StatusCode::CREATED,
        Json(CartResponse::from_cart(&result.aggregate)?),
    ))
}

/// GET /carts/{id}: read-through cached.
#[tracing::instrument(skip(state))]
pub async fn get(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<CartResponse>, ApiError> {
    let cart_id = parse_aggregate_id(&id)?;
    let response = read_through(&state, &keys::cart(cart_id), || async {
        match state.carts.get_cart(cart_id).await? {
            Some(cart) => CartResponse::from_cart(&cart).map(Some),
            None => Ok(None),
        }
    })
    .await?
    .ok_or_else(|| ApiError::NotFound(format!("Cart {id} not found")))?;

    Ok(Json(response))
}

/// GET /users/{user_id}/carts: a user's carts, read-through cached.
#[tracing::instrument(skip(state))]
pub async fn for_user(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<String>,
) -> Result<Json<Vec<CartResponse>>, ApiError> {
    let user_id = UserId::parse(&user_id)
        .map_err(|e| ApiError::BadRequest(format!("Invalid user id '{user_id}': {e}")))?;
    let carts = read_through(&state, &keys::cart_user(user_id), || async {
        state
            .carts
            .carts_for_user(user_id)
            .await?
            .iter()
            .map(CartResponse::from_cart)
            .collect::<Result<Vec<_>, _>>()
            .map(Some)
    })
    .await?
    .unwrap_or_default();

    Ok(Json(carts))
}

/// POST /carts/{id}/items: add a line, merging with an existing one.
#[tracing::instrument(skip(state, req))]
pub async fn add_item(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(req): Json<AddItemRequest>,
) -> Result<Json<CartResponse>, ApiError> {
    let cart_id = parse_aggregate_id(&id)?;
    let item = req.into_item()?;
    let result = state.carts.add_item(AddCartItem::new(cart_id, item)).await?;
    Ok(Json(CartResponse::from_cart(&result.aggregate)?))
}
