//! Category hierarchy endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use cache::keys;
use chrono::{DateTime, Utc};
use common::AggregateId;
use domain::category::{ChangeParent, ChangeStatus, CreateCategory, UpdateDetails, UpdateSlug};
use domain::{Aggregate, Category, ReconcileReport};
use serde::{Deserialize, Serialize};

use super::{parse_aggregate_id, read_through};
use crate::AppState;
use crate::error::ApiError;

// -- Request types --

#[derive(Deserialize)]
pub struct CreateCategoryRequest {
    pub name: String,
    pub slug: String,
    pub description: Option<String>,
    pub parent_id: Option<String>,
}

#[derive(Deserialize)]
pub struct UpdateCategoryRequest {
    pub name: String,
    pub description: Option<String>,
}

#[derive(Deserialize)]
pub struct ChangeParentRequest {
    /// None moves the category to the root.
    pub parent_id: Option<String>,
}

#[derive(Deserialize)]
pub struct ChangeSlugRequest {
    pub slug: String,
}

#[derive(Deserialize)]
pub struct ChangeStatusRequest {
    pub is_active: bool,
}

#[derive(Deserialize)]
pub struct ListQuery {
    pub parent_id: Option<String>,
}

// -- Response types --

#[derive(Debug, Serialize, Deserialize)]
pub struct CategoryResponse {
    pub id: AggregateId,
    pub name: String,
    pub slug: String,
    pub description: Option<String>,
    pub parent_id: Option<AggregateId>,
    pub level: u32,
    pub path: String,
    pub is_active: bool,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl CategoryResponse {
    fn from_category(category: &Category) -> Result<Self, ApiError> {
        let id = category
            .id()
            .ok_or_else(|| ApiError::Internal("category without id".to_string()))?;
        Ok(Self {
            id,
            name: category.name().to_string(),
            slug: category.slug().to_string(),
            description: category.description().map(str::to_string),
            parent_id: category.parent_id(),
            level: category.level(),
            path: category.path().to_string(),
            is_active: category.is_active(),
            created_at: category.created_at(),
            updated_at: category.updated_at(),
        })
    }
}

fn parse_optional_id(raw: Option<&str>) -> Result<Option<AggregateId>, ApiError> {
    raw.map(parse_aggregate_id).transpose()
}

// -- Handlers --

/// POST /categories: create a root or child category.
#[tracing::instrument(skip(state, req))]
pub async fn create(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateCategoryRequest>,
) -> Result<(StatusCode, Json<CategoryResponse>), ApiError> {
    let mut cmd = CreateCategory::new(req.name, req.slug);
    if let Some(parent_id) = parse_optional_id(req.parent_id.as_deref())? {
        cmd = cmd.with_parent(parent_id);
    }
    if let Some(description) = req.description {
        cmd = cmd.with_description(description);
    }

    let result = state.categories.create_category(cmd).await?;
    Ok((
        StatusCode::CREATED,
        Json(CategoryResponse::from_category(&result.aggregate)?),
    ))
}

/// GET /categories/{id}: read-through cached.
#[tracing::instrument(skip(state))]
pub async fn get(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<CategoryResponse>, ApiError> {
    let category_id = parse_aggregate_id(&id)?;
    let response = read_through(&state, &keys::category(category_id), || async {
        match state.categories.get_category(category_id).await? {
            Some(category) => CategoryResponse::from_category(&category).map(Some),
            None => Ok(None),
        }
    })
    .await?
    .ok_or_else(|| ApiError::NotFound(format!("Category {id} not found")))?;

    Ok(Json(response))
}

/// GET /categories/by-slug/{slug}: read-through cached.
#[tracing::instrument(skip(state))]
pub async fn get_by_slug(
    State(state): State<Arc<AppState>>,
    Path(slug): Path<String>,
) -> Result<Json<CategoryResponse>, ApiError> {
    let response = read_through(&state, &keys::category_slug(&slug), || async {
        match state.categories.get_by_slug(&slug).await? {
            Some(category) => CategoryResponse::from_category(&category).map(Some),
            None => Ok(None),
        }
    })
    .await?
    .ok_or_else(|| ApiError::NotFound(format!("Category with slug '{slug}' not found")))?;

    Ok(Json(response))
}

/// GET /categories?parent_id=: direct children of a parent, or the roots.
#[tracing::instrument(skip(state, query))]
pub async fn list(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Vec<CategoryResponse>>, ApiError> {
    let parent_id = parse_optional_id(query.parent_id.as_deref())?;
    let children = read_through(&state, &keys::category_children(parent_id), || async {
        let children = state.categories.children(parent_id).await?;
        children
            .iter()
            .map(CategoryResponse::from_category)
            .collect::<Result<Vec<_>, _>>()
            .map(Some)
    })
    .await?
    .unwrap_or_default();

    Ok(Json(children))
}

/// PUT /categories/{id}: update name and description.
#[tracing::instrument(skip(state, req))]
pub async fn update(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(req): Json<UpdateCategoryRequest>,
) -> Result<Json<CategoryResponse>, ApiError> {
    let category_id = parse_aggregate_id(&id)?;
    let result = state
        .categories
        .update_details(UpdateDetails::new(category_id, req.name, req.description))
        .await?;
    Ok(Json(CategoryResponse::from_category(&result.aggregate)?))
}

/// PUT /categories/{id}/parent: move a category and its subtree.
#[tracing::instrument(skip(state, req))]
pub async fn change_parent(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(req): Json<ChangeParentRequest>,
) -> Result<Json<CategoryResponse>, ApiError> {
    let category_id = parse_aggregate_id(&id)?;
    let parent_id = parse_optional_id(req.parent_id.as_deref())?;
    let result = state
        .categories
        .change_parent(ChangeParent::new(category_id, parent_id))
        .await?;
    Ok(Json(CategoryResponse::from_category(&result.aggregate)?))
}

/// PUT /categories/{id}/slug
#[tracing::instrument(skip(state, req))]
pub async fn change_slug(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(req): Json<ChangeSlugRequest>,
) -> Result<Json<CategoryResponse>, ApiError> {
    let category_id = parse_aggregate_id(&id)?;
    let result = state
        .categories
        .update_slug(UpdateSlug::new(category_id, req.slug))
        .await?;
    Ok(Json(CategoryResponse::from_category(&result.aggregate)?))
}

/// PUT /categories/{id}/status: activate or deactivate, without cascading.
#[tracing::instrument(skip(state, req))]
pub async fn change_status(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(req): Json<ChangeStatusRequest>,
) -> Result<Json<CategoryResponse>, ApiError> {
    let category_id = parse_aggregate_id(&id)?;
    let result = state
        .categories
        .change_status(ChangeStatus::new(category_id, req.is_active))
        .await?;
    Ok(Json(CategoryResponse::from_category(&result.aggregate)?))
}

/// POST /categories/reconcile: repair level/path drift.
#[tracing::instrument(skip(state))]
pub async fn reconcile(
    State(state): State<Arc<AppState>>,
) -> Result<Json<ReconcileReport>, ApiError> {
    let report = state.reconciler.reconcile().await?;
    if report.repaired > 0 || !report.detached.is_empty() {
        tracing::warn!(
            repaired = report.repaired,
            detached = report.detached.len(),
            "category hierarchy reconciled"
        );
    }
    Ok(Json(report))
}
