//! Category management.

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::Deserialize;
use tracing::instrument;

use bazaar_core::{
    CategoryId, PositionUpdate, Slug, StoreId, ensure_same_members, validate_reorder,
};

use super::{owned_store, required_text, slug_or_name};
use crate::db::CategoryRepository;
use crate::error::{AppError, Result};
use crate::middleware::RequireAuth;
use crate::models::catalog::Category;
use crate::state::AppState;

const MAX_NAME_LENGTH: usize = 80;

/// New category request body.
#[derive(Debug, Deserialize)]
pub struct CreateCategoryRequest {
    pub name: String,
    pub slug: Option<String>,
}

/// Category PATCH body.
#[derive(Debug, Deserialize)]
pub struct UpdateCategoryRequest {
    pub name: Option<String>,
    pub slug: Option<String>,
}

/// Categories in display order.
///
/// GET /api/stores/{store_id}/categories
///
/// # Errors
///
/// Returns 403/404 per the store ownership rules.
pub async fn index(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    Path(store_id): Path<StoreId>,
) -> Result<Json<Vec<Category>>> {
    let store = owned_store(&state, &user, store_id).await?;
    Ok(Json(CategoryRepository::new(state.pool()).list(store.id).await?))
}

/// Add a category at the end of the list.
///
/// POST /api/stores/{store_id}/categories
///
/// # Errors
///
/// Returns 400 for invalid names and 409 for duplicate slugs.
#[instrument(skip(state, user, body))]
pub async fn create(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    Path(store_id): Path<StoreId>,
    Json(body): Json<CreateCategoryRequest>,
) -> Result<impl IntoResponse> {
    let store = owned_store(&state, &user, store_id).await?;
    let name = required_text("name", &body.name, MAX_NAME_LENGTH)?;
    let slug = slug_or_name(body.slug.as_deref(), &name)?;

    let category = CategoryRepository::new(state.pool())
        .create(store.id, &name, &slug)
        .await?;
    state.catalog_cache().invalidate_store(store.id);
    Ok((StatusCode::CREATED, Json(category)))
}

/// Rename a category or change its slug.
///
/// PATCH /api/stores/{store_id}/categories/{category_id}
///
/// # Errors
///
/// Returns 404 if the category is not in the store.
pub async fn update(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    Path((store_id, category_id)): Path<(StoreId, CategoryId)>,
    Json(body): Json<UpdateCategoryRequest>,
) -> Result<Json<Category>> {
    let store = owned_store(&state, &user, store_id).await?;
    let name = body
        .name
        .as_deref()
        .map(|n| required_text("name", n, MAX_NAME_LENGTH))
        .transpose()?;
    let slug = body
        .slug
        .as_deref()
        .map(|s| Slug::parse(s).map_err(|e| AppError::BadRequest(e.to_string())))
        .transpose()?;

    let category = CategoryRepository::new(state.pool())
        .update(store.id, category_id, name.as_deref(), slug.as_ref())
        .await?;
    state.catalog_cache().invalidate_store(store.id);
    Ok(Json(category))
}

/// Delete a category; its products become uncategorised.
///
/// DELETE /api/stores/{store_id}/categories/{category_id}
///
/// # Errors
///
/// Returns 404 if the category is not in the store.
pub async fn destroy(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    Path((store_id, category_id)): Path<(StoreId, CategoryId)>,
) -> Result<StatusCode> {
    let store = owned_store(&state, &user, store_id).await?;
    CategoryRepository::new(state.pool())
        .delete(store.id, category_id)
        .await?;
    state.catalog_cache().invalidate_store(store.id);
    Ok(StatusCode::NO_CONTENT)
}

/// Set the display order of every category in the store.
///
/// PUT /api/stores/{store_id}/categories/reorder
///
/// # Errors
///
/// Returns 400 unless the list names each of the store's categories once.
#[instrument(skip(state, user, updates))]
pub async fn reorder(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    Path(store_id): Path<StoreId>,
    Json(updates): Json<Vec<PositionUpdate<CategoryId>>>,
) -> Result<Json<Vec<Category>>> {
    let store = owned_store(&state, &user, store_id).await?;
    let repo = CategoryRepository::new(state.pool());

    let sorted = validate_reorder(&updates)?;
    ensure_same_members(&sorted, &repo.ids(store.id).await?)?;
    repo.reorder(store.id, &sorted).await?;

    state.catalog_cache().invalidate_store(store.id);
    Ok(Json(repo.list(store.id).await?))
}
