//! Public storefront catalog.
//!
//! Every route is scoped by the store slug in the path; inactive stores are
//! indistinguishable from unknown ones.

use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, Query, State},
};
use tracing::instrument;

use bazaar_core::{CourseId, Page, PageRequest};

use crate::db::products::ListScope;
use crate::db::{CategoryRepository, CourseRepository, ProductRepository, StoreRepository};
use crate::error::{AppError, Result};
use crate::models::catalog::{Category, Product, ProductDetail, ProductFilter};
use crate::models::course::{Course, CourseDetail};
use crate::models::store::Store;
use crate::state::AppState;

/// Load an active store by slug.
///
/// # Errors
///
/// Returns 404 for unknown or inactive stores.
pub(crate) async fn active_store(state: &AppState, slug: &str) -> Result<Store> {
    StoreRepository::new(state.pool())
        .get_active_by_slug(slug)
        .await?
        .ok_or_else(|| AppError::NotFound("store not found".to_string()))
}

/// Store front page data.
///
/// GET /api/shop/{store_slug}
///
/// # Errors
///
/// Returns 404 for unknown or inactive stores.
pub async fn store(
    State(state): State<AppState>,
    Path(store_slug): Path<String>,
) -> Result<Json<Store>> {
    Ok(Json(active_store(&state, &store_slug).await?))
}

/// Categories in display order.
///
/// GET /api/shop/{store_slug}/categories
///
/// # Errors
///
/// Returns 404 for unknown stores, 500 on database errors.
#[instrument(skip(state))]
pub async fn categories(
    State(state): State<AppState>,
    Path(store_slug): Path<String>,
) -> Result<Json<Arc<Vec<Category>>>> {
    let store = active_store(&state, &store_slug).await?;
    let cache = state.catalog_cache();

    if let Some(categories) = cache.categories(store.id).await {
        return Ok(Json(categories));
    }

    let categories = Arc::new(CategoryRepository::new(state.pool()).list(store.id).await?);
    cache.put_categories(store.id, Arc::clone(&categories)).await;
    Ok(Json(categories))
}

/// Filtered, sorted, paged product listing. Archived products never appear.
///
/// GET /api/shop/{store_slug}/products
///
/// # Errors
///
/// Returns 404 for unknown stores, 500 on database errors.
#[instrument(skip(state, filter))]
pub async fn products(
    State(state): State<AppState>,
    Path(store_slug): Path<String>,
    Query(filter): Query<ProductFilter>,
    Query(page): Query<PageRequest>,
) -> Result<Json<Page<Product>>> {
    let store = active_store(&state, &store_slug).await?;
    let products = ProductRepository::new(state.pool())
        .list(store.id, &filter, ListScope::Storefront, page)
        .await?;
    Ok(Json(products))
}

/// Product detail with ordered images.
///
/// GET /api/shop/{store_slug}/products/{product_slug}
///
/// # Errors
///
/// Returns 404 for unknown stores and unlisted products.
#[instrument(skip(state))]
pub async fn product(
    State(state): State<AppState>,
    Path((store_slug, product_slug)): Path<(String, String)>,
) -> Result<Json<Arc<ProductDetail>>> {
    let store = active_store(&state, &store_slug).await?;
    let cache = state.catalog_cache();

    if let Some(detail) = cache.product(store.id, &product_slug).await {
        return Ok(Json(detail));
    }

    let repo = ProductRepository::new(state.pool());
    let product = repo
        .get_listed_by_slug(store.id, &product_slug)
        .await?
        .ok_or_else(|| AppError::NotFound("product not found".to_string()))?;
    let images = repo.images(product.id).await?;

    let detail = Arc::new(ProductDetail { product, images });
    cache.put_product(store.id, Arc::clone(&detail)).await;
    Ok(Json(detail))
}

/// Published courses.
///
/// GET /api/shop/{store_slug}/courses
///
/// # Errors
///
/// Returns 404 for unknown stores.
pub async fn courses(
    State(state): State<AppState>,
    Path(store_slug): Path<String>,
) -> Result<Json<Vec<Course>>> {
    let store = active_store(&state, &store_slug).await?;
    let courses = CourseRepository::new(state.pool())
        .list(store.id, true)
        .await?;
    Ok(Json(courses))
}

/// A published course with chapters and sections in order.
///
/// GET /api/shop/{store_slug}/courses/{course_id}
///
/// # Errors
///
/// Returns 404 for unknown stores and unpublished courses.
pub async fn course(
    State(state): State<AppState>,
    Path((store_slug, course_id)): Path<(String, CourseId)>,
) -> Result<Json<CourseDetail>> {
    let store = active_store(&state, &store_slug).await?;
    let repo = CourseRepository::new(state.pool());
    let course = repo
        .get(store.id, course_id, true)
        .await?
        .ok_or_else(|| AppError::NotFound("course not found".to_string()))?;
    Ok(Json(repo.detail(course).await?))
}
