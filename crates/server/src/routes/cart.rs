//! Session cart for one store.

use axum::{
    Json,
    extract::{Path, State},
};
use chrono::Utc;
use serde::Deserialize;
use tower_sessions::Session;

use bazaar_core::ProductId;

use crate::error::Result;
use crate::models::cart::CartView;
use crate::routes::shop::active_store;
use crate::services::CartService;
use crate::state::AppState;

/// Add-to-cart request body.
#[derive(Debug, Deserialize)]
pub struct AddItemRequest {
    pub product_id: ProductId,
    #[serde(default = "default_quantity")]
    pub quantity: i32,
}

const fn default_quantity() -> i32 {
    1
}

/// Quantity update request body.
#[derive(Debug, Deserialize)]
pub struct UpdateItemRequest {
    pub quantity: i32,
}

/// Promotion code request body.
#[derive(Debug, Deserialize)]
pub struct PromotionRequest {
    pub code: String,
}

/// Priced view of the cart.
///
/// GET /api/shop/{store_slug}/cart
///
/// # Errors
///
/// Returns 404 for unknown stores.
pub async fn show(
    State(state): State<AppState>,
    session: Session,
    Path(store_slug): Path<String>,
) -> Result<Json<CartView>> {
    let store = active_store(&state, &store_slug).await?;
    let view = CartService::new(state.pool(), &session)
        .view(&store, Utc::now())
        .await?;
    Ok(Json(view))
}

/// Add a product, merging with an existing line.
///
/// POST /api/shop/{store_slug}/cart/items
///
/// # Errors
///
/// Returns 404 for products not sold by the store and 409 when stock is short.
pub async fn add_item(
    State(state): State<AppState>,
    session: Session,
    Path(store_slug): Path<String>,
    Json(body): Json<AddItemRequest>,
) -> Result<Json<CartView>> {
    let store = active_store(&state, &store_slug).await?;
    let view = CartService::new(state.pool(), &session)
        .add_item(&store, body.product_id, body.quantity, Utc::now())
        .await?;
    Ok(Json(view))
}

/// Change a line's quantity; zero removes it.
///
/// PATCH /api/shop/{store_slug}/cart/items/{product_id}
///
/// # Errors
///
/// Returns 404 if the product is not in the cart.
pub async fn update_item(
    State(state): State<AppState>,
    session: Session,
    Path((store_slug, product_id)): Path<(String, ProductId)>,
    Json(body): Json<UpdateItemRequest>,
) -> Result<Json<CartView>> {
    let store = active_store(&state, &store_slug).await?;
    let view = CartService::new(state.pool(), &session)
        .set_quantity(&store, product_id, body.quantity, Utc::now())
        .await?;
    Ok(Json(view))
}

/// Remove a line.
///
/// DELETE /api/shop/{store_slug}/cart/items/{product_id}
///
/// # Errors
///
/// Returns 404 if the product is not in the cart.
pub async fn remove_item(
    State(state): State<AppState>,
    session: Session,
    Path((store_slug, product_id)): Path<(String, ProductId)>,
) -> Result<Json<CartView>> {
    let store = active_store(&state, &store_slug).await?;
    let view = CartService::new(state.pool(), &session)
        .remove_item(&store, product_id, Utc::now())
        .await?;
    Ok(Json(view))
}

/// Empty the cart.
///
/// DELETE /api/shop/{store_slug}/cart
///
/// # Errors
///
/// Returns 404 for unknown stores.
pub async fn clear(
    State(state): State<AppState>,
    session: Session,
    Path(store_slug): Path<String>,
) -> Result<Json<CartView>> {
    let store = active_store(&state, &store_slug).await?;
    let carts = CartService::new(state.pool(), &session);
    carts.clear(&store).await?;
    Ok(Json(carts.view(&store, Utc::now()).await?))
}

/// Attach a promotion code.
///
/// PUT /api/shop/{store_slug}/cart/promotion
///
/// # Errors
///
/// Returns 400 for unknown, expired, inactive or exhausted codes.
pub async fn apply_promotion(
    State(state): State<AppState>,
    session: Session,
    Path(store_slug): Path<String>,
    Json(body): Json<PromotionRequest>,
) -> Result<Json<CartView>> {
    let store = active_store(&state, &store_slug).await?;
    let view = CartService::new(state.pool(), &session)
        .apply_promotion(&store, &body.code, Utc::now())
        .await?;
    Ok(Json(view))
}

/// Detach the promotion code.
///
/// DELETE /api/shop/{store_slug}/cart/promotion
///
/// # Errors
///
/// Returns 404 for unknown stores.
pub async fn remove_promotion(
    State(state): State<AppState>,
    session: Session,
    Path(store_slug): Path<String>,
) -> Result<Json<CartView>> {
    let store = active_store(&state, &store_slug).await?;
    let view = CartService::new(state.pool(), &session)
        .remove_promotion(&store, Utc::now())
        .await?;
    Ok(Json(view))
}
