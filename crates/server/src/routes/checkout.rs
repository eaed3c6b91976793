//! Checkout: place an order from the session cart.

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use chrono::Utc;
use tower_sessions::Session;
use tracing::instrument;

use crate::error::Result;
use crate::middleware::RequireAuth;
use crate::routes::shop::active_store;
use crate::services::checkout::CheckoutDetails;
use crate::services::{CartService, CheckoutService};
use crate::state::AppState;

/// Place a pending order for the cart.
///
/// POST /api/shop/{store_slug}/checkout
///
/// The response carries the order, including the `payment_reference` the
/// payment provider will echo back in its webhook.
///
/// # Errors
///
/// Returns 400 for invalid details or an empty cart and 409 when stock or
/// the promotion ran out.
#[instrument(skip(state, session, user, details), fields(user_id = %user.id))]
pub async fn place_order(
    State(state): State<AppState>,
    session: Session,
    RequireAuth(user): RequireAuth,
    Path(store_slug): Path<String>,
    Json(details): Json<CheckoutDetails>,
) -> Result<impl IntoResponse> {
    let store = active_store(&state, &store_slug).await?;
    let details = details.validate()?;

    let carts = CartService::new(state.pool(), &session);
    let cart = carts.load(&store).await?;

    let order = CheckoutService::new(state.pool())
        .place_order(&store, user.id, &cart, details, Utc::now())
        .await?;

    carts.clear(&store).await?;
    // Stock changed
    state.catalog_cache().invalidate_store(store.id);

    Ok((StatusCode::CREATED, Json(order)))
}
