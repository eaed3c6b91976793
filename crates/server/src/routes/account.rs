//! Customer account: the caller's own orders across all stores.

use axum::{
    Json,
    extract::{Path, Query, State},
};

use bazaar_core::{OrderId, Page, PageRequest};

use crate::db::OrderRepository;
use crate::error::{AppError, Result};
use crate::middleware::RequireAuth;
use crate::models::order::{Order, OrderDetail};
use crate::services::OrderService;
use crate::state::AppState;

/// The caller's orders, newest first.
///
/// GET /api/account/orders
///
/// # Errors
///
/// Returns 401 when not logged in.
pub async fn orders(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    Query(page): Query<PageRequest>,
) -> Result<Json<Page<Order>>> {
    let orders = OrderRepository::new(state.pool())
        .list_for_user(user.id, page)
        .await?;
    Ok(Json(orders))
}

/// One of the caller's orders with items and delivery.
///
/// GET /api/account/orders/{order_id}
///
/// # Errors
///
/// Returns 404 when the order belongs to someone else.
pub async fn order(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    Path(order_id): Path<OrderId>,
) -> Result<Json<OrderDetail>> {
    let repo = OrderRepository::new(state.pool());
    let order = repo
        .get_for_user(user.id, order_id)
        .await?
        .ok_or_else(|| AppError::NotFound("order not found".to_string()))?;
    Ok(Json(repo.detail(order).await?))
}

/// Cancel a pending order; reserved stock goes back on sale.
///
/// POST /api/account/orders/{order_id}/cancel
///
/// # Errors
///
/// Returns 404 for someone else's order and 409 once it has been paid.
pub async fn cancel_order(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    Path(order_id): Path<OrderId>,
) -> Result<Json<Order>> {
    let order = OrderService::new(state.pool(), state.config().platform_fee_bps)
        .cancel_for_customer(user.id, order_id)
        .await?;
    state.catalog_cache().invalidate_store(order.store_id);
    Ok(Json(order))
}
