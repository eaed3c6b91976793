//! Platform admin (`/api/admin`). Every route requires the admin role.

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    routing::{get, patch},
};
use chrono::Utc;
use serde::Deserialize;
use tracing::instrument;

use bazaar_core::{DeliveryId, OrderId, Page, PageRequest, StoreId, UserId, UserRole};

use super::dashboard::deliveries::UpdateDeliveryRequest;
use super::dashboard::orders::StatusRequest;
use crate::db::{
    AnalyticsRepository, DeliveryRepository, OrderRepository, StoreRepository, UserRepository,
};
use crate::error::{AppError, Result};
use crate::middleware::RequireAdmin;
use crate::models::analytics::{AnalyticsQuery, PlatformAnalytics, PlatformKpis};
use crate::models::delivery::{Delivery, DeliveryFilter};
use crate::models::order::{Order, OrderFilter};
use crate::models::store::{Store, StoreUpdate};
use crate::models::user::User;
use crate::services::OrderService;
use crate::state::AppState;

/// `?q=` user search.
#[derive(Debug, Default, Deserialize)]
pub struct UserQuery {
    pub q: Option<String>,
}

/// Store activation body.
#[derive(Debug, Deserialize)]
pub struct StoreActiveRequest {
    pub active: bool,
}

/// Role change body.
#[derive(Debug, Deserialize)]
pub struct RoleRequest {
    pub role: UserRole,
}

/// Platform KPIs.
///
/// GET /api/admin/kpis
///
/// # Errors
///
/// Returns 401/403 for non-admins.
#[instrument(skip(state, _admin))]
pub async fn kpis(
    State(state): State<AppState>,
    RequireAdmin(_admin): RequireAdmin,
) -> Result<Json<PlatformKpis>> {
    Ok(Json(AnalyticsRepository::new(state.pool()).platform_kpis().await?))
}

/// Platform revenue and orders per month.
///
/// GET /api/admin/analytics
///
/// # Errors
///
/// Returns 401/403 for non-admins.
#[instrument(skip(state, _admin))]
pub async fn analytics(
    State(state): State<AppState>,
    RequireAdmin(_admin): RequireAdmin,
    Query(query): Query<AnalyticsQuery>,
) -> Result<Json<PlatformAnalytics>> {
    Ok(Json(
        AnalyticsRepository::new(state.pool())
            .platform(query.months())
            .await?,
    ))
}

/// Orders across every store.
///
/// GET /api/admin/orders
///
/// # Errors
///
/// Returns 401/403 for non-admins.
pub async fn orders(
    State(state): State<AppState>,
    RequireAdmin(_admin): RequireAdmin,
    Query(filter): Query<OrderFilter>,
    Query(page): Query<PageRequest>,
) -> Result<Json<Page<Order>>> {
    Ok(Json(
        OrderRepository::new(state.pool())
            .list(&filter, page)
            .await?,
    ))
}

/// Move any order to a new status.
///
/// PATCH /api/admin/orders/{order_id}/status
///
/// # Errors
///
/// Returns 404 for unknown orders and 409 for illegal transitions.
#[instrument(skip(state, admin), fields(admin_id = %admin.id))]
pub async fn update_order_status(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
    Path(order_id): Path<OrderId>,
    Json(body): Json<StatusRequest>,
) -> Result<Json<Order>> {
    let order = OrderService::new(state.pool(), state.config().platform_fee_bps)
        .change_status(order_id, body.status, None)
        .await?;
    state.catalog_cache().invalidate_store(order.store_id);
    Ok(Json(order))
}

/// Deliveries across every store.
///
/// GET /api/admin/deliveries
///
/// # Errors
///
/// Returns 401/403 for non-admins.
pub async fn deliveries(
    State(state): State<AppState>,
    RequireAdmin(_admin): RequireAdmin,
    Query(filter): Query<DeliveryFilter>,
    Query(page): Query<PageRequest>,
) -> Result<Json<Page<Delivery>>> {
    Ok(Json(
        DeliveryRepository::new(state.pool())
            .list(None, filter, page)
            .await?,
    ))
}

/// Update any delivery.
///
/// PATCH /api/admin/deliveries/{delivery_id}
///
/// # Errors
///
/// Returns 404 for unknown deliveries and 409 for illegal transitions.
#[instrument(skip(state, admin, body), fields(admin_id = %admin.id))]
pub async fn update_delivery(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
    Path(delivery_id): Path<DeliveryId>,
    Json(body): Json<UpdateDeliveryRequest>,
) -> Result<Json<Delivery>> {
    let delivery = OrderService::new(state.pool(), state.config().platform_fee_bps)
        .update_delivery(None, delivery_id, body.into(), Utc::now())
        .await?;
    Ok(Json(delivery))
}

/// Every store on the platform.
///
/// GET /api/admin/stores
///
/// # Errors
///
/// Returns 401/403 for non-admins.
pub async fn stores(
    State(state): State<AppState>,
    RequireAdmin(_admin): RequireAdmin,
) -> Result<Json<Vec<Store>>> {
    Ok(Json(StoreRepository::new(state.pool()).list_all().await?))
}

/// Activate or suspend a store.
///
/// PATCH /api/admin/stores/{store_id}
///
/// # Errors
///
/// Returns 404 for unknown stores.
#[instrument(skip(state, admin), fields(admin_id = %admin.id))]
pub async fn update_store(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
    Path(store_id): Path<StoreId>,
    Json(body): Json<StoreActiveRequest>,
) -> Result<Json<Store>> {
    let update = StoreUpdate {
        active: Some(body.active),
        ..StoreUpdate::default()
    };
    let store = StoreRepository::new(state.pool())
        .update(store_id, &update)
        .await?;
    state.catalog_cache().invalidate_store(store.id);

    tracing::info!(store_id = %store.id, active = store.active, "Store activation changed");
    Ok(Json(store))
}

/// Users, newest first, optionally filtered by email or name.
///
/// GET /api/admin/users
///
/// # Errors
///
/// Returns 401/403 for non-admins.
pub async fn users(
    State(state): State<AppState>,
    RequireAdmin(_admin): RequireAdmin,
    Query(query): Query<UserQuery>,
    Query(page): Query<PageRequest>,
) -> Result<Json<Page<User>>> {
    let q = query.q.as_deref().map(str::trim).filter(|q| !q.is_empty());
    Ok(Json(UserRepository::new(state.pool()).list(q, page).await?))
}

/// Change a user's role. Admins cannot demote themselves.
///
/// PATCH /api/admin/users/{user_id}/role
///
/// # Errors
///
/// Returns 400 for self-demotion and 404 for unknown users.
#[instrument(skip(state, admin), fields(admin_id = %admin.id))]
pub async fn update_user_role(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
    Path(user_id): Path<UserId>,
    Json(body): Json<RoleRequest>,
) -> Result<Json<User>> {
    if user_id == admin.id && body.role != UserRole::Admin {
        return Err(AppError::BadRequest(
            "admins cannot remove their own admin role".to_string(),
        ));
    }

    let user = UserRepository::new(state.pool())
        .set_role(user_id, body.role)
        .await?;
    tracing::info!(user_id = %user.id, role = %user.role, "User role changed");
    Ok(Json(user))
}

/// Build the platform admin router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/kpis", get(kpis))
        .route("/analytics", get(analytics))
        .route("/orders", get(orders))
        .route("/orders/{order_id}/status", patch(update_order_status))
        .route("/deliveries", get(deliveries))
        .route("/deliveries/{delivery_id}", patch(update_delivery))
        .route("/stores", get(stores))
        .route("/stores/{store_id}", patch(update_store))
        .route("/users", get(users))
        .route("/users/{user_id}/role", patch(update_user_role))
}
