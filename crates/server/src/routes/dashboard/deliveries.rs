//! Delivery tracking for a store's orders.

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::instrument;

use bazaar_core::{DeliveryId, DeliveryStatus, OrderId, Page, PageRequest, StoreId};

use super::{nullable, owned_store};
use crate::db::DeliveryRepository;
use crate::error::Result;
use crate::middleware::RequireAuth;
use crate::models::delivery::{Delivery, DeliveryFilter, DeliveryUpdate};
use crate::services::OrderService;
use crate::services::orders::NewDelivery;
use crate::state::AppState;

/// Delivery PATCH body, shared with the platform admin routes.
#[derive(Debug, Default, Deserialize)]
pub struct UpdateDeliveryRequest {
    pub status: Option<DeliveryStatus>,
    pub carrier: Option<String>,
    #[serde(default, deserialize_with = "nullable")]
    pub tracking_number: Option<Option<String>>,
    #[serde(default, deserialize_with = "nullable")]
    pub estimated_at: Option<Option<DateTime<Utc>>>,
}

impl From<UpdateDeliveryRequest> for DeliveryUpdate {
    fn from(body: UpdateDeliveryRequest) -> Self {
        Self {
            status: body.status,
            carrier: body.carrier.map(|c| c.trim().to_owned()),
            tracking_number: body
                .tracking_number
                .map(|t| t.map(|t| t.trim().to_owned()).filter(|t| !t.is_empty())),
            estimated_at: body.estimated_at,
            delivered_at: None,
        }
    }
}

/// Deliveries of the store, most recently updated first.
///
/// GET /api/stores/{store_id}/deliveries
///
/// # Errors
///
/// Returns 403/404 per the store ownership rules.
pub async fn index(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    Path(store_id): Path<StoreId>,
    Query(filter): Query<DeliveryFilter>,
    Query(page): Query<PageRequest>,
) -> Result<Json<Page<Delivery>>> {
    let store = owned_store(&state, &user, store_id).await?;
    let deliveries = DeliveryRepository::new(state.pool())
        .list(Some(store.id), filter, page)
        .await?;
    Ok(Json(deliveries))
}

/// Start a delivery for a paid order; the order moves to `processing`.
///
/// POST /api/stores/{store_id}/orders/{order_id}/delivery
///
/// # Errors
///
/// Returns 400 without a carrier and 409 if the order cannot ship yet or
/// already has a delivery.
#[instrument(skip(state, user, body))]
pub async fn create(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    Path((store_id, order_id)): Path<(StoreId, OrderId)>,
    Json(body): Json<NewDelivery>,
) -> Result<impl IntoResponse> {
    let store = owned_store(&state, &user, store_id).await?;
    let delivery = OrderService::new(state.pool(), state.config().platform_fee_bps)
        .create_delivery(Some(store.id), order_id, &body)
        .await?;
    Ok((StatusCode::CREATED, Json(delivery)))
}

/// Update carrier details or advance the delivery status.
///
/// PATCH /api/stores/{store_id}/deliveries/{delivery_id}
///
/// # Errors
///
/// Returns 404 if the delivery is not in the store and 409 for illegal
/// status transitions.
#[instrument(skip(state, user, body))]
pub async fn update(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    Path((store_id, delivery_id)): Path<(StoreId, DeliveryId)>,
    Json(body): Json<UpdateDeliveryRequest>,
) -> Result<Json<Delivery>> {
    let store = owned_store(&state, &user, store_id).await?;
    let delivery = OrderService::new(state.pool(), state.config().platform_fee_bps)
        .update_delivery(Some(store.id), delivery_id, body.into(), Utc::now())
        .await?;
    Ok(Json(delivery))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_update_request_into_delivery_update() {
        let body: UpdateDeliveryRequest = serde_json::from_str(
            r#"{"status": "in_transit", "carrier": " DHL ", "tracking_number": "  "}"#,
        )
        .unwrap();
        let update = DeliveryUpdate::from(body);

        assert_eq!(update.status, Some(DeliveryStatus::InTransit));
        assert_eq!(update.carrier.as_deref(), Some("DHL"));
        assert_eq!(update.tracking_number, Some(None));
        assert_eq!(update.estimated_at, None);
        assert_eq!(update.delivered_at, None);
    }

    #[test]
    fn test_update_request_clears_estimate_with_null() {
        let body: UpdateDeliveryRequest =
            serde_json::from_str(r#"{"estimated_at": null}"#).unwrap();
        assert_eq!(DeliveryUpdate::from(body).estimated_at, Some(None));
    }
}
