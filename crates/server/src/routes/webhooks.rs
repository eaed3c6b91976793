//! Payment provider webhook.
//!
//! Deliveries are signed with the shared `BAZAAR_WEBHOOK_SECRET`; without a
//! secret configured the endpoint does not exist.

use axum::{
    Json, Router,
    extract::State,
    http::HeaderMap,
    routing::post,
};
use serde::Serialize;
use tracing::{error, info, instrument};

use bazaar_core::OrderId;

use crate::db::OrderRepository;
use crate::error::{AppError, Result};
use crate::models::order::Order;
use crate::services::OrderService;
use crate::services::orders::PaymentOutcome;
use crate::services::webhook::{
    PaymentEvent, PaymentEventKind, SIGNATURE_HEADER, TIMESTAMP_HEADER, WebhookError,
    verify_signature,
};
use crate::state::AppState;

/// Acknowledgement returned to the payment provider.
#[derive(Debug, Serialize)]
pub struct WebhookAck {
    pub order_id: OrderId,
    /// `paid`, `already_processed` or the order's status after a failure.
    pub result: String,
}

fn header<'a>(
    headers: &'a HeaderMap,
    name: &'static str,
) -> std::result::Result<&'a str, WebhookError> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .ok_or(WebhookError::MissingHeader(name))
}

/// Send the confirmation email without holding up the webhook response.
fn spawn_confirmation(state: &AppState, order: Order) {
    let Some(email) = state.email().cloned() else {
        return;
    };
    let pool = state.pool().clone();

    tokio::spawn(async move {
        let detail = match OrderRepository::new(&pool).detail(order).await {
            Ok(detail) => detail,
            Err(e) => {
                error!(error = %e, "Failed to load order for confirmation email");
                return;
            }
        };
        if let Err(e) = email.send_order_confirmation(&detail).await {
            error!(order_id = %detail.order.id, error = %e, "Failed to send confirmation email");
        }
    });
}

/// Handle a payment event.
///
/// POST /api/webhooks/payments
///
/// # Errors
///
/// Returns 404 when webhooks are disabled, 401 for bad signatures, 404 for
/// unknown payment references and 400 when the amount does not match.
#[instrument(skip(state, headers, body))]
pub async fn payments(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: String,
) -> Result<Json<WebhookAck>> {
    let secret = state
        .config()
        .webhook_secret
        .as_ref()
        .ok_or_else(|| AppError::NotFound("Not found".to_string()))?;

    let timestamp = header(&headers, TIMESTAMP_HEADER)?;
    let signature = header(&headers, SIGNATURE_HEADER)?;
    verify_signature(secret, timestamp, &body, signature)?;

    let event = PaymentEvent::parse(&body)?;
    let orders = OrderService::new(state.pool(), state.config().platform_fee_bps);

    let ack = match event.event {
        PaymentEventKind::Succeeded => {
            match orders.mark_paid(&event.payment_reference, event.amount).await? {
                PaymentOutcome::Paid(order) => {
                    info!(order_id = %order.id, total = %order.total, "Payment succeeded");
                    let ack = WebhookAck {
                        order_id: order.id,
                        result: "paid".to_string(),
                    };
                    spawn_confirmation(&state, order);
                    ack
                }
                PaymentOutcome::AlreadyProcessed(order) => WebhookAck {
                    order_id: order.id,
                    result: "already_processed".to_string(),
                },
            }
        }
        PaymentEventKind::Failed => {
            let order = orders.mark_failed(&event.payment_reference).await?;
            info!(order_id = %order.id, status = %order.status, "Payment failed");
            state.catalog_cache().invalidate_store(order.store_id);
            WebhookAck {
                order_id: order.id,
                result: order.status.to_string(),
            }
        }
    };

    Ok(Json(ack))
}

/// Build the webhook router.
pub fn router() -> Router<AppState> {
    Router::new().route("/payments", post(payments))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use axum::http::HeaderValue;

    use super::*;

    #[test]
    fn test_header_lookup() {
        let mut headers = HeaderMap::new();
        headers.insert(TIMESTAMP_HEADER, HeaderValue::from_static("1700000000"));

        assert_eq!(header(&headers, TIMESTAMP_HEADER).unwrap(), "1700000000");
        assert!(matches!(
            header(&headers, SIGNATURE_HEADER),
            Err(WebhookError::MissingHeader(SIGNATURE_HEADER))
        ));
    }
}
