//! Store order management: listing, export, status changes and printing.

use askama::Template;
use askama_web::WebTemplate;
use axum::{
    Json,
    extract::{Path, Query, State},
    http::header,
    response::{IntoResponse, Response},
};
use chrono::Utc;
use serde::Deserialize;
use tracing::instrument;

use bazaar_core::{OrderId, OrderStatus, Page, PageRequest, Price, StoreId};

use super::owned_store;
use crate::db::OrderRepository;
use crate::error::{AppError, Result};
use crate::middleware::RequireAuth;
use crate::models::order::{Order, OrderDetail, OrderFilter};
use crate::services::OrderService;
use crate::state::AppState;

/// Status change body.
#[derive(Debug, Deserialize)]
pub struct StatusRequest {
    pub status: OrderStatus,
}

/// Printable document kinds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PrintKind {
    #[default]
    Invoice,
    PackingSlip,
}

/// `?type=` for the print route.
#[derive(Debug, Deserialize)]
pub struct PrintQuery {
    #[serde(default, rename = "type")]
    pub kind: PrintKind,
}

/// One order line, formatted for print.
pub struct PrintLine {
    pub name: String,
    pub quantity: i32,
    pub unit_price: String,
    pub line_total: String,
}

/// Order fields formatted for print.
pub struct PrintView {
    pub order_id: String,
    pub placed_on: String,
    pub status: String,
    pub store_name: String,
    pub customer_name: String,
    pub customer_email: String,
    pub phone: String,
    pub address_lines: Vec<String>,
    pub note: Option<String>,
    pub lines: Vec<PrintLine>,
    pub subtotal: String,
    pub discount: Option<String>,
    pub promotion_code: Option<String>,
    pub shipping: String,
    pub total: String,
    pub tracking: Option<String>,
}

impl From<&OrderDetail> for PrintView {
    fn from(detail: &OrderDetail) -> Self {
        let order = &detail.order;
        let money = |amount| Price::new(amount, order.currency).to_string();
        let address = &order.shipping_address;

        let mut address_lines = vec![address.name.clone(), address.line1.clone()];
        address_lines.extend(address.line2.clone());
        address_lines.push(format!("{} {}", address.postal_code, address.city));
        address_lines.push(address.country.clone());

        Self {
            order_id: order.id.to_string(),
            placed_on: order.created_at.format("%Y-%m-%d").to_string(),
            status: order.status.to_string(),
            store_name: order.store_name.clone(),
            customer_name: order.customer_name.clone(),
            customer_email: order.customer_email.to_string(),
            phone: order.phone.clone(),
            address_lines,
            note: order.note.clone(),
            lines: detail
                .items
                .iter()
                .map(|item| PrintLine {
                    name: item.product_name.clone(),
                    quantity: item.quantity,
                    unit_price: money(item.unit_price),
                    line_total: money(item.line_total()),
                })
                .collect(),
            subtotal: money(order.subtotal),
            discount: (!order.discount.is_zero()).then(|| money(order.discount)),
            promotion_code: order.promotion_code.clone(),
            shipping: money(order.shipping),
            total: money(order.total),
            tracking: detail.delivery.as_ref().map(|d| match &d.tracking_number {
                Some(number) => format!("{} {number}", d.carrier),
                None => d.carrier.clone(),
            }),
        }
    }
}

/// Printable invoice.
#[derive(Template, WebTemplate)]
#[template(path = "orders/invoice.html")]
pub struct InvoiceTemplate {
    pub order: PrintView,
}

/// Printable packing slip (no prices).
#[derive(Template, WebTemplate)]
#[template(path = "orders/packing_slip.html")]
pub struct PackingSlipTemplate {
    pub order: PrintView,
}

fn store_filter(mut filter: OrderFilter, store_id: StoreId) -> OrderFilter {
    filter.store_id = Some(store_id);
    filter
}

async fn store_order(state: &AppState, store_id: StoreId, order_id: OrderId) -> Result<Order> {
    OrderRepository::new(state.pool())
        .get_in_store(store_id, order_id)
        .await?
        .ok_or_else(|| AppError::NotFound("order not found".to_string()))
}

/// Orders of the store, newest first.
///
/// GET /api/stores/{store_id}/orders
///
/// # Errors
///
/// Returns 403/404 per the store ownership rules.
#[instrument(skip(state, user, filter))]
pub async fn index(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    Path(store_id): Path<StoreId>,
    Query(filter): Query<OrderFilter>,
    Query(page): Query<PageRequest>,
) -> Result<Json<Page<Order>>> {
    let store = owned_store(&state, &user, store_id).await?;
    let orders = OrderRepository::new(state.pool())
        .list(&store_filter(filter, store.id), page)
        .await?;
    Ok(Json(orders))
}

/// Download the filtered orders as a JSON file.
///
/// GET /api/stores/{store_id}/orders/export
///
/// # Errors
///
/// Returns 403/404 per the store ownership rules.
#[instrument(skip(state, user, filter))]
pub async fn export(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    Path(store_id): Path<StoreId>,
    Query(filter): Query<OrderFilter>,
) -> Result<Response> {
    let store = owned_store(&state, &user, store_id).await?;
    let orders = OrderRepository::new(state.pool())
        .export(&store_filter(filter, store.id))
        .await?;

    let filename = format!(
        "orders-{}-{}.json",
        store.slug,
        Utc::now().format("%Y%m%d")
    );
    tracing::info!(store_id = %store.id, count = orders.len(), "Orders exported");

    Ok((
        [(
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{filename}\""),
        )],
        Json(orders),
    )
        .into_response())
}

/// Order with items and delivery.
///
/// GET /api/stores/{store_id}/orders/{order_id}
///
/// # Errors
///
/// Returns 404 if the order is not in the store.
pub async fn show(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    Path((store_id, order_id)): Path<(StoreId, OrderId)>,
) -> Result<Json<OrderDetail>> {
    let store = owned_store(&state, &user, store_id).await?;
    let order = store_order(&state, store.id, order_id).await?;
    Ok(Json(OrderRepository::new(state.pool()).detail(order).await?))
}

/// Move an order to a new status.
///
/// PATCH /api/stores/{store_id}/orders/{order_id}/status
///
/// # Errors
///
/// Returns 404 if the order is not in the store and 409 for illegal
/// transitions.
#[instrument(skip(state, user))]
pub async fn update_status(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    Path((store_id, order_id)): Path<(StoreId, OrderId)>,
    Json(body): Json<StatusRequest>,
) -> Result<Json<Order>> {
    let store = owned_store(&state, &user, store_id).await?;
    let order = OrderService::new(state.pool(), state.config().platform_fee_bps)
        .change_status(order_id, body.status, Some(store.id))
        .await?;
    state.catalog_cache().invalidate_store(store.id);
    Ok(Json(order))
}

/// Render an invoice or packing slip as HTML.
///
/// GET /api/stores/{store_id}/orders/{order_id}/print?type=invoice|packing_slip
///
/// # Errors
///
/// Returns 404 if the order is not in the store.
pub async fn print(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    Path((store_id, order_id)): Path<(StoreId, OrderId)>,
    Query(query): Query<PrintQuery>,
) -> Result<Response> {
    let store = owned_store(&state, &user, store_id).await?;
    let order = store_order(&state, store.id, order_id).await?;
    let detail = OrderRepository::new(state.pool()).detail(order).await?;
    let order = PrintView::from(&detail);

    Ok(match query.kind {
        PrintKind::Invoice => InvoiceTemplate { order }.into_response(),
        PrintKind::PackingSlip => PackingSlipTemplate { order }.into_response(),
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::TimeZone;
    use rust_decimal::Decimal;

    use bazaar_core::{CurrencyCode, Email, OrderItemId, UserId};

    use super::*;
    use crate::models::order::{OrderItem, ShippingAddress};

    fn detail() -> OrderDetail {
        let placed = Utc.with_ymd_and_hms(2026, 3, 14, 9, 30, 0).unwrap();
        OrderDetail {
            order: Order {
                id: OrderId::new(42),
                store_id: StoreId::new(1),
                store_name: "Clay Works".to_string(),
                currency: CurrencyCode::USD,
                user_id: UserId::new(7),
                customer_email: Email::parse("ana@example.com").unwrap(),
                customer_name: "Ana".to_string(),
                status: OrderStatus::Paid,
                subtotal: Decimal::new(3000, 2),
                discount: Decimal::new(300, 2),
                shipping: Decimal::new(500, 2),
                total: Decimal::new(3200, 2),
                promotion_code: Some("SPRING10".to_string()),
                shipping_address: ShippingAddress {
                    name: "Ana Lima".to_string(),
                    line1: "1 Kiln Road".to_string(),
                    line2: None,
                    city: "Porto".to_string(),
                    postal_code: "4000".to_string(),
                    country: "PT".to_string(),
                },
                phone: "+351 555 0100".to_string(),
                note: None,
                payment_reference: "pay_abc".to_string(),
                created_at: placed,
                updated_at: placed,
            },
            items: vec![OrderItem {
                id: OrderItemId::new(1),
                order_id: OrderId::new(42),
                product_id: None,
                product_name: "Mug".to_string(),
                unit_price: Decimal::new(1500, 2),
                quantity: 2,
            }],
            delivery: None,
        }
    }

    #[test]
    fn test_print_view_formats_money_and_address() {
        let view = PrintView::from(&detail());
        assert_eq!(view.placed_on, "2026-03-14");
        assert_eq!(view.total, "$32.00");
        assert_eq!(view.discount.as_deref(), Some("$3.00"));
        assert_eq!(
            view.address_lines,
            vec!["Ana Lima", "1 Kiln Road", "4000 Porto", "PT"]
        );
        assert_eq!(view.lines[0].line_total, "$30.00");
        assert_eq!(view.tracking, None);
    }

    #[test]
    fn test_invoice_renders_totals() {
        let html = InvoiceTemplate {
            order: PrintView::from(&detail()),
        }
        .render()
        .unwrap();
        assert!(html.contains("Invoice #42"));
        assert!(html.contains("$32.00"));
        assert!(html.contains("SPRING10"));
    }

    #[test]
    fn test_packing_slip_has_no_prices() {
        let html = PackingSlipTemplate {
            order: PrintView::from(&detail()),
        }
        .render()
        .unwrap();
        assert!(html.contains("Packing slip #42"));
        assert!(html.contains("Mug"));
        assert!(!html.contains("$"));
    }

    #[test]
    fn test_print_kind_from_query() {
        let query: PrintQuery = serde_json::from_str(r#"{"type": "packing_slip"}"#).unwrap();
        assert_eq!(query.kind, PrintKind::PackingSlip);
        let query: PrintQuery = serde_json::from_str("{}").unwrap();
        assert_eq!(query.kind, PrintKind::Invoice);
    }
}
