//! Order and delivery lifecycle.
//!
//! Status changes made by sellers, admins, customers and the payment webhook
//! all go through [`OrderService`], which applies the side effects that keep
//! stock and the store ledger consistent with the order's status.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;
use sqlx::{PgConnection, PgPool};
use thiserror::Error;
use tracing::{info, instrument, warn};

use bazaar_core::{DeliveryId, DeliveryStatus, OrderId, OrderStatus, StoreId, TransitionError, UserId};

use crate::db::{OrderRepository, RepositoryError, deliveries, orders, products, transactions};
use crate::models::delivery::{Delivery, DeliveryUpdate};
use crate::models::order::Order;
use crate::models::transaction::{NewTransaction, platform_fee};

/// Errors from order and delivery lifecycle operations.
#[derive(Debug, Error)]
pub enum OrderError {
    /// The requested status change is not allowed.
    #[error(transparent)]
    Transition(#[from] TransitionError),

    /// Customers may only cancel orders that have not been paid.
    #[error("only pending orders can be cancelled")]
    NotCancellable,

    /// Deliveries can only be created for paid or processing orders.
    #[error("cannot create a delivery for a {0} order")]
    DeliveryNotAllowed(OrderStatus),

    /// Carrier name missing.
    #[error("carrier is required")]
    MissingCarrier,

    /// Order or delivery not found (or not visible to the caller).
    #[error("not found")]
    NotFound,

    /// No order carries the webhook's payment reference.
    #[error("unknown payment reference")]
    UnknownReference,

    /// The paid amount does not match the order total.
    #[error("paid amount {paid} does not match order total {expected}")]
    AmountMismatch { paid: Decimal, expected: Decimal },

    /// Repository/database error.
    #[error("database error: {0}")]
    Repository(#[from] RepositoryError),
}

impl From<sqlx::Error> for OrderError {
    fn from(e: sqlx::Error) -> Self {
        Self::Repository(RepositoryError::Database(e))
    }
}

/// Result of applying a successful payment.
#[derive(Debug)]
pub enum PaymentOutcome {
    /// The order moved from `pending` to `paid`.
    Paid(Order),
    /// The order was already past `pending`; nothing changed.
    AlreadyProcessed(Order),
}

/// Input for a new delivery.
#[derive(Debug, Clone, Deserialize)]
pub struct NewDelivery {
    pub carrier: String,
    pub tracking_number: Option<String>,
    pub estimated_at: Option<DateTime<Utc>>,
}

/// Order lifecycle service.
pub struct OrderService<'a> {
    pool: &'a PgPool,
    fee_bps: u32,
}

impl<'a> OrderService<'a> {
    /// Create a new order service charging `fee_bps` basis points per sale.
    #[must_use]
    pub const fn new(pool: &'a PgPool, fee_bps: u32) -> Self {
        Self { pool, fee_bps }
    }

    /// Move an order to `next`, applying stock and ledger side effects.
    ///
    /// With `scope` set, orders outside that store are reported as not found.
    ///
    /// # Errors
    ///
    /// Returns `OrderError::NotFound` if the order is not visible and
    /// `OrderError::Transition` if the move is not allowed.
    #[instrument(skip(self), fields(order_id = %order_id, next = %next))]
    pub async fn change_status(
        &self,
        order_id: OrderId,
        next: OrderStatus,
        scope: Option<StoreId>,
    ) -> Result<Order, OrderError> {
        let mut tx = self.pool.begin().await?;

        let order = orders::lock(&mut tx, order_id)
            .await?
            .filter(|o| scope.is_none_or(|s| o.store_id == s))
            .ok_or(OrderError::NotFound)?;

        apply_transition(&mut tx, &order, next, self.fee_bps).await?;
        tx.commit().await?;

        info!(from = %order.status, "Order status changed");
        self.reload(order_id).await
    }

    /// Cancel one of the customer's own orders while it is still pending.
    ///
    /// # Errors
    ///
    /// Returns `OrderError::NotFound` for someone else's order and
    /// `OrderError::NotCancellable` once the order has been paid.
    #[instrument(skip(self), fields(user_id = %user_id, order_id = %order_id))]
    pub async fn cancel_for_customer(
        &self,
        user_id: UserId,
        order_id: OrderId,
    ) -> Result<Order, OrderError> {
        let mut tx = self.pool.begin().await?;

        let order = orders::lock(&mut tx, order_id)
            .await?
            .filter(|o| o.user_id == user_id)
            .ok_or(OrderError::NotFound)?;

        if order.status != OrderStatus::Pending {
            return Err(OrderError::NotCancellable);
        }

        apply_transition(&mut tx, &order, OrderStatus::Cancelled, self.fee_bps).await?;
        tx.commit().await?;

        info!("Order cancelled by customer");
        self.reload(order_id).await
    }

    /// Record a successful payment for the order with `reference`.
    ///
    /// # Errors
    ///
    /// Returns `OrderError::UnknownReference` if no order matches,
    /// `OrderError::AmountMismatch` if `amount` differs from the total and
    /// `OrderError::Transition` if the order was cancelled meanwhile.
    #[instrument(skip(self))]
    pub async fn mark_paid(
        &self,
        reference: &str,
        amount: Decimal,
    ) -> Result<PaymentOutcome, OrderError> {
        let mut tx = self.pool.begin().await?;
        let order = self.lock_by_reference(&mut tx, reference).await?;

        if order.status.is_revenue() {
            info!(order_id = %order.id, status = %order.status, "Payment already recorded");
            return Ok(PaymentOutcome::AlreadyProcessed(order));
        }
        if amount != order.total {
            return Err(OrderError::AmountMismatch {
                paid: amount,
                expected: order.total,
            });
        }

        apply_transition(&mut tx, &order, OrderStatus::Paid, self.fee_bps).await?;
        tx.commit().await?;

        info!(order_id = %order.id, total = %order.total, "Payment recorded");
        Ok(PaymentOutcome::Paid(self.reload(order.id).await?))
    }

    /// Record a failed payment: a pending order is cancelled.
    ///
    /// Orders that already moved on are left alone.
    ///
    /// # Errors
    ///
    /// Returns `OrderError::UnknownReference` if no order matches.
    #[instrument(skip(self))]
    pub async fn mark_failed(&self, reference: &str) -> Result<Order, OrderError> {
        let mut tx = self.pool.begin().await?;
        let order = self.lock_by_reference(&mut tx, reference).await?;

        if order.status != OrderStatus::Pending {
            warn!(order_id = %order.id, status = %order.status, "Ignoring payment failure");
            return Ok(order);
        }

        apply_transition(&mut tx, &order, OrderStatus::Cancelled, self.fee_bps).await?;
        tx.commit().await?;

        info!(order_id = %order.id, "Order cancelled after failed payment");
        self.reload(order.id).await
    }

    /// Create the delivery for a paid or processing order.
    ///
    /// A paid order moves to `processing`.
    ///
    /// # Errors
    ///
    /// Returns `OrderError::NotFound` if the order is not visible,
    /// `OrderError::DeliveryNotAllowed` for other statuses and
    /// `RepositoryError::Conflict` if the order already has a delivery.
    #[instrument(skip(self, delivery), fields(order_id = %order_id))]
    pub async fn create_delivery(
        &self,
        scope: Option<StoreId>,
        order_id: OrderId,
        delivery: &NewDelivery,
    ) -> Result<Delivery, OrderError> {
        let carrier = delivery.carrier.trim();
        if carrier.is_empty() {
            return Err(OrderError::MissingCarrier);
        }
        let tracking = delivery
            .tracking_number
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty());

        let mut tx = self.pool.begin().await?;

        let order = orders::lock(&mut tx, order_id)
            .await?
            .filter(|o| scope.is_none_or(|s| o.store_id == s))
            .ok_or(OrderError::NotFound)?;

        if !matches!(order.status, OrderStatus::Paid | OrderStatus::Processing) {
            return Err(OrderError::DeliveryNotAllowed(order.status));
        }

        let created = deliveries::insert(
            &mut tx,
            order.id,
            order.store_id,
            carrier,
            tracking,
            delivery.estimated_at,
        )
        .await?;

        if order.status == OrderStatus::Paid {
            apply_transition(&mut tx, &order, OrderStatus::Processing, self.fee_bps).await?;
        }

        tx.commit().await?;

        info!(delivery_id = %created.id, carrier, "Delivery created");
        Ok(created)
    }

    /// Update a delivery and carry its progress over to the order.
    ///
    /// `in_transit`/`out_for_delivery` ship the order and `delivered`
    /// completes it and stamps `delivered_at`.
    ///
    /// # Errors
    ///
    /// Returns `OrderError::NotFound` if the delivery is not visible and
    /// `OrderError::Transition` if either the delivery or the order cannot
    /// make the move.
    #[instrument(skip(self, update), fields(delivery_id = %delivery_id))]
    pub async fn update_delivery(
        &self,
        scope: Option<StoreId>,
        delivery_id: DeliveryId,
        mut update: DeliveryUpdate,
        now: DateTime<Utc>,
    ) -> Result<Delivery, OrderError> {
        if update.carrier.as_deref().is_some_and(|c| c.trim().is_empty()) {
            return Err(OrderError::MissingCarrier);
        }

        let mut tx = self.pool.begin().await?;

        let current = deliveries::lock(&mut tx, delivery_id)
            .await?
            .filter(|d| scope.is_none_or(|s| d.store_id == s))
            .ok_or(OrderError::NotFound)?;

        let next = update.status.filter(|s| *s != current.status);
        if let Some(next) = next {
            current.status.transition_to(next)?;
            if next == DeliveryStatus::Delivered {
                update.delivered_at = Some(now);
            }
        } else {
            update.status = None;
        }

        let updated = deliveries::update(&mut tx, delivery_id, &update).await?;

        if let Some(implied) = next.and_then(DeliveryStatus::implied_order_status) {
            let order = orders::lock(&mut tx, current.order_id)
                .await?
                .ok_or(OrderError::NotFound)?;
            if order.status != implied {
                apply_transition(&mut tx, &order, implied, self.fee_bps).await?;
            }
        }

        tx.commit().await?;

        info!(status = %updated.status, "Delivery updated");
        Ok(updated)
    }

    async fn lock_by_reference(
        &self,
        conn: &mut PgConnection,
        reference: &str,
    ) -> Result<Order, OrderError> {
        let found = OrderRepository::new(self.pool)
            .find_by_payment_reference(reference)
            .await?
            .ok_or(OrderError::UnknownReference)?;
        orders::lock(conn, found.id)
            .await?
            .ok_or(OrderError::UnknownReference)
    }

    async fn reload(&self, order_id: OrderId) -> Result<Order, OrderError> {
        OrderRepository::new(self.pool)
            .get(order_id)
            .await?
            .ok_or(OrderError::NotFound)
    }
}

/// Ledger entries recorded when an order moves from `from` to `to`.
fn ledger_entries(order: &Order, to: OrderStatus, fee_bps: u32) -> Vec<NewTransaction> {
    let from = order.status;
    match to {
        OrderStatus::Paid => {
            let mut entries = vec![NewTransaction::sale(order.store_id, order.id, order.total)];
            let fee = platform_fee(order.total, fee_bps);
            if !fee.is_zero() {
                entries.push(NewTransaction::fee(order.store_id, order.id, fee));
            }
            entries
        }
        OrderStatus::Refunded => vec![NewTransaction::refund(order.store_id, order.id, order.total)],
        OrderStatus::Cancelled if from.is_revenue() => {
            vec![NewTransaction::refund(order.store_id, order.id, order.total)]
        }
        _ => Vec::new(),
    }
}

/// Whether moving to `to` puts the order's stock back on the shelf.
const fn restores_stock(from: OrderStatus, to: OrderStatus) -> bool {
    from.holds_stock() && matches!(to, OrderStatus::Cancelled | OrderStatus::Refunded)
}

/// Validate and apply a status change on a locked order.
async fn apply_transition(
    conn: &mut PgConnection,
    order: &Order,
    next: OrderStatus,
    fee_bps: u32,
) -> Result<(), OrderError> {
    order.status.transition_to(next)?;

    if restores_stock(order.status, next) {
        for item in orders::fetch_items(&mut *conn, order.id).await? {
            if let Some(product_id) = item.product_id {
                products::restore_stock(conn, product_id, item.quantity).await?;
            }
        }
    }

    for entry in ledger_entries(order, next, fee_bps) {
        transactions::insert(conn, &entry).await?;
    }

    orders::set_status(conn, order.id, next).await?;
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use bazaar_core::{CurrencyCode, Email, TransactionKind};

    use super::*;
    use crate::models::order::ShippingAddress;

    fn order(status: OrderStatus) -> Order {
        Order {
            id: OrderId::new(9),
            store_id: StoreId::new(2),
            store_name: "Clay Works".to_string(),
            currency: CurrencyCode::USD,
            user_id: UserId::new(3),
            customer_email: Email::parse("ada@example.com").unwrap(),
            customer_name: "Ada".to_string(),
            status,
            subtotal: Decimal::new(10_000, 2),
            discount: Decimal::ZERO,
            shipping: Decimal::ZERO,
            total: Decimal::new(10_000, 2),
            promotion_code: None,
            shipping_address: ShippingAddress {
                name: "Ada".to_string(),
                line1: "1 Way".to_string(),
                line2: None,
                city: "London".to_string(),
                postal_code: "N1".to_string(),
                country: "GB".to_string(),
            },
            phone: "123".to_string(),
            note: None,
            payment_reference: "pay_x".to_string(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn kinds(entries: &[NewTransaction]) -> Vec<(TransactionKind, Decimal)> {
        entries.iter().map(|e| (e.kind, e.amount)).collect()
    }

    #[test]
    fn test_payment_records_sale_and_fee() {
        let entries = ledger_entries(&order(OrderStatus::Pending), OrderStatus::Paid, 500);
        assert_eq!(
            kinds(&entries),
            vec![
                (TransactionKind::Sale, Decimal::new(10_000, 2)),
                (TransactionKind::Fee, Decimal::new(-500, 2)),
            ]
        );

        let no_fee = ledger_entries(&order(OrderStatus::Pending), OrderStatus::Paid, 0);
        assert_eq!(no_fee.len(), 1);
    }

    #[test]
    fn test_refund_and_cancellation_entries() {
        let refund = ledger_entries(&order(OrderStatus::Delivered), OrderStatus::Refunded, 500);
        assert_eq!(
            kinds(&refund),
            vec![(TransactionKind::Refund, Decimal::new(-10_000, 2))]
        );

        let paid_cancel = ledger_entries(&order(OrderStatus::Paid), OrderStatus::Cancelled, 500);
        assert_eq!(paid_cancel.len(), 1);

        let pending_cancel =
            ledger_entries(&order(OrderStatus::Pending), OrderStatus::Cancelled, 500);
        assert!(pending_cancel.is_empty());

        assert!(ledger_entries(&order(OrderStatus::Paid), OrderStatus::Processing, 500).is_empty());
    }

    #[test]
    fn test_stock_restored_only_before_shipping() {
        assert!(restores_stock(OrderStatus::Pending, OrderStatus::Cancelled));
        assert!(restores_stock(OrderStatus::Processing, OrderStatus::Refunded));
        assert!(!restores_stock(OrderStatus::Shipped, OrderStatus::Refunded));
        assert!(!restores_stock(OrderStatus::Paid, OrderStatus::Processing));
    }
}
