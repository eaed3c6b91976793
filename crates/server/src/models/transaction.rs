//! Store ledger types.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use bazaar_core::{OrderId, StoreId, TransactionId, TransactionKind};

/// A ledger entry. Sales are positive; refunds, fees and payouts negative.
#[derive(Debug, Clone, Serialize)]
pub struct Transaction {
    pub id: TransactionId,
    pub store_id: StoreId,
    pub order_id: Option<OrderId>,
    pub kind: TransactionKind,
    pub amount: Decimal,
    pub description: String,
    pub created_at: DateTime<Utc>,
}

/// Ledger listing filters from the query string.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct TransactionFilter {
    pub kind: Option<TransactionKind>,
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
}

/// Ledger totals for a store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LedgerSummary {
    pub gross_sales: Decimal,
    pub refunds: Decimal,
    pub fees: Decimal,
    pub payouts: Decimal,
    /// Sum of every entry: what the store can still be paid out.
    pub balance: Decimal,
}

/// A ledger entry about to be written.
#[derive(Debug, Clone)]
pub struct NewTransaction {
    pub store_id: StoreId,
    pub order_id: Option<OrderId>,
    pub kind: TransactionKind,
    pub amount: Decimal,
    pub description: String,
}

impl NewTransaction {
    /// A sale of `total` for an order.
    #[must_use]
    pub fn sale(store_id: StoreId, order_id: OrderId, total: Decimal) -> Self {
        Self {
            store_id,
            order_id: Some(order_id),
            kind: TransactionKind::Sale,
            amount: total,
            description: format!("Sale for order #{order_id}"),
        }
    }

    /// A refund of `total` for an order (recorded as a negative amount).
    #[must_use]
    pub fn refund(store_id: StoreId, order_id: OrderId, total: Decimal) -> Self {
        Self {
            store_id,
            order_id: Some(order_id),
            kind: TransactionKind::Refund,
            amount: -total,
            description: format!("Refund for order #{order_id}"),
        }
    }

    /// The platform fee on an order (recorded as a negative amount).
    #[must_use]
    pub fn fee(store_id: StoreId, order_id: OrderId, fee: Decimal) -> Self {
        Self {
            store_id,
            order_id: Some(order_id),
            kind: TransactionKind::Fee,
            amount: -fee,
            description: format!("Platform fee for order #{order_id}"),
        }
    }

    /// A payout to the seller (recorded as a negative amount).
    #[must_use]
    pub fn payout(store_id: StoreId, amount: Decimal) -> Self {
        Self {
            store_id,
            order_id: None,
            kind: TransactionKind::Payout,
            amount: -amount,
            description: "Payout to seller".to_string(),
        }
    }
}

/// Platform fee on a total, rounded to cents.
#[must_use]
pub fn platform_fee(total: Decimal, fee_bps: u32) -> Decimal {
    bazaar_core::round_cents(total * Decimal::from(fee_bps) / Decimal::from(10_000))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_platform_fee() {
        assert_eq!(platform_fee(Decimal::new(10_000, 2), 500), Decimal::new(500, 2));
        // 2.5% of 19.99 = 0.49975
        assert_eq!(platform_fee(Decimal::new(1999, 2), 250), Decimal::new(50, 2));
        assert_eq!(platform_fee(Decimal::new(1999, 2), 0), Decimal::ZERO);
    }

    #[test]
    fn test_signed_amounts() {
        let store = StoreId::new(1);
        let order = OrderId::new(7);
        let total = Decimal::new(4200, 2);
        assert_eq!(NewTransaction::sale(store, order, total).amount, total);
        assert_eq!(NewTransaction::refund(store, order, total).amount, -total);
        assert_eq!(NewTransaction::payout(store, total).amount, -total);
        assert_eq!(
            NewTransaction::fee(store, order, Decimal::ONE).description,
            "Platform fee for order #7"
        );
    }
}
