//! Store customers, derived from order history.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use bazaar_core::{Email, UserId};

/// A user who has ordered from a store at least once.
#[derive(Debug, Clone, Serialize)]
pub struct Customer {
    pub user_id: UserId,
    pub email: Email,
    pub name: String,
    /// Orders placed with the store, in any status.
    pub order_count: i64,
    /// Sum of totals of orders that were paid and not refunded or cancelled.
    pub total_spent: Decimal,
    pub last_order_at: DateTime<Utc>,
}

/// Customer listing filters from the query string.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CustomerFilter {
    /// Substring of the customer's email or name.
    pub q: Option<String>,
}
