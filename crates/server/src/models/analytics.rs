//! Dashboard analytics types and month bucketing.

use chrono::{Datelike, Months, NaiveDate};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use bazaar_core::{DeliveryStatus, OrderStatus, ProductId, round_cents};

/// `?months=` query parameter.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct AnalyticsQuery {
    months: Option<u32>,
}

impl AnalyticsQuery {
    pub const DEFAULT_MONTHS: u32 = 12;
    pub const MAX_MONTHS: u32 = 24;

    #[must_use]
    pub const fn new(months: u32) -> Self {
        Self {
            months: Some(months),
        }
    }

    /// Requested window, clamped to `1..=MAX_MONTHS`.
    #[must_use]
    pub fn months(&self) -> u32 {
        self.months
            .unwrap_or(Self::DEFAULT_MONTHS)
            .clamp(1, Self::MAX_MONTHS)
    }
}

/// Revenue and order count for one calendar month.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MonthlyPoint {
    /// First day of the month.
    pub month: NaiveDate,
    pub revenue: Decimal,
    pub orders: i64,
}

/// Best-selling product by units.
#[derive(Debug, Clone, Serialize)]
pub struct TopProduct {
    pub product_id: Option<ProductId>,
    pub name: String,
    pub units: i64,
    pub revenue: Decimal,
}

/// Seller dashboard analytics.
#[derive(Debug, Clone, Serialize)]
pub struct StoreAnalytics {
    /// Revenue from orders that are paid or further along, net of refunds.
    pub total_revenue: Decimal,
    pub sales_count: i64,
    pub products_in_stock: i64,
    pub average_order_value: Decimal,
    pub monthly: Vec<MonthlyPoint>,
    pub top_products: Vec<TopProduct>,
}

/// Count of entities in one status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StatusCount<S> {
    pub status: S,
    pub count: i64,
}

/// Platform-wide KPIs for the admin dashboard.
#[derive(Debug, Clone, Serialize)]
pub struct PlatformKpis {
    pub active_stores: i64,
    pub total_stores: i64,
    pub users: i64,
    pub orders: i64,
    pub gross_revenue: Decimal,
    pub revenue_last_30_days: Decimal,
    pub new_customers_last_30_days: i64,
    pub orders_by_status: Vec<StatusCount<OrderStatus>>,
    pub deliveries_by_status: Vec<StatusCount<DeliveryStatus>>,
}

/// Platform analytics series.
#[derive(Debug, Clone, Serialize)]
pub struct PlatformAnalytics {
    pub monthly: Vec<MonthlyPoint>,
}

/// First day of the earliest month in a window of `months` ending with the
/// month containing `today`.
#[must_use]
pub fn window_start(today: NaiveDate, months: u32) -> NaiveDate {
    let current = today.with_day(1).unwrap_or(today);
    current
        .checked_sub_months(Months::new(months.saturating_sub(1)))
        .unwrap_or(current)
}

/// Expand sparse monthly rows into a contiguous series starting at `start`,
/// with zeroes for months that had no orders.
#[must_use]
pub fn fill_months(start: NaiveDate, months: u32, rows: &[MonthlyPoint]) -> Vec<MonthlyPoint> {
    (0..months)
        .filter_map(|offset| start.checked_add_months(Months::new(offset)))
        .map(|month| {
            rows.iter()
                .find(|row| row.month == month)
                .copied()
                .unwrap_or(MonthlyPoint {
                    month,
                    revenue: Decimal::ZERO,
                    orders: 0,
                })
        })
        .collect()
}

/// Average order value, zero when there are no orders.
#[must_use]
pub fn average_order_value(revenue: Decimal, orders: i64) -> Decimal {
    if orders <= 0 {
        return Decimal::ZERO;
    }
    round_cents(revenue / Decimal::from(orders))
}

/// Zero-filled counts for every status in `all`, in that order.
#[must_use]
pub fn count_by_status<S: Copy + PartialEq>(all: &[S], rows: &[(S, i64)]) -> Vec<StatusCount<S>> {
    all.iter()
        .map(|&status| StatusCount {
            status,
            count: rows
                .iter()
                .find(|(s, _)| *s == status)
                .map_or(0, |(_, count)| *count),
        })
        .collect()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_window_start_crosses_year() {
        assert_eq!(window_start(date(2026, 2, 17), 3), date(2025, 12, 1));
        assert_eq!(window_start(date(2026, 2, 17), 1), date(2026, 2, 1));
    }

    #[test]
    fn test_fill_months_zero_fills() {
        let rows = vec![MonthlyPoint {
            month: date(2026, 1, 1),
            revenue: Decimal::new(4200, 2),
            orders: 3,
        }];
        let series = fill_months(date(2025, 12, 1), 3, &rows);
        assert_eq!(series.len(), 3);
        assert_eq!(series[0].orders, 0);
        assert_eq!(series[1].revenue, Decimal::new(4200, 2));
        assert_eq!(series[2].month, date(2026, 2, 1));
    }

    #[test]
    fn test_average_order_value() {
        assert_eq!(average_order_value(Decimal::new(100, 0), 3), Decimal::new(3333, 2));
        assert_eq!(average_order_value(Decimal::new(100, 0), 0), Decimal::ZERO);
    }

    #[test]
    fn test_months_clamped() {
        assert_eq!(AnalyticsQuery::default().months(), 12);
        assert_eq!(AnalyticsQuery::new(0).months(), 1);
        assert_eq!(AnalyticsQuery::new(60).months(), 24);
    }

    #[test]
    fn test_count_by_status() {
        let counts = count_by_status(&OrderStatus::ALL, &[(OrderStatus::Paid, 4)]);
        assert_eq!(counts.len(), OrderStatus::ALL.len());
        assert_eq!(counts[1], StatusCount { status: OrderStatus::Paid, count: 4 });
        assert_eq!(counts[0].count, 0);
    }
}
