//! Aggregate queries for seller and platform dashboards.

use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use sqlx::PgPool;

use bazaar_core::{DeliveryStatus, OrderStatus, ProductId, StoreId};

use super::RepositoryError;
use crate::models::analytics::{
    MonthlyPoint, PlatformAnalytics, PlatformKpis, StoreAnalytics, TopProduct,
    average_order_value, count_by_status, fill_months, window_start,
};

/// Order statuses that count as revenue, as a SQL list.
const REVENUE_STATUSES: &str = "('paid', 'processing', 'shipped', 'delivered')";

const TOP_PRODUCTS: i64 = 5;

#[derive(sqlx::FromRow)]
struct TotalsRow {
    revenue: Decimal,
    orders: i64,
}

#[derive(sqlx::FromRow)]
struct MonthlyRow {
    month: NaiveDate,
    revenue: Decimal,
    orders: i64,
}

impl From<MonthlyRow> for MonthlyPoint {
    fn from(row: MonthlyRow) -> Self {
        Self {
            month: row.month,
            revenue: row.revenue,
            orders: row.orders,
        }
    }
}

#[derive(sqlx::FromRow)]
struct TopProductRow {
    product_id: Option<i32>,
    name: String,
    units: i64,
    revenue: Decimal,
}

#[derive(sqlx::FromRow)]
struct KpiRow {
    active_stores: i64,
    total_stores: i64,
    users: i64,
    orders: i64,
    gross_revenue: Decimal,
    revenue_last_30_days: Decimal,
    new_customers_last_30_days: i64,
}

/// Repository for dashboard aggregates.
pub struct AnalyticsRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> AnalyticsRepository<'a> {
    /// Create a new analytics repository.
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Seller dashboard figures over the last `months` calendar months.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if a query fails.
    pub async fn store(
        &self,
        store_id: StoreId,
        months: u32,
    ) -> Result<StoreAnalytics, RepositoryError> {
        let totals = sqlx::query_as::<_, TotalsRow>(&format!(
            r"
            SELECT COALESCE(SUM(total), 0) AS revenue, COUNT(*) AS orders
            FROM bazaar.order
            WHERE store_id = $1 AND status IN {REVENUE_STATUSES}
            "
        ))
        .bind(store_id)
        .fetch_one(self.pool)
        .await?;

        let products_in_stock: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM bazaar.product WHERE store_id = $1 AND stock > 0 AND NOT archived",
        )
        .bind(store_id)
        .fetch_one(self.pool)
        .await?;

        let start = window_start(Utc::now().date_naive(), months);
        let monthly = self.monthly(Some(store_id), start).await?;

        let top_products = sqlx::query_as::<_, TopProductRow>(&format!(
            r"
            SELECT oi.product_id, oi.product_name AS name,
                   SUM(oi.quantity)::int8 AS units,
                   SUM(oi.unit_price * oi.quantity) AS revenue
            FROM bazaar.order_item oi
            JOIN bazaar.order o ON o.id = oi.order_id
            WHERE o.store_id = $1 AND o.status IN {REVENUE_STATUSES}
            GROUP BY oi.product_id, oi.product_name
            ORDER BY units DESC, revenue DESC
            LIMIT $2
            "
        ))
        .bind(store_id)
        .bind(TOP_PRODUCTS)
        .fetch_all(self.pool)
        .await?
        .into_iter()
        .map(|row| TopProduct {
            product_id: row.product_id.map(ProductId::new),
            name: row.name,
            units: row.units,
            revenue: row.revenue,
        })
        .collect();

        Ok(StoreAnalytics {
            total_revenue: totals.revenue,
            sales_count: totals.orders,
            products_in_stock,
            average_order_value: average_order_value(totals.revenue, totals.orders),
            monthly: fill_months(start, months, &monthly),
            top_products,
        })
    }

    /// Platform-wide KPIs.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if a query fails.
    pub async fn platform_kpis(&self) -> Result<PlatformKpis, RepositoryError> {
        let kpis = sqlx::query_as::<_, KpiRow>(&format!(
            r"
            SELECT
                (SELECT COUNT(*) FROM bazaar.store WHERE active) AS active_stores,
                (SELECT COUNT(*) FROM bazaar.store) AS total_stores,
                (SELECT COUNT(*) FROM bazaar.user) AS users,
                (SELECT COUNT(*) FROM bazaar.order) AS orders,
                (SELECT COALESCE(SUM(total), 0) FROM bazaar.order
                 WHERE status IN {REVENUE_STATUSES}) AS gross_revenue,
                (SELECT COALESCE(SUM(total), 0) FROM bazaar.order
                 WHERE status IN {REVENUE_STATUSES}
                   AND created_at >= NOW() - INTERVAL '30 days') AS revenue_last_30_days,
                (SELECT COUNT(*) FROM bazaar.user
                 WHERE role = 'customer'
                   AND created_at >= NOW() - INTERVAL '30 days') AS new_customers_last_30_days
            "
        ))
        .fetch_one(self.pool)
        .await?;

        let orders: Vec<(OrderStatus, i64)> =
            sqlx::query_as("SELECT status, COUNT(*) FROM bazaar.order GROUP BY status")
                .fetch_all(self.pool)
                .await?;
        let deliveries: Vec<(DeliveryStatus, i64)> =
            sqlx::query_as("SELECT status, COUNT(*) FROM bazaar.delivery GROUP BY status")
                .fetch_all(self.pool)
                .await?;

        Ok(PlatformKpis {
            active_stores: kpis.active_stores,
            total_stores: kpis.total_stores,
            users: kpis.users,
            orders: kpis.orders,
            gross_revenue: kpis.gross_revenue,
            revenue_last_30_days: kpis.revenue_last_30_days,
            new_customers_last_30_days: kpis.new_customers_last_30_days,
            orders_by_status: count_by_status(&OrderStatus::ALL, &orders),
            deliveries_by_status: count_by_status(&DeliveryStatus::ALL, &deliveries),
        })
    }

    /// Platform revenue and order counts per month.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn platform(&self, months: u32) -> Result<PlatformAnalytics, RepositoryError> {
        let start = window_start(Utc::now().date_naive(), months);
        let monthly = self.monthly(None, start).await?;
        Ok(PlatformAnalytics {
            monthly: fill_months(start, months, &monthly),
        })
    }

    /// Sparse monthly revenue since `start`, for one store or all of them.
    async fn monthly(
        &self,
        store_id: Option<StoreId>,
        start: NaiveDate,
    ) -> Result<Vec<MonthlyPoint>, RepositoryError> {
        let rows = sqlx::query_as::<_, MonthlyRow>(&format!(
            r"
            SELECT date_trunc('month', created_at)::date AS month,
                   COALESCE(SUM(total), 0) AS revenue,
                   COUNT(*) AS orders
            FROM bazaar.order
            WHERE ($1::int4 IS NULL OR store_id = $1)
              AND status IN {REVENUE_STATUSES}
              AND created_at >= $2::date
            GROUP BY 1
            ORDER BY 1
            "
        ))
        .bind(store_id)
        .bind(start)
        .fetch_all(self.pool)
        .await?;
        Ok(rows.into_iter().map(MonthlyPoint::from).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_revenue_statuses_match_domain_rule() {
        for status in OrderStatus::ALL {
            let quoted = format!("'{}'", status.as_str());
            assert_eq!(
                REVENUE_STATUSES.contains(&quoted),
                status.is_revenue(),
                "{status:?}"
            );
        }
    }
}
