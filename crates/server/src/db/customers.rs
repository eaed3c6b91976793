//! Customer view: users aggregated over their orders with a store.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{PgPool, Postgres, QueryBuilder};

use bazaar_core::{Email, Page, PageRequest, StoreId, UserId};

use super::{RepositoryError, like_pattern};
use crate::models::customer::{Customer, CustomerFilter};

#[derive(sqlx::FromRow)]
struct CustomerRow {
    user_id: i32,
    email: String,
    name: String,
    order_count: i64,
    total_spent: Decimal,
    last_order_at: DateTime<Utc>,
}

impl TryFrom<CustomerRow> for Customer {
    type Error = RepositoryError;

    fn try_from(row: CustomerRow) -> Result<Self, Self::Error> {
        let email = Email::parse(&row.email)
            .map_err(|e| RepositoryError::DataCorruption(format!("invalid customer email: {e}")))?;
        Ok(Self {
            user_id: UserId::new(row.user_id),
            email,
            name: row.name,
            order_count: row.order_count,
            total_spent: row.total_spent,
            last_order_at: row.last_order_at,
        })
    }
}

fn push_filters(qb: &mut QueryBuilder<'_, Postgres>, store_id: StoreId, filter: &CustomerFilter) {
    qb.push(" WHERE o.store_id = ").push_bind(store_id);
    if let Some(q) = filter.q.as_deref().map(str::trim).filter(|q| !q.is_empty()) {
        let pattern = like_pattern(q);
        qb.push(" AND (u.email ILIKE ")
            .push_bind(pattern.clone())
            .push(" OR u.name ILIKE ")
            .push_bind(pattern)
            .push(")");
    }
}

/// Repository for the derived customer view.
pub struct CustomerRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> CustomerRepository<'a> {
    /// Create a new customer repository.
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// List a store's customers, most recent order first.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn list(
        &self,
        store_id: StoreId,
        filter: &CustomerFilter,
        page: PageRequest,
    ) -> Result<Page<Customer>, RepositoryError> {
        let mut count = QueryBuilder::<Postgres>::new(
            "SELECT COUNT(DISTINCT o.user_id) FROM bazaar.order o \
             JOIN bazaar.user u ON u.id = o.user_id",
        );
        push_filters(&mut count, store_id, filter);
        let total: i64 = count.build_query_scalar().fetch_one(self.pool).await?;

        let mut select = QueryBuilder::<Postgres>::new(
            r"
            SELECT u.id AS user_id, u.email, u.name,
                   COUNT(o.id) AS order_count,
                   COALESCE(SUM(o.total) FILTER (
                       WHERE o.status IN ('paid', 'processing', 'shipped', 'delivered')
                   ), 0) AS total_spent,
                   MAX(o.created_at) AS last_order_at
            FROM bazaar.order o
            JOIN bazaar.user u ON u.id = o.user_id
            ",
        );
        push_filters(&mut select, store_id, filter);
        select
            .push(" GROUP BY u.id, u.email, u.name ORDER BY last_order_at DESC, u.id LIMIT ")
            .push_bind(page.limit())
            .push(" OFFSET ")
            .push_bind(page.offset());
        let rows = select
            .build_query_as::<CustomerRow>()
            .fetch_all(self.pool)
            .await?;

        let customers = rows
            .into_iter()
            .map(Customer::try_from)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Page::new(customers, page, total))
    }
}
