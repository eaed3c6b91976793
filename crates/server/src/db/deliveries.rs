//! Delivery repository.

use chrono::{DateTime, Utc};
use sqlx::{PgConnection, PgPool, Postgres, QueryBuilder};

use bazaar_core::{DeliveryId, DeliveryStatus, OrderId, Page, PageRequest, StoreId};

use super::RepositoryError;
use crate::models::delivery::{Delivery, DeliveryFilter, DeliveryUpdate};

const DELIVERY_COLUMNS: &str = "d.id, d.order_id, d.store_id, d.status, d.carrier, \
                                d.tracking_number, d.estimated_at, d.delivered_at, \
                                d.created_at, d.updated_at";

#[derive(sqlx::FromRow)]
struct DeliveryRow {
    id: i32,
    order_id: i32,
    store_id: i32,
    status: DeliveryStatus,
    carrier: String,
    tracking_number: Option<String>,
    estimated_at: Option<DateTime<Utc>>,
    delivered_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<DeliveryRow> for Delivery {
    fn from(row: DeliveryRow) -> Self {
        Self {
            id: DeliveryId::new(row.id),
            order_id: OrderId::new(row.order_id),
            store_id: StoreId::new(row.store_id),
            status: row.status,
            carrier: row.carrier,
            tracking_number: row.tracking_number,
            estimated_at: row.estimated_at,
            delivered_at: row.delivered_at,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

fn push_filters(
    qb: &mut QueryBuilder<'_, Postgres>,
    store_id: Option<StoreId>,
    filter: DeliveryFilter,
) {
    qb.push(" WHERE TRUE");
    if let Some(store_id) = store_id {
        qb.push(" AND d.store_id = ").push_bind(store_id);
    }
    if let Some(status) = filter.status {
        qb.push(" AND d.status = ").push_bind(status);
    }
}

/// Repository for delivery database operations.
pub struct DeliveryRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> DeliveryRepository<'a> {
    /// Create a new delivery repository.
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// List deliveries, most recently updated first. `store_id` of `None`
    /// lists across the platform.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn list(
        &self,
        store_id: Option<StoreId>,
        filter: DeliveryFilter,
        page: PageRequest,
    ) -> Result<Page<Delivery>, RepositoryError> {
        let mut count = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM bazaar.delivery d");
        push_filters(&mut count, store_id, filter);
        let total: i64 = count.build_query_scalar().fetch_one(self.pool).await?;

        let mut select = QueryBuilder::<Postgres>::new(format!(
            "SELECT {DELIVERY_COLUMNS} FROM bazaar.delivery d"
        ));
        push_filters(&mut select, store_id, filter);
        select
            .push(" ORDER BY d.updated_at DESC, d.id DESC LIMIT ")
            .push_bind(page.limit())
            .push(" OFFSET ")
            .push_bind(page.offset());
        let rows = select
            .build_query_as::<DeliveryRow>()
            .fetch_all(self.pool)
            .await?;

        Ok(Page::new(
            rows.into_iter().map(Delivery::from).collect(),
            page,
            total,
        ))
    }

    /// Get a delivery by ID.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get(&self, id: DeliveryId) -> Result<Option<Delivery>, RepositoryError> {
        let sql = format!("SELECT {DELIVERY_COLUMNS} FROM bazaar.delivery d WHERE d.id = $1");
        let row = sqlx::query_as::<_, DeliveryRow>(&sql)
            .bind(id)
            .fetch_optional(self.pool)
            .await?;
        Ok(row.map(Delivery::from))
    }

    /// The delivery of an order, if one was created.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn for_order(&self, order_id: OrderId) -> Result<Option<Delivery>, RepositoryError> {
        let sql =
            format!("SELECT {DELIVERY_COLUMNS} FROM bazaar.delivery d WHERE d.order_id = $1");
        let row = sqlx::query_as::<_, DeliveryRow>(&sql)
            .bind(order_id)
            .fetch_optional(self.pool)
            .await?;
        Ok(row.map(Delivery::from))
    }
}

/// Create the delivery of an order in `pending` state.
///
/// # Errors
///
/// Returns `RepositoryError::Conflict` if the order already has a delivery.
pub async fn insert(
    conn: &mut PgConnection,
    order_id: OrderId,
    store_id: StoreId,
    carrier: &str,
    tracking_number: Option<&str>,
    estimated_at: Option<DateTime<Utc>>,
) -> Result<Delivery, RepositoryError> {
    let sql = format!(
        r"
        INSERT INTO bazaar.delivery AS d
            (order_id, store_id, status, carrier, tracking_number, estimated_at)
        VALUES ($1, $2, 'pending', $3, $4, $5)
        RETURNING {DELIVERY_COLUMNS}
        "
    );
    let row = sqlx::query_as::<_, DeliveryRow>(&sql)
        .bind(order_id)
        .bind(store_id)
        .bind(carrier)
        .bind(tracking_number)
        .bind(estimated_at)
        .fetch_one(&mut *conn)
        .await
        .map_err(|e| RepositoryError::from_write(e, "order already has a delivery"))?;
    Ok(Delivery::from(row))
}

/// Load a delivery and lock its row until the transaction ends.
///
/// # Errors
///
/// Returns `RepositoryError::Database` if the query fails.
pub async fn lock(
    conn: &mut PgConnection,
    id: DeliveryId,
) -> Result<Option<Delivery>, RepositoryError> {
    let sql = format!("SELECT {DELIVERY_COLUMNS} FROM bazaar.delivery d WHERE d.id = $1 FOR UPDATE");
    let row = sqlx::query_as::<_, DeliveryRow>(&sql)
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?;
    Ok(row.map(Delivery::from))
}

/// Apply a partial update. Callers check status transitions first.
///
/// # Errors
///
/// Returns `RepositoryError::NotFound` if the delivery does not exist.
pub async fn update(
    conn: &mut PgConnection,
    id: DeliveryId,
    update: &DeliveryUpdate,
) -> Result<Delivery, RepositoryError> {
    let sql = format!(
        r"
        UPDATE bazaar.delivery AS d SET
            status = COALESCE($2, d.status),
            carrier = COALESCE($3, d.carrier),
            tracking_number = CASE WHEN $4 THEN $5 ELSE d.tracking_number END,
            estimated_at = CASE WHEN $6 THEN $7 ELSE d.estimated_at END,
            delivered_at = COALESCE($8, d.delivered_at),
            updated_at = NOW()
        WHERE d.id = $1
        RETURNING {DELIVERY_COLUMNS}
        "
    );
    let row = sqlx::query_as::<_, DeliveryRow>(&sql)
        .bind(id)
        .bind(update.status)
        .bind(update.carrier.as_deref())
        .bind(update.tracking_number.is_some())
        .bind(update.tracking_number.clone().flatten())
        .bind(update.estimated_at.is_some())
        .bind(update.estimated_at.flatten())
        .bind(update.delivered_at)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or(RepositoryError::NotFound)?;
    Ok(Delivery::from(row))
}
