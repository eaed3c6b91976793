//! Order repository.
//!
//! Read paths go through [`OrderRepository`]. Checkout and status changes
//! run inside a caller-owned transaction and use the free functions at the
//! bottom of this module.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{Executor, PgConnection, PgPool, Postgres, QueryBuilder};

use bazaar_core::{
    CurrencyCode, Email, OrderId, OrderItemId, OrderStatus, Page, PageRequest, ProductId, StoreId,
    UserId,
};

use super::{DeliveryRepository, RepositoryError, like_pattern};
use crate::models::order::{
    NewOrder, NewOrderItem, Order, OrderDetail, OrderFilter, OrderItem, ShippingAddress,
};

/// Most orders a single export returns.
pub const EXPORT_LIMIT: i64 = 10_000;

const ORDER_SELECT: &str = r"
    SELECT o.id, o.store_id, s.name AS store_name, s.currency, o.user_id,
           u.email AS customer_email, u.name AS customer_name, o.status,
           o.subtotal, o.discount, o.shipping, o.total, o.promotion_code,
           o.ship_name, o.ship_line1, o.ship_line2, o.ship_city,
           o.ship_postal_code, o.ship_country, o.phone, o.note,
           o.payment_reference, o.created_at, o.updated_at
    FROM bazaar.order o
    JOIN bazaar.store s ON s.id = o.store_id
    JOIN bazaar.user u ON u.id = o.user_id
";

const ORDER_COUNT: &str = r"
    SELECT COUNT(*)
    FROM bazaar.order o
    JOIN bazaar.user u ON u.id = o.user_id
";

#[derive(sqlx::FromRow)]
struct OrderRow {
    id: i32,
    store_id: i32,
    store_name: String,
    currency: String,
    user_id: i32,
    customer_email: String,
    customer_name: String,
    status: OrderStatus,
    subtotal: Decimal,
    discount: Decimal,
    shipping: Decimal,
    total: Decimal,
    promotion_code: Option<String>,
    ship_name: String,
    ship_line1: String,
    ship_line2: Option<String>,
    ship_city: String,
    ship_postal_code: String,
    ship_country: String,
    phone: String,
    note: Option<String>,
    payment_reference: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<OrderRow> for Order {
    type Error = RepositoryError;

    fn try_from(row: OrderRow) -> Result<Self, Self::Error> {
        let customer_email = Email::parse(&row.customer_email).map_err(|e| {
            RepositoryError::DataCorruption(format!("invalid customer email: {e}"))
        })?;
        let currency = row
            .currency
            .parse::<CurrencyCode>()
            .map_err(|e| RepositoryError::DataCorruption(e.to_string()))?;

        Ok(Self {
            id: OrderId::new(row.id),
            store_id: StoreId::new(row.store_id),
            store_name: row.store_name,
            currency,
            user_id: UserId::new(row.user_id),
            customer_email,
            customer_name: row.customer_name,
            status: row.status,
            subtotal: row.subtotal,
            discount: row.discount,
            shipping: row.shipping,
            total: row.total,
            promotion_code: row.promotion_code,
            shipping_address: ShippingAddress {
                name: row.ship_name,
                line1: row.ship_line1,
                line2: row.ship_line2,
                city: row.ship_city,
                postal_code: row.ship_postal_code,
                country: row.ship_country,
            },
            phone: row.phone,
            note: row.note,
            payment_reference: row.payment_reference,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

fn into_orders(rows: Vec<OrderRow>) -> Result<Vec<Order>, RepositoryError> {
    rows.into_iter().map(Order::try_from).collect()
}

#[derive(sqlx::FromRow)]
struct OrderItemRow {
    id: i32,
    order_id: i32,
    product_id: Option<i32>,
    product_name: String,
    unit_price: Decimal,
    quantity: i32,
}

impl From<OrderItemRow> for OrderItem {
    fn from(row: OrderItemRow) -> Self {
        Self {
            id: OrderItemId::new(row.id),
            order_id: OrderId::new(row.order_id),
            product_id: row.product_id.map(ProductId::new),
            product_name: row.product_name,
            unit_price: row.unit_price,
            quantity: row.quantity,
        }
    }
}

fn push_filters(qb: &mut QueryBuilder<'_, Postgres>, filter: &OrderFilter) {
    qb.push(" WHERE TRUE");
    if let Some(store_id) = filter.store_id {
        qb.push(" AND o.store_id = ").push_bind(store_id);
    }
    if let Some(status) = filter.status {
        qb.push(" AND o.status = ").push_bind(status);
    }
    if let Some(from) = filter.from {
        qb.push(" AND o.created_at >= ").push_bind(from).push("::date");
    }
    if let Some(to) = filter.to {
        // `to` is inclusive: everything before the following midnight.
        qb.push(" AND o.created_at < (").push_bind(to).push("::date + 1)");
    }
    if let Some(q) = filter.q.as_deref().map(str::trim).filter(|q| !q.is_empty()) {
        let pattern = like_pattern(q);
        qb.push(" AND (u.email ILIKE ")
            .push_bind(pattern.clone())
            .push(" OR u.name ILIKE ")
            .push_bind(pattern)
            .push(")");
    }
}

/// Repository for order database operations.
pub struct OrderRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> OrderRepository<'a> {
    /// Create a new order repository.
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// List orders matching a filter, newest first.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn list(
        &self,
        filter: &OrderFilter,
        page: PageRequest,
    ) -> Result<Page<Order>, RepositoryError> {
        let mut count = QueryBuilder::<Postgres>::new(ORDER_COUNT);
        push_filters(&mut count, filter);
        let total: i64 = count.build_query_scalar().fetch_one(self.pool).await?;

        let mut select = QueryBuilder::<Postgres>::new(ORDER_SELECT);
        push_filters(&mut select, filter);
        select
            .push(" ORDER BY o.created_at DESC, o.id DESC LIMIT ")
            .push_bind(page.limit())
            .push(" OFFSET ")
            .push_bind(page.offset());
        let rows = select
            .build_query_as::<OrderRow>()
            .fetch_all(self.pool)
            .await?;

        Ok(Page::new(into_orders(rows)?, page, total))
    }

    /// All orders matching a filter, newest first, capped at [`EXPORT_LIMIT`].
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn export(&self, filter: &OrderFilter) -> Result<Vec<Order>, RepositoryError> {
        let mut select = QueryBuilder::<Postgres>::new(ORDER_SELECT);
        push_filters(&mut select, filter);
        select
            .push(" ORDER BY o.created_at DESC, o.id DESC LIMIT ")
            .push_bind(EXPORT_LIMIT);
        let rows = select
            .build_query_as::<OrderRow>()
            .fetch_all(self.pool)
            .await?;
        into_orders(rows)
    }

    /// Get an order by ID.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get(&self, id: OrderId) -> Result<Option<Order>, RepositoryError> {
        let sql = format!("{ORDER_SELECT} WHERE o.id = $1");
        sqlx::query_as::<_, OrderRow>(&sql)
            .bind(id)
            .fetch_optional(self.pool)
            .await?
            .map(Order::try_from)
            .transpose()
    }

    /// Get an order only if it belongs to `store_id`.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get_in_store(
        &self,
        store_id: StoreId,
        id: OrderId,
    ) -> Result<Option<Order>, RepositoryError> {
        Ok(self.get(id).await?.filter(|o| o.store_id == store_id))
    }

    /// Get an order only if `user_id` placed it.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get_for_user(
        &self,
        user_id: UserId,
        id: OrderId,
    ) -> Result<Option<Order>, RepositoryError> {
        Ok(self.get(id).await?.filter(|o| o.user_id == user_id))
    }

    /// A customer's orders across all stores, newest first.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn list_for_user(
        &self,
        user_id: UserId,
        page: PageRequest,
    ) -> Result<Page<Order>, RepositoryError> {
        let total: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM bazaar.order WHERE user_id = $1")
                .bind(user_id)
                .fetch_one(self.pool)
                .await?;

        let sql = format!(
            "{ORDER_SELECT} WHERE o.user_id = $1 \
             ORDER BY o.created_at DESC, o.id DESC LIMIT $2 OFFSET $3"
        );
        let rows = sqlx::query_as::<_, OrderRow>(&sql)
            .bind(user_id)
            .bind(page.limit())
            .bind(page.offset())
            .fetch_all(self.pool)
            .await?;

        Ok(Page::new(into_orders(rows)?, page, total))
    }

    /// Find the order a payment provider reference belongs to.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn find_by_payment_reference(
        &self,
        reference: &str,
    ) -> Result<Option<Order>, RepositoryError> {
        let sql = format!("{ORDER_SELECT} WHERE o.payment_reference = $1");
        sqlx::query_as::<_, OrderRow>(&sql)
            .bind(reference)
            .fetch_optional(self.pool)
            .await?
            .map(Order::try_from)
            .transpose()
    }

    /// Line items of an order.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn items(&self, order_id: OrderId) -> Result<Vec<OrderItem>, RepositoryError> {
        fetch_items(self.pool, order_id).await
    }

    /// Attach items and delivery to an order.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if a query fails.
    pub async fn detail(&self, order: Order) -> Result<OrderDetail, RepositoryError> {
        let items = self.items(order.id).await?;
        let delivery = DeliveryRepository::new(self.pool)
            .for_order(order.id)
            .await?;
        Ok(OrderDetail {
            order,
            items,
            delivery,
        })
    }
}

// =============================================================================
// Transaction-scoped operations
// =============================================================================

/// Line items of an order, on any executor.
///
/// # Errors
///
/// Returns `RepositoryError::Database` if the query fails.
pub async fn fetch_items<'e, E>(executor: E, order_id: OrderId) -> Result<Vec<OrderItem>, RepositoryError>
where
    E: Executor<'e, Database = Postgres>,
{
    let rows = sqlx::query_as::<_, OrderItemRow>(
        r"
        SELECT id, order_id, product_id, product_name, unit_price, quantity
        FROM bazaar.order_item
        WHERE order_id = $1
        ORDER BY id
        ",
    )
    .bind(order_id)
    .fetch_all(executor)
    .await?;
    Ok(rows.into_iter().map(OrderItem::from).collect())
}

/// Insert a `pending` order and return its ID.
///
/// # Errors
///
/// Returns `RepositoryError::Database` if the insert fails.
pub async fn insert_order(
    conn: &mut PgConnection,
    order: &NewOrder,
) -> Result<OrderId, RepositoryError> {
    let id: i32 = sqlx::query_scalar(
        r"
        INSERT INTO bazaar.order
            (store_id, user_id, status, subtotal, discount, shipping, total, promotion_code,
             ship_name, ship_line1, ship_line2, ship_city, ship_postal_code, ship_country,
             phone, note, payment_reference)
        VALUES ($1, $2, 'pending', $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16)
        RETURNING id
        ",
    )
    .bind(order.store_id)
    .bind(order.user_id)
    .bind(order.subtotal)
    .bind(order.discount)
    .bind(order.shipping)
    .bind(order.total)
    .bind(order.promotion_code.as_deref())
    .bind(&order.shipping_address.name)
    .bind(&order.shipping_address.line1)
    .bind(order.shipping_address.line2.as_deref())
    .bind(&order.shipping_address.city)
    .bind(&order.shipping_address.postal_code)
    .bind(&order.shipping_address.country)
    .bind(&order.phone)
    .bind(order.note.as_deref())
    .bind(&order.payment_reference)
    .fetch_one(&mut *conn)
    .await?;
    Ok(OrderId::new(id))
}

/// Insert one line of an order.
///
/// # Errors
///
/// Returns `RepositoryError::Database` if the insert fails.
pub async fn insert_item(
    conn: &mut PgConnection,
    order_id: OrderId,
    item: &NewOrderItem,
) -> Result<(), RepositoryError> {
    sqlx::query(
        r"
        INSERT INTO bazaar.order_item (order_id, product_id, product_name, unit_price, quantity)
        VALUES ($1, $2, $3, $4, $5)
        ",
    )
    .bind(order_id)
    .bind(item.product_id)
    .bind(&item.product_name)
    .bind(item.unit_price)
    .bind(item.quantity)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

/// Load an order and lock its row until the transaction ends.
///
/// # Errors
///
/// Returns `RepositoryError::Database` if the query fails.
pub async fn lock(conn: &mut PgConnection, id: OrderId) -> Result<Option<Order>, RepositoryError> {
    let sql = format!("{ORDER_SELECT} WHERE o.id = $1 FOR UPDATE OF o");
    sqlx::query_as::<_, OrderRow>(&sql)
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?
        .map(Order::try_from)
        .transpose()
}

/// Write a new status. Callers check the transition first.
///
/// # Errors
///
/// Returns `RepositoryError::NotFound` if the order does not exist.
pub async fn set_status(
    conn: &mut PgConnection,
    id: OrderId,
    status: OrderStatus,
) -> Result<(), RepositoryError> {
    let result =
        sqlx::query("UPDATE bazaar.order SET status = $2, updated_at = NOW() WHERE id = $1")
            .bind(id)
            .bind(status)
            .execute(&mut *conn)
            .await?;
    if result.rows_affected() == 0 {
        return Err(RepositoryError::NotFound);
    }
    Ok(())
}
