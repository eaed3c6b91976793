//! Product and product image repository.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{PgConnection, PgPool, Postgres, QueryBuilder};

use bazaar_core::{
    CategoryId, Page, PageRequest, PositionUpdate, ProductId, ProductImageId, Slug, StoreId,
};

use super::{
    Positioned, RepositoryError, child_ids, like_pattern, next_position, write_positions,
};
use crate::models::catalog::{
    NewProduct, Product, ProductFilter, ProductImage, ProductUpdate,
};

const PRODUCT_COLUMNS: &str = "p.id, p.store_id, p.category_id, p.name, p.slug, p.description, \
                               p.price, p.compare_at_price, p.stock, p.featured, p.archived, \
                               p.created_at, p.updated_at";

/// Which products a listing may show.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListScope {
    /// Public catalog: archived products never appear.
    Storefront,
    /// Seller dashboard: archived products appear unless filtered out.
    Dashboard,
}

#[derive(sqlx::FromRow)]
struct ProductRow {
    id: i32,
    store_id: i32,
    category_id: Option<i32>,
    name: String,
    slug: String,
    description: String,
    price: Decimal,
    compare_at_price: Option<Decimal>,
    stock: i32,
    featured: bool,
    archived: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<ProductRow> for Product {
    type Error = RepositoryError;

    fn try_from(row: ProductRow) -> Result<Self, Self::Error> {
        let slug = Slug::parse(&row.slug)
            .map_err(|e| RepositoryError::DataCorruption(format!("invalid product slug: {e}")))?;
        Ok(Self {
            id: ProductId::new(row.id),
            store_id: StoreId::new(row.store_id),
            category_id: row.category_id.map(CategoryId::new),
            name: row.name,
            slug,
            description: row.description,
            price: row.price,
            compare_at_price: row.compare_at_price,
            stock: row.stock,
            featured: row.featured,
            archived: row.archived,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

fn into_products(rows: Vec<ProductRow>) -> Result<Vec<Product>, RepositoryError> {
    rows.into_iter().map(Product::try_from).collect()
}

#[derive(sqlx::FromRow)]
struct ProductImageRow {
    id: i32,
    product_id: i32,
    url: String,
    position: i32,
}

impl From<ProductImageRow> for ProductImage {
    fn from(row: ProductImageRow) -> Self {
        Self {
            id: ProductImageId::new(row.id),
            product_id: ProductId::new(row.product_id),
            url: row.url,
            position: row.position,
        }
    }
}

/// Append the `WHERE` clause for a product listing.
fn push_filters(
    qb: &mut QueryBuilder<'_, Postgres>,
    store_id: StoreId,
    filter: &ProductFilter,
    scope: ListScope,
) {
    qb.push(" WHERE p.store_id = ").push_bind(store_id);

    match scope {
        ListScope::Storefront => {
            qb.push(" AND NOT p.archived");
        }
        ListScope::Dashboard => {
            if let Some(archived) = filter.archived {
                qb.push(" AND p.archived = ").push_bind(archived);
            }
        }
    }

    if let Some(category) = filter.category.as_deref().map(str::trim).filter(|c| !c.is_empty()) {
        qb.push(
            " AND p.category_id = (SELECT c.id FROM bazaar.category c \
             WHERE c.store_id = p.store_id AND c.slug = ",
        )
        .push_bind(category.to_owned())
        .push(")");
    }
    if let Some(q) = filter.search_term() {
        let pattern = like_pattern(q);
        qb.push(" AND (p.name ILIKE ")
            .push_bind(pattern.clone())
            .push(" OR p.description ILIKE ")
            .push_bind(pattern)
            .push(")");
    }
    if let Some(min) = filter.min_price {
        qb.push(" AND p.price >= ").push_bind(min);
    }
    if let Some(max) = filter.max_price {
        qb.push(" AND p.price <= ").push_bind(max);
    }
    if let Some(featured) = filter.featured {
        qb.push(" AND p.featured = ").push_bind(featured);
    }
    match filter.in_stock {
        Some(true) => {
            qb.push(" AND p.stock > 0");
        }
        Some(false) => {
            qb.push(" AND p.stock = 0");
        }
        None => {}
    }
}

/// Repository for product database operations.
pub struct ProductRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> ProductRepository<'a> {
    /// Create a new product repository.
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// List products matching a filter, one page at a time.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn list(
        &self,
        store_id: StoreId,
        filter: &ProductFilter,
        scope: ListScope,
        page: PageRequest,
    ) -> Result<Page<Product>, RepositoryError> {
        let mut count = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM bazaar.product p");
        push_filters(&mut count, store_id, filter, scope);
        let total: i64 = count.build_query_scalar().fetch_one(self.pool).await?;

        let mut select =
            QueryBuilder::<Postgres>::new(format!("SELECT {PRODUCT_COLUMNS} FROM bazaar.product p"));
        push_filters(&mut select, store_id, filter, scope);
        select
            .push(" ORDER BY ")
            .push(filter.sort.order_by())
            .push(" LIMIT ")
            .push_bind(page.limit())
            .push(" OFFSET ")
            .push_bind(page.offset());

        let rows = select
            .build_query_as::<ProductRow>()
            .fetch_all(self.pool)
            .await?;

        Ok(Page::new(into_products(rows)?, page, total))
    }

    /// Get a product belonging to a store (archived included).
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get(
        &self,
        store_id: StoreId,
        id: ProductId,
    ) -> Result<Option<Product>, RepositoryError> {
        let sql = format!(
            "SELECT {PRODUCT_COLUMNS} FROM bazaar.product p WHERE p.store_id = $1 AND p.id = $2"
        );
        sqlx::query_as::<_, ProductRow>(&sql)
            .bind(store_id)
            .bind(id)
            .fetch_optional(self.pool)
            .await?
            .map(Product::try_from)
            .transpose()
    }

    /// Get a non-archived product by slug (storefront lookup).
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get_listed_by_slug(
        &self,
        store_id: StoreId,
        slug: &str,
    ) -> Result<Option<Product>, RepositoryError> {
        let sql = format!(
            "SELECT {PRODUCT_COLUMNS} FROM bazaar.product p \
             WHERE p.store_id = $1 AND p.slug = $2 AND NOT p.archived"
        );
        sqlx::query_as::<_, ProductRow>(&sql)
            .bind(store_id)
            .bind(slug)
            .fetch_optional(self.pool)
            .await?
            .map(Product::try_from)
            .transpose()
    }

    /// Get several products of a store at once (cart pricing).
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get_many(
        &self,
        store_id: StoreId,
        ids: &[ProductId],
    ) -> Result<Vec<Product>, RepositoryError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let ids: Vec<i32> = ids.iter().map(ProductId::as_i32).collect();
        let sql = format!(
            "SELECT {PRODUCT_COLUMNS} FROM bazaar.product p \
             WHERE p.store_id = $1 AND p.id = ANY($2)"
        );
        let rows = sqlx::query_as::<_, ProductRow>(&sql)
            .bind(store_id)
            .bind(ids)
            .fetch_all(self.pool)
            .await?;
        into_products(rows)
    }

    /// Create a product.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Conflict` if the slug is taken in the store.
    pub async fn create(&self, product: &NewProduct) -> Result<Product, RepositoryError> {
        let sql = format!(
            r"
            INSERT INTO bazaar.product AS p
                (store_id, category_id, name, slug, description, price, compare_at_price,
                 stock, featured)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING {PRODUCT_COLUMNS}
            "
        );
        let row = sqlx::query_as::<_, ProductRow>(&sql)
            .bind(product.store_id)
            .bind(product.category_id)
            .bind(&product.name)
            .bind(&product.slug)
            .bind(&product.description)
            .bind(product.price)
            .bind(product.compare_at_price)
            .bind(product.stock)
            .bind(product.featured)
            .fetch_one(self.pool)
            .await
            .map_err(|e| RepositoryError::from_write(e, "product slug already exists"))?;

        Product::try_from(row)
    }

    /// Apply a partial update.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the product is not in the store.
    pub async fn update(
        &self,
        store_id: StoreId,
        id: ProductId,
        update: &ProductUpdate,
    ) -> Result<Product, RepositoryError> {
        let sql = format!(
            r"
            UPDATE bazaar.product AS p SET
                category_id = CASE WHEN $3 THEN $4 ELSE p.category_id END,
                name = COALESCE($5, p.name),
                slug = COALESCE($6, p.slug),
                description = COALESCE($7, p.description),
                price = COALESCE($8, p.price),
                compare_at_price = CASE WHEN $9 THEN $10 ELSE p.compare_at_price END,
                stock = COALESCE($11, p.stock),
                featured = COALESCE($12, p.featured),
                archived = COALESCE($13, p.archived),
                updated_at = NOW()
            WHERE p.store_id = $1 AND p.id = $2
            RETURNING {PRODUCT_COLUMNS}
            "
        );
        let row = sqlx::query_as::<_, ProductRow>(&sql)
            .bind(store_id)
            .bind(id)
            .bind(update.category_id.is_some())
            .bind(update.category_id.flatten())
            .bind(update.name.as_deref())
            .bind(update.slug.as_ref())
            .bind(update.description.as_deref())
            .bind(update.price)
            .bind(update.compare_at_price.is_some())
            .bind(update.compare_at_price.flatten())
            .bind(update.stock)
            .bind(update.featured)
            .bind(update.archived)
            .fetch_optional(self.pool)
            .await
            .map_err(|e| RepositoryError::from_write(e, "product slug already exists"))?
            .ok_or(RepositoryError::NotFound)?;

        Product::try_from(row)
    }

    /// Delete a product. Past order lines keep their snapshots.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the product is not in the store.
    pub async fn delete(&self, store_id: StoreId, id: ProductId) -> Result<(), RepositoryError> {
        let result = sqlx::query("DELETE FROM bazaar.product WHERE store_id = $1 AND id = $2")
            .bind(store_id)
            .bind(id)
            .execute(self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }

    // =========================================================================
    // Images
    // =========================================================================

    /// Images of a product in position order.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn images(&self, product_id: ProductId) -> Result<Vec<ProductImage>, RepositoryError> {
        let rows = sqlx::query_as::<_, ProductImageRow>(
            r"
            SELECT id, product_id, url, position FROM bazaar.product_image
            WHERE product_id = $1 ORDER BY position, id
            ",
        )
        .bind(product_id)
        .fetch_all(self.pool)
        .await?;
        Ok(rows.into_iter().map(ProductImage::from).collect())
    }

    /// Replace all images of a product with `urls`, in order.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn replace_images(
        &self,
        product_id: ProductId,
        urls: &[String],
    ) -> Result<Vec<ProductImage>, RepositoryError> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM bazaar.product_image WHERE product_id = $1")
            .bind(product_id)
            .execute(&mut *tx)
            .await?;
        insert_images(&mut tx, product_id, 0, urls).await?;
        tx.commit().await?;

        self.images(product_id).await
    }

    /// Append images after the product's existing ones.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn append_images(
        &self,
        product_id: ProductId,
        urls: &[String],
    ) -> Result<Vec<ProductImage>, RepositoryError> {
        let mut tx = self.pool.begin().await?;
        let start = next_position(&mut tx, Positioned::ProductImage, product_id.as_i32()).await?;
        insert_images(&mut tx, product_id, start, urls).await?;
        tx.commit().await?;

        self.images(product_id).await
    }

    /// Delete one image of a product.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the image is not on the product.
    pub async fn delete_image(
        &self,
        product_id: ProductId,
        image_id: ProductImageId,
    ) -> Result<(), RepositoryError> {
        let result =
            sqlx::query("DELETE FROM bazaar.product_image WHERE product_id = $1 AND id = $2")
                .bind(product_id)
                .bind(image_id)
                .execute(self.pool)
                .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }

    /// IDs of a product's images.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn image_ids(
        &self,
        product_id: ProductId,
    ) -> Result<Vec<ProductImageId>, RepositoryError> {
        let ids = child_ids(self.pool, Positioned::ProductImage, product_id.as_i32()).await?;
        Ok(ids.into_iter().map(ProductImageId::new).collect())
    }

    /// Write a validated, position-sorted image order.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if an image vanished concurrently.
    pub async fn reorder_images(
        &self,
        product_id: ProductId,
        sorted: &[PositionUpdate<ProductImageId>],
    ) -> Result<(), RepositoryError> {
        write_positions(self.pool, Positioned::ProductImage, product_id.as_i32(), sorted).await
    }
}

async fn insert_images(
    conn: &mut PgConnection,
    product_id: ProductId,
    start: i32,
    urls: &[String],
) -> Result<(), RepositoryError> {
    for (position, url) in (start..).zip(urls) {
        sqlx::query(
            "INSERT INTO bazaar.product_image (product_id, url, position) VALUES ($1, $2, $3)",
        )
        .bind(product_id)
        .bind(url)
        .bind(position)
        .execute(&mut *conn)
        .await?;
    }
    Ok(())
}

// =============================================================================
// Stock (transaction-scoped)
// =============================================================================

/// Lock a store's products for the rest of the transaction.
///
/// # Errors
///
/// Returns `RepositoryError::Database` if the query fails.
pub async fn lock_many(
    conn: &mut PgConnection,
    store_id: StoreId,
    ids: &[ProductId],
) -> Result<Vec<Product>, RepositoryError> {
    let ids: Vec<i32> = ids.iter().map(ProductId::as_i32).collect();
    let sql = format!(
        "SELECT {PRODUCT_COLUMNS} FROM bazaar.product p \
         WHERE p.store_id = $1 AND p.id = ANY($2) ORDER BY p.id FOR UPDATE"
    );
    let rows = sqlx::query_as::<_, ProductRow>(&sql)
        .bind(store_id)
        .bind(ids)
        .fetch_all(&mut *conn)
        .await?;
    into_products(rows)
}

/// Take `quantity` units out of stock if enough remain.
///
/// Returns `false` (and changes nothing) when stock is insufficient or the
/// product is archived.
///
/// # Errors
///
/// Returns `RepositoryError::Database` if the query fails.
pub async fn decrement_stock(
    conn: &mut PgConnection,
    product_id: ProductId,
    quantity: i32,
) -> Result<bool, RepositoryError> {
    let result = sqlx::query(
        r"
        UPDATE bazaar.product SET stock = stock - $2, updated_at = NOW()
        WHERE id = $1 AND NOT archived AND stock >= $2
        ",
    )
    .bind(product_id)
    .bind(quantity)
    .execute(&mut *conn)
    .await?;
    Ok(result.rows_affected() == 1)
}

/// Put units back into stock. Deleted products are skipped.
///
/// # Errors
///
/// Returns `RepositoryError::Database` if the query fails.
pub async fn restore_stock(
    conn: &mut PgConnection,
    product_id: ProductId,
    quantity: i32,
) -> Result<(), RepositoryError> {
    sqlx::query("UPDATE bazaar.product SET stock = stock + $2, updated_at = NOW() WHERE id = $1")
        .bind(product_id)
        .bind(quantity)
        .execute(&mut *conn)
        .await?;
    Ok(())
}
