//! Store repository for database operations.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::PgPool;

use bazaar_core::{CurrencyCode, Slug, StoreId, UserId};

use super::RepositoryError;
use crate::models::store::{NewStore, Store, StoreUpdate};

const STORE_COLUMNS: &str = "id, owner_id, name, slug, description, currency, shipping_fee, \
                             active, created_at, updated_at";

#[derive(sqlx::FromRow)]
struct StoreRow {
    id: i32,
    owner_id: i32,
    name: String,
    slug: String,
    description: Option<String>,
    currency: String,
    shipping_fee: Decimal,
    active: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<StoreRow> for Store {
    type Error = RepositoryError;

    fn try_from(row: StoreRow) -> Result<Self, Self::Error> {
        let slug = Slug::parse(&row.slug)
            .map_err(|e| RepositoryError::DataCorruption(format!("invalid store slug: {e}")))?;
        let currency = row
            .currency
            .parse::<CurrencyCode>()
            .map_err(|e| RepositoryError::DataCorruption(e.to_string()))?;

        Ok(Self {
            id: StoreId::new(row.id),
            owner_id: UserId::new(row.owner_id),
            name: row.name,
            slug,
            description: row.description,
            currency,
            shipping_fee: row.shipping_fee,
            active: row.active,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

fn into_stores(rows: Vec<StoreRow>) -> Result<Vec<Store>, RepositoryError> {
    rows.into_iter().map(Store::try_from).collect()
}

/// Repository for store database operations.
pub struct StoreRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> StoreRepository<'a> {
    /// Create a new store repository.
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Get a store by ID.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get_by_id(&self, id: StoreId) -> Result<Option<Store>, RepositoryError> {
        let sql = format!("SELECT {STORE_COLUMNS} FROM bazaar.store WHERE id = $1");
        sqlx::query_as::<_, StoreRow>(&sql)
            .bind(id)
            .fetch_optional(self.pool)
            .await?
            .map(Store::try_from)
            .transpose()
    }

    /// Get an active store by slug (storefront lookup).
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get_active_by_slug(&self, slug: &str) -> Result<Option<Store>, RepositoryError> {
        let sql = format!("SELECT {STORE_COLUMNS} FROM bazaar.store WHERE slug = $1 AND active");
        sqlx::query_as::<_, StoreRow>(&sql)
            .bind(slug)
            .fetch_optional(self.pool)
            .await?
            .map(Store::try_from)
            .transpose()
    }

    /// List the stores owned by a user.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn list_for_owner(&self, owner_id: UserId) -> Result<Vec<Store>, RepositoryError> {
        let sql = format!(
            "SELECT {STORE_COLUMNS} FROM bazaar.store WHERE owner_id = $1 ORDER BY name, id"
        );
        let rows = sqlx::query_as::<_, StoreRow>(&sql)
            .bind(owner_id)
            .fetch_all(self.pool)
            .await?;
        into_stores(rows)
    }

    /// List every store on the platform.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn list_all(&self) -> Result<Vec<Store>, RepositoryError> {
        let sql = format!("SELECT {STORE_COLUMNS} FROM bazaar.store ORDER BY name, id");
        let rows = sqlx::query_as::<_, StoreRow>(&sql)
            .fetch_all(self.pool)
            .await?;
        into_stores(rows)
    }

    /// Create a store and promote its owner from customer to seller.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Conflict` if the slug is taken.
    pub async fn create(&self, store: &NewStore) -> Result<Store, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let sql = format!(
            r"
            INSERT INTO bazaar.store (owner_id, name, slug, description, currency, shipping_fee)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING {STORE_COLUMNS}
            "
        );
        let row = sqlx::query_as::<_, StoreRow>(&sql)
            .bind(store.owner_id)
            .bind(&store.name)
            .bind(&store.slug)
            .bind(store.description.as_deref())
            .bind(store.currency.code())
            .bind(store.shipping_fee)
            .fetch_one(&mut *tx)
            .await
            .map_err(|e| RepositoryError::from_write(e, "store slug already taken"))?;

        sqlx::query(
            r"
            UPDATE bazaar.user SET role = 'seller', updated_at = NOW()
            WHERE id = $1 AND role = 'customer'
            ",
        )
        .bind(store.owner_id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        Store::try_from(row)
    }

    /// Apply a partial update.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the store does not exist and
    /// `RepositoryError::Conflict` if a new slug is taken.
    pub async fn update(&self, id: StoreId, update: &StoreUpdate) -> Result<Store, RepositoryError> {
        let sql = format!(
            r"
            UPDATE bazaar.store SET
                name = COALESCE($2, name),
                slug = COALESCE($3, slug),
                description = CASE WHEN $4 THEN $5 ELSE description END,
                currency = COALESCE($6, currency),
                shipping_fee = COALESCE($7, shipping_fee),
                active = COALESCE($8, active),
                updated_at = NOW()
            WHERE id = $1
            RETURNING {STORE_COLUMNS}
            "
        );
        let row = sqlx::query_as::<_, StoreRow>(&sql)
            .bind(id)
            .bind(update.name.as_deref())
            .bind(update.slug.as_ref())
            .bind(update.description.is_some())
            .bind(update.description.clone().flatten())
            .bind(update.currency.map(CurrencyCode::code))
            .bind(update.shipping_fee)
            .bind(update.active)
            .fetch_optional(self.pool)
            .await
            .map_err(|e| RepositoryError::from_write(e, "store slug already taken"))?
            .ok_or(RepositoryError::NotFound)?;

        Store::try_from(row)
    }

    /// Delete a store and its catalog.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Conflict` if the store still has orders.
    pub async fn delete(&self, id: StoreId) -> Result<(), RepositoryError> {
        let result = sqlx::query("DELETE FROM bazaar.store WHERE id = $1")
            .bind(id)
            .execute(self.pool)
            .await
            .map_err(|e| RepositoryError::from_write(e, "store has orders and cannot be deleted"))?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }
}
