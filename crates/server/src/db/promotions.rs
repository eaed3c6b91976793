//! Promotion repository.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{PgConnection, PgPool};

use bazaar_core::{PromotionId, PromotionKind, StoreId};

use super::RepositoryError;
use crate::models::promotion::{Promotion, PromotionTerms};

const PROMOTION_COLUMNS: &str = "id, store_id, code, kind, value, min_subtotal, starts_at, \
                                 ends_at, usage_limit, times_used, active, created_at, updated_at";

const DUPLICATE_CODE: &str = "promotion code already exists";

#[derive(sqlx::FromRow)]
struct PromotionRow {
    id: i32,
    store_id: i32,
    code: String,
    kind: PromotionKind,
    value: Decimal,
    min_subtotal: Option<Decimal>,
    starts_at: Option<DateTime<Utc>>,
    ends_at: Option<DateTime<Utc>>,
    usage_limit: Option<i32>,
    times_used: i32,
    active: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<PromotionRow> for Promotion {
    fn from(row: PromotionRow) -> Self {
        Self {
            id: PromotionId::new(row.id),
            store_id: StoreId::new(row.store_id),
            code: row.code,
            kind: row.kind,
            value: row.value,
            min_subtotal: row.min_subtotal,
            starts_at: row.starts_at,
            ends_at: row.ends_at,
            usage_limit: row.usage_limit,
            times_used: row.times_used,
            active: row.active,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

/// Repository for promotion database operations.
pub struct PromotionRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> PromotionRepository<'a> {
    /// Create a new promotion repository.
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// All promotions of a store, newest first.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn list(&self, store_id: StoreId) -> Result<Vec<Promotion>, RepositoryError> {
        let sql = format!(
            "SELECT {PROMOTION_COLUMNS} FROM bazaar.promotion \
             WHERE store_id = $1 ORDER BY created_at DESC, id DESC"
        );
        let rows = sqlx::query_as::<_, PromotionRow>(&sql)
            .bind(store_id)
            .fetch_all(self.pool)
            .await?;
        Ok(rows.into_iter().map(Promotion::from).collect())
    }

    /// Get a promotion of a store.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get(
        &self,
        store_id: StoreId,
        id: PromotionId,
    ) -> Result<Option<Promotion>, RepositoryError> {
        let sql = format!(
            "SELECT {PROMOTION_COLUMNS} FROM bazaar.promotion WHERE store_id = $1 AND id = $2"
        );
        let row = sqlx::query_as::<_, PromotionRow>(&sql)
            .bind(store_id)
            .bind(id)
            .fetch_optional(self.pool)
            .await?;
        Ok(row.map(Promotion::from))
    }

    /// Look a code up in a store. `code` must already be normalised.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get_by_code(
        &self,
        store_id: StoreId,
        code: &str,
    ) -> Result<Option<Promotion>, RepositoryError> {
        let sql = format!(
            "SELECT {PROMOTION_COLUMNS} FROM bazaar.promotion WHERE store_id = $1 AND code = $2"
        );
        let row = sqlx::query_as::<_, PromotionRow>(&sql)
            .bind(store_id)
            .bind(code)
            .fetch_optional(self.pool)
            .await?;
        Ok(row.map(Promotion::from))
    }

    /// Create a promotion from validated terms.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Conflict` if the code exists in the store.
    pub async fn create(
        &self,
        store_id: StoreId,
        terms: &PromotionTerms,
    ) -> Result<Promotion, RepositoryError> {
        let sql = format!(
            r"
            INSERT INTO bazaar.promotion
                (store_id, code, kind, value, min_subtotal, starts_at, ends_at, usage_limit, active)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING {PROMOTION_COLUMNS}
            "
        );
        let row = sqlx::query_as::<_, PromotionRow>(&sql)
            .bind(store_id)
            .bind(&terms.code)
            .bind(terms.kind)
            .bind(terms.value)
            .bind(terms.min_subtotal)
            .bind(terms.starts_at)
            .bind(terms.ends_at)
            .bind(terms.usage_limit)
            .bind(terms.active)
            .fetch_one(self.pool)
            .await
            .map_err(|e| RepositoryError::from_write(e, DUPLICATE_CODE))?;
        Ok(Promotion::from(row))
    }

    /// Replace a promotion's terms. `times_used` is preserved.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the promotion is not in the store,
    /// or `RepositoryError::Conflict` if the new code is taken.
    pub async fn update(
        &self,
        store_id: StoreId,
        id: PromotionId,
        terms: &PromotionTerms,
    ) -> Result<Promotion, RepositoryError> {
        let sql = format!(
            r"
            UPDATE bazaar.promotion SET
                code = $3, kind = $4, value = $5, min_subtotal = $6, starts_at = $7,
                ends_at = $8, usage_limit = $9, active = $10, updated_at = NOW()
            WHERE store_id = $1 AND id = $2
            RETURNING {PROMOTION_COLUMNS}
            "
        );
        let row = sqlx::query_as::<_, PromotionRow>(&sql)
            .bind(store_id)
            .bind(id)
            .bind(&terms.code)
            .bind(terms.kind)
            .bind(terms.value)
            .bind(terms.min_subtotal)
            .bind(terms.starts_at)
            .bind(terms.ends_at)
            .bind(terms.usage_limit)
            .bind(terms.active)
            .fetch_optional(self.pool)
            .await
            .map_err(|e| RepositoryError::from_write(e, DUPLICATE_CODE))?
            .ok_or(RepositoryError::NotFound)?;
        Ok(Promotion::from(row))
    }

    /// Delete a promotion. Orders keep the code they were placed with.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the promotion is not in the store.
    pub async fn delete(&self, store_id: StoreId, id: PromotionId) -> Result<(), RepositoryError> {
        let result = sqlx::query("DELETE FROM bazaar.promotion WHERE store_id = $1 AND id = $2")
            .bind(store_id)
            .bind(id)
            .execute(self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }
}

/// Load a promotion by code and lock it until the transaction ends.
///
/// # Errors
///
/// Returns `RepositoryError::Database` if the query fails.
pub async fn lock_by_code(
    conn: &mut PgConnection,
    store_id: StoreId,
    code: &str,
) -> Result<Option<Promotion>, RepositoryError> {
    let sql = format!(
        "SELECT {PROMOTION_COLUMNS} FROM bazaar.promotion \
         WHERE store_id = $1 AND code = $2 FOR UPDATE"
    );
    let row = sqlx::query_as::<_, PromotionRow>(&sql)
        .bind(store_id)
        .bind(code)
        .fetch_optional(&mut *conn)
        .await?;
    Ok(row.map(Promotion::from))
}

/// Count one use of a promotion, unless its usage limit is reached.
///
/// Returns `false` (and changes nothing) when the limit is already met.
///
/// # Errors
///
/// Returns `RepositoryError::Database` if the query fails.
pub async fn consume(conn: &mut PgConnection, id: PromotionId) -> Result<bool, RepositoryError> {
    let result = sqlx::query(
        r"
        UPDATE bazaar.promotion SET times_used = times_used + 1, updated_at = NOW()
        WHERE id = $1 AND (usage_limit IS NULL OR times_used < usage_limit)
        ",
    )
    .bind(id)
    .execute(&mut *conn)
    .await?;
    Ok(result.rows_affected() == 1)
}
