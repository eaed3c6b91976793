//! Database operations for the marketplace `PostgreSQL` database.
//!
//! # Schema: `bazaar`
//!
//! ## Tables
//!
//! - `user` / `user_password` - Accounts and their Argon2 password hashes
//! - `session` - tower-sessions storage
//! - `store` - Seller stores (tenants)
//! - `category`, `product`, `product_image` - Store catalogs
//! - `order`, `order_item`, `delivery` - Orders and shipments
//! - `promotion` - Store promotion codes
//! - `transaction` - Store ledger (sales, refunds, fees, payouts)
//! - `course`, `chapter`, `section` - Store course content
//!
//! # Migrations
//!
//! Migrations are stored in `crates/server/migrations/` and run via:
//! ```bash
//! cargo run -p bazaar-cli -- migrate
//! ```

pub mod analytics;
pub mod categories;
pub mod courses;
pub mod customers;
pub mod deliveries;
pub mod orders;
pub mod products;
pub mod promotions;
pub mod stores;
pub mod transactions;
pub mod users;

use std::time::Duration;

use secrecy::ExposeSecret;
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgConnection, PgPool};
use thiserror::Error;

use bazaar_core::PositionUpdate;

pub use analytics::AnalyticsRepository;
pub use categories::CategoryRepository;
pub use courses::CourseRepository;
pub use customers::CustomerRepository;
pub use deliveries::DeliveryRepository;
pub use orders::OrderRepository;
pub use products::ProductRepository;
pub use promotions::PromotionRepository;
pub use stores::StoreRepository;
pub use transactions::TransactionRepository;
pub use users::UserRepository;

/// Errors that can occur during repository operations.
#[derive(Debug, Error)]
pub enum RepositoryError {
    /// Database error from sqlx.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Data in the database is corrupted or invalid.
    #[error("data corruption: {0}")]
    DataCorruption(String),

    /// Requested entity was not found.
    #[error("not found")]
    NotFound,

    /// Constraint violation (e.g., unique slug).
    #[error("constraint violation: {0}")]
    Conflict(String),
}

impl RepositoryError {
    /// Map unique and foreign-key violations to [`RepositoryError::Conflict`].
    pub(crate) fn from_write(e: sqlx::Error, conflict: &str) -> Self {
        if let sqlx::Error::Database(ref db_err) = e
            && (db_err.is_unique_violation() || db_err.is_foreign_key_violation())
        {
            return Self::Conflict(conflict.to_owned());
        }
        Self::Database(e)
    }
}

/// Create a `PostgreSQL` connection pool with sensible defaults.
///
/// # Arguments
///
/// * `database_url` - `PostgreSQL` connection string (wrapped in `SecretString`)
///
/// # Errors
///
/// Returns `sqlx::Error` if the connection cannot be established.
pub async fn create_pool(database_url: &secrecy::SecretString) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(10)
        .min_connections(2)
        .acquire_timeout(Duration::from_secs(10))
        .connect(database_url.expose_secret())
        .await
}

/// Build an `ILIKE` pattern matching `term` anywhere, with wildcards escaped.
#[must_use]
pub fn like_pattern(term: &str) -> String {
    let mut pattern = String::with_capacity(term.len() + 2);
    pattern.push('%');
    for c in term.trim().chars() {
        if matches!(c, '%' | '_' | '\\') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('%');
    pattern
}

/// Tables whose rows carry a `position` column under a parent.
#[derive(Debug, Clone, Copy)]
pub(crate) enum Positioned {
    Category,
    ProductImage,
    Chapter,
    Section,
}

impl Positioned {
    const fn table(self) -> &'static str {
        match self {
            Self::Category => "bazaar.category",
            Self::ProductImage => "bazaar.product_image",
            Self::Chapter => "bazaar.chapter",
            Self::Section => "bazaar.section",
        }
    }

    const fn parent_column(self) -> &'static str {
        match self {
            Self::Category => "store_id",
            Self::ProductImage => "product_id",
            Self::Chapter => "course_id",
            Self::Section => "chapter_id",
        }
    }
}

/// IDs of all children of `parent_id`, in current position order.
pub(crate) async fn child_ids(
    pool: &PgPool,
    kind: Positioned,
    parent_id: i32,
) -> Result<Vec<i32>, RepositoryError> {
    let sql = format!(
        "SELECT id FROM {} WHERE {} = $1 ORDER BY position, id",
        kind.table(),
        kind.parent_column()
    );
    let ids = sqlx::query_scalar::<_, i32>(&sql)
        .bind(parent_id)
        .fetch_all(pool)
        .await?;
    Ok(ids)
}

/// Next free position under a parent (one past the current maximum).
pub(crate) async fn next_position(
    conn: &mut PgConnection,
    kind: Positioned,
    parent_id: i32,
) -> Result<i32, RepositoryError> {
    let sql = format!(
        "SELECT COALESCE(MAX(position) + 1, 0) FROM {} WHERE {} = $1",
        kind.table(),
        kind.parent_column()
    );
    let position = sqlx::query_scalar::<_, i32>(&sql)
        .bind(parent_id)
        .fetch_one(&mut *conn)
        .await?;
    Ok(position)
}

/// Write validated positions in one transaction.
///
/// `sorted` must already be ordered by requested position; rows are
/// renumbered `0..n` in that order so gaps in the request are closed.
pub(crate) async fn write_positions<Id>(
    pool: &PgPool,
    kind: Positioned,
    parent_id: i32,
    sorted: &[PositionUpdate<Id>],
) -> Result<(), RepositoryError>
where
    Id: Copy + Into<i32>,
{
    let sql = format!(
        "UPDATE {} SET position = $1 WHERE id = $2 AND {} = $3",
        kind.table(),
        kind.parent_column()
    );

    let mut tx = pool.begin().await?;
    for (position, update) in (0_i32..).zip(sorted) {
        let result = sqlx::query(&sql)
            .bind(position)
            .bind(update.id.into())
            .bind(parent_id)
            .execute(&mut *tx)
            .await?;
        if result.rows_affected() != 1 {
            return Err(RepositoryError::NotFound);
        }
    }
    tx.commit().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_like_pattern_escapes_wildcards() {
        assert_eq!(like_pattern("mug"), "%mug%");
        assert_eq!(like_pattern(" 100%_off "), "%100\\%\\_off%");
        assert_eq!(like_pattern("a\\b"), "%a\\\\b%");
    }

    #[test]
    fn test_positioned_tables() {
        assert_eq!(Positioned::Section.table(), "bazaar.section");
        assert_eq!(Positioned::ProductImage.parent_column(), "product_id");
    }
}
