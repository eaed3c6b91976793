//! Category repository for database operations.

use sqlx::PgPool;

use bazaar_core::{CategoryId, PositionUpdate, Slug, StoreId};

use super::{Positioned, RepositoryError, child_ids, next_position, write_positions};
use crate::models::catalog::Category;

const CATEGORY_COLUMNS: &str = "id, store_id, name, slug, position";

#[derive(sqlx::FromRow)]
struct CategoryRow {
    id: i32,
    store_id: i32,
    name: String,
    slug: String,
    position: i32,
}

impl TryFrom<CategoryRow> for Category {
    type Error = RepositoryError;

    fn try_from(row: CategoryRow) -> Result<Self, Self::Error> {
        let slug = Slug::parse(&row.slug)
            .map_err(|e| RepositoryError::DataCorruption(format!("invalid category slug: {e}")))?;
        Ok(Self {
            id: CategoryId::new(row.id),
            store_id: StoreId::new(row.store_id),
            name: row.name,
            slug,
            position: row.position,
        })
    }
}

/// Repository for category database operations.
pub struct CategoryRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> CategoryRepository<'a> {
    /// Create a new category repository.
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// List a store's categories in position order.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn list(&self, store_id: StoreId) -> Result<Vec<Category>, RepositoryError> {
        let sql = format!(
            "SELECT {CATEGORY_COLUMNS} FROM bazaar.category WHERE store_id = $1 \
             ORDER BY position, id"
        );
        sqlx::query_as::<_, CategoryRow>(&sql)
            .bind(store_id)
            .fetch_all(self.pool)
            .await?
            .into_iter()
            .map(Category::try_from)
            .collect()
    }

    /// Get a category belonging to a store.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get(
        &self,
        store_id: StoreId,
        id: CategoryId,
    ) -> Result<Option<Category>, RepositoryError> {
        let sql = format!(
            "SELECT {CATEGORY_COLUMNS} FROM bazaar.category WHERE store_id = $1 AND id = $2"
        );
        sqlx::query_as::<_, CategoryRow>(&sql)
            .bind(store_id)
            .bind(id)
            .fetch_optional(self.pool)
            .await?
            .map(Category::try_from)
            .transpose()
    }

    /// Create a category at the end of the store's list.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Conflict` if the slug is taken in the store.
    pub async fn create(
        &self,
        store_id: StoreId,
        name: &str,
        slug: &Slug,
    ) -> Result<Category, RepositoryError> {
        let mut tx = self.pool.begin().await?;
        let position = next_position(&mut tx, Positioned::Category, store_id.as_i32()).await?;

        let sql = format!(
            r"
            INSERT INTO bazaar.category (store_id, name, slug, position)
            VALUES ($1, $2, $3, $4)
            RETURNING {CATEGORY_COLUMNS}
            "
        );
        let row = sqlx::query_as::<_, CategoryRow>(&sql)
            .bind(store_id)
            .bind(name)
            .bind(slug)
            .bind(position)
            .fetch_one(&mut *tx)
            .await
            .map_err(|e| RepositoryError::from_write(e, "category slug already exists"))?;

        tx.commit().await?;
        Category::try_from(row)
    }

    /// Rename a category or change its slug.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the category is not in the store.
    pub async fn update(
        &self,
        store_id: StoreId,
        id: CategoryId,
        name: Option<&str>,
        slug: Option<&Slug>,
    ) -> Result<Category, RepositoryError> {
        let sql = format!(
            r"
            UPDATE bazaar.category SET name = COALESCE($3, name), slug = COALESCE($4, slug)
            WHERE store_id = $1 AND id = $2
            RETURNING {CATEGORY_COLUMNS}
            "
        );
        let row = sqlx::query_as::<_, CategoryRow>(&sql)
            .bind(store_id)
            .bind(id)
            .bind(name)
            .bind(slug)
            .fetch_optional(self.pool)
            .await
            .map_err(|e| RepositoryError::from_write(e, "category slug already exists"))?
            .ok_or(RepositoryError::NotFound)?;

        Category::try_from(row)
    }

    /// Delete a category. Its products become uncategorised.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the category is not in the store.
    pub async fn delete(&self, store_id: StoreId, id: CategoryId) -> Result<(), RepositoryError> {
        let result = sqlx::query("DELETE FROM bazaar.category WHERE store_id = $1 AND id = $2")
            .bind(store_id)
            .bind(id)
            .execute(self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }

    /// IDs of the store's categories.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn ids(&self, store_id: StoreId) -> Result<Vec<CategoryId>, RepositoryError> {
        let ids = child_ids(self.pool, Positioned::Category, store_id.as_i32()).await?;
        Ok(ids.into_iter().map(CategoryId::new).collect())
    }

    /// Write a validated, position-sorted reorder list.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if an ID vanished concurrently.
    pub async fn reorder(
        &self,
        store_id: StoreId,
        sorted: &[PositionUpdate<CategoryId>],
    ) -> Result<(), RepositoryError> {
        write_positions(self.pool, Positioned::Category, store_id.as_i32(), sorted).await
    }
}
