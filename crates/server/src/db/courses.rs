//! Course, chapter and section repository.
//!
//! Chapters and sections have no store column of their own; store
//! ownership is checked by joining up to the course.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::PgPool;

use bazaar_core::{ChapterId, CourseId, PositionUpdate, SectionId, SectionKind, StoreId};

use super::{Positioned, RepositoryError, child_ids, next_position, write_positions};
use crate::models::course::{
    Chapter, Course, CourseDetail, CourseUpdate, NewCourse, Section,
};

const COURSE_COLUMNS: &str =
    "id, store_id, title, description, price, published, created_at, updated_at";
const CHAPTER_COLUMNS: &str = "ch.id, ch.course_id, ch.title, ch.position";
const SECTION_COLUMNS: &str =
    "se.id, se.chapter_id, se.kind, se.title, se.body, se.video_url, se.position";

#[derive(sqlx::FromRow)]
struct CourseRow {
    id: i32,
    store_id: i32,
    title: String,
    description: String,
    price: Decimal,
    published: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<CourseRow> for Course {
    fn from(row: CourseRow) -> Self {
        Self {
            id: CourseId::new(row.id),
            store_id: StoreId::new(row.store_id),
            title: row.title,
            description: row.description,
            price: row.price,
            published: row.published,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct ChapterRow {
    id: i32,
    course_id: i32,
    title: String,
    position: i32,
}

impl From<ChapterRow> for Chapter {
    fn from(row: ChapterRow) -> Self {
        Self {
            id: ChapterId::new(row.id),
            course_id: CourseId::new(row.course_id),
            title: row.title,
            position: row.position,
        }
    }
}

#[derive(sqlx::FromRow)]
struct SectionRow {
    id: i32,
    chapter_id: i32,
    kind: SectionKind,
    title: String,
    body: Option<String>,
    video_url: Option<String>,
    position: i32,
}

impl From<SectionRow> for Section {
    fn from(row: SectionRow) -> Self {
        Self {
            id: SectionId::new(row.id),
            chapter_id: ChapterId::new(row.chapter_id),
            kind: row.kind,
            title: row.title,
            body: row.body,
            video_url: row.video_url,
            position: row.position,
        }
    }
}

/// Repository for course content.
pub struct CourseRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> CourseRepository<'a> {
    /// Create a new course repository.
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    // =========================================================================
    // Courses
    // =========================================================================

    /// Courses of a store, newest first.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn list(
        &self,
        store_id: StoreId,
        published_only: bool,
    ) -> Result<Vec<Course>, RepositoryError> {
        let sql = format!(
            "SELECT {COURSE_COLUMNS} FROM bazaar.course \
             WHERE store_id = $1 AND (published OR NOT $2) \
             ORDER BY created_at DESC, id DESC"
        );
        let rows = sqlx::query_as::<_, CourseRow>(&sql)
            .bind(store_id)
            .bind(published_only)
            .fetch_all(self.pool)
            .await?;
        Ok(rows.into_iter().map(Course::from).collect())
    }

    /// Get a course of a store.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get(
        &self,
        store_id: StoreId,
        id: CourseId,
        published_only: bool,
    ) -> Result<Option<Course>, RepositoryError> {
        let sql = format!(
            "SELECT {COURSE_COLUMNS} FROM bazaar.course \
             WHERE store_id = $1 AND id = $2 AND (published OR NOT $3)"
        );
        let row = sqlx::query_as::<_, CourseRow>(&sql)
            .bind(store_id)
            .bind(id)
            .bind(published_only)
            .fetch_optional(self.pool)
            .await?;
        Ok(row.map(Course::from))
    }

    /// A course with its chapters and sections in position order.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if a query fails.
    pub async fn detail(&self, course: Course) -> Result<CourseDetail, RepositoryError> {
        let chapters = self.chapters(course.id).await?;

        let sql = format!(
            "SELECT {SECTION_COLUMNS} FROM bazaar.section se \
             JOIN bazaar.chapter ch ON ch.id = se.chapter_id \
             WHERE ch.course_id = $1 ORDER BY se.position, se.id"
        );
        let sections = sqlx::query_as::<_, SectionRow>(&sql)
            .bind(course.id)
            .fetch_all(self.pool)
            .await?
            .into_iter()
            .map(Section::from)
            .collect();

        Ok(CourseDetail::assemble(course, chapters, sections))
    }

    /// Create a course.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the insert fails.
    pub async fn create(
        &self,
        store_id: StoreId,
        course: &NewCourse,
    ) -> Result<Course, RepositoryError> {
        let sql = format!(
            r"
            INSERT INTO bazaar.course (store_id, title, description, price, published)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING {COURSE_COLUMNS}
            "
        );
        let row = sqlx::query_as::<_, CourseRow>(&sql)
            .bind(store_id)
            .bind(&course.title)
            .bind(&course.description)
            .bind(course.price)
            .bind(course.published)
            .fetch_one(self.pool)
            .await?;
        Ok(Course::from(row))
    }

    /// Apply a partial update to a course.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the course is not in the store.
    pub async fn update(
        &self,
        store_id: StoreId,
        id: CourseId,
        update: &CourseUpdate,
    ) -> Result<Course, RepositoryError> {
        let sql = format!(
            r"
            UPDATE bazaar.course SET
                title = COALESCE($3, title),
                description = COALESCE($4, description),
                price = COALESCE($5, price),
                published = COALESCE($6, published),
                updated_at = NOW()
            WHERE store_id = $1 AND id = $2
            RETURNING {COURSE_COLUMNS}
            "
        );
        let row = sqlx::query_as::<_, CourseRow>(&sql)
            .bind(store_id)
            .bind(id)
            .bind(update.title.as_deref())
            .bind(update.description.as_deref())
            .bind(update.price)
            .bind(update.published)
            .fetch_optional(self.pool)
            .await?
            .ok_or(RepositoryError::NotFound)?;
        Ok(Course::from(row))
    }

    /// Delete a course with all of its chapters and sections.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the course is not in the store.
    pub async fn delete(&self, store_id: StoreId, id: CourseId) -> Result<(), RepositoryError> {
        let result = sqlx::query("DELETE FROM bazaar.course WHERE store_id = $1 AND id = $2")
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
    // Chapters
    // =========================================================================

    /// Chapters of a course in position order.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn chapters(&self, course_id: CourseId) -> Result<Vec<Chapter>, RepositoryError> {
        let sql = format!(
            "SELECT {CHAPTER_COLUMNS} FROM bazaar.chapter ch \
             WHERE ch.course_id = $1 ORDER BY ch.position, ch.id"
        );
        let rows = sqlx::query_as::<_, ChapterRow>(&sql)
            .bind(course_id)
            .fetch_all(self.pool)
            .await?;
        Ok(rows.into_iter().map(Chapter::from).collect())
    }

    /// Get a chapter if its course belongs to `store_id`.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get_chapter(
        &self,
        store_id: StoreId,
        id: ChapterId,
    ) -> Result<Option<Chapter>, RepositoryError> {
        let sql = format!(
            "SELECT {CHAPTER_COLUMNS} FROM bazaar.chapter ch \
             JOIN bazaar.course c ON c.id = ch.course_id \
             WHERE c.store_id = $1 AND ch.id = $2"
        );
        let row = sqlx::query_as::<_, ChapterRow>(&sql)
            .bind(store_id)
            .bind(id)
            .fetch_optional(self.pool)
            .await?;
        Ok(row.map(Chapter::from))
    }

    /// Append a chapter to a course.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the insert fails.
    pub async fn create_chapter(
        &self,
        course_id: CourseId,
        title: &str,
    ) -> Result<Chapter, RepositoryError> {
        let mut tx = self.pool.begin().await?;
        let position = next_position(&mut tx, Positioned::Chapter, course_id.as_i32()).await?;
        let row = sqlx::query_as::<_, ChapterRow>(
            r"
            INSERT INTO bazaar.chapter AS ch (course_id, title, position)
            VALUES ($1, $2, $3)
            RETURNING ch.id, ch.course_id, ch.title, ch.position
            ",
        )
        .bind(course_id)
        .bind(title)
        .bind(position)
        .fetch_one(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(Chapter::from(row))
    }

    /// Rename a chapter.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the chapter does not exist.
    pub async fn rename_chapter(
        &self,
        id: ChapterId,
        title: &str,
    ) -> Result<Chapter, RepositoryError> {
        let row = sqlx::query_as::<_, ChapterRow>(
            r"
            UPDATE bazaar.chapter AS ch SET title = $2 WHERE ch.id = $1
            RETURNING ch.id, ch.course_id, ch.title, ch.position
            ",
        )
        .bind(id)
        .bind(title)
        .fetch_optional(self.pool)
        .await?
        .ok_or(RepositoryError::NotFound)?;
        Ok(Chapter::from(row))
    }

    /// Delete a chapter and its sections.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the chapter does not exist.
    pub async fn delete_chapter(&self, id: ChapterId) -> Result<(), RepositoryError> {
        let result = sqlx::query("DELETE FROM bazaar.chapter WHERE id = $1")
            .bind(id)
            .execute(self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }

    /// IDs of a course's chapters.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn chapter_ids(&self, course_id: CourseId) -> Result<Vec<ChapterId>, RepositoryError> {
        let ids = child_ids(self.pool, Positioned::Chapter, course_id.as_i32()).await?;
        Ok(ids.into_iter().map(ChapterId::new).collect())
    }

    /// Write a validated, position-sorted chapter order.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if a chapter vanished concurrently.
    pub async fn reorder_chapters(
        &self,
        course_id: CourseId,
        sorted: &[PositionUpdate<ChapterId>],
    ) -> Result<(), RepositoryError> {
        write_positions(self.pool, Positioned::Chapter, course_id.as_i32(), sorted).await
    }

    // =========================================================================
    // Sections
    // =========================================================================

    /// Get a section if its course belongs to `store_id`.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get_section(
        &self,
        store_id: StoreId,
        id: SectionId,
    ) -> Result<Option<Section>, RepositoryError> {
        let sql = format!(
            "SELECT {SECTION_COLUMNS} FROM bazaar.section se \
             JOIN bazaar.chapter ch ON ch.id = se.chapter_id \
             JOIN bazaar.course c ON c.id = ch.course_id \
             WHERE c.store_id = $1 AND se.id = $2"
        );
        let row = sqlx::query_as::<_, SectionRow>(&sql)
            .bind(store_id)
            .bind(id)
            .fetch_optional(self.pool)
            .await?;
        Ok(row.map(Section::from))
    }

    /// Append a section to a chapter. Content must already be validated.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the insert fails.
    pub async fn create_section(
        &self,
        chapter_id: ChapterId,
        kind: SectionKind,
        title: &str,
        body: Option<&str>,
        video_url: Option<&str>,
    ) -> Result<Section, RepositoryError> {
        let mut tx = self.pool.begin().await?;
        let position = next_position(&mut tx, Positioned::Section, chapter_id.as_i32()).await?;
        let sql = format!(
            r"
            INSERT INTO bazaar.section AS se (chapter_id, kind, title, body, video_url, position)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING {SECTION_COLUMNS}
            "
        );
        let row = sqlx::query_as::<_, SectionRow>(&sql)
            .bind(chapter_id)
            .bind(kind)
            .bind(title)
            .bind(body)
            .bind(video_url)
            .bind(position)
            .fetch_one(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(Section::from(row))
    }

    /// Overwrite a section's title and content.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the section does not exist.
    pub async fn update_section(
        &self,
        id: SectionId,
        title: &str,
        body: Option<&str>,
        video_url: Option<&str>,
    ) -> Result<Section, RepositoryError> {
        let sql = format!(
            r"
            UPDATE bazaar.section AS se SET title = $2, body = $3, video_url = $4
            WHERE se.id = $1
            RETURNING {SECTION_COLUMNS}
            "
        );
        let row = sqlx::query_as::<_, SectionRow>(&sql)
            .bind(id)
            .bind(title)
            .bind(body)
            .bind(video_url)
            .fetch_optional(self.pool)
            .await?
            .ok_or(RepositoryError::NotFound)?;
        Ok(Section::from(row))
    }

    /// Delete a section.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the section does not exist.
    pub async fn delete_section(&self, id: SectionId) -> Result<(), RepositoryError> {
        let result = sqlx::query("DELETE FROM bazaar.section WHERE id = $1")
            .bind(id)
            .execute(self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }

    /// IDs of a chapter's sections.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn section_ids(
        &self,
        chapter_id: ChapterId,
    ) -> Result<Vec<SectionId>, RepositoryError> {
        let ids = child_ids(self.pool, Positioned::Section, chapter_id.as_i32()).await?;
        Ok(ids.into_iter().map(SectionId::new).collect())
    }

    /// Write a validated, position-sorted section order.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if a section vanished concurrently.
    pub async fn reorder_sections(
        &self,
        chapter_id: ChapterId,
        sorted: &[PositionUpdate<SectionId>],
    ) -> Result<(), RepositoryError> {
        write_positions(self.pool, Positioned::Section, chapter_id.as_i32(), sorted).await
    }
}
