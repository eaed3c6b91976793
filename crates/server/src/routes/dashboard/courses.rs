//! Course content management: courses, chapters and sections.

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use rust_decimal::Decimal;
use serde::Deserialize;
use tracing::instrument;

use bazaar_core::{
    ChapterId, CourseId, PositionUpdate, SectionId, SectionKind, StoreId, ensure_same_members,
    round_cents, validate_reorder,
};

use super::{nullable, owned_store, required_text};
use crate::db::CourseRepository;
use crate::error::{AppError, Result};
use crate::middleware::RequireAuth;
use crate::models::course::{
    Chapter, Course, CourseDetail, CourseUpdate, NewCourse, Section, validate_section_content,
};
use crate::state::AppState;

const MAX_TITLE_LENGTH: usize = 200;

/// New course request body.
#[derive(Debug, Deserialize)]
pub struct CreateCourseRequest {
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub price: Decimal,
    #[serde(default)]
    pub published: bool,
}

/// Course PATCH body.
#[derive(Debug, Deserialize)]
pub struct UpdateCourseRequest {
    pub title: Option<String>,
    pub description: Option<String>,
    pub price: Option<Decimal>,
    pub published: Option<bool>,
}

/// Chapter create and rename body.
#[derive(Debug, Deserialize)]
pub struct ChapterRequest {
    pub title: String,
}

/// New section request body.
#[derive(Debug, Deserialize)]
pub struct CreateSectionRequest {
    pub kind: SectionKind,
    pub title: String,
    pub body: Option<String>,
    pub video_url: Option<String>,
}

/// Section PATCH body. The kind of a section cannot change.
#[derive(Debug, Deserialize)]
pub struct UpdateSectionRequest {
    pub title: Option<String>,
    #[serde(default, deserialize_with = "nullable")]
    pub body: Option<Option<String>>,
    #[serde(default, deserialize_with = "nullable")]
    pub video_url: Option<Option<String>>,
}

fn check_price(price: Decimal) -> Result<Decimal> {
    if price.is_sign_negative() {
        return Err(AppError::BadRequest("price cannot be negative".to_string()));
    }
    Ok(round_cents(price))
}

fn check_section(kind: SectionKind, body: Option<&str>, video_url: Option<&str>) -> Result<()> {
    validate_section_content(kind, body, video_url)
        .map_err(|msg| AppError::BadRequest(msg.to_string()))
}

fn trimmed(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_owned()).filter(|v| !v.is_empty())
}

async fn store_course(state: &AppState, store_id: StoreId, course_id: CourseId) -> Result<Course> {
    CourseRepository::new(state.pool())
        .get(store_id, course_id, false)
        .await?
        .ok_or_else(|| AppError::NotFound("course not found".to_string()))
}

async fn store_chapter(
    state: &AppState,
    store_id: StoreId,
    chapter_id: ChapterId,
) -> Result<Chapter> {
    CourseRepository::new(state.pool())
        .get_chapter(store_id, chapter_id)
        .await?
        .ok_or_else(|| AppError::NotFound("chapter not found".to_string()))
}

async fn store_section(
    state: &AppState,
    store_id: StoreId,
    section_id: SectionId,
) -> Result<Section> {
    CourseRepository::new(state.pool())
        .get_section(store_id, section_id)
        .await?
        .ok_or_else(|| AppError::NotFound("section not found".to_string()))
}

// =============================================================================
// Courses
// =============================================================================

/// All courses, drafts included.
///
/// GET /api/stores/{store_id}/courses
///
/// # Errors
///
/// Returns 403/404 per the store ownership rules.
pub async fn index(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    Path(store_id): Path<StoreId>,
) -> Result<Json<Vec<Course>>> {
    let store = owned_store(&state, &user, store_id).await?;
    Ok(Json(
        CourseRepository::new(state.pool())
            .list(store.id, false)
            .await?,
    ))
}

/// Create a course.
///
/// POST /api/stores/{store_id}/courses
///
/// # Errors
///
/// Returns 400 for a missing title or negative price.
#[instrument(skip(state, user, body))]
pub async fn create(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    Path(store_id): Path<StoreId>,
    Json(body): Json<CreateCourseRequest>,
) -> Result<impl IntoResponse> {
    let store = owned_store(&state, &user, store_id).await?;
    let course = NewCourse {
        title: required_text("title", &body.title, MAX_TITLE_LENGTH)?,
        description: body.description.trim().to_owned(),
        price: check_price(body.price)?,
        published: body.published,
    };

    let course = CourseRepository::new(state.pool())
        .create(store.id, &course)
        .await?;
    Ok((StatusCode::CREATED, Json(course)))
}

/// Course with its full outline.
///
/// GET /api/stores/{store_id}/courses/{course_id}
///
/// # Errors
///
/// Returns 404 if the course is not in the store.
pub async fn show(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    Path((store_id, course_id)): Path<(StoreId, CourseId)>,
) -> Result<Json<CourseDetail>> {
    let store = owned_store(&state, &user, store_id).await?;
    let course = store_course(&state, store.id, course_id).await?;
    Ok(Json(CourseRepository::new(state.pool()).detail(course).await?))
}

/// Update a course or publish it.
///
/// PATCH /api/stores/{store_id}/courses/{course_id}
///
/// # Errors
///
/// Returns 400 for invalid fields and 404 if the course is not in the store.
pub async fn update(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    Path((store_id, course_id)): Path<(StoreId, CourseId)>,
    Json(body): Json<UpdateCourseRequest>,
) -> Result<Json<Course>> {
    let store = owned_store(&state, &user, store_id).await?;
    let update = CourseUpdate {
        title: body
            .title
            .as_deref()
            .map(|t| required_text("title", t, MAX_TITLE_LENGTH))
            .transpose()?,
        description: body.description.map(|d| d.trim().to_owned()),
        price: body.price.map(check_price).transpose()?,
        published: body.published,
    };

    let course = CourseRepository::new(state.pool())
        .update(store.id, course_id, &update)
        .await?;
    Ok(Json(course))
}

/// Delete a course with all its chapters and sections.
///
/// DELETE /api/stores/{store_id}/courses/{course_id}
///
/// # Errors
///
/// Returns 404 if the course is not in the store.
pub async fn destroy(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    Path((store_id, course_id)): Path<(StoreId, CourseId)>,
) -> Result<StatusCode> {
    let store = owned_store(&state, &user, store_id).await?;
    CourseRepository::new(state.pool())
        .delete(store.id, course_id)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

// =============================================================================
// Chapters
// =============================================================================

/// Add a chapter at the end of the course.
///
/// POST /api/stores/{store_id}/courses/{course_id}/chapters
///
/// # Errors
///
/// Returns 404 if the course is not in the store.
pub async fn create_chapter(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    Path((store_id, course_id)): Path<(StoreId, CourseId)>,
    Json(body): Json<ChapterRequest>,
) -> Result<impl IntoResponse> {
    let store = owned_store(&state, &user, store_id).await?;
    let course = store_course(&state, store.id, course_id).await?;
    let title = required_text("title", &body.title, MAX_TITLE_LENGTH)?;

    let chapter = CourseRepository::new(state.pool())
        .create_chapter(course.id, &title)
        .await?;
    Ok((StatusCode::CREATED, Json(chapter)))
}

/// Rename a chapter.
///
/// PATCH /api/stores/{store_id}/chapters/{chapter_id}
///
/// # Errors
///
/// Returns 404 if the chapter is not in the store.
pub async fn update_chapter(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    Path((store_id, chapter_id)): Path<(StoreId, ChapterId)>,
    Json(body): Json<ChapterRequest>,
) -> Result<Json<Chapter>> {
    let store = owned_store(&state, &user, store_id).await?;
    let chapter = store_chapter(&state, store.id, chapter_id).await?;
    let title = required_text("title", &body.title, MAX_TITLE_LENGTH)?;

    Ok(Json(
        CourseRepository::new(state.pool())
            .rename_chapter(chapter.id, &title)
            .await?,
    ))
}

/// Delete a chapter and its sections.
///
/// DELETE /api/stores/{store_id}/chapters/{chapter_id}
///
/// # Errors
///
/// Returns 404 if the chapter is not in the store.
pub async fn delete_chapter(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    Path((store_id, chapter_id)): Path<(StoreId, ChapterId)>,
) -> Result<StatusCode> {
    let store = owned_store(&state, &user, store_id).await?;
    let chapter = store_chapter(&state, store.id, chapter_id).await?;
    CourseRepository::new(state.pool())
        .delete_chapter(chapter.id)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Set the order of every chapter in a course.
///
/// PUT /api/stores/{store_id}/courses/{course_id}/chapters/reorder
///
/// # Errors
///
/// Returns 400 unless the list names each chapter of the course once.
pub async fn reorder_chapters(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    Path((store_id, course_id)): Path<(StoreId, CourseId)>,
    Json(updates): Json<Vec<PositionUpdate<ChapterId>>>,
) -> Result<Json<Vec<Chapter>>> {
    let store = owned_store(&state, &user, store_id).await?;
    let course = store_course(&state, store.id, course_id).await?;
    let repo = CourseRepository::new(state.pool());

    let sorted = validate_reorder(&updates)?;
    ensure_same_members(&sorted, &repo.chapter_ids(course.id).await?)?;
    repo.reorder_chapters(course.id, &sorted).await?;

    Ok(Json(repo.chapters(course.id).await?))
}

// =============================================================================
// Sections
// =============================================================================

/// Add a blog or video section at the end of a chapter.
///
/// POST /api/stores/{store_id}/chapters/{chapter_id}/sections
///
/// # Errors
///
/// Returns 400 when a blog section has no body or a video section has no
/// valid URL.
pub async fn create_section(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    Path((store_id, chapter_id)): Path<(StoreId, ChapterId)>,
    Json(body): Json<CreateSectionRequest>,
) -> Result<impl IntoResponse> {
    let store = owned_store(&state, &user, store_id).await?;
    let chapter = store_chapter(&state, store.id, chapter_id).await?;

    let title = required_text("title", &body.title, MAX_TITLE_LENGTH)?;
    let text = trimmed(body.body);
    let video_url = trimmed(body.video_url);
    check_section(body.kind, text.as_deref(), video_url.as_deref())?;

    let section = CourseRepository::new(state.pool())
        .create_section(
            chapter.id,
            body.kind,
            &title,
            text.as_deref(),
            video_url.as_deref(),
        )
        .await?;
    Ok((StatusCode::CREATED, Json(section)))
}

/// Edit a section's title or content.
///
/// PATCH /api/stores/{store_id}/sections/{section_id}
///
/// # Errors
///
/// Returns 400 if the edit leaves the section without the content its kind
/// needs.
pub async fn update_section(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    Path((store_id, section_id)): Path<(StoreId, SectionId)>,
    Json(body): Json<UpdateSectionRequest>,
) -> Result<Json<Section>> {
    let store = owned_store(&state, &user, store_id).await?;
    let current = store_section(&state, store.id, section_id).await?;

    let title = match body.title.as_deref() {
        Some(title) => required_text("title", title, MAX_TITLE_LENGTH)?,
        None => current.title,
    };
    let text = body.body.map_or(current.body, trimmed);
    let video_url = body.video_url.map_or(current.video_url, trimmed);
    check_section(current.kind, text.as_deref(), video_url.as_deref())?;

    Ok(Json(
        CourseRepository::new(state.pool())
            .update_section(current.id, &title, text.as_deref(), video_url.as_deref())
            .await?,
    ))
}

/// Delete a section.
///
/// DELETE /api/stores/{store_id}/sections/{section_id}
///
/// # Errors
///
/// Returns 404 if the section is not in the store.
pub async fn delete_section(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    Path((store_id, section_id)): Path<(StoreId, SectionId)>,
) -> Result<StatusCode> {
    let store = owned_store(&state, &user, store_id).await?;
    let section = store_section(&state, store.id, section_id).await?;
    CourseRepository::new(state.pool())
        .delete_section(section.id)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Set the order of every section in a chapter.
///
/// PUT /api/stores/{store_id}/chapters/{chapter_id}/sections/reorder
///
/// # Errors
///
/// Returns 400 unless the list names each section of the chapter once.
pub async fn reorder_sections(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    Path((store_id, chapter_id)): Path<(StoreId, ChapterId)>,
    Json(updates): Json<Vec<PositionUpdate<SectionId>>>,
) -> Result<Json<Vec<Section>>> {
    let store = owned_store(&state, &user, store_id).await?;
    let chapter = store_chapter(&state, store.id, chapter_id).await?;
    let repo = CourseRepository::new(state.pool());

    let sorted = validate_reorder(&updates)?;
    ensure_same_members(&sorted, &repo.section_ids(chapter.id).await?)?;
    repo.reorder_sections(chapter.id, &sorted).await?;

    let detail = repo
        .detail(store_course(&state, store.id, chapter.course_id).await?)
        .await?;
    let sections = detail
        .chapters
        .into_iter()
        .find(|c| c.chapter.id == chapter.id)
        .map(|c| c.sections)
        .unwrap_or_default();
    Ok(Json(sections))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_trimmed() {
        assert_eq!(trimmed(Some("  ".to_string())), None);
        assert_eq!(trimmed(Some(" body ".to_string())), Some("body".to_string()));
        assert_eq!(trimmed(None), None);
    }

    #[test]
    fn test_check_section() {
        assert!(check_section(SectionKind::Blog, Some("Wedging clay"), None).is_ok());
        assert!(check_section(SectionKind::Video, None, None).is_err());
    }

    #[test]
    fn test_check_price() {
        assert_eq!(check_price(Decimal::new(4999, 2)).unwrap(), Decimal::new(4999, 2));
        assert!(check_price(Decimal::new(-1, 0)).is_err());
    }
}
