//! Course content: courses, chapters and sections.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;

use bazaar_core::{ChapterId, CourseId, SectionId, SectionKind, StoreId};

/// A course sold by a store.
#[derive(Debug, Clone, Serialize)]
pub struct Course {
    pub id: CourseId,
    pub store_id: StoreId,
    pub title: String,
    pub description: String,
    pub price: Decimal,
    /// Unpublished courses are only visible on the dashboard.
    pub published: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fields of a new course.
#[derive(Debug, Clone)]
pub struct NewCourse {
    pub title: String,
    pub description: String,
    pub price: Decimal,
    pub published: bool,
}

/// Partial update of a course. `None` leaves a field unchanged.
#[derive(Debug, Clone, Default)]
pub struct CourseUpdate {
    pub title: Option<String>,
    pub description: Option<String>,
    pub price: Option<Decimal>,
    pub published: Option<bool>,
}

/// A chapter of a course.
#[derive(Debug, Clone, Serialize)]
pub struct Chapter {
    pub id: ChapterId,
    pub course_id: CourseId,
    pub title: String,
    pub position: i32,
}

/// A blog post or video inside a chapter.
#[derive(Debug, Clone, Serialize)]
pub struct Section {
    pub id: SectionId,
    pub chapter_id: ChapterId,
    pub kind: SectionKind,
    pub title: String,
    /// Markdown body (blog sections).
    pub body: Option<String>,
    /// Video URL (video sections).
    pub video_url: Option<String>,
    pub position: i32,
}

/// A chapter with its sections, in position order.
#[derive(Debug, Clone, Serialize)]
pub struct ChapterDetail {
    #[serde(flatten)]
    pub chapter: Chapter,
    pub sections: Vec<Section>,
}

/// A course with its full outline.
#[derive(Debug, Clone, Serialize)]
pub struct CourseDetail {
    #[serde(flatten)]
    pub course: Course,
    pub chapters: Vec<ChapterDetail>,
}

impl CourseDetail {
    /// Group sections under their chapters, keeping both in position order.
    #[must_use]
    pub fn assemble(course: Course, chapters: Vec<Chapter>, sections: Vec<Section>) -> Self {
        let mut chapters: Vec<ChapterDetail> = chapters
            .into_iter()
            .map(|chapter| ChapterDetail {
                chapter,
                sections: Vec::new(),
            })
            .collect();
        chapters.sort_by_key(|c| (c.chapter.position, c.chapter.id.as_i32()));

        for section in sections {
            if let Some(chapter) = chapters
                .iter_mut()
                .find(|c| c.chapter.id == section.chapter_id)
            {
                chapter.sections.push(section);
            }
        }
        for chapter in &mut chapters {
            chapter
                .sections
                .sort_by_key(|s| (s.position, s.id.as_i32()));
        }

        Self { course, chapters }
    }
}

/// Check that a section carries the content its kind needs.
///
/// # Errors
///
/// Returns a message when a blog section has no body or a video section has
/// no URL.
pub fn validate_section_content(
    kind: SectionKind,
    body: Option<&str>,
    video_url: Option<&str>,
) -> Result<(), &'static str> {
    let present = |s: Option<&str>| s.is_some_and(|s| !s.trim().is_empty());
    match kind {
        SectionKind::Blog if !present(body) => Err("blog sections need a body"),
        SectionKind::Video if !present(video_url) => Err("video sections need a video_url"),
        SectionKind::Video => video_url
            .map(str::trim)
            .and_then(|u| url::Url::parse(u).ok())
            .filter(|u| matches!(u.scheme(), "http" | "https"))
            .map(|_| ())
            .ok_or("video_url must be an http(s) URL"),
        SectionKind::Blog => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn section(id: i32, chapter: i32, position: i32) -> Section {
        Section {
            id: SectionId::new(id),
            chapter_id: ChapterId::new(chapter),
            kind: SectionKind::Blog,
            title: format!("Section {id}"),
            body: Some("text".to_string()),
            video_url: None,
            position,
        }
    }

    #[test]
    fn test_assemble_groups_and_orders() {
        let course = Course {
            id: CourseId::new(1),
            store_id: StoreId::new(1),
            title: "Pottery".to_string(),
            description: String::new(),
            price: Decimal::ZERO,
            published: true,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        let chapters = vec![
            Chapter {
                id: ChapterId::new(2),
                course_id: CourseId::new(1),
                title: "Glazing".to_string(),
                position: 1,
            },
            Chapter {
                id: ChapterId::new(1),
                course_id: CourseId::new(1),
                title: "Clay".to_string(),
                position: 0,
            },
        ];
        let sections = vec![section(10, 2, 1), section(11, 2, 0), section(12, 1, 0)];

        let detail = CourseDetail::assemble(course, chapters, sections);
        assert_eq!(detail.chapters[0].chapter.title, "Clay");
        assert_eq!(detail.chapters[0].sections.len(), 1);
        let glazing: Vec<i32> = detail.chapters[1]
            .sections
            .iter()
            .map(|s| s.id.as_i32())
            .collect();
        assert_eq!(glazing, vec![11, 10]);
    }

    #[test]
    fn test_section_content_rules() {
        assert!(validate_section_content(SectionKind::Blog, Some("hi"), None).is_ok());
        assert!(validate_section_content(SectionKind::Blog, Some("  "), None).is_err());
        assert!(validate_section_content(SectionKind::Video, None, Some("https://v.test/1")).is_ok());
        assert!(validate_section_content(SectionKind::Video, None, Some("ftp://v.test/1")).is_err());
        assert!(validate_section_content(SectionKind::Video, Some("body"), None).is_err());
    }
}
