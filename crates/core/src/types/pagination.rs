//! Offset pagination for list endpoints.

use serde::{Deserialize, Serialize};

/// Page request parsed from `?page=&per_page=` query parameters.
///
/// Missing or out-of-range values are clamped rather than rejected: `page`
/// is at least 1 and `per_page` falls in `1..=MAX_PER_PAGE`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
pub struct PageRequest {
    #[serde(default)]
    page: Option<u32>,
    #[serde(default)]
    per_page: Option<u32>,
}

impl PageRequest {
    /// Items per page when the client does not ask for a size.
    pub const DEFAULT_PER_PAGE: u32 = 20;
    /// Upper bound on items per page.
    pub const MAX_PER_PAGE: u32 = 100;

    /// Create a page request.
    #[must_use]
    pub const fn new(page: u32, per_page: u32) -> Self {
        Self {
            page: Some(page),
            per_page: Some(per_page),
        }
    }

    /// One-based page number.
    #[must_use]
    pub fn page(&self) -> u32 {
        self.page.unwrap_or(1).max(1)
    }

    /// Clamped page size.
    #[must_use]
    pub fn per_page(&self) -> u32 {
        self.per_page
            .unwrap_or(Self::DEFAULT_PER_PAGE)
            .clamp(1, Self::MAX_PER_PAGE)
    }

    /// SQL `LIMIT`.
    #[must_use]
    pub fn limit(&self) -> i64 {
        i64::from(self.per_page())
    }

    /// SQL `OFFSET`.
    #[must_use]
    pub fn offset(&self) -> i64 {
        i64::from(self.page() - 1) * self.limit()
    }
}

/// One page of results.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Page<T> {
    /// Items on this page.
    pub items: Vec<T>,
    /// One-based page number.
    pub page: u32,
    /// Requested page size.
    pub per_page: u32,
    /// Total matching items across all pages.
    pub total: i64,
    /// Number of pages (0 when there are no items).
    pub total_pages: i64,
}

impl<T> Page<T> {
    /// Build a page from the items of one query and the total count of another.
    #[must_use]
    pub fn new(items: Vec<T>, request: PageRequest, total: i64) -> Self {
        let per_page = i64::from(request.per_page());
        let total = total.max(0);
        Self {
            items,
            page: request.page(),
            per_page: request.per_page(),
            total,
            total_pages: (total + per_page - 1) / per_page,
        }
    }

    /// Convert the items while keeping the paging metadata.
    #[must_use]
    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            items: self.items.into_iter().map(f).collect(),
            page: self.page,
            per_page: self.per_page,
            total: self.total,
            total_pages: self.total_pages,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let request = PageRequest::default();
        assert_eq!(request.page(), 1);
        assert_eq!(request.per_page(), 20);
        assert_eq!(request.offset(), 0);
    }

    #[test]
    fn test_clamping() {
        let request = PageRequest::new(0, 1000);
        assert_eq!(request.page(), 1);
        assert_eq!(request.per_page(), 100);

        let request = PageRequest::new(3, 0);
        assert_eq!(request.per_page(), 1);
        assert_eq!(request.offset(), 2);
    }

    #[test]
    fn test_offset() {
        assert_eq!(PageRequest::new(4, 25).offset(), 75);
    }

    #[test]
    fn test_total_pages() {
        let page = Page::new(vec![1, 2], PageRequest::new(1, 20), 41);
        assert_eq!(page.total_pages, 3);

        let empty: Page<i32> = Page::new(vec![], PageRequest::default(), 0);
        assert_eq!(empty.total_pages, 0);
    }

    #[test]
    fn test_deserialize_from_query() {
        let request: PageRequest = serde_json::from_str(r#"{"page": 2}"#).unwrap();
        assert_eq!(request.page(), 2);
        assert_eq!(request.per_page(), 20);
    }
}
