//! Data models shared across the session store and API handlers.

use serde::Serialize;

/// Zero-based page request, already clamped by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub page: i64,
    pub size: i64,
}

impl PageRequest {
    /// Builds a request from raw client input, applying defaults and the size ceiling.
    pub fn clamped(page: Option<i64>, size: Option<i64>, default_size: i64, max_size: i64) -> Self {
        let page = page.filter(|p| *p >= 0).unwrap_or(0);
        let size = size
            .filter(|s| *s > 0)
            .unwrap_or(default_size)
            .clamp(1, max_size.max(1));
        Self { page, size }
    }

    pub fn offset(&self) -> i64 {
        self.page.saturating_mul(self.size)
    }
}

/// One page of results plus totals.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
    pub content: Vec<T>,
    pub page: i64,
    pub size: i64,
    pub total_elements: i64,
    pub total_pages: i64,
}

impl<T> Page<T> {
    pub fn new(content: Vec<T>, request: PageRequest, total_elements: i64) -> Self {
        let total_pages = if request.size > 0 {
            (total_elements + request.size - 1) / request.size
        } else {
            0
        };
        Self {
            content,
            page: request.page,
            size: request.size,
            total_elements,
            total_pages,
        }
    }

    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            content: self.content.into_iter().map(f).collect(),
            page: self.page,
            size: self.size,
            total_elements: self.total_elements,
            total_pages: self.total_pages,
        }
    }
}

pub mod session;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_request_applies_defaults_and_ceiling() {
        assert_eq!(
            PageRequest::clamped(None, None, 20, 100),
            PageRequest { page: 0, size: 20 }
        );
        assert_eq!(
            PageRequest::clamped(Some(-3), Some(0), 20, 100),
            PageRequest { page: 0, size: 20 }
        );
        assert_eq!(
            PageRequest::clamped(Some(2), Some(500), 20, 100),
            PageRequest { page: 2, size: 100 }
        );
        assert_eq!(PageRequest { page: 2, size: 15 }.offset(), 30);
    }

    #[test]
    fn page_counts_total_pages() {
        let page = Page::new(vec![1, 2], PageRequest { page: 0, size: 2 }, 5);
        assert_eq!(page.total_pages, 3);
        let empty: Page<i32> = Page::new(vec![], PageRequest { page: 0, size: 20 }, 0);
        assert_eq!(empty.total_pages, 0);
    }
}
