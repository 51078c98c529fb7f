//! Pagination primitives shared by list endpoints and stores.

use serde::{Deserialize, Serialize};

const DEFAULT_PAGE_SIZE: u32 = 20;
const MAX_PAGE_SIZE: u32 = 100;

/// Page request (1-based page number) with an optional free-text search term.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageRequest {
    #[serde(default = "default_page")]
    pub page: u32,
    #[serde(default = "default_size")]
    pub size: u32,
    #[serde(default)]
    pub search: Option<String>,
}

fn default_page() -> u32 {
    1
}

fn default_size() -> u32 {
    DEFAULT_PAGE_SIZE
}

impl Default for PageRequest {
    fn default() -> Self {
        Self {
            page: default_page(),
            size: default_size(),
            search: None,
        }
    }
}

impl PageRequest {
    pub fn new(page: u32, size: u32) -> Self {
        Self {
            page,
            size,
            search: None,
        }
    }

    pub fn with_search(mut self, search: impl Into<String>) -> Self {
        self.search = Some(search.into());
        self
    }

    /// Clamp page to `>= 1` and size to `1..=100`.
    pub fn normalized(&self) -> Self {
        Self {
            page: self.page.max(1),
            size: self.size.clamp(1, MAX_PAGE_SIZE),
            search: self
                .search
                .as_ref()
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty()),
        }
    }

    pub fn offset(&self) -> usize {
        let n = self.normalized();
        (n.page as usize - 1) * n.size as usize
    }

    pub fn limit(&self) -> usize {
        self.normalized().size as usize
    }

    /// Case-insensitive substring match against the search term (no term matches everything).
    pub fn matches(&self, fields: &[Option<&str>]) -> bool {
        let Some(term) = self.normalized().search else {
            return true;
        };
        let term = term.to_lowercase();
        fields
            .iter()
            .flatten()
            .any(|f| f.to_lowercase().contains(&term))
    }
}

/// One page of results.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Page<T> {
    pub results: Vec<T>,
    pub total: usize,
    pub page: u32,
    pub size: u32,
    pub pages: usize,
}

impl<T> Page<T> {
    /// Slice an already filtered and ordered collection.
    pub fn from_vec(all: Vec<T>, request: &PageRequest) -> Self {
        let total = all.len();
        let results = all
            .into_iter()
            .skip(request.offset())
            .take(request.limit())
            .collect();
        Self::from_parts(results, total, request)
    }

    /// Build a page from a pre-sliced result set and the total row count.
    pub fn from_parts(results: Vec<T>, total: usize, request: &PageRequest) -> Self {
        let n = request.normalized();
        Self {
            results,
            total,
            page: n.page,
            size: n.size,
            pages: total.div_ceil(n.size as usize),
        }
    }

    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            results: self.results.into_iter().map(f).collect(),
            total: self.total,
            page: self.page,
            size: self.size,
            pages: self.pages,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pages_are_sliced_and_counted() {
        let page = Page::from_vec((1..=45).collect::<Vec<_>>(), &PageRequest::new(3, 20));
        assert_eq!(page.results, vec![41, 42, 43, 44, 45]);
        assert_eq!(page.total, 45);
        assert_eq!(page.pages, 3);
    }

    #[test]
    fn out_of_range_requests_are_clamped() {
        let req = PageRequest::new(0, 500).normalized();
        assert_eq!(req.page, 1);
        assert_eq!(req.size, 100);
    }

    #[test]
    fn search_matches_any_field_case_insensitively() {
        let req = PageRequest::default().with_search("ALI");
        assert!(req.matches(&[Some("bob"), Some("alice@example.com")]));
        assert!(!req.matches(&[Some("bob"), None]));
        assert!(PageRequest::default().matches(&[None]));
    }
}
