//! Page/page_size query parameters and the paged result envelope.

use serde::{Deserialize, Serialize};

pub const MAX_PAGE_SIZE: u64 = 100;

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct PaginationParams {
    pub page: Option<u64>,
    pub page_size: Option<u64>,
}

impl PaginationParams {
    pub fn new(page: Option<u64>, page_size: Option<u64>) -> Self {
        Self { page, page_size }
    }

    /// 1-based page, never below 1.
    pub fn page(&self) -> u64 {
        self.page.unwrap_or(1).max(1)
    }

    /// Page size with the listing's own default, clamped to `1..=MAX_PAGE_SIZE`.
    pub fn page_size_or(&self, default: u64) -> u64 {
        self.page_size.unwrap_or(default).clamp(1, MAX_PAGE_SIZE)
    }

    /// Rows to skip, capped at `i64::MAX` so huge page numbers stay a valid SQL offset.
    pub fn offset(&self, default_size: u64) -> u64 {
        (self.page() - 1)
            .saturating_mul(self.page_size_or(default_size))
            .min(i64::MAX as u64)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PaginatedResponse<T> {
    pub items: Vec<T>,
    pub page: u64,
    pub page_size: u64,
    pub total: u64,
    pub total_pages: u64,
}

impl<T> PaginatedResponse<T> {
    pub fn new(items: Vec<T>, page: u64, page_size: u64, total: u64) -> Self {
        let total_pages = total.div_ceil(page_size.max(1));
        Self {
            items,
            page,
            page_size,
            total,
            total_pages,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_depend_on_listing() {
        let params = PaginationParams::default();
        assert_eq!(params.page(), 1);
        assert_eq!(params.page_size_or(10), 10);
        assert_eq!(params.page_size_or(20), 20);
        assert_eq!(params.offset(20), 0);
    }

    #[test]
    fn test_out_of_range_values_are_clamped() {
        let params = PaginationParams::new(Some(0), Some(1000));
        assert_eq!(params.page(), 1);
        assert_eq!(params.page_size_or(10), MAX_PAGE_SIZE);

        let params = PaginationParams::new(Some(3), Some(0));
        assert_eq!(params.page_size_or(10), 1);
        assert_eq!(params.offset(10), 2);

        let params = PaginationParams::new(Some(u64::MAX), None);
        assert_eq!(params.offset(20), i64::MAX as u64);
    }

    #[test]
    fn test_total_pages() {
        let r = PaginatedResponse::new(vec![1, 2, 3], 2, 10, 25);
        assert_eq!(r.total_pages, 3);
        let r: PaginatedResponse<i32> = PaginatedResponse::new(vec![], 1, 10, 0);
        assert_eq!(r.total_pages, 0);
    }
}
