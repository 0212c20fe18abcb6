//! Shared Data Transfer Objects (DTOs) for API handlers.
//!
//! Common structs used across multiple API endpoints to keep list
//! request/response formats consistent.

use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

/// Largest accepted page size; larger requests are clamped.
const MAX_PER_PAGE: u32 = 100;

/// Pagination metadata for list responses.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct Pagination {
    /// Current page number (1-indexed)
    pub page: u32,
    /// Number of items per page
    pub per_page: u32,
    /// Total number of items across all pages
    pub total: i64,
    /// Total number of pages
    pub total_pages: u32,
}

impl Pagination {
    /// Create pagination from query parameters and total count.
    pub fn from_query_and_total(query: &PaginationQuery, total: i64) -> Self {
        let page = query.page();
        let per_page = query.per_page();
        let total_pages = if total == 0 {
            0
        } else {
            ((total as f64) / (per_page as f64)).ceil() as u32
        };

        Self {
            page,
            per_page,
            total,
            total_pages,
        }
    }
}

/// Query parameters for paginated list requests.
///
/// Can be used with `#[serde(flatten)]` in handler-specific query structs.
#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
pub struct PaginationQuery {
    /// Requested page number (default: 1)
    pub page: Option<u32>,
    /// Requested items per page (default: 20, maximum: 100)
    pub per_page: Option<u32>,
}

impl PaginationQuery {
    /// Page number, 1-indexed. Zero is treated as the first page.
    pub fn page(&self) -> u32 {
        self.page.unwrap_or(1).max(1)
    }

    /// Page size, clamped to `1..=100`.
    pub fn per_page(&self) -> u32 {
        self.per_page.unwrap_or(20).clamp(1, MAX_PER_PAGE)
    }

    /// SQL LIMIT value for this query.
    pub fn limit(&self) -> i64 {
        i64::from(self.per_page())
    }

    /// SQL OFFSET value for this query.
    pub fn offset(&self) -> i64 {
        i64::from(self.page() - 1) * self.limit()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // -----------------------------------------------------------------------
    // PaginationQuery
    // -----------------------------------------------------------------------

    #[test]
    fn test_pagination_query_defaults() {
        let query = PaginationQuery::default();
        assert_eq!(query.page(), 1);
        assert_eq!(query.per_page(), 20);
        assert_eq!(query.offset(), 0);
    }

    #[test]
    fn test_pagination_query_clamps() {
        let query = PaginationQuery {
            page: Some(0),
            per_page: Some(10_000),
        };
        assert_eq!(query.page(), 1);
        assert_eq!(query.per_page(), 100);

        let query = PaginationQuery {
            page: None,
            per_page: Some(0),
        };
        assert_eq!(query.per_page(), 1);
    }

    #[test]
    fn test_pagination_query_offset_math() {
        let query = PaginationQuery {
            page: Some(3),
            per_page: Some(25),
        };
        assert_eq!(query.limit(), 25);
        assert_eq!(query.offset(), 50);
    }

    // -----------------------------------------------------------------------
    // Pagination::from_query_and_total
    // -----------------------------------------------------------------------

    #[test]
    fn test_pagination_rounds_partial_pages_up() {
        let query = PaginationQuery {
            page: Some(1),
            per_page: Some(10),
        };
        let p = Pagination::from_query_and_total(&query, 25);
        assert_eq!(p.total, 25);
        assert_eq!(p.total_pages, 3);
    }

    #[test]
    fn test_pagination_zero_total_has_zero_pages() {
        let query = PaginationQuery::default();
        let p = Pagination::from_query_and_total(&query, 0);
        assert_eq!(p.total, 0);
        assert_eq!(p.total_pages, 0);
    }

    #[test]
    fn test_pagination_exact_division() {
        let query = PaginationQuery {
            page: Some(2),
            per_page: Some(10),
        };
        let p = Pagination::from_query_and_total(&query, 30);
        assert_eq!(p.page, 2);
        assert_eq!(p.total_pages, 3);
    }
}
