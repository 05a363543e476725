//! Pagination for message history
//!
//! Offset based: a page fetched while new messages arrive may repeat or skip
//! rows relative to the previous page.

use serde::Serialize;

use crate::error::{Error, Result};

pub const DEFAULT_PAGE_SIZE: i64 = 20;
pub const MAX_PAGE_SIZE: i64 = 100;

/// Validated page request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    /// 1-indexed page number
    pub page: i64,
    pub page_size: i64,
}

impl PageRequest {
    /// Apply defaults and reject out-of-range values
    pub fn new(page: Option<i64>, page_size: Option<i64>) -> Result<Self> {
        let page = page.unwrap_or(1);
        let page_size = page_size.unwrap_or(DEFAULT_PAGE_SIZE);

        if page < 1 {
            return Err(Error::Validation(format!("page must be >= 1, got {}", page)));
        }
        if !(1..=MAX_PAGE_SIZE).contains(&page_size) {
            return Err(Error::Validation(format!(
                "page_size must be between 1 and {}, got {}",
                MAX_PAGE_SIZE, page_size
            )));
        }

        Ok(Self { page, page_size })
    }

    /// Offset for SQL LIMIT/OFFSET query
    pub fn offset(&self) -> i64 {
        (self.page - 1).saturating_mul(self.page_size)
    }
}

/// Pagination metadata returned alongside a page
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Pagination {
    pub page: i64,
    pub page_size: i64,
    pub total: i64,
    pub total_pages: i64,
}

/// Pages past the end are not clamped; they simply come back empty.
pub fn calculate_pagination(total_results: i64, request: PageRequest) -> Pagination {
    let total_pages = (total_results + request.page_size - 1) / request.page_size;

    Pagination {
        page: request.page,
        page_size: request.page_size,
        total: total_results,
        total_pages,
    }
}
