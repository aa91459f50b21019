//! Shared API envelope types

use serde::{Deserialize, Serialize};

/// Error body returned by every failing endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorResponse {
    pub error: ErrorDetail,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorDetail {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ErrorResponse {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: ErrorDetail {
                code: code.into(),
                message: message.into(),
                details: None,
            },
        }
    }
}

/// `{ "ok": true }`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OkResponse {
    pub ok: bool,
}

impl OkResponse {
    pub fn ok() -> Self {
        Self { ok: true }
    }
}

/// `{ "items": [...] }` without paging information
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ItemsResponse<T> {
    pub items: Vec<T>,
}

// =============================================================================
// Pagination
// =============================================================================

pub const DEFAULT_PAGE_SIZE: i64 = 10;
pub const MAX_PAGE_SIZE: i64 = 200;
/// Pages beyond this are empty for any realistic table
pub const MAX_PAGE: i64 = 1_000_000;

/// Normalized page/pageSize pair shared by list endpoints
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub page: i64,
    pub page_size: i64,
}

impl PageRequest {
    pub fn new(page: Option<i64>, page_size: Option<i64>) -> Self {
        Self {
            page: page.unwrap_or(1).clamp(1, MAX_PAGE),
            page_size: page_size.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE),
        }
    }

    pub fn limit(&self) -> i64 {
        self.page_size
    }

    pub fn offset(&self) -> i64 {
        (self.page - 1).saturating_mul(self.page_size)
    }
}

/// Paginated list response
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Paginated<T> {
    pub items: Vec<T>,
    pub total: i64,
    pub page: i64,
    pub page_size: i64,
    pub total_pages: i64,
}

impl<T> Paginated<T> {
    pub fn new(items: Vec<T>, total: i64, page: PageRequest) -> Self {
        let total_pages = if total == 0 {
            0
        } else {
            (total + page.page_size - 1) / page.page_size
        };
        Self {
            items,
            total,
            page: page.page,
            page_size: page.page_size,
            total_pages,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_request_defaults() {
        let page = PageRequest::new(None, None);
        assert_eq!(page.page, 1);
        assert_eq!(page.page_size, 10);
        assert_eq!(page.offset(), 0);
    }

    #[test]
    fn test_page_request_clamps_invalid_values() {
        let page = PageRequest::new(Some(0), Some(10_000));
        assert_eq!(page.page, 1);
        assert_eq!(page.page_size, MAX_PAGE_SIZE);
    }

    #[test]
    fn test_page_request_huge_page_keeps_offset_in_range() {
        let page = PageRequest::new(Some(i64::MAX), Some(100));
        assert_eq!(page.page, MAX_PAGE);
        assert_eq!(page.offset(), (MAX_PAGE - 1) * 100);

        let page = PageRequest::new(Some(i64::MIN), Some(i64::MAX));
        assert_eq!(page.offset(), 0);
    }

    #[test]
    fn test_paginated_total_pages_rounds_up() {
        let page = PageRequest::new(Some(2), Some(10));
        let list = Paginated::new(vec![1, 2, 3], 21, page);
        assert_eq!(list.total_pages, 3);
        assert_eq!(page.offset(), 10);
    }

    #[test]
    fn test_error_response_shape() {
        let body = ErrorResponse::new("NOT_FOUND", "供应商不存在");
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["error"]["code"], "NOT_FOUND");
        assert!(json["error"].get("details").is_none());
    }
}
