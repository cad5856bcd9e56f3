use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

pub mod admin;
pub mod auth;
pub mod book;
pub mod cart;
pub mod order;
pub mod user;

pub const DEFAULT_PAGE_SIZE: u32 = 10;
pub const MAX_PAGE_SIZE: u32 = 100;

/// Success envelope shared by every endpoint.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip)]
    status: u16,
}

impl<T> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            message: None,
            status: StatusCode::OK.as_u16(),
        }
    }

    pub fn created(data: T) -> Self {
        Self {
            status: StatusCode::CREATED.as_u16(),
            ..Self::ok(data)
        }
    }

    pub fn with_message<S: Into<String>>(mut self, message: S) -> Self {
        self.message = Some(message.into());
        self
    }
}

impl ApiResponse<()> {
    pub fn message<S: Into<String>>(message: S) -> Self {
        Self {
            success: true,
            data: None,
            message: Some(message.into()),
            status: StatusCode::OK.as_u16(),
        }
    }
}

impl<T: Serialize> IntoResponse for ApiResponse<T> {
    fn into_response(self) -> Response {
        let code = StatusCode::from_u16(self.status).unwrap_or(StatusCode::OK);
        (code, Json(self)).into_response()
    }
}

/// Body of responses that only carry a message.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PlainSuccessResponse {
    pub success: bool,
    pub message: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct PageQuery {
    /// 1-based page number.
    pub page: Option<u32>,
    /// Page size, capped at 100.
    pub limit: Option<u32>,
}

impl PageQuery {
    pub fn resolve(&self, default_limit: u32) -> (u32, u32) {
        let page = self.page.filter(|p| *p > 0).unwrap_or(1);
        let limit = self
            .limit
            .filter(|l| *l > 0)
            .unwrap_or(default_limit)
            .min(MAX_PAGE_SIZE);
        (page, limit)
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    pub current_page: u32,
    pub total_pages: u32,
    pub total_items: usize,
    pub has_next: bool,
    pub has_prev: bool,
}

/// Cuts one page out of an already filtered and sorted result set.
pub fn paginate<T>(items: Vec<T>, page: u32, limit: u32) -> (Vec<T>, Pagination) {
    let total = items.len();
    let limit = limit.max(1);
    let total_pages = total.div_ceil(limit as usize) as u32;
    let skip = (page.saturating_sub(1) as usize).saturating_mul(limit as usize);
    let items = items.into_iter().skip(skip).take(limit as usize).collect();

    (
        items,
        Pagination {
            current_page: page,
            total_pages,
            total_items: total,
            has_next: page < total_pages,
            has_prev: page > 1,
        },
    )
}

pub fn now_millis() -> u64 {
    chrono::Utc::now().timestamp_millis() as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn total_pages_rounds_up() {
        let (items, p) = paginate((0..25).collect::<Vec<_>>(), 3, 10);
        assert_eq!(items, vec![20, 21, 22, 23, 24]);
        assert_eq!(p.total_pages, 3);
        assert_eq!(p.total_items, 25);
        assert!(!p.has_next);
        assert!(p.has_prev);
    }

    #[test]
    fn page_never_exceeds_limit() {
        for limit in 1..8u32 {
            for page in 1..6u32 {
                let (items, p) = paginate((0..17).collect::<Vec<_>>(), page, limit);
                assert!(items.len() <= limit as usize);
                assert_eq!(p.total_pages, 17u32.div_ceil(limit));
            }
        }
    }

    #[test]
    fn empty_set_has_zero_pages() {
        let (items, p) = paginate(Vec::<u8>::new(), 1, 10);
        assert!(items.is_empty());
        assert_eq!(p.total_pages, 0);
        assert!(!p.has_next);
        assert!(!p.has_prev);
    }

    #[test]
    fn page_query_defaults_and_caps() {
        assert_eq!(PageQuery::default().resolve(12), (1, 12));
        let q = PageQuery {
            page: Some(0),
            limit: Some(500),
        };
        assert_eq!(q.resolve(10), (1, MAX_PAGE_SIZE));
    }
}
