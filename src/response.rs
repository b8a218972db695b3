use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

const DEFAULT_LIMIT: i64 = 10;
const MAX_LIMIT: i64 = 100;

/// ApiResponse
///
/// The success half of the response envelope shared by every endpoint:
/// `{"status": "success", "message": ..., "data": ...}`. `data` is omitted when empty.
/// Errors use the same shape through [`crate::error::AppError`].
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ApiResponse<T> {
    pub status: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn success(message: impl Into<String>, data: T) -> Self {
        Self {
            status: "success".to_string(),
            message: message.into(),
            data: Some(data),
        }
    }
}

impl ApiResponse<()> {
    /// An envelope without a payload (logout, deletes).
    pub fn message(message: impl Into<String>) -> Self {
        Self {
            status: "success".to_string(),
            message: message.into(),
            data: None,
        }
    }
}

/// Envelope paired with the status code it is sent with. Handlers return this so a
/// create can answer 201 while reads answer 200.
pub struct Reply<T>(pub StatusCode, pub ApiResponse<T>);

impl<T: Serialize> Reply<T> {
    pub fn ok(message: impl Into<String>, data: T) -> Self {
        Self(StatusCode::OK, ApiResponse::success(message, data))
    }

    pub fn created(message: impl Into<String>, data: T) -> Self {
        Self(StatusCode::CREATED, ApiResponse::success(message, data))
    }
}

impl Reply<()> {
    pub fn done(message: impl Into<String>) -> Self {
        Self(StatusCode::OK, ApiResponse::message(message))
    }
}

impl<T: Serialize> IntoResponse for Reply<T> {
    fn into_response(self) -> Response {
        (self.0, Json(self.1)).into_response()
    }
}

// --- Pagination ---

/// PageQuery
///
/// Raw `page`/`limit` query parameters. Out-of-range values are corrected rather than
/// rejected: a page below 1 becomes 1 and a limit outside 1..=100 becomes 10.
#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
pub struct PageQuery {
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

impl PageQuery {
    pub fn normalize(&self) -> Page {
        let page = self.page.filter(|p| *p >= 1).unwrap_or(1);
        let limit = self
            .limit
            .filter(|l| (1..=MAX_LIMIT).contains(l))
            .unwrap_or(DEFAULT_LIMIT);
        Page { page, limit }
    }
}

/// A normalized page request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub page: i64,
    pub limit: i64,
}

impl Default for Page {
    fn default() -> Self {
        Self {
            page: 1,
            limit: DEFAULT_LIMIT,
        }
    }
}

impl Page {
    pub fn offset(&self) -> i64 {
        (self.page - 1).saturating_mul(self.limit)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct PageMeta {
    pub page: i64,
    pub limit: i64,
    pub total_items: i64,
    pub total_pages: i64,
}

impl PageMeta {
    pub fn new(page: Page, total_items: i64) -> Self {
        let total_pages = (total_items + page.limit - 1) / page.limit;
        Self {
            page: page.page,
            limit: page.limit,
            total_items,
            total_pages,
        }
    }
}

/// A page of results plus its pagination metadata.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct Paginated<T> {
    pub items: Vec<T>,
    pub pagination: PageMeta,
}

impl<T> Paginated<T> {
    pub fn new(items: Vec<T>, page: Page, total_items: i64) -> Self {
        Self {
            items,
            pagination: PageMeta::new(page, total_items),
        }
    }
}
