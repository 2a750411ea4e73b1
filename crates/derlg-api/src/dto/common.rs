//! Common DTOs used across the API

use actix_web::{error::JsonPayloadError, web, HttpRequest};
use derlg_core::traits::Pagination;
use derlg_core::AppError;
use serde::{Deserialize, Serialize};
use tracing::debug;
use validator::Validate;

/// Standard API response wrapper
#[derive(Debug, Clone, Serialize)]
pub struct ApiResponse<T> {
    /// Response data
    pub data: T,
    /// Response message
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl<T> ApiResponse<T> {
    /// Create a success response with data
    pub fn success(data: T) -> Self {
        Self {
            data,
            message: None,
        }
    }

    /// Create a success response with data and message
    pub fn with_message(data: T, message: impl Into<String>) -> Self {
        Self {
            data,
            message: Some(message.into()),
        }
    }
}

/// Pagination query parameters
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct PaginationParams {
    /// Page number (1-indexed)
    #[serde(default = "default_page")]
    #[validate(range(min = 1))]
    pub page: i64,

    /// Items per page
    #[serde(default = "default_per_page")]
    #[validate(range(min = 1, max = 100))]
    pub per_page: i64,
}

fn default_page() -> i64 {
    1
}

fn default_per_page() -> i64 {
    20
}

impl Default for PaginationParams {
    fn default() -> Self {
        Self {
            page: default_page(),
            per_page: default_per_page(),
        }
    }
}

impl From<&PaginationParams> for Pagination {
    fn from(params: &PaginationParams) -> Self {
        Pagination::new(params.page, params.per_page)
    }
}

/// JSON extractor config rendering body errors as `VALIDATION_ERROR`
pub fn json_config() -> web::JsonConfig {
    web::JsonConfig::default()
        .limit(64 * 1024)
        .error_handler(|err: JsonPayloadError, _req: &HttpRequest| {
            debug!("Rejected request body: {}", err);
            AppError::Validation(format!("Invalid request body: {}", err)).into()
        })
}

/// Query extractor config rendering query errors as `VALIDATION_ERROR`
pub fn query_config() -> web::QueryConfig {
    web::QueryConfig::default().error_handler(|err, _req| {
        debug!("Rejected query string: {}", err);
        AppError::Validation(format!("Invalid query string: {}", err)).into()
    })
}

/// Path extractor config; a malformed id is a `VALIDATION_ERROR`
pub fn path_config() -> web::PathConfig {
    web::PathConfig::default().error_handler(|err, _req| {
        debug!("Rejected path parameter: {}", err);
        AppError::Validation(format!("Invalid path parameter: {}", err)).into()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pagination_params_into_pagination() {
        let params = PaginationParams {
            page: 3,
            per_page: 20,
        };
        let pagination = Pagination::from(&params);
        assert_eq!(pagination.offset(), 40);
        assert_eq!(pagination.limit(), 20);

        assert!(PaginationParams {
            page: 0,
            per_page: 20
        }
        .validate()
        .is_err());
    }

    #[test]
    fn test_api_response() {
        let resp = ApiResponse::success("test");
        assert_eq!(resp.data, "test");
        assert!(resp.message.is_none());

        let resp = ApiResponse::with_message("data", "Booking cancelled");
        assert_eq!(resp.message, Some("Booking cancelled".to_string()));
    }
}
