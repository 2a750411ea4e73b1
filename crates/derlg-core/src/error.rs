//! Unified error handling for the booking engine
//!
//! Every error carries a stable upper-snake-case code that clients branch on,
//! and maps onto an HTTP status through `ResponseError`.

use actix_web::{http::StatusCode, HttpResponse, ResponseError};
use serde_json::json;
use thiserror::Error;

/// Main application error type
///
/// All errors in the application should be converted to this type.
/// It implements `ResponseError` for automatic HTTP response generation.
#[derive(Error, Debug)]
pub enum AppError {
    // ==================== Database Errors ====================
    #[error("Database error: {0}")]
    Database(String),

    #[error("Database pool error: {0}")]
    Pool(String),

    #[error("Transaction failed: {0}")]
    Transaction(String),

    // ==================== Cache Errors ====================
    #[error("Cache error: {0}")]
    Cache(String),

    #[error("Cache connection failed: {0}")]
    CacheConnection(String),

    // ==================== Authentication Errors ====================
    #[error("Authentication required: {0}")]
    Unauthenticated(String),

    #[error("Token expired")]
    TokenExpired,

    #[error("Invalid token: {0}")]
    InvalidToken(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    // ==================== Validation Errors ====================
    #[error("Missing required parameters: {0}")]
    MissingParameters(String),

    #[error("Invalid date: {0}")]
    InvalidDate(String),

    #[error("Deposit percentage must be between {min}% and {max}%, got {value}%")]
    InvalidDepositPercentage {
        value: String,
        min: String,
        max: String,
    },

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Booking can no longer be modified: {0}")]
    ModificationWindowClosed(String),

    // ==================== Resource Errors ====================
    #[error("Booking not found: {0}")]
    BookingNotFound(String),

    #[error("Inventory unit not found: {0}")]
    InventoryNotFound(String),

    #[error("Payment attempt not found: {0}")]
    PaymentAttemptNotFound(String),

    #[error("Not found: {0}")]
    NotFound(String),

    // ==================== Conflict Errors ====================
    #[error("No availability: {0}")]
    RoomUnavailable(String),

    #[error("Cannot {action} a booking in status '{status}'")]
    InvalidBookingState { status: String, action: String },

    #[error("Payment already in progress for booking {0}")]
    PaymentAlreadyInProgress(String),

    #[error("Booking {0} was modified concurrently, reload and retry")]
    ConcurrentModification(String),

    // ==================== Gateway Errors ====================
    #[error("Payment gateway unavailable: {0}")]
    GatewayUnavailable(String),

    #[error("Payment rejected by gateway: {0}")]
    GatewayRejected(String),

    #[error("Payment gateway timed out: {0}")]
    GatewayTimeout(String),

    // ==================== Internal Errors ====================
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl AppError {
    /// Shorthand for a rejected lifecycle transition
    pub fn invalid_state(status: impl ToString, action: &str) -> Self {
        AppError::InvalidBookingState {
            status: status.to_string(),
            action: action.to_string(),
        }
    }

    /// Returns the HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            // 400 Bad Request
            AppError::MissingParameters(_)
            | AppError::InvalidDate(_)
            | AppError::InvalidDepositPercentage { .. }
            | AppError::Validation(_)
            | AppError::ModificationWindowClosed(_) => StatusCode::BAD_REQUEST,

            // 401 Unauthorized
            AppError::Unauthenticated(_) | AppError::InvalidToken(_) | AppError::TokenExpired => {
                StatusCode::UNAUTHORIZED
            }

            // 402 Payment Required
            AppError::GatewayRejected(_) => StatusCode::PAYMENT_REQUIRED,

            // 403 Forbidden
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,

            // 404 Not Found
            AppError::BookingNotFound(_)
            | AppError::InventoryNotFound(_)
            | AppError::PaymentAttemptNotFound(_)
            | AppError::NotFound(_) => StatusCode::NOT_FOUND,

            // 409 Conflict
            AppError::RoomUnavailable(_)
            | AppError::InvalidBookingState { .. }
            | AppError::PaymentAlreadyInProgress(_)
            | AppError::ConcurrentModification(_) => StatusCode::CONFLICT,

            // 503 / 504 upstream
            AppError::GatewayUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::GatewayTimeout(_) => StatusCode::GATEWAY_TIMEOUT,

            // 500 Internal Server Error
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Returns the error code for API responses
    pub fn error_code(&self) -> &'static str {
        match self {
            AppError::Database(_) => "DATABASE_ERROR",
            AppError::Pool(_) => "POOL_ERROR",
            AppError::Transaction(_) => "TRANSACTION_ERROR",
            AppError::Cache(_) => "CACHE_ERROR",
            AppError::CacheConnection(_) => "CACHE_CONNECTION_ERROR",
            AppError::Unauthenticated(_) | AppError::InvalidToken(_) | AppError::TokenExpired => {
                "UNAUTHENTICATED"
            }
            AppError::Forbidden(_) => "FORBIDDEN",
            AppError::MissingParameters(_) => "MISSING_PARAMETERS",
            AppError::InvalidDate(_) => "INVALID_DATE",
            AppError::InvalidDepositPercentage { .. } => "INVALID_DEPOSIT_PERCENTAGE",
            AppError::Validation(_) => "VALIDATION_ERROR",
            AppError::ModificationWindowClosed(_) => "MODIFICATION_WINDOW_CLOSED",
            AppError::BookingNotFound(_) => "BOOKING_NOT_FOUND",
            AppError::InventoryNotFound(_) => "INVENTORY_NOT_FOUND",
            AppError::PaymentAttemptNotFound(_) => "PAYMENT_ATTEMPT_NOT_FOUND",
            AppError::NotFound(_) => "NOT_FOUND",
            AppError::RoomUnavailable(_) => "ROOM_UNAVAILABLE",
            AppError::InvalidBookingState { .. } => "INVALID_BOOKING_STATE",
            AppError::PaymentAlreadyInProgress(_) => "PAYMENT_ALREADY_IN_PROGRESS",
            AppError::ConcurrentModification(_) => "CONCURRENT_MODIFICATION",
            AppError::GatewayUnavailable(_) => "GATEWAY_UNAVAILABLE",
            AppError::GatewayRejected(_) => "GATEWAY_REJECTED",
            AppError::GatewayTimeout(_) => "GATEWAY_TIMEOUT",
            AppError::Internal(_) => "INTERNAL_ERROR",
            AppError::Config(_) => "CONFIG_ERROR",
            AppError::Serialization(_) => "SERIALIZATION_ERROR",
        }
    }

    /// Whether the caller may retry the same operation unchanged
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            AppError::GatewayUnavailable(_)
                | AppError::GatewayTimeout(_)
                | AppError::Transaction(_)
                | AppError::Pool(_)
        )
    }
}

impl ResponseError for AppError {
    fn status_code(&self) -> StatusCode {
        AppError::status_code(self)
    }

    fn error_response(&self) -> HttpResponse {
        let status = self.status_code();
        let body = json!({
            "error": self.error_code(),
            "message": self.to_string(),
            "status": status.as_u16(),
        });

        HttpResponse::build(status).json(body)
    }
}

// ==================== From implementations ====================

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Serialization(err.to_string())
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::Internal(err.to_string())
    }
}

impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        AppError::Config(err.to_string())
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(err: validator::ValidationErrors) -> Self {
        AppError::Validation(err.to_string())
    }
}
