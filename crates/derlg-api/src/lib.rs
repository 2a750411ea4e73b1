//! HTTP API layer for the DerLg booking engine
//!
//! Thin actix-web handlers over `derlg-services`. Every route lives under
//! `/api/v1`; errors are rendered by `AppError` with a stable `error` code.

pub mod dto;
pub mod handlers;

pub use dto::{ApiResponse, PaginationParams};
pub use handlers::configure_api;
