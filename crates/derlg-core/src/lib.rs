//! DerLg Booking Core Library
//!
//! This crate provides the foundational types, traits, and error handling
//! for the DerLg booking engine. It includes:
//!
//! - Domain models (InventoryUnit, Booking, PaymentAttempt, PriceBreakdown, etc.)
//! - Repository and collaborator traits consumed by the services
//! - Unified error handling with stable machine-readable codes
//! - Application configuration

pub mod config;
pub mod error;
pub mod models;
pub mod traits;

pub use config::AppConfig;
pub use error::AppError;

/// Result type alias using AppError
pub type AppResult<T> = Result<T, AppError>;
