//! DerLg Database Layer
//!
//! This crate provides PostgreSQL database access and repository implementations
//! for the booking engine. It includes:
//!
//! - Connection pool management with sqlx
//! - Embedded schema migrations
//! - Repository implementations for inventory, bookings, payment attempts,
//!   requester profiles and promo codes
//! - Row-locked capacity holds so concurrent bookings cannot oversell a unit

pub mod pool;
pub mod repositories;

pub use pool::{create_pool, run_migrations};
pub use repositories::*;

// Re-export commonly used types
pub use derlg_core::{AppError, AppResult};
pub use sqlx::{PgPool, Postgres, Transaction};
