//! Repository implementations
//!
//! This module contains concrete implementations of the repository traits
//! defined in derlg-core, using sqlx for PostgreSQL access.

pub mod booking_repo;
pub mod inventory_repo;
pub mod payment_attempt_repo;
pub mod profile_repo;
pub mod promo_repo;

pub use booking_repo::PgBookingRepository;
pub use inventory_repo::PgInventoryRepository;
pub use payment_attempt_repo::PgPaymentAttemptRepository;
pub use profile_repo::PgRequesterProfileRepository;
pub use promo_repo::PgPromoCodeStore;
