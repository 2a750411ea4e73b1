//! Requester authentication for the DerLg booking engine
//!
//! Sessions are issued by the identity service. This crate only validates the
//! bearer JWT it hands out and turns it into a `requester_id` plus role.
//!
//! # Using extractors in Actix-web
//!
//! ```no_run
//! use actix_web::HttpResponse;
//! use derlg_auth::middleware::{AuthenticatedUser, OperatorUser};
//!
//! async fn my_bookings(user: AuthenticatedUser) -> HttpResponse {
//!     HttpResponse::Ok().json(serde_json::json!({
//!         "requester_id": user.requester_id,
//!         "role": user.role
//!     }))
//! }
//!
//! async fn reject_booking(operator: OperatorUser) -> HttpResponse {
//!     HttpResponse::Ok().finish()
//! }
//! ```

pub mod claims;
pub mod jwt;
pub mod middleware;

pub use claims::Claims;
pub use jwt::JwtService;
pub use middleware::{AuthenticatedUser, OperatorUser, OptionalUser};
