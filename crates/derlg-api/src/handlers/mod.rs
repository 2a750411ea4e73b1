//! HTTP request handlers

pub mod availability;
pub mod booking;
pub mod health;
pub mod payment;
pub mod quote;

pub use availability::configure as configure_availability;
pub use booking::configure as configure_bookings;
pub use health::configure as configure_health;
pub use payment::configure as configure_payments;
pub use quote::configure as configure_quotes;

use crate::dto::{json_config, path_config, query_config};
use actix_web::web;
use derlg_auth::AuthenticatedUser;
use derlg_services::Actor;

/// Mount every resource; meant for the `/api/v1` scope
pub fn configure_api(cfg: &mut web::ServiceConfig) {
    cfg.app_data(json_config())
        .app_data(query_config())
        .app_data(path_config());

    configure_health(cfg);
    configure_availability(cfg);
    configure_quotes(cfg);
    configure_bookings(cfg);
    configure_payments(cfg);
}

pub(crate) fn actor(user: &AuthenticatedUser) -> Actor {
    Actor::new(user.requester_id.clone(), user.role)
}
