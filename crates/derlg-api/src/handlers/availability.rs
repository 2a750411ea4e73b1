//! Availability handler

use crate::dto::{ApiResponse, AvailabilityQuery, AvailabilityResponse};
use actix_web::{web, HttpResponse};
use chrono::Utc;
use derlg_core::AppError;
use derlg_services::BookingService;
use std::sync::Arc;
use tracing::{debug, instrument};

/// Capacity left for a unit and date range
///
/// GET /api/v1/availability?unit_id&check_in&check_out&guests
#[instrument(skip(bookings))]
pub async fn check_availability(
    bookings: web::Data<Arc<BookingService>>,
    query: web::Query<AvailabilityQuery>,
) -> Result<HttpResponse, AppError> {
    let query = query.into_inner();
    let (unit_id, check_in, guests) = match (query.unit_id, query.check_in, query.guests) {
        (Some(unit_id), Some(check_in), Some(guests)) => (unit_id, check_in, guests),
        _ => {
            return Err(AppError::MissingParameters(
                "unit_id, check_in and guests are required".to_string(),
            ))
        }
    };

    let (unit, range, result) = bookings
        .availability()
        .check_availability(unit_id, check_in, query.check_out, guests, Utc::now().date_naive())
        .await?;

    debug!(
        unit_id = %unit.id,
        remaining = result.remaining_count,
        "Availability checked"
    );

    Ok(HttpResponse::Ok().json(ApiResponse::success(AvailabilityResponse {
        unit_id: unit.id,
        check_in: range.check_in,
        check_out: range.check_out,
        guests,
        is_available: result.is_available,
        remaining_count: result.remaining_count,
        capacity: result.capacity,
    })))
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/availability", web::get().to(check_availability));
}
