//! Booking handlers
//!
//! HTTP handlers for the booking lifecycle. Every state change goes through
//! `BookingService`; handlers only parse, authorize and render.

use crate::dto::{
    ApiResponse, CancelRequest, CreateBookingRequest, PaginationParams, RejectRequest,
    UpdateBookingRequest,
};
use crate::handlers::actor;
use actix_web::{web, HttpResponse};
use chrono::Utc;
use derlg_auth::{AuthenticatedUser, OperatorUser};
use derlg_core::models::PriceAction;
use derlg_core::traits::Pagination;
use derlg_core::AppError;
use derlg_services::BookingService;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;
use validator::Validate;

/// Create a pending booking
///
/// POST /api/v1/bookings
#[instrument(skip(bookings, user, req), fields(requester_id = %user.requester_id))]
pub async fn create_booking(
    bookings: web::Data<Arc<BookingService>>,
    user: AuthenticatedUser,
    req: web::Json<CreateBookingRequest>,
) -> Result<HttpResponse, AppError> {
    req.validate().map_err(|e| {
        warn!("Booking creation validation failed: {}", e);
        AppError::Validation(e.to_string())
    })?;

    let request = req.into_inner().into_request()?;
    debug!(unit_id = %request.unit_id, "Creating booking");

    let booking = bookings.create(&actor(&user), request).await?;

    info!(booking_number = %booking.booking_number, "Booking created");

    Ok(HttpResponse::Created().json(ApiResponse::with_message(
        booking,
        "Booking created; complete payment to confirm",
    )))
}

/// List the caller's bookings
///
/// GET /api/v1/bookings
#[instrument(skip(bookings, user))]
pub async fn list_bookings(
    bookings: web::Data<Arc<BookingService>>,
    user: AuthenticatedUser,
    query: web::Query<PaginationParams>,
) -> Result<HttpResponse, AppError> {
    query.validate().map_err(|e| {
        warn!("Pagination validation failed: {}", e);
        AppError::Validation(e.to_string())
    })?;

    let page = bookings
        .list(&actor(&user), Pagination::from(&*query))
        .await?;

    Ok(HttpResponse::Ok().json(page))
}

/// Booking by id, for its owner or an operator
///
/// GET /api/v1/bookings/{id}
#[instrument(skip(bookings, user))]
pub async fn get_booking(
    bookings: web::Data<Arc<BookingService>>,
    user: AuthenticatedUser,
    path: web::Path<Uuid>,
) -> Result<HttpResponse, AppError> {
    let booking = bookings.get(path.into_inner(), &actor(&user)).await?;
    Ok(HttpResponse::Ok().json(ApiResponse::success(booking)))
}

/// Change dates, unit, party size or guest details
///
/// PUT /api/v1/bookings/{id}
#[instrument(skip(bookings, user, req))]
pub async fn update_booking(
    bookings: web::Data<Arc<BookingService>>,
    user: AuthenticatedUser,
    path: web::Path<Uuid>,
    req: web::Json<UpdateBookingRequest>,
) -> Result<HttpResponse, AppError> {
    req.validate().map_err(|e| {
        warn!("Booking update validation failed: {}", e);
        AppError::Validation(e.to_string())
    })?;

    let booking = bookings
        .update(
            path.into_inner(),
            &actor(&user),
            req.into_inner().into(),
            Utc::now(),
        )
        .await?;

    let message = match booking.price_change.as_ref().map(|c| c.action_required) {
        Some(PriceAction::Charge) => "Booking updated; additional payment required",
        Some(PriceAction::Refund) => "Booking updated; difference will be refunded",
        _ => "Booking updated",
    };

    Ok(HttpResponse::Ok().json(ApiResponse::with_message(booking, message)))
}

/// Cancel with the tiered refund policy
///
/// DELETE /api/v1/bookings/{id}/cancel
#[instrument(skip(bookings, user, req))]
pub async fn cancel_booking(
    bookings: web::Data<Arc<BookingService>>,
    user: AuthenticatedUser,
    path: web::Path<Uuid>,
    req: Option<web::Json<CancelRequest>>,
) -> Result<HttpResponse, AppError> {
    let req = req.map(web::Json::into_inner).unwrap_or_default();
    req.validate().map_err(|e| {
        warn!("Cancellation validation failed: {}", e);
        AppError::Validation(e.to_string())
    })?;

    let outcome = bookings
        .cancel(path.into_inner(), &actor(&user), req.reason, Utc::now())
        .await?;

    let message = if outcome.already_cancelled {
        "Booking was already cancelled"
    } else {
        "Booking cancelled"
    };

    Ok(HttpResponse::Ok().json(ApiResponse::with_message(outcome, message)))
}

/// Operator rejection of a pending booking
///
/// POST /api/v1/bookings/{id}/reject
#[instrument(skip(bookings, operator, req))]
pub async fn reject_booking(
    bookings: web::Data<Arc<BookingService>>,
    operator: OperatorUser,
    path: web::Path<Uuid>,
    req: Option<web::Json<RejectRequest>>,
) -> Result<HttpResponse, AppError> {
    let req = req.map(web::Json::into_inner).unwrap_or_default();
    req.validate().map_err(|e| {
        warn!("Rejection validation failed: {}", e);
        AppError::Validation(e.to_string())
    })?;

    let outcome = bookings
        .reject(path.into_inner(), &actor(&operator), req.reason, Utc::now())
        .await?;

    Ok(HttpResponse::Ok().json(ApiResponse::with_message(outcome, "Booking rejected")))
}

/// Mark a finished stay completed
///
/// POST /api/v1/bookings/{id}/complete
#[instrument(skip(bookings, operator))]
pub async fn complete_booking(
    bookings: web::Data<Arc<BookingService>>,
    operator: OperatorUser,
    path: web::Path<Uuid>,
) -> Result<HttpResponse, AppError> {
    let booking = bookings
        .complete(path.into_inner(), &actor(&operator), Utc::now().date_naive())
        .await?;

    Ok(HttpResponse::Ok().json(ApiResponse::with_message(booking, "Booking completed")))
}

/// Payment attempts of a booking, oldest first
///
/// GET /api/v1/bookings/{id}/payments
#[instrument(skip(bookings, user))]
pub async fn list_booking_payments(
    bookings: web::Data<Arc<BookingService>>,
    user: AuthenticatedUser,
    path: web::Path<Uuid>,
) -> Result<HttpResponse, AppError> {
    let attempts = bookings
        .payment_attempts(path.into_inner(), &actor(&user))
        .await?;

    Ok(HttpResponse::Ok().json(ApiResponse::success(attempts)))
}

/// Installments of the booking's payment structure and what is left to pay
///
/// GET /api/v1/bookings/{id}/payment-schedule
#[instrument(skip(bookings, user))]
pub async fn payment_schedule(
    bookings: web::Data<Arc<BookingService>>,
    user: AuthenticatedUser,
    path: web::Path<Uuid>,
) -> Result<HttpResponse, AppError> {
    let schedule = bookings
        .payment_schedule(path.into_inner(), &actor(&user), Utc::now().date_naive())
        .await?;

    Ok(HttpResponse::Ok().json(ApiResponse::success(schedule)))
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/bookings")
            .route("", web::post().to(create_booking))
            .route("", web::get().to(list_bookings))
            .route("/{id}", web::get().to(get_booking))
            .route("/{id}", web::put().to(update_booking))
            .route("/{id}/cancel", web::delete().to(cancel_booking))
            .route("/{id}/reject", web::post().to(reject_booking))
            .route("/{id}/complete", web::post().to(complete_booking))
            .route("/{id}/payments", web::get().to(list_booking_payments))
            .route("/{id}/payment-schedule", web::get().to(payment_schedule)),
    );
}
