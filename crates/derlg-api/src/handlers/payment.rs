//! Payment handlers
//!
//! Provider-specific create/verify flows, read-only status lookups and the
//! QR long-poll monitor.

use crate::dto::booking::parse_method;
use crate::dto::{ApiResponse, CreatePaymentRequest, MonitorRequestDto, VerifyPaymentRequest};
use crate::handlers::actor;
use actix_web::{web, HttpResponse};
use derlg_auth::AuthenticatedUser;
use derlg_core::AppError;
use derlg_services::{MonitorOutcome, PaymentService, ReconciliationPoller};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};
use validator::Validate;

/// Open a payment attempt with the provider
///
/// POST /api/v1/payments/{provider}/create
#[instrument(skip(payments, user, req), fields(requester_id = %user.requester_id))]
pub async fn create_payment(
    payments: web::Data<Arc<PaymentService>>,
    user: AuthenticatedUser,
    path: web::Path<String>,
    req: web::Json<CreatePaymentRequest>,
) -> Result<HttpResponse, AppError> {
    let method = parse_method(&path)?;
    debug!(provider = %method, booking_id = %req.booking_id, "Creating payment");

    let initiation = payments
        .create_payment(method, req.booking_id, &actor(&user))
        .await?;

    Ok(HttpResponse::Created().json(ApiResponse::success(initiation)))
}

/// Resolve an attempt after the client step
///
/// POST /api/v1/payments/{provider}/verify
#[instrument(skip(payments, user, req), fields(requester_id = %user.requester_id))]
pub async fn verify_payment(
    payments: web::Data<Arc<PaymentService>>,
    user: AuthenticatedUser,
    path: web::Path<String>,
    req: web::Json<VerifyPaymentRequest>,
) -> Result<HttpResponse, AppError> {
    req.validate().map_err(|e| {
        warn!("Payment verification validation failed: {}", e);
        AppError::Validation(e.to_string())
    })?;

    let method = parse_method(&path)?;
    let verification = payments
        .verify_payment(method, req.booking_id, &req.reference, &actor(&user))
        .await?;

    Ok(HttpResponse::Ok().json(ApiResponse::success(verification)))
}

/// Capture an approved wallet order
///
/// POST /api/v1/payments/wallet/capture
#[instrument(skip(payments, user, req), fields(requester_id = %user.requester_id))]
pub async fn capture_wallet(
    payments: web::Data<Arc<PaymentService>>,
    user: AuthenticatedUser,
    req: web::Json<VerifyPaymentRequest>,
) -> Result<HttpResponse, AppError> {
    req.validate().map_err(|e| {
        warn!("Wallet capture validation failed: {}", e);
        AppError::Validation(e.to_string())
    })?;

    let verification = payments
        .capture(req.booking_id, &req.reference, &actor(&user))
        .await?;

    Ok(HttpResponse::Ok().json(ApiResponse::success(verification)))
}

/// Provider status of a reference; never changes the booking
///
/// GET /api/v1/payments/{provider}/status/{reference}
#[instrument(skip(payments, user), fields(requester_id = %user.requester_id))]
pub async fn payment_status(
    payments: web::Data<Arc<PaymentService>>,
    user: AuthenticatedUser,
    path: web::Path<(String, String)>,
) -> Result<HttpResponse, AppError> {
    let (provider, reference) = path.into_inner();
    let method = parse_method(&provider)?;

    let snapshot = payments.status(method, &reference, &actor(&user)).await?;

    Ok(HttpResponse::Ok().json(ApiResponse::success(snapshot)))
}

/// Long-poll a QR payment until it settles or times out
///
/// POST /api/v1/payments/qr/monitor
///
/// If the client goes away the drop guard cancels the monitor; it stops after
/// its current poll.
#[instrument(skip(poller, user, req), fields(requester_id = %user.requester_id))]
pub async fn monitor_qr(
    poller: web::Data<Arc<ReconciliationPoller>>,
    user: AuthenticatedUser,
    req: web::Json<MonitorRequestDto>,
) -> Result<HttpResponse, AppError> {
    req.validate().map_err(|e| {
        warn!("Monitor request validation failed: {}", e);
        AppError::Validation(e.to_string())
    })?;

    let handle = poller
        .spawn(&actor(&user), req.into_inner().into())
        .await?;
    let guard = handle.token().drop_guard();
    let result = handle.join().await;
    guard.disarm();
    let result = result?;

    info!(
        booking_id = %result.booking_id,
        outcome = %result.outcome,
        attempts = result.attempts,
        "QR monitor finished"
    );

    let message = match result.outcome {
        MonitorOutcome::Confirmed => "Payment confirmed",
        MonitorOutcome::Failed => "Payment failed",
        MonitorOutcome::Expired => "QR code expired",
        MonitorOutcome::PendingTimeout => "Payment still pending",
        MonitorOutcome::Cancelled => "Monitoring stopped",
        MonitorOutcome::Superseded => "Booking changed while monitoring",
    };

    Ok(HttpResponse::Ok().json(ApiResponse::with_message(result, message)))
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/payments")
            .route("/wallet/capture", web::post().to(capture_wallet))
            .route("/qr/monitor", web::post().to(monitor_qr))
            .route("/{provider}/create", web::post().to(create_payment))
            .route("/{provider}/verify", web::post().to(verify_payment))
            .route("/{provider}/status/{reference}", web::get().to(payment_status)),
    );
}
