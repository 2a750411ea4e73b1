//! Booking quote handler

use crate::dto::{ApiResponse, QuoteRequestDto};
use crate::handlers::actor;
use actix_web::{web, HttpResponse};
use derlg_auth::OptionalUser;
use derlg_core::AppError;
use derlg_services::BookingService;
use std::sync::Arc;
use tracing::{debug, instrument};

/// Price, availability and payment options without booking
///
/// POST /api/v1/booking-quote
#[instrument(skip(bookings, user, req))]
pub async fn create_quote(
    bookings: web::Data<Arc<BookingService>>,
    user: OptionalUser,
    req: web::Json<QuoteRequestDto>,
) -> Result<HttpResponse, AppError> {
    let request = req.into_inner().into_request()?;
    let requester = user.0.as_ref().map(actor);

    debug!(unit_id = %request.unit_id, guests = request.guests, "Quoting booking");

    let quote = bookings.quote(request, requester.as_ref()).await?;

    Ok(HttpResponse::Ok().json(ApiResponse::success(quote)))
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/booking-quote", web::post().to(create_quote));
}

#[cfg(test)]
mod tests {
    use crate::handlers::test_support::Harness;
    use actix_web::test;
    use chrono::{Duration, Utc};
    use derlg_services::testing::room;

    #[actix_web::test]
    async fn test_quote_for_room() {
        let harness = Harness::new(vec![]);
        let unit = harness.env.store.add_unit(room(2));
        let app = test::init_service(harness.app()).await;

        let check_in = Utc::now().date_naive() + Duration::days(30);
        let req = test::TestRequest::post()
            .uri("/api/v1/booking-quote")
            .set_json(serde_json::json!({
                "unit_id": unit.id,
                "check_in": check_in,
                "check_out": check_in + Duration::days(2),
                "guests": 2
            }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert!(resp.status().is_success());

        let body: serde_json::Value = test::read_body_json(resp).await;
        assert_eq!(body["data"]["is_available"], true);
        assert_eq!(body["data"]["remaining_count"], 2);
        assert!(body["data"]["price_breakdown"].is_object());
        assert!(body["data"]["payment_options"].is_object());
    }

    #[actix_web::test]
    async fn test_quote_missing_fields() {
        let harness = Harness::new(vec![]);
        let app = test::init_service(harness.app()).await;

        let req = test::TestRequest::post()
            .uri("/api/v1/booking-quote")
            .set_json(serde_json::json!({ "guests": 2 }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), 400);

        let body: serde_json::Value = test::read_body_json(resp).await;
        assert_eq!(body["error"], "MISSING_PARAMETERS");
    }

    #[actix_web::test]
    async fn test_quote_rejects_past_dates() {
        let harness = Harness::new(vec![]);
        let unit = harness.env.store.add_unit(room(2));
        let app = test::init_service(harness.app()).await;

        let check_in = Utc::now().date_naive() - Duration::days(3);
        let req = test::TestRequest::post()
            .uri("/api/v1/booking-quote")
            .set_json(serde_json::json!({
                "unit_id": unit.id,
                "check_in": check_in,
                "check_out": check_in + Duration::days(1),
                "guests": 1
            }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), 400);

        let body: serde_json::Value = test::read_body_json(resp).await;
        assert_eq!(body["error"], "INVALID_DATE");
    }

    #[actix_web::test]
    async fn test_quote_with_invalid_token_is_rejected() {
        let harness = Harness::new(vec![]);
        let unit = harness.env.store.add_unit(room(2));
        let app = test::init_service(harness.app()).await;

        let check_in = Utc::now().date_naive() + Duration::days(30);
        let req = test::TestRequest::post()
            .uri("/api/v1/booking-quote")
            .insert_header(("Authorization", "Bearer not-a-token"))
            .set_json(serde_json::json!({
                "unit_id": unit.id,
                "check_in": check_in,
                "check_out": check_in + Duration::days(1),
                "guests": 1
            }))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), 401);
    }
}
