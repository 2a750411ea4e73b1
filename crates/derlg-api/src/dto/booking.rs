//! Booking DTOs

use chrono::NaiveDate;
use derlg_core::models::{GuestDetails, PaymentMethod, PaymentType};
use derlg_core::AppError;
use derlg_services::{BookingChanges, BookingRequest, QuoteRequest};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

/// Guest contact details
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct GuestDetailsDto {
    #[validate(length(min = 1, max = 100))]
    pub name: String,

    #[validate(email)]
    pub email: String,

    #[validate(length(min = 6, max = 20))]
    pub phone: String,

    #[validate(length(max = 1000))]
    pub notes: Option<String>,
}

impl From<GuestDetailsDto> for GuestDetails {
    fn from(dto: GuestDetailsDto) -> Self {
        GuestDetails {
            name: dto.name.trim().to_string(),
            email: dto.email.trim().to_string(),
            phone: dto.phone.trim().to_string(),
            notes: dto.notes,
        }
    }
}

/// Request to create a booking
#[derive(Debug, Deserialize, Validate)]
pub struct CreateBookingRequest {
    pub unit_id: Uuid,
    pub check_in: NaiveDate,
    /// Required for rooms, ignored for tours and events
    pub check_out: Option<NaiveDate>,

    #[validate(range(min = 1, max = 50))]
    pub guests: i32,

    #[validate(nested)]
    pub guest_details: GuestDetailsDto,

    /// `card`, `wallet` or `qr` (provider names are accepted too)
    pub payment_method: String,

    #[serde(default)]
    pub payment_type: PaymentType,

    pub deposit_percentage: Option<Decimal>,

    #[validate(length(min = 1, max = 50))]
    pub promo_code: Option<String>,
}

impl CreateBookingRequest {
    pub fn into_request(self) -> Result<BookingRequest, AppError> {
        let payment_method = parse_method(&self.payment_method)?;

        Ok(BookingRequest {
            unit_id: self.unit_id,
            check_in: self.check_in,
            check_out: self.check_out,
            guests: self.guests,
            guest_details: self.guest_details.into(),
            payment_method,
            payment_type: self.payment_type,
            deposit_percentage: self.deposit_percentage,
            promo_code: self.promo_code,
        })
    }
}

/// Partial booking update; absent fields are left alone
#[derive(Debug, Default, Deserialize, Validate)]
pub struct UpdateBookingRequest {
    pub unit_id: Option<Uuid>,
    pub check_in: Option<NaiveDate>,
    pub check_out: Option<NaiveDate>,

    #[validate(range(min = 1, max = 50))]
    pub guests: Option<i32>,

    #[validate(nested)]
    pub guest_details: Option<GuestDetailsDto>,
}

impl From<UpdateBookingRequest> for BookingChanges {
    fn from(req: UpdateBookingRequest) -> Self {
        BookingChanges {
            unit_id: req.unit_id,
            check_in: req.check_in,
            check_out: req.check_out,
            guests: req.guests,
            guest_details: req.guest_details.map(Into::into),
        }
    }
}

/// Cancellation body
#[derive(Debug, Default, Deserialize, Validate)]
pub struct CancelRequest {
    #[validate(length(max = 500))]
    pub reason: Option<String>,
}

/// Operator rejection body
#[derive(Debug, Default, Deserialize, Validate)]
pub struct RejectRequest {
    #[validate(length(max = 500))]
    pub reason: Option<String>,
}

/// Quote body
///
/// Every field is optional at the JSON level so a missing one is reported as
/// `MISSING_PARAMETERS` rather than a parse failure.
#[derive(Debug, Default, Deserialize)]
pub struct QuoteRequestDto {
    pub unit_id: Option<Uuid>,
    pub check_in: Option<NaiveDate>,
    pub check_out: Option<NaiveDate>,
    pub guests: Option<i32>,
    pub deposit_percentage: Option<Decimal>,
    pub promo_code: Option<String>,
}

impl QuoteRequestDto {
    pub fn into_request(self) -> Result<QuoteRequest, AppError> {
        let mut missing = Vec::new();
        if self.unit_id.is_none() {
            missing.push("unit_id");
        }
        if self.check_in.is_none() {
            missing.push("check_in");
        }
        if self.guests.is_none() {
            missing.push("guests");
        }

        match (self.unit_id, self.check_in, self.guests) {
            (Some(unit_id), Some(check_in), Some(guests)) => Ok(QuoteRequest {
                unit_id,
                check_in,
                check_out: self.check_out,
                guests,
                deposit_percentage: self.deposit_percentage,
                promo_code: self.promo_code.filter(|c| !c.trim().is_empty()),
            }),
            _ => Err(AppError::MissingParameters(format!(
                "missing {}",
                missing.join(", ")
            ))),
        }
    }
}

/// Availability query string
#[derive(Debug, Default, Deserialize)]
pub struct AvailabilityQuery {
    pub unit_id: Option<Uuid>,
    pub check_in: Option<NaiveDate>,
    pub check_out: Option<NaiveDate>,
    pub guests: Option<i32>,
}

/// Availability answer
#[derive(Debug, Serialize)]
pub struct AvailabilityResponse {
    pub unit_id: Uuid,
    pub check_in: NaiveDate,
    pub check_out: NaiveDate,
    pub guests: i32,
    pub is_available: bool,
    pub remaining_count: i32,
    pub capacity: i32,
}

pub(crate) fn parse_method(raw: &str) -> Result<PaymentMethod, AppError> {
    PaymentMethod::from_str(raw.trim())
        .ok_or_else(|| AppError::Validation(format!("Unsupported payment method: {}", raw)))
}
