//! Payment DTOs

use derlg_services::MonitorRequest;
use serde::Deserialize;
use uuid::Uuid;
use validator::Validate;

/// Start a payment for a booking
#[derive(Debug, Deserialize)]
pub struct CreatePaymentRequest {
    pub booking_id: Uuid,
}

/// Resolve a payment after the client step
#[derive(Debug, Deserialize, Validate)]
pub struct VerifyPaymentRequest {
    pub booking_id: Uuid,

    #[validate(length(min = 1, max = 255))]
    pub reference: String,
}

/// Start a QR long-poll monitor
///
/// `timeout` and `interval` are milliseconds.
#[derive(Debug, Deserialize, Validate)]
pub struct MonitorRequestDto {
    pub booking_id: Uuid,

    #[validate(length(min = 1, max = 255))]
    pub reference: String,

    #[validate(range(min = 1))]
    pub timeout: Option<u64>,

    #[validate(range(min = 1))]
    pub interval: Option<u64>,
}

impl From<MonitorRequestDto> for MonitorRequest {
    fn from(dto: MonitorRequestDto) -> Self {
        MonitorRequest {
            booking_id: dto.booking_id,
            reference: dto.reference,
            timeout_ms: dto.timeout,
            interval_ms: dto.interval,
        }
    }
}
