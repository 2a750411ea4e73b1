//! QR push provider (KHQR)
//!
//! The QR payload is built locally as an EMV merchant-presented code. The MD5
//! of the payload is the correlation key; there is no reliable callback, so
//! the status endpoint is the only way to learn a payment went through.

use async_trait::async_trait;
use derlg_core::config::QrGatewayConfig;
use derlg_core::models::{Booking, Currency, PaymentMethod, ProviderStatus};
use chrono::Utc;
use derlg_core::AppError;
use md5::{Digest, Md5};
use reqwest::StatusCode;
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use super::{http_client, GatewayError, GatewayPayment, PaymentGateway};
use crate::constants::{KHQR_MAX_CITY_LEN, KHQR_MAX_NAME_LEN};

const KHQR_GUID: &str = "com.bakong.khqr";
const COUNTRY_CODE: &str = "KH";

/// Inputs of a KHQR payload
#[derive(Debug, Clone)]
pub struct KhqrFields<'a> {
    pub merchant_id: &'a str,
    pub merchant_name: &'a str,
    pub merchant_city: &'a str,
    pub currency: Currency,
    pub amount: Decimal,
    pub bill_number: &'a str,
    /// Tag 62/05, distinguishes retries for the same bill
    pub attempt_label: &'a str,
    /// Tag 99/00, creation time in epoch milliseconds
    pub created_at_ms: i64,
}

/// Tag, two-digit length, value
fn tlv(tag: &str, value: &str) -> String {
    format!("{}{:02}{}", tag, value.chars().count(), value)
}

fn clip(value: &str, max: usize) -> String {
    value.chars().take(max).collect()
}

/// CRC16-CCITT (poly 0x1021, init 0xFFFF, no reflection, no final xor)
pub fn crc16_ccitt(data: &[u8]) -> u16 {
    let mut crc: u16 = 0xFFFF;
    for byte in data {
        crc ^= u16::from(*byte) << 8;
        for _ in 0..8 {
            crc = if crc & 0x8000 != 0 {
                (crc << 1) ^ 0x1021
            } else {
                crc << 1
            };
        }
    }
    crc
}

/// Build the KHQR string including its CRC
pub fn build_khqr(fields: &KhqrFields<'_>) -> String {
    let mut qr = String::with_capacity(160);

    qr.push_str(&tlv("00", "01"));
    // Dynamic QR, single use
    qr.push_str(&tlv("01", "12"));

    let account = format!("{}{}", tlv("00", KHQR_GUID), tlv("01", fields.merchant_id));
    qr.push_str(&tlv("29", &account));

    qr.push_str(&tlv("53", fields.currency.numeric_code()));
    if fields.amount > Decimal::ZERO {
        qr.push_str(&tlv("54", &format!("{:.2}", fields.amount)));
    }
    qr.push_str(&tlv("58", COUNTRY_CODE));
    qr.push_str(&tlv("59", &clip(fields.merchant_name, KHQR_MAX_NAME_LEN)));
    qr.push_str(&tlv("60", &clip(fields.merchant_city, KHQR_MAX_CITY_LEN)));

    let mut additional = String::new();
    if !fields.bill_number.is_empty() {
        additional.push_str(&tlv("01", fields.bill_number));
    }
    if !fields.attempt_label.is_empty() {
        additional.push_str(&tlv("05", fields.attempt_label));
    }
    if !additional.is_empty() {
        qr.push_str(&tlv("62", &additional));
    }

    if fields.created_at_ms > 0 {
        qr.push_str(&tlv("99", &tlv("00", &fields.created_at_ms.to_string())));
    }

    qr.push_str("6304");
    let crc = crc16_ccitt(qr.as_bytes());
    qr.push_str(&format!("{:04X}", crc));
    qr
}

fn md5_hex(data: &str) -> String {
    hex::encode(Md5::digest(data.as_bytes()))
}

fn deep_link(qr: &str) -> String {
    format!("bakong://qr?data={}", urlencoding::encode(qr))
}

#[derive(Debug, Deserialize)]
struct TransactionStatus {
    #[serde(default)]
    status: Option<String>,
}

fn transaction_status(status: Option<&str>) -> ProviderStatus {
    match status.map(str::to_uppercase).as_deref() {
        Some("PAID") => ProviderStatus::Succeeded,
        Some("FAILED") => ProviderStatus::Failed,
        Some("EXPIRED") => ProviderStatus::Expired,
        _ => ProviderStatus::Pending,
    }
}

/// QR gateway
pub struct QrGateway {
    client: reqwest::Client,
    config: QrGatewayConfig,
}

impl QrGateway {
    pub fn new(config: QrGatewayConfig) -> Result<Self, AppError> {
        Ok(Self {
            client: http_client(config.timeout_secs)?,
            config,
        })
    }
}

#[async_trait]
impl PaymentGateway for QrGateway {
    fn provider(&self) -> PaymentMethod {
        PaymentMethod::Qr
    }

    #[instrument(skip(self, booking), fields(booking_number = %booking.booking_number))]
    async fn create(&self, booking: &Booking, amount: Decimal) -> Result<GatewayPayment, GatewayError> {
        let attempt_label = Uuid::new_v4().simple().to_string();
        let qr_string = build_khqr(&KhqrFields {
            merchant_id: &self.config.merchant_id,
            merchant_name: &self.config.merchant_name,
            merchant_city: &self.config.merchant_city,
            currency: booking.pricing.currency,
            amount,
            bill_number: &booking.booking_number,
            attempt_label: &attempt_label[..8],
            created_at_ms: Utc::now().timestamp_millis(),
        });
        let md5 = md5_hex(&qr_string);

        info!("Generated KHQR {} for {}", md5, amount);

        Ok(GatewayPayment {
            client_payload: json!({
                "qr_string": qr_string,
                "md5": md5,
                "deep_link": deep_link(&qr_string),
            }),
            reference: md5,
        })
    }

    #[instrument(skip(self))]
    async fn get_status(&self, reference: &str) -> Result<ProviderStatus, GatewayError> {
        let resp = self
            .client
            .get(format!(
                "{}/check_transaction_by_hash",
                self.config.api_url.trim_end_matches('/')
            ))
            .query(&[("hash", reference)])
            .bearer_auth(&self.config.developer_token)
            .send()
            .await?;

        let status = resp.status();
        match status {
            StatusCode::NOT_FOUND => {
                debug!("No QR transaction yet for {}", reference);
                return Ok(ProviderStatus::Pending);
            }
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                warn!("QR provider refused credentials ({})", status);
                return Err(GatewayError::Rejected(format!(
                    "QR provider denied access: HTTP {}",
                    status.as_u16()
                )));
            }
            s if !s.is_success() => {
                let body = resp.text().await.unwrap_or_default();
                return Err(GatewayError::from_status(s, &body));
            }
            _ => {}
        }

        let body: TransactionStatus = resp.json().await?;
        let provider_status = transaction_status(body.status.as_deref());
        debug!("QR transaction {} is {}", reference, provider_status);
        Ok(provider_status)
    }

    async fn verify(&self, _booking: &Booking, reference: &str) -> Result<ProviderStatus, GatewayError> {
        self.get_status(reference).await
    }
}
