//! Payment gateway adapters
//!
//! One `PaymentGateway` implementation per provider, selected by the booking's
//! payment method. Adapters never touch booking state; they only talk to the
//! provider and translate its answers.

mod card;
mod qr;
mod wallet;

pub use card::CardGateway;
pub use qr::{build_khqr, crc16_ccitt, KhqrFields, QrGateway};
pub use wallet::WalletGateway;

use async_trait::async_trait;
use derlg_core::config::GatewaysConfig;
use derlg_core::models::{Booking, PaymentMethod, ProviderStatus};
use derlg_core::AppError;
use reqwest::StatusCode;
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Provider failure, classified by what the caller may do about it
#[derive(Debug, Error)]
pub enum GatewayError {
    /// Provider down, overloaded or unreachable; retry later
    #[error("{0}")]
    Unavailable(String),

    /// Provider refused the request; retrying will not help
    #[error("{0}")]
    Rejected(String),

    /// No answer within the configured timeout
    #[error("{0}")]
    Timeout(String),
}

impl GatewayError {
    /// Classify a non-success HTTP status
    pub fn from_status(status: StatusCode, body: &str) -> Self {
        let message = format!("HTTP {}: {}", status.as_u16(), truncate(body, 200));
        if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
            GatewayError::Unavailable(message)
        } else {
            GatewayError::Rejected(message)
        }
    }

    pub fn is_retryable(&self) -> bool {
        !matches!(self, GatewayError::Rejected(_))
    }
}

impl From<reqwest::Error> for GatewayError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            GatewayError::Timeout(err.to_string())
        } else if err.is_decode() {
            GatewayError::Unavailable(format!("Malformed provider response: {}", err))
        } else {
            GatewayError::Unavailable(err.to_string())
        }
    }
}

impl From<GatewayError> for AppError {
    fn from(err: GatewayError) -> Self {
        match err {
            GatewayError::Unavailable(m) => AppError::GatewayUnavailable(m),
            GatewayError::Rejected(m) => AppError::GatewayRejected(m),
            GatewayError::Timeout(m) => AppError::GatewayTimeout(m),
        }
    }
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

/// What the client needs to complete a new payment
#[derive(Debug, Clone, Serialize)]
pub struct GatewayPayment {
    /// Provider-side correlation key
    pub reference: String,
    /// Client secret, approval URL or QR payload
    pub client_payload: serde_json::Value,
}

/// Uniform provider contract
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    fn provider(&self) -> PaymentMethod;

    /// Start a payment of `amount` for `booking`
    async fn create(&self, booking: &Booking, amount: Decimal) -> Result<GatewayPayment, GatewayError>;

    /// Read the provider-side status
    async fn get_status(&self, reference: &str) -> Result<ProviderStatus, GatewayError>;

    /// Resolve the payment after the client finished its part
    ///
    /// Must be safe to call repeatedly for the same reference.
    async fn verify(&self, booking: &Booking, reference: &str) -> Result<ProviderStatus, GatewayError>;
}

pub(crate) fn http_client(timeout_secs: u64) -> Result<reqwest::Client, AppError> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| AppError::Config(format!("Failed to build HTTP client: {}", e)))
}

/// Adapters by payment method
#[derive(Clone, Default)]
pub struct GatewayRegistry {
    gateways: HashMap<PaymentMethod, Arc<dyn PaymentGateway>>,
}

impl GatewayRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the three production adapters
    pub fn from_config(config: &GatewaysConfig) -> Result<Self, AppError> {
        Ok(Self::new()
            .with(Arc::new(CardGateway::new(config.card.clone())?))
            .with(Arc::new(WalletGateway::new(config.wallet.clone())?))
            .with(Arc::new(QrGateway::new(config.qr.clone())?)))
    }

    pub fn with(mut self, gateway: Arc<dyn PaymentGateway>) -> Self {
        self.gateways.insert(gateway.provider(), gateway);
        self
    }

    pub fn get(&self, method: PaymentMethod) -> Result<Arc<dyn PaymentGateway>, AppError> {
        self.gateways
            .get(&method)
            .cloned()
            .ok_or_else(|| AppError::Config(format!("No gateway configured for {}", method)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_classification() {
        assert!(matches!(
            GatewayError::from_status(StatusCode::TOO_MANY_REQUESTS, ""),
            GatewayError::Unavailable(_)
        ));
        assert!(matches!(
            GatewayError::from_status(StatusCode::BAD_GATEWAY, "upstream"),
            GatewayError::Unavailable(_)
        ));
        assert!(matches!(
            GatewayError::from_status(StatusCode::PAYMENT_REQUIRED, "card_declined"),
            GatewayError::Rejected(_)
        ));
    }

    #[test]
    fn test_into_app_error_codes() {
        let err: AppError = GatewayError::Timeout("slow".to_string()).into();
        assert_eq!(err.error_code(), "GATEWAY_TIMEOUT");
        assert!(err.is_retryable());

        let err: AppError = GatewayError::Rejected("declined".to_string()).into();
        assert_eq!(err.error_code(), "GATEWAY_REJECTED");
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_truncate_respects_char_boundaries() {
        assert_eq!(truncate("ជំរាបសួរ", 2), "ជំ");
        assert_eq!(truncate("short", 200), "short");
    }
}
