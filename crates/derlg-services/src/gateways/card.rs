//! Card payment-intent provider
//!
//! Create returns a client secret; the client confirms the card itself and
//! then asks us to verify, which is a plain status read.

use async_trait::async_trait;
use derlg_core::config::CardGatewayConfig;
use derlg_core::models::{Booking, PaymentMethod, ProviderStatus};
use derlg_core::AppError;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, info, instrument, warn};

use super::{http_client, GatewayError, GatewayPayment, PaymentGateway};

#[derive(Debug, Deserialize)]
struct PaymentIntent {
    id: String,
    #[serde(default)]
    client_secret: Option<String>,
    status: String,
    #[serde(default)]
    last_payment_error: Option<serde_json::Value>,
}

impl PaymentIntent {
    fn provider_status(&self) -> ProviderStatus {
        match self.status.as_str() {
            "succeeded" => ProviderStatus::Succeeded,
            "canceled" => ProviderStatus::Failed,
            "requires_payment_method" if self.last_payment_error.is_some() => {
                ProviderStatus::Failed
            }
            "requires_action" | "requires_confirmation" => ProviderStatus::RequiresAction,
            _ => ProviderStatus::Pending,
        }
    }
}

/// Minor currency units, as the provider expects
fn to_minor_units(amount: Decimal) -> Result<i64, GatewayError> {
    (amount * Decimal::ONE_HUNDRED)
        .round()
        .to_i64()
        .ok_or_else(|| GatewayError::Rejected(format!("Amount out of range: {}", amount)))
}

/// Card gateway
pub struct CardGateway {
    client: reqwest::Client,
    config: CardGatewayConfig,
}

impl CardGateway {
    pub fn new(config: CardGatewayConfig) -> Result<Self, AppError> {
        Ok(Self {
            client: http_client(config.timeout_secs)?,
            config,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.api_url.trim_end_matches('/'), path)
    }

    async fn read_intent(resp: reqwest::Response) -> Result<PaymentIntent, GatewayError> {
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            warn!("Card provider returned {}: {}", status, body);
            return Err(GatewayError::from_status(status, &body));
        }
        Ok(resp.json::<PaymentIntent>().await?)
    }
}

#[async_trait]
impl PaymentGateway for CardGateway {
    fn provider(&self) -> PaymentMethod {
        PaymentMethod::Card
    }

    #[instrument(skip(self, booking), fields(booking_number = %booking.booking_number))]
    async fn create(&self, booking: &Booking, amount: Decimal) -> Result<GatewayPayment, GatewayError> {
        let form = [
            ("amount", to_minor_units(amount)?.to_string()),
            ("currency", booking.pricing.currency.to_string().to_lowercase()),
            ("metadata[booking_id]", booking.id.to_string()),
            ("metadata[booking_number]", booking.booking_number.clone()),
        ];

        let resp = self
            .client
            .post(self.url("/v1/payment_intents"))
            .bearer_auth(&self.config.secret_key)
            .form(&form)
            .send()
            .await?;
        let intent = Self::read_intent(resp).await?;

        info!("Created payment intent {} for {}", intent.id, amount);

        Ok(GatewayPayment {
            client_payload: json!({
                "client_secret": intent.client_secret,
                "payment_intent_id": intent.id,
            }),
            reference: intent.id,
        })
    }

    #[instrument(skip(self))]
    async fn get_status(&self, reference: &str) -> Result<ProviderStatus, GatewayError> {
        let resp = self
            .client
            .get(self.url(&format!("/v1/payment_intents/{}", reference)))
            .bearer_auth(&self.config.secret_key)
            .send()
            .await?;
        let intent = Self::read_intent(resp).await?;

        debug!("Payment intent {} is {}", reference, intent.status);
        Ok(intent.provider_status())
    }

    async fn verify(&self, _booking: &Booking, reference: &str) -> Result<ProviderStatus, GatewayError> {
        self.get_status(reference).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::sample_booking;
    use httpmock::prelude::*;
    use rust_decimal_macros::dec;

    fn gateway(base_url: String) -> CardGateway {
        CardGateway::new(CardGatewayConfig {
            api_url: base_url,
            secret_key: "sk_test_123".to_string(),
            timeout_secs: 5,
        })
        .unwrap()
    }

    #[test]
    fn test_minor_units() {
        assert_eq!(to_minor_units(dec!(600.00)).unwrap(), 60000);
        assert_eq!(to_minor_units(dec!(19.99)).unwrap(), 1999);
    }

    #[test]
    fn test_status_mapping() {
        let intent = |status: &str, error: Option<serde_json::Value>| PaymentIntent {
            id: "pi_1".to_string(),
            client_secret: None,
            status: status.to_string(),
            last_payment_error: error,
        };

        assert_eq!(intent("succeeded", None).provider_status(), ProviderStatus::Succeeded);
        assert_eq!(intent("canceled", None).provider_status(), ProviderStatus::Failed);
        assert_eq!(
            intent("requires_payment_method", None).provider_status(),
            ProviderStatus::Pending
        );
        assert_eq!(
            intent("requires_payment_method", Some(json!({"code": "card_declined"}))).provider_status(),
            ProviderStatus::Failed
        );
        assert_eq!(
            intent("requires_action", None).provider_status(),
            ProviderStatus::RequiresAction
        );
        assert_eq!(intent("processing", None).provider_status(), ProviderStatus::Pending);
    }

    #[tokio::test]
    async fn test_create_returns_client_secret() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/v1/payment_intents")
                    .header("authorization", "Bearer sk_test_123");
                then.status(200).json_body(serde_json::json!({
                    "id": "pi_abc",
                    "client_secret": "pi_abc_secret_xyz",
                    "status": "requires_payment_method"
                }));
            })
            .await;

        let payment = gateway(server.base_url())
            .create(&sample_booking(), dec!(600.00))
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(payment.reference, "pi_abc");
        assert_eq!(payment.client_payload["client_secret"], "pi_abc_secret_xyz");
    }

    #[tokio::test]
    async fn test_verify_reads_status() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/v1/payment_intents/pi_abc");
                then.status(200).json_body(serde_json::json!({
                    "id": "pi_abc",
                    "status": "succeeded"
                }));
            })
            .await;

        let status = gateway(server.base_url())
            .verify(&sample_booking(), "pi_abc")
            .await
            .unwrap();
        assert_eq!(status, ProviderStatus::Succeeded);
    }

    #[tokio::test]
    async fn test_declined_create_is_rejected() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/v1/payment_intents");
                then.status(402)
                    .json_body(serde_json::json!({"error": {"code": "card_declined"}}));
            })
            .await;

        let err = gateway(server.base_url())
            .create(&sample_booking(), dec!(10))
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::Rejected(_)));
    }

    #[tokio::test]
    async fn test_server_error_is_unavailable() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/v1/payment_intents/pi_down");
                then.status(503);
            })
            .await;

        let err = gateway(server.base_url()).get_status("pi_down").await.unwrap_err();
        assert!(err.is_retryable());
    }
}
