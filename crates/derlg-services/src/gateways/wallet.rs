//! Wallet redirect provider
//!
//! The guest approves the order on the provider's site and comes back; the
//! order is then captured explicitly. OAuth access tokens are cached until
//! shortly before they expire.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use derlg_core::config::WalletGatewayConfig;
use derlg_core::models::{Booking, PaymentMethod, ProviderStatus};
use derlg_core::AppError;
use parking_lot::Mutex;
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, info, instrument, warn};

use super::{http_client, GatewayError, GatewayPayment, PaymentGateway};
use crate::constants::WALLET_TOKEN_REFRESH_MARGIN_SECS;

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: i64,
}

#[derive(Debug, Clone)]
struct CachedToken {
    value: String,
    refresh_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
struct OrderLink {
    href: String,
    rel: String,
}

#[derive(Debug, Deserialize)]
struct Order {
    id: String,
    status: String,
    #[serde(default)]
    links: Vec<OrderLink>,
}

impl Order {
    fn approval_url(&self) -> Option<&str> {
        self.links
            .iter()
            .find(|l| l.rel == "approve" || l.rel == "payer-action")
            .map(|l| l.href.as_str())
    }
}

fn order_status(status: &str) -> ProviderStatus {
    match status {
        "APPROVED" => ProviderStatus::Approved,
        "COMPLETED" => ProviderStatus::Succeeded,
        "VOIDED" => ProviderStatus::Voided,
        // CREATED, SAVED, PAYER_ACTION_REQUIRED
        _ => ProviderStatus::Pending,
    }
}

/// Wallet gateway
pub struct WalletGateway {
    client: reqwest::Client,
    config: WalletGatewayConfig,
    token: Mutex<Option<CachedToken>>,
}

impl WalletGateway {
    pub fn new(config: WalletGatewayConfig) -> Result<Self, AppError> {
        Ok(Self {
            client: http_client(config.timeout_secs)?,
            config,
            token: Mutex::new(None),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.api_url.trim_end_matches('/'), path)
    }

    async fn access_token(&self) -> Result<String, GatewayError> {
        {
            let cached = self.token.lock();
            if let Some(token) = cached.as_ref() {
                if Utc::now() < token.refresh_at {
                    return Ok(token.value.clone());
                }
            }
        }

        debug!("Requesting wallet access token");
        let resp = self
            .client
            .post(self.url("/v1/oauth2/token"))
            .basic_auth(&self.config.client_id, Some(&self.config.client_secret))
            .form(&[("grant_type", "client_credentials")])
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            warn!("Wallet token request failed with {}", status);
            return Err(GatewayError::from_status(status, &body));
        }

        let token: TokenResponse = resp.json().await?;
        let refresh_at = Utc::now()
            + Duration::seconds((token.expires_in - WALLET_TOKEN_REFRESH_MARGIN_SECS).max(0));

        *self.token.lock() = Some(CachedToken {
            value: token.access_token.clone(),
            refresh_at,
        });

        Ok(token.access_token)
    }

    async fn read_order(resp: reqwest::Response) -> Result<Order, GatewayError> {
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            warn!("Wallet provider returned {}: {}", status, body);
            return Err(GatewayError::from_status(status, &body));
        }
        Ok(resp.json::<Order>().await?)
    }

    /// Capture an approved order
    ///
    /// Anything but `COMPLETED` afterwards counts as a failed payment.
    #[instrument(skip(self))]
    pub async fn capture(&self, reference: &str) -> Result<ProviderStatus, GatewayError> {
        let token = self.access_token().await?;
        let resp = self
            .client
            .post(self.url(&format!("/v2/checkout/orders/{}/capture", reference)))
            .bearer_auth(token)
            .json(&json!({}))
            .send()
            .await?;
        let order = Self::read_order(resp).await?;

        if order.status == "COMPLETED" {
            info!("Captured wallet order {}", reference);
            Ok(ProviderStatus::Succeeded)
        } else {
            warn!("Capture of wallet order {} ended in {}", reference, order.status);
            Ok(ProviderStatus::Failed)
        }
    }
}

#[async_trait]
impl PaymentGateway for WalletGateway {
    fn provider(&self) -> PaymentMethod {
        PaymentMethod::Wallet
    }

    #[instrument(skip(self, booking), fields(booking_number = %booking.booking_number))]
    async fn create(&self, booking: &Booking, amount: Decimal) -> Result<GatewayPayment, GatewayError> {
        let token = self.access_token().await?;

        let body = json!({
            "intent": "CAPTURE",
            "purchase_units": [{
                "reference_id": booking.booking_number,
                "amount": {
                    "currency_code": booking.pricing.currency.to_string(),
                    "value": format!("{:.2}", amount),
                },
            }],
            "application_context": {
                "return_url": self.config.return_url,
                "cancel_url": self.config.cancel_url,
                "user_action": "PAY_NOW",
            },
        });

        let resp = self
            .client
            .post(self.url("/v2/checkout/orders"))
            .bearer_auth(token)
            .json(&body)
            .send()
            .await?;
        let order = Self::read_order(resp).await?;

        let approval_url = order.approval_url().map(str::to_string).ok_or_else(|| {
            GatewayError::Unavailable(format!("Order {} has no approval link", order.id))
        })?;

        info!("Created wallet order {} for {}", order.id, amount);

        Ok(GatewayPayment {
            client_payload: json!({
                "order_id": order.id,
                "approval_url": approval_url,
            }),
            reference: order.id,
        })
    }

    #[instrument(skip(self))]
    async fn get_status(&self, reference: &str) -> Result<ProviderStatus, GatewayError> {
        let token = self.access_token().await?;
        let resp = self
            .client
            .get(self.url(&format!("/v2/checkout/orders/{}", reference)))
            .bearer_auth(token)
            .send()
            .await?;
        let order = Self::read_order(resp).await?;

        debug!("Wallet order {} is {}", reference, order.status);
        Ok(order_status(&order.status))
    }

    async fn verify(&self, _booking: &Booking, reference: &str) -> Result<ProviderStatus, GatewayError> {
        match self.get_status(reference).await? {
            ProviderStatus::Approved => self.capture(reference).await,
            ProviderStatus::Voided => Ok(ProviderStatus::Failed),
            other => Ok(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::sample_booking;
    use httpmock::prelude::*;
    use rust_decimal_macros::dec;

    fn gateway(base_url: String) -> WalletGateway {
        WalletGateway::new(WalletGatewayConfig {
            api_url: base_url,
            client_id: "client".to_string(),
            client_secret: "secret".to_string(),
            return_url: "https://derlg.test/return".to_string(),
            cancel_url: "https://derlg.test/cancel".to_string(),
            timeout_secs: 5,
        })
        .unwrap()
    }

    async fn mock_token(server: &MockServer) -> httpmock::Mock<'_> {
        server
            .mock_async(|when, then| {
                when.method(POST).path("/v1/oauth2/token");
                then.status(200).json_body(serde_json::json!({
                    "access_token": "A21AA",
                    "expires_in": 32400
                }));
            })
            .await
    }

    #[test]
    fn test_order_status_mapping() {
        assert_eq!(order_status("CREATED"), ProviderStatus::Pending);
        assert_eq!(order_status("PAYER_ACTION_REQUIRED"), ProviderStatus::Pending);
        assert_eq!(order_status("APPROVED"), ProviderStatus::Approved);
        assert_eq!(order_status("COMPLETED"), ProviderStatus::Succeeded);
        assert_eq!(order_status("VOIDED"), ProviderStatus::Voided);
    }

    #[tokio::test]
    async fn test_create_returns_approval_url_and_caches_token() {
        let server = MockServer::start_async().await;
        let token = mock_token(&server).await;
        let orders = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/v2/checkout/orders")
                    .header("authorization", "Bearer A21AA");
                then.status(201).json_body(serde_json::json!({
                    "id": "5O190127TN364715T",
                    "status": "CREATED",
                    "links": [
                        {"href": "https://wallet.test/orders/5O19", "rel": "self"},
                        {"href": "https://wallet.test/checkoutnow?token=5O19", "rel": "approve"}
                    ]
                }));
            })
            .await;

        let gw = gateway(server.base_url());
        let booking = sample_booking();
        let first = gw.create(&booking, dec!(95.00)).await.unwrap();
        gw.create(&booking, dec!(95.00)).await.unwrap();

        assert_eq!(first.reference, "5O190127TN364715T");
        assert_eq!(
            first.client_payload["approval_url"],
            "https://wallet.test/checkoutnow?token=5O19"
        );
        token.assert_hits_async(1).await;
        orders.assert_hits_async(2).await;
    }

    #[tokio::test]
    async fn test_verify_captures_approved_order() {
        let server = MockServer::start_async().await;
        mock_token(&server).await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/v2/checkout/orders/ORDER1");
                then.status(200)
                    .json_body(serde_json::json!({"id": "ORDER1", "status": "APPROVED"}));
            })
            .await;
        let capture = server
            .mock_async(|when, then| {
                when.method(POST).path("/v2/checkout/orders/ORDER1/capture");
                then.status(201)
                    .json_body(serde_json::json!({"id": "ORDER1", "status": "COMPLETED"}));
            })
            .await;

        let status = gateway(server.base_url())
            .verify(&sample_booking(), "ORDER1")
            .await
            .unwrap();

        assert_eq!(status, ProviderStatus::Succeeded);
        capture.assert_async().await;
    }

    #[tokio::test]
    async fn test_verify_does_not_recapture_completed_order() {
        let server = MockServer::start_async().await;
        mock_token(&server).await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/v2/checkout/orders/ORDER2");
                then.status(200)
                    .json_body(serde_json::json!({"id": "ORDER2", "status": "COMPLETED"}));
            })
            .await;
        let capture = server
            .mock_async(|when, then| {
                when.method(POST).path("/v2/checkout/orders/ORDER2/capture");
                then.status(201);
            })
            .await;

        let status = gateway(server.base_url())
            .verify(&sample_booking(), "ORDER2")
            .await
            .unwrap();

        assert_eq!(status, ProviderStatus::Succeeded);
        capture.assert_hits_async(0).await;
    }

    #[tokio::test]
    async fn test_verify_voided_is_failed() {
        let server = MockServer::start_async().await;
        mock_token(&server).await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/v2/checkout/orders/ORDER3");
                then.status(200)
                    .json_body(serde_json::json!({"id": "ORDER3", "status": "VOIDED"}));
            })
            .await;

        let status = gateway(server.base_url())
            .verify(&sample_booking(), "ORDER3")
            .await
            .unwrap();
        assert_eq!(status, ProviderStatus::Failed);
    }
}
