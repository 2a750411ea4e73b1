//! Booking event delivery
//!
//! Dispatch never blocks the caller and never reports delivery failures back
//! into the booking flow.

use derlg_core::config::NotificationConfig;
use derlg_core::traits::{BookingEvent, NotificationDispatcher};
use derlg_core::AppError;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Logs events and nothing else
#[derive(Debug, Default, Clone)]
pub struct LogNotifier;

impl NotificationDispatcher for LogNotifier {
    fn dispatch(&self, event: BookingEvent) {
        info!(
            event = %event.event,
            booking_id = %event.booking_id,
            booking_number = %event.booking_number,
            status = %event.status,
            installment = event.installment.as_ref().map(|i| i.installment.installment),
            "Booking event"
        );
    }
}

/// Posts events as JSON to a webhook
#[derive(Debug, Clone)]
pub struct WebhookNotifier {
    client: reqwest::Client,
    url: String,
}

impl WebhookNotifier {
    pub fn new(url: impl Into<String>, timeout_secs: u64) -> Result<Self, AppError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| AppError::Config(format!("Failed to build webhook client: {}", e)))?;

        Ok(Self {
            client,
            url: url.into(),
        })
    }

    /// Webhook dispatcher when a URL is configured, log-only otherwise
    pub fn from_config(config: &NotificationConfig) -> Result<Arc<dyn NotificationDispatcher>, AppError> {
        match &config.webhook_url {
            Some(url) if !url.trim().is_empty() => {
                info!("Booking events will be posted to {}", url);
                Ok(Arc::new(Self::new(url.trim(), config.timeout_secs)?))
            }
            _ => Ok(Arc::new(LogNotifier)),
        }
    }
}

impl NotificationDispatcher for WebhookNotifier {
    fn dispatch(&self, event: BookingEvent) {
        let handle = match tokio::runtime::Handle::try_current() {
            Ok(handle) => handle,
            Err(_) => {
                warn!(
                    event = %event.event,
                    booking_number = %event.booking_number,
                    "No async runtime, dropping booking event"
                );
                return;
            }
        };

        let client = self.client.clone();
        let url = self.url.clone();

        handle.spawn(async move {
            match client.post(&url).json(&event).send().await {
                Ok(resp) if resp.status().is_success() => {
                    debug!(event = %event.event, booking_number = %event.booking_number, "Webhook delivered");
                }
                Ok(resp) => {
                    warn!(
                        event = %event.event,
                        booking_number = %event.booking_number,
                        status = %resp.status(),
                        "Webhook rejected booking event"
                    );
                }
                Err(e) => {
                    warn!(
                        event = %event.event,
                        booking_number = %event.booking_number,
                        "Webhook delivery failed: {}",
                        e
                    );
                }
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use derlg_core::models::{
        Booking, DateRange, GuestDetails, PaymentMethod, PaymentType, PriceBreakdown,
    };
    use derlg_core::traits::BookingEventKind;
    use httpmock::prelude::*;
    use rust_decimal_macros::dec;
    use uuid::Uuid;

    fn event() -> BookingEvent {
        let check_in = chrono::NaiveDate::from_ymd_opt(2030, 2, 1).unwrap();
        let booking = Booking::new(
            Uuid::new_v4(),
            "user-1".to_string(),
            DateRange::single_day(check_in),
            1,
            GuestDetails::default(),
            PriceBreakdown::default(),
            PaymentMethod::Qr,
            PaymentType::Deposit,
            dec!(60),
        );
        BookingEvent::for_booking(BookingEventKind::Created, &booking)
    }

    #[test]
    fn test_from_config_without_url_logs_only() {
        let dispatcher = WebhookNotifier::from_config(&NotificationConfig::default()).unwrap();
        // No runtime needed for the log notifier
        dispatcher.dispatch(event());
    }

    #[test]
    fn test_webhook_without_runtime_drops_event() {
        let notifier = WebhookNotifier::new("http://127.0.0.1:9/hook", 1).unwrap();
        notifier.dispatch(event());
    }

    #[tokio::test]
    async fn test_webhook_posts_event() {
        let server = MockServer::start_async().await;
        let hook = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/hook")
                    .json_body_partial(r#"{"event": "booking.created"}"#);
                then.status(204);
            })
            .await;

        let notifier = WebhookNotifier::new(server.url("/hook"), 5).unwrap();
        notifier.dispatch(event());

        for _ in 0..50 {
            if hook.hits_async().await > 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        hook.assert_async().await;
    }
}
