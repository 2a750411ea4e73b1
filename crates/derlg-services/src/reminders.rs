//! Periodic installment reminders
//!
//! Runs `BookingService::send_installment_reminders` on a fixed interval
//! until its token is cancelled.

use chrono::Utc;
use derlg_core::config::BookingConfig;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::booking_state_machine::BookingService;

/// Background sweep reminding guests of upcoming installments
pub struct ReminderTask {
    bookings: Arc<BookingService>,
    every: Duration,
    lead_days: i64,
}

impl ReminderTask {
    pub fn new(bookings: Arc<BookingService>, every: Duration, lead_days: i64) -> Self {
        Self {
            bookings,
            every,
            lead_days,
        }
    }

    /// `None` when the configured interval is 0
    pub fn from_config(bookings: Arc<BookingService>, config: &BookingConfig) -> Option<Self> {
        if config.reminder_interval_secs == 0 {
            info!("Installment reminders disabled");
            return None;
        }
        Some(Self::new(
            bookings,
            Duration::from_secs(config.reminder_interval_secs),
            config.reminder_lead_days,
        ))
    }

    /// Sweep once now, then every interval, until `token` is cancelled
    pub fn spawn(self, token: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.every);
            info!(
                "Installment reminders every {:?}, {} days ahead",
                self.every, self.lead_days
            );

            loop {
                tokio::select! {
                    _ = token.cancelled() => {
                        debug!("Reminder task stopped");
                        return;
                    }
                    _ = ticker.tick() => {
                        let today = Utc::now().date_naive();
                        if let Err(e) = self.bookings.send_installment_reminders(today, self.lead_days).await {
                            warn!("Installment reminder sweep failed: {}", e);
                        }
                    }
                }
            }
        })
    }
}
