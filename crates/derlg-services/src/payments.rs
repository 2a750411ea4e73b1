//! Payment flows
//!
//! Glue between the gateway adapters and the booking state machine: start an
//! attempt, resolve it after the client's part, and read provider status.

use chrono::{DateTime, Utc};
use derlg_cache::{keys::payment_status_key, RedisCache};
use derlg_core::models::{
    AttemptState, Booking, BookingStatus, Currency, PaymentAttempt, PaymentMethod, PaymentType,
    ProviderStatus,
};
use derlg_core::traits::CacheService;
use derlg_core::{AppError, AppResult};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::booking_state_machine::{Actor, BookingService};
use crate::gateways::GatewayRegistry;

/// A started payment
#[derive(Debug, Clone, Serialize)]
pub struct PaymentInitiation {
    pub booking_id: Uuid,
    pub booking_number: String,
    pub provider: PaymentMethod,
    pub reference: String,
    pub amount: Decimal,
    pub currency: Currency,
    pub payment_type: PaymentType,
    /// Which installment of the schedule this payment settles
    pub installment: u8,
    pub client_payload: serde_json::Value,
}

/// Result of a verify call
#[derive(Debug, Clone, Serialize)]
pub struct PaymentVerification {
    pub reference: String,
    pub attempt_state: AttemptState,
    /// What the provider said, absent when the attempt was already closed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider_status: Option<ProviderStatus>,
    pub booking: Booking,
}

/// Provider status as last seen
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentStatusSnapshot {
    pub reference: String,
    pub provider: PaymentMethod,
    pub status: ProviderStatus,
    pub checked_at: DateTime<Utc>,
}

/// Payment service
pub struct PaymentService {
    bookings: Arc<BookingService>,
    gateways: GatewayRegistry,
    cache: Option<Arc<RedisCache>>,
    status_ttl_secs: u64,
}

impl PaymentService {
    pub fn new(
        bookings: Arc<BookingService>,
        gateways: GatewayRegistry,
        cache: Option<Arc<RedisCache>>,
        status_ttl_secs: u64,
    ) -> Self {
        Self {
            bookings,
            gateways,
            cache,
            status_ttl_secs,
        }
    }

    /// Attempt `reference` of a booking the actor owns
    async fn owned_attempt(
        &self,
        booking_id: Uuid,
        reference: &str,
        actor: &Actor,
    ) -> AppResult<(Booking, PaymentAttempt)> {
        let booking = self.bookings.get_owned(booking_id, actor).await?;
        let attempt = self.bookings.load_attempt(reference).await?;
        if attempt.booking_id != booking.id {
            return Err(AppError::PaymentAttemptNotFound(reference.to_string()));
        }
        Ok((booking, attempt))
    }

    /// Open a payment attempt with the provider for the amount due now
    ///
    /// On a pending booking this is the first installment of the chosen
    /// structure. On a confirmed booking with a partial payment it is what is
    /// left of the next unpaid installment.
    ///
    /// # Errors
    ///
    /// - `InvalidBookingState` unless the booking is pending, or confirmed with a balance
    /// - `PaymentAlreadyInProgress` while another attempt is open
    /// - gateway errors from the provider call; nothing is stored then
    #[instrument(skip(self, actor), fields(requester_id = %actor.requester_id))]
    pub async fn create_payment(
        &self,
        method: PaymentMethod,
        booking_id: Uuid,
        actor: &Actor,
    ) -> AppResult<PaymentInitiation> {
        let booking = self.bookings.get_owned(booking_id, actor).await?;

        let balance = booking.status == BookingStatus::Confirmed;
        let (amount, installment) = if balance {
            let next = self
                .bookings
                .next_installment(&booking, Utc::now().date_naive())
                .await?;
            (next.amount_outstanding, next.installment.installment)
        } else {
            self.bookings.ensure_can_attach(&booking).await?;
            let amount = self.bookings.composer().amount_due(
                booking.payment.payment_type,
                booking.pricing.total,
                booking.payment.deposit_percentage,
            );
            (amount, 1)
        };

        let gateway = self.gateways.get(method)?;
        let payment = gateway.create(&booking, amount).await.map_err(|e| {
            warn!(
                "{} refused payment for booking {}: {}",
                method, booking.booking_number, e
            );
            AppError::from(e)
        })?;

        let attempt = PaymentAttempt::new(
            booking.id,
            payment.reference,
            method,
            amount,
            booking.pricing.currency,
            booking.payment.payment_type,
            payment.client_payload,
        );
        let updated = if balance {
            self.bookings.attach_installment(&booking, &attempt).await?
        } else {
            self.bookings.attach_payment(&booking, &attempt).await?
        };

        info!(
            "Started {} payment {} of {} {} for booking {} (installment {})",
            method,
            attempt.gateway_reference,
            amount,
            attempt.currency,
            updated.booking_number,
            installment
        );

        Ok(PaymentInitiation {
            booking_id: updated.id,
            booking_number: updated.booking_number,
            provider: method,
            reference: attempt.gateway_reference,
            amount,
            currency: attempt.currency,
            payment_type: attempt.payment_type,
            installment,
            client_payload: attempt.client_payload,
        })
    }

    /// Resolve an attempt after the client finished its part
    ///
    /// Verifying a closed attempt does not call the provider again and
    /// returns the stored outcome.
    #[instrument(skip(self, actor), fields(requester_id = %actor.requester_id))]
    pub async fn verify_payment(
        &self,
        method: PaymentMethod,
        booking_id: Uuid,
        reference: &str,
        actor: &Actor,
    ) -> AppResult<PaymentVerification> {
        let (booking, attempt) = self.owned_attempt(booking_id, reference, actor).await?;

        if attempt.provider != method {
            return Err(AppError::Validation(format!(
                "Payment {} was made with {}, not {}",
                reference, attempt.provider, method
            )));
        }

        if !attempt.is_open() {
            debug!("Attempt {} already closed as {}", reference, attempt.terminal_state);
            return Ok(PaymentVerification {
                reference: reference.to_string(),
                attempt_state: attempt.terminal_state,
                provider_status: None,
                booking,
            });
        }

        let gateway = self.gateways.get(method)?;
        let status = gateway.verify(&booking, reference).await?;

        let booking = match status.terminal_state() {
            Some(AttemptState::Succeeded) => self.bookings.confirm_payment(reference).await?,
            Some(state) => self.bookings.fail_payment(reference, state).await?,
            None => {
                self.bookings.touch_attempt(reference).await?;
                booking
            }
        };

        let attempt_state = self.bookings.load_attempt(reference).await?.terminal_state;
        info!(
            "Verified {} payment {}: provider {}, attempt {}",
            method, reference, status, attempt_state
        );

        Ok(PaymentVerification {
            reference: reference.to_string(),
            attempt_state,
            provider_status: Some(status),
            booking,
        })
    }

    /// Capture an approved wallet order
    pub async fn capture(&self, booking_id: Uuid, reference: &str, actor: &Actor) -> AppResult<PaymentVerification> {
        self.verify_payment(PaymentMethod::Wallet, booking_id, reference, actor)
            .await
    }

    /// Read provider status, cache-aside
    ///
    /// Read-only: the booking is not touched. Only the booking's owner or an
    /// operator may look. Cache failures fall through to the provider.
    #[instrument(skip(self, actor), fields(requester_id = %actor.requester_id))]
    pub async fn status(
        &self,
        method: PaymentMethod,
        reference: &str,
        actor: &Actor,
    ) -> AppResult<PaymentStatusSnapshot> {
        let attempt = self.bookings.load_attempt(reference).await?;
        self.bookings.get(attempt.booking_id, actor).await?;
        if attempt.provider != method {
            return Err(AppError::PaymentAttemptNotFound(reference.to_string()));
        }

        let key = payment_status_key(reference);

        if let Some(cache) = &self.cache {
            match cache.get::<PaymentStatusSnapshot>(&key).await {
                Ok(Some(snapshot)) if snapshot.provider == method => return Ok(snapshot),
                Ok(_) => {}
                Err(e) => warn!("Status cache read failed for {}: {}", reference, e),
            }
        }

        let gateway = self.gateways.get(method)?;
        let status = gateway.get_status(reference).await?;

        let snapshot = PaymentStatusSnapshot {
            reference: reference.to_string(),
            provider: method,
            status,
            checked_at: Utc::now(),
        };

        if let Some(cache) = &self.cache {
            if let Err(e) = cache.set(&key, &snapshot, self.status_ttl_secs).await {
                warn!("Status cache write failed for {}: {}", reference, e);
            }
        }

        Ok(snapshot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateways::{GatewayError, QrGateway};
    use crate::testing::{room, FakeGateway, TestEnv};
    use derlg_core::config::QrGatewayConfig;
    use derlg_core::models::{BookingStatus, PaymentStatus, RequesterRole};
    use derlg_core::traits::BookingEventKind;
    use rust_decimal_macros::dec;

    fn owner() -> Actor {
        Actor::new("u1", RequesterRole::Customer)
    }

    fn service(env: &TestEnv, gateway: Arc<FakeGateway>) -> PaymentService {
        PaymentService::new(
            env.bookings.clone(),
            GatewayRegistry::new().with(gateway),
            None,
            5,
        )
    }

    #[tokio::test]
    async fn test_create_charges_amount_due() {
        let env = TestEnv::new();
        let unit = env.store.add_unit(room(2));
        let booking = env.pending_booking(&unit, "u1", 30).await;

        let gateway = FakeGateway::always(PaymentMethod::Card, ProviderStatus::Pending);
        let payments = service(&env, gateway.clone());

        let started = payments
            .create_payment(PaymentMethod::Card, booking.id, &owner())
            .await
            .unwrap();

        // 2 nights at 100 plus 10% tax, paid in full with 5% off
        assert_eq!(started.amount, dec!(209.00));
        assert_eq!(started.reference, "fake-1");
        assert_eq!(gateway.created_amounts(), vec![dec!(209.00)]);

        let stored = env.store.booking(booking.id);
        assert_eq!(stored.payment.status, PaymentStatus::Pending);
        assert_eq!(stored.payment.gateway_reference.as_deref(), Some("fake-1"));
    }

    #[tokio::test]
    async fn test_balance_payment_completes_deposit_booking() {
        let env = TestEnv::new();
        let unit = env.store.add_unit(room(2));
        let booking = env
            .booking_paid_by(&unit, "u1", 30, PaymentType::Deposit)
            .await;

        let gateway = FakeGateway::always(PaymentMethod::Card, ProviderStatus::Pending);
        let payments = service(&env, gateway.clone());

        // 60% of 220.00 now, the rest as a balance payment
        let first = payments
            .create_payment(PaymentMethod::Card, booking.id, &owner())
            .await
            .unwrap();
        assert_eq!(first.amount, dec!(132.00));
        assert_eq!(first.installment, 1);

        let confirmed = env.bookings.confirm_payment(&first.reference).await.unwrap();
        assert_eq!(confirmed.status, BookingStatus::Confirmed);
        assert_eq!(confirmed.payment.status, PaymentStatus::Partial);

        let second = payments
            .create_payment(PaymentMethod::Card, booking.id, &owner())
            .await
            .unwrap();
        assert_eq!(second.amount, dec!(88.00));
        assert_eq!(second.installment, 2);

        let open = env.store.booking(booking.id);
        assert_eq!(open.status, BookingStatus::Confirmed);
        assert_eq!(open.payment.status, PaymentStatus::Partial);
        assert_eq!(open.payment.gateway_reference.as_deref(), Some("fake-2"));

        let settled = env.bookings.confirm_payment(&second.reference).await.unwrap();
        assert_eq!(settled.status, BookingStatus::Confirmed);
        assert_eq!(settled.payment.status, PaymentStatus::Completed);
        assert_eq!(env.bookings.amount_paid(booking.id).await.unwrap(), dec!(220.00));
        assert!(env
            .notifier
            .kinds()
            .contains(&BookingEventKind::InstallmentPaid));

        let err = payments
            .create_payment(PaymentMethod::Card, booking.id, &owner())
            .await
            .unwrap_err();
        assert_eq!(err.error_code(), "INVALID_BOOKING_STATE");
        assert_eq!(gateway.created_amounts(), vec![dec!(132.00), dec!(88.00)]);
    }

    #[tokio::test]
    async fn test_milestone_stays_partial_until_last_installment() {
        let env = TestEnv::new();
        let unit = env.store.add_unit(room(2));
        let booking = env
            .partly_paid_booking(&unit, "u1", 30, PaymentType::Milestone)
            .await;
        assert_eq!(booking.payment.status, PaymentStatus::Partial);

        let gateway = FakeGateway::always(PaymentMethod::Card, ProviderStatus::Pending);
        let payments = service(&env, gateway.clone());

        let second = payments
            .create_payment(PaymentMethod::Card, booking.id, &owner())
            .await
            .unwrap();
        assert_eq!((second.installment, second.amount), (2, dec!(55.00)));

        // Another start while the balance attempt is open is refused
        let err = payments
            .create_payment(PaymentMethod::Card, booking.id, &owner())
            .await
            .unwrap_err();
        assert_eq!(err.error_code(), "PAYMENT_ALREADY_IN_PROGRESS");

        let after_second = env.bookings.confirm_payment(&second.reference).await.unwrap();
        assert_eq!(after_second.payment.status, PaymentStatus::Partial);

        let third = payments
            .create_payment(PaymentMethod::Card, booking.id, &owner())
            .await
            .unwrap();
        assert_eq!((third.installment, third.amount), (3, dec!(55.00)));

        let done = env.bookings.confirm_payment(&third.reference).await.unwrap();
        assert_eq!(done.payment.status, PaymentStatus::Completed);
    }

    #[tokio::test]
    async fn test_failed_balance_attempt_keeps_booking_confirmed() {
        let env = TestEnv::new();
        let unit = env.store.add_unit(room(2));
        let booking = env
            .partly_paid_booking(&unit, "u1", 30, PaymentType::Deposit)
            .await;

        let gateway = FakeGateway::always(PaymentMethod::Card, ProviderStatus::Pending);
        let payments = service(&env, gateway.clone());

        let balance = payments
            .create_payment(PaymentMethod::Card, booking.id, &owner())
            .await
            .unwrap();
        let after = env
            .bookings
            .fail_payment(&balance.reference, AttemptState::Failed)
            .await
            .unwrap();
        assert_eq!(after.status, BookingStatus::Confirmed);
        assert_eq!(after.payment.status, PaymentStatus::Partial);

        let retry = payments
            .create_payment(PaymentMethod::Card, booking.id, &owner())
            .await
            .unwrap();
        assert_eq!(retry.amount, balance.amount);
    }

    #[tokio::test]
    async fn test_second_create_skips_provider() {
        let env = TestEnv::new();
        let unit = env.store.add_unit(room(2));
        let booking = env.pending_booking(&unit, "u1", 30).await;

        let gateway = FakeGateway::always(PaymentMethod::Card, ProviderStatus::Pending);
        let payments = service(&env, gateway.clone());

        payments
            .create_payment(PaymentMethod::Card, booking.id, &owner())
            .await
            .unwrap();
        let err = payments
            .create_payment(PaymentMethod::Card, booking.id, &owner())
            .await
            .unwrap_err();

        assert_eq!(err.error_code(), "PAYMENT_ALREADY_IN_PROGRESS");
        assert_eq!(gateway.created_amounts().len(), 1);
    }

    #[tokio::test]
    async fn test_create_by_stranger_is_forbidden() {
        let env = TestEnv::new();
        let unit = env.store.add_unit(room(2));
        let booking = env.pending_booking(&unit, "u1", 30).await;
        let payments = service(
            &env,
            FakeGateway::always(PaymentMethod::Card, ProviderStatus::Pending),
        );

        let err = payments
            .create_payment(
                PaymentMethod::Card,
                booking.id,
                &Actor::new("u2", RequesterRole::Customer),
            )
            .await
            .unwrap_err();
        assert_eq!(err.error_code(), "FORBIDDEN");
    }

    #[tokio::test]
    async fn test_verify_twice_confirms_once() {
        let env = TestEnv::new();
        let unit = env.store.add_unit(room(2));
        let booking = env.pending_booking(&unit, "u1", 30).await;

        let gateway = FakeGateway::always(PaymentMethod::Card, ProviderStatus::Succeeded);
        let payments = service(&env, gateway.clone());
        let started = payments
            .create_payment(PaymentMethod::Card, booking.id, &owner())
            .await
            .unwrap();

        let first = payments
            .verify_payment(PaymentMethod::Card, booking.id, &started.reference, &owner())
            .await
            .unwrap();
        let second = payments
            .verify_payment(PaymentMethod::Card, booking.id, &started.reference, &owner())
            .await
            .unwrap();

        assert_eq!(first.booking.status, BookingStatus::Confirmed);
        assert_eq!(first.attempt_state, AttemptState::Succeeded);
        assert_eq!(second.booking.status, BookingStatus::Confirmed);
        assert_eq!(second.booking.version, first.booking.version);
        assert_eq!(second.provider_status, None);
        assert_eq!(gateway.calls(), 1);
    }

    #[tokio::test]
    async fn test_verify_pending_leaves_attempt_open() {
        let env = TestEnv::new();
        let unit = env.store.add_unit(room(2));
        let booking = env.pending_booking(&unit, "u1", 30).await;

        let payments = service(
            &env,
            FakeGateway::always(PaymentMethod::Card, ProviderStatus::RequiresAction),
        );
        let started = payments
            .create_payment(PaymentMethod::Card, booking.id, &owner())
            .await
            .unwrap();

        let result = payments
            .verify_payment(PaymentMethod::Card, booking.id, &started.reference, &owner())
            .await
            .unwrap();
        assert_eq!(result.attempt_state, AttemptState::None);
        assert_eq!(result.booking.status, BookingStatus::Pending);
        assert!(env.store.attempt(&started.reference).last_checked_at.is_some());
    }

    #[tokio::test]
    async fn test_verify_failure_allows_retry() {
        let env = TestEnv::new();
        let unit = env.store.add_unit(room(2));
        let booking = env.pending_booking(&unit, "u1", 30).await;

        let payments = service(
            &env,
            FakeGateway::always(PaymentMethod::Card, ProviderStatus::Failed),
        );
        let started = payments
            .create_payment(PaymentMethod::Card, booking.id, &owner())
            .await
            .unwrap();

        let result = payments
            .verify_payment(PaymentMethod::Card, booking.id, &started.reference, &owner())
            .await
            .unwrap();
        assert_eq!(result.attempt_state, AttemptState::Failed);
        assert_eq!(result.booking.status, BookingStatus::Pending);
        assert_eq!(result.booking.payment.status, PaymentStatus::Failed);

        let retry = payments
            .create_payment(PaymentMethod::Card, booking.id, &owner())
            .await
            .unwrap();
        assert_ne!(retry.reference, started.reference);
    }

    #[tokio::test]
    async fn test_qr_retry_after_expiry_confirms() {
        let env = TestEnv::new();
        let unit = env.store.add_unit(room(2));
        let booking = env.pending_booking(&unit, "u1", 30).await;

        let qr = QrGateway::new(QrGatewayConfig::default()).unwrap();
        let payments = PaymentService::new(
            env.bookings.clone(),
            GatewayRegistry::new().with(Arc::new(qr)),
            None,
            5,
        );

        let first = payments
            .create_payment(PaymentMethod::Qr, booking.id, &owner())
            .await
            .unwrap();
        env.bookings
            .fail_payment(&first.reference, AttemptState::Expired)
            .await
            .unwrap();

        let retry = payments
            .create_payment(PaymentMethod::Qr, booking.id, &owner())
            .await
            .unwrap();
        assert_ne!(retry.reference, first.reference);

        let confirmed = env.bookings.confirm_payment(&retry.reference).await.unwrap();
        assert_eq!(confirmed.status, BookingStatus::Confirmed);
        assert_eq!(
            env.store.attempt(&first.reference).terminal_state,
            AttemptState::Expired
        );
        assert_eq!(
            env.store.attempt(&retry.reference).terminal_state,
            AttemptState::Succeeded
        );
    }

    #[tokio::test]
    async fn test_reused_reference_is_rejected() {
        let env = TestEnv::new();
        let unit = env.store.add_unit(room(2));
        let booking = env.pending_booking(&unit, "u1", 30).await;

        let attempt = env.open_attempt(&booking, "pi_dup").await;
        env.bookings
            .fail_payment(&attempt.gateway_reference, AttemptState::Failed)
            .await
            .unwrap();

        let current = env.store.booking(booking.id);
        let again = PaymentAttempt::new(
            booking.id,
            "pi_dup".to_string(),
            PaymentMethod::Card,
            current.pricing.total,
            current.pricing.currency,
            current.payment.payment_type,
            serde_json::Value::Null,
        );
        let err = env.bookings.attach_payment(&current, &again).await.unwrap_err();
        assert_eq!(err.error_code(), "GATEWAY_REJECTED");
        assert_eq!(env.store.attempts_for(booking.id).len(), 1);
    }

    #[tokio::test]
    async fn test_verify_with_wrong_provider_is_refused() {
        let env = TestEnv::new();
        let unit = env.store.add_unit(room(2));
        let booking = env.pending_booking(&unit, "u1", 30).await;

        let payments = PaymentService::new(
            env.bookings.clone(),
            GatewayRegistry::new()
                .with(FakeGateway::always(PaymentMethod::Card, ProviderStatus::Pending))
                .with(FakeGateway::always(PaymentMethod::Wallet, ProviderStatus::Succeeded)),
            None,
            5,
        );
        let started = payments
            .create_payment(PaymentMethod::Card, booking.id, &owner())
            .await
            .unwrap();

        let err = payments
            .capture(booking.id, &started.reference, &owner())
            .await
            .unwrap_err();
        assert_eq!(err.error_code(), "VALIDATION_ERROR");
        assert_eq!(env.store.booking(booking.id).status, BookingStatus::Pending);
    }

    #[tokio::test]
    async fn test_gateway_error_leaves_no_attempt() {
        let env = TestEnv::new();
        let unit = env.store.add_unit(room(2));
        let booking = env.pending_booking(&unit, "u1", 30).await;

        let gateway = FakeGateway::failing_create(
            PaymentMethod::Qr,
            GatewayError::Unavailable("maintenance".to_string()),
        );
        let payments = service(&env, gateway);

        let err = payments
            .create_payment(PaymentMethod::Qr, booking.id, &owner())
            .await
            .unwrap_err();
        assert_eq!(err.error_code(), "GATEWAY_UNAVAILABLE");
        assert!(env.store.attempts_for(booking.id).is_empty());
        assert_eq!(env.store.booking(booking.id).payment.status, PaymentStatus::Unpaid);
    }

    #[tokio::test]
    async fn test_status_reads_provider() {
        let env = TestEnv::new();
        let unit = env.store.add_unit(room(2));
        let booking = env.pending_booking(&unit, "u1", 30).await;
        env.open_qr_attempt(&booking, "md5-x").await;

        let gateway = FakeGateway::always(PaymentMethod::Qr, ProviderStatus::Expired);
        let payments = service(&env, gateway.clone());

        let snapshot = payments
            .status(PaymentMethod::Qr, "md5-x", &owner())
            .await
            .unwrap();
        assert_eq!(snapshot.status, ProviderStatus::Expired);
        assert_eq!(snapshot.provider, PaymentMethod::Qr);
        assert!(env.store.attempt("md5-x").is_open());

        let operator = Actor::new("hotel-1", RequesterRole::HotelAdmin);
        assert!(payments.status(PaymentMethod::Qr, "md5-x", &operator).await.is_ok());
        assert_eq!(gateway.calls(), 2);
    }

    #[tokio::test]
    async fn test_status_is_limited_to_owner() {
        let env = TestEnv::new();
        let unit = env.store.add_unit(room(2));
        let booking = env.pending_booking(&unit, "u1", 30).await;
        env.open_qr_attempt(&booking, "md5-y").await;

        let gateway = FakeGateway::always(PaymentMethod::Qr, ProviderStatus::Succeeded);
        let payments = service(&env, gateway.clone());

        let err = payments
            .status(
                PaymentMethod::Qr,
                "md5-y",
                &Actor::new("u2", RequesterRole::Customer),
            )
            .await
            .unwrap_err();
        assert_eq!(err.error_code(), "FORBIDDEN");

        let err = payments
            .status(PaymentMethod::Qr, "md5-unknown", &owner())
            .await
            .unwrap_err();
        assert_eq!(err.error_code(), "PAYMENT_ATTEMPT_NOT_FOUND");

        let err = payments
            .status(PaymentMethod::Card, "md5-y", &owner())
            .await
            .unwrap_err();
        assert_eq!(err.error_code(), "PAYMENT_ATTEMPT_NOT_FOUND");
        assert_eq!(gateway.calls(), 0);
    }
}
