//! Payment reconciliation poller
//!
//! QR payments have no reliable webhook, so each open QR attempt is watched by
//! a spawned task that polls the provider until it sees a terminal status or
//! runs out of time. Terminal results go through `BookingService`; the task
//! never writes booking state itself.
//!
//! Monitors are registered per booking. Starting a second monitor for a
//! booking cancels the first, and cancelling a booking stops its monitor.
//! When Redis is available a lease keeps other instances from polling the
//! same booking.

use derlg_cache::{keys::qr_monitor_key, RedisCache};
use derlg_core::config::ReconciliationConfig;
use derlg_core::models::{AttemptState, BookingStatus, PaymentAttempt};
use derlg_core::{AppError, AppResult};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, timeout, Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use crate::booking_state_machine::{Actor, BookingService};
use crate::gateways::{GatewayError, GatewayRegistry};

/// How a monitor ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MonitorOutcome {
    Confirmed,
    Failed,
    Expired,
    /// Still pending at the deadline; the booking stays pending
    PendingTimeout,
    /// Stopped by the caller
    Cancelled,
    /// The attempt was closed by a booking cancellation or rejection
    Superseded,
}

impl MonitorOutcome {
    fn from_attempt_state(state: AttemptState) -> Option<Self> {
        match state {
            AttemptState::None => None,
            AttemptState::Succeeded => Some(MonitorOutcome::Confirmed),
            AttemptState::Failed => Some(MonitorOutcome::Failed),
            AttemptState::Expired => Some(MonitorOutcome::Expired),
            AttemptState::Superseded => Some(MonitorOutcome::Superseded),
        }
    }
}

impl fmt::Display for MonitorOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MonitorOutcome::Confirmed => write!(f, "confirmed"),
            MonitorOutcome::Failed => write!(f, "failed"),
            MonitorOutcome::Expired => write!(f, "expired"),
            MonitorOutcome::PendingTimeout => write!(f, "pending_timeout"),
            MonitorOutcome::Cancelled => write!(f, "cancelled"),
            MonitorOutcome::Superseded => write!(f, "superseded"),
        }
    }
}

/// Monitor input; timings in milliseconds
#[derive(Debug, Clone, Deserialize)]
pub struct MonitorRequest {
    pub booking_id: Uuid,
    pub reference: String,
    pub timeout_ms: Option<u64>,
    pub interval_ms: Option<u64>,
}

/// Terminal result of a monitor
#[derive(Debug, Clone, Serialize)]
pub struct MonitorResult {
    pub booking_id: Uuid,
    pub reference: String,
    pub outcome: MonitorOutcome,
    pub attempts: u32,
    pub booking_status: BookingStatus,
}

/// Effective timings after clamping
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MonitorTiming {
    pub timeout: Duration,
    pub interval: Duration,
    pub max_attempts: u32,
}

impl MonitorTiming {
    pub fn resolve(config: &ReconciliationConfig, timeout_ms: Option<u64>, interval_ms: Option<u64>) -> Self {
        let timeout_ms = timeout_ms
            .unwrap_or(config.default_timeout_ms)
            .min(config.max_timeout_ms);
        let interval_ms = interval_ms
            .unwrap_or(config.default_interval_ms)
            .max(config.min_interval_ms)
            .max(1);
        let max_attempts = u32::try_from(timeout_ms / interval_ms)
            .unwrap_or(u32::MAX)
            .max(1);

        Self {
            timeout: Duration::from_millis(timeout_ms),
            interval: Duration::from_millis(interval_ms),
            max_attempts,
        }
    }
}

struct ActiveMonitor {
    generation: u64,
    token: CancellationToken,
}

/// Per-booking registry of running monitors
#[derive(Clone, Default)]
pub struct MonitorRegistry {
    active: Arc<RwLock<HashMap<Uuid, ActiveMonitor>>>,
    generations: Arc<AtomicU64>,
}

impl MonitorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a monitor for `booking_id`, cancelling any previous one
    pub async fn register(&self, booking_id: Uuid) -> (u64, CancellationToken) {
        let generation = self.generations.fetch_add(1, Ordering::Relaxed) + 1;
        let token = CancellationToken::new();

        let mut active = self.active.write().await;
        if let Some(previous) = active.insert(
            booking_id,
            ActiveMonitor {
                generation,
                token: token.clone(),
            },
        ) {
            info!("Replacing monitor for booking {}", booking_id);
            previous.token.cancel();
        }

        (generation, token)
    }

    /// Stop the booking's monitor; false if none was running
    pub async fn cancel(&self, booking_id: Uuid) -> bool {
        let mut active = self.active.write().await;
        match active.remove(&booking_id) {
            Some(monitor) => {
                monitor.token.cancel();
                info!("Stopped monitor for booking {}", booking_id);
                true
            }
            None => false,
        }
    }

    /// Drop the entry if it still belongs to `generation`
    pub async fn remove_if_current(&self, booking_id: Uuid, generation: u64) -> bool {
        let mut active = self.active.write().await;
        match active.get(&booking_id) {
            Some(monitor) if monitor.generation == generation => {
                active.remove(&booking_id);
                true
            }
            _ => false,
        }
    }

    pub async fn is_active(&self, booking_id: Uuid) -> bool {
        self.active.read().await.contains_key(&booking_id)
    }

    pub async fn active_count(&self) -> usize {
        self.active.read().await.len()
    }
}

/// A spawned monitor
pub struct MonitorHandle {
    pub booking_id: Uuid,
    token: CancellationToken,
    join: JoinHandle<AppResult<MonitorResult>>,
}

impl MonitorHandle {
    /// Token that stops the monitor after its current poll
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Wait for the terminal result
    pub async fn join(self) -> AppResult<MonitorResult> {
        self.join.await.map_err(|e| {
            error!("Monitor task for booking {} failed: {}", self.booking_id, e);
            AppError::Internal(format!("Monitor task failed: {}", e))
        })?
    }
}

/// Polls providers for open QR attempts
pub struct ReconciliationPoller {
    bookings: Arc<BookingService>,
    gateways: GatewayRegistry,
    registry: MonitorRegistry,
    cache: Option<Arc<RedisCache>>,
    config: ReconciliationConfig,
    lease_secs: u64,
    instance_id: String,
}

impl ReconciliationPoller {
    pub fn new(
        bookings: Arc<BookingService>,
        gateways: GatewayRegistry,
        cache: Option<Arc<RedisCache>>,
        config: ReconciliationConfig,
        lease_secs: u64,
    ) -> Self {
        Self {
            registry: bookings.monitors().clone(),
            bookings,
            gateways,
            cache,
            config,
            lease_secs,
            instance_id: Uuid::new_v4().to_string(),
        }
    }

    pub fn registry(&self) -> &MonitorRegistry {
        &self.registry
    }

    /// Check ownership and start a monitor task
    ///
    /// # Errors
    ///
    /// - `Forbidden` if `actor` does not own the booking
    /// - `PaymentAttemptNotFound` if the reference is not an attempt of the booking
    /// - `PaymentAlreadyInProgress` if another instance holds the monitor lease
    #[instrument(skip(self, actor, request), fields(booking_id = %request.booking_id, reference = %request.reference))]
    pub async fn spawn(self: &Arc<Self>, actor: &Actor, request: MonitorRequest) -> AppResult<MonitorHandle> {
        let booking = self.bookings.get_owned(request.booking_id, actor).await?;
        let attempt = self.bookings.load_attempt(&request.reference).await?;
        if attempt.booking_id != booking.id {
            return Err(AppError::PaymentAttemptNotFound(request.reference));
        }

        let timing = MonitorTiming::resolve(&self.config, request.timeout_ms, request.interval_ms);

        self.acquire_lease(booking.id).await?;
        let (generation, token) = self.registry.register(booking.id).await;

        info!(
            "Monitoring {} for booking {} every {:?} for up to {:?} ({} polls)",
            attempt.gateway_reference,
            booking.booking_number,
            timing.interval,
            timing.timeout,
            timing.max_attempts
        );

        let poller = Arc::clone(self);
        let task_token = token.clone();
        let booking_id = booking.id;
        let join = tokio::spawn(async move {
            let result = poller.poll(attempt, timing, &task_token).await;
            poller.registry.remove_if_current(booking_id, generation).await;
            if !poller.registry.is_active(booking_id).await {
                poller.release_lease(booking_id).await;
            }
            result
        });

        Ok(MonitorHandle {
            booking_id,
            token,
            join,
        })
    }

    /// Start a monitor and wait for its terminal result
    pub async fn monitor(self: &Arc<Self>, actor: &Actor, request: MonitorRequest) -> AppResult<MonitorResult> {
        self.spawn(actor, request).await?.join().await
    }

    async fn acquire_lease(&self, booking_id: Uuid) -> AppResult<()> {
        let Some(cache) = &self.cache else {
            return Ok(());
        };

        let key = qr_monitor_key(&booking_id.to_string());

        match cache.try_lease(&key, &self.instance_id, self.lease_secs).await {
            Ok(true) => Ok(()),
            Ok(false) => match cache.lease_holder(&key).await {
                // Our own lease; the local registry replaces the old task
                Ok(Some(holder)) if holder == self.instance_id => Ok(()),
                Ok(_) => {
                    warn!("Monitor lease for booking {} held by another instance", booking_id);
                    Err(AppError::PaymentAlreadyInProgress(format!(
                        "booking {} is already being monitored",
                        booking_id
                    )))
                }
                Err(e) => {
                    warn!("Failed to read monitor lease {}: {}", key, e);
                    Ok(())
                }
            },
            Err(e) => {
                warn!("Monitor lease unavailable for {}, polling anyway: {}", key, e);
                Ok(())
            }
        }
    }

    async fn release_lease(&self, booking_id: Uuid) {
        if let Some(cache) = &self.cache {
            let key = qr_monitor_key(&booking_id.to_string());
            if let Err(e) = cache.release_lease(&key, &self.instance_id).await {
                warn!("Failed to release monitor lease {}: {}", key, e);
            }
        }
    }

    async fn finish(
        &self,
        attempt: &PaymentAttempt,
        outcome: MonitorOutcome,
        attempts: u32,
    ) -> AppResult<MonitorResult> {
        let booking = self.bookings.load(attempt.booking_id).await?;

        info!(
            "Monitor for {} finished as {} after {} polls (booking {})",
            attempt.gateway_reference, outcome, attempts, booking.status
        );

        Ok(MonitorResult {
            booking_id: booking.id,
            reference: attempt.gateway_reference.clone(),
            outcome,
            attempts,
            booking_status: booking.status,
        })
    }

    /// Push a terminal provider result through the state machine
    async fn apply(&self, reference: &str, state: AttemptState) -> AppResult<MonitorOutcome> {
        match state {
            AttemptState::Succeeded => match self.bookings.confirm_payment(reference).await {
                Ok(_) => Ok(MonitorOutcome::Confirmed),
                Err(AppError::InvalidBookingState { .. }) => {
                    warn!("Payment {} succeeded after the booking was closed", reference);
                    Ok(MonitorOutcome::Superseded)
                }
                Err(e) => Err(e),
            },
            AttemptState::Failed | AttemptState::Expired => {
                let booking = match self.bookings.fail_payment(reference, state).await {
                    Ok(booking) => booking,
                    Err(AppError::ConcurrentModification(_)) => {
                        let attempt = self.bookings.load_attempt(reference).await?;
                        self.bookings.load(attempt.booking_id).await?
                    }
                    Err(e) => return Err(e),
                };
                if booking.status.is_terminal() {
                    return Ok(MonitorOutcome::Superseded);
                }
                Ok(if state == AttemptState::Expired {
                    MonitorOutcome::Expired
                } else {
                    MonitorOutcome::Failed
                })
            }
            AttemptState::Superseded => Ok(MonitorOutcome::Superseded),
            AttemptState::None => Err(AppError::Internal(format!(
                "No terminal state to apply for {}",
                reference
            ))),
        }
    }

    async fn poll(
        &self,
        attempt: PaymentAttempt,
        timing: MonitorTiming,
        token: &CancellationToken,
    ) -> AppResult<MonitorResult> {
        let reference = attempt.gateway_reference.as_str();

        if let Some(outcome) = MonitorOutcome::from_attempt_state(attempt.terminal_state) {
            debug!("Attempt {} already closed as {}", reference, attempt.terminal_state);
            return self.finish(&attempt, outcome, 0).await;
        }

        let gateway = self.gateways.get(attempt.provider)?;
        let deadline = Instant::now() + timing.timeout;
        let mut polls = 0;

        while polls < timing.max_attempts {
            if token.is_cancelled() {
                return self.finish(&attempt, MonitorOutcome::Cancelled, polls).await;
            }

            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                debug!("Deadline reached for {} after {} polls", reference, polls);
                break;
            }

            polls += 1;
            let observed = match timeout(remaining, gateway.get_status(reference)).await {
                Ok(observed) => observed,
                Err(_) => Err(GatewayError::Timeout(format!(
                    "no answer before the {:?} deadline",
                    timing.timeout
                ))),
            };

            info!(
                reference,
                attempt = polls,
                max_attempts = timing.max_attempts,
                "Polled payment status: {}",
                match &observed {
                    Ok(status) => status.to_string(),
                    Err(e) => e.to_string(),
                }
            );

            let terminal = match observed {
                Ok(status) => status.terminal_state(),
                Err(GatewayError::Rejected(msg)) => {
                    warn!("Provider rejected status check for {}: {}", reference, msg);
                    Some(AttemptState::Failed)
                }
                Err(e) => {
                    debug!("Retryable gateway error for {}: {}", reference, e);
                    None
                }
            };

            if let Some(state) = terminal {
                // Applied even if the caller cancelled during this poll
                let outcome = self.apply(reference, state).await?;
                return self.finish(&attempt, outcome, polls).await;
            }

            if let Err(e) = self.bookings.touch_attempt(reference).await {
                warn!("Failed to record status check for {}: {}", reference, e);
            }

            if polls == timing.max_attempts {
                break;
            }

            tokio::select! {
                _ = token.cancelled() => {
                    return self.finish(&attempt, MonitorOutcome::Cancelled, polls).await;
                }
                _ = sleep_until((Instant::now() + timing.interval).min(deadline)) => {}
            }
        }

        self.finish(&attempt, MonitorOutcome::PendingTimeout, polls).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{room, FakeGateway, TestEnv};
    use chrono::Utc;
    use derlg_core::models::{PaymentMethod, ProviderStatus, RequesterRole};

    fn fast_config() -> ReconciliationConfig {
        ReconciliationConfig {
            default_timeout_ms: 200,
            default_interval_ms: 5,
            max_timeout_ms: 1_000,
            min_interval_ms: 1,
        }
    }

    fn poller(env: &TestEnv, gateway: Arc<FakeGateway>) -> Arc<ReconciliationPoller> {
        Arc::new(ReconciliationPoller::new(
            env.bookings.clone(),
            GatewayRegistry::new().with(gateway),
            None,
            fast_config(),
            900,
        ))
    }

    fn owner() -> Actor {
        Actor::new("u1", RequesterRole::Customer)
    }

    fn request(booking_id: Uuid, reference: &str, timeout_ms: u64) -> MonitorRequest {
        MonitorRequest {
            booking_id,
            reference: reference.to_string(),
            timeout_ms: Some(timeout_ms),
            interval_ms: Some(5),
        }
    }

    #[test]
    fn test_timing_is_clamped() {
        let config = ReconciliationConfig {
            default_timeout_ms: 300_000,
            default_interval_ms: 5_000,
            max_timeout_ms: 900_000,
            min_interval_ms: 1_000,
        };

        let timing = MonitorTiming::resolve(&config, None, None);
        assert_eq!(timing.max_attempts, 60);

        let timing = MonitorTiming::resolve(&config, Some(3_600_000), Some(10));
        assert_eq!(timing.timeout, Duration::from_millis(900_000));
        assert_eq!(timing.interval, Duration::from_millis(1_000));
        assert_eq!(timing.max_attempts, 900);

        let timing = MonitorTiming::resolve(&config, Some(100), Some(5_000));
        assert_eq!(timing.max_attempts, 1);
    }

    #[tokio::test]
    async fn test_registry_replaces_and_cancels() {
        let registry = MonitorRegistry::new();
        let booking_id = Uuid::new_v4();

        let (first_gen, first) = registry.register(booking_id).await;
        let (second_gen, second) = registry.register(booking_id).await;
        assert!(first.is_cancelled());
        assert!(!second.is_cancelled());
        assert_eq!(registry.active_count().await, 1);

        assert!(!registry.remove_if_current(booking_id, first_gen).await);
        assert!(registry.is_active(booking_id).await);

        assert!(registry.cancel(booking_id).await);
        assert!(second.is_cancelled());
        assert!(!registry.remove_if_current(booking_id, second_gen).await);
        assert!(!registry.cancel(booking_id).await);
    }

    #[tokio::test]
    async fn test_monitor_confirms_on_success() {
        let env = TestEnv::new();
        let unit = env.store.add_unit(room(2));
        let booking = env.pending_booking(&unit, "u1", 30).await;
        env.open_qr_attempt(&booking, "md5-ok").await;

        let gateway = FakeGateway::scripted(
            PaymentMethod::Qr,
            vec![
                Ok(ProviderStatus::Pending),
                Err(GatewayError::Timeout("slow".to_string())),
                Ok(ProviderStatus::Succeeded),
            ],
        );
        let poller = poller(&env, gateway.clone());

        let result = poller
            .monitor(&owner(), request(booking.id, "md5-ok", 500))
            .await
            .unwrap();

        assert_eq!(result.outcome, MonitorOutcome::Confirmed);
        assert_eq!(result.attempts, 3);
        assert_eq!(result.booking_status, BookingStatus::Confirmed);
        assert_eq!(gateway.calls(), 3);
        assert_eq!(poller.registry().active_count().await, 0);
    }

    #[tokio::test]
    async fn test_monitor_times_out_without_touching_booking() {
        let env = TestEnv::new();
        let unit = env.store.add_unit(room(2));
        let booking = env.pending_booking(&unit, "u1", 30).await;
        env.open_qr_attempt(&booking, "md5-slow").await;

        let gateway = FakeGateway::always(PaymentMethod::Qr, ProviderStatus::Pending);
        let poller = poller(&env, gateway.clone());

        let result = poller
            .monitor(&owner(), request(booking.id, "md5-slow", 20))
            .await
            .unwrap();

        assert_eq!(result.outcome, MonitorOutcome::PendingTimeout);
        assert!((1..=4).contains(&result.attempts));
        assert_eq!(result.booking_status, BookingStatus::Pending);
        assert!(env.store.attempt("md5-slow").is_open());
    }

    #[tokio::test]
    async fn test_slow_provider_cannot_outlast_deadline() {
        let env = TestEnv::new();
        let unit = env.store.add_unit(room(2));
        let booking = env.pending_booking(&unit, "u1", 30).await;
        env.open_qr_attempt(&booking, "md5-lag").await;

        let gateway = FakeGateway::slow(
            PaymentMethod::Qr,
            ProviderStatus::Pending,
            Duration::from_millis(100),
        );
        let poller = poller(&env, gateway);

        let started = Instant::now();
        let result = poller
            .monitor(
                &owner(),
                MonitorRequest {
                    booking_id: booking.id,
                    reference: "md5-lag".to_string(),
                    timeout_ms: Some(200),
                    interval_ms: Some(10),
                },
            )
            .await
            .unwrap();

        assert_eq!(result.outcome, MonitorOutcome::PendingTimeout);
        assert!(result.attempts <= 3);
        assert!(started.elapsed() < Duration::from_millis(600));
        assert!(env.store.attempt("md5-lag").is_open());
    }

    #[tokio::test]
    async fn test_success_after_concurrent_cancel_is_superseded() {
        let env = TestEnv::new();
        let unit = env.store.add_unit(room(2));
        let booking = env.pending_booking(&unit, "u1", 30).await;
        env.open_qr_attempt(&booking, "md5-race").await;
        env.store.cancel_before_next_settle(booking.id);

        let poller = poller(
            &env,
            FakeGateway::always(PaymentMethod::Qr, ProviderStatus::Succeeded),
        );

        let result = poller
            .monitor(&owner(), request(booking.id, "md5-race", 100))
            .await
            .unwrap();

        assert_eq!(result.outcome, MonitorOutcome::Superseded);
        assert_eq!(result.booking_status, BookingStatus::Cancelled);
        assert_eq!(
            env.store.attempt("md5-race").terminal_state,
            AttemptState::Superseded
        );
    }

    #[tokio::test]
    async fn test_rejected_status_check_fails_attempt() {
        let env = TestEnv::new();
        let unit = env.store.add_unit(room(2));
        let booking = env.pending_booking(&unit, "u1", 30).await;
        env.open_qr_attempt(&booking, "md5-bad").await;

        let gateway = FakeGateway::scripted(
            PaymentMethod::Qr,
            vec![Err(GatewayError::Rejected("invalid token".to_string()))],
        );
        let poller = poller(&env, gateway);

        let result = poller
            .monitor(&owner(), request(booking.id, "md5-bad", 100))
            .await
            .unwrap();

        assert_eq!(result.outcome, MonitorOutcome::Failed);
        assert_eq!(result.booking_status, BookingStatus::Pending);
        assert_eq!(env.store.attempt("md5-bad").terminal_state, AttemptState::Failed);
    }

    #[tokio::test]
    async fn test_caller_cancellation_stops_polling() {
        let env = TestEnv::new();
        let unit = env.store.add_unit(room(2));
        let booking = env.pending_booking(&unit, "u1", 30).await;
        env.open_qr_attempt(&booking, "md5-wait").await;

        let gateway = FakeGateway::always(PaymentMethod::Qr, ProviderStatus::Pending);
        let poller = poller(&env, gateway);

        let handle = poller
            .spawn(&owner(), request(booking.id, "md5-wait", 1_000))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(12)).await;
        handle.token().cancel();

        let result = handle.join().await.unwrap();
        assert_eq!(result.outcome, MonitorOutcome::Cancelled);
        assert_eq!(result.booking_status, BookingStatus::Pending);
        assert!(env.store.attempt("md5-wait").is_open());
    }

    #[tokio::test]
    async fn test_booking_cancellation_supersedes_monitor() {
        let env = TestEnv::new();
        let unit = env.store.add_unit(room(2));
        let booking = env.pending_booking(&unit, "u1", 30).await;
        env.open_qr_attempt(&booking, "md5-cancel").await;

        let gateway = FakeGateway::always(PaymentMethod::Qr, ProviderStatus::Pending);
        let poller = poller(&env, gateway);

        let handle = poller
            .spawn(&owner(), request(booking.id, "md5-cancel", 1_000))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(12)).await;

        env.bookings
            .cancel(booking.id, &owner(), None, Utc::now())
            .await
            .unwrap();

        let result = handle.join().await.unwrap();
        assert_eq!(result.outcome, MonitorOutcome::Cancelled);
        assert_eq!(result.booking_status, BookingStatus::Cancelled);
        assert_eq!(
            env.store.attempt("md5-cancel").terminal_state,
            AttemptState::Superseded
        );
    }

    #[tokio::test]
    async fn test_closed_attempt_returns_immediately() {
        let env = TestEnv::new();
        let unit = env.store.add_unit(room(2));
        let booking = env.pending_booking(&unit, "u1", 30).await;
        env.open_qr_attempt(&booking, "md5-done").await;
        env.bookings
            .fail_payment("md5-done", AttemptState::Expired)
            .await
            .unwrap();

        let gateway = FakeGateway::always(PaymentMethod::Qr, ProviderStatus::Succeeded);
        let poller = poller(&env, gateway.clone());

        let result = poller
            .monitor(&owner(), request(booking.id, "md5-done", 100))
            .await
            .unwrap();
        assert_eq!(result.outcome, MonitorOutcome::Expired);
        assert_eq!(result.attempts, 0);
        assert_eq!(gateway.calls(), 0);
    }

    #[tokio::test]
    async fn test_monitor_checks_ownership_and_reference() {
        let env = TestEnv::new();
        let unit = env.store.add_unit(room(2));
        let booking = env.pending_booking(&unit, "u1", 30).await;
        let other = env.pending_booking(&unit, "u1", 31).await;
        env.open_qr_attempt(&other, "md5-other").await;

        let poller = poller(
            &env,
            FakeGateway::always(PaymentMethod::Qr, ProviderStatus::Pending),
        );

        let err = poller
            .monitor(
                &Actor::new("u2", RequesterRole::Customer),
                request(booking.id, "md5-other", 100),
            )
            .await
            .unwrap_err();
        assert_eq!(err.error_code(), "FORBIDDEN");

        let err = poller
            .monitor(&owner(), request(booking.id, "md5-other", 100))
            .await
            .unwrap_err();
        assert_eq!(err.error_code(), "PAYMENT_ATTEMPT_NOT_FOUND");
    }
}
