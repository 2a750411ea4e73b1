//! In-memory fakes for service tests

use async_trait::async_trait;
use chrono::{Duration, Utc};
use derlg_core::config::{BookingConfig, PaymentOptionsConfig, PricingConfig, RefundConfig};
use derlg_core::models::{
    AttemptState, Booking, BookingStatus, DateRange, DiscountType, GuestDetails, InventoryUnit,
    PaymentAttempt, PaymentMethod, PaymentStatus, PaymentType, PriceBreakdown, PromoCode,
    PromoContext, PromoScope, PromoValidation, ProviderStatus, RequesterProfile, RequesterRole,
};
use derlg_core::traits::{
    BookingEvent, BookingEventKind, BookingRepository, InventoryRepository,
    NotificationDispatcher, PaymentAttemptRepository, PromoCodeStore, RequesterProfileRepository,
};
use derlg_core::{AppError, AppResult};
use parking_lot::Mutex;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use uuid::Uuid;

use crate::booking_state_machine::{Actor, BookingRequest, BookingService, BookingStores};
use crate::gateways::{GatewayError, GatewayPayment, PaymentGateway};
use crate::payment_options::PaymentOptionComposer;
use crate::pricing::PricingCalculator;
use crate::reconciliation::MonitorRegistry;
use crate::refund_policy::RefundPolicy;

/// Room at 100/night for up to two guests
pub fn room(capacity: i32) -> InventoryUnit {
    InventoryUnit {
        name: "Riverside double".to_string(),
        capacity,
        base_price: dec!(100.00),
        ..Default::default()
    }
}

pub fn guest() -> GuestDetails {
    GuestDetails {
        name: "Sokha Chan".to_string(),
        email: "sokha@example.com".to_string(),
        phone: "+85512345678".to_string(),
        notes: None,
    }
}

pub fn sample_booking() -> Booking {
    let check_in = Utc::now().date_naive() + Duration::days(30);
    Booking::new(
        Uuid::new_v4(),
        "user-1".to_string(),
        DateRange::new(check_in, check_in + Duration::days(2)),
        2,
        guest(),
        PriceBreakdown {
            subtotal: dec!(200.00),
            tax: dec!(20.00),
            total: dec!(220.00),
            ..Default::default()
        },
        PaymentMethod::Card,
        PaymentType::Full,
        dec!(60),
    )
}

#[derive(Default)]
struct State {
    units: HashMap<Uuid, InventoryUnit>,
    bookings: HashMap<Uuid, Booking>,
    attempts: Vec<PaymentAttempt>,
    profiles: HashMap<String, RequesterProfile>,
    promos: HashMap<String, PromoCode>,
    cancel_before_settle: Option<Uuid>,
}

impl State {
    fn occupancy(&self, unit: &InventoryUnit, range: &DateRange, exclude: Option<Uuid>) -> i32 {
        self.bookings
            .values()
            .filter(|b| b.inventory_unit_id == unit.id)
            .filter(|b| b.status.is_holding())
            .filter(|b| Some(b.id) != exclude)
            .filter(|b| b.date_range.overlaps(range))
            .map(|b| unit.occupancy_needed(b.guest_count))
            .sum()
    }

    fn capacity(&self, unit: &InventoryUnit) -> AppResult<i32> {
        self.units
            .get(&unit.id)
            .map(|u| u.capacity)
            .ok_or_else(|| AppError::InventoryNotFound(unit.id.to_string()))
    }

    /// What a cancellation committed by another request leaves behind
    fn cancel_concurrently(&mut self, booking_id: Uuid) {
        if let Some(booking) = self.bookings.get_mut(&booking_id) {
            booking.status = BookingStatus::Cancelled;
            booking.updated_at = Utc::now();
            booking.version += 1;
        }
        for attempt in self
            .attempts
            .iter_mut()
            .filter(|a| a.booking_id == booking_id && a.is_open())
        {
            attempt.settle(AttemptState::Superseded);
        }
    }

    fn write(&mut self, booking: &Booking, expected_version: i32) -> AppResult<Booking> {
        let stored = self
            .bookings
            .get_mut(&booking.id)
            .ok_or_else(|| AppError::BookingNotFound(booking.id.to_string()))?;
        if stored.version != expected_version {
            return Err(AppError::ConcurrentModification(booking.booking_number.clone()));
        }

        let mut updated = booking.clone();
        updated.version = expected_version + 1;
        *stored = updated.clone();
        Ok(updated)
    }
}

/// One store behind every repository trait
#[derive(Default)]
pub struct InMemoryStore {
    state: Mutex<State>,
}

impl InMemoryStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn add_unit(&self, unit: InventoryUnit) -> InventoryUnit {
        self.state.lock().units.insert(unit.id, unit.clone());
        unit
    }

    pub fn add_holding_booking(&self, unit: &InventoryUnit, range: DateRange, guests: i32) -> Booking {
        let booking = Booking::new(
            unit.id,
            "someone-else".to_string(),
            range,
            guests,
            guest(),
            PriceBreakdown::default(),
            PaymentMethod::Card,
            PaymentType::Full,
            dec!(60),
        );
        self.state.lock().bookings.insert(booking.id, booking.clone());
        booking
    }

    pub fn add_student(&self, requester_id: &str, remaining: i32) {
        self.state.lock().profiles.insert(
            requester_id.to_string(),
            RequesterProfile {
                requester_id: requester_id.to_string(),
                is_student: true,
                student_discount_remaining: remaining,
            },
        );
    }

    pub fn add_percent_promo(&self, code: &str, percent: Decimal) {
        let now = Utc::now();
        self.state.lock().promos.insert(
            code.to_uppercase(),
            PromoCode {
                id: Uuid::new_v4(),
                code: code.to_uppercase(),
                description: String::new(),
                discount_type: DiscountType::Percentage,
                discount_value: percent,
                min_booking_amount: Decimal::ZERO,
                max_discount: None,
                valid_from: now - Duration::days(1),
                valid_until: now + Duration::days(90),
                usage_limit: 100,
                usage_count: 0,
                applicable_to: PromoScope::All,
                active: true,
            },
        );
    }

    /// Have the booking cancelled right before the next attempt settles
    pub fn cancel_before_next_settle(&self, booking_id: Uuid) {
        self.state.lock().cancel_before_settle = Some(booking_id);
    }

    pub fn booking_count(&self) -> usize {
        self.state.lock().bookings.len()
    }

    pub fn booking(&self, id: Uuid) -> Booking {
        self.state.lock().bookings[&id].clone()
    }

    pub fn attempt(&self, reference: &str) -> PaymentAttempt {
        self.state
            .lock()
            .attempts
            .iter()
            .find(|a| a.gateway_reference == reference)
            .cloned()
            .expect("attempt exists")
    }

    pub fn attempts_for(&self, booking_id: Uuid) -> Vec<PaymentAttempt> {
        self.state
            .lock()
            .attempts
            .iter()
            .filter(|a| a.booking_id == booking_id)
            .cloned()
            .collect()
    }

    pub fn student_discounts_left(&self, requester_id: &str) -> i32 {
        self.state.lock().profiles[requester_id].student_discount_remaining
    }

    pub fn promo_usage(&self, code: &str) -> i32 {
        self.state.lock().promos[code].usage_count
    }
}

#[async_trait]
impl InventoryRepository for InMemoryStore {
    async fn find_by_id(&self, id: Uuid) -> AppResult<Option<InventoryUnit>> {
        Ok(self.state.lock().units.get(&id).cloned())
    }
}

#[async_trait]
impl BookingRepository for InMemoryStore {
    async fn find_by_id(&self, id: Uuid) -> AppResult<Option<Booking>> {
        Ok(self.state.lock().bookings.get(&id).cloned())
    }

    async fn find_by_number(&self, booking_number: &str) -> AppResult<Option<Booking>> {
        Ok(self
            .state
            .lock()
            .bookings
            .values()
            .find(|b| b.booking_number == booking_number)
            .cloned())
    }

    async fn list_by_requester(
        &self,
        requester_id: &str,
        limit: i64,
        offset: i64,
    ) -> AppResult<(Vec<Booking>, i64)> {
        let state = self.state.lock();
        let mut own: Vec<Booking> = state
            .bookings
            .values()
            .filter(|b| b.requester_id == requester_id)
            .cloned()
            .collect();
        own.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        let total = own.len() as i64;
        let page = own
            .into_iter()
            .skip(offset as usize)
            .take(limit as usize)
            .collect();
        Ok((page, total))
    }

    async fn occupancy(
        &self,
        unit: &InventoryUnit,
        range: &DateRange,
        exclude_booking: Option<Uuid>,
    ) -> AppResult<i32> {
        Ok(self.state.lock().occupancy(unit, range, exclude_booking))
    }

    async fn insert_with_hold(&self, booking: &Booking, unit: &InventoryUnit) -> AppResult<Booking> {
        let mut state = self.state.lock();
        let capacity = state.capacity(unit)?;
        let used = state.occupancy(unit, &booking.date_range, None);
        if capacity - used < unit.occupancy_needed(booking.guest_count) {
            return Err(AppError::RoomUnavailable(unit.name.clone()));
        }
        state.bookings.insert(booking.id, booking.clone());
        Ok(booking.clone())
    }

    async fn update_with_hold(
        &self,
        booking: &Booking,
        unit: &InventoryUnit,
        expected_version: i32,
    ) -> AppResult<Booking> {
        let mut state = self.state.lock();
        let capacity = state.capacity(unit)?;
        let used = state.occupancy(unit, &booking.date_range, Some(booking.id));
        if capacity - used < unit.occupancy_needed(booking.guest_count) {
            return Err(AppError::RoomUnavailable(unit.name.clone()));
        }
        state.write(booking, expected_version)
    }

    async fn save(&self, booking: &Booking, expected_version: i32) -> AppResult<Booking> {
        self.state.lock().write(booking, expected_version)
    }

    async fn list_awaiting_balance(&self, limit: i64) -> AppResult<Vec<Booking>> {
        let state = self.state.lock();
        let mut partial: Vec<Booking> = state
            .bookings
            .values()
            .filter(|b| {
                b.status == BookingStatus::Confirmed && b.payment.status == PaymentStatus::Partial
            })
            .cloned()
            .collect();
        partial.sort_by_key(|b| b.date_range.check_in);
        partial.truncate(limit.max(0) as usize);
        Ok(partial)
    }
}

#[async_trait]
impl PaymentAttemptRepository for InMemoryStore {
    async fn find_by_reference(&self, reference: &str) -> AppResult<Option<PaymentAttempt>> {
        Ok(self
            .state
            .lock()
            .attempts
            .iter()
            .find(|a| a.gateway_reference == reference)
            .cloned())
    }

    async fn find_open_for_booking(&self, booking_id: Uuid) -> AppResult<Option<PaymentAttempt>> {
        Ok(self
            .state
            .lock()
            .attempts
            .iter()
            .find(|a| a.booking_id == booking_id && a.is_open())
            .cloned())
    }

    async fn list_for_booking(&self, booking_id: Uuid) -> AppResult<Vec<PaymentAttempt>> {
        Ok(self.attempts_for(booking_id))
    }

    async fn open(
        &self,
        attempt: &PaymentAttempt,
        booking: &Booking,
        expected_version: i32,
    ) -> AppResult<Booking> {
        let mut state = self.state.lock();
        if state
            .attempts
            .iter()
            .any(|a| a.gateway_reference == attempt.gateway_reference)
        {
            return Err(AppError::GatewayRejected(format!(
                "reference {} already used",
                attempt.gateway_reference
            )));
        }
        if state
            .attempts
            .iter()
            .any(|a| a.booking_id == attempt.booking_id && a.is_open())
        {
            return Err(AppError::PaymentAlreadyInProgress(booking.booking_number.clone()));
        }
        let updated = state.write(booking, expected_version)?;
        state.attempts.push(attempt.clone());
        Ok(updated)
    }

    async fn settle(
        &self,
        attempt: &PaymentAttempt,
        booking: &Booking,
        expected_version: i32,
    ) -> AppResult<Booking> {
        let mut state = self.state.lock();
        if let Some(booking_id) = state.cancel_before_settle.take() {
            state.cancel_concurrently(booking_id);
        }
        let index = state
            .attempts
            .iter()
            .position(|a| a.id == attempt.id && a.is_open())
            .ok_or_else(|| AppError::ConcurrentModification(booking.booking_number.clone()))?;
        let updated = state.write(booking, expected_version)?;
        state.attempts[index] = attempt.clone();
        Ok(updated)
    }

    async fn touch(&self, reference: &str) -> AppResult<()> {
        let mut state = self.state.lock();
        if let Some(attempt) = state
            .attempts
            .iter_mut()
            .find(|a| a.gateway_reference == reference)
        {
            attempt.last_checked_at = Some(Utc::now());
        }
        Ok(())
    }
}

#[async_trait]
impl RequesterProfileRepository for InMemoryStore {
    async fn find_profile(&self, requester_id: &str) -> AppResult<Option<RequesterProfile>> {
        Ok(self.state.lock().profiles.get(requester_id).cloned())
    }

    async fn consume_student_discount(&self, requester_id: &str) -> AppResult<i32> {
        let mut state = self.state.lock();
        let profile = state
            .profiles
            .get_mut(requester_id)
            .ok_or_else(|| AppError::NotFound(requester_id.to_string()))?;
        profile.student_discount_remaining = (profile.student_discount_remaining - 1).max(0);
        Ok(profile.student_discount_remaining)
    }
}

#[async_trait]
impl PromoCodeStore for InMemoryStore {
    async fn validate(&self, code: &str, context: &PromoContext) -> AppResult<PromoValidation> {
        Ok(match self.state.lock().promos.get(&code.to_uppercase()) {
            Some(promo) => promo.validate(context, Utc::now()),
            None => PromoValidation::rejected(code, "Promo code not found"),
        })
    }

    async fn record_usage(&self, code: &str) -> AppResult<()> {
        if let Some(promo) = self.state.lock().promos.get_mut(&code.to_uppercase()) {
            promo.usage_count += 1;
        }
        Ok(())
    }
}

/// Keeps every dispatched event
#[derive(Default)]
pub struct RecordingNotifier {
    events: Mutex<Vec<BookingEvent>>,
}

impl RecordingNotifier {
    pub fn kinds(&self) -> Vec<BookingEventKind> {
        self.events.lock().iter().map(|e| e.event).collect()
    }

    pub fn events_of(&self, kind: BookingEventKind) -> Vec<BookingEvent> {
        self.events
            .lock()
            .iter()
            .filter(|e| e.event == kind)
            .cloned()
            .collect()
    }
}

impl NotificationDispatcher for RecordingNotifier {
    fn dispatch(&self, event: BookingEvent) {
        self.events.lock().push(event);
    }
}

/// Booking service wired to one in-memory store
pub struct TestEnv {
    pub store: Arc<InMemoryStore>,
    pub notifier: Arc<RecordingNotifier>,
    pub bookings: Arc<BookingService>,
}

impl TestEnv {
    pub fn new() -> Self {
        let store = InMemoryStore::new();
        let notifier = Arc::new(RecordingNotifier::default());
        let stores = BookingStores {
            inventory: store.clone(),
            bookings: store.clone(),
            attempts: store.clone(),
            profiles: store.clone(),
            promos: store.clone(),
        };

        let bookings = Arc::new(BookingService::with_policies(
            stores,
            PricingCalculator::new(&PricingConfig::default()),
            PaymentOptionComposer::new(PaymentOptionsConfig::default()),
            RefundPolicy::new(RefundConfig::default()),
            &BookingConfig::default(),
            notifier.clone(),
            MonitorRegistry::new(),
        ));

        Self {
            store,
            notifier,
            bookings,
        }
    }

    /// Two-night, fully paid booking starting `days_ahead` from today
    pub async fn pending_booking(&self, unit: &InventoryUnit, requester_id: &str, days_ahead: i64) -> Booking {
        self.booking_paid_by(unit, requester_id, days_ahead, PaymentType::Full)
            .await
    }

    /// Two-night pending booking using `payment_type`, default deposit
    pub async fn booking_paid_by(
        &self,
        unit: &InventoryUnit,
        requester_id: &str,
        days_ahead: i64,
        payment_type: PaymentType,
    ) -> Booking {
        let check_in = Utc::now().date_naive() + Duration::days(days_ahead);
        self.bookings
            .create(
                &Actor::new(requester_id, RequesterRole::Customer),
                BookingRequest {
                    unit_id: unit.id,
                    check_in,
                    check_out: Some(check_in + Duration::days(2)),
                    guests: 2,
                    guest_details: guest(),
                    payment_method: PaymentMethod::Card,
                    payment_type,
                    deposit_percentage: None,
                    promo_code: None,
                },
            )
            .await
            .expect("booking created")
    }

    async fn attach(&self, booking: &Booking, reference: &str, provider: PaymentMethod) -> PaymentAttempt {
        let current = self.store.booking(booking.id);
        let attempt = PaymentAttempt::new(
            booking.id,
            reference.to_string(),
            provider,
            current.pricing.total,
            current.pricing.currency,
            current.payment.payment_type,
            serde_json::Value::Null,
        );
        self.bookings
            .attach_payment(&current, &attempt)
            .await
            .expect("attempt attached");
        attempt
    }

    /// Confirmed booking with only its first installment paid
    pub async fn partly_paid_booking(
        &self,
        unit: &InventoryUnit,
        requester_id: &str,
        days_ahead: i64,
        payment_type: PaymentType,
    ) -> Booking {
        let booking = self
            .booking_paid_by(unit, requester_id, days_ahead, payment_type)
            .await;
        let amount = self.bookings.composer().amount_due(
            payment_type,
            booking.pricing.total,
            booking.payment.deposit_percentage,
        );
        let reference = format!("first-{}", booking.booking_number);
        let attempt = PaymentAttempt::new(
            booking.id,
            reference.clone(),
            PaymentMethod::Card,
            amount,
            booking.pricing.currency,
            payment_type,
            serde_json::Value::Null,
        );
        self.bookings
            .attach_payment(&booking, &attempt)
            .await
            .expect("first attempt attached");
        self.bookings
            .confirm_payment(&reference)
            .await
            .expect("first installment confirmed")
    }

    pub async fn open_attempt(&self, booking: &Booking, reference: &str) -> PaymentAttempt {
        self.attach(booking, reference, PaymentMethod::Card).await
    }

    pub async fn open_qr_attempt(&self, booking: &Booking, reference: &str) -> PaymentAttempt {
        self.attach(booking, reference, PaymentMethod::Qr).await
    }
}

enum Script {
    Always(ProviderStatus),
    Sequence(Mutex<VecDeque<Result<ProviderStatus, GatewayError>>>),
}

/// Gateway with canned answers
pub struct FakeGateway {
    provider: PaymentMethod,
    script: Script,
    create_error: Mutex<Option<GatewayError>>,
    created: Mutex<Vec<Decimal>>,
    calls: AtomicU32,
    delay: Option<std::time::Duration>,
}

impl FakeGateway {
    fn build(provider: PaymentMethod, script: Script) -> Self {
        Self {
            provider,
            script,
            create_error: Mutex::new(None),
            created: Mutex::new(Vec::new()),
            calls: AtomicU32::new(0),
            delay: None,
        }
    }

    pub fn always(provider: PaymentMethod, status: ProviderStatus) -> Arc<Self> {
        Arc::new(Self::build(provider, Script::Always(status)))
    }

    /// Answers in order, then keeps reporting pending
    pub fn scripted(provider: PaymentMethod, answers: Vec<Result<ProviderStatus, GatewayError>>) -> Arc<Self> {
        Arc::new(Self::build(
            provider,
            Script::Sequence(Mutex::new(answers.into_iter().collect())),
        ))
    }

    /// Takes `delay` to answer every status read
    pub fn slow(provider: PaymentMethod, status: ProviderStatus, delay: std::time::Duration) -> Arc<Self> {
        let mut gateway = Self::build(provider, Script::Always(status));
        gateway.delay = Some(delay);
        Arc::new(gateway)
    }

    pub fn failing_create(provider: PaymentMethod, error: GatewayError) -> Arc<Self> {
        let gateway = Self::build(provider, Script::Always(ProviderStatus::Pending));
        *gateway.create_error.lock() = Some(error);
        Arc::new(gateway)
    }

    /// Status reads so far (`get_status` and `verify`)
    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn created_amounts(&self) -> Vec<Decimal> {
        self.created.lock().clone()
    }

    fn next(&self) -> Result<ProviderStatus, GatewayError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.script {
            Script::Always(status) => Ok(*status),
            Script::Sequence(answers) => answers
                .lock()
                .pop_front()
                .unwrap_or(Ok(ProviderStatus::Pending)),
        }
    }
}

#[async_trait]
impl PaymentGateway for FakeGateway {
    fn provider(&self) -> PaymentMethod {
        self.provider
    }

    async fn create(&self, _booking: &Booking, amount: Decimal) -> Result<GatewayPayment, GatewayError> {
        if let Some(error) = self.create_error.lock().take() {
            return Err(error);
        }
        let mut created = self.created.lock();
        created.push(amount);
        Ok(GatewayPayment {
            reference: format!("fake-{}", created.len()),
            client_payload: serde_json::json!({ "amount": amount.to_string() }),
        })
    }

    async fn get_status(&self, _reference: &str) -> Result<ProviderStatus, GatewayError> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.next()
    }

    async fn verify(&self, _booking: &Booking, _reference: &str) -> Result<ProviderStatus, GatewayError> {
        self.next()
    }
}

#[test]
fn test_fake_store_counts_holding_overlaps_only() {
    let store = InMemoryStore::new();
    let unit = store.add_unit(room(3));
    let today = Utc::now().date_naive();
    let range = DateRange::new(today, today + Duration::days(2));

    store.add_holding_booking(&unit, range, 1);
    let closed = store.add_holding_booking(&unit, range, 1);
    if let Some(b) = store.state.lock().bookings.get_mut(&closed.id) {
        b.status = BookingStatus::Cancelled;
    }
    store.add_holding_booking(&unit, DateRange::new(range.check_out, range.check_out + Duration::days(1)), 1);

    assert_eq!(store.state.lock().occupancy(&unit, &range, None), 1);
}
