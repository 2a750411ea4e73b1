//! Booking state machine
//!
//! The only component that changes `Booking::status`. Every transition is one
//! conditional write through the repositories; a rejected transition writes
//! nothing.
//!
//! ```text
//! pending ──> confirmed ──> completed
//!    │            │
//!    ├──> rejected└──> cancelled
//!    └──> cancelled
//! ```

use chrono::{DateTime, Duration, NaiveDate, Utc};
use derlg_core::config::{AppConfig, BookingConfig};
use derlg_core::models::{
    AttemptState, Booking, BookingStatus, CancellationRecord, DateRange, DiscountSource,
    GuestDetails, InventoryUnit, PaymentAttempt, PaymentMethod, PaymentOptions, PaymentSchedule,
    PaymentStatus, PaymentType, PriceBreakdown, PriceChange, PromoContext, PromoValidation,
    RequesterRole, ScheduledInstallment,
};
use derlg_core::traits::{
    BookingEvent, BookingEventKind, BookingRepository, InventoryRepository,
    NotificationDispatcher, PaginatedResponse, Pagination, PaginationMeta,
    PaymentAttemptRepository, PromoCodeStore, RequesterProfileRepository,
};
use derlg_core::{AppError, AppResult};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;
use validator::Validate;

use crate::availability::AvailabilityResolver;
use crate::constants::{DEFAULT_CANCEL_REASON, DEFAULT_REJECT_REASON, REMINDER_BATCH_SIZE};
use crate::payment_options::PaymentOptionComposer;
use crate::pricing::PricingCalculator;
use crate::reconciliation::MonitorRegistry;
use crate::refund_policy::{RefundPolicy, RefundQuote};

/// Storage and collaborator seams of the booking engine
#[derive(Clone)]
pub struct BookingStores {
    pub inventory: Arc<dyn InventoryRepository>,
    pub bookings: Arc<dyn BookingRepository>,
    pub attempts: Arc<dyn PaymentAttemptRepository>,
    pub profiles: Arc<dyn RequesterProfileRepository>,
    pub promos: Arc<dyn PromoCodeStore>,
}

/// Who is asking
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Actor {
    pub requester_id: String,
    pub role: RequesterRole,
}

impl Actor {
    pub fn new(requester_id: impl Into<String>, role: RequesterRole) -> Self {
        Self {
            requester_id: requester_id.into(),
            role,
        }
    }

    pub fn is_operator(&self) -> bool {
        self.role.is_operator()
    }

    fn can_view(&self, booking: &Booking) -> bool {
        booking.is_owned_by(&self.requester_id) || self.is_operator()
    }
}

/// Quote input
#[derive(Debug, Clone, Deserialize)]
pub struct QuoteRequest {
    pub unit_id: Uuid,
    pub check_in: NaiveDate,
    pub check_out: Option<NaiveDate>,
    pub guests: i32,
    pub deposit_percentage: Option<Decimal>,
    pub promo_code: Option<String>,
}

/// Price and payment structures for a prospective booking
#[derive(Debug, Clone, Serialize)]
pub struct Quote {
    pub unit_id: Uuid,
    pub date_range: DateRange,
    pub guests: i32,
    pub is_available: bool,
    pub remaining_count: i32,
    pub price_breakdown: PriceBreakdown,
    pub payment_options: PaymentOptions,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub promo_rejection: Option<String>,
}

/// Booking creation input
#[derive(Debug, Clone, Deserialize)]
pub struct BookingRequest {
    pub unit_id: Uuid,
    pub check_in: NaiveDate,
    pub check_out: Option<NaiveDate>,
    pub guests: i32,
    pub guest_details: GuestDetails,
    pub payment_method: PaymentMethod,
    pub payment_type: PaymentType,
    pub deposit_percentage: Option<Decimal>,
    pub promo_code: Option<String>,
}

/// Partial booking update
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BookingChanges {
    pub unit_id: Option<Uuid>,
    pub check_in: Option<NaiveDate>,
    pub check_out: Option<NaiveDate>,
    pub guests: Option<i32>,
    pub guest_details: Option<GuestDetails>,
}

impl BookingChanges {
    fn touches_schedule(&self, booking: &Booking) -> bool {
        self.unit_id.is_some_and(|id| id != booking.inventory_unit_id)
            || self.check_in.is_some_and(|d| d != booking.date_range.check_in)
            || self.check_out.is_some_and(|d| d != booking.date_range.check_out)
            || self.guests.is_some_and(|g| g != booking.guest_count)
    }
}

/// Result of a cancel or reject call
#[derive(Debug, Clone, Serialize)]
pub struct CancellationOutcome {
    pub booking: Booking,
    pub cancellation_details: CancellationRecord,
    /// True when the booking was already cancelled and nothing changed
    pub already_cancelled: bool,
}

/// Basic shape checks on guest contact details
pub fn validate_guest_details(details: &GuestDetails) -> AppResult<()> {
    details.validate()?;

    if details.name.trim().is_empty() {
        return Err(AppError::Validation("guest name must not be blank".to_string()));
    }
    Ok(())
}

fn check_party(unit: &InventoryUnit, guests: i32) -> AppResult<()> {
    if guests < 1 {
        return Err(AppError::Validation("at least one guest is required".to_string()));
    }
    if !unit.accepts_guests(guests) {
        return Err(AppError::Validation(format!(
            "{} guests is outside the {}-{} allowed for this unit",
            guests,
            unit.min_occupancy.max(1),
            unit.max_occupancy
        )));
    }
    Ok(())
}

/// Booking state machine
pub struct BookingService {
    stores: BookingStores,
    availability: AvailabilityResolver,
    calculator: PricingCalculator,
    composer: PaymentOptionComposer,
    refunds: RefundPolicy,
    notifier: Arc<dyn NotificationDispatcher>,
    monitors: MonitorRegistry,
    modification_cutoff_hours: i64,
}

impl BookingService {
    pub fn new(
        stores: BookingStores,
        config: &AppConfig,
        notifier: Arc<dyn NotificationDispatcher>,
        monitors: MonitorRegistry,
    ) -> Self {
        Self::with_policies(
            stores,
            PricingCalculator::new(&config.pricing),
            PaymentOptionComposer::new(config.payment_options.clone()),
            RefundPolicy::new(config.refund.clone()),
            &config.booking,
            notifier,
            monitors,
        )
    }

    pub fn with_policies(
        stores: BookingStores,
        calculator: PricingCalculator,
        composer: PaymentOptionComposer,
        refunds: RefundPolicy,
        booking: &BookingConfig,
        notifier: Arc<dyn NotificationDispatcher>,
        monitors: MonitorRegistry,
    ) -> Self {
        Self {
            availability: AvailabilityResolver::new(
                stores.inventory.clone(),
                stores.bookings.clone(),
            ),
            stores,
            calculator,
            composer,
            refunds,
            notifier,
            monitors,
            modification_cutoff_hours: booking.modification_cutoff_hours,
        }
    }

    pub fn availability(&self) -> &AvailabilityResolver {
        &self.availability
    }

    pub fn composer(&self) -> &PaymentOptionComposer {
        &self.composer
    }

    pub fn monitors(&self) -> &MonitorRegistry {
        &self.monitors
    }

    fn notify(&self, kind: BookingEventKind, booking: &Booking) {
        self.notifier.dispatch(BookingEvent::for_booking(kind, booking));
    }

    pub(crate) async fn load(&self, booking_id: Uuid) -> AppResult<Booking> {
        self.stores
            .bookings
            .find_by_id(booking_id)
            .await?
            .ok_or_else(|| AppError::BookingNotFound(booking_id.to_string()))
    }

    pub(crate) async fn load_attempt(&self, reference: &str) -> AppResult<PaymentAttempt> {
        self.stores
            .attempts
            .find_by_reference(reference)
            .await?
            .ok_or_else(|| AppError::PaymentAttemptNotFound(reference.to_string()))
    }

    /// Record a non-terminal status check on an attempt
    pub async fn touch_attempt(&self, reference: &str) -> AppResult<()> {
        self.stores.attempts.touch(reference).await
    }

    /// Price with the promo/student decision applied
    ///
    /// Returns the promo rejection reason, if a code was given and refused.
    async fn resolve_price(
        &self,
        unit: &InventoryUnit,
        range: &DateRange,
        guests: i32,
        promo_code: Option<&str>,
        requester_id: Option<&str>,
    ) -> AppResult<(PriceBreakdown, Option<String>)> {
        let mut promo: Option<PromoValidation> = None;
        let mut rejection = None;

        if let Some(code) = promo_code.map(str::trim).filter(|c| !c.is_empty()) {
            let subtotal = self.calculator.price(unit, range, guests, None, false).subtotal;
            let context = PromoContext {
                kind: unit.kind,
                subtotal,
                requester_id: requester_id.map(str::to_string),
            };
            let validation = self.stores.promos.validate(code, &context).await?;
            if validation.valid {
                promo = Some(validation);
            } else {
                debug!("Promo code {} refused: {:?}", code, validation.reason);
                rejection = Some(
                    validation
                        .reason
                        .unwrap_or_else(|| "Promo code is not valid".to_string()),
                );
            }
        }

        let student_eligible = match requester_id {
            Some(id) => self
                .stores
                .profiles
                .find_profile(id)
                .await?
                .is_some_and(|p| p.student_discount_eligible()),
            None => false,
        };

        let pricing = self
            .calculator
            .price(unit, range, guests, promo.as_ref(), student_eligible);

        Ok((pricing, rejection))
    }

    /// Price and payment options for a prospective booking
    ///
    /// An unusable promo code does not fail the quote; it is reported in
    /// `promo_rejection` and the price is computed without it.
    #[instrument(skip(self, requester))]
    pub async fn quote(&self, request: QuoteRequest, requester: Option<&Actor>) -> AppResult<Quote> {
        let today = Utc::now().date_naive();

        let (unit, range, availability) = self
            .availability
            .check_availability(
                request.unit_id,
                request.check_in,
                request.check_out,
                request.guests,
                today,
            )
            .await?;

        let deposit_pct = self.composer.deposit_percentage(request.deposit_percentage)?;

        let (pricing, promo_rejection) = self
            .resolve_price(
                &unit,
                &range,
                request.guests,
                request.promo_code.as_deref(),
                requester.map(|a| a.requester_id.as_str()),
            )
            .await?;

        let payment_options =
            self.composer
                .compose(pricing.total, range.check_in, Some(deposit_pct), today)?;

        Ok(Quote {
            unit_id: unit.id,
            date_range: range,
            guests: request.guests,
            is_available: availability.is_available,
            remaining_count: availability.remaining_count,
            price_breakdown: pricing,
            payment_options,
            promo_rejection,
        })
    }

    /// Create a pending booking, holding capacity atomically
    ///
    /// # Errors
    ///
    /// - `InvalidDate` for past or empty ranges
    /// - `Validation` for bad guest details or party size
    /// - `InvalidDepositPercentage`
    /// - `RoomUnavailable` when the unit is full; no row is written
    #[instrument(skip(self, request), fields(requester_id = %requester.requester_id, unit_id = %request.unit_id))]
    pub async fn create(&self, requester: &Actor, request: BookingRequest) -> AppResult<Booking> {
        let today = Utc::now().date_naive();

        validate_guest_details(&request.guest_details)?;

        let (unit, range, availability) = self
            .availability
            .check_availability(
                request.unit_id,
                request.check_in,
                request.check_out,
                request.guests,
                today,
            )
            .await?;

        check_party(&unit, request.guests)?;
        if !unit.active {
            return Err(AppError::RoomUnavailable(format!(
                "{} is not bookable",
                unit.name
            )));
        }
        debug!("Pre-check left {} for unit {}", availability.remaining_count, unit.id);

        let deposit_pct = self.composer.deposit_percentage(request.deposit_percentage)?;

        let (pricing, promo_rejection) = self
            .resolve_price(
                &unit,
                &range,
                request.guests,
                request.promo_code.as_deref(),
                Some(&requester.requester_id),
            )
            .await?;
        if let Some(reason) = promo_rejection {
            info!("Ignoring promo code on new booking: {}", reason);
        }

        let booking = Booking::new(
            unit.id,
            requester.requester_id.clone(),
            range,
            request.guests,
            request.guest_details,
            pricing,
            request.payment_method,
            request.payment_type,
            deposit_pct,
        );

        let stored = self.stores.bookings.insert_with_hold(&booking, &unit).await?;

        info!(
            "Booking {} created for unit {} ({} to {}), total {}",
            stored.booking_number,
            unit.id,
            stored.date_range.check_in,
            stored.date_range.check_out,
            stored.pricing.total
        );
        self.notify(BookingEventKind::Created, &stored);

        Ok(stored)
    }

    /// Fetch a booking visible to `actor`
    pub async fn get(&self, booking_id: Uuid, actor: &Actor) -> AppResult<Booking> {
        let booking = self.load(booking_id).await?;
        if !actor.can_view(&booking) {
            return Err(AppError::Forbidden(
                "Booking belongs to another requester".to_string(),
            ));
        }
        Ok(booking)
    }

    /// Fetch a booking owned by `actor`
    pub async fn get_owned(&self, booking_id: Uuid, actor: &Actor) -> AppResult<Booking> {
        let booking = self.load(booking_id).await?;
        if !booking.is_owned_by(&actor.requester_id) {
            return Err(AppError::Forbidden(
                "Booking belongs to another requester".to_string(),
            ));
        }
        Ok(booking)
    }

    /// The requester's own bookings, newest first
    pub async fn list(&self, actor: &Actor, pagination: Pagination) -> AppResult<PaginatedResponse<Booking>> {
        let (data, total) = self
            .stores
            .bookings
            .list_by_requester(&actor.requester_id, pagination.limit(), pagination.offset())
            .await?;

        Ok(PaginatedResponse {
            data,
            pagination: PaginationMeta::new(total, pagination.page, pagination.per_page),
        })
    }

    /// Attempt history of a booking
    pub async fn payment_attempts(&self, booking_id: Uuid, actor: &Actor) -> AppResult<Vec<PaymentAttempt>> {
        let booking = self.get(booking_id, actor).await?;
        self.stores.attempts.list_for_booking(booking.id).await
    }

    /// Fail fast if a new attempt cannot be opened
    pub async fn ensure_can_attach(&self, booking: &Booking) -> AppResult<()> {
        if booking.status != BookingStatus::Pending {
            return Err(AppError::invalid_state(booking.status, "start a payment for"));
        }

        if let Some(open) = self.stores.attempts.find_open_for_booking(booking.id).await? {
            warn!(
                "Booking {} already has open attempt {}",
                booking.booking_number, open.gateway_reference
            );
            return Err(AppError::PaymentAlreadyInProgress(booking.booking_number.clone()));
        }

        Ok(())
    }

    /// Track a new payment attempt on a pending booking
    ///
    /// The booking's payment status becomes `pending`.
    #[instrument(skip(self, booking, attempt), fields(booking_number = %booking.booking_number, reference = %attempt.gateway_reference))]
    pub async fn attach_payment(&self, booking: &Booking, attempt: &PaymentAttempt) -> AppResult<Booking> {
        self.ensure_can_attach(booking).await?;

        let mut updated = booking.clone();
        updated.payment.method = attempt.provider;
        updated.payment.status = PaymentStatus::Pending;
        updated.payment.gateway_reference = Some(attempt.gateway_reference.clone());
        updated.updated_at = Utc::now();

        let stored = self
            .stores
            .attempts
            .open(attempt, &updated, booking.version)
            .await?;

        info!(
            "Attached {} attempt {} ({}) to booking {}",
            attempt.provider, attempt.gateway_reference, attempt.amount, stored.booking_number
        );
        Ok(stored)
    }

    /// Apply a provider success to the tracked attempt
    ///
    /// Repeating the call for an attempt that already succeeded returns the
    /// booking unchanged.
    #[instrument(skip(self))]
    pub async fn confirm_payment(&self, reference: &str) -> AppResult<Booking> {
        let mut attempt = self.load_attempt(reference).await?;
        let booking = self.load(attempt.booking_id).await?;

        match attempt.terminal_state {
            AttemptState::Succeeded => {
                debug!("Attempt {} already confirmed", reference);
                return Ok(booking);
            }
            AttemptState::None => {}
            _ => {
                warn!(
                    "Ignoring success for attempt {} in state {}",
                    reference, attempt.terminal_state
                );
                return Err(AppError::invalid_state(booking.status, "confirm payment for"));
            }
        }

        if booking.awaits_balance() {
            return self.confirm_installment(attempt, booking).await;
        }

        if !booking.status.can_transition_to(BookingStatus::Confirmed) {
            return Err(AppError::invalid_state(booking.status, "confirm payment for"));
        }

        let now = Utc::now();
        let mut updated = booking.clone();
        updated.status = BookingStatus::Confirmed;
        updated.confirmed_at = Some(now);
        updated.updated_at = now;
        updated.payment.status = match attempt.payment_type {
            PaymentType::Full => PaymentStatus::Completed,
            PaymentType::Deposit | PaymentType::Milestone => PaymentStatus::Partial,
        };
        attempt.settle(AttemptState::Succeeded);

        let stored = match self
            .stores
            .attempts
            .settle(&attempt, &updated, booking.version)
            .await
        {
            Ok(stored) => stored,
            Err(AppError::ConcurrentModification(number)) => {
                return self.after_lost_confirm(reference, number).await;
            }
            Err(e) => return Err(e),
        };

        self.apply_discount_usage(&stored).await;

        info!(
            "Booking {} confirmed via {} ({})",
            stored.booking_number, reference, stored.payment.status
        );
        self.notify(BookingEventKind::Confirmed, &stored);

        Ok(stored)
    }

    /// Outcome of a confirm whose conditional write lost to another writer
    async fn after_lost_confirm(&self, reference: &str, number: String) -> AppResult<Booking> {
        let current = self.load_attempt(reference).await?;
        let latest = self.load(current.booking_id).await?;
        match current.terminal_state {
            AttemptState::Succeeded => Ok(latest),
            AttemptState::None => Err(AppError::ConcurrentModification(number)),
            closed => {
                warn!(
                    "Attempt {} was closed as {} while confirming; booking is {}",
                    reference, closed, latest.status
                );
                Err(AppError::invalid_state(latest.status, "confirm payment for"))
            }
        }
    }

    /// Settle a balance payment on a confirmed booking
    ///
    /// Payment status becomes `completed` once the succeeded attempts cover
    /// the total payable, and stays `partial` otherwise.
    async fn confirm_installment(&self, mut attempt: PaymentAttempt, booking: Booking) -> AppResult<Booking> {
        let reference = attempt.gateway_reference.clone();
        let paid = self.amount_paid(booking.id).await? + attempt.amount;
        let payable = self
            .composer
            .total_payable(booking.payment.payment_type, booking.pricing.total);

        let mut updated = booking.clone();
        updated.updated_at = Utc::now();
        if paid >= payable {
            updated.payment.status = PaymentStatus::Completed;
        }
        attempt.settle(AttemptState::Succeeded);

        let stored = match self
            .stores
            .attempts
            .settle(&attempt, &updated, booking.version)
            .await
        {
            Ok(stored) => stored,
            Err(AppError::ConcurrentModification(number)) => {
                return self.after_lost_confirm(&reference, number).await;
            }
            Err(e) => return Err(e),
        };

        info!(
            "Balance payment {} of booking {} settled: {} of {} paid ({})",
            reference, stored.booking_number, paid, payable, stored.payment.status
        );
        self.notify(BookingEventKind::InstallmentPaid, &stored);

        Ok(stored)
    }

    /// Sum of the booking's succeeded attempts
    pub async fn amount_paid(&self, booking_id: Uuid) -> AppResult<Decimal> {
        Ok(self
            .stores
            .attempts
            .list_for_booking(booking_id)
            .await?
            .iter()
            .filter(|a| a.terminal_state == AttemptState::Succeeded)
            .map(|a| a.amount)
            .sum())
    }

    fn schedule_for(&self, booking: &Booking, amount_paid: Decimal, today: NaiveDate) -> PaymentSchedule {
        self.composer.schedule(
            booking.payment.payment_type,
            booking.pricing.total,
            booking.payment.deposit_percentage,
            booking.date_range.check_in,
            booking.created_at.date_naive(),
            amount_paid,
            today,
        )
    }

    /// Installments of a booking visible to `actor`, with what is paid and due
    pub async fn payment_schedule(
        &self,
        booking_id: Uuid,
        actor: &Actor,
        today: NaiveDate,
    ) -> AppResult<PaymentSchedule> {
        let booking = self.get(booking_id, actor).await?;
        let paid = self.amount_paid(booking.id).await?;
        Ok(self.schedule_for(&booking, paid, today))
    }

    /// The installment a balance payment on `booking` would settle
    ///
    /// # Errors
    ///
    /// `INVALID_BOOKING_STATE` unless the booking is confirmed with a partial
    /// payment; `PAYMENT_ALREADY_IN_PROGRESS` while an attempt is open.
    pub async fn next_installment(&self, booking: &Booking, today: NaiveDate) -> AppResult<ScheduledInstallment> {
        if !booking.awaits_balance() {
            return Err(AppError::invalid_state(booking.status, "pay the balance of"));
        }

        if let Some(open) = self.stores.attempts.find_open_for_booking(booking.id).await? {
            warn!(
                "Booking {} already has open attempt {}",
                booking.booking_number, open.gateway_reference
            );
            return Err(AppError::PaymentAlreadyInProgress(booking.booking_number.clone()));
        }

        let paid = self.amount_paid(booking.id).await?;
        self.schedule_for(booking, paid, today)
            .next_unpaid()
            .cloned()
            .ok_or_else(|| AppError::invalid_state(booking.status, "pay the balance of"))
    }

    /// Track a balance payment attempt on a confirmed booking
    ///
    /// Booking and payment status are left as they are until the attempt settles.
    #[instrument(skip(self, booking, attempt), fields(booking_number = %booking.booking_number, reference = %attempt.gateway_reference))]
    pub async fn attach_installment(&self, booking: &Booking, attempt: &PaymentAttempt) -> AppResult<Booking> {
        if !booking.awaits_balance() {
            return Err(AppError::invalid_state(booking.status, "pay the balance of"));
        }

        let mut updated = booking.clone();
        updated.payment.gateway_reference = Some(attempt.gateway_reference.clone());
        updated.updated_at = Utc::now();

        let stored = self
            .stores
            .attempts
            .open(attempt, &updated, booking.version)
            .await?;

        info!(
            "Attached {} balance attempt {} ({}) to booking {}",
            attempt.provider, attempt.gateway_reference, attempt.amount, stored.booking_number
        );
        Ok(stored)
    }

    /// Publish a reminder for every unpaid installment due by `today + lead_days`
    ///
    /// Returns how many reminders went out. A booking that cannot be read is
    /// skipped.
    #[instrument(skip(self))]
    pub async fn send_installment_reminders(&self, today: NaiveDate, lead_days: i64) -> AppResult<usize> {
        let horizon = today + Duration::days(lead_days.max(0));
        let bookings = self
            .stores
            .bookings
            .list_awaiting_balance(REMINDER_BATCH_SIZE)
            .await?;

        let mut sent = 0;
        for booking in &bookings {
            let paid = match self.amount_paid(booking.id).await {
                Ok(paid) => paid,
                Err(e) => {
                    warn!("Skipping reminder for booking {}: {}", booking.booking_number, e);
                    continue;
                }
            };

            let schedule = self.schedule_for(booking, paid, today);
            let Some(next) = schedule.next_unpaid() else {
                continue;
            };
            if next.installment.due_date > horizon {
                continue;
            }

            debug!(
                "Reminding {} of installment {} ({}) due {}",
                booking.booking_number,
                next.installment.installment,
                next.amount_outstanding,
                next.installment.due_date
            );
            self.notifier.dispatch(
                BookingEvent::for_booking(BookingEventKind::PaymentReminder, booking)
                    .with_installment(next.clone()),
            );
            sent += 1;
        }

        info!(
            "Sent {} installment reminders across {} bookings with a balance",
            sent,
            bookings.len()
        );
        Ok(sent)
    }

    /// Count promo or student discount use once the booking is paid for
    async fn apply_discount_usage(&self, booking: &Booking) {
        match booking.pricing.discount_source {
            DiscountSource::Promo => {
                if let Some(code) = &booking.pricing.promo_code {
                    if let Err(e) = self.stores.promos.record_usage(code).await {
                        warn!("Failed to record promo usage for {}: {}", code, e);
                    }
                }
            }
            DiscountSource::Student => {
                match self
                    .stores
                    .profiles
                    .consume_student_discount(&booking.requester_id)
                    .await
                {
                    Ok(left) => debug!("{} student discounts left for {}", left, booking.requester_id),
                    Err(e) => warn!(
                        "Failed to consume student discount for {}: {}",
                        booking.requester_id, e
                    ),
                }
            }
            DiscountSource::None => {}
        }
    }

    /// Apply a provider failure or expiry to the tracked attempt
    ///
    /// The booking stays pending so the guest can retry with a new attempt.
    #[instrument(skip(self))]
    pub async fn fail_payment(&self, reference: &str, state: AttemptState) -> AppResult<Booking> {
        let mut attempt = self.load_attempt(reference).await?;
        let booking = self.load(attempt.booking_id).await?;

        if !attempt.is_open() {
            debug!(
                "Attempt {} already closed as {}",
                reference, attempt.terminal_state
            );
            return Ok(booking);
        }

        let state = match state {
            AttemptState::Expired => AttemptState::Expired,
            _ => AttemptState::Failed,
        };

        let mut updated = booking.clone();
        if updated.status == BookingStatus::Pending {
            updated.payment.status = PaymentStatus::Failed;
        }
        updated.updated_at = Utc::now();
        attempt.settle(state);

        let stored = self
            .stores
            .attempts
            .settle(&attempt, &updated, booking.version)
            .await?;

        info!(
            "Payment attempt {} for booking {} closed as {}",
            reference, stored.booking_number, state
        );
        self.notify(BookingEventKind::PaymentFailed, &stored);

        Ok(stored)
    }

    /// Close the booking's open attempt as superseded, or just save
    async fn write_closing(&self, booking: &Booking, updated: &Booking) -> AppResult<Booking> {
        match self.stores.attempts.find_open_for_booking(booking.id).await? {
            Some(mut open) => {
                open.settle(AttemptState::Superseded);
                info!(
                    "Superseding attempt {} of booking {}",
                    open.gateway_reference, booking.booking_number
                );
                self.stores
                    .attempts
                    .settle(&open, updated, booking.version)
                    .await
            }
            None => self.stores.bookings.save(updated, booking.version).await,
        }
    }

    fn cancellation_record(
        actor: &Actor,
        reason: String,
        quote: RefundQuote,
        now: DateTime<Utc>,
    ) -> CancellationRecord {
        CancellationRecord {
            cancelled_at: now,
            cancelled_by: actor.requester_id.clone(),
            reason,
            refund_amount: quote.refund_amount,
            refund_status: quote.refund_status,
            policy_applied: quote.policy_applied,
            days_until_checkin: quote.days_until_checkin,
            processing_time: quote.processing_time,
        }
    }

    /// Cancel a pending or confirmed booking
    ///
    /// Cancelling an already-cancelled booking succeeds without changes and
    /// returns the original cancellation record.
    #[instrument(skip(self, reason))]
    pub async fn cancel(
        &self,
        booking_id: Uuid,
        actor: &Actor,
        reason: Option<String>,
        now: DateTime<Utc>,
    ) -> AppResult<CancellationOutcome> {
        let booking = self.get(booking_id, actor).await?;

        if booking.status == BookingStatus::Cancelled {
            let record = booking.cancellation.clone().ok_or_else(|| {
                AppError::Internal(format!(
                    "Cancelled booking {} has no cancellation record",
                    booking.booking_number
                ))
            })?;
            debug!("Booking {} already cancelled", booking.booking_number);
            return Ok(CancellationOutcome {
                booking,
                cancellation_details: record,
                already_cancelled: true,
            });
        }

        if !booking.status.can_transition_to(BookingStatus::Cancelled) {
            return Err(AppError::invalid_state(booking.status, "cancel"));
        }

        let quote = self.refunds.compute_refund(&booking, now);
        let reason = reason
            .map(|r| r.trim().to_string())
            .filter(|r| !r.is_empty())
            .unwrap_or_else(|| DEFAULT_CANCEL_REASON.to_string());
        let record = Self::cancellation_record(actor, reason, quote, now);

        let mut updated = booking.clone();
        updated.status = BookingStatus::Cancelled;
        updated.cancellation = Some(record.clone());
        updated.updated_at = now;

        let stored = self.write_closing(&booking, &updated).await?;
        self.monitors.cancel(booking.id).await;

        info!(
            "Booking {} cancelled by {}: refund {} ({})",
            stored.booking_number, actor.requester_id, record.refund_amount, record.policy_applied
        );
        self.notify(BookingEventKind::Cancelled, &stored);

        Ok(CancellationOutcome {
            booking: stored,
            cancellation_details: record,
            already_cancelled: false,
        })
    }

    /// Operator rejection of a pending booking
    #[instrument(skip(self, reason))]
    pub async fn reject(
        &self,
        booking_id: Uuid,
        actor: &Actor,
        reason: Option<String>,
        now: DateTime<Utc>,
    ) -> AppResult<CancellationOutcome> {
        if !actor.is_operator() {
            return Err(AppError::Forbidden("Operator role required".to_string()));
        }

        let booking = self.load(booking_id).await?;
        if !booking.status.can_transition_to(BookingStatus::Rejected) {
            return Err(AppError::invalid_state(booking.status, "reject"));
        }

        let quote = self.refunds.rejection_refund(&booking, now);
        let reason = reason
            .map(|r| r.trim().to_string())
            .filter(|r| !r.is_empty())
            .unwrap_or_else(|| DEFAULT_REJECT_REASON.to_string());
        let record = Self::cancellation_record(actor, reason, quote, now);

        let mut updated = booking.clone();
        updated.status = BookingStatus::Rejected;
        updated.cancellation = Some(record.clone());
        updated.updated_at = now;

        let stored = self.write_closing(&booking, &updated).await?;
        self.monitors.cancel(booking.id).await;

        info!(
            "Booking {} rejected by {}",
            stored.booking_number, actor.requester_id
        );
        self.notify(BookingEventKind::Rejected, &stored);

        Ok(CancellationOutcome {
            booking: stored,
            cancellation_details: record,
            already_cancelled: false,
        })
    }

    /// Mark a confirmed stay as finished once check-out has passed
    #[instrument(skip(self))]
    pub async fn complete(&self, booking_id: Uuid, actor: &Actor, today: NaiveDate) -> AppResult<Booking> {
        if !actor.is_operator() {
            return Err(AppError::Forbidden("Operator role required".to_string()));
        }

        let booking = self.load(booking_id).await?;
        if !booking.status.can_transition_to(BookingStatus::Completed) {
            return Err(AppError::invalid_state(booking.status, "complete"));
        }
        if booking.date_range.check_out > today {
            return Err(AppError::Validation(format!(
                "Booking {} cannot be completed before check-out on {}",
                booking.booking_number, booking.date_range.check_out
            )));
        }

        let now = Utc::now();
        let mut updated = booking.clone();
        updated.status = BookingStatus::Completed;
        updated.completed_at = Some(now);
        updated.updated_at = now;

        let stored = self.stores.bookings.save(&updated, booking.version).await?;

        info!("Booking {} completed", stored.booking_number);
        self.notify(BookingEventKind::Completed, &stored);

        Ok(stored)
    }

    /// Partial update by the owner
    ///
    /// Guest details may change in any non-terminal state. Date, unit and
    /// party changes re-check capacity and re-price; a different total is
    /// recorded in `price_change` and payment status is left alone.
    #[instrument(skip(self, changes))]
    pub async fn update(
        &self,
        booking_id: Uuid,
        actor: &Actor,
        changes: BookingChanges,
        now: DateTime<Utc>,
    ) -> AppResult<Booking> {
        let booking = self.get_owned(booking_id, actor).await?;

        if booking.status.is_terminal() {
            return Err(AppError::invalid_state(booking.status, "update"));
        }

        let mut updated = booking.clone();
        updated.updated_at = now;

        if let Some(details) = &changes.guest_details {
            validate_guest_details(details)?;
            updated.guest_details = details.clone();
        }

        if !changes.touches_schedule(&booking) {
            return self.stores.bookings.save(&updated, booking.version).await;
        }

        let hours_left = booking.date_range.hours_until_check_in(now);
        if hours_left < self.modification_cutoff_hours {
            return Err(AppError::ModificationWindowClosed(format!(
                "dates and units are locked {} hours before check-in",
                self.modification_cutoff_hours
            )));
        }

        let unit_id = changes.unit_id.unwrap_or(booking.inventory_unit_id);
        let check_in = changes.check_in.unwrap_or(booking.date_range.check_in);
        // Moving check-in alone keeps the length of stay
        let check_out = changes.check_out.or_else(|| {
            if check_in != booking.date_range.check_in {
                Some(check_in + Duration::days(booking.date_range.nights()))
            } else {
                Some(booking.date_range.check_out)
            }
        });
        let guests = changes.guests.unwrap_or(booking.guest_count);

        let (unit, range, _) = self
            .availability
            .check_availability(unit_id, check_in, check_out, guests, now.date_naive())
            .await?;
        check_party(&unit, guests)?;

        let (pricing, _) = self
            .resolve_price(
                &unit,
                &range,
                guests,
                booking.pricing.promo_code.as_deref(),
                Some(&booking.requester_id),
            )
            .await?;

        if pricing.total != booking.pricing.total {
            updated.price_change = Some(PriceChange::between(booking.pricing.total, pricing.total));
        }
        updated.inventory_unit_id = unit.id;
        updated.date_range = range;
        updated.guest_count = guests;
        updated.pricing = pricing;

        let stored = self
            .stores
            .bookings
            .update_with_hold(&updated, &unit, booking.version)
            .await?;

        info!(
            "Booking {} rescheduled to {} - {} (total {} -> {})",
            stored.booking_number,
            stored.date_range.check_in,
            stored.date_range.check_out,
            booking.pricing.total,
            stored.pricing.total
        );

        Ok(stored)
    }
}
