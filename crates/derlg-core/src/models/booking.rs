//! Booking model
//!
//! A booking is created `pending` when a quote and an availability hold succeed.
//! Status transitions belong to the booking state machine in `derlg-services`;
//! rows are never deleted, cancellation is a status.

use chrono::{DateTime, Days, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;
use validator::Validate;

use super::pricing::PriceBreakdown;
use crate::error::AppError;
use crate::AppResult;

const SECONDS_PER_DAY: i64 = 86_400;

/// Booking status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum BookingStatus {
    /// Holding inventory, awaiting payment
    #[default]
    Pending,
    /// Paid (fully or first installment)
    Confirmed,
    /// Stay or event is over
    Completed,
    /// Cancelled by the guest or an operator
    Cancelled,
    /// Refused by the operator
    Rejected,
}

impl fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BookingStatus::Pending => write!(f, "pending"),
            BookingStatus::Confirmed => write!(f, "confirmed"),
            BookingStatus::Completed => write!(f, "completed"),
            BookingStatus::Cancelled => write!(f, "cancelled"),
            BookingStatus::Rejected => write!(f, "rejected"),
        }
    }
}

impl BookingStatus {
    /// Parse from string
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "pending" => Some(BookingStatus::Pending),
            "confirmed" => Some(BookingStatus::Confirmed),
            "completed" => Some(BookingStatus::Completed),
            "cancelled" => Some(BookingStatus::Cancelled),
            "rejected" => Some(BookingStatus::Rejected),
            _ => None,
        }
    }

    /// Check if the booking still holds inventory
    pub fn is_holding(&self) -> bool {
        matches!(self, BookingStatus::Pending | BookingStatus::Confirmed)
    }

    /// Check if no further transition is possible
    pub fn is_terminal(&self) -> bool {
        !self.is_holding()
    }

    /// Lifecycle edges
    pub fn can_transition_to(&self, next: BookingStatus) -> bool {
        use BookingStatus::*;
        matches!(
            (self, next),
            (Pending, Confirmed)
                | (Pending, Rejected)
                | (Pending, Cancelled)
                | (Confirmed, Completed)
                | (Confirmed, Cancelled)
        )
    }
}

/// Payment channel chosen for a booking
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    /// Card payment intent
    #[default]
    Card,
    /// Wallet redirect and capture
    Wallet,
    /// QR push payment
    Qr,
}

impl fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PaymentMethod::Card => write!(f, "card"),
            PaymentMethod::Wallet => write!(f, "wallet"),
            PaymentMethod::Qr => write!(f, "qr"),
        }
    }
}

impl PaymentMethod {
    /// Parse from string, accepting provider names
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "card" | "stripe" => Some(PaymentMethod::Card),
            "wallet" | "paypal" => Some(PaymentMethod::Wallet),
            "qr" | "bakong" | "khqr" => Some(PaymentMethod::Qr),
            _ => None,
        }
    }
}

/// Payment structure selected from the quote
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PaymentType {
    #[default]
    Full,
    Deposit,
    Milestone,
}

impl fmt::Display for PaymentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PaymentType::Full => write!(f, "full"),
            PaymentType::Deposit => write!(f, "deposit"),
            PaymentType::Milestone => write!(f, "milestone"),
        }
    }
}

impl PaymentType {
    /// Parse from string
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "full" => Some(PaymentType::Full),
            "deposit" => Some(PaymentType::Deposit),
            "milestone" => Some(PaymentType::Milestone),
            _ => None,
        }
    }
}

/// Aggregate payment status of a booking
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    #[default]
    Unpaid,
    Pending,
    Partial,
    Completed,
    Failed,
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PaymentStatus::Unpaid => write!(f, "unpaid"),
            PaymentStatus::Pending => write!(f, "pending"),
            PaymentStatus::Partial => write!(f, "partial"),
            PaymentStatus::Completed => write!(f, "completed"),
            PaymentStatus::Failed => write!(f, "failed"),
        }
    }
}

impl PaymentStatus {
    /// Parse from string
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "unpaid" => Some(PaymentStatus::Unpaid),
            "pending" => Some(PaymentStatus::Pending),
            "partial" => Some(PaymentStatus::Partial),
            "completed" => Some(PaymentStatus::Completed),
            "failed" => Some(PaymentStatus::Failed),
            _ => None,
        }
    }

    /// Whether money has actually been collected
    pub fn has_collected_funds(&self) -> bool {
        matches!(self, PaymentStatus::Partial | PaymentStatus::Completed)
    }
}

/// Requested stay or event date
///
/// Ranges are half-open: `check_out` is exclusive. Single-date bookings
/// (tours, events) are stored as `[date, date + 1)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub check_in: NaiveDate,
    pub check_out: NaiveDate,
}

impl DateRange {
    pub fn new(check_in: NaiveDate, check_out: NaiveDate) -> Self {
        Self {
            check_in,
            check_out,
        }
    }

    /// One-day range for tours and events
    pub fn single_day(date: NaiveDate) -> Self {
        Self {
            check_in: date,
            check_out: date.checked_add_days(Days::new(1)).unwrap_or(date),
        }
    }

    /// Number of nights covered
    pub fn nights(&self) -> i64 {
        (self.check_out - self.check_in).num_days()
    }

    /// Half-open interval intersection
    pub fn overlaps(&self, other: &DateRange) -> bool {
        self.check_in < other.check_out && other.check_in < self.check_out
    }

    /// Reject empty, inverted, or past ranges
    pub fn validate(&self, today: NaiveDate) -> AppResult<()> {
        if self.check_out <= self.check_in {
            return Err(AppError::InvalidDate(format!(
                "check_out ({}) must be after check_in ({})",
                self.check_out, self.check_in
            )));
        }

        if self.check_in < today {
            return Err(AppError::InvalidDate(format!(
                "check_in ({}) cannot be in the past",
                self.check_in
            )));
        }

        Ok(())
    }

    /// Whole days from `now` until check-in (midnight UTC), rounded up
    ///
    /// Negative once check-in has passed.
    pub fn days_until_check_in(&self, now: DateTime<Utc>) -> i64 {
        let check_in_start = self.check_in.and_time(chrono::NaiveTime::MIN).and_utc();
        let secs = (check_in_start - now).num_seconds();

        if secs >= 0 {
            (secs + SECONDS_PER_DAY - 1) / SECONDS_PER_DAY
        } else {
            -((-secs) / SECONDS_PER_DAY)
        }
    }

    /// Hours from `now` until check-in (midnight UTC)
    pub fn hours_until_check_in(&self, now: DateTime<Utc>) -> i64 {
        let check_in_start = self.check_in.and_time(chrono::NaiveTime::MIN).and_utc();
        (check_in_start - now).num_hours()
    }
}

/// Lead guest contact details
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default, Validate)]
pub struct GuestDetails {
    #[validate(length(min = 1, max = 100, message = "guest name must be 1 to 100 characters"))]
    pub name: String,
    #[validate(email(message = "guest email is not valid"))]
    pub email: String,
    #[validate(length(min = 6, max = 20, message = "guest phone must be 6 to 20 characters"))]
    pub phone: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(length(max = 1000, message = "notes must be at most 1000 characters"))]
    pub notes: Option<String>,
}

/// Payment section of a booking
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BookingPayment {
    pub method: PaymentMethod,
    #[serde(rename = "type")]
    pub payment_type: PaymentType,
    pub status: PaymentStatus,
    /// Only meaningful for deposit payments
    pub deposit_percentage: Decimal,
    pub gateway_reference: Option<String>,
}

/// What the guest must do after a price-affecting update
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PriceAction {
    Charge,
    Refund,
    None,
}

/// Recorded when an update changes the booking total
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceChange {
    pub old_total: Decimal,
    pub new_total: Decimal,
    /// `new_total - old_total`
    pub difference: Decimal,
    pub action_required: PriceAction,
    /// Absolute difference
    pub amount: Decimal,
}

impl PriceChange {
    pub fn between(old_total: Decimal, new_total: Decimal) -> Self {
        let difference = new_total - old_total;
        let action_required = if difference > Decimal::ZERO {
            PriceAction::Charge
        } else if difference < Decimal::ZERO {
            PriceAction::Refund
        } else {
            PriceAction::None
        };

        Self {
            old_total,
            new_total,
            difference,
            action_required,
            amount: difference.abs(),
        }
    }
}

/// Refund processing classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RefundStatus {
    /// Nothing was collected, nothing to refund
    NotApplicable,
    /// Policy yields zero
    NoRefund,
    /// Refund owed, executed out of band
    Pending,
}

impl fmt::Display for RefundStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RefundStatus::NotApplicable => write!(f, "not_applicable"),
            RefundStatus::NoRefund => write!(f, "no_refund"),
            RefundStatus::Pending => write!(f, "pending"),
        }
    }
}

/// Stored when a booking is cancelled or rejected
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CancellationRecord {
    pub cancelled_at: DateTime<Utc>,
    pub cancelled_by: String,
    pub reason: String,
    pub refund_amount: Decimal,
    pub refund_status: RefundStatus,
    pub policy_applied: String,
    pub days_until_checkin: i64,
    pub processing_time: String,
}

/// Booking entity
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Booking {
    pub id: Uuid,

    /// Human-readable, unique, immutable
    pub booking_number: String,

    pub inventory_unit_id: Uuid,

    /// Opaque identity from the session layer
    pub requester_id: String,

    pub date_range: DateRange,
    pub guest_count: i32,
    pub guest_details: GuestDetails,
    pub pricing: PriceBreakdown,
    pub payment: BookingPayment,
    pub status: BookingStatus,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub price_change: Option<PriceChange>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub cancellation: Option<CancellationRecord>,

    /// Optimistic concurrency token, bumped on every write
    pub version: i32,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub confirmed_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Booking {
    /// Create a new pending, unpaid booking
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        inventory_unit_id: Uuid,
        requester_id: String,
        date_range: DateRange,
        guest_count: i32,
        guest_details: GuestDetails,
        pricing: PriceBreakdown,
        method: PaymentMethod,
        payment_type: PaymentType,
        deposit_percentage: Decimal,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            booking_number: generate_booking_number(now),
            inventory_unit_id,
            requester_id,
            date_range,
            guest_count,
            guest_details,
            pricing,
            payment: BookingPayment {
                method,
                payment_type,
                status: PaymentStatus::Unpaid,
                deposit_percentage,
                gateway_reference: None,
            },
            status: BookingStatus::Pending,
            price_change: None,
            cancellation: None,
            version: 1,
            created_at: now,
            updated_at: now,
            confirmed_at: None,
            completed_at: None,
        }
    }

    /// Check if the booking belongs to the requester
    pub fn is_owned_by(&self, requester_id: &str) -> bool {
        self.requester_id == requester_id
    }

    /// Confirmed with installments still to pay
    pub fn awaits_balance(&self) -> bool {
        self.status == BookingStatus::Confirmed && self.payment.status == PaymentStatus::Partial
    }
}

/// Generate a booking number: `BK-<base36 millis>-<4 random base36>`
pub fn generate_booking_number(now: DateTime<Utc>) -> String {
    let millis = u128::try_from(now.timestamp_millis()).unwrap_or_default();
    let random = to_base36(Uuid::new_v4().as_u128());
    let suffix: String = random.chars().rev().take(4).collect();

    format!("BK-{}-{:0>4}", to_base36(millis), suffix)
}

fn to_base36(mut n: u128) -> String {
    const DIGITS: &[u8; 36] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ";

    if n == 0 {
        return "0".to_string();
    }

    let mut out = Vec::new();
    while n > 0 {
        out.push(DIGITS[(n % 36) as usize]);
        n /= 36;
    }
    out.reverse();
    String::from_utf8(out).unwrap_or_default()
}
