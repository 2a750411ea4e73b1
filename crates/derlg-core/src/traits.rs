//! Common traits for repositories and collaborators
//!
//! Defines the storage seams the booking services are generic over, plus the
//! external collaborators (promo store, notifications, cache).

use crate::error::AppError;
use crate::models::{
    Booking, BookingStatus, DateRange, InventoryUnit, PaymentAttempt, PromoContext,
    PromoValidation, RequesterProfile, ScheduledInstallment,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Serialize};
use std::fmt;
use uuid::Uuid;

/// Read access to the inventory catalog
#[async_trait]
pub trait InventoryRepository: Send + Sync {
    /// Find inventory unit by ID
    async fn find_by_id(&self, id: Uuid) -> Result<Option<InventoryUnit>, AppError>;
}

/// Booking persistence
///
/// Implementations must make `insert_with_hold` and `update_with_hold` atomic
/// with respect to concurrent holds on the same inventory unit, and every
/// write conditional on `expected_version`.
#[async_trait]
pub trait BookingRepository: Send + Sync {
    /// Find booking by ID
    async fn find_by_id(&self, id: Uuid) -> Result<Option<Booking>, AppError>;

    /// Find booking by its human-readable number
    async fn find_by_number(&self, booking_number: &str) -> Result<Option<Booking>, AppError>;

    /// List a requester's bookings, newest first
    async fn list_by_requester(
        &self,
        requester_id: &str,
        limit: i64,
        offset: i64,
    ) -> Result<(Vec<Booking>, i64), AppError>;

    /// Capacity used by holding bookings overlapping `range`
    async fn occupancy(
        &self,
        unit: &InventoryUnit,
        range: &DateRange,
        exclude_booking: Option<Uuid>,
    ) -> Result<i32, AppError>;

    /// Check capacity and insert the pending booking in one transaction
    ///
    /// Fails with `RoomUnavailable` (and writes nothing) when the unit is full.
    async fn insert_with_hold(
        &self,
        booking: &Booking,
        unit: &InventoryUnit,
    ) -> Result<Booking, AppError>;

    /// Re-check capacity (excluding the booking itself) and write date/unit changes
    async fn update_with_hold(
        &self,
        booking: &Booking,
        unit: &InventoryUnit,
        expected_version: i32,
    ) -> Result<Booking, AppError>;

    /// Conditional write; `ConcurrentModification` on version mismatch
    async fn save(&self, booking: &Booking, expected_version: i32) -> Result<Booking, AppError>;

    /// Confirmed bookings whose payment is still `partial`, earliest check-in first
    async fn list_awaiting_balance(&self, limit: i64) -> Result<Vec<Booking>, AppError>;
}

/// Payment attempt persistence
///
/// Attempt writes are always paired with the booking write they imply.
#[async_trait]
pub trait PaymentAttemptRepository: Send + Sync {
    /// Find attempt by gateway reference
    async fn find_by_reference(&self, reference: &str)
        -> Result<Option<PaymentAttempt>, AppError>;

    /// The single non-terminal attempt of a booking, if any
    async fn find_open_for_booking(
        &self,
        booking_id: Uuid,
    ) -> Result<Option<PaymentAttempt>, AppError>;

    /// All attempts of a booking, oldest first
    async fn list_for_booking(&self, booking_id: Uuid) -> Result<Vec<PaymentAttempt>, AppError>;

    /// Insert an open attempt and write the booking atomically
    ///
    /// Fails with `PaymentAlreadyInProgress` if the booking already has one.
    async fn open(
        &self,
        attempt: &PaymentAttempt,
        booking: &Booking,
        expected_version: i32,
    ) -> Result<Booking, AppError>;

    /// Close an open attempt and write the booking atomically
    async fn settle(
        &self,
        attempt: &PaymentAttempt,
        booking: &Booking,
        expected_version: i32,
    ) -> Result<Booking, AppError>;

    /// Record a status check
    async fn touch(&self, reference: &str) -> Result<(), AppError>;
}

/// Student-discount counters per requester
#[async_trait]
pub trait RequesterProfileRepository: Send + Sync {
    /// Find profile by requester ID
    async fn find_profile(&self, requester_id: &str)
        -> Result<Option<RequesterProfile>, AppError>;

    /// Use one student discount, floored at zero; returns what is left
    async fn consume_student_discount(&self, requester_id: &str) -> Result<i32, AppError>;
}

/// External promo-code store
#[async_trait]
pub trait PromoCodeStore: Send + Sync {
    /// Validate a code for a booking context
    async fn validate(&self, code: &str, context: &PromoContext)
        -> Result<PromoValidation, AppError>;

    /// Count one redemption
    async fn record_usage(&self, code: &str) -> Result<(), AppError>;
}

/// Lifecycle event kinds published to the notification layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum BookingEventKind {
    #[serde(rename = "booking.created")]
    Created,
    #[serde(rename = "booking.confirmed")]
    Confirmed,
    #[serde(rename = "booking.cancelled")]
    Cancelled,
    #[serde(rename = "booking.rejected")]
    Rejected,
    #[serde(rename = "booking.completed")]
    Completed,
    #[serde(rename = "payment.failed")]
    PaymentFailed,
    #[serde(rename = "payment.installment_paid")]
    InstallmentPaid,
    #[serde(rename = "payment.reminder")]
    PaymentReminder,
}

impl fmt::Display for BookingEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BookingEventKind::Created => write!(f, "booking.created"),
            BookingEventKind::Confirmed => write!(f, "booking.confirmed"),
            BookingEventKind::Cancelled => write!(f, "booking.cancelled"),
            BookingEventKind::Rejected => write!(f, "booking.rejected"),
            BookingEventKind::Completed => write!(f, "booking.completed"),
            BookingEventKind::PaymentFailed => write!(f, "payment.failed"),
            BookingEventKind::InstallmentPaid => write!(f, "payment.installment_paid"),
            BookingEventKind::PaymentReminder => write!(f, "payment.reminder"),
        }
    }
}

/// Notification payload
#[derive(Debug, Clone, Serialize)]
pub struct BookingEvent {
    pub event: BookingEventKind,
    pub booking_id: Uuid,
    pub booking_number: String,
    pub requester_id: String,
    pub status: BookingStatus,
    /// Set on reminders: the installment being asked for
    #[serde(skip_serializing_if = "Option::is_none")]
    pub installment: Option<ScheduledInstallment>,
    pub occurred_at: DateTime<Utc>,
}

impl BookingEvent {
    pub fn for_booking(event: BookingEventKind, booking: &Booking) -> Self {
        Self {
            event,
            booking_id: booking.id,
            booking_number: booking.booking_number.clone(),
            requester_id: booking.requester_id.clone(),
            status: booking.status,
            installment: None,
            occurred_at: Utc::now(),
        }
    }

    pub fn with_installment(mut self, installment: ScheduledInstallment) -> Self {
        self.installment = Some(installment);
        self
    }
}

/// Fire-and-forget notification dispatch
///
/// Implementations must not block the caller or surface delivery failures.
pub trait NotificationDispatcher: Send + Sync {
    fn dispatch(&self, event: BookingEvent);
}

/// Cache service trait
#[async_trait]
pub trait CacheService: Send + Sync {
    /// Get value from cache
    async fn get<T: DeserializeOwned + Send>(&self, key: &str) -> Result<Option<T>, AppError>;

    /// Set value in cache with TTL
    async fn set<T: Serialize + Send + Sync>(
        &self,
        key: &str,
        value: &T,
        ttl_secs: u64,
    ) -> Result<(), AppError>;

    /// Set only if absent, with TTL; true when this call took the key
    async fn set_nx(&self, key: &str, value: &str, ttl_secs: u64) -> Result<bool, AppError>;

    /// Delete value from cache
    async fn delete(&self, key: &str) -> Result<bool, AppError>;
}

/// Pagination parameters
#[derive(Debug, Clone, Default)]
pub struct Pagination {
    pub page: i64,
    pub per_page: i64,
}

impl Pagination {
    pub fn new(page: i64, per_page: i64) -> Self {
        Self {
            page: page.max(1),
            per_page: per_page.clamp(1, 100),
        }
    }

    pub fn offset(&self) -> i64 {
        (self.page - 1) * self.per_page
    }

    pub fn limit(&self) -> i64 {
        self.per_page
    }
}

/// Paginated response wrapper
#[derive(Debug, Clone, Serialize)]
pub struct PaginatedResponse<T> {
    pub data: Vec<T>,
    pub pagination: PaginationMeta,
}

/// Pagination metadata
#[derive(Debug, Clone, Serialize)]
pub struct PaginationMeta {
    pub total: i64,
    pub page: i64,
    pub per_page: i64,
    pub total_pages: i64,
}

impl PaginationMeta {
    pub fn new(total: i64, page: i64, per_page: i64) -> Self {
        let total_pages = if per_page > 0 {
            (total + per_page - 1) / per_page
        } else {
            0
        };

        Self {
            total,
            page,
            per_page,
            total_pages,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pagination() {
        let p = Pagination::new(1, 10);
        assert_eq!(p.offset(), 0);
        assert_eq!(p.limit(), 10);

        let p = Pagination::new(3, 20);
        assert_eq!(p.offset(), 40);
    }

    #[test]
    fn test_pagination_bounds() {
        let p = Pagination::new(0, 10);
        assert_eq!(p.page, 1);

        let p = Pagination::new(1, 500);
        assert_eq!(p.per_page, 100);
    }

    #[test]
    fn test_pagination_meta() {
        assert_eq!(PaginationMeta::new(95, 1, 10).total_pages, 10);
        assert_eq!(PaginationMeta::new(101, 1, 10).total_pages, 11);
        assert_eq!(PaginationMeta::new(0, 1, 10).total_pages, 0);
    }

    #[test]
    fn test_event_kind_serializes_dotted() {
        let json = serde_json::to_string(&BookingEventKind::PaymentFailed).unwrap();
        assert_eq!(json, "\"payment.failed\"");
        assert_eq!(BookingEventKind::PaymentReminder.to_string(), "payment.reminder");
    }
}
