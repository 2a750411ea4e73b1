//! Booking lifecycle and payment reconciliation services
//!
//! This crate holds the business logic of the booking engine. Storage and
//! external collaborators are reached through the traits in `derlg-core`.
//!
//! # Services
//!
//! - `PricingCalculator` - Base rate, discounts and tax into a `PriceBreakdown`
//! - `AvailabilityResolver` - Capacity left for a unit and date range
//! - `PaymentOptionComposer` - Deposit, milestone and full payment structures
//! - `BookingService` - The booking state machine; the only writer of booking status
//! - `PaymentService` - Gateway create/verify/status flows
//! - `ReconciliationPoller` - Cancellable QR payment monitors
//! - `RefundPolicy` - Tiered cancellation refunds
//! - `ReminderTask` - Periodic reminders of installments falling due
//! - `LogNotifier` / `WebhookNotifier` - Booking event delivery

pub mod availability;
pub mod booking_state_machine;
pub mod gateways;
pub mod notifications;
pub mod payment_options;
pub mod payments;
pub mod pricing;
pub mod reconciliation;
pub mod refund_policy;
pub mod reminders;

#[cfg(any(test, feature = "test-support"))]
pub mod testing;

pub use availability::{AvailabilityResolver, AvailabilityResult};
pub use booking_state_machine::{
    Actor, BookingChanges, BookingRequest, BookingService, BookingStores, CancellationOutcome,
    Quote, QuoteRequest,
};
pub use gateways::{
    CardGateway, GatewayError, GatewayPayment, GatewayRegistry, PaymentGateway, QrGateway,
    WalletGateway,
};
pub use notifications::{LogNotifier, WebhookNotifier};
pub use payment_options::PaymentOptionComposer;
pub use payments::{PaymentInitiation, PaymentService, PaymentVerification};
pub use pricing::PricingCalculator;
pub use reconciliation::{
    MonitorOutcome, MonitorRegistry, MonitorRequest, MonitorResult, ReconciliationPoller,
};
pub use refund_policy::{RefundPolicy, RefundQuote};
pub use reminders::ReminderTask;

/// Business logic constants
pub mod constants {
    /// Reason stored when a guest cancels without giving one
    pub const DEFAULT_CANCEL_REASON: &str = "Requested by guest";

    /// Reason stored when an operator rejects without giving one
    pub const DEFAULT_REJECT_REASON: &str = "Rejected by operator";

    /// Policy label of operator rejections
    pub const OPERATOR_REJECTION_POLICY: &str = "operator_rejection";

    /// Processing time shown when nothing is refunded
    pub const NO_REFUND_PROCESSING_TIME: &str = "N/A";

    /// Refresh wallet OAuth tokens this long before they expire
    pub const WALLET_TOKEN_REFRESH_MARGIN_SECS: i64 = 60;

    /// KHQR merchant name limit (tag 59)
    pub const KHQR_MAX_NAME_LEN: usize = 25;

    /// KHQR merchant city limit (tag 60)
    pub const KHQR_MAX_CITY_LEN: usize = 15;

    /// Bookings looked at per installment reminder sweep
    pub const REMINDER_BATCH_SIZE: i64 = 500;
}
