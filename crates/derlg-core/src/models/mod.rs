//! Domain models for the booking engine
//!
//! This module contains all the core domain models used throughout the application.

pub mod booking;
pub mod inventory;
pub mod payment;
pub mod pricing;
pub mod promo;
pub mod requester;

pub use booking::{
    Booking, BookingPayment, BookingStatus, CancellationRecord, DateRange, GuestDetails,
    PaymentMethod, PaymentStatus, PaymentType, PriceAction, PriceChange, RefundStatus,
};
pub use inventory::{Currency, InventoryKind, InventoryUnit, PricingMode};
pub use payment::{AttemptState, PaymentAttempt, ProviderStatus};
pub use pricing::{
    round_money, DepositOption, DiscountSource, FullPaymentOption, Installment, InstallmentStatus,
    MilestoneOption, PaymentOptions, PaymentSchedule, PriceBreakdown, ScheduledInstallment,
};
pub use promo::{DiscountType, PromoCode, PromoContext, PromoScope, PromoValidation};
pub use requester::{RequesterProfile, RequesterRole};
