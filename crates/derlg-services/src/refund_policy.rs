//! Cancellation refund policy
//!
//! Tiered on days until check-in, applied to the booking total:
//!
//! | Days until check-in | Refund |
//! |---------------------|--------|
//! | 30 or more | 95% |
//! | 7 to 29 | 50% |
//! | under 7 | 25%, or nothing for deposit bookings |
//!
//! The result is advisory. Refund execution against the gateway happens elsewhere.

use chrono::{DateTime, Utc};
use derlg_core::config::RefundConfig;
use derlg_core::models::{round_money, Booking, PaymentType, RefundStatus};
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::debug;

use crate::constants::{NO_REFUND_PROCESSING_TIME, OPERATOR_REJECTION_POLICY};

/// Refund computed for a cancellation
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RefundQuote {
    pub refund_amount: Decimal,
    pub refund_status: RefundStatus,
    pub policy_applied: String,
    pub days_until_checkin: i64,
    pub processing_time: String,
}

/// Refund policy engine
#[derive(Debug, Clone)]
pub struct RefundPolicy {
    config: RefundConfig,
}

impl RefundPolicy {
    pub fn new(config: RefundConfig) -> Self {
        Self { config }
    }

    /// Band rate and label for a lead time
    fn band(&self, days: i64, payment_type: PaymentType) -> (Decimal, &'static str) {
        if days >= self.config.full_tier_days {
            (self.config.full_tier_rate, "full_refund_minus_fee")
        } else if days >= self.config.partial_tier_days {
            (self.config.partial_tier_rate, "partial_refund_50")
        } else if payment_type == PaymentType::Deposit {
            (self.config.late_deposit_rate, "deposit_non_refundable")
        } else {
            (self.config.late_tier_rate, "late_refund_25")
        }
    }

    /// Compute the refund for cancelling `booking` at `now`
    pub fn compute_refund(&self, booking: &Booking, now: DateTime<Utc>) -> RefundQuote {
        let days = booking.date_range.days_until_check_in(now);
        let (rate, label) = self.band(days, booking.payment.payment_type);

        let (refund_amount, refund_status) = if !booking.payment.status.has_collected_funds() {
            (Decimal::ZERO, RefundStatus::NotApplicable)
        } else {
            let amount = round_money(booking.pricing.total * rate);
            if amount.is_zero() {
                (Decimal::ZERO, RefundStatus::NoRefund)
            } else {
                (amount, RefundStatus::Pending)
            }
        };

        debug!(
            booking_number = %booking.booking_number,
            days,
            policy = label,
            %refund_amount,
            "Computed cancellation refund"
        );

        RefundQuote {
            processing_time: self.processing_time(refund_amount),
            refund_amount,
            refund_status,
            policy_applied: label.to_string(),
            days_until_checkin: days,
        }
    }

    /// Refund for an operator rejection: everything collected comes back
    pub fn rejection_refund(&self, booking: &Booking, now: DateTime<Utc>) -> RefundQuote {
        let (refund_amount, refund_status) = if booking.payment.status.has_collected_funds() {
            (booking.pricing.total, RefundStatus::Pending)
        } else {
            (Decimal::ZERO, RefundStatus::NotApplicable)
        };

        RefundQuote {
            processing_time: self.processing_time(refund_amount),
            refund_amount,
            refund_status,
            policy_applied: OPERATOR_REJECTION_POLICY.to_string(),
            days_until_checkin: booking.date_range.days_until_check_in(now),
        }
    }

    fn processing_time(&self, amount: Decimal) -> String {
        if amount.is_zero() {
            NO_REFUND_PROCESSING_TIME.to_string()
        } else {
            self.config.processing_time.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, NaiveDate, TimeZone};
    use derlg_core::models::{
        DateRange, GuestDetails, PaymentMethod, PaymentStatus, PriceBreakdown,
    };
    use rust_decimal_macros::dec;
    use uuid::Uuid;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2030, 1, 1, 10, 0, 0).unwrap()
    }

    fn booking_in(days: i64, payment_type: PaymentType, status: PaymentStatus) -> Booking {
        let check_in = NaiveDate::from_ymd_opt(2030, 1, 1).unwrap() + Duration::days(days);
        let mut booking = Booking::new(
            Uuid::new_v4(),
            "user-1".to_string(),
            DateRange::new(check_in, check_in + Duration::days(2)),
            2,
            GuestDetails::default(),
            PriceBreakdown {
                total: dec!(1000),
                ..Default::default()
            },
            PaymentMethod::Card,
            payment_type,
            dec!(60),
        );
        booking.payment.status = status;
        booking
    }

    fn policy() -> RefundPolicy {
        RefundPolicy::new(RefundConfig::default())
    }

    #[test]
    fn test_thirty_days_full_tier() {
        let quote = policy().compute_refund(
            &booking_in(30, PaymentType::Full, PaymentStatus::Completed),
            now(),
        );
        assert_eq!(quote.days_until_checkin, 30);
        assert_eq!(quote.refund_amount, dec!(950));
        assert_eq!(quote.refund_status, RefundStatus::Pending);
        assert_eq!(quote.processing_time, "5-10 business days");
    }

    #[test]
    fn test_twenty_nine_days_partial_tier() {
        let quote = policy().compute_refund(
            &booking_in(29, PaymentType::Full, PaymentStatus::Completed),
            now(),
        );
        assert_eq!(quote.days_until_checkin, 29);
        assert_eq!(quote.refund_amount, dec!(500));
        assert_eq!(quote.policy_applied, "partial_refund_50");
    }

    #[test]
    fn test_six_days_deposit_is_non_refundable() {
        let quote = policy().compute_refund(
            &booking_in(6, PaymentType::Deposit, PaymentStatus::Partial),
            now(),
        );
        assert_eq!(quote.refund_amount, dec!(0));
        assert_eq!(quote.refund_status, RefundStatus::NoRefund);
        assert_eq!(quote.processing_time, "N/A");
    }

    #[test]
    fn test_six_days_full_late_tier() {
        let quote = policy().compute_refund(
            &booking_in(6, PaymentType::Full, PaymentStatus::Completed),
            now(),
        );
        assert_eq!(quote.refund_amount, dec!(250));
        assert_eq!(quote.policy_applied, "late_refund_25");
    }

    #[test]
    fn test_past_check_in_uses_late_band() {
        let quote = policy().compute_refund(
            &booking_in(-3, PaymentType::Milestone, PaymentStatus::Partial),
            now(),
        );
        assert!(quote.days_until_checkin < 0);
        assert_eq!(quote.refund_amount, dec!(250));
    }

    #[test]
    fn test_unpaid_booking_not_applicable() {
        let quote = policy().compute_refund(
            &booking_in(40, PaymentType::Full, PaymentStatus::Unpaid),
            now(),
        );
        assert_eq!(quote.refund_amount, dec!(0));
        assert_eq!(quote.refund_status, RefundStatus::NotApplicable);
    }

    #[test]
    fn test_rejection_refunds_everything_collected() {
        let p = policy();
        let paid = p.rejection_refund(
            &booking_in(3, PaymentType::Deposit, PaymentStatus::Partial),
            now(),
        );
        assert_eq!(paid.refund_amount, dec!(1000));
        assert_eq!(paid.policy_applied, "operator_rejection");

        let unpaid = p.rejection_refund(
            &booking_in(3, PaymentType::Deposit, PaymentStatus::Pending),
            now(),
        );
        assert_eq!(unpaid.refund_status, RefundStatus::NotApplicable);
    }
}
