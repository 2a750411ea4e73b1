//! Price breakdown and payment option models

use chrono::NaiveDate;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::inventory::Currency;

/// Round a monetary amount to cents, half-up
#[inline]
pub fn round_money(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

/// Which discount won
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum DiscountSource {
    Promo,
    Student,
    #[default]
    None,
}

impl fmt::Display for DiscountSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DiscountSource::Promo => write!(f, "promo"),
            DiscountSource::Student => write!(f, "student"),
            DiscountSource::None => write!(f, "none"),
        }
    }
}

impl DiscountSource {
    /// Parse from string
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "promo" => Some(DiscountSource::Promo),
            "student" => Some(DiscountSource::Student),
            "none" => Some(DiscountSource::None),
            _ => None,
        }
    }
}

/// Computed price of a booking
///
/// `total == subtotal - discount_amount + tax`, every field at two decimals.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceBreakdown {
    pub base_rate: Decimal,
    pub nights_or_units: i64,
    pub subtotal: Decimal,

    /// The promo or student discount, whichever won
    pub discount_amount: Decimal,
    pub discount_source: DiscountSource,
    /// Already taken off `base_rate`; informational
    pub seasonal_discount: Decimal,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub promo_code: Option<String>,

    pub tax_rate: Decimal,
    pub tax: Decimal,
    pub total: Decimal,
    pub currency: Currency,
}

impl PriceBreakdown {
    /// Check the arithmetic invariant
    pub fn is_consistent(&self) -> bool {
        self.total == self.subtotal - self.discount_amount + self.tax
            && self.total >= Decimal::ZERO
            && self.discount_amount >= Decimal::ZERO
            && self.tax >= Decimal::ZERO
    }
}

impl Default for PriceBreakdown {
    fn default() -> Self {
        Self {
            base_rate: Decimal::ZERO,
            nights_or_units: 0,
            subtotal: Decimal::ZERO,
            discount_amount: Decimal::ZERO,
            discount_source: DiscountSource::None,
            seasonal_discount: Decimal::ZERO,
            promo_code: None,
            tax_rate: Decimal::ZERO,
            tax: Decimal::ZERO,
            total: Decimal::ZERO,
            currency: Currency::Usd,
        }
    }
}

/// One scheduled payment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Installment {
    pub installment: u8,
    pub percentage: Decimal,
    pub amount: Decimal,
    pub due_date: NaiveDate,
    /// Human-readable offset, e.g. "at booking"
    pub due_offset: String,
}

/// Upfront deposit with the balance due at check-in
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DepositOption {
    pub percentage: Decimal,
    pub deposit_amount: Decimal,
    pub remaining_balance: Decimal,
    pub schedule: Vec<Installment>,
}

/// Fixed three-part schedule
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MilestoneOption {
    pub schedule: Vec<Installment>,
}

impl MilestoneOption {
    pub fn total(&self) -> Decimal {
        self.schedule.iter().map(|i| i.amount).sum()
    }

    /// Amount due at booking
    pub fn first_installment(&self) -> Decimal {
        self.schedule
            .first()
            .map(|i| i.amount)
            .unwrap_or(Decimal::ZERO)
    }
}

/// Pay everything now for a discount
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FullPaymentOption {
    pub discount_percentage: Decimal,
    pub discount_amount: Decimal,
    pub final_total: Decimal,
    pub bonus_services: Vec<String>,
}

/// All three structures, returned together in a quote
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentOptions {
    pub deposit: DepositOption,
    pub milestone: MilestoneOption,
    pub full: FullPaymentOption,
}

/// Where an installment stands against what has been paid so far
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstallmentStatus {
    Paid,
    Due,
    Upcoming,
}

impl fmt::Display for InstallmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InstallmentStatus::Paid => write!(f, "paid"),
            InstallmentStatus::Due => write!(f, "due"),
            InstallmentStatus::Upcoming => write!(f, "upcoming"),
        }
    }
}

/// An installment of a booking's chosen structure, with its payment progress
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduledInstallment {
    #[serde(flatten)]
    pub installment: Installment,
    pub status: InstallmentStatus,
    /// Zero once paid; less than `amount` when partly covered
    pub amount_outstanding: Decimal,
}

/// Payment schedule of a booking
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentSchedule {
    pub total_payable: Decimal,
    pub amount_paid: Decimal,
    pub balance_due: Decimal,
    pub installments: Vec<ScheduledInstallment>,
}

impl PaymentSchedule {
    /// First installment with money outstanding
    pub fn next_unpaid(&self) -> Option<&ScheduledInstallment> {
        self.installments
            .iter()
            .find(|i| i.status != InstallmentStatus::Paid)
    }

    pub fn is_settled(&self) -> bool {
        self.balance_due <= Decimal::ZERO
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_round_money_half_up() {
        assert_eq!(round_money(dec!(1.005)), dec!(1.01));
        assert_eq!(round_money(dec!(1.004)), dec!(1.00));
        assert_eq!(round_money(dec!(2.675)), dec!(2.68));
        assert_eq!(round_money(dec!(10)), dec!(10));
    }

    #[test]
    fn test_next_unpaid_skips_paid_installments() {
        let at = |n: u8, amount: Decimal, status: InstallmentStatus, outstanding: Decimal| {
            ScheduledInstallment {
                installment: Installment {
                    installment: n,
                    percentage: dec!(50),
                    amount,
                    due_date: NaiveDate::from_ymd_opt(2030, 6, n as u32).unwrap(),
                    due_offset: "at booking".to_string(),
                },
                status,
                amount_outstanding: outstanding,
            }
        };
        let schedule = PaymentSchedule {
            total_payable: dec!(200),
            amount_paid: dec!(100),
            balance_due: dec!(100),
            installments: vec![
                at(1, dec!(100), InstallmentStatus::Paid, dec!(0)),
                at(2, dec!(100), InstallmentStatus::Upcoming, dec!(100)),
            ],
        };

        assert_eq!(schedule.next_unpaid().map(|i| i.installment.installment), Some(2));
        assert!(!schedule.is_settled());

        let json = serde_json::to_value(&schedule.installments[1]).unwrap();
        assert_eq!(json["installment"], 2);
        assert_eq!(json["status"], "upcoming");
    }

    #[test]
    fn test_breakdown_consistency() {
        let breakdown = PriceBreakdown {
            subtotal: dec!(300.00),
            discount_amount: dec!(30.00),
            tax: dec!(27.00),
            total: dec!(297.00),
            ..Default::default()
        };
        assert!(breakdown.is_consistent());

        let broken = PriceBreakdown {
            total: dec!(296.99),
            ..breakdown
        };
        assert!(!broken.is_consistent());
    }
}
