//! Pricing calculator
//!
//! Turns an inventory unit, a date range and a party size into a
//! `PriceBreakdown`:
//! - base rate = unit price less the unit's seasonal percentage
//! - subtotal = base rate × billable units
//! - promo and student discounts are exclusive; the larger wins, ties go to the promo
//! - tax on the discounted subtotal
//!
//! Every derived field is rounded once, from unrounded inputs.

use derlg_core::config::PricingConfig;
use derlg_core::models::{
    round_money, DateRange, DiscountSource, InventoryUnit, PriceBreakdown, PromoValidation,
};
use rust_decimal::Decimal;
use tracing::debug;

/// Pricing calculator
#[derive(Debug, Clone)]
pub struct PricingCalculator {
    tax_rate_percent: Decimal,
    student_discount_percent: Decimal,
}

impl PricingCalculator {
    pub fn new(config: &PricingConfig) -> Self {
        Self {
            tax_rate_percent: config.tax_rate_percent,
            student_discount_percent: config.student_discount_percent,
        }
    }

    /// Price a stay or seat purchase
    ///
    /// `promo` is ignored unless it is valid. `student_eligible` should come
    /// from the requester's profile; the use counter is not touched here.
    pub fn price(
        &self,
        unit: &InventoryUnit,
        range: &DateRange,
        guests: i32,
        promo: Option<&PromoValidation>,
        student_eligible: bool,
    ) -> PriceBreakdown {
        let units = unit.billable_units(range, guests);
        let base_rate = round_money(
            unit.base_price * (Decimal::ONE_HUNDRED - unit.seasonal_discount_percent) / Decimal::ONE_HUNDRED,
        )
        .max(Decimal::ZERO);
        let subtotal = base_rate * Decimal::from(units);
        let seasonal = (unit.base_price * Decimal::from(units) - subtotal).max(Decimal::ZERO);

        let promo_amount = promo
            .filter(|p| p.valid)
            .map(|p| p.discount_on(subtotal))
            .unwrap_or(Decimal::ZERO);

        let student_amount = if student_eligible {
            round_money(subtotal * self.student_discount_percent / Decimal::ONE_HUNDRED)
        } else {
            Decimal::ZERO
        };

        let (winner, source, promo_code) =
            if promo_amount > Decimal::ZERO && promo_amount >= student_amount {
                (
                    promo_amount,
                    DiscountSource::Promo,
                    promo.map(|p| p.code.clone()),
                )
            } else if student_amount > Decimal::ZERO {
                (student_amount, DiscountSource::Student, None)
            } else {
                (Decimal::ZERO, DiscountSource::None, None)
            };

        // Clamp so the total never goes negative
        let discount_amount = winner.min(subtotal);
        let tax = round_money((subtotal - discount_amount) * self.tax_rate_percent / Decimal::ONE_HUNDRED);
        let total = subtotal - discount_amount + tax;

        debug!(
            unit_id = %unit.id,
            units,
            %subtotal,
            %discount_amount,
            discount_source = %source,
            %total,
            "Priced booking"
        );

        PriceBreakdown {
            base_rate,
            nights_or_units: units,
            subtotal,
            discount_amount,
            discount_source: source,
            seasonal_discount: seasonal,
            promo_code,
            tax_rate: self.tax_rate_percent,
            tax,
            total,
            currency: unit.currency,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use derlg_core::models::{InventoryKind, PricingMode};
    use rust_decimal_macros::dec;

    fn calculator() -> PricingCalculator {
        PricingCalculator::new(&PricingConfig::default())
    }

    fn room(price: Decimal) -> InventoryUnit {
        InventoryUnit {
            base_price: price,
            capacity: 5,
            ..Default::default()
        }
    }

    fn nights(n: i64) -> DateRange {
        let check_in = NaiveDate::from_ymd_opt(2030, 3, 1).unwrap();
        DateRange::new(check_in, check_in + chrono::Duration::days(n))
    }

    fn percent_promo(code: &str, pct: Decimal) -> PromoValidation {
        PromoValidation {
            valid: true,
            code: code.to_string(),
            discount_percentage: Some(pct),
            discount_amount: None,
            max_discount: None,
            expires_at: None,
            reason: None,
        }
    }

    #[test]
    fn test_room_without_discounts() {
        let breakdown = calculator().price(&room(dec!(100.00)), &nights(3), 2, None, false);

        assert_eq!(breakdown.nights_or_units, 3);
        assert_eq!(breakdown.subtotal, dec!(300.00));
        assert_eq!(breakdown.discount_amount, dec!(0));
        assert_eq!(breakdown.discount_source, DiscountSource::None);
        assert_eq!(breakdown.tax, dec!(30.00));
        assert_eq!(breakdown.total, dec!(330.00));
        assert!(breakdown.is_consistent());
    }

    #[test]
    fn test_student_discount() {
        let breakdown = calculator().price(&room(dec!(100.00)), &nights(3), 1, None, true);

        assert_eq!(breakdown.discount_source, DiscountSource::Student);
        assert_eq!(breakdown.discount_amount, dec!(30.00));
        assert_eq!(breakdown.tax, dec!(27.00));
        assert_eq!(breakdown.total, dec!(297.00));
        assert!(breakdown.is_consistent());
    }

    #[test]
    fn test_larger_promo_beats_student() {
        let promo = percent_promo("SUMMER20", dec!(20));
        let breakdown = calculator().price(&room(dec!(100.00)), &nights(3), 1, Some(&promo), true);

        assert_eq!(breakdown.discount_source, DiscountSource::Promo);
        assert_eq!(breakdown.discount_amount, dec!(60.00));
        assert_eq!(breakdown.promo_code.as_deref(), Some("SUMMER20"));
    }

    #[test]
    fn test_smaller_promo_loses_to_student() {
        let promo = percent_promo("TINY5", dec!(5));
        let breakdown = calculator().price(&room(dec!(100.00)), &nights(3), 1, Some(&promo), true);

        assert_eq!(breakdown.discount_source, DiscountSource::Student);
        assert_eq!(breakdown.discount_amount, dec!(30.00));
        assert_eq!(breakdown.promo_code, None);
    }

    #[test]
    fn test_tie_goes_to_promo() {
        let promo = percent_promo("EVEN10", dec!(10));
        let breakdown = calculator().price(&room(dec!(100.00)), &nights(3), 1, Some(&promo), true);

        assert_eq!(breakdown.discount_source, DiscountSource::Promo);
        assert_eq!(breakdown.discount_amount, dec!(30.00));
    }

    #[test]
    fn test_invalid_promo_is_ignored() {
        let promo = PromoValidation::rejected("EXPIRED", "Promo code is outside its validity window");
        let breakdown = calculator().price(&room(dec!(100.00)), &nights(2), 1, Some(&promo), false);

        assert_eq!(breakdown.discount_source, DiscountSource::None);
        assert_eq!(breakdown.total, dec!(220.00));
    }

    #[test]
    fn test_seasonal_lowers_base_rate_before_promo() {
        let unit = InventoryUnit {
            seasonal_discount_percent: dec!(10),
            ..room(dec!(100.00))
        };
        let promo = percent_promo("SUMMER20", dec!(20));
        let breakdown = calculator().price(&unit, &nights(2), 1, Some(&promo), false);

        assert_eq!(breakdown.base_rate, dec!(90.00));
        assert_eq!(breakdown.subtotal, dec!(180.00));
        assert_eq!(breakdown.seasonal_discount, dec!(20.00));
        assert_eq!(breakdown.discount_source, DiscountSource::Promo);
        assert_eq!(breakdown.discount_amount, dec!(36.00));
        assert_eq!(breakdown.tax, dec!(14.40));
        assert_eq!(breakdown.total, dec!(158.40));
        assert!(breakdown.is_consistent());
    }

    #[test]
    fn test_seasonal_alone_reports_no_discount_source() {
        let unit = InventoryUnit {
            seasonal_discount_percent: dec!(15),
            ..room(dec!(100.00))
        };
        let breakdown = calculator().price(&unit, &nights(1), 1, None, false);

        assert_eq!(breakdown.discount_source, DiscountSource::None);
        assert_eq!(breakdown.discount_amount, dec!(0));
        assert_eq!(breakdown.subtotal, dec!(85.00));
        assert_eq!(breakdown.total, dec!(93.50));
    }

    #[test]
    fn test_fixed_promo_larger_than_subtotal_is_clamped() {
        let promo = PromoValidation {
            valid: true,
            code: "HUGE".to_string(),
            discount_percentage: None,
            discount_amount: Some(dec!(500.00)),
            max_discount: None,
            expires_at: None,
            reason: None,
        };
        let breakdown = calculator().price(&room(dec!(100.00)), &nights(1), 1, Some(&promo), false);

        assert_eq!(breakdown.discount_amount, dec!(100.00));
        assert_eq!(breakdown.total, dec!(0));
        assert!(breakdown.is_consistent());
    }

    #[test]
    fn test_per_person_tour() {
        let tour = InventoryUnit {
            kind: InventoryKind::Tour,
            pricing_mode: PricingMode::PerPerson,
            base_price: dec!(33.33),
            capacity: 20,
            max_occupancy: 10,
            ..Default::default()
        };
        let range = DateRange::single_day(NaiveDate::from_ymd_opt(2030, 3, 1).unwrap());
        let breakdown = calculator().price(&tour, &range, 3, None, false);

        assert_eq!(breakdown.nights_or_units, 3);
        assert_eq!(breakdown.subtotal, dec!(99.99));
        assert_eq!(breakdown.tax, dec!(10.00));
        assert_eq!(breakdown.total, dec!(109.99));
        assert!(breakdown.is_consistent());
    }

    #[test]
    fn test_breakdown_is_always_consistent() {
        let calc = calculator();
        let promo = percent_promo("ODD", dec!(17.5));
        for price in [dec!(0.01), dec!(19.99), dec!(73.37), dec!(1234.56)] {
            for n in 1..=7 {
                for student in [false, true] {
                    let b = calc.price(&room(price), &nights(n), 1, Some(&promo), student);
                    assert!(b.is_consistent(), "inconsistent breakdown: {:?}", b);
                }
            }
        }
    }
}
