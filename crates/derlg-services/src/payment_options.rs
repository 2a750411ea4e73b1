//! Payment option composer
//!
//! Builds the deposit, milestone and full-payment structures for a quoted
//! total. All three are returned together; choosing one happens later, when
//! the booking is created.

use chrono::{Days, NaiveDate};
use derlg_core::config::PaymentOptionsConfig;
use derlg_core::models::{
    round_money, DepositOption, FullPaymentOption, Installment, InstallmentStatus,
    MilestoneOption, PaymentOptions, PaymentSchedule, PaymentType, ScheduledInstallment,
};
use derlg_core::{AppError, AppResult};
use rust_decimal::Decimal;

/// Milestone split in percent: at booking, before check-in, at check-in
const MILESTONE_SPLIT: [i64; 3] = [50, 25, 25];

fn milestone_pct(index: usize) -> Decimal {
    Decimal::from(MILESTONE_SPLIT[index])
}

/// Payment option composer
#[derive(Debug, Clone)]
pub struct PaymentOptionComposer {
    config: PaymentOptionsConfig,
}

impl PaymentOptionComposer {
    pub fn new(config: PaymentOptionsConfig) -> Self {
        Self { config }
    }

    /// Resolve the requested deposit percentage, defaulting when absent
    ///
    /// # Errors
    ///
    /// `InvalidDepositPercentage` outside the configured inclusive bounds
    pub fn deposit_percentage(&self, requested: Option<Decimal>) -> AppResult<Decimal> {
        let pct = requested.unwrap_or(self.config.default_deposit_percent);

        if pct < self.config.min_deposit_percent || pct > self.config.max_deposit_percent {
            return Err(AppError::InvalidDepositPercentage {
                value: pct.normalize().to_string(),
                min: self.config.min_deposit_percent.normalize().to_string(),
                max: self.config.max_deposit_percent.normalize().to_string(),
            });
        }

        Ok(pct)
    }

    /// Compose all three payment structures for `total`
    pub fn compose(
        &self,
        total: Decimal,
        check_in: NaiveDate,
        deposit_percentage: Option<Decimal>,
        today: NaiveDate,
    ) -> AppResult<PaymentOptions> {
        let pct = self.deposit_percentage(deposit_percentage)?;

        Ok(PaymentOptions {
            deposit: self.deposit(total, pct, check_in, today),
            milestone: self.milestone(total, check_in, today),
            full: self.full(total),
        })
    }

    fn deposit(&self, total: Decimal, pct: Decimal, check_in: NaiveDate, today: NaiveDate) -> DepositOption {
        let deposit_amount = round_money(total * pct / Decimal::ONE_HUNDRED);
        let remaining_balance = total - deposit_amount;

        DepositOption {
            percentage: pct,
            deposit_amount,
            remaining_balance,
            schedule: vec![
                Installment {
                    installment: 1,
                    percentage: pct,
                    amount: deposit_amount,
                    due_date: today,
                    due_offset: "at booking".to_string(),
                },
                Installment {
                    installment: 2,
                    percentage: Decimal::ONE_HUNDRED - pct,
                    amount: remaining_balance,
                    due_date: check_in,
                    due_offset: "at check-in".to_string(),
                },
            ],
        }
    }

    fn milestone(&self, total: Decimal, check_in: NaiveDate, today: NaiveDate) -> MilestoneOption {
        let offset_days = self.config.milestone_second_due_days_before_checkin;
        let second_due = check_in
            .checked_sub_days(Days::new(offset_days.max(0) as u64))
            .unwrap_or(check_in)
            .max(today);

        let first = round_money(total * milestone_pct(0) / Decimal::ONE_HUNDRED);
        let second = round_money(total * milestone_pct(1) / Decimal::ONE_HUNDRED);
        // Last installment absorbs the rounding remainder
        let third = total - first - second;

        MilestoneOption {
            schedule: vec![
                Installment {
                    installment: 1,
                    percentage: milestone_pct(0),
                    amount: first,
                    due_date: today,
                    due_offset: "at booking".to_string(),
                },
                Installment {
                    installment: 2,
                    percentage: milestone_pct(1),
                    amount: second,
                    due_date: second_due,
                    due_offset: format!("{} days before check-in", offset_days),
                },
                Installment {
                    installment: 3,
                    percentage: milestone_pct(2),
                    amount: third,
                    due_date: check_in,
                    due_offset: "at check-in".to_string(),
                },
            ],
        }
    }

    fn full(&self, total: Decimal) -> FullPaymentOption {
        let discount_amount =
            round_money(total * self.config.full_payment_discount_percent / Decimal::ONE_HUNDRED);

        FullPaymentOption {
            discount_percentage: self.config.full_payment_discount_percent,
            discount_amount,
            final_total: total - discount_amount,
            bonus_services: self.config.full_payment_bonus_services.clone(),
        }
    }

    /// Amount charged by the first payment attempt for the chosen structure
    pub fn amount_due(&self, payment_type: PaymentType, total: Decimal, deposit_percentage: Decimal) -> Decimal {
        match payment_type {
            PaymentType::Deposit => round_money(total * deposit_percentage / Decimal::ONE_HUNDRED),
            PaymentType::Milestone => round_money(total * milestone_pct(0) / Decimal::ONE_HUNDRED),
            PaymentType::Full => self.full(total).final_total,
        }
    }

    /// What the guest owes overall; full payment carries its discount
    pub fn total_payable(&self, payment_type: PaymentType, total: Decimal) -> Decimal {
        match payment_type {
            PaymentType::Full => self.full(total).final_total,
            PaymentType::Deposit | PaymentType::Milestone => total,
        }
    }

    /// Installments of the chosen structure, marked against `amount_paid`
    ///
    /// Due dates are laid out from `booked_on`, the day of the first
    /// installment. Payments are applied to installments in order.
    #[allow(clippy::too_many_arguments)]
    pub fn schedule(
        &self,
        payment_type: PaymentType,
        total: Decimal,
        deposit_percentage: Decimal,
        check_in: NaiveDate,
        booked_on: NaiveDate,
        amount_paid: Decimal,
        today: NaiveDate,
    ) -> PaymentSchedule {
        let plan = match payment_type {
            PaymentType::Deposit => self.deposit(total, deposit_percentage, check_in, booked_on).schedule,
            PaymentType::Milestone => self.milestone(total, check_in, booked_on).schedule,
            PaymentType::Full => vec![Installment {
                installment: 1,
                percentage: Decimal::ONE_HUNDRED,
                amount: self.full(total).final_total,
                due_date: booked_on,
                due_offset: "at booking".to_string(),
            }],
        };

        let mut covered = amount_paid.max(Decimal::ZERO);
        let installments = plan
            .into_iter()
            .map(|installment| {
                let applied = covered.min(installment.amount);
                covered -= applied;
                let amount_outstanding = installment.amount - applied;
                let status = if amount_outstanding <= Decimal::ZERO {
                    InstallmentStatus::Paid
                } else if installment.due_date <= today {
                    InstallmentStatus::Due
                } else {
                    InstallmentStatus::Upcoming
                };
                ScheduledInstallment {
                    installment,
                    status,
                    amount_outstanding,
                }
            })
            .collect();

        let total_payable = self.total_payable(payment_type, total);
        PaymentSchedule {
            total_payable,
            amount_paid,
            balance_due: (total_payable - amount_paid).max(Decimal::ZERO),
            installments,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn composer() -> PaymentOptionComposer {
        PaymentOptionComposer::new(PaymentOptionsConfig::default())
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_deposit_sixty_percent() {
        let options = composer()
            .compose(dec!(1000), date(2030, 6, 20), Some(dec!(60)), date(2030, 6, 1))
            .unwrap();

        assert_eq!(options.deposit.deposit_amount, dec!(600));
        assert_eq!(options.deposit.remaining_balance, dec!(400));
        assert_eq!(options.deposit.schedule.len(), 2);
        assert_eq!(options.deposit.schedule[1].due_date, date(2030, 6, 20));
    }

    #[test]
    fn test_default_deposit_is_sixty() {
        let options = composer()
            .compose(dec!(250.00), date(2030, 6, 20), None, date(2030, 6, 1))
            .unwrap();
        assert_eq!(options.deposit.percentage, dec!(60));
        assert_eq!(options.deposit.deposit_amount, dec!(150.00));
    }

    #[test]
    fn test_deposit_bounds_are_inclusive() {
        let c = composer();
        assert!(c.deposit_percentage(Some(dec!(50))).is_ok());
        assert!(c.deposit_percentage(Some(dec!(70))).is_ok());

        let err = c.deposit_percentage(Some(dec!(49.9))).unwrap_err();
        assert_eq!(err.error_code(), "INVALID_DEPOSIT_PERCENTAGE");
        assert!(c.deposit_percentage(Some(dec!(71))).is_err());
    }

    #[test]
    fn test_milestone_split() {
        let options = composer()
            .compose(dec!(1000), date(2030, 6, 20), None, date(2030, 6, 1))
            .unwrap();

        let amounts: Vec<Decimal> = options.milestone.schedule.iter().map(|i| i.amount).collect();
        assert_eq!(amounts, vec![dec!(500), dec!(250), dec!(250)]);
        assert_eq!(options.milestone.schedule[1].due_date, date(2030, 6, 13));
        assert_eq!(options.milestone.schedule[2].due_date, date(2030, 6, 20));
    }

    #[test]
    fn test_milestone_sums_exactly_with_remainder() {
        let c = composer();
        for total in [dec!(0.01), dec!(0.03), dec!(99.99), dec!(333.33), dec!(1000.01)] {
            let options = c
                .compose(total, date(2030, 6, 20), None, date(2030, 6, 1))
                .unwrap();
            assert_eq!(options.milestone.total(), total);
        }
    }

    #[test]
    fn test_milestone_second_due_not_before_today() {
        let options = composer()
            .compose(dec!(100), date(2030, 6, 4), None, date(2030, 6, 1))
            .unwrap();
        assert_eq!(options.milestone.schedule[1].due_date, date(2030, 6, 1));
    }

    #[test]
    fn test_full_payment_discount() {
        let options = composer()
            .compose(dec!(1000), date(2030, 6, 20), None, date(2030, 6, 1))
            .unwrap();

        assert_eq!(options.full.discount_amount, dec!(50));
        assert_eq!(options.full.final_total, dec!(950));
        assert!(!options.full.bonus_services.is_empty());
    }

    #[test]
    fn test_milestone_schedule_after_first_payment() {
        let schedule = composer().schedule(
            PaymentType::Milestone,
            dec!(1000),
            dec!(60),
            date(2030, 6, 20),
            date(2030, 6, 1),
            dec!(500),
            date(2030, 6, 13),
        );

        let statuses: Vec<InstallmentStatus> = schedule.installments.iter().map(|i| i.status).collect();
        assert_eq!(
            statuses,
            vec![InstallmentStatus::Paid, InstallmentStatus::Due, InstallmentStatus::Upcoming]
        );
        assert_eq!(schedule.installments[1].installment.due_date, date(2030, 6, 13));
        assert_eq!(schedule.balance_due, dec!(500));

        let next = schedule.next_unpaid().unwrap();
        assert_eq!(next.installment.installment, 2);
        assert_eq!(next.amount_outstanding, dec!(250));
    }

    #[test]
    fn test_deposit_schedule_settles_with_balance() {
        let c = composer();
        let partial = c.schedule(
            PaymentType::Deposit,
            dec!(220.00),
            dec!(60),
            date(2030, 6, 20),
            date(2030, 6, 1),
            dec!(132.00),
            date(2030, 6, 2),
        );
        assert_eq!(partial.next_unpaid().unwrap().amount_outstanding, dec!(88.00));
        assert_eq!(partial.installments[1].status, InstallmentStatus::Upcoming);

        let settled = c.schedule(
            PaymentType::Deposit,
            dec!(220.00),
            dec!(60),
            date(2030, 6, 20),
            date(2030, 6, 1),
            dec!(220.00),
            date(2030, 6, 2),
        );
        assert!(settled.is_settled());
        assert!(settled.next_unpaid().is_none());
    }

    #[test]
    fn test_full_schedule_uses_discounted_total() {
        let c = composer();
        assert_eq!(c.total_payable(PaymentType::Full, dec!(1000)), dec!(950));
        assert_eq!(c.total_payable(PaymentType::Deposit, dec!(1000)), dec!(1000));

        let schedule = c.schedule(
            PaymentType::Full,
            dec!(1000),
            dec!(60),
            date(2030, 6, 20),
            date(2030, 6, 1),
            Decimal::ZERO,
            date(2030, 6, 1),
        );
        assert_eq!(schedule.installments.len(), 1);
        assert_eq!(schedule.installments[0].status, InstallmentStatus::Due);
        assert_eq!(schedule.balance_due, dec!(950));
    }

    #[test]
    fn test_amount_due() {
        let c = composer();
        assert_eq!(c.amount_due(PaymentType::Deposit, dec!(1000), dec!(60)), dec!(600));
        assert_eq!(c.amount_due(PaymentType::Milestone, dec!(1000), dec!(60)), dec!(500));
        assert_eq!(c.amount_due(PaymentType::Full, dec!(1000), dec!(60)), dec!(950));
    }
}
