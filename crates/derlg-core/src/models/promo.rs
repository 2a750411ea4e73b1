//! Promo code model
//!
//! Promo codes are managed elsewhere; the engine only validates and applies them.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use super::inventory::InventoryKind;
use super::pricing::round_money;

/// How the promo value is interpreted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiscountType {
    Percentage,
    Fixed,
}

impl fmt::Display for DiscountType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DiscountType::Percentage => write!(f, "percentage"),
            DiscountType::Fixed => write!(f, "fixed"),
        }
    }
}

impl DiscountType {
    /// Parse from string
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "percentage" => Some(DiscountType::Percentage),
            "fixed" => Some(DiscountType::Fixed),
            _ => None,
        }
    }
}

/// Catalog segment a promo applies to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PromoScope {
    All,
    Hotels,
    Tours,
    Events,
}

impl fmt::Display for PromoScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PromoScope::All => write!(f, "all"),
            PromoScope::Hotels => write!(f, "hotels"),
            PromoScope::Tours => write!(f, "tours"),
            PromoScope::Events => write!(f, "events"),
        }
    }
}

impl PromoScope {
    /// Parse from string
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "all" => Some(PromoScope::All),
            "hotels" => Some(PromoScope::Hotels),
            "tours" => Some(PromoScope::Tours),
            "events" => Some(PromoScope::Events),
            _ => None,
        }
    }

    pub fn covers(&self, kind: InventoryKind) -> bool {
        matches!(
            (self, kind),
            (PromoScope::All, _)
                | (PromoScope::Hotels, InventoryKind::Room)
                | (PromoScope::Tours, InventoryKind::Tour)
                | (PromoScope::Events, InventoryKind::Event)
        )
    }
}

/// Promo code entity
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromoCode {
    pub id: Uuid,
    /// Uppercase code
    pub code: String,
    pub description: String,
    pub discount_type: DiscountType,
    pub discount_value: Decimal,
    pub min_booking_amount: Decimal,
    pub max_discount: Option<Decimal>,
    pub valid_from: DateTime<Utc>,
    pub valid_until: DateTime<Utc>,
    pub usage_limit: i32,
    pub usage_count: i32,
    pub applicable_to: PromoScope,
    pub active: bool,
}

impl PromoCode {
    /// Check the code against the booking context, returning why it fails
    pub fn check(&self, context: &PromoContext, now: DateTime<Utc>) -> Result<(), String> {
        if !self.active {
            return Err("Promo code is not active".to_string());
        }
        if now < self.valid_from || now > self.valid_until {
            return Err("Promo code is outside its validity window".to_string());
        }
        if self.usage_count >= self.usage_limit {
            return Err("Promo code usage limit reached".to_string());
        }
        if !self.applicable_to.covers(context.kind) {
            return Err(format!(
                "Promo code applies to {} only",
                self.applicable_to
            ));
        }
        if context.subtotal < self.min_booking_amount {
            return Err(format!(
                "Minimum booking amount is {}",
                self.min_booking_amount
            ));
        }
        Ok(())
    }

    /// Build the validation result for a context
    pub fn validate(&self, context: &PromoContext, now: DateTime<Utc>) -> PromoValidation {
        match self.check(context, now) {
            Ok(()) => PromoValidation {
                valid: true,
                code: self.code.clone(),
                discount_percentage: (self.discount_type == DiscountType::Percentage)
                    .then_some(self.discount_value),
                discount_amount: (self.discount_type == DiscountType::Fixed)
                    .then_some(self.discount_value),
                max_discount: self.max_discount,
                expires_at: Some(self.valid_until),
                reason: None,
            },
            Err(reason) => PromoValidation::rejected(&self.code, reason),
        }
    }
}

/// What the promo store is asked to validate against
#[derive(Debug, Clone)]
pub struct PromoContext {
    pub kind: InventoryKind,
    pub subtotal: Decimal,
    pub requester_id: Option<String>,
}

/// Result of a promo-store validation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromoValidation {
    pub valid: bool,
    pub code: String,
    pub discount_percentage: Option<Decimal>,
    pub discount_amount: Option<Decimal>,
    pub max_discount: Option<Decimal>,
    pub expires_at: Option<DateTime<Utc>>,
    pub reason: Option<String>,
}

impl PromoValidation {
    pub fn rejected(code: &str, reason: impl Into<String>) -> Self {
        Self {
            valid: false,
            code: code.to_string(),
            discount_percentage: None,
            discount_amount: None,
            max_discount: None,
            expires_at: None,
            reason: Some(reason.into()),
        }
    }

    /// Discount this promo grants on `subtotal`, capped and rounded
    pub fn discount_on(&self, subtotal: Decimal) -> Decimal {
        if !self.valid {
            return Decimal::ZERO;
        }

        let raw = match (self.discount_percentage, self.discount_amount) {
            (Some(pct), _) => subtotal * pct / Decimal::ONE_HUNDRED,
            (None, Some(amount)) => amount,
            (None, None) => Decimal::ZERO,
        };

        let capped = match self.max_discount {
            Some(max) if raw > max => max,
            _ => raw,
        };

        round_money(capped.min(subtotal).max(Decimal::ZERO))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use rust_decimal_macros::dec;

    fn promo(discount_type: DiscountType, value: Decimal) -> PromoCode {
        let now = Utc::now();
        PromoCode {
            id: Uuid::new_v4(),
            code: "WELCOME10".to_string(),
            description: String::new(),
            discount_type,
            discount_value: value,
            min_booking_amount: dec!(100.00),
            max_discount: None,
            valid_from: now - Duration::days(1),
            valid_until: now + Duration::days(30),
            usage_limit: 100,
            usage_count: 0,
            applicable_to: PromoScope::All,
            active: true,
        }
    }

    fn context(subtotal: Decimal) -> PromoContext {
        PromoContext {
            kind: InventoryKind::Room,
            subtotal,
            requester_id: None,
        }
    }

    #[test]
    fn test_percentage_promo_with_cap() {
        let mut code = promo(DiscountType::Percentage, dec!(20));
        code.max_discount = Some(dec!(50.00));

        let validation = code.validate(&context(dec!(1000.00)), Utc::now());
        assert!(validation.valid);
        assert_eq!(validation.discount_on(dec!(1000.00)), dec!(50.00));
        assert_eq!(validation.discount_on(dec!(200.00)), dec!(40.00));
    }

    #[test]
    fn test_fixed_promo_never_exceeds_subtotal() {
        let code = promo(DiscountType::Fixed, dec!(500.00));
        let validation = code.validate(&context(dec!(300.00)), Utc::now());
        assert_eq!(validation.discount_on(dec!(300.00)), dec!(300.00));
    }

    #[test]
    fn test_rejections() {
        let now = Utc::now();

        let below_min = promo(DiscountType::Fixed, dec!(10));
        assert!(!below_min.validate(&context(dec!(50.00)), now).valid);

        let mut used_up = promo(DiscountType::Fixed, dec!(10));
        used_up.usage_count = 100;
        assert!(!used_up.validate(&context(dec!(500.00)), now).valid);

        let mut tours_only = promo(DiscountType::Fixed, dec!(10));
        tours_only.applicable_to = PromoScope::Tours;
        let rejected = tours_only.validate(&context(dec!(500.00)), now);
        assert!(!rejected.valid);
        assert_eq!(rejected.discount_on(dec!(500.00)), Decimal::ZERO);

        let mut expired = promo(DiscountType::Fixed, dec!(10));
        expired.valid_until = now - Duration::hours(1);
        assert!(!expired.validate(&context(dec!(500.00)), now).valid);
    }

    #[test]
    fn test_scope_covers() {
        assert!(PromoScope::Hotels.covers(InventoryKind::Room));
        assert!(!PromoScope::Hotels.covers(InventoryKind::Event));
        assert!(PromoScope::All.covers(InventoryKind::Tour));
    }
}
