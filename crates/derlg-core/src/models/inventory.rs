//! Inventory unit model
//!
//! A bookable entity owned by the hotel/tour/event catalog. Read-only to the engine.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use super::booking::DateRange;

/// Kind of bookable entity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum InventoryKind {
    /// Hotel room type, booked per night
    #[default]
    Room,
    /// Tour departure, booked per date
    Tour,
    /// Event ticket class, booked per date
    Event,
}

impl fmt::Display for InventoryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InventoryKind::Room => write!(f, "room"),
            InventoryKind::Tour => write!(f, "tour"),
            InventoryKind::Event => write!(f, "event"),
        }
    }
}

impl InventoryKind {
    /// Parse from string
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "room" => Some(InventoryKind::Room),
            "tour" => Some(InventoryKind::Tour),
            "event" => Some(InventoryKind::Event),
            _ => None,
        }
    }

    /// Tours and events sell seats; rooms sell whole units
    pub fn is_seat_based(&self) -> bool {
        matches!(self, InventoryKind::Tour | InventoryKind::Event)
    }

    /// Whether a check-out date is required
    pub fn uses_date_range(&self) -> bool {
        matches!(self, InventoryKind::Room)
    }
}

/// How the base price scales with guests
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PricingMode {
    #[default]
    PerUnit,
    PerPerson,
}

impl fmt::Display for PricingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PricingMode::PerUnit => write!(f, "per_unit"),
            PricingMode::PerPerson => write!(f, "per_person"),
        }
    }
}

impl PricingMode {
    /// Parse from string
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "per_unit" => Some(PricingMode::PerUnit),
            "per_person" => Some(PricingMode::PerPerson),
            _ => None,
        }
    }
}

/// Settlement currency
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum Currency {
    #[default]
    Usd,
    Khr,
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Currency::Usd => write!(f, "USD"),
            Currency::Khr => write!(f, "KHR"),
        }
    }
}

impl Currency {
    /// Parse from string (case-insensitive)
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_uppercase().as_str() {
            "USD" => Some(Currency::Usd),
            "KHR" => Some(Currency::Khr),
            _ => None,
        }
    }

    /// ISO 4217 numeric code
    pub fn numeric_code(&self) -> &'static str {
        match self {
            Currency::Usd => "840",
            Currency::Khr => "116",
        }
    }
}

/// Inventory unit entity
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InventoryUnit {
    pub id: Uuid,
    pub kind: InventoryKind,
    pub name: String,

    /// Absolute units (rooms) or seats (tours/events)
    pub capacity: i32,

    pub base_price: Decimal,
    pub currency: Currency,
    pub pricing_mode: PricingMode,

    /// Guests allowed per booking
    pub min_occupancy: i32,
    pub max_occupancy: i32,

    /// Seasonal reduction of the base price, in percent
    pub seasonal_discount_percent: Decimal,

    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl InventoryUnit {
    /// Whether a party of `guests` fits the unit's occupancy limits
    pub fn accepts_guests(&self, guests: i32) -> bool {
        guests >= self.min_occupancy.max(1) && guests <= self.max_occupancy
    }

    /// Capacity consumed by one booking of `guests`
    pub fn occupancy_needed(&self, guests: i32) -> i32 {
        if self.kind.is_seat_based() {
            guests
        } else {
            1
        }
    }

    /// Billable quantity: nights for rooms, times guests when priced per person
    pub fn billable_units(&self, range: &DateRange, guests: i32) -> i64 {
        let base = if self.kind.uses_date_range() {
            range.nights()
        } else {
            1
        };

        match self.pricing_mode {
            PricingMode::PerUnit => base,
            PricingMode::PerPerson => base * i64::from(guests),
        }
    }
}

impl Default for InventoryUnit {
    fn default() -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            kind: InventoryKind::Room,
            name: String::new(),
            capacity: 1,
            base_price: Decimal::ZERO,
            currency: Currency::Usd,
            pricing_mode: PricingMode::PerUnit,
            min_occupancy: 1,
            max_occupancy: 2,
            seasonal_discount_percent: Decimal::ZERO,
            active: true,
            created_at: now,
            updated_at: now,
        }
    }
}
