//! Availability resolver
//!
//! Read-only. Capacity is read from the store on every call; the hold itself
//! is taken by `BookingRepository::insert_with_hold` at creation time.

use chrono::NaiveDate;
use derlg_core::models::{DateRange, InventoryKind, InventoryUnit};
use derlg_core::traits::{BookingRepository, InventoryRepository};
use derlg_core::{AppError, AppResult};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, instrument};
use uuid::Uuid;

/// Result of an availability check
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AvailabilityResult {
    pub is_available: bool,
    pub remaining_count: i32,
    pub capacity: i32,
    pub guests_allowed: bool,
}

/// Build the stored range for a unit kind
///
/// Rooms need a check-out date; tours and events occupy a single day.
pub fn resolve_range(
    kind: InventoryKind,
    check_in: NaiveDate,
    check_out: Option<NaiveDate>,
) -> AppResult<DateRange> {
    match (kind.uses_date_range(), check_out) {
        (true, Some(check_out)) => Ok(DateRange::new(check_in, check_out)),
        (true, None) => Err(AppError::MissingParameters(
            "check_out is required for rooms".to_string(),
        )),
        (false, _) => Ok(DateRange::single_day(check_in)),
    }
}

/// Evaluate capacity for a party against the current occupancy
pub fn evaluate(unit: &InventoryUnit, used: i32, guests: i32) -> AvailabilityResult {
    let remaining_count = (unit.capacity - used).max(0);
    let guests_allowed = guests >= 1 && unit.accepts_guests(guests);

    AvailabilityResult {
        is_available: unit.active
            && guests_allowed
            && remaining_count >= unit.occupancy_needed(guests),
        remaining_count,
        capacity: unit.capacity,
        guests_allowed,
    }
}

/// Availability resolver
pub struct AvailabilityResolver {
    inventory: Arc<dyn InventoryRepository>,
    bookings: Arc<dyn BookingRepository>,
}

impl AvailabilityResolver {
    pub fn new(
        inventory: Arc<dyn InventoryRepository>,
        bookings: Arc<dyn BookingRepository>,
    ) -> Self {
        Self {
            inventory,
            bookings,
        }
    }

    /// Load an inventory unit or fail with `InventoryNotFound`
    pub async fn load_unit(&self, unit_id: Uuid) -> AppResult<InventoryUnit> {
        self.inventory
            .find_by_id(unit_id)
            .await?
            .ok_or_else(|| AppError::InventoryNotFound(unit_id.to_string()))
    }

    /// Capacity left on a loaded unit for a range and party size
    pub async fn evaluate_unit(
        &self,
        unit: &InventoryUnit,
        range: &DateRange,
        guests: i32,
    ) -> AppResult<AvailabilityResult> {
        let used = self.bookings.occupancy(unit, range, None).await?;
        Ok(evaluate(unit, used, guests))
    }

    /// Check a unit for the requested dates and party size
    ///
    /// Returns the unit and the stored range alongside the result so callers
    /// can price without reloading.
    ///
    /// # Errors
    ///
    /// `InvalidDate` for inverted, empty or past ranges (checked before any
    /// lookup), `MissingParameters` when a room has no check-out,
    /// `InventoryNotFound` for unknown units
    #[instrument(skip(self))]
    pub async fn check_availability(
        &self,
        unit_id: Uuid,
        check_in: NaiveDate,
        check_out: Option<NaiveDate>,
        guests: i32,
        today: NaiveDate,
    ) -> AppResult<(InventoryUnit, DateRange, AvailabilityResult)> {
        match check_out {
            Some(check_out) => DateRange::new(check_in, check_out).validate(today)?,
            None => DateRange::single_day(check_in).validate(today)?,
        }

        let unit = self.load_unit(unit_id).await?;
        let range = resolve_range(unit.kind, check_in, check_out)?;
        let result = self.evaluate_unit(&unit, &range, guests).await?;

        debug!(
            "Unit {} has {}/{} left for {} guests (available: {})",
            unit_id, result.remaining_count, unit.capacity, guests, result.is_available
        );

        Ok((unit, range, result))
    }
}
