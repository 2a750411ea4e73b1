//! Booking repository implementation
//!
//! Capacity holds lock the inventory unit row (`SELECT ... FOR UPDATE`) so that
//! the overlap count and the insert/update happen under one lock per unit.
//! Every other write is conditional on the booking's `version`.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use derlg_core::{
    models::{
        Booking, BookingPayment, BookingStatus, CancellationRecord, Currency, DateRange,
        DiscountSource, GuestDetails, InventoryUnit, PaymentMethod, PaymentStatus, PaymentType,
        PriceBreakdown, PriceChange,
    },
    traits::BookingRepository,
    AppError, AppResult,
};
use rust_decimal::Decimal;
use sqlx::{types::Json, PgExecutor, PgPool};
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

/// Column list shared by every booking SELECT / RETURNING clause
pub(crate) const BOOKING_COLUMNS: &str = r#"
    id, booking_number, inventory_unit_id, requester_id,
    check_in, check_out, guest_count, guest_details,
    base_rate, nights_or_units, subtotal, discount_amount, discount_source,
    seasonal_discount, promo_code, tax_rate, tax, total, currency,
    payment_method, payment_type, payment_status, deposit_percentage, gateway_reference,
    status, price_change, cancellation, version,
    created_at, updated_at, confirmed_at, completed_at
"#;

/// PostgreSQL implementation of BookingRepository
pub struct PgBookingRepository {
    pool: PgPool,
}

impl PgBookingRepository {
    /// Create a new booking repository
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

/// Lock the unit row for the rest of the transaction, returning its capacity
///
/// Inactive units report zero capacity.
async fn lock_unit<'e, E: PgExecutor<'e>>(executor: E, unit_id: Uuid) -> AppResult<i32> {
    let locked: Option<(i32, bool)> = sqlx::query_as(
        r#"
        SELECT capacity, active
        FROM inventory_units
        WHERE id = $1
        FOR UPDATE
        "#,
    )
    .bind(unit_id)
    .fetch_optional(executor)
    .await
    .map_err(|e| {
        error!("Failed to lock inventory unit {}: {}", unit_id, e);
        AppError::Database(format!("Failed to lock inventory unit: {}", e))
    })?;

    match locked {
        Some((capacity, true)) => Ok(capacity),
        Some((_, false)) => Ok(0),
        None => Err(AppError::InventoryNotFound(unit_id.to_string())),
    }
}

/// Occupancy of holding bookings overlapping `range` (half-open)
async fn occupancy_on<'e, E: PgExecutor<'e>>(
    executor: E,
    unit: &InventoryUnit,
    range: &DateRange,
    exclude_booking: Option<Uuid>,
) -> AppResult<i32> {
    let (used,): (i32,) = sqlx::query_as(
        r#"
        SELECT COALESCE(SUM(CASE WHEN $4 THEN guest_count ELSE 1 END), 0)::INT
        FROM bookings
        WHERE inventory_unit_id = $1
          AND status IN ('pending', 'confirmed')
          AND check_in < $3
          AND $2 < check_out
          AND ($5::UUID IS NULL OR id <> $5)
        "#,
    )
    .bind(unit.id)
    .bind(range.check_in)
    .bind(range.check_out)
    .bind(unit.kind.is_seat_based())
    .bind(exclude_booking)
    .fetch_one(executor)
    .await
    .map_err(|e| {
        error!("Database error counting occupancy for unit {}: {}", unit.id, e);
        AppError::Database(format!("Failed to count occupancy: {}", e))
    })?;

    Ok(used)
}

/// Insert a booking row
async fn insert_booking<'e, E: PgExecutor<'e>>(executor: E, b: &Booking) -> AppResult<Booking> {
    let sql = format!(
        r#"
        INSERT INTO bookings (
            id, booking_number, inventory_unit_id, requester_id,
            check_in, check_out, guest_count, guest_details,
            base_rate, nights_or_units, subtotal, discount_amount, discount_source,
            seasonal_discount, promo_code, tax_rate, tax, total, currency,
            payment_method, payment_type, payment_status, deposit_percentage, gateway_reference,
            status, price_change, cancellation, version,
            created_at, updated_at, confirmed_at, completed_at
        )
        VALUES (
            $1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16,
            $17, $18, $19, $20, $21, $22, $23, $24, $25, $26, $27, $28, $29, $30, $31, $32
        )
        RETURNING {BOOKING_COLUMNS}
        "#
    );

    let row = sqlx::query_as::<sqlx::Postgres, BookingRow>(&sql)
        .bind(b.id)
        .bind(&b.booking_number)
        .bind(b.inventory_unit_id)
        .bind(&b.requester_id)
        .bind(b.date_range.check_in)
        .bind(b.date_range.check_out)
        .bind(b.guest_count)
        .bind(Json(&b.guest_details))
        .bind(b.pricing.base_rate)
        .bind(b.pricing.nights_or_units)
        .bind(b.pricing.subtotal)
        .bind(b.pricing.discount_amount)
        .bind(b.pricing.discount_source.to_string())
        .bind(b.pricing.seasonal_discount)
        .bind(&b.pricing.promo_code)
        .bind(b.pricing.tax_rate)
        .bind(b.pricing.tax)
        .bind(b.pricing.total)
        .bind(b.pricing.currency.to_string())
        .bind(b.payment.method.to_string())
        .bind(b.payment.payment_type.to_string())
        .bind(b.payment.status.to_string())
        .bind(b.payment.deposit_percentage)
        .bind(&b.payment.gateway_reference)
        .bind(b.status.to_string())
        .bind(b.price_change.as_ref().map(Json))
        .bind(b.cancellation.as_ref().map(Json))
        .bind(b.version)
        .bind(b.created_at)
        .bind(b.updated_at)
        .bind(b.confirmed_at)
        .bind(b.completed_at)
        .fetch_one(executor)
        .await
        .map_err(|e| {
            error!("Database error creating booking {}: {}", b.booking_number, e);
            AppError::Database(format!("Failed to create booking: {}", e))
        })?;

    Ok(row.into())
}

/// Conditional full-row update; bumps `version`
///
/// Returns `ConcurrentModification` when the stored version is not `expected_version`.
pub(crate) async fn write_booking<'e, E: PgExecutor<'e>>(
    executor: E,
    b: &Booking,
    expected_version: i32,
) -> AppResult<Booking> {
    let sql = format!(
        r#"
        UPDATE bookings
        SET inventory_unit_id = $2,
            check_in = $3,
            check_out = $4,
            guest_count = $5,
            guest_details = $6,
            base_rate = $7,
            nights_or_units = $8,
            subtotal = $9,
            discount_amount = $10,
            discount_source = $11,
            seasonal_discount = $12,
            promo_code = $13,
            tax_rate = $14,
            tax = $15,
            total = $16,
            currency = $17,
            payment_method = $18,
            payment_type = $19,
            payment_status = $20,
            deposit_percentage = $21,
            gateway_reference = $22,
            status = $23,
            price_change = $24,
            cancellation = $25,
            confirmed_at = $26,
            completed_at = $27,
            version = version + 1,
            updated_at = NOW()
        WHERE id = $1 AND version = $28
        RETURNING {BOOKING_COLUMNS}
        "#
    );

    let row = sqlx::query_as::<sqlx::Postgres, BookingRow>(&sql)
        .bind(b.id)
        .bind(b.inventory_unit_id)
        .bind(b.date_range.check_in)
        .bind(b.date_range.check_out)
        .bind(b.guest_count)
        .bind(Json(&b.guest_details))
        .bind(b.pricing.base_rate)
        .bind(b.pricing.nights_or_units)
        .bind(b.pricing.subtotal)
        .bind(b.pricing.discount_amount)
        .bind(b.pricing.discount_source.to_string())
        .bind(b.pricing.seasonal_discount)
        .bind(&b.pricing.promo_code)
        .bind(b.pricing.tax_rate)
        .bind(b.pricing.tax)
        .bind(b.pricing.total)
        .bind(b.pricing.currency.to_string())
        .bind(b.payment.method.to_string())
        .bind(b.payment.payment_type.to_string())
        .bind(b.payment.status.to_string())
        .bind(b.payment.deposit_percentage)
        .bind(&b.payment.gateway_reference)
        .bind(b.status.to_string())
        .bind(b.price_change.as_ref().map(Json))
        .bind(b.cancellation.as_ref().map(Json))
        .bind(b.confirmed_at)
        .bind(b.completed_at)
        .bind(expected_version)
        .fetch_optional(executor)
        .await
        .map_err(|e| {
            error!("Database error updating booking {}: {}", b.id, e);
            AppError::Database(format!("Failed to update booking: {}", e))
        })?;

    match row {
        Some(row) => Ok(row.into()),
        None => {
            warn!(
                "Booking {} version {} is stale, write rejected",
                b.id, expected_version
            );
            Err(AppError::ConcurrentModification(b.booking_number.clone()))
        }
    }
}

#[async_trait]
impl BookingRepository for PgBookingRepository {
    #[instrument(skip(self))]
    async fn find_by_id(&self, id: Uuid) -> AppResult<Option<Booking>> {
        debug!("Finding booking by id: {}", id);

        let sql = format!("SELECT {BOOKING_COLUMNS} FROM bookings WHERE id = $1");
        let result = sqlx::query_as::<sqlx::Postgres, BookingRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| {
                error!("Database error finding booking {}: {}", id, e);
                AppError::Database(format!("Failed to find booking: {}", e))
            })?;

        Ok(result.map(Into::into))
    }

    #[instrument(skip(self))]
    async fn find_by_number(&self, booking_number: &str) -> AppResult<Option<Booking>> {
        debug!("Finding booking by number: {}", booking_number);

        let sql = format!("SELECT {BOOKING_COLUMNS} FROM bookings WHERE booking_number = $1");
        let result = sqlx::query_as::<sqlx::Postgres, BookingRow>(&sql)
            .bind(booking_number)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| {
                error!("Database error finding booking {}: {}", booking_number, e);
                AppError::Database(format!("Failed to find booking: {}", e))
            })?;

        Ok(result.map(Into::into))
    }

    #[instrument(skip(self))]
    async fn list_by_requester(
        &self,
        requester_id: &str,
        limit: i64,
        offset: i64,
    ) -> AppResult<(Vec<Booking>, i64)> {
        debug!(
            "Listing bookings for requester {} (limit {}, offset {})",
            requester_id, limit, offset
        );

        let sql = format!(
            r#"
            SELECT {BOOKING_COLUMNS}
            FROM bookings
            WHERE requester_id = $1
            ORDER BY created_at DESC
            LIMIT $2 OFFSET $3
            "#
        );
        let rows = sqlx::query_as::<sqlx::Postgres, BookingRow>(&sql)
            .bind(requester_id)
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| {
                error!("Database error listing bookings: {}", e);
                AppError::Database(format!("Failed to list bookings: {}", e))
            })?;

        let (total,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM bookings WHERE requester_id = $1")
                .bind(requester_id)
                .fetch_one(&self.pool)
                .await
                .map_err(|e| {
                    error!("Database error counting bookings: {}", e);
                    AppError::Database(format!("Failed to count bookings: {}", e))
                })?;

        Ok((rows.into_iter().map(Into::into).collect(), total))
    }

    #[instrument(skip(self))]
    async fn list_awaiting_balance(&self, limit: i64) -> AppResult<Vec<Booking>> {
        debug!("Listing bookings with an outstanding balance (limit {})", limit);

        let sql = format!(
            r#"
            SELECT {BOOKING_COLUMNS}
            FROM bookings
            WHERE status = 'confirmed' AND payment_status = 'partial'
            ORDER BY check_in ASC
            LIMIT $1
            "#
        );
        let rows = sqlx::query_as::<sqlx::Postgres, BookingRow>(&sql)
            .bind(limit)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| {
                error!("Database error listing partial bookings: {}", e);
                AppError::Database(format!("Failed to list bookings: {}", e))
            })?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    #[instrument(skip(self, unit), fields(unit_id = %unit.id))]
    async fn occupancy(
        &self,
        unit: &InventoryUnit,
        range: &DateRange,
        exclude_booking: Option<Uuid>,
    ) -> AppResult<i32> {
        debug!(
            "Counting occupancy {}..{}",
            range.check_in, range.check_out
        );
        occupancy_on(&self.pool, unit, range, exclude_booking).await
    }

    #[instrument(skip(self, booking, unit), fields(booking_number = %booking.booking_number))]
    async fn insert_with_hold(&self, booking: &Booking, unit: &InventoryUnit) -> AppResult<Booking> {
        debug!("Placing hold on unit {}", unit.id);

        let mut tx = self.pool.begin().await.map_err(|e| {
            error!("Failed to begin transaction: {}", e);
            AppError::Transaction(format!("Failed to begin transaction: {}", e))
        })?;

        let capacity = lock_unit(&mut *tx, unit.id).await?;
        let used = occupancy_on(&mut *tx, unit, &booking.date_range, None).await?;
        let needed = unit.occupancy_needed(booking.guest_count);

        if capacity - used < needed {
            warn!(
                "Unit {} full for {}..{}: capacity {}, used {}, needed {}",
                unit.id,
                booking.date_range.check_in,
                booking.date_range.check_out,
                capacity,
                used,
                needed
            );
            // Dropping the transaction rolls it back
            return Err(AppError::RoomUnavailable(format!(
                "{} has no availability for {} to {}",
                unit.name, booking.date_range.check_in, booking.date_range.check_out
            )));
        }

        let created = insert_booking(&mut *tx, booking).await?;

        tx.commit().await.map_err(|e| {
            error!("Failed to commit transaction: {}", e);
            AppError::Transaction(format!("Failed to commit transaction: {}", e))
        })?;

        info!(
            "Booking {} holds unit {} ({} of {} used)",
            created.booking_number,
            unit.id,
            used + needed,
            capacity
        );

        Ok(created)
    }

    #[instrument(skip(self, booking, unit), fields(booking_number = %booking.booking_number))]
    async fn update_with_hold(
        &self,
        booking: &Booking,
        unit: &InventoryUnit,
        expected_version: i32,
    ) -> AppResult<Booking> {
        debug!("Re-checking hold on unit {}", unit.id);

        let mut tx = self.pool.begin().await.map_err(|e| {
            error!("Failed to begin transaction: {}", e);
            AppError::Transaction(format!("Failed to begin transaction: {}", e))
        })?;

        let capacity = lock_unit(&mut *tx, unit.id).await?;
        let used = occupancy_on(&mut *tx, unit, &booking.date_range, Some(booking.id)).await?;
        let needed = unit.occupancy_needed(booking.guest_count);

        if capacity - used < needed {
            warn!(
                "Unit {} cannot absorb change of booking {}",
                unit.id, booking.booking_number
            );
            return Err(AppError::RoomUnavailable(format!(
                "{} has no availability for {} to {}",
                unit.name, booking.date_range.check_in, booking.date_range.check_out
            )));
        }

        let updated = write_booking(&mut *tx, booking, expected_version).await?;

        tx.commit().await.map_err(|e| {
            error!("Failed to commit transaction: {}", e);
            AppError::Transaction(format!("Failed to commit transaction: {}", e))
        })?;

        Ok(updated)
    }

    #[instrument(skip(self, booking), fields(booking_number = %booking.booking_number))]
    async fn save(&self, booking: &Booking, expected_version: i32) -> AppResult<Booking> {
        debug!("Saving booking at version {}", expected_version);
        write_booking(&self.pool, booking, expected_version).await
    }
}

/// Database row representation of a booking
#[derive(Debug, sqlx::FromRow)]
pub(crate) struct BookingRow {
    id: Uuid,
    booking_number: String,
    inventory_unit_id: Uuid,
    requester_id: String,
    check_in: NaiveDate,
    check_out: NaiveDate,
    guest_count: i32,
    guest_details: Json<GuestDetails>,
    base_rate: Decimal,
    nights_or_units: i64,
    subtotal: Decimal,
    discount_amount: Decimal,
    discount_source: String,
    seasonal_discount: Decimal,
    promo_code: Option<String>,
    tax_rate: Decimal,
    tax: Decimal,
    total: Decimal,
    currency: String,
    payment_method: String,
    payment_type: String,
    payment_status: String,
    deposit_percentage: Decimal,
    gateway_reference: Option<String>,
    status: String,
    price_change: Option<Json<PriceChange>>,
    cancellation: Option<Json<CancellationRecord>>,
    version: i32,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    confirmed_at: Option<DateTime<Utc>>,
    completed_at: Option<DateTime<Utc>>,
}

impl From<BookingRow> for Booking {
    fn from(row: BookingRow) -> Self {
        Booking {
            id: row.id,
            booking_number: row.booking_number,
            inventory_unit_id: row.inventory_unit_id,
            requester_id: row.requester_id,
            date_range: DateRange::new(row.check_in, row.check_out),
            guest_count: row.guest_count,
            guest_details: row.guest_details.0,
            pricing: PriceBreakdown {
                base_rate: row.base_rate,
                nights_or_units: row.nights_or_units,
                subtotal: row.subtotal,
                discount_amount: row.discount_amount,
                discount_source: DiscountSource::from_str(&row.discount_source)
                    .unwrap_or_default(),
                seasonal_discount: row.seasonal_discount,
                promo_code: row.promo_code,
                tax_rate: row.tax_rate,
                tax: row.tax,
                total: row.total,
                currency: Currency::from_str(&row.currency).unwrap_or_default(),
            },
            payment: BookingPayment {
                method: PaymentMethod::from_str(&row.payment_method).unwrap_or_default(),
                payment_type: PaymentType::from_str(&row.payment_type).unwrap_or_default(),
                status: PaymentStatus::from_str(&row.payment_status).unwrap_or_default(),
                deposit_percentage: row.deposit_percentage,
                gateway_reference: row.gateway_reference,
            },
            status: BookingStatus::from_str(&row.status).unwrap_or_default(),
            price_change: row.price_change.map(|j| j.0),
            cancellation: row.cancellation.map(|j| j.0),
            version: row.version,
            created_at: row.created_at,
            updated_at: row.updated_at,
            confirmed_at: row.confirmed_at,
            completed_at: row.completed_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use derlg_core::models::{InventoryKind, PricingMode};
    use rust_decimal_macros::dec;

    fn row(status: &str) -> BookingRow {
        let now = Utc::now();
        BookingRow {
            id: Uuid::new_v4(),
            booking_number: "BK-LX1ABC-9Z2Q".to_string(),
            inventory_unit_id: Uuid::new_v4(),
            requester_id: "user-1".to_string(),
            check_in: NaiveDate::from_ymd_opt(2026, 12, 1).unwrap(),
            check_out: NaiveDate::from_ymd_opt(2026, 12, 4).unwrap(),
            guest_count: 2,
            guest_details: Json(GuestDetails {
                name: "Sokha Chan".to_string(),
                email: "sokha@example.com".to_string(),
                phone: "+85512345678".to_string(),
                notes: None,
            }),
            base_rate: dec!(100.00),
            nights_or_units: 3,
            subtotal: dec!(300.00),
            discount_amount: dec!(30.00),
            discount_source: "student".to_string(),
            seasonal_discount: dec!(0),
            promo_code: None,
            tax_rate: dec!(10),
            tax: dec!(27.00),
            total: dec!(297.00),
            currency: "USD".to_string(),
            payment_method: "qr".to_string(),
            payment_type: "deposit".to_string(),
            payment_status: "partial".to_string(),
            deposit_percentage: dec!(60),
            gateway_reference: Some("abc123".to_string()),
            status: status.to_string(),
            price_change: None,
            cancellation: None,
            version: 3,
            created_at: now,
            updated_at: now,
            confirmed_at: Some(now),
            completed_at: None,
        }
    }

    #[test]
    fn test_row_conversion() {
        let booking: Booking = row("confirmed").into();
        assert_eq!(booking.status, BookingStatus::Confirmed);
        assert_eq!(booking.payment.method, PaymentMethod::Qr);
        assert_eq!(booking.payment.payment_type, PaymentType::Deposit);
        assert_eq!(booking.payment.status, PaymentStatus::Partial);
        assert_eq!(booking.pricing.discount_source, DiscountSource::Student);
        assert_eq!(booking.date_range.nights(), 3);
        assert!(booking.pricing.is_consistent());
    }

    #[tokio::test]
    #[ignore] // Requires database
    async fn test_last_unit_hold_is_exclusive() {
        let url = std::env::var("DATABASE_URL")
            .unwrap_or_else(|_| "postgresql://localhost/derlg_tourism".to_string());
        let pool = PgPool::connect(&url).await.unwrap();
        crate::run_migrations(&pool).await.unwrap();

        let unit = InventoryUnit {
            kind: InventoryKind::Room,
            name: "Test suite".to_string(),
            capacity: 1,
            base_price: dec!(100.00),
            pricing_mode: PricingMode::PerUnit,
            ..Default::default()
        };
        sqlx::query(
            "INSERT INTO inventory_units (id, kind, name, capacity, base_price) VALUES ($1, 'room', $2, 1, 100)",
        )
        .bind(unit.id)
        .bind(&unit.name)
        .execute(&pool)
        .await
        .unwrap();

        let repo = PgBookingRepository::new(pool);
        let mut first: Booking = row("pending").into();
        first.inventory_unit_id = unit.id;
        let mut second: Booking = row("pending").into();
        second.id = Uuid::new_v4();
        second.booking_number = "BK-LX1ABC-0000".to_string();
        second.inventory_unit_id = unit.id;

        let (a, b) = tokio::join!(
            repo.insert_with_hold(&first, &unit),
            repo.insert_with_hold(&second, &unit)
        );
        assert!(a.is_ok() ^ b.is_ok());
    }
}
