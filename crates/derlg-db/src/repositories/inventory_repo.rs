//! Inventory catalog repository
//!
//! Read-only access to bookable units. Capacity is always read from the
//! database; nothing here is cached.

use chrono::{DateTime, Utc};
use derlg_core::{
    models::{Currency, InventoryKind, InventoryUnit, PricingMode},
    traits::InventoryRepository,
    AppError, AppResult,
};
use async_trait::async_trait;
use rust_decimal::Decimal;
use sqlx::PgPool;
use tracing::{debug, error, instrument};
use uuid::Uuid;

/// PostgreSQL implementation of InventoryRepository
pub struct PgInventoryRepository {
    pool: PgPool,
}

impl PgInventoryRepository {
    /// Create a new inventory repository
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl InventoryRepository for PgInventoryRepository {
    #[instrument(skip(self))]
    async fn find_by_id(&self, id: Uuid) -> AppResult<Option<InventoryUnit>> {
        debug!("Finding inventory unit by id: {}", id);

        let result = sqlx::query_as::<sqlx::Postgres, InventoryUnitRow>(
            r#"
            SELECT
                id, kind, name, capacity, base_price, currency, pricing_mode,
                min_occupancy, max_occupancy, seasonal_discount_percent,
                active, created_at, updated_at
            FROM inventory_units
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            error!("Database error finding inventory unit {}: {}", id, e);
            AppError::Database(format!("Failed to find inventory unit: {}", e))
        })?;

        Ok(result.map(Into::into))
    }
}

/// Database row representation of an inventory unit
#[derive(Debug, sqlx::FromRow)]
pub(crate) struct InventoryUnitRow {
    id: Uuid,
    kind: String,
    name: String,
    capacity: i32,
    base_price: Decimal,
    currency: String,
    pricing_mode: String,
    min_occupancy: i32,
    max_occupancy: i32,
    seasonal_discount_percent: Decimal,
    active: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<InventoryUnitRow> for InventoryUnit {
    fn from(row: InventoryUnitRow) -> Self {
        InventoryUnit {
            id: row.id,
            kind: InventoryKind::from_str(&row.kind).unwrap_or_default(),
            name: row.name,
            capacity: row.capacity,
            base_price: row.base_price,
            currency: Currency::from_str(&row.currency).unwrap_or_default(),
            pricing_mode: PricingMode::from_str(&row.pricing_mode).unwrap_or_default(),
            min_occupancy: row.min_occupancy,
            max_occupancy: row.max_occupancy,
            seasonal_discount_percent: row.seasonal_discount_percent,
            active: row.active,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}
