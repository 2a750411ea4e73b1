//! Promo code store backed by the `promo_codes` table
//!
//! Codes are maintained by the admin tooling; this store only validates and
//! counts redemptions.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use derlg_core::{
    models::{DiscountType, PromoCode, PromoContext, PromoScope, PromoValidation},
    traits::PromoCodeStore,
    AppError, AppResult,
};
use rust_decimal::Decimal;
use sqlx::PgPool;
use tracing::{debug, error, instrument, warn};
use uuid::Uuid;

/// PostgreSQL implementation of PromoCodeStore
pub struct PgPromoCodeStore {
    pool: PgPool,
}

impl PgPromoCodeStore {
    /// Create a new promo code store
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    #[instrument(skip(self))]
    async fn find_by_code(&self, code: &str) -> AppResult<Option<PromoCode>> {
        let result = sqlx::query_as::<sqlx::Postgres, PromoCodeRow>(
            r#"
            SELECT
                id, code, description, discount_type, discount_value,
                min_booking_amount, max_discount, valid_from, valid_until,
                usage_limit, usage_count, applicable_to, active
            FROM promo_codes
            WHERE code = $1
            "#,
        )
        .bind(code)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            error!("Database error finding promo code {}: {}", code, e);
            AppError::Database(format!("Failed to find promo code: {}", e))
        })?;

        Ok(result.map(Into::into))
    }
}

#[async_trait]
impl PromoCodeStore for PgPromoCodeStore {
    #[instrument(skip(self, context))]
    async fn validate(&self, code: &str, context: &PromoContext) -> AppResult<PromoValidation> {
        let code = code.trim().to_uppercase();
        debug!("Validating promo code {}", code);

        match self.find_by_code(&code).await? {
            Some(promo) => {
                let validation = promo.validate(context, Utc::now());
                if let Some(reason) = &validation.reason {
                    warn!("Promo code {} rejected: {}", code, reason);
                }
                Ok(validation)
            }
            None => Ok(PromoValidation::rejected(&code, "Promo code not found")),
        }
    }

    #[instrument(skip(self))]
    async fn record_usage(&self, code: &str) -> AppResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE promo_codes
            SET usage_count = usage_count + 1
            WHERE code = $1 AND usage_count < usage_limit
            "#,
        )
        .bind(code.trim().to_uppercase())
        .execute(&self.pool)
        .await
        .map_err(|e| {
            error!("Database error recording promo usage {}: {}", code, e);
            AppError::Database(format!("Failed to record promo usage: {}", e))
        })?;

        if result.rows_affected() == 0 {
            warn!("Promo code {} usage not recorded (missing or exhausted)", code);
        }

        Ok(())
    }
}

/// Database row representation of a promo code
#[derive(Debug, sqlx::FromRow)]
struct PromoCodeRow {
    id: Uuid,
    code: String,
    description: String,
    discount_type: String,
    discount_value: Decimal,
    min_booking_amount: Decimal,
    max_discount: Option<Decimal>,
    valid_from: DateTime<Utc>,
    valid_until: DateTime<Utc>,
    usage_limit: i32,
    usage_count: i32,
    applicable_to: String,
    active: bool,
}

impl From<PromoCodeRow> for PromoCode {
    fn from(row: PromoCodeRow) -> Self {
        PromoCode {
            id: row.id,
            code: row.code,
            description: row.description,
            discount_type: DiscountType::from_str(&row.discount_type)
                .unwrap_or(DiscountType::Fixed),
            discount_value: row.discount_value,
            min_booking_amount: row.min_booking_amount,
            max_discount: row.max_discount,
            valid_from: row.valid_from,
            valid_until: row.valid_until,
            usage_limit: row.usage_limit,
            usage_count: row.usage_count,
            applicable_to: PromoScope::from_str(&row.applicable_to).unwrap_or(PromoScope::All),
            active: row.active,
        }
    }
}
