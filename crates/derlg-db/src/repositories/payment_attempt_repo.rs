//! Payment attempt repository implementation
//!
//! Attempt rows and the booking row they affect are written in the same
//! transaction. The partial unique index `uq_payment_attempts_open` keeps a
//! booking to one open attempt even across server instances.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use derlg_core::{
    models::{AttemptState, Booking, Currency, PaymentAttempt, PaymentMethod, PaymentType},
    traits::PaymentAttemptRepository,
    AppError, AppResult,
};
use rust_decimal::Decimal;
use sqlx::PgPool;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use super::booking_repo::write_booking;

const OPEN_ATTEMPT_INDEX: &str = "uq_payment_attempts_open";
const REFERENCE_KEY: &str = "payment_attempts_gateway_reference_key";

/// PostgreSQL implementation of PaymentAttemptRepository
pub struct PgPaymentAttemptRepository {
    pool: PgPool,
}

impl PgPaymentAttemptRepository {
    /// Create a new payment attempt repository
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PaymentAttemptRepository for PgPaymentAttemptRepository {
    #[instrument(skip(self))]
    async fn find_by_reference(&self, reference: &str) -> AppResult<Option<PaymentAttempt>> {
        debug!("Finding payment attempt by reference: {}", reference);

        let result = sqlx::query_as::<sqlx::Postgres, PaymentAttemptRow>(
            r#"
            SELECT
                id, booking_id, gateway_reference, provider, amount, currency,
                payment_type, terminal_state, client_payload,
                created_at, last_checked_at, settled_at
            FROM payment_attempts
            WHERE gateway_reference = $1
            "#,
        )
        .bind(reference)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            error!("Database error finding payment attempt {}: {}", reference, e);
            AppError::Database(format!("Failed to find payment attempt: {}", e))
        })?;

        Ok(result.map(Into::into))
    }

    #[instrument(skip(self))]
    async fn find_open_for_booking(&self, booking_id: Uuid) -> AppResult<Option<PaymentAttempt>> {
        debug!("Finding open payment attempt for booking: {}", booking_id);

        let result = sqlx::query_as::<sqlx::Postgres, PaymentAttemptRow>(
            r#"
            SELECT
                id, booking_id, gateway_reference, provider, amount, currency,
                payment_type, terminal_state, client_payload,
                created_at, last_checked_at, settled_at
            FROM payment_attempts
            WHERE booking_id = $1 AND terminal_state = 'none'
            "#,
        )
        .bind(booking_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            error!("Database error finding open attempt for {}: {}", booking_id, e);
            AppError::Database(format!("Failed to find open payment attempt: {}", e))
        })?;

        Ok(result.map(Into::into))
    }

    #[instrument(skip(self))]
    async fn list_for_booking(&self, booking_id: Uuid) -> AppResult<Vec<PaymentAttempt>> {
        debug!("Listing payment attempts for booking: {}", booking_id);

        let rows = sqlx::query_as::<sqlx::Postgres, PaymentAttemptRow>(
            r#"
            SELECT
                id, booking_id, gateway_reference, provider, amount, currency,
                payment_type, terminal_state, client_payload,
                created_at, last_checked_at, settled_at
            FROM payment_attempts
            WHERE booking_id = $1
            ORDER BY created_at ASC
            "#,
        )
        .bind(booking_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            error!("Database error listing attempts for {}: {}", booking_id, e);
            AppError::Database(format!("Failed to list payment attempts: {}", e))
        })?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    #[instrument(skip(self, attempt, booking), fields(reference = %attempt.gateway_reference))]
    async fn open(
        &self,
        attempt: &PaymentAttempt,
        booking: &Booking,
        expected_version: i32,
    ) -> AppResult<Booking> {
        debug!("Opening payment attempt for booking {}", booking.booking_number);

        let mut tx = self.pool.begin().await.map_err(|e| {
            error!("Failed to begin transaction: {}", e);
            AppError::Transaction(format!("Failed to begin transaction: {}", e))
        })?;

        sqlx::query(
            r#"
            INSERT INTO payment_attempts (
                id, booking_id, gateway_reference, provider, amount, currency,
                payment_type, terminal_state, client_payload, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(attempt.id)
        .bind(attempt.booking_id)
        .bind(&attempt.gateway_reference)
        .bind(attempt.provider.to_string())
        .bind(attempt.amount)
        .bind(attempt.currency.to_string())
        .bind(attempt.payment_type.to_string())
        .bind(attempt.terminal_state.to_string())
        .bind(&attempt.client_payload)
        .bind(attempt.created_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| match &e {
            sqlx::Error::Database(db) if db.constraint() == Some(OPEN_ATTEMPT_INDEX) => {
                warn!(
                    "Booking {} already has an open payment attempt",
                    booking.booking_number
                );
                AppError::PaymentAlreadyInProgress(booking.booking_number.clone())
            }
            sqlx::Error::Database(db) if db.constraint() == Some(REFERENCE_KEY) => {
                warn!("Gateway reused reference {}", attempt.gateway_reference);
                AppError::GatewayRejected(format!(
                    "reference {} already used",
                    attempt.gateway_reference
                ))
            }
            _ => {
                error!("Database error creating payment attempt: {}", e);
                AppError::Database(format!("Failed to create payment attempt: {}", e))
            }
        })?;

        let updated = write_booking(&mut *tx, booking, expected_version).await?;

        tx.commit().await.map_err(|e| {
            error!("Failed to commit transaction: {}", e);
            AppError::Transaction(format!("Failed to commit transaction: {}", e))
        })?;

        info!(
            "Payment attempt {} opened for booking {}",
            attempt.gateway_reference, updated.booking_number
        );

        Ok(updated)
    }

    #[instrument(skip(self, attempt, booking), fields(reference = %attempt.gateway_reference))]
    async fn settle(
        &self,
        attempt: &PaymentAttempt,
        booking: &Booking,
        expected_version: i32,
    ) -> AppResult<Booking> {
        debug!(
            "Settling payment attempt as {} for booking {}",
            attempt.terminal_state, booking.booking_number
        );

        let mut tx = self.pool.begin().await.map_err(|e| {
            error!("Failed to begin transaction: {}", e);
            AppError::Transaction(format!("Failed to begin transaction: {}", e))
        })?;

        let result = sqlx::query(
            r#"
            UPDATE payment_attempts
            SET terminal_state = $2,
                last_checked_at = $3,
                settled_at = $4
            WHERE id = $1 AND terminal_state = 'none'
            "#,
        )
        .bind(attempt.id)
        .bind(attempt.terminal_state.to_string())
        .bind(attempt.last_checked_at)
        .bind(attempt.settled_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| {
            error!("Database error settling payment attempt: {}", e);
            AppError::Database(format!("Failed to settle payment attempt: {}", e))
        })?;

        if result.rows_affected() == 0 {
            warn!(
                "Payment attempt {} was already settled",
                attempt.gateway_reference
            );
            return Err(AppError::ConcurrentModification(
                booking.booking_number.clone(),
            ));
        }

        let updated = write_booking(&mut *tx, booking, expected_version).await?;

        tx.commit().await.map_err(|e| {
            error!("Failed to commit transaction: {}", e);
            AppError::Transaction(format!("Failed to commit transaction: {}", e))
        })?;

        Ok(updated)
    }

    #[instrument(skip(self))]
    async fn touch(&self, reference: &str) -> AppResult<()> {
        sqlx::query("UPDATE payment_attempts SET last_checked_at = NOW() WHERE gateway_reference = $1")
            .bind(reference)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                error!("Database error touching payment attempt {}: {}", reference, e);
                AppError::Database(format!("Failed to update payment attempt: {}", e))
            })?;

        Ok(())
    }
}

/// Database row representation of a payment attempt
#[derive(Debug, sqlx::FromRow)]
struct PaymentAttemptRow {
    id: Uuid,
    booking_id: Uuid,
    gateway_reference: String,
    provider: String,
    amount: Decimal,
    currency: String,
    payment_type: String,
    terminal_state: String,
    client_payload: serde_json::Value,
    created_at: DateTime<Utc>,
    last_checked_at: Option<DateTime<Utc>>,
    settled_at: Option<DateTime<Utc>>,
}

impl From<PaymentAttemptRow> for PaymentAttempt {
    fn from(row: PaymentAttemptRow) -> Self {
        PaymentAttempt {
            id: row.id,
            booking_id: row.booking_id,
            gateway_reference: row.gateway_reference,
            provider: PaymentMethod::from_str(&row.provider).unwrap_or_default(),
            amount: row.amount,
            currency: Currency::from_str(&row.currency).unwrap_or_default(),
            payment_type: PaymentType::from_str(&row.payment_type).unwrap_or_default(),
            terminal_state: AttemptState::from_str(&row.terminal_state).unwrap_or_default(),
            client_payload: row.client_payload,
            created_at: row.created_at,
            last_checked_at: row.last_checked_at,
            settled_at: row.settled_at,
        }
    }
}
