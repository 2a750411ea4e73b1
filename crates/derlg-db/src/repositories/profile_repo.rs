//! Requester profile repository implementation
//!
//! Holds the student flag and the lifetime student-discount counter.

use async_trait::async_trait;
use derlg_core::{
    models::RequesterProfile, traits::RequesterProfileRepository, AppError, AppResult,
};
use sqlx::PgPool;
use tracing::{debug, error, info, instrument};

/// PostgreSQL implementation of RequesterProfileRepository
pub struct PgRequesterProfileRepository {
    pool: PgPool,
}

impl PgRequesterProfileRepository {
    /// Create a new profile repository
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RequesterProfileRepository for PgRequesterProfileRepository {
    #[instrument(skip(self))]
    async fn find_profile(&self, requester_id: &str) -> AppResult<Option<RequesterProfile>> {
        debug!("Finding profile for requester: {}", requester_id);

        let result: Option<(String, bool, i32)> = sqlx::query_as(
            r#"
            SELECT requester_id, is_student, student_discount_remaining
            FROM requester_profiles
            WHERE requester_id = $1
            "#,
        )
        .bind(requester_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            error!("Database error finding profile {}: {}", requester_id, e);
            AppError::Database(format!("Failed to find requester profile: {}", e))
        })?;

        Ok(result.map(
            |(requester_id, is_student, student_discount_remaining)| RequesterProfile {
                requester_id,
                is_student,
                student_discount_remaining,
            },
        ))
    }

    #[instrument(skip(self))]
    async fn consume_student_discount(&self, requester_id: &str) -> AppResult<i32> {
        let remaining: Option<(i32,)> = sqlx::query_as(
            r#"
            UPDATE requester_profiles
            SET student_discount_remaining = GREATEST(student_discount_remaining - 1, 0),
                updated_at = NOW()
            WHERE requester_id = $1
            RETURNING student_discount_remaining
            "#,
        )
        .bind(requester_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            error!("Database error consuming student discount: {}", e);
            AppError::Database(format!("Failed to update requester profile: {}", e))
        })?;

        let remaining = remaining.map(|(r,)| r).unwrap_or(0);
        info!(
            "Student discount used by {}, {} remaining",
            requester_id, remaining
        );

        Ok(remaining)
    }
}
