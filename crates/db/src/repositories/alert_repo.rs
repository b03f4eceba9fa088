use chrono::Utc;
use shared::AlertId;
use sqlx::PgPool;

use crate::models::{Alert, CreateAlert};

pub struct AlertRepository;

impl AlertRepository {
    /// Insert a new alert unless one with the same (user_id, subject) was
    /// created within `dedup_window` (spec.md 9's open question, resolved
    /// as a configurable window). Returns `None` when deduplicated.
    pub async fn queue_deduped(
        pool: &PgPool,
        input: CreateAlert,
        dedup_window: chrono::Duration,
    ) -> Result<Option<Alert>, sqlx::Error> {
        let existing: Option<(uuid::Uuid,)> = sqlx::query_as(
            r#"
            SELECT id FROM alerts
            WHERE user_id = $1 AND subject = $2 AND created_at > NOW() - $3::interval
            "#,
        )
        .bind(input.user_id.as_uuid())
        .bind(&input.subject)
        .bind(dedup_window)
        .fetch_optional(pool)
        .await?;

        if existing.is_some() {
            return Ok(None);
        }

        let alert = sqlx::query_as::<_, Alert>(
            r#"
            INSERT INTO alerts (id, user_id, subject, body)
            VALUES ($1, $2, $3, $4)
            RETURNING *
            "#,
        )
        .bind(AlertId::new().as_uuid())
        .bind(input.user_id.as_uuid())
        .bind(&input.subject)
        .bind(&input.body)
        .fetch_one(pool)
        .await?;

        Ok(Some(alert))
    }

    pub async fn find_undelivered(pool: &PgPool, limit: i64) -> Result<Vec<Alert>, sqlx::Error> {
        sqlx::query_as::<_, Alert>(
            r#"
            SELECT * FROM alerts
            WHERE delivered_at IS NULL
            ORDER BY created_at
            LIMIT $1
            "#,
        )
        .bind(limit)
        .fetch_all(pool)
        .await
    }

    pub async fn record_attempt(pool: &PgPool, id: AlertId) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE alerts SET attempt_count = attempt_count + 1, last_attempt_at = NOW() WHERE id = $1",
        )
        .bind(id.as_uuid())
        .execute(pool)
        .await?;
        Ok(())
    }

    pub async fn mark_delivered(pool: &PgPool, id: AlertId) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE alerts SET delivered_at = $2 WHERE id = $1")
            .bind(id.as_uuid())
            .bind(Utc::now())
            .execute(pool)
            .await?;
        Ok(())
    }

    /// Delivered alerts older than `older_than`, for retention cleanup.
    pub async fn delete_stale(
        pool: &PgPool,
        older_than: chrono::Duration,
    ) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            "DELETE FROM alerts WHERE delivered_at IS NOT NULL AND delivered_at < NOW() - $1::interval",
        )
        .bind(older_than)
        .execute(pool)
        .await?;
        Ok(result.rows_affected())
    }
}
