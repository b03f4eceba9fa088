use shared::{AttachmentId, UserId};
use sqlx::PgPool;

use crate::models::{CalendarSyncState, MainCalendarSyncState};

pub struct SyncStateRepository;

impl SyncStateRepository {
    pub async fn get_or_create(
        pool: &PgPool,
        attachment_id: AttachmentId,
    ) -> Result<CalendarSyncState, sqlx::Error> {
        sqlx::query_as::<_, CalendarSyncState>(
            r#"
            INSERT INTO calendar_sync_states (attachment_id)
            VALUES ($1)
            ON CONFLICT (attachment_id) DO UPDATE SET attachment_id = EXCLUDED.attachment_id
            RETURNING *
            "#,
        )
        .bind(attachment_id.as_uuid())
        .fetch_one(pool)
        .await
    }

    /// Advance the sync token and reset failure counters after a fully
    /// successful batch (spec.md 4.3.e).
    pub async fn record_success(
        pool: &PgPool,
        attachment_id: AttachmentId,
        sync_token: Option<&str>,
        full_sync: bool,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            UPDATE calendar_sync_states
            SET sync_token = $2,
                consecutive_failures = 0,
                last_error = NULL,
                last_incremental_sync_at = NOW(),
                last_full_sync_at = CASE WHEN $3 THEN NOW() ELSE last_full_sync_at END
            WHERE attachment_id = $1
            "#,
        )
        .bind(attachment_id.as_uuid())
        .bind(sync_token)
        .bind(full_sync)
        .execute(pool)
        .await?;
        Ok(())
    }

    /// Leaves the sync token untouched: the batch is retried in full on the
    /// next trigger.
    pub async fn record_failure(
        pool: &PgPool,
        attachment_id: AttachmentId,
        error: &str,
    ) -> Result<i32, sqlx::Error> {
        let row: (i32,) = sqlx::query_as(
            r#"
            UPDATE calendar_sync_states
            SET consecutive_failures = consecutive_failures + 1, last_error = $2
            WHERE attachment_id = $1
            RETURNING consecutive_failures
            "#,
        )
        .bind(attachment_id.as_uuid())
        .bind(error)
        .fetch_one(pool)
        .await?;
        Ok(row.0)
    }

    pub async fn clear_token(pool: &PgPool, attachment_id: AttachmentId) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE calendar_sync_states SET sync_token = NULL WHERE attachment_id = $1")
            .bind(attachment_id.as_uuid())
            .execute(pool)
            .await?;
        Ok(())
    }

    /// Drops the sync-state row for a disconnected attachment (spec.md
    /// 4.3.d: disconnect removes the attachment's sync state entirely, not
    /// just its token).
    pub async fn delete(pool: &PgPool, attachment_id: AttachmentId) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM calendar_sync_states WHERE attachment_id = $1")
            .bind(attachment_id.as_uuid())
            .execute(pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn get_main_or_create(
        pool: &PgPool,
        user_id: UserId,
    ) -> Result<MainCalendarSyncState, sqlx::Error> {
        sqlx::query_as::<_, MainCalendarSyncState>(
            r#"
            INSERT INTO main_calendar_sync_states (user_id)
            VALUES ($1)
            ON CONFLICT (user_id) DO UPDATE SET user_id = EXCLUDED.user_id
            RETURNING *
            "#,
        )
        .bind(user_id.as_uuid())
        .fetch_one(pool)
        .await
    }

    pub async fn record_main_success(
        pool: &PgPool,
        user_id: UserId,
        sync_token: Option<&str>,
        full_sync: bool,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            UPDATE main_calendar_sync_states
            SET sync_token = $2,
                consecutive_failures = 0,
                last_error = NULL,
                last_incremental_sync_at = NOW(),
                last_full_sync_at = CASE WHEN $3 THEN NOW() ELSE last_full_sync_at END
            WHERE user_id = $1
            "#,
        )
        .bind(user_id.as_uuid())
        .bind(sync_token)
        .bind(full_sync)
        .execute(pool)
        .await?;
        Ok(())
    }

    pub async fn record_main_failure(
        pool: &PgPool,
        user_id: UserId,
        error: &str,
    ) -> Result<i32, sqlx::Error> {
        let row: (i32,) = sqlx::query_as(
            r#"
            UPDATE main_calendar_sync_states
            SET consecutive_failures = consecutive_failures + 1, last_error = $2
            WHERE user_id = $1
            RETURNING consecutive_failures
            "#,
        )
        .bind(user_id.as_uuid())
        .bind(error)
        .fetch_one(pool)
        .await?;
        Ok(row.0)
    }

    pub async fn clear_main_token(pool: &PgPool, user_id: UserId) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE main_calendar_sync_states SET sync_token = NULL WHERE user_id = $1")
            .bind(user_id.as_uuid())
            .execute(pool)
            .await?;
        Ok(())
    }
}
