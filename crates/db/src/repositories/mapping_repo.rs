use chrono::{DateTime, Utc};
use shared::{AttachmentId, MappingId, UserId};
use sqlx::PgPool;

use crate::models::{EventMapping, UpsertMapping};

pub struct MappingRepository;

impl MappingRepository {
    /// Insert or update by the unique key (user_id, origin_calendar,
    /// origin_event_id). A single atomic statement per spec.md 4.4.
    pub async fn upsert(pool: &PgPool, input: UpsertMapping) -> Result<EventMapping, sqlx::Error> {
        sqlx::query_as::<_, EventMapping>(
            r#"
            INSERT INTO event_mappings
                (id, user_id, origin_kind, origin_calendar, origin_event_id,
                 origin_recurring_event_id, main_event_id, event_start, event_end,
                 is_all_day, is_recurring, user_can_edit, deleted_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, NULL)
            ON CONFLICT (user_id, origin_calendar, origin_event_id) DO UPDATE SET
                main_event_id = EXCLUDED.main_event_id,
                origin_recurring_event_id = EXCLUDED.origin_recurring_event_id,
                event_start = EXCLUDED.event_start,
                event_end = EXCLUDED.event_end,
                is_all_day = EXCLUDED.is_all_day,
                is_recurring = EXCLUDED.is_recurring,
                user_can_edit = EXCLUDED.user_can_edit,
                deleted_at = NULL,
                updated_at = NOW()
            RETURNING *
            "#,
        )
        .bind(MappingId::new().as_uuid())
        .bind(input.user_id.as_uuid())
        .bind(input.origin_kind)
        .bind(input.origin_calendar.map(|id| *id.as_uuid()))
        .bind(&input.origin_event_id)
        .bind(&input.origin_recurring_event_id)
        .bind(&input.main_event_id)
        .bind(input.event_start)
        .bind(input.event_end)
        .bind(input.is_all_day)
        .bind(input.is_recurring)
        .bind(input.user_can_edit)
        .fetch_one(pool)
        .await
    }

    pub async fn find_by_id(
        pool: &PgPool,
        id: MappingId,
    ) -> Result<Option<EventMapping>, sqlx::Error> {
        sqlx::query_as::<_, EventMapping>("SELECT * FROM event_mappings WHERE id = $1")
            .bind(id.as_uuid())
            .fetch_optional(pool)
            .await
    }

    pub async fn find_by_origin(
        pool: &PgPool,
        user_id: UserId,
        origin_calendar: Option<AttachmentId>,
        origin_event_id: &str,
    ) -> Result<Option<EventMapping>, sqlx::Error> {
        sqlx::query_as::<_, EventMapping>(
            r#"
            SELECT * FROM event_mappings
            WHERE user_id = $1
              AND origin_calendar IS NOT DISTINCT FROM $2
              AND origin_event_id = $3
            "#,
        )
        .bind(user_id.as_uuid())
        .bind(origin_calendar.map(|id| *id.as_uuid()))
        .bind(origin_event_id)
        .fetch_optional(pool)
        .await
    }

    /// Find the parent-series mapping a fork instance points at, tracked by
    /// `origin_recurring_event_id`.
    pub async fn find_parent_series(
        pool: &PgPool,
        user_id: UserId,
        origin_calendar: AttachmentId,
        recurring_event_id: &str,
    ) -> Result<Option<EventMapping>, sqlx::Error> {
        sqlx::query_as::<_, EventMapping>(
            r#"
            SELECT * FROM event_mappings
            WHERE user_id = $1 AND origin_calendar = $2 AND origin_event_id = $3
              AND deleted_at IS NULL
            "#,
        )
        .bind(user_id.as_uuid())
        .bind(origin_calendar.as_uuid())
        .bind(recurring_event_id)
        .fetch_optional(pool)
        .await
    }

    pub async fn find_live_by_user(
        pool: &PgPool,
        user_id: UserId,
    ) -> Result<Vec<EventMapping>, sqlx::Error> {
        sqlx::query_as::<_, EventMapping>(
            "SELECT * FROM event_mappings WHERE user_id = $1 AND deleted_at IS NULL",
        )
        .bind(user_id.as_uuid())
        .fetch_all(pool)
        .await
    }

    pub async fn find_soft_deleted_by_user(
        pool: &PgPool,
        user_id: UserId,
    ) -> Result<Vec<EventMapping>, sqlx::Error> {
        sqlx::query_as::<_, EventMapping>(
            "SELECT * FROM event_mappings WHERE user_id = $1 AND deleted_at IS NOT NULL",
        )
        .bind(user_id.as_uuid())
        .fetch_all(pool)
        .await
    }

    pub async fn find_by_origin_attachment(
        pool: &PgPool,
        origin_calendar: AttachmentId,
    ) -> Result<Vec<EventMapping>, sqlx::Error> {
        sqlx::query_as::<_, EventMapping>(
            "SELECT * FROM event_mappings WHERE origin_calendar = $1",
        )
        .bind(origin_calendar.as_uuid())
        .fetch_all(pool)
        .await
    }

    pub async fn soft_delete(pool: &PgPool, id: MappingId) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE event_mappings SET deleted_at = NOW(), updated_at = NOW() WHERE id = $1",
        )
        .bind(id.as_uuid())
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn hard_delete(pool: &PgPool, id: MappingId) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM event_mappings WHERE id = $1")
            .bind(id.as_uuid())
            .execute(pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn update_main_event_id(
        pool: &PgPool,
        id: MappingId,
        main_event_id: &str,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE event_mappings SET main_event_id = $2, updated_at = NOW() WHERE id = $1",
        )
        .bind(id.as_uuid())
        .bind(main_event_id)
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Mappings due for retention cleanup: non-recurring past `cutoff`, or
    /// recurring and soft-deleted before `cutoff` (spec.md 4.4's combined
    /// retention scan).
    pub async fn find_for_retention(
        pool: &PgPool,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<EventMapping>, sqlx::Error> {
        sqlx::query_as::<_, EventMapping>(
            r#"
            SELECT * FROM event_mappings
            WHERE (is_recurring = false AND event_end < $1)
               OR (is_recurring = true AND deleted_at IS NOT NULL AND deleted_at < $1)
            "#,
        )
        .bind(cutoff)
        .fetch_all(pool)
        .await
    }
}
