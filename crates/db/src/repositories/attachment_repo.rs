use shared::{AttachmentId, UserId};
use sqlx::PgPool;

use crate::models::{CalendarAttachment, CreateAttachment};

pub struct AttachmentRepository;

impl AttachmentRepository {
    pub async fn create(
        pool: &PgPool,
        input: CreateAttachment,
    ) -> Result<CalendarAttachment, sqlx::Error> {
        sqlx::query_as::<_, CalendarAttachment>(
            r#"
            INSERT INTO calendar_attachments
                (id, user_id, credential_id, remote_calendar_id, kind, active, display_color)
            VALUES ($1, $2, $3, $4, $5, true, $6)
            RETURNING *
            "#,
        )
        .bind(AttachmentId::new().as_uuid())
        .bind(input.user_id.as_uuid())
        .bind(input.credential_id.as_uuid())
        .bind(&input.remote_calendar_id)
        .bind(input.kind)
        .bind(&input.display_color)
        .fetch_one(pool)
        .await
    }

    pub async fn find_by_id(
        pool: &PgPool,
        id: AttachmentId,
    ) -> Result<Option<CalendarAttachment>, sqlx::Error> {
        sqlx::query_as::<_, CalendarAttachment>("SELECT * FROM calendar_attachments WHERE id = $1")
            .bind(id.as_uuid())
            .fetch_optional(pool)
            .await
    }

    pub async fn find_active_by_user(
        pool: &PgPool,
        user_id: UserId,
    ) -> Result<Vec<CalendarAttachment>, sqlx::Error> {
        sqlx::query_as::<_, CalendarAttachment>(
            "SELECT * FROM calendar_attachments WHERE user_id = $1 AND active = true",
        )
        .bind(user_id.as_uuid())
        .fetch_all(pool)
        .await
    }

    /// Active client attachments other than `excluding`, the fan-out target
    /// set for a client-origin or main-origin mapping (spec.md 4.3.b).
    pub async fn find_active_clients_excluding(
        pool: &PgPool,
        user_id: UserId,
        excluding: Option<AttachmentId>,
    ) -> Result<Vec<CalendarAttachment>, sqlx::Error> {
        sqlx::query_as::<_, CalendarAttachment>(
            r#"
            SELECT * FROM calendar_attachments
            WHERE user_id = $1 AND active = true AND kind = 'client'
              AND ($2::uuid IS NULL OR id != $2)
            "#,
        )
        .bind(user_id.as_uuid())
        .bind(excluding.map(|id| *id.as_uuid()))
        .fetch_all(pool)
        .await
    }

    pub async fn find_all_active(pool: &PgPool) -> Result<Vec<CalendarAttachment>, sqlx::Error> {
        sqlx::query_as::<_, CalendarAttachment>(
            "SELECT * FROM calendar_attachments WHERE active = true",
        )
        .fetch_all(pool)
        .await
    }

    pub async fn mark_disconnected(pool: &PgPool, id: AttachmentId) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE calendar_attachments
            SET active = false, disconnected_at = NOW(), updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id.as_uuid())
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Attachments disconnected longer than `older_than`, for retention
    /// cleanup.
    pub async fn find_long_disconnected(
        pool: &PgPool,
        older_than: chrono::Duration,
    ) -> Result<Vec<CalendarAttachment>, sqlx::Error> {
        sqlx::query_as::<_, CalendarAttachment>(
            r#"
            SELECT * FROM calendar_attachments
            WHERE active = false AND disconnected_at IS NOT NULL
              AND disconnected_at < NOW() - $1::interval
            "#,
        )
        .bind(older_than)
        .fetch_all(pool)
        .await
    }

    pub async fn delete(pool: &PgPool, id: AttachmentId) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM calendar_attachments WHERE id = $1")
            .bind(id.as_uuid())
            .execute(pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
