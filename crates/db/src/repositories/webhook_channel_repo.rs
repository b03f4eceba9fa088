use shared::{AttachmentId, OriginKind, UserId, WebhookChannelId};
use sqlx::PgPool;

use crate::models::{CreateWebhookChannel, WebhookChannel};

pub struct WebhookChannelRepository;

impl WebhookChannelRepository {
    pub async fn create(
        pool: &PgPool,
        input: CreateWebhookChannel,
    ) -> Result<WebhookChannel, sqlx::Error> {
        sqlx::query_as::<_, WebhookChannel>(
            r#"
            INSERT INTO webhook_channels
                (id, user_id, calendar_kind, attachment_id, channel_id, resource_id, token, expiration)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING *
            "#,
        )
        .bind(WebhookChannelId::new().as_uuid())
        .bind(input.user_id.as_uuid())
        .bind(input.calendar_kind)
        .bind(input.attachment_id.map(|id| *id.as_uuid()))
        .bind(&input.channel_id)
        .bind(&input.resource_id)
        .bind(&input.token)
        .bind(input.expiration)
        .fetch_one(pool)
        .await
    }

    pub async fn find_by_channel_id(
        pool: &PgPool,
        channel_id: &str,
    ) -> Result<Option<WebhookChannel>, sqlx::Error> {
        sqlx::query_as::<_, WebhookChannel>("SELECT * FROM webhook_channels WHERE channel_id = $1")
            .bind(channel_id)
            .fetch_optional(pool)
            .await
    }

    pub async fn find_for_calendar(
        pool: &PgPool,
        user_id: UserId,
        calendar_kind: OriginKind,
        attachment_id: Option<AttachmentId>,
    ) -> Result<Option<WebhookChannel>, sqlx::Error> {
        sqlx::query_as::<_, WebhookChannel>(
            r#"
            SELECT * FROM webhook_channels
            WHERE user_id = $1 AND calendar_kind = $2
              AND attachment_id IS NOT DISTINCT FROM $3
            "#,
        )
        .bind(user_id.as_uuid())
        .bind(calendar_kind)
        .bind(attachment_id.map(|id| *id.as_uuid()))
        .fetch_optional(pool)
        .await
    }

    /// Channels expiring within `window`, the `webhook_renewal` job's scan.
    pub async fn find_expiring(
        pool: &PgPool,
        window: chrono::Duration,
    ) -> Result<Vec<WebhookChannel>, sqlx::Error> {
        sqlx::query_as::<_, WebhookChannel>(
            "SELECT * FROM webhook_channels WHERE expiration <= NOW() + $1::interval",
        )
        .bind(window)
        .fetch_all(pool)
        .await
    }

    pub async fn delete(pool: &PgPool, id: WebhookChannelId) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM webhook_channels WHERE id = $1")
            .bind(id.as_uuid())
            .execute(pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn delete_by_channel_id(pool: &PgPool, channel_id: &str) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM webhook_channels WHERE channel_id = $1")
            .bind(channel_id)
            .execute(pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn delete_for_attachment(
        pool: &PgPool,
        attachment_id: AttachmentId,
    ) -> Result<u64, sqlx::Error> {
        let result = sqlx::query("DELETE FROM webhook_channels WHERE attachment_id = $1")
            .bind(attachment_id.as_uuid())
            .execute(pool)
            .await?;
        Ok(result.rows_affected())
    }
}
