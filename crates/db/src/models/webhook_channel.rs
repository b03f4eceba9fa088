use chrono::{DateTime, Utc};
use serde::Serialize;
use shared::{AttachmentId, OriginKind, UserId, WebhookChannelId};
use sqlx::FromRow;

/// A live push-notification subscription. At most one live channel per
/// (user_id, calendar_kind, attachment_id); renewal must create-then-stop,
/// never the reverse.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct WebhookChannel {
    pub id: WebhookChannelId,
    pub user_id: UserId,
    pub calendar_kind: OriginKind,
    /// Null when calendar_kind = Main.
    pub attachment_id: Option<AttachmentId>,
    pub channel_id: String,
    pub resource_id: String,
    #[serde(skip_serializing)]
    pub token: String,
    pub expiration: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl WebhookChannel {
    pub fn expires_within(&self, window: chrono::Duration) -> bool {
        Utc::now() + window >= self.expiration
    }
}

#[derive(Debug, Clone)]
pub struct CreateWebhookChannel {
    pub user_id: UserId,
    pub calendar_kind: OriginKind,
    pub attachment_id: Option<AttachmentId>,
    pub channel_id: String,
    pub resource_id: String,
    pub token: String,
    pub expiration: DateTime<Utc>,
}
