use chrono::{DateTime, Utc};
use serde::Serialize;
use shared::{AttachmentId, AttachmentKind, CredentialId, UserId};
use sqlx::FromRow;

/// An external calendar the user has attached, client or personal.
/// Clients and personals share this table but diverge in sync rules
/// (see the Sync Engine). While `active`, the Sync Core maintains its
/// derived artifacts; active→false triggers bounded cleanup.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct CalendarAttachment {
    pub id: AttachmentId,
    pub user_id: UserId,
    pub credential_id: CredentialId,
    pub remote_calendar_id: String,
    pub kind: AttachmentKind,
    pub active: bool,
    pub disconnected_at: Option<DateTime<Utc>>,
    pub display_color: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl CalendarAttachment {
    pub fn is_client(&self) -> bool {
        self.kind == AttachmentKind::Client
    }

    pub fn is_personal(&self) -> bool {
        self.kind == AttachmentKind::Personal
    }
}

#[derive(Debug, Clone)]
pub struct CreateAttachment {
    pub user_id: UserId,
    pub credential_id: CredentialId,
    pub remote_calendar_id: String,
    pub kind: AttachmentKind,
    pub display_color: Option<String>,
}
