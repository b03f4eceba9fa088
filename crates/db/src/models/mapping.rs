use chrono::{DateTime, Utc};
use serde::Serialize;
use shared::{AttachmentId, MappingId, OriginKind, UserId};
use sqlx::FromRow;

/// The durable record linking one origin event to its derived main copy
/// and (indirectly, via `busy_blocks`) its busy-block set. Uniquely keyed
/// by (user_id, origin_calendar, origin_event_id), including across
/// soft-deleted rows.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct EventMapping {
    pub id: MappingId,
    pub user_id: UserId,
    pub origin_kind: OriginKind,
    /// Null when origin_kind = Main.
    pub origin_calendar: Option<AttachmentId>,
    pub origin_event_id: String,
    /// Set only when this row represents a single modified instance of a
    /// tracked recurring series (a "fork").
    pub origin_recurring_event_id: Option<String>,
    /// The id of the derived copy on the user's main calendar, or the
    /// origin id itself when origin_kind = Main.
    pub main_event_id: String,
    pub event_start: DateTime<Utc>,
    pub event_end: DateTime<Utc>,
    pub is_all_day: bool,
    pub is_recurring: bool,
    pub user_can_edit: bool,
    pub deleted_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl EventMapping {
    pub fn is_live(&self) -> bool {
        self.deleted_at.is_none()
    }

    pub fn is_fork(&self) -> bool {
        self.origin_recurring_event_id.is_some()
    }
}

#[derive(Debug, Clone)]
pub struct UpsertMapping {
    pub user_id: UserId,
    pub origin_kind: OriginKind,
    pub origin_calendar: Option<AttachmentId>,
    pub origin_event_id: String,
    pub origin_recurring_event_id: Option<String>,
    pub main_event_id: String,
    pub event_start: DateTime<Utc>,
    pub event_end: DateTime<Utc>,
    pub is_all_day: bool,
    pub is_recurring: bool,
    pub user_can_edit: bool,
}
