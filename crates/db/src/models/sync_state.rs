use chrono::{DateTime, Utc};
use serde::Serialize;
use shared::{AttachmentId, UserId};
use sqlx::FromRow;

/// Per-attachment sync cursor and health counters. Exactly one row per
/// attachment.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct CalendarSyncState {
    pub attachment_id: AttachmentId,
    pub sync_token: Option<String>,
    pub last_full_sync_at: Option<DateTime<Utc>>,
    pub last_incremental_sync_at: Option<DateTime<Utc>>,
    pub consecutive_failures: i32,
    pub last_error: Option<String>,
}

impl CalendarSyncState {
    pub fn is_healthy(&self, warning_threshold: i32) -> bool {
        self.consecutive_failures < warning_threshold
    }
}

/// Same shape as [`CalendarSyncState`], keyed by user instead of attachment,
/// for the user's main calendar.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct MainCalendarSyncState {
    pub user_id: UserId,
    pub sync_token: Option<String>,
    pub last_full_sync_at: Option<DateTime<Utc>>,
    pub last_incremental_sync_at: Option<DateTime<Utc>>,
    pub consecutive_failures: i32,
    pub last_error: Option<String>,
}

impl MainCalendarSyncState {
    pub fn is_healthy(&self, warning_threshold: i32) -> bool {
        self.consecutive_failures < warning_threshold
    }
}
