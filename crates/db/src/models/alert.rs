use chrono::{DateTime, Utc};
use serde::Serialize;
use shared::{AlertId, UserId};
use sqlx::FromRow;

/// A queued notification for a user, delivered by the `alert_process` job
/// with attempt/backoff. Deduplicated by (user_id, subject) within a
/// configurable window at insert time.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Alert {
    pub id: AlertId,
    pub user_id: UserId,
    pub subject: String,
    pub body: String,
    pub attempt_count: i32,
    pub last_attempt_at: Option<DateTime<Utc>>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Alert {
    pub fn is_delivered(&self) -> bool {
        self.delivered_at.is_some()
    }
}

#[derive(Debug, Clone)]
pub struct CreateAlert {
    pub user_id: UserId,
    pub subject: String,
    pub body: String,
}
