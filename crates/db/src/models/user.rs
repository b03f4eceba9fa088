use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use shared::UserId;
use sqlx::FromRow;

/// A principal with one designated main-calendar identifier and zero or
/// more attached accounts. Lifecycle-root for all per-user rows.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub email: String,
    pub main_calendar_id: Option<String>,
    pub timezone: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    pub fn has_main_calendar(&self) -> bool {
        self.main_calendar_id.is_some()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateUser {
    pub email: String,
    pub main_calendar_id: Option<String>,
    pub timezone: String,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct UpdateUser {
    pub main_calendar_id: Option<Option<String>>,
    pub timezone: Option<String>,
}
