use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::FromRow;

/// A single-row-per-job mutex for periodic fan-outs. Becomes reclaimable
/// once `locked_at` is older than the configured timeout, so a crashed
/// worker cannot wedge a job forever.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct JobLock {
    pub job_name: String,
    pub locked_at: DateTime<Utc>,
    pub locked_by: String,
}
