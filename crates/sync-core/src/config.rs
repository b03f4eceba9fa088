use chrono::Duration;

/// The configuration surface enumerated in spec.md 6, owned by the caller
/// (the `api` crate's `Settings`) and threaded through to every job and
/// engine call. Kept separate from `api::Settings` so this crate has no
/// dependency on the web layer.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    pub sync_paused: bool,
    pub sync_interval_minutes: i64,
    pub webhook_renewal_hours: i64,
    pub webhook_renewal_window_hours: i64,
    pub consistency_check_hours: i64,
    pub token_refresh_minutes: i64,
    pub token_refresh_window_minutes: i64,
    pub alert_process_minutes: i64,
    pub alert_dedup_window_minutes: i64,
    pub job_lock_reclaim_minutes: i64,
    pub retention_mapping_days: i64,
    pub retention_alert_days: i64,
    pub retention_disconnected_attachment_days: i64,
    /// Prefix stamped on every summary this system writes to a remote
    /// calendar, e.g. "[Synced]".
    pub managed_event_marker: String,
    pub client_busy_block_title: String,
    pub personal_busy_block_title: String,
    pub default_color_palette: Vec<String>,
    pub alert_failure_threshold: i32,
}

impl SyncConfig {
    pub fn sync_interval(&self) -> Duration {
        Duration::minutes(self.sync_interval_minutes)
    }

    pub fn webhook_renewal_interval(&self) -> Duration {
        Duration::hours(self.webhook_renewal_hours)
    }

    pub fn webhook_renewal_window(&self) -> Duration {
        Duration::hours(self.webhook_renewal_window_hours)
    }

    pub fn consistency_check_interval(&self) -> Duration {
        Duration::hours(self.consistency_check_hours)
    }

    pub fn token_refresh_interval(&self) -> Duration {
        Duration::minutes(self.token_refresh_minutes)
    }

    pub fn token_refresh_window(&self) -> Duration {
        Duration::minutes(self.token_refresh_window_minutes)
    }

    pub fn alert_process_interval(&self) -> Duration {
        Duration::minutes(self.alert_process_minutes)
    }

    pub fn alert_dedup_window(&self) -> Duration {
        Duration::minutes(self.alert_dedup_window_minutes)
    }

    pub fn job_lock_reclaim_timeout(&self) -> Duration {
        Duration::minutes(self.job_lock_reclaim_minutes)
    }

    pub fn retention_cutoff_mapping(&self) -> chrono::DateTime<chrono::Utc> {
        chrono::Utc::now() - Duration::days(self.retention_mapping_days)
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            sync_paused: false,
            sync_interval_minutes: 5,
            webhook_renewal_hours: 6,
            webhook_renewal_window_hours: 24,
            consistency_check_hours: 1,
            token_refresh_minutes: 30,
            token_refresh_window_minutes: 60,
            alert_process_minutes: 1,
            alert_dedup_window_minutes: 30,
            job_lock_reclaim_minutes: 15,
            retention_mapping_days: 365,
            retention_alert_days: 30,
            retention_disconnected_attachment_days: 90,
            managed_event_marker: "[Synced]".to_string(),
            client_busy_block_title: "Busy".to_string(),
            personal_busy_block_title: "Busy (Personal)".to_string(),
            default_color_palette: vec![
                "#4285F4".to_string(),
                "#34A853".to_string(),
                "#FBBC05".to_string(),
                "#EA4335".to_string(),
            ],
            alert_failure_threshold: 5,
        }
    }
}
