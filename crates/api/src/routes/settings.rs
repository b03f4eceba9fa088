//! Live configuration surface (spec 6): reads and partial updates over the
//! `SyncConfig` the scheduler jobs read on every tick.

use axum::{extract::State, Json};
use serde::Deserialize;
use sync_core::config::SyncConfig;

use crate::error::ApiResult;
use crate::state::AppState;

/// GET /settings
pub async fn get_settings(State(state): State<AppState>) -> Json<SettingsView> {
    Json(SettingsView::from(&*state.ctx.config.read().await))
}

#[derive(serde::Serialize)]
pub struct SettingsView {
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
    pub managed_event_marker: String,
    pub client_busy_block_title: String,
    pub personal_busy_block_title: String,
    pub default_color_palette: Vec<String>,
    pub alert_failure_threshold: i32,
}

impl From<&SyncConfig> for SettingsView {
    fn from(c: &SyncConfig) -> Self {
        Self {
            sync_paused: c.sync_paused,
            sync_interval_minutes: c.sync_interval_minutes,
            webhook_renewal_hours: c.webhook_renewal_hours,
            webhook_renewal_window_hours: c.webhook_renewal_window_hours,
            consistency_check_hours: c.consistency_check_hours,
            token_refresh_minutes: c.token_refresh_minutes,
            token_refresh_window_minutes: c.token_refresh_window_minutes,
            alert_process_minutes: c.alert_process_minutes,
            alert_dedup_window_minutes: c.alert_dedup_window_minutes,
            job_lock_reclaim_minutes: c.job_lock_reclaim_minutes,
            retention_mapping_days: c.retention_mapping_days,
            retention_alert_days: c.retention_alert_days,
            retention_disconnected_attachment_days: c.retention_disconnected_attachment_days,
            managed_event_marker: c.managed_event_marker.clone(),
            client_busy_block_title: c.client_busy_block_title.clone(),
            personal_busy_block_title: c.personal_busy_block_title.clone(),
            default_color_palette: c.default_color_palette.clone(),
            alert_failure_threshold: c.alert_failure_threshold,
        }
    }
}

#[derive(Deserialize, Default)]
pub struct SettingsPatch {
    pub sync_paused: Option<bool>,
    pub sync_interval_minutes: Option<i64>,
    pub webhook_renewal_hours: Option<i64>,
    pub webhook_renewal_window_hours: Option<i64>,
    pub consistency_check_hours: Option<i64>,
    pub token_refresh_minutes: Option<i64>,
    pub token_refresh_window_minutes: Option<i64>,
    pub alert_process_minutes: Option<i64>,
    pub alert_dedup_window_minutes: Option<i64>,
    pub job_lock_reclaim_minutes: Option<i64>,
    pub retention_mapping_days: Option<i64>,
    pub retention_alert_days: Option<i64>,
    pub retention_disconnected_attachment_days: Option<i64>,
    pub managed_event_marker: Option<String>,
    pub client_busy_block_title: Option<String>,
    pub personal_busy_block_title: Option<String>,
    pub default_color_palette: Option<Vec<String>>,
    pub alert_failure_threshold: Option<i32>,
}

/// PATCH /settings
pub async fn update_settings(State(state): State<AppState>, Json(patch): Json<SettingsPatch>) -> ApiResult<Json<SettingsView>> {
    let mut config = state.ctx.config.write().await;

    if let Some(v) = patch.sync_paused {
        config.sync_paused = v;
    }
    if let Some(v) = patch.sync_interval_minutes {
        config.sync_interval_minutes = v;
    }
    if let Some(v) = patch.webhook_renewal_hours {
        config.webhook_renewal_hours = v;
    }
    if let Some(v) = patch.webhook_renewal_window_hours {
        config.webhook_renewal_window_hours = v;
    }
    if let Some(v) = patch.consistency_check_hours {
        config.consistency_check_hours = v;
    }
    if let Some(v) = patch.token_refresh_minutes {
        config.token_refresh_minutes = v;
    }
    if let Some(v) = patch.token_refresh_window_minutes {
        config.token_refresh_window_minutes = v;
    }
    if let Some(v) = patch.alert_process_minutes {
        config.alert_process_minutes = v;
    }
    if let Some(v) = patch.alert_dedup_window_minutes {
        config.alert_dedup_window_minutes = v;
    }
    if let Some(v) = patch.job_lock_reclaim_minutes {
        config.job_lock_reclaim_minutes = v;
    }
    if let Some(v) = patch.retention_mapping_days {
        config.retention_mapping_days = v;
    }
    if let Some(v) = patch.retention_alert_days {
        config.retention_alert_days = v;
    }
    if let Some(v) = patch.retention_disconnected_attachment_days {
        config.retention_disconnected_attachment_days = v;
    }
    if let Some(v) = patch.managed_event_marker {
        config.managed_event_marker = v;
    }
    if let Some(v) = patch.client_busy_block_title {
        config.client_busy_block_title = v;
    }
    if let Some(v) = patch.personal_busy_block_title {
        config.personal_busy_block_title = v;
    }
    if let Some(v) = patch.default_color_palette {
        config.default_color_palette = v;
    }
    if let Some(v) = patch.alert_failure_threshold {
        config.alert_failure_threshold = v;
    }

    Ok(Json(SettingsView::from(&*config)))
}
