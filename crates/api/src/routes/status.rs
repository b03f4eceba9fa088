//! Status endpoints (spec 7): per-calendar sync state and a per-user
//! healthy/warning/error rollup, plus the global pause flag.

use axum::{
    extract::{Path, State},
    Json,
};
use db::{AttachmentRepository, SyncStateRepository, UserRepository};
use serde::Serialize;
use shared::{AttachmentId, UserId};

use crate::error::ApiResult;
use crate::state::AppState;

#[derive(Serialize)]
pub struct UserStatus {
    pub user_id: UserId,
    pub sync_paused: bool,
    pub main_calendar: db::MainCalendarSyncState,
    pub main_calendar_healthy: bool,
    pub attachments: Vec<AttachmentStatus>,
    pub healthy_count: usize,
    pub warning_count: usize,
}

#[derive(Serialize)]
pub struct AttachmentStatus {
    pub attachment_id: AttachmentId,
    pub remote_calendar_id: String,
    pub state: db::CalendarSyncState,
    pub healthy: bool,
}

/// GET /status/users/:user_id
pub async fn get_user_status(State(state): State<AppState>, Path(user_id): Path<UserId>) -> ApiResult<Json<UserStatus>> {
    let config = state.ctx.config.read().await.clone();
    let _ = UserRepository::find_by_id(&state.ctx.pool, user_id)
        .await?
        .ok_or(shared::DomainError::UserNotFound(user_id.to_string()))?;

    let main_calendar = SyncStateRepository::get_main_or_create(&state.ctx.pool, user_id).await?;
    let main_calendar_healthy = main_calendar.is_healthy(config.alert_failure_threshold);

    let attachments = AttachmentRepository::find_active_by_user(&state.ctx.pool, user_id).await?;
    let mut statuses = Vec::with_capacity(attachments.len());
    let mut healthy_count = if main_calendar_healthy { 1 } else { 0 };
    let mut warning_count = if main_calendar_healthy { 0 } else { 1 };

    for attachment in attachments {
        let sync_state = SyncStateRepository::get_or_create(&state.ctx.pool, attachment.id).await?;
        let healthy = sync_state.is_healthy(config.alert_failure_threshold);
        if healthy {
            healthy_count += 1;
        } else {
            warning_count += 1;
        }
        statuses.push(AttachmentStatus {
            attachment_id: attachment.id,
            remote_calendar_id: attachment.remote_calendar_id,
            state: sync_state,
            healthy,
        });
    }

    Ok(Json(UserStatus {
        user_id,
        sync_paused: config.sync_paused,
        main_calendar,
        main_calendar_healthy,
        attachments: statuses,
        healthy_count,
        warning_count,
    }))
}

/// GET /status/calendars/:attachment_id
pub async fn get_calendar_status(
    State(state): State<AppState>,
    Path(attachment_id): Path<AttachmentId>,
) -> ApiResult<Json<db::CalendarSyncState>> {
    let _ = AttachmentRepository::find_by_id(&state.ctx.pool, attachment_id)
        .await?
        .ok_or(shared::DomainError::AttachmentNotFound)?;
    let state_row = SyncStateRepository::get_or_create(&state.ctx.pool, attachment_id).await?;
    Ok(Json(state_row))
}
