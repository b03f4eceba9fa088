//! Trigger operations exposed to collaborators (spec 6): manual sync
//! triggers, disconnect cleanup, consistency/reconcile runs, and the
//! backup/restore lifecycle.

use std::path::{Path, PathBuf};

use axum::{
    extract::{Path as AxumPath, Query, State},
    Json,
};
use chrono::Utc;
use db::AttachmentRepository;
use serde::{Deserialize, Serialize};
use shared::{AttachmentId, DomainError, UserId};
use sync_core::engine::disconnect_cleanup;
use sync_core::{backup, reconcile, scheduler};

use crate::error::ApiResult;
use crate::state::AppState;

#[derive(Serialize)]
pub struct TriggerResult {
    pub dispatched: bool,
}

/// POST /sync/calendars/:attachment_id/trigger
pub async fn trigger_calendar(
    State(state): State<AppState>,
    AxumPath(attachment_id): AxumPath<AttachmentId>,
) -> ApiResult<Json<TriggerResult>> {
    let dispatched = scheduler::trigger_sync_for_calendar(&state.ctx, attachment_id).await?;
    Ok(Json(TriggerResult { dispatched }))
}

/// POST /sync/users/:user_id/main/trigger
pub async fn trigger_main_calendar(
    State(state): State<AppState>,
    AxumPath(user_id): AxumPath<UserId>,
) -> ApiResult<Json<TriggerResult>> {
    let dispatched = scheduler::trigger_sync_for_main_calendar(&state.ctx, user_id).await?;
    Ok(Json(TriggerResult { dispatched }))
}

/// POST /sync/users/:user_id/trigger
pub async fn trigger_user(State(state): State<AppState>, AxumPath(user_id): AxumPath<UserId>) -> ApiResult<Json<TriggerResult>> {
    scheduler::trigger_sync_for_user(&state.ctx, user_id).await?;
    Ok(Json(TriggerResult { dispatched: true }))
}

/// POST /sync/calendars/:attachment_id/disconnect
pub async fn cleanup_disconnected_calendar(
    State(state): State<AppState>,
    AxumPath(attachment_id): AxumPath<AttachmentId>,
) -> ApiResult<Json<TriggerResult>> {
    let attachment = AttachmentRepository::find_by_id(&state.ctx.pool, attachment_id)
        .await?
        .ok_or(DomainError::AttachmentNotFound)?;

    disconnect_cleanup(&state.ctx.pool, state.ctx.gateways.as_ref(), &attachment).await?;
    AttachmentRepository::mark_disconnected(&state.ctx.pool, attachment_id).await?;

    Ok(Json(TriggerResult { dispatched: true }))
}

#[derive(Deserialize)]
pub struct ConsistencyQuery {
    #[serde(default)]
    pub user_id: Option<UserId>,
    #[serde(default)]
    pub dry_run: bool,
}

/// POST /sync/consistency-check
pub async fn run_consistency_check(State(state): State<AppState>, Query(query): Query<ConsistencyQuery>) -> ApiResult<Json<TriggerResult>> {
    let config = state.ctx.config.read().await.clone();
    match query.user_id {
        Some(user_id) => {
            reconcile::reconcile_user(&state.ctx.pool, &config, state.ctx.gateways.as_ref(), user_id, query.dry_run).await?;
        }
        None => {
            scheduler::run_consistency_check(state.ctx.clone()).await?;
        }
    }
    Ok(Json(TriggerResult { dispatched: true }))
}

#[derive(Serialize)]
pub struct ReconcileActionDto {
    pub kind: String,
    pub event_id: String,
    pub summary: String,
}

#[derive(Serialize)]
pub struct ReconcileResponse {
    pub actions: Vec<ReconcileActionDto>,
}

/// POST /sync/users/:user_id/reconcile
pub async fn reconcile_calendar(
    State(state): State<AppState>,
    AxumPath(user_id): AxumPath<UserId>,
    Query(query): Query<ConsistencyQuery>,
) -> ApiResult<Json<ReconcileResponse>> {
    let config = state.ctx.config.read().await.clone();
    let outcome = reconcile::reconcile_user(&state.ctx.pool, &config, state.ctx.gateways.as_ref(), user_id, query.dry_run).await?;
    Ok(Json(ReconcileResponse {
        actions: outcome
            .actions
            .into_iter()
            .map(|a| ReconcileActionDto {
                kind: format!("{:?}", a.kind),
                event_id: a.event_id,
                summary: a.summary,
            })
            .collect(),
    }))
}

#[derive(Deserialize)]
pub struct CreateBackupRequest {
    #[serde(default)]
    pub user_ids: Option<Vec<UserId>>,
}

#[derive(Serialize)]
pub struct CreateBackupResponse {
    pub metadata: backup::BackupMetadata,
    pub archive_path: String,
}

/// POST /backups
pub async fn create_backup(State(state): State<AppState>, Json(req): Json<CreateBackupRequest>) -> ApiResult<Json<CreateBackupResponse>> {
    let outcome = backup::create_backup(
        &state.ctx.pool,
        state.ctx.gateways.as_ref(),
        &state.ctx.backup_dir,
        &state.ctx.database_url,
        req.user_ids,
        Utc::now(),
    )
    .await?;

    Ok(Json(CreateBackupResponse {
        metadata: outcome.metadata,
        archive_path: outcome.archive_path.display().to_string(),
    }))
}

/// GET /backups
pub async fn list_backups(State(state): State<AppState>) -> ApiResult<Json<Vec<backup::BackupMetadata>>> {
    let metadata = backup::list_backup_metadata(&state.ctx.backup_dir)?;
    Ok(Json(metadata))
}

#[derive(Deserialize)]
pub struct RestoreRequest {
    pub archive_path: String,
    #[serde(default)]
    pub user_ids: Option<Vec<UserId>>,
    #[serde(default)]
    pub restore_db: bool,
    #[serde(default)]
    pub restore_calendars: bool,
    #[serde(default)]
    pub dry_run: bool,
}

#[derive(Serialize)]
pub struct RestoreResponse {
    pub db_restored: bool,
    pub planned_ops: std::collections::HashMap<String, Vec<String>>,
    pub errors: Vec<String>,
}

/// POST /backups/restore
pub async fn restore_from_backup(State(state): State<AppState>, Json(req): Json<RestoreRequest>) -> ApiResult<Json<RestoreResponse>> {
    let outcome = backup::restore_from_backup(
        &state.ctx.pool,
        state.ctx.gateways.as_ref(),
        Path::new(&req.archive_path),
        &state.ctx.database_url,
        req.user_ids,
        req.restore_db,
        req.restore_calendars,
        req.dry_run,
    )
    .await?;

    Ok(Json(RestoreResponse {
        db_restored: outcome.db_restored,
        planned_ops: outcome
            .planned_ops
            .into_iter()
            .map(|(user_id, ops)| (user_id.to_string(), ops.into_iter().map(|op| format!("{op:?}")).collect()))
            .collect(),
        errors: outcome.errors,
    }))
}

#[derive(Deserialize)]
pub struct StartupRestoreRequest {
    pub archive_path: String,
}

#[derive(Serialize)]
pub struct StartupRestoreResponse {
    pub restored: bool,
}

/// POST /sync/startup-restore
pub async fn apply_startup_restore(
    State(state): State<AppState>,
    Json(req): Json<StartupRestoreRequest>,
) -> ApiResult<Json<StartupRestoreResponse>> {
    let restored = backup::apply_startup_restore(&PathBuf::from(req.archive_path), &state.ctx.database_url).await?;
    Ok(Json(StartupRestoreResponse { restored }))
}
