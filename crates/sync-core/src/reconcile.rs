//! Consistency & Rollback (4.6): a reconciler that probes each live
//! mapping's origin and main copy and repairs drift. Dry-run mode performs
//! the identical walk but only records the plan, writing nothing.

use gateway::GatewayError;
use sqlx::PgPool;
use tracing::info;

use db::{AttachmentRepository, BusyBlockRepository, EventMapping, MappingRepository, UserRepository};
use shared::{OriginKind, UserId};

use crate::engine::GatewayFactory;
use crate::error::{SyncError, SyncResult};
use crate::transform::EventTransform;
use crate::SyncConfig;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileActionKind {
    DeleteMainCopy,
    RecreateMainCopy,
    DropOrphanedMapping,
    DeleteDanglingBusyBlock,
}

#[derive(Debug, Clone)]
pub struct ReconcileAction {
    pub kind: ReconcileActionKind,
    pub event_id: String,
    pub summary: String,
}

#[derive(Debug, Default)]
pub struct ReconcileOutcome {
    pub actions: Vec<ReconcileAction>,
}

/// Walks every live mapping (and every soft-deleted mapping's busy blocks)
/// for `user_id`. When `dry_run` is true, no writes happen; the returned
/// actions are a plan only.
pub async fn reconcile_user(
    pool: &PgPool,
    config: &SyncConfig,
    gateways: &dyn GatewayFactory,
    user_id: UserId,
    dry_run: bool,
) -> SyncResult<ReconcileOutcome> {
    let user = UserRepository::find_by_id(pool, user_id)
        .await
        .map_err(SyncError::from)?
        .ok_or_else(|| SyncError::Other(format!("user {user_id} not found")))?;

    if !user.has_main_calendar() {
        return Ok(ReconcileOutcome::default());
    }

    let (main_gateway, main_calendar_id) = gateways.for_main(user_id).await?;
    let mut outcome = ReconcileOutcome::default();

    for mapping in MappingRepository::find_live_by_user(pool, user_id)
        .await
        .map_err(SyncError::from)?
    {
        reconcile_live_mapping(
            pool,
            config,
            gateways,
            main_gateway.as_ref(),
            &main_calendar_id,
            &mapping,
            dry_run,
            &mut outcome,
        )
        .await?;
    }

    for mapping in MappingRepository::find_soft_deleted_by_user(pool, user_id)
        .await
        .map_err(SyncError::from)?
    {
        reconcile_soft_deleted_mapping(pool, gateways, &mapping, dry_run, &mut outcome).await?;
    }

    Ok(outcome)
}

#[allow(clippy::too_many_arguments)]
async fn reconcile_live_mapping(
    pool: &PgPool,
    config: &SyncConfig,
    gateways: &dyn GatewayFactory,
    main_gateway: &dyn gateway::CalendarGateway,
    main_calendar_id: &str,
    mapping: &EventMapping,
    dry_run: bool,
    outcome: &mut ReconcileOutcome,
) -> SyncResult<()> {
    let main_event = main_gateway.get_event(main_calendar_id, &mapping.main_event_id).await?;

    if mapping.origin_kind == OriginKind::Main {
        if main_event.is_none() {
            plan_drop_mapping(pool, gateways, mapping, dry_run, outcome).await?;
        }
        return Ok(());
    }

    let Some(attachment_id) = mapping.origin_calendar else {
        return Ok(());
    };
    let Some(attachment) = AttachmentRepository::find_by_id(pool, attachment_id)
        .await
        .map_err(SyncError::from)?
    else {
        return Ok(());
    };
    let origin_gateway = gateways.for_attachment(&attachment).await?;
    let origin_event = origin_gateway
        .get_event(&attachment.remote_calendar_id, &mapping.origin_event_id)
        .await?;

    match (origin_event, main_event) {
        (None, Some(_)) => {
            outcome.actions.push(ReconcileAction {
                kind: ReconcileActionKind::DeleteMainCopy,
                event_id: mapping.main_event_id.clone(),
                summary: "origin gone, main copy still present".to_string(),
            });
            if !dry_run {
                let _ = main_gateway.delete_event(main_calendar_id, &mapping.main_event_id).await;
                drop_busy_blocks(pool, gateways, mapping.id).await?;
                MappingRepository::hard_delete(pool, mapping.id).await.map_err(SyncError::from)?;
            }
        }
        (Some(origin), None) => {
            outcome.actions.push(ReconcileAction {
                kind: ReconcileActionKind::RecreateMainCopy,
                event_id: mapping.origin_event_id.clone(),
                summary: "main copy missing, recreating from origin".to_string(),
            });
            if !dry_run {
                let source_label = attachment.display_color.as_deref().unwrap_or(&attachment.remote_calendar_id);
                let write = if mapping.origin_kind == OriginKind::Personal {
                    EventTransform::personal_busy_block_payload(config, &origin)
                } else {
                    EventTransform::client_to_main(config, source_label, &origin)
                };
                let created = main_gateway.create_event(main_calendar_id, &write).await?;
                MappingRepository::update_main_event_id(pool, mapping.id, &created.id)
                    .await
                    .map_err(SyncError::from)?;
            }
        }
        (None, None) => {
            plan_drop_mapping(pool, gateways, mapping, dry_run, outcome).await?;
        }
        (Some(_), Some(_)) => {}
    }
    Ok(())
}

async fn plan_drop_mapping(
    pool: &PgPool,
    gateways: &dyn GatewayFactory,
    mapping: &EventMapping,
    dry_run: bool,
    outcome: &mut ReconcileOutcome,
) -> SyncResult<()> {
    outcome.actions.push(ReconcileAction {
        kind: ReconcileActionKind::DropOrphanedMapping,
        event_id: mapping.main_event_id.clone(),
        summary: "origin and main copy both gone".to_string(),
    });
    if !dry_run {
        drop_busy_blocks(pool, gateways, mapping.id).await?;
        MappingRepository::hard_delete(pool, mapping.id).await.map_err(SyncError::from)?;
    }
    Ok(())
}

/// Removes a mapping and its busy blocks for good (remote-then-DB order),
/// used by retention cleanup once a mapping is past its retention cutoff.
pub async fn drop_mapping_and_busy_blocks(
    pool: &PgPool,
    gateways: &dyn GatewayFactory,
    mapping: &EventMapping,
) -> SyncResult<()> {
    drop_busy_blocks(pool, gateways, mapping.id).await?;
    MappingRepository::hard_delete(pool, mapping.id).await.map_err(SyncError::from)?;
    Ok(())
}

async fn drop_busy_blocks(pool: &PgPool, gateways: &dyn GatewayFactory, mapping_id: shared::MappingId) -> SyncResult<()> {
    for block in BusyBlockRepository::find_for_mapping(pool, mapping_id)
        .await
        .map_err(SyncError::from)?
    {
        if let Some(attachment) = AttachmentRepository::find_by_id(pool, block.attachment_id)
            .await
            .map_err(SyncError::from)?
        {
            if let Ok(gateway) = gateways.for_attachment(&attachment).await {
                let _ = gateway
                    .delete_event(&attachment.remote_calendar_id, &block.busy_block_event_id)
                    .await;
            }
        }
        BusyBlockRepository::delete(pool, block.id).await.map_err(SyncError::from)?;
    }
    Ok(())
}

async fn reconcile_soft_deleted_mapping(
    pool: &PgPool,
    gateways: &dyn GatewayFactory,
    mapping: &EventMapping,
    dry_run: bool,
    outcome: &mut ReconcileOutcome,
) -> SyncResult<()> {
    for block in BusyBlockRepository::find_for_mapping(pool, mapping.id)
        .await
        .map_err(SyncError::from)?
    {
        let Some(attachment) = AttachmentRepository::find_by_id(pool, block.attachment_id)
            .await
            .map_err(SyncError::from)?
        else {
            continue;
        };
        let gateway = gateways.for_attachment(&attachment).await?;
        let present = gateway
            .get_event(&attachment.remote_calendar_id, &block.busy_block_event_id)
            .await?
            .is_some();
        if present {
            outcome.actions.push(ReconcileAction {
                kind: ReconcileActionKind::DeleteDanglingBusyBlock,
                event_id: block.busy_block_event_id.clone(),
                summary: "mapping soft-deleted but busy block still on remote".to_string(),
            });
            if !dry_run {
                match gateway
                    .delete_event(&attachment.remote_calendar_id, &block.busy_block_event_id)
                    .await
                {
                    Ok(()) => {}
                    Err(GatewayError::NotFound(_)) => {}
                    Err(other) => return Err(other.into()),
                }
                BusyBlockRepository::delete(pool, block.id).await.map_err(SyncError::from)?;
            }
        }
    }
    Ok(())
}

/// Runs the reconciler for every user with a main calendar, logging a
/// summary per user. Invoked by the `consistency_check` job (non-dry-run).
pub async fn run_consistency_check(
    pool: &PgPool,
    config: &SyncConfig,
    gateways: &dyn GatewayFactory,
) -> SyncResult<()> {
    for user in UserRepository::list_with_main_calendar(pool).await.map_err(SyncError::from)? {
        let outcome = reconcile_user(pool, config, gateways, user.id, false).await?;
        if !outcome.actions.is_empty() {
            info!(user = %user.id, actions = outcome.actions.len(), "consistency check repaired drift");
        }
    }
    Ok(())
}
