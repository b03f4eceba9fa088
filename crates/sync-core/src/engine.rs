//! Sync Engine (4.3): the central state machine. Dispatches each observed
//! event to the transform/fan-out/deletion paths and enforces the
//! sync-token advancement and failure-counting rules in 4.3.e.

use async_trait::async_trait;
use gateway::{derive_instance_id, is_our_event, CalendarGateway, Event, EventWrite, GatewayError};
use sqlx::PgPool;
use tracing::{error, warn};

use db::{
    AccountCredential, AttachmentRepository, BusyBlockRepository, CalendarAttachment, CreateBusyBlock,
    EventMapping, MappingRepository, SyncStateRepository, UpsertMapping, WebhookChannelRepository,
};
use shared::{AttachmentId, OriginKind, UserId};

use crate::error::{SyncError, SyncResult};
use crate::transform::EventTransform;
use crate::SyncConfig;

/// Resolves a live, authenticated gateway for a calendar attachment or for
/// a user's main calendar, and performs OAuth token refresh. Supplied by
/// the caller (the scheduler) so the engine never owns credential
/// decryption, HTTP, or OAuth client-secret concerns directly.
#[async_trait]
pub trait GatewayFactory: Send + Sync {
    async fn for_attachment(&self, attachment: &CalendarAttachment) -> SyncResult<Box<dyn CalendarGateway>>;
    async fn for_main(&self, user_id: UserId) -> SyncResult<(Box<dyn CalendarGateway>, String)>;

    /// Refreshes `credential`'s access token in place, persisting the new
    /// encrypted token and expiry. Returns `SyncError::Gateway(TokenRevoked)`
    /// unmodified on `invalid_grant` so the caller can surface a "token
    /// revoked" alert without touching the stored tokens.
    async fn refresh_credential(&self, credential: &AccountCredential) -> SyncResult<()>;
}

/// Per-event dispatch for a client- or personal-origin attachment (4.3.a,
/// 4.3.c). Returns the subset of events that failed to process; the
/// caller decides sync-token advancement from this.
pub async fn process_client_batch(
    pool: &PgPool,
    config: &SyncConfig,
    gateways: &dyn GatewayFactory,
    user_id: UserId,
    attachment: &CalendarAttachment,
    events: Vec<Event>,
) -> Vec<(String, SyncError)> {
    let mut failures = Vec::new();
    for event in events {
        let event_id = event.id.clone();
        if let Err(err) =
            dispatch_attachment_event(pool, config, gateways, user_id, attachment, event).await
        {
            error!(attachment = %attachment.id, event = %event_id, error = %err, "client event dispatch failed");
            failures.push((event_id, err));
        }
    }
    failures
}

async fn dispatch_attachment_event(
    pool: &PgPool,
    config: &SyncConfig,
    gateways: &dyn GatewayFactory,
    user_id: UserId,
    attachment: &CalendarAttachment,
    event: Event,
) -> SyncResult<()> {
    if is_our_event(&event) {
        return Ok(());
    }
    if matches!(event.status, gateway::EventStatus::Cancelled) {
        return handle_origin_deletion(pool, gateways, user_id, attachment, &event).await;
    }
    if attachment.is_personal() {
        handle_personal_upsert(pool, config, gateways, user_id, attachment, event).await
    } else {
        handle_client_upsert(pool, config, gateways, user_id, attachment, event).await
    }
}

async fn handle_client_upsert(
    pool: &PgPool,
    config: &SyncConfig,
    gateways: &dyn GatewayFactory,
    user_id: UserId,
    attachment: &CalendarAttachment,
    event: Event,
) -> SyncResult<()> {
    let (main_gateway, main_calendar_id) = gateways.for_main(user_id).await?;
    let source_label = attachment.display_color.as_deref().unwrap_or(&attachment.remote_calendar_id);
    let write = EventTransform::client_to_main(config, source_label, &event);
    let user_can_edit = EventTransform::derive_user_can_edit(&event);

    let mapping = upsert_origin_mapping(
        pool,
        gateways,
        main_gateway.as_ref(),
        &main_calendar_id,
        user_id,
        attachment,
        OriginKind::Client,
        &write,
        user_can_edit,
        &event,
    )
    .await?;

    fan_out_busy_blocks(pool, config, gateways, user_id, &mapping, Some(attachment.id), &event).await
}

/// Personal-origin dispatch (4.3.c). Identical pipeline to client-origin,
/// except the main artifact is a personal busy block rather than a full
/// detail copy, and `user_can_edit` is always false since the event never
/// belongs to the authenticated user.
async fn handle_personal_upsert(
    pool: &PgPool,
    config: &SyncConfig,
    gateways: &dyn GatewayFactory,
    user_id: UserId,
    attachment: &CalendarAttachment,
    event: Event,
) -> SyncResult<()> {
    let (main_gateway, main_calendar_id) = gateways.for_main(user_id).await?;
    let write = EventTransform::personal_busy_block_payload(config, &event);

    let mapping = upsert_origin_mapping(
        pool,
        gateways,
        main_gateway.as_ref(),
        &main_calendar_id,
        user_id,
        attachment,
        OriginKind::Personal,
        &write,
        false,
        &event,
    )
    .await?;

    fan_out_busy_blocks(pool, config, gateways, user_id, &mapping, Some(attachment.id), &event).await
}

/// Shared upsert path for both origin kinds: look up the existing mapping,
/// update-or-recreate the main artifact `write` describes, or start a new
/// mapping (forking off a tracked series if the event is a recurring
/// instance).
#[allow(clippy::too_many_arguments)]
async fn upsert_origin_mapping(
    pool: &PgPool,
    gateways: &dyn GatewayFactory,
    main_gateway: &dyn CalendarGateway,
    main_calendar_id: &str,
    user_id: UserId,
    attachment: &CalendarAttachment,
    origin_kind: OriginKind,
    write: &EventWrite,
    user_can_edit: bool,
    event: &Event,
) -> SyncResult<EventMapping> {
    let existing = MappingRepository::find_by_origin(pool, user_id, Some(attachment.id), &event.id)
        .await
        .map_err(SyncError::from)?;

    match existing {
        Some(mapping) => {
            update_existing_main_copy(pool, main_gateway, main_calendar_id, &mapping, write, event).await
        }
        None => match &event.recurring_event_id {
            Some(parent_id) => {
                handle_fork(
                    pool,
                    gateways,
                    main_gateway,
                    main_calendar_id,
                    user_id,
                    attachment,
                    origin_kind,
                    parent_id,
                    write,
                    user_can_edit,
                    event,
                )
                .await
            }
            None => {
                let created = main_gateway.create_event(main_calendar_id, write).await?;
                MappingRepository::upsert(
                    pool,
                    UpsertMapping {
                        user_id,
                        origin_kind,
                        origin_calendar: Some(attachment.id),
                        origin_event_id: event.id.clone(),
                        origin_recurring_event_id: None,
                        main_event_id: created.id.clone(),
                        event_start: event.start.to_utc().map_err(|e| SyncError::Other(e.to_string()))?,
                        event_end: event.end.to_utc().map_err(|e| SyncError::Other(e.to_string()))?,
                        is_all_day: event.all_day,
                        is_recurring: event.is_recurring(),
                        user_can_edit,
                    },
                )
                .await
                .map_err(SyncError::from)
            }
        },
    }
}

#[allow(clippy::too_many_arguments)]
async fn handle_fork(
    pool: &PgPool,
    gateways: &dyn GatewayFactory,
    main_gateway: &dyn CalendarGateway,
    main_calendar_id: &str,
    user_id: UserId,
    attachment: &CalendarAttachment,
    origin_kind: OriginKind,
    parent_id: &str,
    write: &EventWrite,
    user_can_edit: bool,
    event: &Event,
) -> SyncResult<EventMapping> {
    let parent = MappingRepository::find_parent_series(pool, user_id, attachment.id, parent_id)
        .await
        .map_err(SyncError::from)?;

    if let (Some(parent), Some(original_start)) = (&parent, &event.original_start_time) {
        let instance_id = derive_instance_id(&parent.main_event_id, original_start)?;
        if let Err(err) = main_gateway.delete_event(main_calendar_id, &instance_id).await {
            if !err.is_retryable() && !matches!(err, GatewayError::NotFound(_)) {
                return Err(err.into());
            }
        }
        for block in BusyBlockRepository::find_for_mapping(pool, parent.id)
            .await
            .map_err(SyncError::from)?
        {
            let _ = delete_busy_block_remote(pool, gateways, &block).await;
            let _ = BusyBlockRepository::delete(pool, block.id).await;
        }
    }

    let created = main_gateway.create_event(main_calendar_id, write).await?;
    MappingRepository::upsert(
        pool,
        UpsertMapping {
            user_id,
            origin_kind,
            origin_calendar: Some(attachment.id),
            origin_event_id: event.id.clone(),
            origin_recurring_event_id: Some(parent_id.to_string()),
            main_event_id: created.id.clone(),
            event_start: event.start.to_utc().map_err(|e| SyncError::Other(e.to_string()))?,
            event_end: event.end.to_utc().map_err(|e| SyncError::Other(e.to_string()))?,
            is_all_day: event.all_day,
            is_recurring: false,
            user_can_edit,
        },
    )
    .await
    .map_err(SyncError::from)
}

async fn update_existing_main_copy(
    pool: &PgPool,
    main_gateway: &dyn CalendarGateway,
    main_calendar_id: &str,
    mapping: &EventMapping,
    write: &EventWrite,
    event: &Event,
) -> SyncResult<EventMapping> {
    match main_gateway
        .update_event(main_calendar_id, &mapping.main_event_id, write)
        .await
    {
        Ok(_) => refresh_mapping_timing(pool, mapping, event).await,
        Err(GatewayError::NotFound(_)) => {
            let created = main_gateway.create_event(main_calendar_id, write).await?;
            MappingRepository::update_main_event_id(pool, mapping.id, &created.id)
                .await
                .map_err(SyncError::from)?;
            refresh_mapping_timing(pool, mapping, event).await
        }
        Err(other) => Err(other.into()),
    }
}

async fn refresh_mapping_timing(
    pool: &PgPool,
    mapping: &EventMapping,
    event: &Event,
) -> SyncResult<EventMapping> {
    // Personal-origin mappings are never user-editable from the main
    // calendar, on creation or on any later update (4.3.c).
    let user_can_edit = if mapping.origin_kind == OriginKind::Personal {
        false
    } else {
        EventTransform::derive_user_can_edit(event)
    };
    MappingRepository::upsert(
        pool,
        UpsertMapping {
            user_id: mapping.user_id,
            origin_kind: mapping.origin_kind,
            origin_calendar: mapping.origin_calendar,
            origin_event_id: mapping.origin_event_id.clone(),
            origin_recurring_event_id: mapping.origin_recurring_event_id.clone(),
            main_event_id: mapping.main_event_id.clone(),
            event_start: event.start.to_utc().map_err(|e| SyncError::Other(e.to_string()))?,
            event_end: event.end.to_utc().map_err(|e| SyncError::Other(e.to_string()))?,
            is_all_day: event.all_day,
            is_recurring: event.is_recurring(),
            user_can_edit,
        },
    )
    .await
    .map_err(SyncError::from)
}

/// Origin deletion handler (4.3.a, 4.3.c), shared by client- and
/// personal-origin attachments. Handles both single-instance tombstones of
/// a tracked series and full-event tombstones.
async fn handle_origin_deletion(
    pool: &PgPool,
    gateways: &dyn GatewayFactory,
    user_id: UserId,
    attachment: &CalendarAttachment,
    event: &Event,
) -> SyncResult<()> {
    let (main_gateway, main_calendar_id) = gateways.for_main(user_id).await?;

    if let (Some(parent_id), Some(original_start)) =
        (&event.recurring_event_id, &event.original_start_time)
    {
        if let Some(parent) =
            MappingRepository::find_parent_series(pool, user_id, attachment.id, parent_id)
                .await
                .map_err(SyncError::from)?
        {
            let instance_id = derive_instance_id(&parent.main_event_id, original_start)?;
            delete_main_and_busy_blocks(pool, gateways, main_gateway.as_ref(), &main_calendar_id, &instance_id, parent.id).await?;
        }
        if let Some(fork) =
            MappingRepository::find_by_origin(pool, user_id, Some(attachment.id), &event.id)
                .await
                .map_err(SyncError::from)?
        {
            delete_main_and_busy_blocks(pool, gateways, main_gateway.as_ref(), &main_calendar_id, &fork.main_event_id, fork.id).await?;
            MappingRepository::hard_delete(pool, fork.id).await.map_err(SyncError::from)?;
        }
        return Ok(());
    }

    let Some(mapping) = MappingRepository::find_by_origin(pool, user_id, Some(attachment.id), &event.id)
        .await
        .map_err(SyncError::from)?
    else {
        return Ok(());
    };

    delete_main_and_busy_blocks(
        pool,
        gateways,
        main_gateway.as_ref(),
        &main_calendar_id,
        &mapping.main_event_id,
        mapping.id,
    )
    .await?;

    if mapping.is_recurring {
        MappingRepository::soft_delete(pool, mapping.id).await.map_err(SyncError::from)?;
    } else {
        MappingRepository::hard_delete(pool, mapping.id).await.map_err(SyncError::from)?;
    }
    Ok(())
}

async fn delete_main_and_busy_blocks(
    pool: &PgPool,
    gateways: &dyn GatewayFactory,
    main_gateway: &dyn CalendarGateway,
    main_calendar_id: &str,
    main_event_id: &str,
    mapping_id: shared::MappingId,
) -> SyncResult<()> {
    match main_gateway.delete_event(main_calendar_id, main_event_id).await {
        Ok(()) => {}
        Err(err) if err.is_retryable() => return Err(err.into()),
        Err(_) => {}
    }
    for block in BusyBlockRepository::find_for_mapping(pool, mapping_id)
        .await
        .map_err(SyncError::from)?
    {
        delete_busy_block_remote(pool, gateways, &block).await?;
        BusyBlockRepository::delete(pool, block.id).await.map_err(SyncError::from)?;
    }
    Ok(())
}

async fn delete_busy_block_remote(
    pool: &PgPool,
    gateways: &dyn GatewayFactory,
    block: &db::BusyBlock,
) -> SyncResult<()> {
    let Some(attachment) = AttachmentRepository::find_by_id(pool, block.attachment_id)
        .await
        .map_err(SyncError::from)?
    else {
        return Ok(());
    };
    let gateway = gateways.for_attachment(&attachment).await?;
    match gateway.delete_event(&attachment.remote_calendar_id, &block.busy_block_event_id).await {
        Ok(()) => Ok(()),
        Err(err) if err.is_retryable() => Err(err.into()),
        Err(_) => Ok(()),
    }
}

/// Main-fan-out (4.3.b): propagate a main-calendar event as busy blocks to
/// every other active client attachment.
pub async fn fan_out_busy_blocks(
    pool: &PgPool,
    config: &SyncConfig,
    gateways: &dyn GatewayFactory,
    user_id: UserId,
    mapping: &EventMapping,
    origin_attachment: Option<AttachmentId>,
    event: &Event,
) -> SyncResult<()> {
    if is_our_event(event) || !EventTransform::is_busy_worthy(event) {
        return Ok(());
    }

    let payload = match mapping.origin_kind {
        OriginKind::Personal => EventTransform::personal_busy_block_payload(config, event),
        _ => EventTransform::busy_block_payload(config, event),
    };

    let targets = AttachmentRepository::find_active_clients_excluding(pool, user_id, origin_attachment)
        .await
        .map_err(SyncError::from)?;

    for target in targets {
        if let Err(err) = fan_out_one(pool, gateways, mapping, &target, &payload).await {
            warn!(attachment = %target.id, mapping = %mapping.id, error = %err, "busy block fan-out failed");
            return Err(err);
        }
    }
    Ok(())
}

async fn fan_out_one(
    pool: &PgPool,
    gateways: &dyn GatewayFactory,
    mapping: &EventMapping,
    target: &CalendarAttachment,
    payload: &EventWrite,
) -> SyncResult<()> {
    let gateway = gateways.for_attachment(target).await?;
    let existing = BusyBlockRepository::find_for_mapping_and_attachment(pool, mapping.id, target.id)
        .await
        .map_err(SyncError::from)?;

    match existing {
        Some(block) => {
            match gateway
                .update_event(&target.remote_calendar_id, &block.busy_block_event_id, payload)
                .await
            {
                Ok(_) => Ok(()),
                Err(GatewayError::NotFound(_)) => {
                    let created = gateway.create_event(&target.remote_calendar_id, payload).await?;
                    BusyBlockRepository::repoint(pool, block.id, &created.id)
                        .await
                        .map_err(SyncError::from)?;
                    crate::metrics::record_busy_block_write();
                    Ok(())
                }
                Err(other) => Err(other.into()),
            }
        }
        None => {
            let created = gateway.create_event(&target.remote_calendar_id, payload).await?;
            BusyBlockRepository::create(
                pool,
                CreateBusyBlock {
                    mapping_id: mapping.id,
                    attachment_id: target.id,
                    busy_block_event_id: created.id,
                },
            )
            .await
            .map_err(SyncError::from)?;
            crate::metrics::record_busy_block_write();
            Ok(())
        }
    }
}

/// Disconnect cleanup (4.3.d). Best-effort remote deletes; DB rows are
/// dropped only when the remote artifact is confirmed gone, so a retry has
/// something left to retry on partial failure. Also drops the attachment's
/// webhook channel and sync state, which otherwise linger until the
/// retention pass picks them up.
pub async fn disconnect_cleanup(
    pool: &PgPool,
    gateways: &dyn GatewayFactory,
    attachment: &CalendarAttachment,
) -> SyncResult<()> {
    let gateway = gateways.for_attachment(attachment).await?;

    for block in BusyBlockRepository::find_on_attachment(pool, attachment.id)
        .await
        .map_err(SyncError::from)?
    {
        if remote_delete_confirmed(gateway.as_ref(), &attachment.remote_calendar_id, &block.busy_block_event_id).await? {
            BusyBlockRepository::delete(pool, block.id).await.map_err(SyncError::from)?;
        }
    }

    let mappings = MappingRepository::find_by_origin_attachment(pool, attachment.id)
        .await
        .map_err(SyncError::from)?;

    if !mappings.is_empty() {
        let (main_gateway, main_calendar_id) = gateways.for_main(attachment.user_id).await?;
        for mapping in mappings {
            if !remote_delete_confirmed(main_gateway.as_ref(), &main_calendar_id, &mapping.main_event_id).await? {
                continue;
            }
            for block in BusyBlockRepository::find_for_mapping(pool, mapping.id)
                .await
                .map_err(SyncError::from)?
            {
                delete_busy_block_remote(pool, gateways, &block).await?;
                BusyBlockRepository::delete(pool, block.id).await.map_err(SyncError::from)?;
            }
            MappingRepository::hard_delete(pool, mapping.id).await.map_err(SyncError::from)?;
        }
    }

    WebhookChannelRepository::delete_for_attachment(pool, attachment.id)
        .await
        .map_err(SyncError::from)?;
    SyncStateRepository::delete(pool, attachment.id).await.map_err(SyncError::from)?;

    Ok(())
}

async fn remote_delete_confirmed(
    gateway: &dyn CalendarGateway,
    calendar_id: &str,
    event_id: &str,
) -> SyncResult<bool> {
    match gateway.delete_event(calendar_id, event_id).await {
        Ok(()) => Ok(true),
        Err(err) if err.is_retryable() => Err(err.into()),
        Err(_) => Ok(true),
    }
}

