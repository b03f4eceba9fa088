//! Scheduler & Locking (4.5): the periodic jobs. Each tick function is a
//! single unit of work guarded by a DB-backed [`JobLock`] so that two
//! processes (or a crashed-then-restarted one) never run the same job
//! concurrently; a stale lock past the configured reclaim window is
//! reclaimable. `spawn_all` wires every job onto its own interval task;
//! callers that only want one tick (tests, manual triggers) can call the
//! `run_*` functions directly.

use std::sync::Arc;
use std::time::Duration as StdDuration;

use async_trait::async_trait;
use db::{
    AccountCredential, Alert, AlertRepository, AttachmentRepository, CreateAlert, CredentialRepository,
    MappingRepository, UserRepository, WebhookChannel, WebhookChannelRepository,
};
use sqlx::PgPool;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::backup;
use crate::engine::{self, GatewayFactory};
use crate::ingestor;
use crate::lock::{CalendarKey, CalendarLockSet, JobLock};
use crate::reconcile;
use crate::retry::retry;
use crate::{SyncConfig, SyncError, SyncResult};

/// Delivers a queued alert to the user (email, push, whatever the
/// collaborator configures). Supplied by the caller for the same reason
/// [`GatewayFactory`] is: this crate never owns transport concerns.
#[async_trait]
pub trait AlertTransport: Send + Sync {
    async fn deliver(&self, alert: &Alert) -> SyncResult<()>;
}

/// Creates a new push-notification channel for the calendar `channel`
/// already watches, so the renewal job can create-then-stop without ever
/// leaving a calendar unwatched.
#[async_trait]
pub trait WebhookRenewer: Send + Sync {
    async fn renew(&self, channel: &WebhookChannel) -> SyncResult<WebhookChannel>;
}

const JOB_PERIODIC_SYNC: &str = "periodic_sync";
const JOB_CONSISTENCY_CHECK: &str = "consistency_check";
const JOB_WEBHOOK_RENEWAL: &str = "webhook_renewal";
const JOB_TOKEN_REFRESH: &str = "token_refresh";
const JOB_ALERT_PROCESS: &str = "alert_process";
const JOB_BACKUP: &str = "backup";
const JOB_RETENTION_CLEANUP: &str = "retention_cleanup";

const TOKEN_REFRESH_BACKOFF: &[StdDuration] = &[
    StdDuration::from_secs(1),
    StdDuration::from_secs(2),
    StdDuration::from_secs(4),
];

/// Everything a tick function needs, bundled so `spawn_all` doesn't need a
/// dozen positional arguments.
pub struct SchedulerContext {
    pub pool: PgPool,
    pub config: Arc<RwLock<SyncConfig>>,
    pub gateways: Arc<dyn GatewayFactory>,
    pub alert_transport: Arc<dyn AlertTransport>,
    pub webhook_renewer: Arc<dyn WebhookRenewer>,
    pub calendar_locks: Arc<CalendarLockSet>,
    pub backup_dir: std::path::PathBuf,
    pub database_url: String,
    pub holder_id: String,
}

impl SchedulerContext {
    async fn config(&self) -> SyncConfig {
        self.config.read().await.clone()
    }
}

/// Spawns every periodic job on its own interval task. Returns the handles
/// so the caller can hold or abort them at shutdown.
pub fn spawn_all(ctx: Arc<SchedulerContext>) -> Vec<JoinHandle<()>> {
    vec![
        spawn_loop(ctx.clone(), "periodic_sync", |c| run_periodic_sync(c), |cfg| cfg.sync_interval()),
        spawn_loop(ctx.clone(), "consistency_check", |c| run_consistency_check(c), |cfg| cfg.consistency_check_interval()),
        spawn_loop(ctx.clone(), "webhook_renewal", |c| run_webhook_renewal(c), |cfg| cfg.webhook_renewal_interval()),
        spawn_loop(ctx.clone(), "token_refresh", |c| run_token_refresh(c), |cfg| cfg.token_refresh_interval()),
        spawn_loop(ctx.clone(), "alert_process", |c| run_alert_process(c), |cfg| cfg.alert_process_interval()),
        spawn_loop(ctx.clone(), "backup", |c| run_backup(c), |_| chrono::Duration::hours(24)),
        spawn_loop(ctx.clone(), "retention_cleanup", |c| run_retention_cleanup(c), |_| chrono::Duration::hours(24)),
    ]
}

fn spawn_loop<F, Fut, I>(ctx: Arc<SchedulerContext>, name: &'static str, run: F, interval_of: I) -> JoinHandle<()>
where
    F: Fn(Arc<SchedulerContext>) -> Fut + Send + Sync + 'static,
    Fut: std::future::Future<Output = SyncResult<()>> + Send + 'static,
    I: Fn(&SyncConfig) -> chrono::Duration + Send + Sync + 'static,
{
    tokio::spawn(async move {
        loop {
            let wait = interval_of(&ctx.config().await).to_std().unwrap_or(StdDuration::from_secs(60));
            tokio::time::sleep(wait).await;
            if let Err(err) = run(ctx.clone()).await {
                error!(job = name, error = %err, "scheduled job failed");
            }
        }
    })
}

/// `periodic_sync` (4.5): single-flight per calendar, enumerating every
/// active attachment and every user's main calendar. Also guarded by the
/// per-job DB lock so two processes never enumerate and dispatch at once.
pub async fn run_periodic_sync(ctx: Arc<SchedulerContext>) -> SyncResult<()> {
    with_job_lock(&ctx, JOB_PERIODIC_SYNC, |ctx, config| async move {
        for attachment in AttachmentRepository::find_all_active(&ctx.pool).await.map_err(SyncError::from)? {
            let Some(_guard) = ctx.calendar_locks.try_lock(&CalendarKey::Client(attachment.id)) else {
                continue;
            };
            if let Err(err) = sync_one_attachment(&ctx, &config, &attachment).await {
                error!(attachment = %attachment.id, error = %err, "calendar sync failed");
            }
        }

        for user in UserRepository::list_with_main_calendar(&ctx.pool).await.map_err(SyncError::from)? {
            let Some(_guard) = ctx.calendar_locks.try_lock(&CalendarKey::Main(user.id)) else {
                continue;
            };
            if let Err(err) = sync_one_main_calendar(&ctx, &config, user.id).await {
                error!(user = %user.id, error = %err, "main calendar sync failed");
            }
        }

        Ok(())
    })
    .await
}

/// Triggers sync for exactly one client attachment, honoring the same
/// single-flight guard as the periodic job.
/// Manual- and webhook-triggered entry point for one client attachment.
/// Checked against `sync_paused` up front (4.5/6): a paused deployment
/// still acknowledges the webhook that triggered this, it just skips the
/// work, same as the periodic job's `with_job_lock` pause check.
pub async fn trigger_sync_for_calendar(ctx: &SchedulerContext, attachment_id: shared::AttachmentId) -> SyncResult<bool> {
    let config = ctx.config().await;
    if config.sync_paused {
        return Ok(false);
    }
    let Some(attachment) = AttachmentRepository::find_by_id(&ctx.pool, attachment_id)
        .await
        .map_err(SyncError::from)?
    else {
        return Ok(false);
    };
    let Some(_guard) = ctx.calendar_locks.try_lock(&CalendarKey::Client(attachment_id)) else {
        return Ok(false);
    };
    sync_one_attachment(ctx, &config, &attachment).await?;
    Ok(true)
}

pub async fn trigger_sync_for_main_calendar(ctx: &SchedulerContext, user_id: shared::UserId) -> SyncResult<bool> {
    let config = ctx.config().await;
    if config.sync_paused {
        return Ok(false);
    }
    let Some(_guard) = ctx.calendar_locks.try_lock(&CalendarKey::Main(user_id)) else {
        return Ok(false);
    };
    sync_one_main_calendar(ctx, &config, user_id).await?;
    Ok(true)
}

pub async fn trigger_sync_for_user(ctx: &SchedulerContext, user_id: shared::UserId) -> SyncResult<()> {
    if ctx.config().await.sync_paused {
        return Ok(());
    }
    trigger_sync_for_main_calendar(ctx, user_id).await?;
    for attachment in AttachmentRepository::find_active_by_user(&ctx.pool, user_id).await.map_err(SyncError::from)? {
        trigger_sync_for_calendar(ctx, attachment.id).await?;
    }
    Ok(())
}

async fn sync_one_attachment(
    ctx: &SchedulerContext,
    config: &SyncConfig,
    attachment: &db::CalendarAttachment,
) -> SyncResult<()> {
    let gateway = ctx.gateways.for_attachment(attachment).await?;
    let state = db::SyncStateRepository::get_or_create(&ctx.pool, attachment.id)
        .await
        .map_err(SyncError::from)?;

    let batch = ingestor::ingest(gateway.as_ref(), &attachment.remote_calendar_id, state.sync_token.as_deref())
        .await?;

    let failures =
        engine::process_client_batch(&ctx.pool, config, ctx.gateways.as_ref(), attachment.user_id, attachment, batch.events)
            .await;

    if failures.is_empty() {
        db::SyncStateRepository::record_success(
            &ctx.pool,
            attachment.id,
            batch.next_sync_token.as_deref(),
            batch.was_full_resync,
        )
        .await
        .map_err(SyncError::from)?;
        crate::metrics::record_sync_success("client");
    } else {
        let summary = failures.iter().map(|(id, err)| format!("{id}: {err}")).collect::<Vec<_>>().join("; ");
        warn!(attachment = %attachment.id, failures = failures.len(), "partial sync failure, token not advanced");
        let count = db::SyncStateRepository::record_failure(&ctx.pool, attachment.id, &summary)
            .await
            .map_err(SyncError::from)?;
        crate::metrics::record_sync_failure("client");
        maybe_alert_unhealthy(ctx, config, attachment.user_id, &attachment.id.to_string(), count).await;
    }

    Ok(())
}

async fn sync_one_main_calendar(ctx: &SchedulerContext, config: &SyncConfig, user_id: shared::UserId) -> SyncResult<()> {
    let (gateway, main_calendar_id) = ctx.gateways.for_main(user_id).await?;
    let state = db::SyncStateRepository::get_main_or_create(&ctx.pool, user_id).await.map_err(SyncError::from)?;

    let batch = ingestor::ingest(gateway.as_ref(), &main_calendar_id, state.sync_token.as_deref()).await?;

    let mut failures = Vec::new();
    for event in batch.events {
        let event_id = event.id.clone();
        if let Err(err) = dispatch_main_event(ctx, config, user_id, &main_calendar_id, event).await {
            error!(user = %user_id, event = %event_id, error = %err, "main event dispatch failed");
            failures.push((event_id, err));
        }
    }

    if failures.is_empty() {
        db::SyncStateRepository::record_main_success(
            &ctx.pool,
            user_id,
            batch.next_sync_token.as_deref(),
            batch.was_full_resync,
        )
        .await
        .map_err(SyncError::from)?;
        crate::metrics::record_sync_success("main");
    } else {
        let summary = failures.iter().map(|(id, err)| format!("{id}: {err}")).collect::<Vec<_>>().join("; ");
        let count = db::SyncStateRepository::record_main_failure(&ctx.pool, user_id, &summary)
            .await
            .map_err(SyncError::from)?;
        crate::metrics::record_sync_failure("main");
        maybe_alert_unhealthy(ctx, config, user_id, "main calendar", count).await;
    }

    Ok(())
}

/// Main-origin dispatch (4.3.b): a user-edited event on the main calendar
/// is tracked as its own mapping (origin_kind = Main) and fanned out as
/// busy blocks, mirroring the client-origin path without a second copy.
async fn dispatch_main_event(
    ctx: &SchedulerContext,
    config: &SyncConfig,
    user_id: shared::UserId,
    _main_calendar_id: &str,
    event: gateway::Event,
) -> SyncResult<()> {
    if gateway::is_our_event(&event) {
        return Ok(());
    }

    let mapping = MappingRepository::find_by_origin(&ctx.pool, user_id, None, &event.id)
        .await
        .map_err(SyncError::from)?;

    let mapping = match (mapping, event.status == gateway::EventStatus::Cancelled) {
        (Some(existing), true) => {
            for block in db::BusyBlockRepository::find_for_mapping(&ctx.pool, existing.id).await.map_err(SyncError::from)? {
                if let Some(attachment) = AttachmentRepository::find_by_id(&ctx.pool, block.attachment_id)
                    .await
                    .map_err(SyncError::from)?
                {
                    if let Ok(gateway) = ctx.gateways.for_attachment(&attachment).await {
                        let _ = gateway.delete_event(&attachment.remote_calendar_id, &block.busy_block_event_id).await;
                    }
                }
                db::BusyBlockRepository::delete(&ctx.pool, block.id).await.map_err(SyncError::from)?;
            }
            MappingRepository::hard_delete(&ctx.pool, existing.id).await.map_err(SyncError::from)?;
            return Ok(());
        }
        (_, true) => return Ok(()),
        (_existing, false) => {
            let upserted = MappingRepository::upsert(
                &ctx.pool,
                db::UpsertMapping {
                    user_id,
                    origin_kind: shared::OriginKind::Main,
                    origin_calendar: None,
                    origin_event_id: event.id.clone(),
                    origin_recurring_event_id: None,
                    main_event_id: event.id.clone(),
                    event_start: event.start.to_utc().map_err(|e| SyncError::Other(e.to_string()))?,
                    event_end: event.end.to_utc().map_err(|e| SyncError::Other(e.to_string()))?,
                    is_all_day: event.all_day,
                    is_recurring: event.is_recurring(),
                    user_can_edit: true,
                },
            )
            .await
            .map_err(SyncError::from)?;
            upserted
        }
    };

    engine::fan_out_busy_blocks(&ctx.pool, config, ctx.gateways.as_ref(), user_id, &mapping, None, &event).await
}

async fn maybe_alert_unhealthy(ctx: &SchedulerContext, config: &SyncConfig, user_id: shared::UserId, label: &str, failures: i32) {
    if failures < config.alert_failure_threshold {
        return;
    }
    let _ = AlertRepository::queue_deduped(
        &ctx.pool,
        CreateAlert {
            user_id,
            subject: format!("sync failing for {label}"),
            body: format!("{label} has failed to sync {failures} times in a row"),
        },
        config.alert_dedup_window(),
    )
    .await;
}

/// `consistency_check` (4.5): wraps [`reconcile::run_consistency_check`] in
/// the per-job DB lock.
pub async fn run_consistency_check(ctx: Arc<SchedulerContext>) -> SyncResult<()> {
    with_job_lock(&ctx, JOB_CONSISTENCY_CHECK, |ctx, config| async move {
        reconcile::run_consistency_check(&ctx.pool, &config, ctx.gateways.as_ref()).await
    })
    .await
}

/// `webhook_renewal` (4.5): create-then-stop, never the reverse, so a
/// calendar is never left unwatched between the two calls.
pub async fn run_webhook_renewal(ctx: Arc<SchedulerContext>) -> SyncResult<()> {
    with_job_lock(&ctx, JOB_WEBHOOK_RENEWAL, |ctx, config| async move {
        let expiring = WebhookChannelRepository::find_expiring(&ctx.pool, config.webhook_renewal_window())
            .await
            .map_err(SyncError::from)?;
        for channel in expiring {
            match ctx.webhook_renewer.renew(&channel).await {
                Ok(new_channel) => {
                    WebhookChannelRepository::create(
                        &ctx.pool,
                        db::CreateWebhookChannel {
                            user_id: new_channel.user_id,
                            calendar_kind: new_channel.calendar_kind,
                            attachment_id: new_channel.attachment_id,
                            channel_id: new_channel.channel_id,
                            resource_id: new_channel.resource_id,
                            token: new_channel.token,
                            expiration: new_channel.expiration,
                        },
                    )
                    .await
                    .map_err(SyncError::from)?;
                    WebhookChannelRepository::delete(&ctx.pool, channel.id).await.map_err(SyncError::from)?;
                }
                Err(err) => error!(channel = %channel.id, error = %err, "webhook renewal failed"),
            }
        }
        Ok(())
    })
    .await
}

/// `token_refresh` (4.5): proactive refresh within the configured window,
/// bounded retries for transient failures, immediate surface for
/// `invalid_grant`.
pub async fn run_token_refresh(ctx: Arc<SchedulerContext>) -> SyncResult<()> {
    with_job_lock(&ctx, JOB_TOKEN_REFRESH, |ctx, config| async move {
        let expiring = CredentialRepository::find_expiring(&ctx.pool, config.token_refresh_window())
            .await
            .map_err(SyncError::from)?;
        for credential in expiring {
            refresh_one_credential(&ctx, &config, &credential).await;
        }
        Ok(())
    })
    .await
}

async fn refresh_one_credential(ctx: &Arc<SchedulerContext>, config: &SyncConfig, credential: &AccountCredential) {
    let gateways = ctx.gateways.clone();
    let cred = credential.clone();
    let result = retry(
        || {
            let gateways = gateways.clone();
            let cred = cred.clone();
            async move { gateways.refresh_credential(&cred).await }
        },
        |err| !matches!(err, SyncError::Gateway(gateway::GatewayError::TokenRevoked)),
        TOKEN_REFRESH_BACKOFF,
    )
    .await;

    if let Err(SyncError::Gateway(gateway::GatewayError::TokenRevoked)) = result {
        let _ = AlertRepository::queue_deduped(
            &ctx.pool,
            CreateAlert {
                user_id: credential.user_id,
                subject: "calendar access revoked".to_string(),
                body: format!("re-authentication is required for account {}", credential.remote_account_id),
            },
            config.alert_dedup_window(),
        )
        .await;
    } else if let Err(err) = result {
        error!(credential = %credential.id, error = %err, "token refresh failed after retries");
    }
}

/// `alert_process` (4.5): attempt/backoff delivery of queued alerts,
/// deduplicated at insert time.
pub async fn run_alert_process(ctx: Arc<SchedulerContext>) -> SyncResult<()> {
    with_job_lock(&ctx, JOB_ALERT_PROCESS, |ctx, _config| async move {
        for alert in AlertRepository::find_undelivered(&ctx.pool, 100).await.map_err(SyncError::from)? {
            AlertRepository::record_attempt(&ctx.pool, alert.id).await.map_err(SyncError::from)?;
            match ctx.alert_transport.deliver(&alert).await {
                Ok(()) => {
                    AlertRepository::mark_delivered(&ctx.pool, alert.id).await.map_err(SyncError::from)?;
                }
                Err(err) => warn!(alert = %alert.id, error = %err, "alert delivery failed, will retry"),
            }
        }
        Ok(())
    })
    .await
}

/// `backup` (4.5/4.6): create today's archive and prune surplus per
/// [`backup::apply_retention`].
pub async fn run_backup(ctx: Arc<SchedulerContext>) -> SyncResult<()> {
    with_job_lock(&ctx, JOB_BACKUP, |ctx, _config| async move {
        let outcome = backup::create_backup(
            &ctx.pool,
            ctx.gateways.as_ref(),
            &ctx.backup_dir,
            &ctx.database_url,
            None,
            chrono::Utc::now(),
        )
        .await?;
        info!(backup = %outcome.metadata.id, users = outcome.metadata.users.len(), "backup created");
        let deleted = backup::apply_retention(&ctx.backup_dir)?;
        if !deleted.is_empty() {
            info!(count = deleted.len(), "pruned surplus backups");
        }
        Ok(())
    })
    .await
}

/// `retention_cleanup` (4.5): aged mapping, alert, and disconnected-
/// attachment rows.
pub async fn run_retention_cleanup(ctx: Arc<SchedulerContext>) -> SyncResult<()> {
    with_job_lock(&ctx, JOB_RETENTION_CLEANUP, |ctx, config| async move {
        for mapping in MappingRepository::find_for_retention(&ctx.pool, config.retention_cutoff_mapping())
            .await
            .map_err(SyncError::from)?
        {
            reconcile::drop_mapping_and_busy_blocks(&ctx.pool, ctx.gateways.as_ref(), &mapping).await?;
        }

        let stale_alerts = AlertRepository::delete_stale(&ctx.pool, chrono::Duration::days(config.retention_alert_days))
            .await
            .map_err(SyncError::from)?;
        if stale_alerts > 0 {
            info!(count = stale_alerts, "deleted stale alerts");
        }

        for attachment in AttachmentRepository::find_long_disconnected(
            &ctx.pool,
            chrono::Duration::days(config.retention_disconnected_attachment_days),
        )
        .await
        .map_err(SyncError::from)?
        {
            WebhookChannelRepository::delete_for_attachment(&ctx.pool, attachment.id)
                .await
                .map_err(SyncError::from)?;
            AttachmentRepository::delete(&ctx.pool, attachment.id).await.map_err(SyncError::from)?;
        }

        Ok(())
    })
    .await
}

async fn with_job_lock<F, Fut>(ctx: &Arc<SchedulerContext>, job_name: &str, run: F) -> SyncResult<()>
where
    F: FnOnce(Arc<SchedulerContext>, SyncConfig) -> Fut,
    Fut: std::future::Future<Output = SyncResult<()>>,
{
    let config = ctx.config().await;
    if config.sync_paused {
        return Ok(());
    }

    let holder = format!("{}-{}", ctx.holder_id, Uuid::new_v4());
    let acquired = JobLock::try_acquire(&ctx.pool, job_name, &holder, config.job_lock_reclaim_timeout())
        .await
        .map_err(SyncError::from)?;
    if !acquired {
        return Ok(());
    }

    let result = run(ctx.clone(), config).await;
    JobLock::release(&ctx.pool, job_name, &holder).await.map_err(SyncError::from)?;
    result
}
