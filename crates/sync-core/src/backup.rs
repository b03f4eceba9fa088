//! Consistency & Rollback (4.6), continued: backup archive assembly,
//! retention, and restore.
//!
//! A backup archive is a ZIP containing `metadata.json`, a `database.db`
//! image (a `pg_dump --format=custom` capture, the Postgres analogue of an
//! "online backup" primitive that snapshots a live database without
//! blocking it), and one `snapshots/<user-id>.json` per captured user: the
//! fixed-allowlist view of every managed event on that user's main calendar
//! and active attachments.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Datelike, NaiveDate, Utc, Weekday};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use tokio::process::Command;
use tracing::warn;
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use db::{
    AttachmentRepository, BusyBlockRepository, CalendarAttachment, MappingRepository, SyncStateRepository,
    UserRepository,
};
use gateway::{is_our_event, CalendarGateway, EventWrite, GatewayError, ListOutcome};
use shared::{AttachmentId, TimeSpec, UserId};

use crate::engine::GatewayFactory;
use crate::error::{SyncError, SyncResult};

const KEEP_DAILY: usize = 7;
const KEEP_WEEKLY: usize = 2;
const KEEP_MONTHLY: usize = 6;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackupType {
    Daily,
    Weekly,
    Monthly,
}

impl BackupType {
    /// day==1 takes precedence over weekday, per spec.md 4.6.
    pub fn classify_date(date: NaiveDate) -> BackupType {
        if date.day() == 1 {
            BackupType::Monthly
        } else if date.weekday() == Weekday::Sun {
            BackupType::Weekly
        } else {
            BackupType::Daily
        }
    }

    fn keep_count(self) -> usize {
        match self {
            BackupType::Daily => KEEP_DAILY,
            BackupType::Weekly => KEEP_WEEKLY,
            BackupType::Monthly => KEEP_MONTHLY,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupMetadata {
    pub id: String,
    pub backup_type: BackupType,
    pub created_at: DateTime<Utc>,
    pub users: Vec<UserId>,
    pub event_counts: HashMap<UserId, usize>,
    pub errors: Vec<String>,
}

/// Returns the surplus backups (oldest past the keep-count per type) that
/// retention should delete. Pure: the caller decides how to remove them.
pub fn retention_plan(mut metadata: Vec<BackupMetadata>) -> Vec<BackupMetadata> {
    metadata.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    let mut keep = std::collections::HashSet::new();
    for kind in [BackupType::Daily, BackupType::Weekly, BackupType::Monthly] {
        for m in metadata.iter().filter(|m| m.backup_type == kind).take(kind.keep_count()) {
            keep.insert(m.id.clone());
        }
    }
    metadata.into_iter().filter(|m| !keep.contains(&m.id)).collect()
}

/// The fixed allowlist of event fields a snapshot records: identifiers,
/// times, recurrence, and descriptive fields, per spec.md 4.6.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotEvent {
    pub id: String,
    pub start: TimeSpec,
    pub end: TimeSpec,
    pub all_day: bool,
    pub recurrence: Vec<String>,
    pub recurring_event_id: Option<String>,
    pub original_start_time: Option<TimeSpec>,
    pub summary: Option<String>,
    pub description: Option<String>,
    pub location: Option<String>,
    pub extended_private: HashMap<String, String>,
}

impl SnapshotEvent {
    fn from_event(event: &gateway::Event) -> Self {
        Self {
            id: event.id.clone(),
            start: event.start.clone(),
            end: event.end.clone(),
            all_day: event.all_day,
            recurrence: event.recurrence.clone(),
            recurring_event_id: event.recurring_event_id.clone(),
            original_start_time: event.original_start_time.clone(),
            summary: event.summary.clone(),
            description: event.description.clone(),
            location: event.location.clone(),
            extended_private: event.extended_private.clone(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CalendarSnapshot {
    pub calendar_id: String,
    pub events: Vec<SnapshotEvent>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UserSnapshot {
    pub user_id: UserId,
    pub main: Option<CalendarSnapshot>,
    pub attachments: HashMap<AttachmentId, CalendarSnapshot>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SnapshotOp {
    Create(SnapshotEvent),
    Update(SnapshotEvent),
    Delete(String),
}

/// The minimum set of create/update/delete operations turning `current`
/// into `target`, per spec.md 4.6's restore reconciliation step.
pub fn diff_calendar_snapshot(target: &CalendarSnapshot, current: &CalendarSnapshot) -> Vec<SnapshotOp> {
    let mut ops = Vec::new();
    let current_by_id: HashMap<&str, &SnapshotEvent> =
        current.events.iter().map(|e| (e.id.as_str(), e)).collect();
    let target_ids: std::collections::HashSet<&str> = target.events.iter().map(|e| e.id.as_str()).collect();

    for event in &target.events {
        match current_by_id.get(event.id.as_str()) {
            None => ops.push(SnapshotOp::Create(event.clone())),
            Some(live) if !snapshot_fields_match(event, live) => ops.push(SnapshotOp::Update(event.clone())),
            Some(_) => {}
        }
    }
    for event in &current.events {
        if !target_ids.contains(event.id.as_str()) {
            ops.push(SnapshotOp::Delete(event.id.clone()));
        }
    }
    ops
}

fn snapshot_fields_match(a: &SnapshotEvent, b: &SnapshotEvent) -> bool {
    a.start == b.start
        && a.end == b.end
        && a.all_day == b.all_day
        && a.recurrence == b.recurrence
        && a.summary == b.summary
        && a.description == b.description
        && a.location == b.location
}

fn snapshot_to_write(event: &SnapshotEvent) -> EventWrite {
    EventWrite {
        summary: event.summary.clone(),
        description: event.description.clone(),
        location: event.location.clone(),
        start: Some(event.start.clone()),
        end: Some(event.end.clone()),
        transparency: None,
        visibility_private: false,
        recurrence: event.recurrence.clone(),
        color_id: None,
    }
}

async fn list_all_events(gateway: &dyn CalendarGateway, calendar_id: &str) -> SyncResult<Vec<gateway::Event>> {
    match gateway.list_events(calendar_id, None).await? {
        ListOutcome::Ok(page) => Ok(page.events),
        ListOutcome::TokenExpired => Ok(Vec::new()),
    }
}

async fn capture_calendar_snapshot(gateway: &dyn CalendarGateway, calendar_id: &str) -> SyncResult<CalendarSnapshot> {
    let events = list_all_events(gateway, calendar_id).await?;
    Ok(CalendarSnapshot {
        calendar_id: calendar_id.to_string(),
        events: events.iter().filter(|e| is_our_event(e)).map(SnapshotEvent::from_event).collect(),
    })
}

/// Assembles a point-in-time snapshot of every managed event this system
/// owns for `user_id`: the main calendar and every active attachment.
pub async fn capture_user_snapshot(
    pool: &PgPool,
    gateways: &dyn GatewayFactory,
    user_id: UserId,
) -> SyncResult<UserSnapshot> {
    let user = UserRepository::find_by_id(pool, user_id)
        .await
        .map_err(SyncError::from)?
        .ok_or_else(|| SyncError::Other(format!("user {user_id} not found")))?;

    let mut snapshot = UserSnapshot { user_id, main: None, attachments: HashMap::new() };

    if user.has_main_calendar() {
        let (main_gateway, main_calendar_id) = gateways.for_main(user_id).await?;
        snapshot.main = Some(capture_calendar_snapshot(main_gateway.as_ref(), &main_calendar_id).await?);
    }

    for attachment in AttachmentRepository::find_active_by_user(pool, user_id).await.map_err(SyncError::from)? {
        let gateway = gateways.for_attachment(&attachment).await?;
        let calendar = capture_calendar_snapshot(gateway.as_ref(), &attachment.remote_calendar_id).await?;
        snapshot.attachments.insert(attachment.id, calendar);
    }

    Ok(snapshot)
}

fn zip_err(err: zip::result::ZipError) -> SyncError {
    SyncError::Other(format!("archive error: {err}"))
}

async fn dump_database_image(database_url: &str) -> SyncResult<PathBuf> {
    let path = std::env::temp_dir().join(format!("sync-core-dump-{}.pgdump", uuid::Uuid::new_v4()));
    let status = Command::new("pg_dump")
        .arg("--format=custom")
        .arg("--file")
        .arg(&path)
        .arg(database_url)
        .status()
        .await
        .map_err(|err| SyncError::Other(format!("spawning pg_dump: {err}")))?;
    if !status.success() {
        return Err(SyncError::Other(format!("pg_dump exited with {status}")));
    }
    Ok(path)
}

async fn restore_database_image(db_image: &Path, database_url: &str) -> SyncResult<()> {
    let status = Command::new("pg_restore")
        .arg("--clean")
        .arg("--if-exists")
        .arg("--no-owner")
        .arg("--dbname")
        .arg(database_url)
        .arg(db_image)
        .status()
        .await
        .map_err(|err| SyncError::Other(format!("spawning pg_restore: {err}")))?;
    if !status.success() {
        return Err(SyncError::Other(format!("pg_restore exited with {status}")));
    }
    Ok(())
}

fn write_archive(
    archive_path: &Path,
    metadata: &BackupMetadata,
    db_image: &Path,
    snapshots: &[UserSnapshot],
) -> SyncResult<()> {
    let file = std::fs::File::create(archive_path).map_err(|err| SyncError::Other(err.to_string()))?;
    let mut zip = ZipWriter::new(file);
    let options = FileOptions::default().compression_method(CompressionMethod::Deflated);

    zip.start_file("metadata.json", options).map_err(zip_err)?;
    let metadata_json = serde_json::to_vec_pretty(metadata).map_err(|err| SyncError::Other(err.to_string()))?;
    std::io::Write::write_all(&mut zip, &metadata_json).map_err(|err| SyncError::Other(err.to_string()))?;

    zip.start_file("database.db", options).map_err(zip_err)?;
    let mut db_file = std::fs::File::open(db_image).map_err(|err| SyncError::Other(err.to_string()))?;
    std::io::copy(&mut db_file, &mut zip).map_err(|err| SyncError::Other(err.to_string()))?;

    for snapshot in snapshots {
        zip.start_file(format!("snapshots/{}.json", snapshot.user_id), options).map_err(zip_err)?;
        let bytes = serde_json::to_vec_pretty(snapshot).map_err(|err| SyncError::Other(err.to_string()))?;
        std::io::Write::write_all(&mut zip, &bytes).map_err(|err| SyncError::Other(err.to_string()))?;
    }

    zip.finish().map_err(zip_err)?;
    Ok(())
}

pub struct CreateBackupOutcome {
    pub metadata: BackupMetadata,
    pub archive_path: PathBuf,
}

/// Creates a backup archive covering `user_ids` (every user with a main
/// calendar when `None`) and writes it under `backup_dir`.
pub async fn create_backup(
    pool: &PgPool,
    gateways: &dyn GatewayFactory,
    backup_dir: &Path,
    database_url: &str,
    user_ids: Option<Vec<UserId>>,
    created_at: DateTime<Utc>,
) -> SyncResult<CreateBackupOutcome> {
    let targets = match user_ids {
        Some(ids) => ids,
        None => UserRepository::list_with_main_calendar(pool)
            .await
            .map_err(SyncError::from)?
            .into_iter()
            .map(|u| u.id)
            .collect(),
    };

    let mut event_counts = HashMap::new();
    let mut errors = Vec::new();
    let mut snapshots = Vec::new();
    for user_id in &targets {
        match capture_user_snapshot(pool, gateways, *user_id).await {
            Ok(snapshot) => {
                let count = snapshot.main.as_ref().map_or(0, |c| c.events.len())
                    + snapshot.attachments.values().map(|c| c.events.len()).sum::<usize>();
                event_counts.insert(*user_id, count);
                snapshots.push(snapshot);
            }
            Err(err) => errors.push(format!("user {user_id}: {err}")),
        }
    }

    let db_image = dump_database_image(database_url).await?;
    std::fs::create_dir_all(backup_dir).map_err(|err| SyncError::Other(format!("creating backup dir: {err}")))?;

    let id = format!("backup-{}", created_at.format("%Y%m%dT%H%M%SZ"));
    let metadata = BackupMetadata {
        id: id.clone(),
        backup_type: BackupType::classify_date(created_at.date_naive()),
        created_at,
        users: targets,
        event_counts,
        errors,
    };
    let archive_path = backup_dir.join(format!("{id}.zip"));
    write_archive(&archive_path, &metadata, &db_image, &snapshots)?;
    let _ = std::fs::remove_file(&db_image);

    Ok(CreateBackupOutcome { metadata, archive_path })
}

fn read_metadata(archive_path: &Path) -> SyncResult<BackupMetadata> {
    let file = std::fs::File::open(archive_path).map_err(|err| SyncError::Other(err.to_string()))?;
    let mut archive = ZipArchive::new(file).map_err(zip_err)?;
    let mut entry = archive.by_name("metadata.json").map_err(zip_err)?;
    serde_json::from_reader(&mut entry).map_err(|err| SyncError::Other(err.to_string()))
}

pub fn list_backup_metadata(backup_dir: &Path) -> SyncResult<Vec<BackupMetadata>> {
    let mut result = Vec::new();
    let entries = match std::fs::read_dir(backup_dir) {
        Ok(entries) => entries,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(result),
        Err(err) => return Err(SyncError::Other(format!("reading backup dir: {err}"))),
    };
    for entry in entries {
        let path = entry.map_err(|err| SyncError::Other(err.to_string()))?.path();
        if path.extension().and_then(|ext| ext.to_str()) != Some("zip") {
            continue;
        }
        match read_metadata(&path) {
            Ok(metadata) => result.push(metadata),
            Err(err) => warn!(path = %path.display(), error = %err, "unreadable backup archive, skipping"),
        }
    }
    Ok(result)
}

/// Deletes surplus archives per `retention_plan`, returning the ids removed.
pub fn apply_retention(backup_dir: &Path) -> SyncResult<Vec<String>> {
    let surplus = retention_plan(list_backup_metadata(backup_dir)?);
    let mut deleted = Vec::new();
    for metadata in surplus {
        let path = backup_dir.join(format!("{}.zip", metadata.id));
        if std::fs::remove_file(&path).is_ok() {
            deleted.push(metadata.id);
        }
    }
    Ok(deleted)
}

fn read_snapshots(archive_path: &Path) -> SyncResult<Vec<UserSnapshot>> {
    let file = std::fs::File::open(archive_path).map_err(|err| SyncError::Other(err.to_string()))?;
    let mut archive = ZipArchive::new(file).map_err(zip_err)?;
    let names: Vec<String> = (0..archive.len())
        .filter_map(|i| archive.by_index(i).ok().map(|f| f.name().to_string()))
        .filter(|name| name.starts_with("snapshots/") && name.ends_with(".json"))
        .collect();
    let mut snapshots = Vec::new();
    for name in names {
        let mut entry = archive.by_name(&name).map_err(zip_err)?;
        snapshots.push(serde_json::from_reader(&mut entry).map_err(|err| SyncError::Other(err.to_string()))?);
    }
    Ok(snapshots)
}

#[derive(Debug, Default)]
pub struct RestoreOutcome {
    pub db_restored: bool,
    pub planned_ops: HashMap<UserId, Vec<SnapshotOp>>,
    pub errors: Vec<String>,
}

/// Restore flow (4.6). A full restore (`user_ids: None`) replaces the
/// entire database image via `pg_restore`; a per-user restore only applies
/// the calendar reconciliation below, leaving the DB image untouched (see
/// DESIGN.md for why per-user row-level DB restore is out of scope here).
#[allow(clippy::too_many_arguments)]
pub async fn restore_from_backup(
    pool: &PgPool,
    gateways: &dyn GatewayFactory,
    archive_path: &Path,
    database_url: &str,
    user_ids: Option<Vec<UserId>>,
    restore_db: bool,
    restore_calendars: bool,
    dry_run: bool,
) -> SyncResult<RestoreOutcome> {
    let metadata = read_metadata(archive_path)?;
    let snapshots = read_snapshots(archive_path)?;
    let full_restore = user_ids.is_none();
    let targets = user_ids.unwrap_or_else(|| metadata.users.clone());

    let mut outcome = RestoreOutcome::default();

    if restore_db && full_restore && !dry_run {
        let db_image = extract_database_image(archive_path)?;
        restore_database_image(&db_image, database_url).await?;
        let _ = std::fs::remove_file(&db_image);
        outcome.db_restored = true;
    }

    if restore_calendars {
        for user_id in &targets {
            let Some(backup_snapshot) = snapshots.iter().find(|s| s.user_id == *user_id) else {
                outcome.errors.push(format!("no snapshot for user {user_id} in archive"));
                continue;
            };
            match reconcile_user_snapshot(pool, gateways, backup_snapshot, dry_run).await {
                Ok(ops) => {
                    outcome.planned_ops.insert(*user_id, ops);
                }
                Err(err) => outcome.errors.push(format!("user {user_id}: {err}")),
            }
        }
    }

    if !dry_run {
        for user_id in &targets {
            if let Err(err) = clear_sync_tokens_for_user(pool, *user_id).await {
                outcome.errors.push(format!("clearing sync tokens for {user_id}: {err}"));
            }
        }
    }

    Ok(outcome)
}

fn extract_database_image(archive_path: &Path) -> SyncResult<PathBuf> {
    let file = std::fs::File::open(archive_path).map_err(|err| SyncError::Other(err.to_string()))?;
    let mut archive = ZipArchive::new(file).map_err(zip_err)?;
    let mut entry = archive.by_name("database.db").map_err(zip_err)?;
    let temp_path = std::env::temp_dir().join(format!("sync-core-restore-{}.pgdump", uuid::Uuid::new_v4()));
    let mut out = std::fs::File::create(&temp_path).map_err(|err| SyncError::Other(err.to_string()))?;
    std::io::copy(&mut entry, &mut out).map_err(|err| SyncError::Other(err.to_string()))?;
    Ok(temp_path)
}

async fn clear_sync_tokens_for_user(pool: &PgPool, user_id: UserId) -> SyncResult<()> {
    SyncStateRepository::clear_main_token(pool, user_id).await.map_err(SyncError::from)?;
    for attachment in AttachmentRepository::find_active_by_user(pool, user_id).await.map_err(SyncError::from)? {
        SyncStateRepository::clear_token(pool, attachment.id).await.map_err(SyncError::from)?;
    }
    Ok(())
}

async fn reconcile_user_snapshot(
    pool: &PgPool,
    gateways: &dyn GatewayFactory,
    backup_snapshot: &UserSnapshot,
    dry_run: bool,
) -> SyncResult<Vec<SnapshotOp>> {
    let user_id = backup_snapshot.user_id;
    let mut all_ops = Vec::new();

    if let Some(backup_main) = &backup_snapshot.main {
        let (main_gateway, main_calendar_id) = gateways.for_main(user_id).await?;
        let current = capture_calendar_snapshot(main_gateway.as_ref(), &main_calendar_id).await?;
        let ops = diff_calendar_snapshot(backup_main, &current);
        if !dry_run {
            apply_main_ops(pool, main_gateway.as_ref(), &main_calendar_id, user_id, &ops).await?;
        }
        all_ops.extend(ops);
    }

    for (attachment_id, backup_calendar) in &backup_snapshot.attachments {
        let Some(attachment) = AttachmentRepository::find_by_id(pool, *attachment_id).await.map_err(SyncError::from)?
        else {
            continue;
        };
        let gateway = gateways.for_attachment(&attachment).await?;
        let current = capture_calendar_snapshot(gateway.as_ref(), &attachment.remote_calendar_id).await?;
        let ops = diff_calendar_snapshot(backup_calendar, &current);
        if !dry_run {
            apply_attachment_ops(pool, gateway.as_ref(), &attachment, &ops).await?;
        }
        all_ops.extend(ops);
    }

    Ok(all_ops)
}

async fn apply_main_ops(
    pool: &PgPool,
    gateway: &dyn CalendarGateway,
    calendar_id: &str,
    user_id: UserId,
    ops: &[SnapshotOp],
) -> SyncResult<()> {
    for op in ops {
        match op {
            SnapshotOp::Create(event) => {
                let created = gateway.create_event(calendar_id, &snapshot_to_write(event)).await?;
                repoint_main_mapping(pool, user_id, &event.id, &created.id).await?;
            }
            SnapshotOp::Update(event) => {
                let write = snapshot_to_write(event);
                match gateway.update_event(calendar_id, &event.id, &write).await {
                    Ok(_) => {}
                    Err(GatewayError::NotFound(_)) => {
                        let created = gateway.create_event(calendar_id, &write).await?;
                        repoint_main_mapping(pool, user_id, &event.id, &created.id).await?;
                    }
                    Err(other) => return Err(other.into()),
                }
            }
            SnapshotOp::Delete(event_id) => match gateway.delete_event(calendar_id, event_id).await {
                Ok(()) | Err(GatewayError::NotFound(_)) => {}
                Err(other) => return Err(other.into()),
            },
        }
    }
    Ok(())
}

async fn repoint_main_mapping(pool: &PgPool, user_id: UserId, old_event_id: &str, new_event_id: &str) -> SyncResult<()> {
    if let Some(mapping) = MappingRepository::find_by_origin(pool, user_id, None, old_event_id)
        .await
        .map_err(SyncError::from)?
    {
        MappingRepository::update_main_event_id(pool, mapping.id, new_event_id)
            .await
            .map_err(SyncError::from)?;
    }
    Ok(())
}

async fn apply_attachment_ops(
    pool: &PgPool,
    gateway: &dyn CalendarGateway,
    attachment: &CalendarAttachment,
    ops: &[SnapshotOp],
) -> SyncResult<()> {
    let blocks = BusyBlockRepository::find_on_attachment(pool, attachment.id).await.map_err(SyncError::from)?;
    for op in ops {
        match op {
            SnapshotOp::Create(event) => {
                let created = gateway
                    .create_event(&attachment.remote_calendar_id, &snapshot_to_write(event))
                    .await?;
                if let Some(block) = blocks.iter().find(|b| b.busy_block_event_id == event.id) {
                    BusyBlockRepository::repoint(pool, block.id, &created.id).await.map_err(SyncError::from)?;
                }
            }
            SnapshotOp::Update(event) => {
                let write = snapshot_to_write(event);
                match gateway.update_event(&attachment.remote_calendar_id, &event.id, &write).await {
                    Ok(_) => {}
                    Err(GatewayError::NotFound(_)) => {
                        let created = gateway.create_event(&attachment.remote_calendar_id, &write).await?;
                        if let Some(block) = blocks.iter().find(|b| b.busy_block_event_id == event.id) {
                            BusyBlockRepository::repoint(pool, block.id, &created.id)
                                .await
                                .map_err(SyncError::from)?;
                        }
                    }
                    Err(other) => return Err(other.into()),
                }
            }
            SnapshotOp::Delete(event_id) => {
                match gateway.delete_event(&attachment.remote_calendar_id, event_id).await {
                    Ok(()) | Err(GatewayError::NotFound(_)) => {}
                    Err(other) => return Err(other.into()),
                }
            }
        }
    }
    Ok(())
}

/// Startup catastrophic-recovery (4.6): if `restore_marker_path` exists at
/// boot, restore the database image it carries before the caller opens its
/// own connection pool, then archive the marker so it is not reapplied.
/// Sync tokens are cleared via a short-lived connection before returning.
pub async fn apply_startup_restore(restore_marker_path: &Path, database_url: &str) -> SyncResult<bool> {
    if !restore_marker_path.exists() {
        return Ok(false);
    }

    let db_image = extract_database_image(restore_marker_path)?;
    restore_database_image(&db_image, database_url).await?;
    let _ = std::fs::remove_file(&db_image);

    let pool = PgPool::connect(database_url).await.map_err(SyncError::from)?;
    sqlx::query("UPDATE calendar_sync_states SET sync_token = NULL")
        .execute(&pool)
        .await
        .map_err(SyncError::from)?;
    sqlx::query("UPDATE main_calendar_sync_states SET sync_token = NULL")
        .execute(&pool)
        .await
        .map_err(SyncError::from)?;
    pool.close().await;

    let applied_path = restore_marker_path.with_extension("applied.zip");
    std::fs::rename(restore_marker_path, &applied_path)
        .map_err(|err| SyncError::Other(format!("archiving restore marker: {err}")))?;
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn metadata(id: &str, backup_type: BackupType, created_at: DateTime<Utc>) -> BackupMetadata {
        BackupMetadata {
            id: id.to_string(),
            backup_type,
            created_at,
            users: Vec::new(),
            event_counts: HashMap::new(),
            errors: Vec::new(),
        }
    }

    fn at(year: i32, month: u32, day: u32) -> DateTime<Utc> {
        NaiveDate::from_ymd_opt(year, month, day)
            .unwrap()
            .and_hms_opt(3, 0, 0)
            .unwrap()
            .and_utc()
    }

    #[test]
    fn first_of_month_is_monthly_even_on_a_sunday() {
        // 2026-03-01 is a Sunday.
        assert_eq!(BackupType::classify_date(at(2026, 3, 1).date_naive()), BackupType::Monthly);
    }

    #[test]
    fn a_sunday_that_is_not_the_first_is_weekly() {
        assert_eq!(BackupType::classify_date(at(2026, 3, 8).date_naive()), BackupType::Weekly);
    }

    #[test]
    fn an_ordinary_weekday_is_daily() {
        assert_eq!(BackupType::classify_date(at(2026, 3, 10).date_naive()), BackupType::Daily);
    }

    #[test]
    fn retention_keeps_only_the_configured_count_per_type() {
        let mut backups = Vec::new();
        for day in 1..=10 {
            backups.push(metadata(&format!("daily-{day}"), BackupType::Daily, at(2026, 3, day)));
        }
        let surplus = retention_plan(backups);
        assert_eq!(surplus.len(), 3);
        for m in &surplus {
            assert!(m.id == "daily-1" || m.id == "daily-2" || m.id == "daily-3");
        }
    }

    #[test]
    fn retention_tracks_types_independently() {
        let backups = vec![
            metadata("d1", BackupType::Daily, at(2026, 3, 10)),
            metadata("w1", BackupType::Weekly, at(2026, 3, 8)),
            metadata("m1", BackupType::Monthly, at(2026, 3, 1)),
        ];
        assert!(retention_plan(backups).is_empty());
    }

    fn event(id: &str, summary: &str) -> SnapshotEvent {
        SnapshotEvent {
            id: id.to_string(),
            start: TimeSpec::Utc(at(2026, 3, 10)),
            end: TimeSpec::Utc(at(2026, 3, 10)),
            all_day: false,
            recurrence: Vec::new(),
            recurring_event_id: None,
            original_start_time: None,
            summary: Some(summary.to_string()),
            description: None,
            location: None,
            extended_private: HashMap::new(),
        }
    }

    #[test]
    fn diff_creates_events_missing_from_current() {
        let target = CalendarSnapshot { calendar_id: "cal".into(), events: vec![event("e1", "Standup")] };
        let current = CalendarSnapshot { calendar_id: "cal".into(), events: vec![] };
        let ops = diff_calendar_snapshot(&target, &current);
        assert_eq!(ops, vec![SnapshotOp::Create(event("e1", "Standup"))]);
    }

    #[test]
    fn diff_deletes_events_absent_from_target() {
        let target = CalendarSnapshot { calendar_id: "cal".into(), events: vec![] };
        let current = CalendarSnapshot { calendar_id: "cal".into(), events: vec![event("e1", "Standup")] };
        let ops = diff_calendar_snapshot(&target, &current);
        assert_eq!(ops, vec![SnapshotOp::Delete("e1".to_string())]);
    }

    #[test]
    fn diff_updates_events_whose_fields_changed() {
        let target = CalendarSnapshot { calendar_id: "cal".into(), events: vec![event("e1", "Standup (moved)")] };
        let current = CalendarSnapshot { calendar_id: "cal".into(), events: vec![event("e1", "Standup")] };
        let ops = diff_calendar_snapshot(&target, &current);
        assert_eq!(ops, vec![SnapshotOp::Update(event("e1", "Standup (moved)"))]);
    }

    #[test]
    fn diff_is_empty_when_snapshots_match() {
        let target = CalendarSnapshot { calendar_id: "cal".into(), events: vec![event("e1", "Standup")] };
        let current = target.clone();
        assert!(diff_calendar_snapshot(&target, &current).is_empty());
    }
}
