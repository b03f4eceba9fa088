use chrono::{DateTime, Utc};
use serde::Serialize;
use shared::{AttachmentId, BusyBlockId, MappingId};
use sqlx::FromRow;

/// An opaque artifact this system wrote on a client attachment to express
/// unavailability derived from some other mapping. Unique per
/// (mapping_id, attachment_id); the row exists iff the remote artifact was
/// successfully created or observed there, and is deleted only after
/// remote deletion is confirmed (or confirmed gone).
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct BusyBlock {
    pub id: BusyBlockId,
    pub mapping_id: MappingId,
    pub attachment_id: AttachmentId,
    pub busy_block_event_id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct CreateBusyBlock {
    pub mapping_id: MappingId,
    pub attachment_id: AttachmentId,
    pub busy_block_event_id: String,
}
