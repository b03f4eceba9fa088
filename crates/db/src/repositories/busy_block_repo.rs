use shared::{AttachmentId, BusyBlockId, MappingId};
use sqlx::PgPool;

use crate::models::{BusyBlock, CreateBusyBlock};

pub struct BusyBlockRepository;

impl BusyBlockRepository {
    pub async fn create(pool: &PgPool, input: CreateBusyBlock) -> Result<BusyBlock, sqlx::Error> {
        sqlx::query_as::<_, BusyBlock>(
            r#"
            INSERT INTO busy_blocks (id, mapping_id, attachment_id, busy_block_event_id)
            VALUES ($1, $2, $3, $4)
            RETURNING *
            "#,
        )
        .bind(BusyBlockId::new().as_uuid())
        .bind(input.mapping_id.as_uuid())
        .bind(input.attachment_id.as_uuid())
        .bind(&input.busy_block_event_id)
        .fetch_one(pool)
        .await
    }

    pub async fn find_for_mapping_and_attachment(
        pool: &PgPool,
        mapping_id: MappingId,
        attachment_id: AttachmentId,
    ) -> Result<Option<BusyBlock>, sqlx::Error> {
        sqlx::query_as::<_, BusyBlock>(
            "SELECT * FROM busy_blocks WHERE mapping_id = $1 AND attachment_id = $2",
        )
        .bind(mapping_id.as_uuid())
        .bind(attachment_id.as_uuid())
        .fetch_optional(pool)
        .await
    }

    pub async fn find_for_mapping(
        pool: &PgPool,
        mapping_id: MappingId,
    ) -> Result<Vec<BusyBlock>, sqlx::Error> {
        sqlx::query_as::<_, BusyBlock>("SELECT * FROM busy_blocks WHERE mapping_id = $1")
            .bind(mapping_id.as_uuid())
            .fetch_all(pool)
            .await
    }

    /// Every busy-block row written *onto* this attachment by other
    /// mappings, the set that must be removed on disconnect (spec.md 4.3.d).
    pub async fn find_on_attachment(
        pool: &PgPool,
        attachment_id: AttachmentId,
    ) -> Result<Vec<BusyBlock>, sqlx::Error> {
        sqlx::query_as::<_, BusyBlock>("SELECT * FROM busy_blocks WHERE attachment_id = $1")
            .bind(attachment_id.as_uuid())
            .fetch_all(pool)
            .await
    }

    /// Used after create-then-repoint: the remote id changes but the row's
    /// identity (mapping, attachment) does not.
    pub async fn repoint(
        pool: &PgPool,
        id: BusyBlockId,
        new_remote_id: &str,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE busy_blocks SET busy_block_event_id = $2, updated_at = NOW() WHERE id = $1",
        )
        .bind(id.as_uuid())
        .bind(new_remote_id)
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn delete(pool: &PgPool, id: BusyBlockId) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM busy_blocks WHERE id = $1")
            .bind(id.as_uuid())
            .execute(pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn delete_bulk(pool: &PgPool, ids: &[BusyBlockId]) -> Result<u64, sqlx::Error> {
        if ids.is_empty() {
            return Ok(0);
        }
        let uuids: Vec<uuid::Uuid> = ids.iter().map(|id| *id.as_uuid()).collect();
        let result = sqlx::query("DELETE FROM busy_blocks WHERE id = ANY($1)")
            .bind(&uuids)
            .execute(pool)
            .await?;
        Ok(result.rows_affected())
    }

    pub async fn delete_for_mapping(
        pool: &PgPool,
        mapping_id: MappingId,
    ) -> Result<u64, sqlx::Error> {
        let result = sqlx::query("DELETE FROM busy_blocks WHERE mapping_id = $1")
            .bind(mapping_id.as_uuid())
            .execute(pool)
            .await?;
        Ok(result.rows_affected())
    }
}
