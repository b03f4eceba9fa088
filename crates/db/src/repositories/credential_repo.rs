use chrono::{DateTime, Utc};
use shared::CredentialId;
use sqlx::PgPool;

use crate::models::{AccountCredential, UpsertCredential};

pub struct CredentialRepository;

impl CredentialRepository {
    /// Insert or, if a credential already exists for (user, remote account),
    /// replace it in place (spec.md 3's "exactly one credential" invariant).
    pub async fn upsert(
        pool: &PgPool,
        input: UpsertCredential,
    ) -> Result<AccountCredential, sqlx::Error> {
        sqlx::query_as::<_, AccountCredential>(
            r#"
            INSERT INTO account_credentials
                (id, user_id, remote_account_id, access_token_enc, refresh_token_enc, access_token_expires_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (user_id, remote_account_id) DO UPDATE SET
                access_token_enc = EXCLUDED.access_token_enc,
                refresh_token_enc = EXCLUDED.refresh_token_enc,
                access_token_expires_at = EXCLUDED.access_token_expires_at,
                updated_at = NOW()
            RETURNING *
            "#,
        )
        .bind(CredentialId::new().as_uuid())
        .bind(input.user_id.as_uuid())
        .bind(&input.remote_account_id)
        .bind(&input.access_token_enc)
        .bind(&input.refresh_token_enc)
        .bind(input.access_token_expires_at)
        .fetch_one(pool)
        .await
    }

    pub async fn find_by_id(
        pool: &PgPool,
        id: CredentialId,
    ) -> Result<Option<AccountCredential>, sqlx::Error> {
        sqlx::query_as::<_, AccountCredential>("SELECT * FROM account_credentials WHERE id = $1")
            .bind(id.as_uuid())
            .fetch_optional(pool)
            .await
    }

    /// Looks up the one credential for (user, remote account), the same
    /// key `upsert` is unique on.
    pub async fn find_by_user_and_account(
        pool: &PgPool,
        user_id: shared::UserId,
        remote_account_id: &str,
    ) -> Result<Option<AccountCredential>, sqlx::Error> {
        sqlx::query_as::<_, AccountCredential>(
            "SELECT * FROM account_credentials WHERE user_id = $1 AND remote_account_id = $2",
        )
        .bind(user_id.as_uuid())
        .bind(remote_account_id)
        .fetch_optional(pool)
        .await
    }

    pub async fn update_access_token(
        pool: &PgPool,
        id: CredentialId,
        access_token_enc: &[u8],
        expires_at: DateTime<Utc>,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE account_credentials
            SET access_token_enc = $2, access_token_expires_at = $3, updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id.as_uuid())
        .bind(access_token_enc)
        .bind(expires_at)
        .execute(pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Credentials due for proactive refresh, for the `token_refresh` job.
    pub async fn find_expiring(
        pool: &PgPool,
        within: chrono::Duration,
    ) -> Result<Vec<AccountCredential>, sqlx::Error> {
        sqlx::query_as::<_, AccountCredential>(
            r#"
            SELECT * FROM account_credentials
            WHERE access_token_expires_at <= NOW() + $1::interval
            "#,
        )
        .bind(within)
        .fetch_all(pool)
        .await
    }

    pub async fn delete(pool: &PgPool, id: CredentialId) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM account_credentials WHERE id = $1")
            .bind(id.as_uuid())
            .execute(pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
