use chrono::{DateTime, Utc};
use serde::Serialize;
use shared::{CredentialId, UserId};
use sqlx::FromRow;

/// An access/refresh token pair scoped to (user, remote account). Tokens are
/// stored as `nonce(12) || ciphertext` (see `shared::crypto`); exactly one
/// row per (user_id, remote_account_id), update replaces in place.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct AccountCredential {
    pub id: CredentialId,
    pub user_id: UserId,
    pub remote_account_id: String,
    #[serde(skip_serializing)]
    pub access_token_enc: Vec<u8>,
    #[serde(skip_serializing)]
    pub refresh_token_enc: Vec<u8>,
    pub access_token_expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl AccountCredential {
    pub fn access_token_expiring_within(&self, buffer: chrono::Duration) -> bool {
        Utc::now() + buffer >= self.access_token_expires_at
    }
}

#[derive(Debug, Clone)]
pub struct UpsertCredential {
    pub user_id: UserId,
    pub remote_account_id: String,
    pub access_token_enc: Vec<u8>,
    pub refresh_token_enc: Vec<u8>,
    pub access_token_expires_at: DateTime<Utc>,
}
