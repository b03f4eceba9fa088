//! Concrete [`GatewayFactory`]: resolves a stored, encrypted credential
//! into a live [`HttpCalendarGateway`], performing OAuth refresh against a
//! configured token endpoint. This is the one place in the workspace that
//! touches decrypted tokens and the OAuth client secret.

use async_trait::async_trait;
use chrono::Utc;
use db::{AccountCredential, CalendarAttachment, CredentialRepository, UserRepository};
use gateway::{refresh_access_token, CalendarGateway, HttpCalendarGateway};
use shared::crypto::EncryptionManager;
use shared::{DomainError, UserId};
use sqlx::PgPool;
use sync_core::engine::GatewayFactory;
use sync_core::{SyncError, SyncResult};

pub struct OAuthConfig {
    pub token_endpoint: String,
    pub client_id: String,
    pub client_secret: String,
}

pub struct HttpGatewayFactory {
    pool: PgPool,
    http_client: reqwest::Client,
    encryption: EncryptionManager,
    calendar_base_url: String,
    oauth: OAuthConfig,
}

impl HttpGatewayFactory {
    pub fn new(
        pool: PgPool,
        encryption: EncryptionManager,
        calendar_base_url: String,
        oauth: OAuthConfig,
    ) -> Self {
        Self {
            pool,
            http_client: reqwest::Client::new(),
            encryption,
            calendar_base_url,
            oauth,
        }
    }

    fn gateway_for(&self, credential: &AccountCredential) -> SyncResult<Box<dyn CalendarGateway>> {
        let access_token = self
            .encryption
            .decrypt(&credential.access_token_enc)
            .map_err(|err| SyncError::Other(format!("decrypting access token: {err}")))?;
        Ok(Box::new(HttpCalendarGateway::new(self.calendar_base_url.clone(), access_token)))
    }

    /// The credential backing a user's own main calendar, keyed by
    /// convention on the user's own email as its `remote_account_id`.
    async fn main_credential(&self, user_id: UserId, email: &str) -> SyncResult<AccountCredential> {
        CredentialRepository::find_by_user_and_account(&self.pool, user_id, email)
            .await
            .map_err(SyncError::from)?
            .ok_or(SyncError::Domain(DomainError::CredentialNotFound))
    }
}

#[async_trait]
impl GatewayFactory for HttpGatewayFactory {
    async fn for_attachment(&self, attachment: &CalendarAttachment) -> SyncResult<Box<dyn CalendarGateway>> {
        let credential = CredentialRepository::find_by_id(&self.pool, attachment.credential_id)
            .await
            .map_err(SyncError::from)?
            .ok_or(SyncError::Domain(DomainError::CredentialNotFound))?;
        self.gateway_for(&credential)
    }

    async fn for_main(&self, user_id: UserId) -> SyncResult<(Box<dyn CalendarGateway>, String)> {
        let user = UserRepository::find_by_id(&self.pool, user_id)
            .await
            .map_err(SyncError::from)?
            .ok_or_else(|| SyncError::Domain(DomainError::UserNotFound(user_id.to_string())))?;
        let main_calendar_id = user
            .main_calendar_id
            .clone()
            .ok_or(SyncError::Domain(DomainError::NoMainCalendar))?;
        let credential = self.main_credential(user_id, &user.email).await?;
        Ok((self.gateway_for(&credential)?, main_calendar_id))
    }

    async fn refresh_credential(&self, credential: &AccountCredential) -> SyncResult<()> {
        let refresh_token = self
            .encryption
            .decrypt(&credential.refresh_token_enc)
            .map_err(|err| SyncError::Other(format!("decrypting refresh token: {err}")))?;

        let pair = refresh_access_token(
            &self.http_client,
            &self.oauth.token_endpoint,
            &self.oauth.client_id,
            &self.oauth.client_secret,
            &refresh_token,
        )
        .await?;

        let access_token_enc = self
            .encryption
            .encrypt(&pair.access_token)
            .map_err(|err| SyncError::Other(format!("encrypting access token: {err}")))?;
        let expires_at = Utc::now() + chrono::Duration::seconds(pair.expires_in_secs);

        CredentialRepository::update_access_token(&self.pool, credential.id, &access_token_enc, expires_at)
            .await
            .map_err(SyncError::from)?;
        Ok(())
    }
}
