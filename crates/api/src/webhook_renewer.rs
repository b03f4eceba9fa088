//! Concrete [`WebhookRenewer`]: opens a new push-notification channel on the
//! remote calendar. Watch/subscribe isn't part of [`CalendarGateway`] since
//! it's a channel-lifecycle concern, not an event operation, so this talks
//! to the remote API directly with the same bearer-token shape the gateway
//! client uses.

use async_trait::async_trait;
use chrono::Utc;
use db::{AttachmentRepository, CredentialRepository, CreateWebhookChannel, UserRepository, WebhookChannel, WebhookChannelRepository};
use gateway::{GatewayError, GatewayResult};
use shared::crypto::EncryptionManager;
use shared::DomainError;
use sqlx::PgPool;
use sync_core::scheduler::WebhookRenewer;
use sync_core::{SyncError, SyncResult};
use uuid::Uuid;

pub struct HttpWebhookRenewer {
    pool: PgPool,
    http_client: reqwest::Client,
    encryption: EncryptionManager,
    calendar_base_url: String,
    callback_url: String,
    channel_ttl: chrono::Duration,
}

impl HttpWebhookRenewer {
    pub fn new(
        pool: PgPool,
        encryption: EncryptionManager,
        calendar_base_url: String,
        callback_url: String,
        channel_ttl: chrono::Duration,
    ) -> Self {
        Self {
            pool,
            http_client: reqwest::Client::new(),
            encryption,
            calendar_base_url,
            callback_url,
            channel_ttl,
        }
    }

    async fn resolve_calendar(&self, channel: &WebhookChannel) -> SyncResult<(String, String)> {
        match channel.attachment_id {
            Some(attachment_id) => {
                let attachment = AttachmentRepository::find_by_id(&self.pool, attachment_id)
                    .await
                    .map_err(SyncError::from)?
                    .ok_or(SyncError::Domain(DomainError::AttachmentNotFound))?;
                let credential = CredentialRepository::find_by_id(&self.pool, attachment.credential_id)
                    .await
                    .map_err(SyncError::from)?
                    .ok_or(SyncError::Domain(DomainError::CredentialNotFound))?;
                let access_token = self
                    .encryption
                    .decrypt(&credential.access_token_enc)
                    .map_err(|err| SyncError::Other(format!("decrypting access token: {err}")))?;
                Ok((attachment.remote_calendar_id, access_token))
            }
            None => {
                let user = UserRepository::find_by_id(&self.pool, channel.user_id)
                    .await
                    .map_err(SyncError::from)?
                    .ok_or_else(|| SyncError::Domain(DomainError::UserNotFound(channel.user_id.to_string())))?;
                let main_calendar_id = user
                    .main_calendar_id
                    .clone()
                    .ok_or(SyncError::Domain(DomainError::NoMainCalendar))?;
                let credential = CredentialRepository::find_by_user_and_account(&self.pool, channel.user_id, &user.email)
                    .await
                    .map_err(SyncError::from)?
                    .ok_or(SyncError::Domain(DomainError::CredentialNotFound))?;
                let access_token = self
                    .encryption
                    .decrypt(&credential.access_token_enc)
                    .map_err(|err| SyncError::Other(format!("decrypting access token: {err}")))?;
                Ok((main_calendar_id, access_token))
            }
        }
    }

    async fn watch(&self, calendar_id: &str, access_token: &str, watch_token: &str) -> GatewayResult<(String, String, chrono::DateTime<Utc>)> {
        let new_channel_id = Uuid::new_v4().to_string();
        let expiration = Utc::now() + self.channel_ttl;

        let resp = self
            .http_client
            .post(format!("{}/calendars/{calendar_id}/events/watch", self.calendar_base_url))
            .bearer_auth(access_token)
            .json(&serde_json::json!({
                "id": new_channel_id,
                "type": "web_hook",
                "address": self.callback_url,
                "token": watch_token,
                "expiration": expiration.timestamp_millis().to_string(),
            }))
            .send()
            .await
            .map_err(GatewayError::Request)?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(GatewayError::UnexpectedResponse(format!("watch failed ({status}): {body}")));
        }

        #[derive(serde::Deserialize)]
        struct WatchResponse {
            #[serde(rename = "resourceId")]
            resource_id: String,
        }
        let parsed: WatchResponse = resp
            .json()
            .await
            .map_err(GatewayError::Request)?;

        Ok((new_channel_id, parsed.resource_id, expiration))
    }
}

#[async_trait]
impl WebhookRenewer for HttpWebhookRenewer {
    async fn renew(&self, channel: &WebhookChannel) -> SyncResult<WebhookChannel> {
        let (remote_calendar_id, access_token) = self.resolve_calendar(channel).await?;
        let watch_token = Uuid::new_v4().to_string();
        let (channel_id, resource_id, expiration) = self
            .watch(&remote_calendar_id, &access_token, &watch_token)
            .await?;

        let created = WebhookChannelRepository::create(
            &self.pool,
            CreateWebhookChannel {
                user_id: channel.user_id,
                calendar_kind: channel.calendar_kind,
                attachment_id: channel.attachment_id,
                channel_id,
                resource_id,
                token: watch_token,
                expiration,
            },
        )
        .await
        .map_err(SyncError::from)?;

        Ok(created)
    }
}
