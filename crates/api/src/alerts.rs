//! Concrete [`AlertTransport`]: delivers a queued alert as an email to the
//! owning user's address over SMTP.

use async_trait::async_trait;
use db::{Alert, UserRepository};
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use shared::DomainError;
use sqlx::PgPool;
use sync_core::scheduler::AlertTransport;
use sync_core::{SyncError, SyncResult};

pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub from: Mailbox,
}

pub struct SmtpAlertTransport {
    pool: PgPool,
    mailer: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl SmtpAlertTransport {
    pub fn new(pool: PgPool, config: SmtpConfig) -> Result<Self, lettre::transport::smtp::Error> {
        let creds = Credentials::new(config.username, config.password);
        let mailer = AsyncSmtpTransport::<Tokio1Executor>::relay(&config.host)?
            .port(config.port)
            .credentials(creds)
            .build();
        Ok(Self { pool, mailer, from: config.from })
    }
}

#[async_trait]
impl AlertTransport for SmtpAlertTransport {
    async fn deliver(&self, alert: &Alert) -> SyncResult<()> {
        let user = UserRepository::find_by_id(&self.pool, alert.user_id)
            .await
            .map_err(SyncError::from)?
            .ok_or_else(|| SyncError::Domain(DomainError::UserNotFound(alert.user_id.to_string())))?;

        let to: Mailbox = user
            .email
            .parse()
            .map_err(|err| SyncError::Other(format!("invalid recipient address: {err}")))?;

        let email = Message::builder()
            .from(self.from.clone())
            .to(to)
            .subject(&alert.subject)
            .body(alert.body.clone())
            .map_err(|err| SyncError::Other(format!("building alert email: {err}")))?;

        self.mailer
            .send(email)
            .await
            .map_err(|err| SyncError::Other(format!("sending alert email: {err}")))?;
        Ok(())
    }
}
