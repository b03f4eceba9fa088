//! Environment-driven configuration, read once at startup. `SyncConfig`
//! (the hot-reloadable part, exposed over `/settings`) is seeded from here
//! but lives independently in the `SchedulerContext`.

use std::path::PathBuf;

use lettre::message::Mailbox;
use sync_core::config::SyncConfig;

use crate::alerts::SmtpConfig;
use crate::gateways::OAuthConfig;

pub struct Settings {
    pub database_url: String,
    pub port: u16,
    pub backup_dir: PathBuf,
    pub restore_marker_path: PathBuf,
    pub holder_id: String,
    pub encryption_key_path: PathBuf,
    pub calendar_base_url: String,
    pub webhook_callback_url: String,
    pub webhook_channel_ttl_hours: i64,
    pub oauth: OAuthConfig,
    pub smtp: SmtpConfig,
}

fn env_var(key: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| panic!("{key} must be set"))
}

fn env_var_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

impl Settings {
    pub fn from_env() -> Self {
        let from_address = env_var_or("SMTP_FROM", "calendar-sync@localhost");
        let from: Mailbox = from_address
            .parse()
            .unwrap_or_else(|_| panic!("SMTP_FROM is not a valid mailbox address: {from_address}"));

        Self {
            database_url: env_var("DATABASE_URL"),
            port: env_var_or("PORT", "8080").parse().expect("PORT must be a number"),
            backup_dir: PathBuf::from(env_var_or("BACKUP_DIR", "./backups")),
            restore_marker_path: PathBuf::from(env_var_or("RESTORE_MARKER_PATH", "./backups/RESTORE")),
            holder_id: env_var_or("HOLDER_ID", "api"),
            encryption_key_path: PathBuf::from(env_var("ENCRYPTION_KEY_PATH")),
            calendar_base_url: env_var_or("CALENDAR_BASE_URL", "https://www.googleapis.com/calendar/v3"),
            webhook_callback_url: env_var("WEBHOOK_CALLBACK_URL"),
            webhook_channel_ttl_hours: env_var_or("WEBHOOK_CHANNEL_TTL_HOURS", "168")
                .parse()
                .expect("WEBHOOK_CHANNEL_TTL_HOURS must be a number"),
            oauth: OAuthConfig {
                token_endpoint: env_var("OAUTH_TOKEN_ENDPOINT"),
                client_id: env_var("OAUTH_CLIENT_ID"),
                client_secret: env_var("OAUTH_CLIENT_SECRET"),
            },
            smtp: SmtpConfig {
                host: env_var("SMTP_HOST"),
                port: env_var_or("SMTP_PORT", "587").parse().expect("SMTP_PORT must be a number"),
                username: env_var("SMTP_USERNAME"),
                password: env_var("SMTP_PASSWORD"),
                from,
            },
        }
    }

    /// `SyncConfig` has no environment-derived fields beyond its defaults;
    /// sites that want different tuning use the `/settings` endpoint at
    /// runtime instead of redeploying.
    pub fn sync_config(&self) -> SyncConfig {
        SyncConfig::default()
    }
}
