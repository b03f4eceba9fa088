use std::net::SocketAddr;
use std::sync::Arc;

use api::alerts::SmtpAlertTransport;
use api::gateways::HttpGatewayFactory;
use api::webhook_renewer::HttpWebhookRenewer;
use api::{create_app, init_metrics, AppState, Settings};
use shared::crypto::{load_key_file, EncryptionManager};
use sync_core::lock::CalendarLockSet;
use sync_core::scheduler::SchedulerContext;
use tokio::sync::RwLock;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    let migrate_only = std::env::args().any(|arg| arg == "--migrate-only");

    let metrics_handle = init_metrics();
    tracing::info!("Prometheus metrics initialized");

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "api=debug,sync_core=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let settings = Settings::from_env();

    if let Ok(true) = sync_core::backup::apply_startup_restore(&settings.restore_marker_path, &settings.database_url).await {
        tracing::warn!("applied startup restore from disaster-recovery marker");
    }

    let pool = db::create_pool(&settings.database_url)
        .await
        .expect("failed to create database pool");

    tracing::info!("running database migrations");
    sqlx::migrate!("../db/migrations")
        .run(&pool)
        .await
        .expect("failed to run migrations");

    if migrate_only {
        tracing::info!("migration-only mode, exiting");
        return;
    }

    let key = load_key_file(&settings.encryption_key_path).expect("failed to read encryption key file");
    let encryption = EncryptionManager::new(&key).expect("invalid encryption key");

    let gateways: Arc<dyn sync_core::engine::GatewayFactory> = Arc::new(HttpGatewayFactory::new(
        pool.clone(),
        encryption.clone(),
        settings.calendar_base_url.clone(),
        settings.oauth,
    ));

    let alert_transport: Arc<dyn sync_core::scheduler::AlertTransport> =
        Arc::new(SmtpAlertTransport::new(pool.clone(), settings.smtp).expect("failed to build SMTP transport"));

    let webhook_renewer: Arc<dyn sync_core::scheduler::WebhookRenewer> = Arc::new(HttpWebhookRenewer::new(
        pool.clone(),
        encryption,
        settings.calendar_base_url.clone(),
        settings.webhook_callback_url.clone(),
        chrono::Duration::hours(settings.webhook_channel_ttl_hours),
    ));

    let ctx = Arc::new(SchedulerContext {
        pool,
        config: Arc::new(RwLock::new(settings.sync_config())),
        gateways,
        alert_transport,
        webhook_renewer,
        calendar_locks: Arc::new(CalendarLockSet::new()),
        backup_dir: settings.backup_dir.clone(),
        database_url: settings.database_url.clone(),
        holder_id: settings.holder_id.clone(),
    });

    let job_handles = sync_core::scheduler::spawn_all(ctx.clone());
    tracing::info!(jobs = job_handles.len(), "scheduler jobs started");

    let state = AppState::new(ctx, metrics_handle);
    let app = create_app(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], settings.port));
    tracing::info!("listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await.unwrap();
    axum::serve(listener, app).await.unwrap();
}
