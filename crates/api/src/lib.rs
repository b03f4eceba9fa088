pub mod alerts;
pub mod error;
pub mod gateways;
pub mod metrics;
pub mod routes;
pub mod settings;
pub mod state;
pub mod webhook_renewer;

pub use error::ApiError;
pub use metrics::init_metrics;
pub use settings::Settings;
pub use state::AppState;

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

/// Create the application router
pub fn create_app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(routes::health::health_check))
        .route("/metrics", get(routes::prometheus::metrics))
        .route("/webhooks/calendar", post(routes::webhooks::receive_notification))
        .route(
            "/sync/calendars/:attachment_id/trigger",
            post(routes::sync_control::trigger_calendar),
        )
        .route(
            "/sync/calendars/:attachment_id/disconnect",
            post(routes::sync_control::cleanup_disconnected_calendar),
        )
        .route(
            "/sync/users/:user_id/main/trigger",
            post(routes::sync_control::trigger_main_calendar),
        )
        .route("/sync/users/:user_id/trigger", post(routes::sync_control::trigger_user))
        .route(
            "/sync/users/:user_id/reconcile",
            post(routes::sync_control::reconcile_calendar),
        )
        .route(
            "/sync/consistency-check",
            post(routes::sync_control::run_consistency_check),
        )
        .route(
            "/sync/startup-restore",
            post(routes::sync_control::apply_startup_restore),
        )
        .route(
            "/backups",
            get(routes::sync_control::list_backups).post(routes::sync_control::create_backup),
        )
        .route("/backups/restore", post(routes::sync_control::restore_from_backup))
        .route("/status/users/:user_id", get(routes::status::get_user_status))
        .route(
            "/status/calendars/:attachment_id",
            get(routes::status::get_calendar_status),
        )
        .route(
            "/settings",
            get(routes::settings::get_settings).patch(routes::settings::update_settings),
        )
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
