//! Prometheus metrics for the webhook receiver. Sync/engine metrics are
//! recorded directly by `sync_core::metrics`; this module only installs
//! the recorder and covers the one instrumentation point that lives in
//! the web layer itself.

use metrics::counter;

pub mod names {
    pub const WEBHOOK_ANOMALIES_TOTAL: &str = "calendar_webhook_anomalies_total";
}

/// Records a webhook notification that was acknowledged without
/// dispatching a sync: unknown channel, expired channel, token mismatch,
/// resource mismatch.
pub fn record_webhook_anomaly(reason: &'static str) {
    counter!(names::WEBHOOK_ANOMALIES_TOTAL, "reason" => reason).increment(1);
}

/// Initialize the Prometheus metrics exporter, returning a handle that can
/// render the `/metrics` endpoint.
pub fn init_metrics() -> metrics_exporter_prometheus::PrometheusHandle {
    let builder = metrics_exporter_prometheus::PrometheusBuilder::new();
    builder
        .install_recorder()
        .expect("failed to install Prometheus metrics recorder")
}
