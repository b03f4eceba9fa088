use std::sync::Arc;

use metrics_exporter_prometheus::PrometheusHandle;
use sync_core::scheduler::SchedulerContext;

/// Application state shared across all handlers. Wraps the same
/// [`SchedulerContext`] the background jobs run against, so a manual
/// trigger route and the periodic job it preempts always see one
/// consistent view of config, locks, and gateways.
#[derive(Clone)]
pub struct AppState {
    pub ctx: Arc<SchedulerContext>,
    pub metrics_handle: PrometheusHandle,
}

impl AppState {
    pub fn new(ctx: Arc<SchedulerContext>, metrics_handle: PrometheusHandle) -> Self {
        Self { ctx, metrics_handle }
    }
}
