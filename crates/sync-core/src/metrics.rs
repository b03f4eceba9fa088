//! Prometheus metrics for the Sync Engine and Scheduler boundaries. The
//! recorder itself is installed once by the `api` crate; these helpers only
//! emit through the global `metrics` facade, so this crate never needs a
//! handle back to the web layer.

use metrics::counter;

pub mod names {
    pub const SYNC_SUCCESS_TOTAL: &str = "calendar_sync_success_total";
    pub const SYNC_FAILURE_TOTAL: &str = "calendar_sync_failure_total";
    pub const BUSY_BLOCK_WRITES_TOTAL: &str = "calendar_busy_block_writes_total";
}

pub fn record_sync_success(calendar_kind: &'static str) {
    counter!(names::SYNC_SUCCESS_TOTAL, "calendar_kind" => calendar_kind).increment(1);
}

pub fn record_sync_failure(calendar_kind: &'static str) {
    counter!(names::SYNC_FAILURE_TOTAL, "calendar_kind" => calendar_kind).increment(1);
}

pub fn record_busy_block_write() {
    counter!(names::BUSY_BLOCK_WRITES_TOTAL).increment(1);
}
