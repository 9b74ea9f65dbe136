//! Metrics for endpoint dispatch and cache operations.
//!
//! Recorded through the `metrics` facade; install any recorder/exporter in
//! the host application to collect them. Call [`register_metrics`] once at
//! startup to publish descriptions.
//!
//! | metric                               | kind      | labels             |
//! |--------------------------------------|-----------|--------------------|
//! | `api_swr_fetch_total`                | counter   | `endpoint`, `mode` |
//! | `api_swr_fetch_errors_total`         | counter   | `endpoint`, `mode` |
//! | `api_swr_fetch_duration_seconds`     | histogram | `endpoint`, `mode` |
//! | `api_swr_mock_dispatch_total`        | counter   | `endpoint`         |
//! | `api_swr_cache_invalidations_total`  | counter   | `operation`        |

use api_swr_core::hooks::RequestMode;
use metrics::{counter, describe_counter, describe_histogram, histogram};
use std::time::Duration;

/// Fetches started by binders.
pub const FETCH_TOTAL: &str = "api_swr_fetch_total";
/// Fetches that settled with an error.
pub const FETCH_ERRORS_TOTAL: &str = "api_swr_fetch_errors_total";
/// Fetch latency.
pub const FETCH_DURATION_SECONDS: &str = "api_swr_fetch_duration_seconds";
/// Dispatches routed to a mock.
pub const MOCK_DISPATCH_TOTAL: &str = "api_swr_mock_dispatch_total";
/// Keys invalidated or cleared through the cache manager.
pub const CACHE_INVALIDATIONS_TOTAL: &str = "api_swr_cache_invalidations_total";

/// Register all metric descriptions.
pub fn register_metrics() {
    describe_counter!(FETCH_TOTAL, "Total number of fetches started by query and mutation binders");
    describe_counter!(FETCH_ERRORS_TOTAL, "Total number of fetches that settled with an error");
    describe_histogram!(FETCH_DURATION_SECONDS, "Time from dispatch to settlement of a fetch");
    describe_counter!(MOCK_DISPATCH_TOTAL, "Total number of dispatches served by registered mocks");
    describe_counter!(
        CACHE_INVALIDATIONS_TOTAL,
        "Total number of cache keys invalidated or cleared"
    );
}

pub(crate) fn record_fetch(endpoint_id: &str, mode: RequestMode, elapsed: Duration, failed: bool) {
    let endpoint = endpoint_id.to_string();
    counter!(FETCH_TOTAL, "endpoint" => endpoint.clone(), "mode" => mode.as_str()).increment(1);
    histogram!(FETCH_DURATION_SECONDS, "endpoint" => endpoint.clone(), "mode" => mode.as_str())
        .record(elapsed.as_secs_f64());
    if failed {
        counter!(FETCH_ERRORS_TOTAL, "endpoint" => endpoint, "mode" => mode.as_str()).increment(1);
    }
}

pub(crate) fn record_mock_dispatch(endpoint_id: &str) {
    counter!(MOCK_DISPATCH_TOTAL, "endpoint" => endpoint_id.to_string()).increment(1);
}

pub(crate) fn record_invalidations(operation: &'static str, count: usize) {
    counter!(CACHE_INVALIDATIONS_TOTAL, "operation" => operation).increment(u64::try_from(count).unwrap_or(u64::MAX));
}
