//! Prometheus metrics for observability.
//!
//! Server-side metrics cover HTTP traffic, WebSocket connections and gauges
//! sampled from the worker pool at scrape time. Job and strategy counters
//! live in `yoink_core::metrics` and are registered here as well.

use once_cell::sync::Lazy;
use prometheus::{
    self, Encoder, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, IntGaugeVec,
    Opts, Registry, TextEncoder,
};
use regex_lite::Regex;

/// Global metrics registry.
pub static REGISTRY: Lazy<Registry> = Lazy::new(|| {
    let registry = Registry::new();
    register_metrics(&registry);
    registry
});

// =============================================================================
// HTTP Request Metrics
// =============================================================================

/// HTTP request duration in seconds.
pub static HTTP_REQUEST_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "yoink_http_request_duration_seconds",
            "HTTP request duration in seconds",
        )
        .buckets(vec![
            0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
        ]),
        &["method", "path", "status"],
    )
    .unwrap()
});

pub static HTTP_REQUESTS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("yoink_http_requests_total", "Total HTTP requests"),
        &["method", "path", "status"],
    )
    .unwrap()
});

pub static HTTP_REQUESTS_IN_FLIGHT: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "yoink_http_requests_in_flight",
        "Number of HTTP requests currently being processed",
    )
    .unwrap()
});

// =============================================================================
// WebSocket Metrics
// =============================================================================

pub static WS_CONNECTIONS_ACTIVE: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "yoink_ws_connections_active",
        "Number of active WebSocket connections",
    )
    .unwrap()
});

pub static WS_CONNECTIONS_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "yoink_ws_connections_total",
        "Total WebSocket connections since startup",
    )
    .unwrap()
});

/// WebSocket messages sent by stream (`all` or `job`).
pub static WS_MESSAGES_SENT: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("yoink_ws_messages_sent_total", "WebSocket messages sent"),
        &["stream"],
    )
    .unwrap()
});

/// WebSocket lag events (when client falls behind).
pub static WS_LAG_EVENTS: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "yoink_ws_lag_events_total",
        "WebSocket lag events (client fell behind)",
    )
    .unwrap()
});

// =============================================================================
// Worker Pool Metrics (collected dynamically)
// =============================================================================

pub static POOL_QUEUED: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new("yoink_pool_queued", "Jobs waiting for a worker").unwrap()
});

pub static POOL_IN_FLIGHT: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new("yoink_pool_in_flight", "Jobs currently held by a worker").unwrap()
});

/// Jobs in the registry by current status.
pub static JOBS_BY_STATUS: Lazy<IntGaugeVec> = Lazy::new(|| {
    IntGaugeVec::new(
        Opts::new("yoink_jobs_by_status", "Current job count by status"),
        &["status"],
    )
    .unwrap()
});

// =============================================================================
// Registration
// =============================================================================

fn register_metrics(registry: &Registry) {
    // HTTP
    registry
        .register(Box::new(HTTP_REQUEST_DURATION.clone()))
        .unwrap();
    registry
        .register(Box::new(HTTP_REQUESTS_TOTAL.clone()))
        .unwrap();
    registry
        .register(Box::new(HTTP_REQUESTS_IN_FLIGHT.clone()))
        .unwrap();

    // WebSocket
    registry
        .register(Box::new(WS_CONNECTIONS_ACTIVE.clone()))
        .unwrap();
    registry
        .register(Box::new(WS_CONNECTIONS_TOTAL.clone()))
        .unwrap();
    registry
        .register(Box::new(WS_MESSAGES_SENT.clone()))
        .unwrap();
    registry.register(Box::new(WS_LAG_EVENTS.clone())).unwrap();

    // Worker pool
    registry.register(Box::new(POOL_QUEUED.clone())).unwrap();
    registry.register(Box::new(POOL_IN_FLIGHT.clone())).unwrap();
    registry.register(Box::new(JOBS_BY_STATUS.clone())).unwrap();

    // Core metrics (jobs, strategies, transcodes)
    for metric in yoink_core::metrics::all_metrics() {
        registry.register(metric).unwrap();
    }
}

/// Encode all metrics as Prometheus text format.
pub fn encode_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer).unwrap();
    String::from_utf8(buffer).unwrap()
}

/// Refresh gauges from the live pool and registry before encoding.
pub fn collect_dynamic_metrics(state: &crate::state::AppState) {
    let status = state.service().pool_status();
    POOL_QUEUED.set(status.queued as i64);
    POOL_IN_FLIGHT.set(status.in_flight as i64);

    JOBS_BY_STATUS.reset();
    for job in state.service().list_all().values() {
        JOBS_BY_STATUS
            .with_label_values(&[job.status.state_type()])
            .inc();
    }
}

static UUID_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"[0-9a-fA-F]{8}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{12}")
        .unwrap()
});

static BATCH_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"/batches/[^/]+").unwrap());

/// Normalize a path for metric labels (replace IDs with placeholders).
pub fn normalize_path(path: &str) -> String {
    let result = UUID_RE.replace_all(path, "{id}");
    let result = BATCH_RE.replace_all(&result, "/batches/{batch_id}");
    result.to_string()
}
