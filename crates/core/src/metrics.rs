//! Prometheus metrics for core components.
//!
//! This module provides metrics for:
//! - Jobs (enqueued, finished by outcome, duration)
//! - Strategy attempts and classified failures
//! - Transcoding

use once_cell::sync::Lazy;
use prometheus::{HistogramOpts, HistogramVec, IntCounter, IntCounterVec, Opts};

// =============================================================================
// Jobs
// =============================================================================

/// Jobs accepted into the queue.
pub static JOBS_ENQUEUED: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new("yoink_jobs_enqueued_total", "Total jobs enqueued").unwrap()
});

/// Jobs reaching a terminal status.
pub static JOBS_FINISHED: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("yoink_jobs_finished_total", "Total jobs finished"),
        &["outcome"], // "done", "error", "timeout", "cancelled"
    )
    .unwrap()
});

/// Wall time from a worker picking a job up to its terminal status.
pub static JOB_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new("yoink_job_duration_seconds", "Duration of jobs").buckets(vec![
            1.0, 5.0, 10.0, 30.0, 60.0, 120.0, 300.0, 600.0,
        ]),
        &["outcome"],
    )
    .unwrap()
});

// =============================================================================
// Strategies
// =============================================================================

/// Strategy attempts by strategy name and result.
pub static STRATEGY_ATTEMPTS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("yoink_strategy_attempts_total", "Total strategy attempts"),
        &["strategy", "result"], // "success", "failure", "skipped"
    )
    .unwrap()
});

/// Failed attempts by classified kind.
pub static FAILURES_BY_KIND: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("yoink_failures_total", "Classified attempt failures"),
        &["kind"],
    )
    .unwrap()
});

// =============================================================================
// Transcoding
// =============================================================================

/// Transcoder invocations by result.
pub static TRANSCODES_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("yoink_transcodes_total", "Total transcoder runs"),
        &["result"],
    )
    .unwrap()
});

/// Get all core metrics for registration.
pub fn all_metrics() -> Vec<Box<dyn prometheus::core::Collector>> {
    vec![
        Box::new(JOBS_ENQUEUED.clone()),
        Box::new(JOBS_FINISHED.clone()),
        Box::new(JOB_DURATION.clone()),
        Box::new(STRATEGY_ATTEMPTS.clone()),
        Box::new(FAILURES_BY_KIND.clone()),
        Box::new(TRANSCODES_TOTAL.clone()),
    ]
}
