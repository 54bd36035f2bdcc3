//! Prometheus metrics for core components.
//!
//! This module provides metrics for:
//! - Admission (submissions, rejections)
//! - Task lifecycle (terminal outcomes, live tasks)
//! - Pipeline items (durations, partial failures)

use once_cell::sync::Lazy;
use prometheus::{HistogramOpts, HistogramVec, IntCounterVec, IntGauge, Opts};

// =============================================================================
// Admission Metrics
// =============================================================================

/// Tasks admitted, by analysis type.
pub static TASKS_SUBMITTED: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("pams_tasks_submitted_total", "Total tasks admitted"),
        &["analysis_type"],
    )
    .unwrap()
});

/// Submissions rejected at admission, by reason.
pub static ADMISSIONS_REJECTED: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "pams_admissions_rejected_total",
            "Total submissions rejected at admission",
        ),
        &["reason"], // "unknown_type", "no_datasets", "no_valid_datasets", "too_few_datasets", "no_analyzer"
    )
    .unwrap()
});

// =============================================================================
// Lifecycle Metrics
// =============================================================================

/// Tasks that reached a terminal state.
pub static TASKS_FINISHED: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("pams_tasks_finished_total", "Total tasks reaching a terminal state"),
        &["analysis_type", "status"], // status: "completed", "failed", "cancelled"
    )
    .unwrap()
});

/// Lifecycle writes the task store refused, leaving the record behind.
pub static TASK_WRITE_FAILURES: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "pams_task_write_failures_total",
            "Total start or terminal status writes that failed",
        ),
        &["stage"], // "start", "finalize"
    )
    .unwrap()
});

/// Tasks currently holding an execution handle.
pub static ACTIVE_TASKS: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new("pams_active_tasks", "Tasks with a live execution handle").unwrap()
});

// =============================================================================
// Pipeline Metrics
// =============================================================================

/// Per-dataset analyzer duration in seconds.
pub static ITEM_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "pams_item_duration_seconds",
            "Duration of a single analyzer call",
        )
        .buckets(vec![0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 30.0, 120.0, 600.0]),
        &["analysis_type", "result"], // result: "success", "item_error", "fatal"
    )
    .unwrap()
});

/// Partial (per-dataset) failures recorded in result summaries.
pub static ITEM_FAILURES: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "pams_item_failures_total",
            "Total per-dataset failures that did not fail the task",
        ),
        &["analysis_type"],
    )
    .unwrap()
});

// =============================================================================
// Helper functions
// =============================================================================

/// Get all core metrics for registration in a registry.
pub fn all_metrics() -> Vec<Box<dyn prometheus::core::Collector>> {
    vec![
        // Admission
        Box::new(TASKS_SUBMITTED.clone()),
        Box::new(ADMISSIONS_REJECTED.clone()),
        // Lifecycle
        Box::new(TASKS_FINISHED.clone()),
        Box::new(TASK_WRITE_FAILURES.clone()),
        Box::new(ACTIVE_TASKS.clone()),
        // Pipeline
        Box::new(ITEM_DURATION.clone()),
        Box::new(ITEM_FAILURES.clone()),
    ]
}

/// Register every core metric in `registry`.
pub fn register_metrics(registry: &prometheus::Registry) -> prometheus::Result<()> {
    for collector in all_metrics() {
        registry.register(collector)?;
    }
    Ok(())
}
