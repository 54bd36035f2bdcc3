//! Prometheus metrics for observability.
//!
//! Engine counters come from `pams_core::metrics`; task counts by status are
//! collected from the store when the metrics are encoded.

use anyhow::{Context, Result};
use once_cell::sync::Lazy;
use prometheus::{Encoder, IntGaugeVec, Opts, Registry, TextEncoder};

use pams_core::TaskStatus;

use crate::App;

/// Global metrics registry.
static REGISTRY: Lazy<Registry> = Lazy::new(|| {
    let registry = Registry::new();
    pams_core::metrics::register_metrics(&registry).unwrap();
    registry.register(Box::new(TASKS_BY_STATUS.clone())).unwrap();
    registry
});

/// Stored tasks by status.
static TASKS_BY_STATUS: Lazy<IntGaugeVec> = Lazy::new(|| {
    IntGaugeVec::new(
        Opts::new("pams_tasks_by_status", "Number of stored tasks in each status"),
        &["status"],
    )
    .unwrap()
});

/// Refresh gauges that are read from the store.
fn collect_dynamic_metrics(app: &App) -> Result<()> {
    let stats = app.orchestrator.stats()?;
    for (status, count) in [
        (TaskStatus::Pending, stats.pending),
        (TaskStatus::Running, stats.running),
        (TaskStatus::Completed, stats.completed),
        (TaskStatus::Failed, stats.failed),
        (TaskStatus::Cancelled, stats.cancelled),
    ] {
        TASKS_BY_STATUS
            .with_label_values(&[status.as_str()])
            .set(count);
    }
    Ok(())
}

/// Encode all metrics in Prometheus text format.
pub fn encode_metrics(app: &App) -> Result<String> {
    collect_dynamic_metrics(app)?;

    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    encoder
        .encode(&metric_families, &mut buffer)
        .context("Failed to encode metrics")?;
    String::from_utf8(buffer).context("Metrics output is not UTF-8")
}
