//! Prometheus metrics registration and export.
//!
//! Metrics live in process-wide statics that stay empty until
//! [`init_metrics`] runs; recording before that is a no-op.

use prometheus::{
    CounterVec, Encoder, Gauge, Histogram, HistogramOpts, Opts, Registry, TextEncoder,
};
use std::sync::OnceLock;

/// Global Prometheus registry for all refinement metrics.
pub static REGISTRY: OnceLock<Registry> = OnceLock::new();

/// Refinement runs, labeled by outcome (`committed`, `cancelled`, `failed`).
pub static RUNS_TOTAL: OnceLock<CounterVec> = OnceLock::new();

/// Items processed by committed runs, labeled by status (`passed`, `rejected`).
pub static ITEMS_TOTAL: OnceLock<CounterVec> = OnceLock::new();

/// Non-survivor duplicates found, labeled by dedup method.
pub static DUPLICATES_TOTAL: OnceLock<CounterVec> = OnceLock::new();

/// Per-item failures, labeled by stage (`read`, `analyze`).
pub static ITEM_FAILURES_TOTAL: OnceLock<CounterVec> = OnceLock::new();

/// Distribution of dataset aggregate quality scores.
pub static QUALITY_SCORE: OnceLock<Histogram> = OnceLock::new();

/// Wall-clock duration of committed runs.
pub static RUN_DURATION: OnceLock<Histogram> = OnceLock::new();

/// Runs currently in flight.
pub static ACTIVE_RUNS: OnceLock<Gauge> = OnceLock::new();

/// Initialize all metrics and register them with the registry.
///
/// Calling it again after a successful call leaves the first set in place.
///
/// # Errors
///
/// Returns a `prometheus::Error` if metric registration fails.
pub fn init_metrics() -> Result<(), prometheus::Error> {
    let registry = Registry::new();

    let runs_total = CounterVec::new(
        Opts::new("refine_runs_total", "Refinement runs by outcome"),
        &["outcome"],
    )?;

    let items_total = CounterVec::new(
        Opts::new("refine_items_total", "Items processed by committed runs"),
        &["status"],
    )?;

    let duplicates_total = CounterVec::new(
        Opts::new("refine_duplicates_total", "Duplicate items rejected"),
        &["method"],
    )?;

    let item_failures_total = CounterVec::new(
        Opts::new("refine_item_failures_total", "Per-item processing failures"),
        &["stage"],
    )?;

    let quality_score = Histogram::with_opts(
        HistogramOpts::new("refine_quality_score", "Dataset aggregate quality scores")
            .buckets(vec![0.1, 0.2, 0.3, 0.4, 0.5, 0.6, 0.7, 0.8, 0.9, 1.0]),
    )?;

    let run_duration = Histogram::with_opts(
        HistogramOpts::new(
            "refine_run_duration_seconds",
            "Refinement run duration in seconds",
        )
        .buckets(vec![0.1, 0.5, 1.0, 5.0, 15.0, 60.0, 300.0, 1800.0]),
    )?;

    let active_runs = Gauge::new("refine_active_runs", "Refinement runs in flight")?;

    registry.register(Box::new(runs_total.clone()))?;
    registry.register(Box::new(items_total.clone()))?;
    registry.register(Box::new(duplicates_total.clone()))?;
    registry.register(Box::new(item_failures_total.clone()))?;
    registry.register(Box::new(quality_score.clone()))?;
    registry.register(Box::new(run_duration.clone()))?;
    registry.register(Box::new(active_runs.clone()))?;

    // Already-initialized statics keep their first value.
    let _ = REGISTRY.set(registry);
    let _ = RUNS_TOTAL.set(runs_total);
    let _ = ITEMS_TOTAL.set(items_total);
    let _ = DUPLICATES_TOTAL.set(duplicates_total);
    let _ = ITEM_FAILURES_TOTAL.set(item_failures_total);
    let _ = QUALITY_SCORE.set(quality_score);
    let _ = RUN_DURATION.set(run_duration);
    let _ = ACTIVE_RUNS.set(active_runs);

    tracing::info!("Prometheus metrics initialized successfully");

    Ok(())
}

/// Export all registered metrics in Prometheus text format.
pub fn export_metrics() -> String {
    let Some(registry) = REGISTRY.get() else {
        return "# Metrics not initialized. Call init_metrics() first.\n".to_string();
    };

    let encoder = TextEncoder::new();
    let metric_families = registry.gather();

    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        return format!("# Error encoding metrics: {}\n", e);
    }

    String::from_utf8(buffer)
        .unwrap_or_else(|e| format!("# Error converting metrics to UTF-8: {}\n", e))
}
