//! High-level recording interface over the raw Prometheus metrics.

use super::prometheus::{
    ACTIVE_RUNS, DUPLICATES_TOTAL, ITEMS_TOTAL, ITEM_FAILURES_TOTAL, QUALITY_SCORE, RUNS_TOTAL,
    RUN_DURATION,
};

/// How a refinement run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    Committed,
    Cancelled,
    Failed,
}

impl RunOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunOutcome::Committed => "committed",
            RunOutcome::Cancelled => "cancelled",
            RunOutcome::Failed => "failed",
        }
    }
}

/// Records refinement metrics.
///
/// Metrics must be initialized with `init_metrics()` for anything to be
/// recorded; otherwise every method is a no-op.
///
/// # Example
///
/// ```ignore
/// use datarefinery::metrics::{init_metrics, MetricsCollector, RunOutcome};
///
/// init_metrics().expect("Failed to init metrics");
/// let collector = MetricsCollector::new();
/// collector.run_started();
/// collector.record_run(RunOutcome::Committed, 1.2);
/// ```
#[derive(Debug, Clone, Default)]
pub struct MetricsCollector;

impl MetricsCollector {
    pub fn new() -> Self {
        Self
    }

    /// Marks a run as in flight.
    pub fn run_started(&self) {
        if let Some(active) = ACTIVE_RUNS.get() {
            active.inc();
        }
    }

    /// Records the end of a run started with [`MetricsCollector::run_started`].
    pub fn record_run(&self, outcome: RunOutcome, duration_secs: f64) {
        if let Some(active) = ACTIVE_RUNS.get() {
            active.dec();
        }

        if let Some(runs) = RUNS_TOTAL.get() {
            runs.with_label_values(&[outcome.as_str()]).inc();
        }

        if outcome == RunOutcome::Committed {
            if let Some(duration) = RUN_DURATION.get() {
                duration.observe(duration_secs);
            }
        }

        tracing::trace!(
            outcome = outcome.as_str(),
            duration_secs = duration_secs,
            "Recorded run metric"
        );
    }

    /// Records the item counts and quality of a committed run.
    pub fn record_items(&self, passed: u64, rejected: u64, aggregate_quality: f64) {
        if let Some(items) = ITEMS_TOTAL.get() {
            items.with_label_values(&["passed"]).inc_by(passed as f64);
            items.with_label_values(&["rejected"]).inc_by(rejected as f64);
        }

        if let Some(quality) = QUALITY_SCORE.get() {
            quality.observe(aggregate_quality.clamp(0.0, 1.0));
        }
    }

    pub fn record_duplicates(&self, method: &str, count: u64) {
        if count == 0 {
            return;
        }
        if let Some(duplicates) = DUPLICATES_TOTAL.get() {
            duplicates.with_label_values(&[method]).inc_by(count as f64);
        }
    }

    pub fn record_item_failure(&self, stage: &str) {
        if let Some(failures) = ITEM_FAILURES_TOTAL.get() {
            failures.with_label_values(&[stage]).inc();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::init_metrics;

    #[test]
    fn test_recording_without_init_is_noop() {
        let collector = MetricsCollector::new();
        collector.run_started();
        collector.record_run(RunOutcome::Failed, 0.5);
        collector.record_items(1, 2, 0.4);
        collector.record_duplicates("hash", 3);
        collector.record_item_failure("read");
    }

    #[test]
    fn test_records_after_init() {
        let _ = init_metrics();
        let collector = MetricsCollector::new();
        let before = RUNS_TOTAL
            .get()
            .map(|c| c.with_label_values(&["cancelled"]).get())
            .unwrap_or(0.0);

        collector.run_started();
        collector.record_run(RunOutcome::Cancelled, 0.1);

        let after = RUNS_TOTAL
            .get()
            .map(|c| c.with_label_values(&["cancelled"]).get())
            .unwrap_or(0.0);
        assert!(after >= before + 1.0);
    }

    #[test]
    fn test_outcome_labels() {
        assert_eq!(RunOutcome::Committed.as_str(), "committed");
        assert_eq!(RunOutcome::Cancelled.as_str(), "cancelled");
        assert_eq!(RunOutcome::Failed.as_str(), "failed");
    }
}
