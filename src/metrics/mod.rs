//! Prometheus-based monitoring of refinement runs.
//!
//! # Example
//!
//! ```ignore
//! use datarefinery::metrics::{init_metrics, export_metrics, MetricsCollector};
//!
//! init_metrics().expect("Failed to initialize metrics");
//! let collector = MetricsCollector::new();
//! collector.record_items(90, 10, 0.82);
//! let metrics_text = export_metrics();
//! ```

pub mod collectors;
pub mod prometheus;

pub use collectors::{MetricsCollector, RunOutcome};
pub use self::prometheus::{export_metrics, init_metrics};

pub use self::prometheus::{
    ACTIVE_RUNS, DUPLICATES_TOTAL, ITEMS_TOTAL, ITEM_FAILURES_TOTAL, QUALITY_SCORE, REGISTRY,
    RUNS_TOTAL, RUN_DURATION,
};
