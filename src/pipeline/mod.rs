//! Refinement pipeline: configuration, orchestration and run records.
//!
//! # Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use datarefinery::pipeline::{RefineConfig, RefinementOrchestrator};
//! use datarefinery::storage::{DirectoryItemSource, SqliteStore};
//!
//! let config = RefineConfig::from_env()?;
//! let store = Arc::new(SqliteStore::connect(&config.database_url).await?);
//! let source = Arc::new(DirectoryItemSource::new(&config.storage_root));
//! let orchestrator = RefinementOrchestrator::from_config(config, source, store);
//!
//! let record = orchestrator.refine_dataset(dataset_id, 0.5).await?;
//! println!("{} of {} items passed", record.items_passed(), record.items_processed());
//! ```

pub mod config;
pub mod orchestrator;
pub mod record;

pub use config::{ConfigError, RefineConfig};
pub use orchestrator::{RefineOptions, RefinementComponents, RefinementOrchestrator};
pub use record::{
    FailureStage, ItemFailure, ItemOutcome, RefinementMetrics, RefinementRecord,
    RefinementStatus, RejectionReason, RunSummary,
};
