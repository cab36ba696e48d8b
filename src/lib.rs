//! datarefinery: quality scoring, deduplication and classification of
//! supplier datasets, plus ingestion and packaging around the refinement
//! pipeline.

// Core modules
pub mod classify;
pub mod cli;
pub mod dataset;
pub mod dedup;
pub mod error;
pub mod hashing;
pub mod ingest;
pub mod metrics;
pub mod packaging;
pub mod pipeline;
pub mod quality;
pub mod scheduler;
pub mod similarity;
pub mod storage;

// Re-export commonly used types
pub use error::{ErrorKind, ErrorResponse, ItemError, RefineError};
pub use pipeline::{RefineConfig, RefinementOrchestrator, RefinementRecord};
