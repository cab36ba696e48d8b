//! Command-line interface for datarefinery.
//!
//! Provides commands for ingestion, refinement, status and history queries,
//! packaging and metrics export.

mod commands;

pub use commands::{parse_cli, run, run_with_cli, Cli, Commands};
