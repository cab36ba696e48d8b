//! Worker scheduling for per-item refinement work.
//!
//! - **BatchWorkerPool**: runs a batch of blocking tasks with bounded
//!   concurrency and a per-task timeout, merging results by input order.

pub mod worker_pool;

pub use worker_pool::{BatchWorkerPool, PoolStats, TaskOutcome, WorkerPoolConfig};
