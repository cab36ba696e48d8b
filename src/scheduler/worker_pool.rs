//! Bounded worker pool for CPU-bound per-item work.
//!
//! Tasks of one batch run on tokio's blocking thread pool, at most
//! `num_workers` at a time, each under its own timeout. Results come back in
//! input order regardless of completion order.
//!
//! # Features
//!
//! - Configurable number of workers
//! - Per-task timeout, reported as an outcome rather than an error
//! - Panics confined to the task that raised them
//! - Pool statistics tracking

use std::any::Any;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Configuration for the worker pool.
#[derive(Debug, Clone)]
pub struct WorkerPoolConfig {
    /// Maximum number of tasks running at once.
    pub num_workers: usize,
    /// Maximum time allowed for a single task.
    pub task_timeout: Duration,
}

impl Default for WorkerPoolConfig {
    fn default() -> Self {
        Self {
            num_workers: std::thread::available_parallelism()
                .map(NonZeroUsize::get)
                .unwrap_or(1),
            task_timeout: Duration::from_secs(30),
        }
    }
}

impl WorkerPoolConfig {
    /// Creates a new configuration with the specified number of workers.
    pub fn new(num_workers: usize) -> Self {
        Self {
            num_workers,
            ..Default::default()
        }
    }

    /// Sets the per-task timeout.
    pub fn with_task_timeout(mut self, timeout: Duration) -> Self {
        self.task_timeout = timeout;
        self
    }
}

/// How a single task ended.
#[derive(Debug, Clone, PartialEq)]
pub enum TaskOutcome<T> {
    Completed(T),
    TimedOut(Duration),
    Panicked(String),
}

impl<T> TaskOutcome<T> {
    pub fn is_completed(&self) -> bool {
        matches!(self, TaskOutcome::Completed(_))
    }

    pub fn completed(self) -> Option<T> {
        match self {
            TaskOutcome::Completed(value) => Some(value),
            _ => None,
        }
    }
}

/// Statistics about the worker pool.
#[derive(Debug, Clone, Default)]
pub struct PoolStats {
    pub num_workers: usize,
    pub tasks_completed: u64,
    pub tasks_timed_out: u64,
    pub tasks_panicked: u64,
    pub average_task_duration: Duration,
}

impl PoolStats {
    /// Returns the total number of tasks processed.
    pub fn total_processed(&self) -> u64 {
        self.tasks_completed + self.tasks_timed_out + self.tasks_panicked
    }

    /// Returns the success rate as a percentage.
    pub fn success_rate(&self) -> f64 {
        let total = self.total_processed();
        if total == 0 {
            return 0.0;
        }
        (self.tasks_completed as f64 / total as f64) * 100.0
    }
}

/// Shared state for tracking pool statistics.
struct SharedPoolStats {
    tasks_completed: AtomicU64,
    tasks_timed_out: AtomicU64,
    tasks_panicked: AtomicU64,
    total_duration_ms: AtomicU64,
}

impl SharedPoolStats {
    fn new() -> Self {
        Self {
            tasks_completed: AtomicU64::new(0),
            tasks_timed_out: AtomicU64::new(0),
            tasks_panicked: AtomicU64::new(0),
            total_duration_ms: AtomicU64::new(0),
        }
    }

    fn record<T>(&self, outcome: &TaskOutcome<T>, duration: Duration) {
        let counter = match outcome {
            TaskOutcome::Completed(_) => &self.tasks_completed,
            TaskOutcome::TimedOut(_) => &self.tasks_timed_out,
            TaskOutcome::Panicked(_) => &self.tasks_panicked,
        };
        counter.fetch_add(1, Ordering::SeqCst);
        self.total_duration_ms
            .fetch_add(duration.as_millis() as u64, Ordering::SeqCst);
    }

    fn to_pool_stats(&self, num_workers: usize) -> PoolStats {
        let completed = self.tasks_completed.load(Ordering::SeqCst);
        let timed_out = self.tasks_timed_out.load(Ordering::SeqCst);
        let panicked = self.tasks_panicked.load(Ordering::SeqCst);
        let total_duration_ms = self.total_duration_ms.load(Ordering::SeqCst);

        let total = completed + timed_out + panicked;
        let average_task_duration = if total > 0 {
            Duration::from_millis(total_duration_ms / total)
        } else {
            Duration::ZERO
        };

        PoolStats {
            num_workers,
            tasks_completed: completed,
            tasks_timed_out: timed_out,
            tasks_panicked: panicked,
            average_task_duration,
        }
    }
}

/// Worker pool that runs batches of blocking tasks with bounded concurrency.
pub struct BatchWorkerPool {
    config: WorkerPoolConfig,
    semaphore: Arc<Semaphore>,
    stats: Arc<SharedPoolStats>,
}

impl BatchWorkerPool {
    pub fn new(config: WorkerPoolConfig) -> Self {
        let config = WorkerPoolConfig {
            num_workers: config.num_workers.max(1),
            ..config
        };
        Self {
            semaphore: Arc::new(Semaphore::new(config.num_workers)),
            stats: Arc::new(SharedPoolStats::new()),
            config,
        }
    }

    pub fn config(&self) -> &WorkerPoolConfig {
        &self.config
    }

    pub fn stats(&self) -> PoolStats {
        self.stats.to_pool_stats(self.config.num_workers)
    }

    /// Runs `task` over every input and returns outcomes in input order.
    ///
    /// A task that exceeds the timeout is reported as `TimedOut`; its thread
    /// is left to finish in the background and its result is discarded. It
    /// keeps its worker slot until it returns, so at most `num_workers`
    /// tasks ever run at once.
    pub async fn run_ordered<I, T, F>(&self, inputs: Vec<I>, task: F) -> Vec<TaskOutcome<T>>
    where
        I: Send + 'static,
        T: Send + 'static,
        F: Fn(I) -> T + Send + Sync + 'static,
    {
        let task = Arc::new(task);
        let timeout = self.config.task_timeout;
        let count = inputs.len();

        let handles: Vec<JoinHandle<TaskOutcome<T>>> = inputs
            .into_iter()
            .map(|input| {
                let semaphore = Arc::clone(&self.semaphore);
                let stats = Arc::clone(&self.stats);
                let task = Arc::clone(&task);
                tokio::spawn(async move {
                    let permit = match semaphore.acquire_owned().await {
                        Ok(permit) => permit,
                        Err(_) => return TaskOutcome::Panicked("worker pool closed".to_string()),
                    };
                    let started = Instant::now();
                    // The permit lives as long as the thread, even past a timeout.
                    let blocking = tokio::task::spawn_blocking(move || {
                        let _permit = permit;
                        task(input)
                    });
                    let outcome = match tokio::time::timeout(timeout, blocking).await {
                        Ok(Ok(value)) => TaskOutcome::Completed(value),
                        Ok(Err(join_err)) => TaskOutcome::Panicked(join_error_message(join_err)),
                        Err(_) => TaskOutcome::TimedOut(timeout),
                    };
                    stats.record(&outcome, started.elapsed());
                    outcome
                })
            })
            .collect();

        let mut outcomes = Vec::with_capacity(count);
        for handle in handles {
            let outcome = match handle.await {
                Ok(outcome) => outcome,
                Err(join_err) => TaskOutcome::Panicked(join_error_message(join_err)),
            };
            if let TaskOutcome::Panicked(msg) = &outcome {
                warn!(error = %msg, "Worker task panicked");
            }
            outcomes.push(outcome);
        }

        debug!(tasks = count, workers = self.config.num_workers, "Batch finished");
        outcomes
    }
}

fn join_error_message(err: tokio::task::JoinError) -> String {
    if err.is_panic() {
        panic_message(err.into_panic())
    } else {
        err.to_string()
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
