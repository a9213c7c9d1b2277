//! Worker execution engine.
//!
//! - [`Worker`]: one task per worker; advertises itself, waits for a job or
//!   a stop request, runs the job, repeats.
//! - [`KernelExecutor`]: runs the compute kernel off the async threads, with
//!   an optional execution timeout.
//!
//! # Worker cycle
//!
//! 1. Publish own inbox handle to the [`WorkerRegistry`]
//! 2. Wait on {inbox, stop}
//! 3. On a job: kernel, then the job's simulated delay, then report the
//!    [`JobOutcome`] and go back to 1
//! 4. On stop: finish anything already delivered and exit without
//!    re-advertising

pub mod executor;
pub mod task;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::{broadcast, RwLock};

use crate::scheduler::job::JobOutcome;
use crate::scheduler::ledger::JobLedger;
use crate::scheduler::registry::WorkerRegistry;

pub use executor::KernelExecutor;
pub use task::Worker;

/// Completed/failed tallies across all workers.
#[derive(Debug, Default)]
pub struct JobCounters {
    completed: AtomicU64,
    failed: AtomicU64,
}

impl JobCounters {
    pub fn record(&self, outcome: &JobOutcome) {
        if outcome.is_success() {
            self.completed.fetch_add(1, Ordering::Relaxed);
        } else {
            self.failed.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn completed(&self) -> u64 {
        self.completed.load(Ordering::Relaxed)
    }

    pub fn failed(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }
}

/// Everything a worker shares with the rest of the pool.
#[derive(Clone)]
pub struct WorkerContext {
    pub registry: Arc<WorkerRegistry>,
    pub executor: KernelExecutor,
    pub ledger: Arc<RwLock<JobLedger>>,
    pub outcomes: broadcast::Sender<JobOutcome>,
    pub counters: Arc<JobCounters>,
}

impl WorkerContext {
    /// Context with a fresh ledger, outcome feed and counters.
    pub fn new(registry: Arc<WorkerRegistry>, executor: KernelExecutor) -> Self {
        let (outcomes, _) = broadcast::channel(1024);
        Self {
            registry,
            executor,
            ledger: Arc::new(RwLock::new(JobLedger::new())),
            outcomes,
            counters: Arc::new(JobCounters::default()),
        }
    }
}
