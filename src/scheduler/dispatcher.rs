use std::sync::Arc;

use tokio::sync::{mpsc, RwLock};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::scheduler::job::Job;
use crate::scheduler::ledger::JobLedger;
use crate::scheduler::registry::{DeliveryError, WorkerRegistry};

/// Pairs queued jobs with idle workers.
///
/// Jobs leave the inbound queue in arrival order and idle workers leave the
/// registry in advertisement order, so the first job waiting always goes to
/// the first worker that frees up. Borrowing is the only point where the
/// dispatcher waits on workers; delivery into a borrowed inbox never blocks.
pub struct Dispatcher {
    jobs: mpsc::Receiver<Job>,
    registry: Arc<WorkerRegistry>,
    ledger: Arc<RwLock<JobLedger>>,
    shutdown: CancellationToken,
}

impl Dispatcher {
    pub fn new(
        jobs: mpsc::Receiver<Job>,
        registry: Arc<WorkerRegistry>,
        ledger: Arc<RwLock<JobLedger>>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            jobs,
            registry,
            ledger,
            shutdown,
        }
    }

    pub fn start(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    /// Dispatch until shutdown or until every submitter is gone.
    pub async fn run(mut self) {
        tracing::info!("Dispatcher started");

        loop {
            let job = tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => break,
                job = self.jobs.recv() => match job {
                    Some(job) => job,
                    None => break,
                },
            };

            if !self.dispatch(job).await {
                break;
            }
        }

        self.abandon().await;
        tracing::info!("Dispatcher stopped");
    }

    /// Hand one job to one idle worker. Returns false if the pool is
    /// shutting down, in which case the job is recorded as cancelled.
    async fn dispatch(&self, mut job: Job) -> bool {
        loop {
            let borrowed = tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => None,
                handle = self.registry.borrow() => handle.ok(),
            };

            let Some(handle) = borrowed else {
                tracing::warn!(job_id = %job.id(), "Shutdown while waiting for a worker, job cancelled");
                self.ledger
                    .write()
                    .await
                    .mark_cancelled(&job.id(), "pool shut down before dispatch");
                return false;
            };

            let job_id = job.id();
            let worker_id = handle.worker_id();
            match handle.deliver(job) {
                Ok(()) => {
                    tracing::debug!(job_id = %job_id, worker_id, "Job dispatched");
                    return true;
                }
                Err(DeliveryError::Gone(returned)) => {
                    tracing::debug!(job_id = %job_id, worker_id, "Skipping stopped worker");
                    job = returned;
                }
                Err(err @ DeliveryError::Busy(_)) => {
                    tracing::warn!(job_id = %job_id, worker_id, "Borrowed worker already busy");
                    job = err.into_job();
                }
            }
        }
    }

    /// Stop intake and mark every job still queued as cancelled.
    pub async fn abandon(mut self) {
        self.jobs.close();
        let mut cancelled = 0usize;
        while let Ok(job) = self.jobs.try_recv() {
            self.ledger
                .write()
                .await
                .mark_cancelled(&job.id(), "pool shut down before dispatch");
            cancelled += 1;
        }
        if cancelled > 0 {
            tracing::warn!(cancelled, "Queued jobs dropped at shutdown");
        }
    }
}
