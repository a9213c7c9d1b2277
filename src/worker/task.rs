use chrono::Utc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::scheduler::job::{Job, JobOutcome};
use crate::scheduler::registry::WorkerHandle;
use crate::worker::WorkerContext;

/// An independently scheduled execution unit that processes at most one job
/// at a time.
///
/// The worker owns a single-slot inbox. Each idle cycle it publishes a handle
/// to that inbox in the registry and then waits for either a job or its stop
/// signal. Stop is only observed while idle: a job that has been delivered is
/// always run to completion first.
pub struct Worker {
    id: usize,
    handle: WorkerHandle,
    inbox: mpsc::Receiver<Job>,
    stop: CancellationToken,
    ctx: WorkerContext,
}

impl Worker {
    pub fn new(id: usize, ctx: WorkerContext, stop: CancellationToken) -> Self {
        let (tx, inbox) = mpsc::channel(1);
        Self {
            id,
            handle: WorkerHandle::new(id, tx),
            inbox,
            stop,
            ctx,
        }
    }

    pub fn id(&self) -> usize {
        self.id
    }

    /// Token that requests this worker to stop once idle.
    pub fn stop_token(&self) -> CancellationToken {
        self.stop.clone()
    }

    /// Spawn the worker loop. The returned handle resolves once the worker
    /// has exited.
    pub fn start(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    async fn run(mut self) {
        tracing::info!(worker_id = self.id, "Worker started");

        loop {
            if self.stop.is_cancelled() {
                break;
            }

            let published = tokio::select! {
                biased;
                _ = self.stop.cancelled() => break,
                published = self.ctx.registry.publish(self.handle.clone()) => published,
            };
            if let Err(e) = published {
                tracing::debug!(worker_id = self.id, error = %e, "Worker could not advertise");
                break;
            }

            tokio::select! {
                biased;
                Some(job) = self.inbox.recv() => {
                    self.process(job).await;
                }
                _ = self.stop.cancelled() => {
                    // Leave the registry, refuse further deliveries, then
                    // finish anything that slipped in before the inbox
                    // closed. `recv` only returns `None` once no send is
                    // still in progress.
                    self.ctx.registry.withdraw(self.id).await;
                    self.inbox.close();
                    while let Some(job) = self.inbox.recv().await {
                        tracing::debug!(worker_id = self.id, job_id = %job.id(), "Finishing job delivered during stop");
                        self.process(job).await;
                    }
                    break;
                }
            }
        }

        tracing::info!(worker_id = self.id, "Worker stopped");
    }

    async fn process(&self, job: Job) {
        let started_at = Utc::now();
        self.ctx
            .ledger
            .write()
            .await
            .mark_running(&job.id(), self.id, started_at);

        tracing::info!(
            worker_id = self.id,
            job_id = %job.id(),
            name = job.name(),
            input = job.input(),
            "Worker picked up job"
        );

        let result = self.ctx.executor.execute(job.id(), job.input()).await;

        if !job.delay().is_zero() {
            tokio::time::sleep(job.delay()).await;
        }

        match &result {
            Ok(value) => {
                tracing::info!(worker_id = self.id, job_id = %job.id(), result = value, "Worker finished job");
            }
            Err(e) => {
                tracing::warn!(worker_id = self.id, job_id = %job.id(), error = %e, "Job failed");
            }
        }

        let outcome = JobOutcome {
            job_id: job.id(),
            name: job.name().to_string(),
            input: job.input(),
            worker_id: self.id,
            result: result.map_err(|e| e.to_string()),
            started_at,
            finished_at: Utc::now(),
        };

        self.ctx.counters.record(&outcome);
        self.ctx.ledger.write().await.mark_finished(&outcome);
        // No subscribers is fine.
        let _ = self.ctx.outcomes.send(outcome);
    }
}
