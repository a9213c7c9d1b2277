//! The pool aggregate: owns the inbound queue, the registry, every worker and
//! the dispatcher.
//!
//! Nothing outside this module creates or destroys a [`Worker`]. Callers
//! submit jobs, grow the pool, and stop individual workers through
//! [`WorkerPool`]; each of those paths is logged and observable through
//! [`WorkerPool::stats`], the job ledger and the outcome feed.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::{broadcast, mpsc, Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::config::PoolConfig;
use crate::error::{PoolError, Result};
use crate::kernel::Kernel;
use crate::scheduler::dispatcher::Dispatcher;
use crate::scheduler::job::{Job, JobOutcome, JobStatus};
use crate::scheduler::ledger::JobLedger;
use crate::scheduler::registry::WorkerRegistry;
use crate::worker::{JobCounters, KernelExecutor, Worker, WorkerContext};

/// Best-effort snapshot of pool state. Counts race with live traffic.
#[derive(Debug, Clone, Serialize)]
pub struct PoolStats {
    pub max_workers: usize,
    pub live_workers: usize,
    pub idle_workers: usize,
    pub queued_jobs: usize,
    pub queue_capacity: usize,
    pub jobs_completed: u64,
    pub jobs_failed: u64,
    pub running: bool,
    pub draining: bool,
}

struct WorkerEntry {
    stop: CancellationToken,
    /// `None` until the pool is running.
    task: Option<JoinHandle<()>>,
}

impl WorkerEntry {
    fn is_live(&self) -> bool {
        self.task.as_ref().map(|t| !t.is_finished()).unwrap_or(true)
    }
}

#[derive(Default)]
struct PoolState {
    pending: Vec<Worker>,
    dispatcher: Option<Dispatcher>,
    dispatcher_task: Option<JoinHandle<()>>,
    workers: HashMap<usize, WorkerEntry>,
}

impl PoolState {
    fn prune_exited(&mut self) {
        self.workers.retain(|_, entry| entry.is_live());
    }

    fn live_workers(&self) -> usize {
        self.workers.values().filter(|e| e.is_live()).count()
    }
}

pub struct WorkerPool {
    config: PoolConfig,
    ctx: WorkerContext,
    jobs_tx: mpsc::Sender<Job>,
    state: Mutex<PoolState>,
    next_id: AtomicUsize,
    running: AtomicBool,
    draining: AtomicBool,
    shutdown: CancellationToken,
}

impl WorkerPool {
    /// Build the queue, the registry and the initial workers. Nothing runs
    /// until [`run`](Self::run).
    pub fn new(config: PoolConfig, kernel: Arc<dyn Kernel>) -> Self {
        let max_workers = config.max_workers.max(1);
        let registry = Arc::new(WorkerRegistry::new(max_workers));
        let (jobs_tx, jobs_rx) = mpsc::channel(config.queue_capacity.max(1));
        let (outcomes, _) = broadcast::channel(config.outcome_buffer.max(1));

        let ctx = WorkerContext {
            registry: Arc::clone(&registry),
            executor: KernelExecutor::new(kernel).with_timeout(config.job_timeout),
            ledger: Arc::new(RwLock::new(JobLedger::with_capacity(config.ledger_capacity))),
            outcomes,
            counters: Arc::new(JobCounters::default()),
        };

        let shutdown = CancellationToken::new();
        let dispatcher = Dispatcher::new(
            jobs_rx,
            registry,
            Arc::clone(&ctx.ledger),
            shutdown.clone(),
        );

        let mut state = PoolState {
            dispatcher: Some(dispatcher),
            ..Default::default()
        };
        let initial = config.effective_initial_workers();
        for id in 0..initial {
            let worker = Worker::new(id, ctx.clone(), shutdown.child_token());
            state.workers.insert(
                id,
                WorkerEntry {
                    stop: worker.stop_token(),
                    task: None,
                },
            );
            state.pending.push(worker);
        }

        Self {
            config,
            ctx,
            jobs_tx,
            state: Mutex::new(state),
            next_id: AtomicUsize::new(initial),
            running: AtomicBool::new(false),
            draining: AtomicBool::new(false),
            shutdown,
        }
    }

    /// Start every worker and the dispatcher.
    pub async fn run(&self) -> Result<()> {
        if self.shutdown.is_cancelled() {
            return Err(PoolError::ShuttingDown);
        }

        let mut state = self.state.lock().await;
        let Some(dispatcher) = state.dispatcher.take() else {
            return Err(PoolError::AlreadyRunning);
        };

        let pending = std::mem::take(&mut state.pending);
        for worker in pending {
            let id = worker.id();
            let task = worker.start();
            if let Some(entry) = state.workers.get_mut(&id) {
                entry.task = Some(task);
            }
        }
        state.dispatcher_task = Some(dispatcher.start());
        self.running.store(true, Ordering::Release);

        tracing::info!(
            workers = state.workers.len(),
            max_workers = self.config.max_workers,
            queue_capacity = self.config.queue_capacity,
            "Worker pool running"
        );
        Ok(())
    }

    /// Enqueue a job without waiting. Fails with [`PoolError::QueueFull`]
    /// when the inbound queue has no room.
    pub async fn submit(&self, job: Job) -> Result<Uuid> {
        self.check_accepting()?;

        let permit = self.jobs_tx.try_reserve().map_err(|e| match e {
            mpsc::error::TrySendError::Full(()) => PoolError::QueueFull,
            mpsc::error::TrySendError::Closed(()) => PoolError::ShuttingDown,
        })?;

        Ok(self.admit(permit, job).await)
    }

    /// Enqueue a job, waiting for room in the queue. With a timeout, gives
    /// up with [`PoolError::EnqueueTimeout`]; without one, waits until there
    /// is room or the pool shuts down.
    pub async fn submit_wait(&self, job: Job, timeout: Option<Duration>) -> Result<Uuid> {
        self.check_accepting()?;

        let reserve = async {
            tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => Err(PoolError::ShuttingDown),
                permit = self.jobs_tx.reserve() => permit.map_err(|_| PoolError::ShuttingDown),
            }
        };

        let permit = match timeout {
            Some(limit) => tokio::time::timeout(limit, reserve)
                .await
                .map_err(|_| PoolError::EnqueueTimeout)??,
            None => reserve.await?,
        };

        Ok(self.admit(permit, job).await)
    }

    async fn admit(&self, permit: mpsc::Permit<'_, Job>, job: Job) -> Uuid {
        let job_id = job.id();
        self.ctx.ledger.write().await.record_queued(&job);
        tracing::info!(
            job_id = %job_id,
            name = job.name(),
            input = job.input(),
            delay = ?job.delay(),
            "Job queued"
        );
        permit.send(job);
        job_id
    }

    fn check_accepting(&self) -> Result<()> {
        if self.draining.load(Ordering::Acquire) || self.shutdown.is_cancelled() {
            return Err(PoolError::ShuttingDown);
        }
        Ok(())
    }

    /// Add one worker with a fresh id, up to `max_workers` live workers.
    pub async fn spawn_worker(&self) -> Result<usize> {
        self.check_accepting()?;

        let mut state = self.state.lock().await;
        state.prune_exited();
        if state.live_workers() >= self.config.max_workers {
            return Err(PoolError::PoolAtCapacity(self.config.max_workers));
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let worker = Worker::new(id, self.ctx.clone(), self.shutdown.child_token());
        let stop = worker.stop_token();

        let task = if self.running.load(Ordering::Acquire) {
            Some(worker.start())
        } else {
            state.pending.push(worker);
            None
        };
        state.workers.insert(id, WorkerEntry { stop, task });

        tracing::info!(worker_id = id, "Worker added to pool");
        Ok(id)
    }

    /// Ask a worker to stop once it is idle. Does not wait for it to exit.
    pub async fn stop_worker(&self, id: usize) -> Result<()> {
        let state = self.state.lock().await;
        let entry = state
            .workers
            .get(&id)
            .filter(|e| e.is_live())
            .ok_or(PoolError::WorkerNotFound(id))?;

        entry.stop.cancel();
        tracing::info!(worker_id = id, "Worker stop requested");
        Ok(())
    }

    /// Stop a worker and wait until it has exited. A job the worker is
    /// running is finished first, so the wait can be as long as that job.
    pub async fn stop_worker_and_wait(&self, id: usize, timeout: Duration) -> Result<()> {
        let (stop, task) = {
            let mut state = self.state.lock().await;
            let entry = state
                .workers
                .remove(&id)
                .filter(|e| e.is_live())
                .ok_or(PoolError::WorkerNotFound(id))?;
            state.pending.retain(|w| w.id() != id);
            (entry.stop, entry.task)
        };

        stop.cancel();
        tracing::info!(worker_id = id, "Worker stop requested, waiting for exit");

        let Some(mut task) = task else {
            return Ok(());
        };

        match tokio::time::timeout(timeout, &mut task).await {
            Ok(_) => {
                tracing::info!(worker_id = id, "Worker exit confirmed");
                Ok(())
            }
            Err(_) => {
                tracing::warn!(worker_id = id, "Worker did not exit in time");
                self.state.lock().await.workers.insert(
                    id,
                    WorkerEntry {
                        stop,
                        task: Some(task),
                    },
                );
                Err(PoolError::StopTimeout(id))
            }
        }
    }

    /// Ids of workers that have not exited, ascending.
    pub async fn worker_ids(&self) -> Vec<usize> {
        let state = self.state.lock().await;
        let mut ids: Vec<usize> = state
            .workers
            .iter()
            .filter(|(_, e)| e.is_live())
            .map(|(id, _)| *id)
            .collect();
        ids.sort_unstable();
        ids
    }

    pub async fn stats(&self) -> PoolStats {
        let live_workers = self.state.lock().await.live_workers();
        PoolStats {
            max_workers: self.config.max_workers,
            live_workers,
            idle_workers: self.ctx.registry.idle_hint().await,
            queued_jobs: self.jobs_tx.max_capacity() - self.jobs_tx.capacity(),
            queue_capacity: self.jobs_tx.max_capacity(),
            jobs_completed: self.ctx.counters.completed(),
            jobs_failed: self.ctx.counters.failed(),
            running: self.running.load(Ordering::Acquire),
            draining: self.is_draining(),
        }
    }

    /// Feed of finished jobs. Only outcomes produced after subscribing are
    /// seen.
    pub fn subscribe(&self) -> broadcast::Receiver<JobOutcome> {
        self.ctx.outcomes.subscribe()
    }

    pub fn ledger(&self) -> Arc<RwLock<JobLedger>> {
        Arc::clone(&self.ctx.ledger)
    }

    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    pub fn is_draining(&self) -> bool {
        self.draining.load(Ordering::Acquire) || self.shutdown.is_cancelled()
    }

    /// True once every admitted job has reached a worker: the queue is empty
    /// and the dispatcher is not holding a job while it waits for a worker.
    async fn is_drained(&self) -> bool {
        self.jobs_tx.capacity() == self.jobs_tx.max_capacity()
            && self
                .ctx
                .ledger
                .read()
                .await
                .with_status(JobStatus::Queued)
                .is_empty()
    }

    /// Coordinated shutdown.
    ///
    /// 1. Refuse new submissions
    /// 2. Give queued jobs up to `grace` to reach a worker
    /// 3. Cancel the dispatcher and every worker; each worker finishes the
    ///    job it is running
    /// 4. Wait for all tasks, bounded by the same deadline
    pub async fn shutdown(&self, grace: Duration) {
        tracing::info!("Refusing new jobs");
        self.draining.store(true, Ordering::Release);
        let deadline = Instant::now() + grace;

        if self.running.load(Ordering::Acquire) {
            let drained = tokio::time::timeout_at(deadline, async {
                while !self.is_drained().await {
                    tokio::time::sleep(Duration::from_millis(20)).await;
                }
            })
            .await;
            if drained.is_err() {
                tracing::warn!(
                    queued = self.jobs_tx.max_capacity() - self.jobs_tx.capacity(),
                    "Queue drain timed out"
                );
            }
        }

        self.shutdown.cancel();
        self.ctx.registry.close();

        let (dispatcher, dispatcher_task, workers) = {
            let mut state = self.state.lock().await;
            state.pending.clear();
            (
                state.dispatcher.take(),
                state.dispatcher_task.take(),
                std::mem::take(&mut state.workers),
            )
        };

        // Never ran: nothing will drain the queue, so settle it here.
        if let Some(dispatcher) = dispatcher {
            dispatcher.abandon().await;
        }
        if let Some(task) = dispatcher_task {
            if tokio::time::timeout_at(deadline, task).await.is_err() {
                tracing::warn!("Dispatcher did not stop in time");
            }
        }

        for (id, entry) in workers {
            if let Some(task) = entry.task {
                if tokio::time::timeout_at(deadline, task).await.is_err() {
                    tracing::warn!(worker_id = id, "Worker did not stop in time");
                }
            }
        }

        self.running.store(false, Ordering::Release);
        tracing::info!("Worker pool shutdown complete");
    }
}
