//! Availability registry: the "channel of channels" between idle workers and
//! the dispatcher.
//!
//! An idle worker publishes a [`WorkerHandle`] (a sender into its private
//! single-slot inbox). The dispatcher borrows exactly one handle per job and
//! delivers the job through it. Handles are never duplicated: a worker
//! re-publishes only after it has consumed the job it was handed.

use std::collections::VecDeque;

use tokio::sync::{mpsc, Mutex, Notify};
use tokio_util::sync::CancellationToken;

use crate::error::{PoolError, Result};
use crate::scheduler::job::Job;

/// A borrowed route into one idle worker's inbox.
#[derive(Debug, Clone)]
pub struct WorkerHandle {
    worker_id: usize,
    inbox: mpsc::Sender<Job>,
}

/// Why a job could not be handed to a borrowed worker. The job is returned
/// so the caller can try another worker.
///
/// `Gone` is only possible when a worker stops between being borrowed and
/// receiving its job.
#[derive(Debug)]
pub enum DeliveryError {
    /// The worker stopped after advertising itself.
    Gone(Job),
    /// The inbox already holds a job.
    Busy(Job),
}

impl DeliveryError {
    pub fn into_job(self) -> Job {
        match self {
            DeliveryError::Gone(job) | DeliveryError::Busy(job) => job,
        }
    }
}

impl WorkerHandle {
    pub fn new(worker_id: usize, inbox: mpsc::Sender<Job>) -> Self {
        Self { worker_id, inbox }
    }

    pub fn worker_id(&self) -> usize {
        self.worker_id
    }

    /// Hand a job to the worker without waiting.
    ///
    /// An advertised worker is parked on an empty inbox, so this only fails
    /// when the worker has gone away in the meantime.
    pub fn deliver(&self, job: Job) -> std::result::Result<(), DeliveryError> {
        self.inbox.try_send(job).map_err(|e| match e {
            mpsc::error::TrySendError::Closed(job) => DeliveryError::Gone(job),
            mpsc::error::TrySendError::Full(job) => DeliveryError::Busy(job),
        })
    }

    pub fn is_closed(&self) -> bool {
        self.inbox.is_closed()
    }
}

/// Bounded FIFO of idle-worker handles. Capacity equals the maximum pool
/// size, so a publish never actually waits while the pool is consistent.
///
/// A worker that stops while advertised withdraws its own handle, so every
/// resident handle belongs to a running, idle worker.
#[derive(Debug)]
pub struct WorkerRegistry {
    idle: Mutex<VecDeque<WorkerHandle>>,
    capacity: usize,
    /// Signalled on every publish.
    published: Notify,
    /// Signalled whenever a slot frees up.
    freed: Notify,
    closed: CancellationToken,
}

impl WorkerRegistry {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            idle: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
            published: Notify::new(),
            freed: Notify::new(),
            closed: CancellationToken::new(),
        }
    }

    /// Advertise an idle worker. Waits if the registry is full.
    pub async fn publish(&self, handle: WorkerHandle) -> Result<()> {
        loop {
            if self.closed.is_cancelled() {
                return Err(PoolError::RegistryClosed);
            }

            {
                let mut idle = self.idle.lock().await;
                if idle.len() < self.capacity {
                    idle.push_back(handle);
                    self.published.notify_one();
                    return Ok(());
                }
            }

            tokio::select! {
                biased;
                _ = self.closed.cancelled() => return Err(PoolError::RegistryClosed),
                _ = self.freed.notified() => {}
            }
        }
    }

    /// Take exactly one idle worker's handle, waiting until one is published.
    ///
    /// Handles come out in the order they were published.
    pub async fn borrow(&self) -> Result<WorkerHandle> {
        loop {
            if self.closed.is_cancelled() {
                return Err(PoolError::RegistryClosed);
            }

            if let Some(handle) = self.idle.lock().await.pop_front() {
                self.freed.notify_one();
                return Ok(handle);
            }

            tokio::select! {
                biased;
                _ = self.closed.cancelled() => return Err(PoolError::RegistryClosed),
                _ = self.published.notified() => {}
            }
        }
    }

    /// Remove a worker's advertisement. Returns false if the worker had no
    /// handle resident, i.e. it was already borrowed.
    pub async fn withdraw(&self, worker_id: usize) -> bool {
        let mut idle = self.idle.lock().await;
        let before = idle.len();
        idle.retain(|h| h.worker_id != worker_id);
        let removed = idle.len() < before;
        drop(idle);

        if removed {
            self.freed.notify_one();
        }
        removed
    }

    /// Number of resident handles. Racy against concurrent publish and
    /// borrow.
    pub async fn idle_hint(&self) -> usize {
        self.idle.lock().await.len()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Refuse further publishes and wake any waiting borrower.
    pub fn close(&self) {
        self.closed.cancel();
    }

    pub fn is_closed(&self) -> bool {
        self.closed.is_cancelled()
    }
}
