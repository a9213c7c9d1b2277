use std::net::SocketAddr;
use std::time::Duration;

use crate::kernel::FIBONACCI_MAX_INPUT;

/// Sizing and execution limits for a [`WorkerPool`](crate::pool::WorkerPool).
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Upper bound on live workers; also the registry capacity.
    pub max_workers: usize,
    /// Workers created at construction time (ids `0..initial_workers`).
    /// Clamped to `max_workers`.
    pub initial_workers: usize,
    /// Capacity of the inbound job queue.
    pub queue_capacity: usize,
    /// Optional bound on a single kernel invocation.
    pub job_timeout: Option<Duration>,
    /// Number of job records kept for inspection.
    pub ledger_capacity: usize,
    /// Buffer of the outcome broadcast feed.
    pub outcome_buffer: usize,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_workers: 4,
            initial_workers: 4,
            queue_capacity: 20,
            job_timeout: None,
            ledger_capacity: 10_000,
            outcome_buffer: 1024,
        }
    }
}

impl PoolConfig {
    /// Pool that starts fully populated with `max_workers` workers.
    pub fn new(max_workers: usize, queue_capacity: usize) -> Self {
        let max_workers = max_workers.max(1);
        Self {
            max_workers,
            initial_workers: max_workers,
            queue_capacity: queue_capacity.max(1),
            ..Default::default()
        }
    }

    pub fn with_initial_workers(mut self, initial_workers: usize) -> Self {
        self.initial_workers = initial_workers;
        self
    }

    pub fn with_job_timeout(mut self, timeout: Duration) -> Self {
        self.job_timeout = Some(timeout);
        self
    }

    pub fn with_ledger_capacity(mut self, capacity: usize) -> Self {
        self.ledger_capacity = capacity;
        self
    }

    /// Initial worker count after clamping to the pool bound.
    pub fn effective_initial_workers(&self) -> usize {
        self.initial_workers.min(self.max_workers.max(1))
    }
}

/// Settings for the HTTP submission boundary.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub listen_addr: SocketAddr,
    /// How long a submission may wait for queue room. `None` rejects
    /// immediately when the queue is full.
    pub enqueue_timeout: Option<Duration>,
    /// Largest accepted `value`.
    pub max_value: u64,
    /// Longest accepted `delay`.
    pub max_delay: Duration,
    /// How long `DELETE /api/workers/{id}?wait=true` waits for the exit.
    pub stop_timeout: Duration,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::from(([0, 0, 0, 0], 8081)),
            enqueue_timeout: None,
            max_value: FIBONACCI_MAX_INPUT,
            max_delay: Duration::from_secs(3600),
            stop_timeout: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub pool: PoolConfig,
    pub api: ApiConfig,
    /// Time allowed for queued work to drain and workers to exit on shutdown.
    pub shutdown_grace: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            pool: PoolConfig::default(),
            api: ApiConfig::default(),
            shutdown_grace: Duration::from_secs(5),
        }
    }
}
