pub mod api;
pub mod config;
pub mod error;
pub mod kernel;
pub mod pool;
pub mod scheduler;
pub mod server;
pub mod shutdown;
pub mod worker;

pub use error::{PoolError, Result};
pub use kernel::{Fibonacci, Kernel, KernelError};
pub use pool::{PoolStats, WorkerPool};
pub use scheduler::{Job, JobOutcome, JobStatus};
