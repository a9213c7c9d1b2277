use std::any::Any;
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinError;
use uuid::Uuid;

use crate::kernel::{Kernel, KernelError};

/// Runs the pool's kernel for one job on tokio's blocking pool.
///
/// The kernel is CPU-bound, so it never runs on a runtime worker thread.
/// A panic inside the kernel is caught by the blocking task and reported as
/// [`KernelError::Panicked`]. With a timeout configured, a kernel that
/// overruns is reported as [`KernelError::TimedOut`]; the blocking thread is
/// left to finish on its own since it cannot be preempted.
#[derive(Clone)]
pub struct KernelExecutor {
    kernel: Arc<dyn Kernel>,
    timeout: Option<Duration>,
}

impl std::fmt::Debug for KernelExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KernelExecutor")
            .field("kernel", &self.kernel.name())
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl KernelExecutor {
    pub fn new(kernel: Arc<dyn Kernel>) -> Self {
        Self {
            kernel,
            timeout: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn kernel_name(&self) -> &str {
        self.kernel.name()
    }

    pub async fn execute(&self, job_id: Uuid, input: u64) -> Result<u64, KernelError> {
        tracing::debug!(job_id = %job_id, input, kernel = self.kernel.name(), "Executing kernel");

        let kernel = Arc::clone(&self.kernel);
        let task = tokio::task::spawn_blocking(move || kernel.compute(input));

        let joined = match self.timeout {
            Some(limit) => match tokio::time::timeout(limit, task).await {
                Ok(joined) => joined,
                Err(_) => {
                    tracing::warn!(job_id = %job_id, timeout = ?limit, "Kernel timed out");
                    return Err(KernelError::TimedOut);
                }
            },
            None => task.await,
        };

        joined.unwrap_or_else(|e| Err(Self::join_failure(job_id, e)))
    }

    fn join_failure(job_id: Uuid, err: JoinError) -> KernelError {
        let message = if err.is_panic() {
            panic_message(err.into_panic())
        } else {
            err.to_string()
        };
        tracing::error!(job_id = %job_id, error = %message, "Kernel panicked");
        KernelError::Panicked(message)
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
