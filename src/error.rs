use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PoolError {
    #[error("Job queue is at capacity")]
    QueueFull,

    #[error("Timed out waiting for room in the job queue")]
    EnqueueTimeout,

    #[error("Pool is shutting down")]
    ShuttingDown,

    #[error("Worker not found: {0}")]
    WorkerNotFound(usize),

    #[error("Pool already has the maximum of {0} workers")]
    PoolAtCapacity(usize),

    #[error("Pool is already running")]
    AlreadyRunning,

    #[error("Worker registry is closed")]
    RegistryClosed,

    #[error("Worker {0} did not stop in time")]
    StopTimeout(usize),
}

pub type Result<T> = std::result::Result<T, PoolError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_messages() {
        assert_eq!(PoolError::QueueFull.to_string(), "Job queue is at capacity");
        assert_eq!(
            PoolError::WorkerNotFound(7).to_string(),
            "Worker not found: 7"
        );
        assert_eq!(
            PoolError::PoolAtCapacity(4).to_string(),
            "Pool already has the maximum of 4 workers"
        );
    }
}
