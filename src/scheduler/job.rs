use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Queued,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl JobStatus {
    pub fn is_finished(&self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled
        )
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobStatus::Queued => write!(f, "queued"),
            JobStatus::Running => write!(f, "running"),
            JobStatus::Completed => write!(f, "completed"),
            JobStatus::Failed => write!(f, "failed"),
            JobStatus::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// One unit of submitted work.
///
/// Immutable once built: the dispatcher moves it into exactly one worker's
/// inbox and the worker consumes it.
#[derive(Debug, Clone)]
pub struct Job {
    id: Uuid,
    name: String,
    delay: Duration,
    input: u64,
    submitted_at: DateTime<Utc>,
}

impl Job {
    pub fn new(name: impl Into<String>, delay: Duration, input: u64) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            delay,
            input,
            submitted_at: Utc::now(),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Simulated latency applied after the kernel returns.
    pub fn delay(&self) -> Duration {
        self.delay
    }

    pub fn input(&self) -> u64 {
        self.input
    }

    pub fn submitted_at(&self) -> DateTime<Utc> {
        self.submitted_at
    }
}

/// What a worker reports once it is done with a job.
#[derive(Debug, Clone, Serialize)]
pub struct JobOutcome {
    pub job_id: Uuid,
    pub name: String,
    pub input: u64,
    pub worker_id: usize,
    pub result: Result<u64, String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl JobOutcome {
    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }
}
