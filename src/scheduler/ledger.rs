use std::collections::{HashMap, VecDeque};

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::scheduler::job::{Job, JobOutcome, JobStatus};

const DEFAULT_MAX_RECORDS: usize = 10_000;

/// Observable lifecycle of a single job.
#[derive(Debug, Clone, Serialize)]
pub struct JobRecord {
    pub id: Uuid,
    pub name: String,
    pub input: u64,
    pub delay_ms: u64,
    pub status: JobStatus,
    pub worker_id: Option<usize>,
    pub result: Option<u64>,
    pub error: Option<String>,
    pub submitted_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl JobRecord {
    fn queued(job: &Job) -> Self {
        Self {
            id: job.id(),
            name: job.name().to_string(),
            input: job.input(),
            delay_ms: u64::try_from(job.delay().as_millis()).unwrap_or(u64::MAX),
            status: JobStatus::Queued,
            worker_id: None,
            result: None,
            error: None,
            submitted_at: job.submitted_at(),
            started_at: None,
            finished_at: None,
        }
    }
}

/// Bounded in-memory history of submitted jobs.
///
/// Purely observational: dispatch never reads it. When full, the oldest
/// finished record is evicted to make room; unfinished records are never
/// evicted.
#[derive(Debug)]
pub struct JobLedger {
    records: HashMap<Uuid, JobRecord>,
    order: VecDeque<Uuid>,
    max_records: usize,
}

impl Default for JobLedger {
    fn default() -> Self {
        Self::new()
    }
}

impl JobLedger {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_MAX_RECORDS)
    }

    pub fn with_capacity(max_records: usize) -> Self {
        Self {
            records: HashMap::new(),
            order: VecDeque::new(),
            max_records: max_records.max(1),
        }
    }

    /// Record a freshly admitted job. Returns false if every slot holds an
    /// unfinished job.
    pub fn record_queued(&mut self, job: &Job) -> bool {
        if self.records.len() >= self.max_records && !self.evict_oldest_finished() {
            tracing::warn!(job_id = %job.id(), "Job ledger full, record skipped");
            return false;
        }
        self.records.insert(job.id(), JobRecord::queued(job));
        self.order.push_back(job.id());
        true
    }

    pub fn mark_running(&mut self, id: &Uuid, worker_id: usize, started_at: DateTime<Utc>) -> bool {
        match self.records.get_mut(id) {
            Some(record) => {
                record.status = JobStatus::Running;
                record.worker_id = Some(worker_id);
                record.started_at = Some(started_at);
                true
            }
            None => false,
        }
    }

    pub fn mark_finished(&mut self, outcome: &JobOutcome) -> bool {
        match self.records.get_mut(&outcome.job_id) {
            Some(record) => {
                record.worker_id = Some(outcome.worker_id);
                record.started_at = Some(outcome.started_at);
                record.finished_at = Some(outcome.finished_at);
                match &outcome.result {
                    Ok(value) => {
                        record.status = JobStatus::Completed;
                        record.result = Some(*value);
                    }
                    Err(e) => {
                        record.status = JobStatus::Failed;
                        record.error = Some(e.clone());
                    }
                }
                true
            }
            None => false,
        }
    }

    /// Mark a job that was accepted but never reached a worker.
    pub fn mark_cancelled(&mut self, id: &Uuid, reason: &str) -> bool {
        match self.records.get_mut(id) {
            Some(record) => {
                record.status = JobStatus::Cancelled;
                record.error = Some(reason.to_string());
                record.finished_at = Some(Utc::now());
                true
            }
            None => false,
        }
    }

    pub fn get(&self, id: &Uuid) -> Option<&JobRecord> {
        self.records.get(id)
    }

    /// All records in submission order.
    pub fn all(&self) -> Vec<&JobRecord> {
        self.order
            .iter()
            .filter_map(|id| self.records.get(id))
            .collect()
    }

    pub fn with_status(&self, status: JobStatus) -> Vec<&JobRecord> {
        self.all()
            .into_iter()
            .filter(|r| r.status == status)
            .collect()
    }

    /// Drop every finished record. Returns how many were removed.
    pub fn cleanup_finished(&mut self) -> usize {
        let before = self.records.len();
        self.records.retain(|_, r| !r.status.is_finished());
        let records = &self.records;
        self.order.retain(|id| records.contains_key(id));
        before - self.records.len()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    fn evict_oldest_finished(&mut self) -> bool {
        let position = self.order.iter().position(|id| {
            self.records
                .get(id)
                .map(|r| r.status.is_finished())
                .unwrap_or(true)
        });
        match position.and_then(|pos| self.order.remove(pos)) {
            Some(id) => {
                self.records.remove(&id);
                true
            }
            None => false,
        }
    }
}
