pub mod dispatcher;
pub mod job;
pub mod ledger;
pub mod registry;

pub use dispatcher::Dispatcher;
pub use job::{Job, JobOutcome, JobStatus};
pub use ledger::{JobLedger, JobRecord};
pub use registry::{WorkerHandle, WorkerRegistry};
