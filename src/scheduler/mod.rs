//! Recurring job scheduling
//!
//! The interceptor registers one job per `schedule` action from the model and
//! keeps the returned handles so the jobs can be removed on teardown.

mod cron;
mod interval;

pub use interval::IntervalScheduler;

use futures::future::BoxFuture;
use std::sync::Arc;
use thiserror::Error;

/// Body of a recurring job; each run gets a fresh future
pub type Job = Arc<dyn Fn() -> BoxFuture<'static, ()> + Send + Sync>;

/// Scheduler-issued identifier for a registered job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct JobHandle(pub u64);

impl std::fmt::Display for JobHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "job-{}", self.0)
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SchedulerError {
    #[error("unsupported interval spec: {0:?}")]
    UnsupportedSpec(String),

    #[error("interval must be greater than zero: {0:?}")]
    ZeroInterval(String),
}

pub trait Scheduler: Send + Sync {
    /// Run `job` repeatedly at the cadence described by `spec`
    fn add_func(&self, spec: &str, job: Job) -> Result<JobHandle, SchedulerError>;

    /// Stop a job; unknown handles are ignored
    fn remove(&self, handle: JobHandle);
}
