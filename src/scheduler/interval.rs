//! Scheduler on top of tokio timers
//!
//! Specs are `@every <duration>`, a bare duration, or a cron expression (see
//! [`CronSchedule`]). Durations are one or more `<number><unit>` groups with
//! units `ms`, `s`, `m` and `h`, e.g. `500ms`, `10s` or `1m30s`, and may not
//! exceed [`MAX_INTERVAL`].
//!
//! Every tick spawns the job body as its own task, so a run that outlasts
//! the interval overlaps with the next one.

use super::cron::CronSchedule;
use super::{Job, JobHandle, Scheduler, SchedulerError};
use chrono::Local;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, warn};

const EVERY_PREFIX: &str = "@every";

/// Longest accepted interval
pub const MAX_INTERVAL: Duration = Duration::from_secs(365 * 24 * 3600);

enum Cadence {
    Every(Duration),
    Cron(CronSchedule),
}

fn parse_spec(spec: &str) -> Result<Cadence, SchedulerError> {
    let body = spec.trim();
    if !body.starts_with(EVERY_PREFIX) && (body.starts_with('@') || body.contains(char::is_whitespace))
    {
        let schedule = CronSchedule::parse(spec)?;
        if schedule.next_fire(Local::now()).is_none() {
            return Err(SchedulerError::UnsupportedSpec(spec.to_string()));
        }
        return Ok(Cadence::Cron(schedule));
    }
    parse_interval(spec).map(Cadence::Every)
}

/// Parse an interval spec into a period
pub fn parse_interval(spec: &str) -> Result<Duration, SchedulerError> {
    let unsupported = || SchedulerError::UnsupportedSpec(spec.to_string());

    let body = spec.trim();
    let body = body.strip_prefix(EVERY_PREFIX).unwrap_or(body).trim();
    if body.is_empty() {
        return Err(unsupported());
    }

    let mut total = Duration::ZERO;
    let mut rest = body;
    while !rest.is_empty() {
        let digits = rest
            .find(|c: char| !c.is_ascii_digit())
            .ok_or_else(unsupported)?;
        if digits == 0 {
            return Err(unsupported());
        }
        let amount: u64 = rest[..digits].parse().map_err(|_| unsupported())?;
        rest = &rest[digits..];

        let unit_len = rest
            .find(|c: char| c.is_ascii_digit())
            .unwrap_or(rest.len());
        let unit = match &rest[..unit_len] {
            "ms" => Some(Duration::from_millis(amount)),
            "s" => Some(Duration::from_secs(amount)),
            "m" => amount.checked_mul(60).map(Duration::from_secs),
            "h" => amount.checked_mul(3600).map(Duration::from_secs),
            _ => None,
        }
        .ok_or_else(unsupported)?;
        total = total
            .checked_add(unit)
            .filter(|total| *total <= MAX_INTERVAL)
            .ok_or_else(unsupported)?;
        rest = &rest[unit_len..];
    }

    if total.is_zero() {
        return Err(SchedulerError::ZeroInterval(spec.to_string()));
    }
    Ok(total)
}

/// Runs each job on its own interval task
#[derive(Default)]
pub struct IntervalScheduler {
    next_id: AtomicU64,
    jobs: Mutex<HashMap<JobHandle, JoinHandle<()>>>,
}

impl IntervalScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of active jobs
    pub fn job_count(&self) -> usize {
        self.jobs.lock().len()
    }
}

impl Scheduler for IntervalScheduler {
    fn add_func(&self, spec: &str, job: Job) -> Result<JobHandle, SchedulerError> {
        let cadence = parse_spec(spec)?;
        let handle = JobHandle(self.next_id.fetch_add(1, Ordering::SeqCst) + 1);

        let task = match cadence {
            Cadence::Every(period) => {
                debug!("Scheduled {} every {:?}", handle, period);
                tokio::spawn(run_every(period, job))
            }
            Cadence::Cron(schedule) => {
                debug!("Scheduled {} on {:?}", handle, spec);
                tokio::spawn(run_cron(handle, schedule, job))
            }
        };
        self.jobs.lock().insert(handle, task);
        Ok(handle)
    }

    fn remove(&self, handle: JobHandle) {
        if let Some(task) = self.jobs.lock().remove(&handle) {
            task.abort();
            debug!("Removed {}", handle);
        }
    }
}

async fn run_every(period: Duration, job: Job) {
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    loop {
        ticker.tick().await;
        tokio::spawn(job());
    }
}

async fn run_cron(handle: JobHandle, schedule: CronSchedule, job: Job) {
    loop {
        let now = Local::now();
        let Some(next) = schedule.next_fire(now) else {
            warn!("{} has no further fire times, stopping", handle);
            return;
        };
        tokio::time::sleep((next - now).to_std().unwrap_or_default()).await;
        tokio::spawn(job());
    }
}

impl Drop for IntervalScheduler {
    fn drop(&mut self) {
        for (_, task) in self.jobs.get_mut().drain() {
            task.abort();
        }
    }
}
