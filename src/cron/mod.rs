//! Background jobs on fixed intervals
//!
//! Only scheduled when `CRON_JOBS_ENABLE` is set. A failing run is logged and
//! the job stays scheduled; all jobs stop with the process.

mod session_cleanup;

pub use session_cleanup::{SessionCleanupJob, SESSION_CLEANUP_EVERY};

use crate::server::ShutdownSignal;
use async_trait::async_trait;
use futures::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{error, info};

#[derive(Debug, Error)]
pub enum JobError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("{0}")]
    Failed(String),
}

/// A periodic background job
#[async_trait]
pub trait Job: Send + Sync {
    fn name(&self) -> &str;

    /// Period between two runs; the first run happens one period after start
    fn every(&self) -> Duration;

    /// One run; returns the number of affected items for the log
    async fn run(&self) -> Result<u64, JobError>;
}

pub struct Scheduler {
    jobs: Vec<Arc<dyn Job>>,
}

impl Scheduler {
    pub fn new(jobs: Vec<Arc<dyn Job>>) -> Self {
        Self { jobs }
    }

    /// Run every job on its period until `shutdown` fires
    pub async fn run(self, shutdown: ShutdownSignal) {
        if self.jobs.is_empty() {
            return;
        }
        info!(jobs = self.jobs.len(), "Scheduler started");
        join_all(
            self.jobs
                .iter()
                .map(|job| run_job(job.as_ref(), shutdown.clone())),
        )
        .await;
        info!("Scheduler stopped");
    }
}

async fn run_job(job: &dyn Job, mut shutdown: ShutdownSignal) {
    let every = job.every();
    let mut ticks = interval_at(Instant::now() + every, every);
    ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticks.tick() => {}
            _ = shutdown.wait() => return,
        }

        info!(job = %job.name(), "Starting job");
        match job.run().await {
            Ok(affected) => info!(job = %job.name(), affected, "Job completed"),
            Err(e) => error!(job = %job.name(), error = %e, "Job failed"),
        }
    }
}

/// Mock job for testing: counts runs, optionally fails every run
#[cfg(test)]
pub struct MockJob {
    every: Duration,
    fail: bool,
    runs: std::sync::atomic::AtomicU64,
}

#[cfg(test)]
impl MockJob {
    pub fn new(every: Duration, fail: bool) -> Self {
        Self {
            every,
            fail,
            runs: std::sync::atomic::AtomicU64::new(0),
        }
    }

    pub fn runs(&self) -> u64 {
        self.runs.load(std::sync::atomic::Ordering::SeqCst)
    }
}

#[cfg(test)]
#[async_trait]
impl Job for MockJob {
    fn name(&self) -> &str {
        "mock"
    }

    fn every(&self) -> Duration {
        self.every
    }

    async fn run(&self) -> Result<u64, JobError> {
        let runs = self.runs.fetch_add(1, std::sync::atomic::Ordering::SeqCst) + 1;
        if self.fail {
            Err(JobError::Failed("mock failure".to_string()))
        } else {
            Ok(runs)
        }
    }
}

#[cfg(test)]
#[path = "scheduler_test.rs"]
mod scheduler_tests;
