//! In-memory job tracking.
//!
//! The tracker owns every live `CaptureJob`; capture tasks mutate their job
//! exclusively through it, so a single lock around the map is the whole
//! concurrency story. `running` is bounded by `max_concurrent`.

pub mod batch;
pub mod types;

use chrono::Utc;
use log::debug;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::Mutex;

use crate::config::CaptureOptions;

pub use batch::{BatchJob, BatchMember, BatchStatus, BatchSummary, BatchTracker};
pub use types::{
    CaptureJob, FailedResources, JobStats, JobStatus, JobStep, KindCounters, ResourceFailure,
    StepState,
};

/// Registry of capture jobs.
pub struct JobTracker {
    jobs: Mutex<HashMap<String, CaptureJob>>,
    running: AtomicUsize,
    max_concurrent: usize,
}

impl JobTracker {
    #[must_use]
    pub fn new(max_concurrent: usize) -> Self {
        Self {
            jobs: Mutex::new(HashMap::new()),
            running: AtomicUsize::new(0),
            max_concurrent: max_concurrent.max(1),
        }
    }

    /// Number of jobs currently processing.
    #[must_use]
    pub fn running(&self) -> usize {
        self.running.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn max_concurrent(&self) -> usize {
        self.max_concurrent
    }

    /// Register a new pending job and return a snapshot of it.
    pub async fn create_job(&self, url: &str, options: CaptureOptions) -> CaptureJob {
        let job = CaptureJob::new(url, options);
        let snapshot = job.clone();
        self.jobs.lock().await.insert(job.id.clone(), job);
        snapshot
    }

    /// Move a pending job to processing. Refuses (leaving the job pending)
    /// when the concurrency bound is reached or the job is not pending.
    pub async fn start_job(&self, job_id: &str) -> bool {
        let mut jobs = self.jobs.lock().await;
        let Some(job) = jobs.get_mut(job_id) else {
            return false;
        };
        if job.status != JobStatus::Pending {
            return false;
        }
        if self.running.load(Ordering::Relaxed) >= self.max_concurrent {
            debug!("start_job refused for {job_id}: at capacity");
            return false;
        }
        self.running.fetch_add(1, Ordering::Relaxed);
        job.status = JobStatus::Processing;
        job.started_at = Some(Utc::now());
        true
    }

    /// Open a named step, completing any step still in progress. Only one
    /// step is in progress at a time.
    pub async fn begin_step(&self, job_id: &str, name: &str) {
        let mut jobs = self.jobs.lock().await;
        if let Some(job) = jobs.get_mut(job_id) {
            close_open_step(job, StepState::Completed);
            job.current_step = Some(name.to_string());
            job.steps.push(JobStep {
                name: name.to_string(),
                state: StepState::InProgress,
                started_at: Utc::now(),
                ended_at: None,
            });
        }
    }

    pub async fn set_progress(&self, job_id: &str, progress: u8) {
        let mut jobs = self.jobs.lock().await;
        if let Some(job) = jobs.get_mut(job_id) {
            job.progress = progress.min(100);
        }
    }

    /// Mutate the job's stats in place.
    pub async fn with_stats<F>(&self, job_id: &str, mutate: F)
    where
        F: FnOnce(&mut JobStats),
    {
        let mut jobs = self.jobs.lock().await;
        if let Some(job) = jobs.get_mut(job_id) {
            mutate(&mut job.stats);
        }
    }

    /// Terminal success: close the open step, pin progress to 100 and
    /// release the concurrency slot.
    pub async fn complete_job(
        &self,
        job_id: &str,
        output_path: std::path::PathBuf,
        capture_id: String,
    ) {
        let mut jobs = self.jobs.lock().await;
        if let Some(job) = jobs.get_mut(job_id) {
            if job.status == JobStatus::Processing {
                self.running.fetch_sub(1, Ordering::Relaxed);
            }
            close_open_step(job, StepState::Completed);
            job.status = JobStatus::Completed;
            job.progress = 100;
            job.current_step = None;
            job.output_path = Some(output_path);
            job.capture_id = Some(capture_id);
            job.completed_at = Some(Utc::now());
        }
    }

    /// Terminal failure: the open step is marked failed and the slot
    /// released.
    pub async fn fail_job(&self, job_id: &str, error: &str) {
        let mut jobs = self.jobs.lock().await;
        if let Some(job) = jobs.get_mut(job_id) {
            if job.status == JobStatus::Processing {
                self.running.fetch_sub(1, Ordering::Relaxed);
            }
            close_open_step(job, StepState::Failed);
            job.status = JobStatus::Failed;
            job.current_step = None;
            job.error = Some(error.to_string());
            job.completed_at = Some(Utc::now());
        }
    }

    /// Snapshot of one job.
    pub async fn get_job(&self, job_id: &str) -> Option<CaptureJob> {
        self.jobs.lock().await.get(job_id).cloned()
    }

    /// Snapshots of all jobs.
    pub async fn list_jobs(&self) -> Vec<CaptureJob> {
        self.jobs.lock().await.values().cloned().collect()
    }

    /// Drop finished jobs whose completion time is older than `max_age`.
    /// Returns the number removed.
    pub async fn cleanup_old_jobs(&self, max_age: Duration) -> usize {
        let cutoff = Utc::now()
            - chrono::Duration::from_std(max_age).unwrap_or_else(|_| chrono::Duration::days(7));
        let mut jobs = self.jobs.lock().await;
        let before = jobs.len();
        jobs.retain(|_, job| {
            !(job.status.is_terminal()
                && job.completed_at.is_some_and(|done| done < cutoff))
        });
        before - jobs.len()
    }
}

fn close_open_step(job: &mut CaptureJob, state: StepState) {
    if let Some(step) = job
        .steps
        .iter_mut()
        .rev()
        .find(|s| s.state == StepState::InProgress)
    {
        step.state = state;
        step.ended_at = Some(Utc::now());
    }
}
