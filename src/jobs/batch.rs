//! Batch aggregation over capture jobs.
//!
//! A batch mirrors its member jobs' statuses; its own status and progress
//! are derived, never set directly.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::Mutex;

use super::types::JobStatus;

/// Derived batch state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchStatus {
    Pending,
    InProgress,
    Completed,
    Partial,
    Failed,
}

/// One member job as mirrored in the batch.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchMember {
    pub job_id: String,
    pub url: String,
    pub status: JobStatus,
}

/// Summary counters over member statuses. `pending` counts every
/// non-terminal member.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct BatchSummary {
    pub total: usize,
    pub completed: usize,
    pub failed: usize,
    pub pending: usize,
}

/// A set of captures produced by one multi-URL request.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchJob {
    pub batch_id: String,
    pub jobs: Vec<BatchMember>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl BatchJob {
    #[must_use]
    pub fn summary(&self) -> BatchSummary {
        let mut summary = BatchSummary {
            total: self.jobs.len(),
            ..BatchSummary::default()
        };
        for member in &self.jobs {
            match member.status {
                JobStatus::Completed => summary.completed += 1,
                JobStatus::Failed => summary.failed += 1,
                JobStatus::Pending | JobStatus::Processing => summary.pending += 1,
            }
        }
        summary
    }

    /// Derivation rule: all completed → completed; all failed → failed;
    /// mixed terminal with nothing pending → partial; any activity →
    /// in_progress; untouched → pending.
    #[must_use]
    pub fn status(&self) -> BatchStatus {
        let summary = self.summary();
        if summary.total == 0 {
            return BatchStatus::Pending;
        }
        if summary.completed == summary.total {
            return BatchStatus::Completed;
        }
        if summary.failed == summary.total {
            return BatchStatus::Failed;
        }
        if summary.completed > 0 && summary.failed > 0 && summary.pending == 0 {
            return BatchStatus::Partial;
        }
        let any_processing = self
            .jobs
            .iter()
            .any(|m| m.status == JobStatus::Processing);
        if summary.completed > 0 || summary.failed > 0 || any_processing {
            return BatchStatus::InProgress;
        }
        BatchStatus::Pending
    }

    /// completed / total × 100.
    #[must_use]
    pub fn progress(&self) -> u8 {
        let summary = self.summary();
        if summary.total == 0 {
            return 0;
        }
        ((summary.completed * 100) / summary.total) as u8
    }

    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(
            self.status(),
            BatchStatus::Completed | BatchStatus::Partial | BatchStatus::Failed
        )
    }
}

/// Registry of batches.
#[derive(Default)]
pub struct BatchTracker {
    batches: Mutex<HashMap<String, BatchJob>>,
}

impl BatchTracker {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a batch over (job id, url) members.
    pub async fn create_batch(&self, members: Vec<(String, String)>) -> BatchJob {
        let batch = BatchJob {
            batch_id: uuid::Uuid::new_v4().to_string(),
            jobs: members
                .into_iter()
                .map(|(job_id, url)| BatchMember {
                    job_id,
                    url,
                    status: JobStatus::Pending,
                })
                .collect(),
            created_at: Utc::now(),
            completed_at: None,
        };
        let snapshot = batch.clone();
        self.batches
            .lock()
            .await
            .insert(batch.batch_id.clone(), batch);
        snapshot
    }

    /// Mirror a member job's status change into its batch.
    pub async fn update_member(&self, batch_id: &str, job_id: &str, status: JobStatus) {
        let mut batches = self.batches.lock().await;
        if let Some(batch) = batches.get_mut(batch_id) {
            if let Some(member) = batch.jobs.iter_mut().find(|m| m.job_id == job_id) {
                member.status = status;
            }
            if batch.is_terminal() && batch.completed_at.is_none() {
                batch.completed_at = Some(Utc::now());
            }
        }
    }

    pub async fn get_batch(&self, batch_id: &str) -> Option<BatchJob> {
        self.batches.lock().await.get(batch_id).cloned()
    }

    /// Drop terminal batches older than `max_age`. Returns the number
    /// removed.
    pub async fn cleanup_old_batches(&self, max_age: Duration) -> usize {
        let cutoff = Utc::now()
            - chrono::Duration::from_std(max_age).unwrap_or_else(|_| chrono::Duration::days(7));
        let mut batches = self.batches.lock().await;
        let before = batches.len();
        batches.retain(|_, batch| {
            !(batch.is_terminal() && batch.completed_at.is_some_and(|done| done < cutoff))
        });
        before - batches.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn batch_with(statuses: &[JobStatus]) -> BatchJob {
        BatchJob {
            batch_id: "b".to_string(),
            jobs: statuses
                .iter()
                .enumerate()
                .map(|(i, status)| BatchMember {
                    job_id: format!("j{i}"),
                    url: format!("https://example.test/{i}"),
                    status: *status,
                })
                .collect(),
            created_at: Utc::now(),
            completed_at: None,
        }
    }

    #[test]
    fn derives_all_statuses() {
        use JobStatus::{Completed, Failed, Pending, Processing};
        assert_eq!(batch_with(&[Pending, Pending]).status(), BatchStatus::Pending);
        assert_eq!(batch_with(&[Processing, Pending]).status(), BatchStatus::InProgress);
        assert_eq!(batch_with(&[Completed, Pending]).status(), BatchStatus::InProgress);
        assert_eq!(batch_with(&[Completed, Completed]).status(), BatchStatus::Completed);
        assert_eq!(batch_with(&[Failed, Failed]).status(), BatchStatus::Failed);
        assert_eq!(batch_with(&[Completed, Failed]).status(), BatchStatus::Partial);
        assert_eq!(batch_with(&[Completed, Failed, Pending]).status(), BatchStatus::InProgress);
    }

    #[test]
    fn progress_is_completed_share() {
        use JobStatus::{Completed, Pending};
        let batch = batch_with(&[Completed, Completed, Pending, Pending]);
        assert_eq!(batch.progress(), 50);
    }
}
