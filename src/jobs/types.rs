//! Capture job records: status, step log and statistics.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::config::CaptureOptions;
use crate::downloader::ResourceKind;

/// Lifecycle state of a capture job. Transitions are monotonic:
/// pending → processing → {completed | failed}.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl JobStatus {
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

/// State of one pipeline step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepState {
    InProgress,
    Completed,
    Failed,
}

/// One entry in the ordered step log.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobStep {
    pub name: String,
    pub state: StepState,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
}

/// One failed resource with its reason.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceFailure {
    pub url: String,
    pub error: String,
}

/// Per-kind success counters.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct KindCounters {
    pub images: u32,
    pub stylesheets: u32,
    pub scripts: u32,
    pub fonts: u32,
    #[serde(default)]
    pub pdfs: u32,
}

impl KindCounters {
    pub fn bump(&mut self, kind: ResourceKind) {
        match kind {
            ResourceKind::Image | ResourceKind::Favicon => self.images += 1,
            ResourceKind::Stylesheet => self.stylesheets += 1,
            ResourceKind::Script => self.scripts += 1,
            ResourceKind::Font => self.fonts += 1,
            ResourceKind::Pdf => self.pdfs += 1,
        }
    }
}

/// Per-kind failure lists.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FailedResources {
    pub images: Vec<ResourceFailure>,
    pub stylesheets: Vec<ResourceFailure>,
    pub scripts: Vec<ResourceFailure>,
    pub fonts: Vec<ResourceFailure>,
    #[serde(default)]
    pub pdfs: Vec<ResourceFailure>,
}

impl FailedResources {
    pub fn push(&mut self, kind: ResourceKind, failure: ResourceFailure) {
        match kind {
            ResourceKind::Image | ResourceKind::Favicon => self.images.push(failure),
            ResourceKind::Stylesheet => self.stylesheets.push(failure),
            ResourceKind::Script => self.scripts.push(failure),
            ResourceKind::Font => self.fonts.push(failure),
            ResourceKind::Pdf => self.pdfs.push(failure),
        }
    }
}

/// Running statistics for a capture job.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobStats {
    pub pages_processed: u32,
    pub total_pages: u32,
    pub resources_downloaded: u32,
    pub total_resources: u32,
    pub succeeded: KindCounters,
    pub failed: FailedResources,
}

/// One URL's capture, tracked in memory until swept.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CaptureJob {
    pub id: String,
    pub url: String,
    pub options: CaptureOptions,
    pub status: JobStatus,
    /// 0..=100.
    pub progress: u8,
    pub current_step: Option<String>,
    pub steps: Vec<JobStep>,
    pub output_path: Option<PathBuf>,
    /// Capture id in the store once persisted.
    pub capture_id: Option<String>,
    pub error: Option<String>,
    pub stats: JobStats,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl CaptureJob {
    #[must_use]
    pub fn new(url: impl Into<String>, options: CaptureOptions) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            url: url.into(),
            options,
            status: JobStatus::Pending,
            progress: 0,
            current_step: None,
            steps: Vec::new(),
            output_path: None,
            capture_id: None,
            error: None,
            stats: JobStats::default(),
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
        }
    }
}
