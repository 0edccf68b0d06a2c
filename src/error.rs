//! Error types for capture operations.
//!
//! Per-resource failures are recorded in job stats and never surface here;
//! these variants are the terminal outcomes a job, crawl, or store call can
//! report.

use thiserror::Error;

/// Error type covering the capture pipeline and its supporting services.
#[derive(Debug, Clone, Error)]
pub enum CaptureError {
    /// Browser navigation failed or timed out; fails the job.
    #[error("navigation failed: {0}")]
    Navigation(String),

    /// In-page evaluation threw; fails the job.
    #[error("page extraction failed: {0}")]
    Extraction(String),

    /// A single resource fetch failed. Recorded per-kind in job stats,
    /// does not fail the job.
    #[error("download failed for {url}: {reason}")]
    Download { url: String, reason: String },

    /// HTTP 429 that survived the Retry-After retry.
    #[error("rate limited: {0}")]
    RateLimited(String),

    /// Rewrite pass failed on an element; element is left untouched.
    #[error("rewrite failed: {0}")]
    Rewrite(String),

    /// Directory or index write failed; the capture directory is removed.
    #[error("persistence failed: {0}")]
    Persistence(String),

    /// Test crawl cancelled by user.
    #[error("Cancelled by user")]
    Cancelled,

    /// Browser-level failure (launch, page creation, CDP).
    #[error("browser error: {0}")]
    Browser(String),

    /// Invalid configuration reached the core.
    #[error("configuration error: {0}")]
    Config(String),

    /// Anything else.
    #[error("{0}")]
    Other(String),
}

impl From<anyhow::Error> for CaptureError {
    fn from(err: anyhow::Error) -> Self {
        // {:#} preserves the full context chain
        Self::Other(format!("{err:#}"))
    }
}

/// Convenience alias used across the crate.
pub type CaptureResult<T> = std::result::Result<T, CaptureError>;
