//! Capture and service configuration.
//!
//! `CaptureOptions` is the per-request knob set; `normalized()` applies the
//! documented clamps so the rest of the pipeline never re-validates.
//! `ServiceConfig` holds process-wide directories, concurrency limits and
//! retention policies.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use crate::utils::constants::{
    BATCH_RETENTION, CAPTURE_CRAWL_PARALLELISM, DEFAULT_DOWNLOAD_CONCURRENCY, DEFAULT_MIN_DELAY,
    DEFAULT_MAX_CONCURRENT_JOBS, JOB_RETENTION, TEMP_RETENTION, TEST_CRAWL_RETENTION,
};

/// Multi-page traversal options, clamped to safe bounds.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct MultiPageOptions {
    pub enabled: bool,
    /// BFS depth limit, clamped to [1, 3].
    pub depth: u8,
    /// Page budget, clamped to [1, 100].
    pub max_pages: usize,
    /// Restrict traversal to the seed hostname.
    pub same_domain_only: bool,
}

impl Default for MultiPageOptions {
    fn default() -> Self {
        Self {
            enabled: false,
            depth: 1,
            max_pages: 10,
            same_domain_only: true,
        }
    }
}

/// Per-capture options as accepted from the queue boundary.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CaptureOptions {
    /// Inline `<style>` blocks are preserved in place.
    pub inline_styles: bool,
    /// Download PDF links referenced by the page.
    pub include_pdfs: bool,
    /// Navigation timeout in milliseconds, clamped to [5000, 120000].
    pub timeout_ms: u64,
    pub multi_page: MultiPageOptions,
    /// Explicit user agent. When absent one is drawn from the realistic
    /// browser pool at capture start.
    pub user_agent: Option<String>,
    /// Extra request headers applied to page navigation and resource GETs.
    #[serde(default)]
    pub headers: HashMap<String, String>,
    /// Accepted for compatibility; the pipeline does not consume it.
    pub include_screenshot: bool,
}

impl Default for CaptureOptions {
    fn default() -> Self {
        Self {
            inline_styles: true,
            include_pdfs: false,
            timeout_ms: 30_000,
            multi_page: MultiPageOptions::default(),
            user_agent: None,
            headers: HashMap::new(),
            include_screenshot: false,
        }
    }
}

impl CaptureOptions {
    /// Apply the documented clamps. Idempotent.
    #[must_use]
    pub fn normalized(mut self) -> Self {
        self.timeout_ms = self.timeout_ms.clamp(5_000, 120_000);
        self.multi_page.depth = self.multi_page.depth.clamp(1, 3);
        self.multi_page.max_pages = self.multi_page.max_pages.clamp(1, 100);
        self
    }

    /// Navigation timeout as a `Duration`.
    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    #[must_use]
    pub fn with_multi_page(mut self, multi_page: MultiPageOptions) -> Self {
        self.multi_page = multi_page;
        self
    }

    #[must_use]
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }

    #[must_use]
    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }
}

/// Discovery-only crawl options for test crawls.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DiscoveryOptions {
    /// BFS depth limit, clamped to [1, 10].
    pub depth: u8,
    /// Page budget, default 100.
    pub max_pages: usize,
    pub same_domain_only: bool,
    /// Per-page navigation timeout in milliseconds.
    pub timeout_ms: u64,
}

impl Default for DiscoveryOptions {
    fn default() -> Self {
        Self {
            depth: 2,
            max_pages: 100,
            same_domain_only: true,
            timeout_ms: 30_000,
        }
    }
}

impl DiscoveryOptions {
    /// Apply the documented clamps. Idempotent.
    #[must_use]
    pub fn normalized(mut self) -> Self {
        self.depth = self.depth.clamp(1, 10);
        if self.max_pages == 0 {
            self.max_pages = 100;
        }
        self
    }

    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Retention windows for the cleanup sweeps.
#[derive(Debug, Clone)]
pub struct RetentionPolicy {
    pub jobs: Duration,
    pub batches: Duration,
    pub test_crawls: Duration,
    pub temp_files: Duration,
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self {
            jobs: JOB_RETENTION,
            batches: BATCH_RETENTION,
            test_crawls: TEST_CRAWL_RETENTION,
            temp_files: TEMP_RETENTION,
        }
    }
}

/// Process-wide service configuration.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Base directory holding `captures/`.
    pub storage_dir: PathBuf,
    /// Scratch space for in-flight downloads, one subdirectory per session.
    pub temp_dir: PathBuf,
    /// Capture jobs allowed to run at once.
    pub max_concurrent_jobs: usize,
    /// Page-actions the capture crawler runs in parallel.
    pub crawl_parallelism: usize,
    /// Resource downloads issued in parallel within one page.
    pub download_concurrency: usize,
    /// Minimum spacing between requests to one domain.
    pub min_delay: Duration,
    pub retention: RetentionPolicy,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            storage_dir: PathBuf::from("./data"),
            temp_dir: std::env::temp_dir().join("pagevault"),
            max_concurrent_jobs: DEFAULT_MAX_CONCURRENT_JOBS,
            crawl_parallelism: CAPTURE_CRAWL_PARALLELISM,
            download_concurrency: DEFAULT_DOWNLOAD_CONCURRENCY,
            min_delay: DEFAULT_MIN_DELAY,
            retention: RetentionPolicy::default(),
        }
    }
}

impl ServiceConfig {
    #[must_use]
    pub fn with_storage_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.storage_dir = dir.into();
        self
    }

    #[must_use]
    pub fn with_temp_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.temp_dir = dir.into();
        self
    }

    #[must_use]
    pub fn with_max_concurrent_jobs(mut self, n: usize) -> Self {
        self.max_concurrent_jobs = n.max(1);
        self
    }

    #[must_use]
    pub fn with_min_delay(mut self, delay: Duration) -> Self {
        self.min_delay = delay;
        self
    }

    /// Directory the capture store lives in.
    #[must_use]
    pub fn captures_dir(&self) -> PathBuf {
        self.storage_dir.join("captures")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeout_clamps_to_documented_range() {
        let low = CaptureOptions::default().with_timeout_ms(10).normalized();
        assert_eq!(low.timeout_ms, 5_000);
        let high = CaptureOptions::default().with_timeout_ms(900_000).normalized();
        assert_eq!(high.timeout_ms, 120_000);
    }

    #[test]
    fn multi_page_clamps() {
        let mut opts = CaptureOptions::default();
        opts.multi_page = MultiPageOptions {
            enabled: true,
            depth: 9,
            max_pages: 5_000,
            same_domain_only: true,
        };
        let normalized = opts.normalized();
        assert_eq!(normalized.multi_page.depth, 3);
        assert_eq!(normalized.multi_page.max_pages, 100);
    }

    #[test]
    fn discovery_depth_clamps() {
        let opts = DiscoveryOptions {
            depth: 50,
            max_pages: 0,
            ..Default::default()
        }
        .normalized();
        assert_eq!(opts.depth, 10);
        assert_eq!(opts.max_pages, 100);
    }
}
