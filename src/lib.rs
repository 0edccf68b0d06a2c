//! pagevault — faithful archiving of live web pages into self-contained,
//! locally browsable snapshots.
//!
//! The pipeline renders a page in a headless browser, harvests every
//! referenced resource (images including srcset, stylesheets, scripts,
//! web fonts, favicon), downloads them server-side, rewrites the HTML and
//! CSS to point at the local copies, and persists the result as a capture
//! directory with a sidecar manifest and a queryable index.

pub mod browser;
pub mod config;
pub mod crawler;
pub mod detector;
pub mod downloader;
pub mod error;
pub mod export;
pub mod extractor;
pub mod jobs;
pub mod orchestrator;
pub mod rate_limit;
pub mod rewriter;
pub mod store;
pub mod test_crawl;
pub mod utils;

pub use browser::{Browser, BrowserPage, ChromiumBrowser, InterceptPolicy, WaitUntil};
pub use config::{CaptureOptions, DiscoveryOptions, MultiPageOptions, ServiceConfig};
pub use crawler::{CapturedPage, Crawler, DiscoveredPage};
pub use downloader::{ResourceDescriptor, ResourceDownloader, ResourceKind};
pub use error::{CaptureError, CaptureResult};
pub use jobs::{BatchStatus, BatchTracker, CaptureJob, JobStatus, JobTracker};
pub use orchestrator::Orchestrator;
pub use rate_limit::RateLimiter;
pub use rewriter::UrlMap;
pub use store::{CaptureMetadata, CaptureStore, ListQuery};
pub use test_crawl::{TestCrawlManager, TestCrawlStatus};
