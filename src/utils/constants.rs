//! Shared configuration constants.
//!
//! Default values used throughout the codebase to avoid magic numbers.

use std::time::Duration;

/// Default minimum spacing between requests to the same domain.
pub const DEFAULT_MIN_DELAY: Duration = Duration::from_millis(1000);

/// Upper bound for any Retry-After wait.
pub const MAX_RETRY_AFTER: Duration = Duration::from_secs(300);

/// Default number of capture jobs allowed to run concurrently.
pub const DEFAULT_MAX_CONCURRENT_JOBS: usize = 3;

/// Page-actions processed in parallel by the capture-mode crawler.
pub const CAPTURE_CRAWL_PARALLELISM: usize = 3;

/// Resource downloads issued in parallel within one page.
pub const DEFAULT_DOWNLOAD_CONCURRENCY: usize = 5;

/// Per-resource GET timeout.
pub const RESOURCE_TIMEOUT: Duration = Duration::from_secs(30);

/// Stylesheet text fetch timeout for font extraction.
pub const STYLESHEET_FETCH_TIMEOUT: Duration = Duration::from_secs(15);

/// Maximum redirects followed for a resource GET.
pub const MAX_REDIRECTS: usize = 5;

/// Retry attempts for `download_with_retry`.
pub const DEFAULT_DOWNLOAD_RETRIES: u32 = 3;

/// Generated filenames are capped at this many characters, extension included.
pub const MAX_FILENAME_LEN: usize = 100;

/// Per-resource weights for the discovery size estimate.
pub const IMAGE_WEIGHT: u64 = 50_000;
pub const CSS_WEIGHT: u64 = 20_000;
pub const JS_WEIGHT: u64 = 30_000;
pub const FONT_WEIGHT: u64 = 15_000;

/// Retention defaults for the cleanup sweeps.
pub const JOB_RETENTION: Duration = Duration::from_secs(7 * 24 * 3600);
pub const BATCH_RETENTION: Duration = Duration::from_secs(7 * 24 * 3600);
pub const TEST_CRAWL_RETENTION: Duration = Duration::from_secs(2 * 24 * 3600);
pub const TEMP_RETENTION: Duration = Duration::from_secs(24 * 3600);

/// Pool of current desktop browser user agents. One is drawn per capture
/// when the request carries none.
pub const USER_AGENT_POOL: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/132.0.6834.160 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/132.0.6834.110 Safari/537.36",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.6778.204 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:134.0) Gecko/20100101 Firefox/134.0",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/18.2 Safari/605.1.15",
];

/// Pick a user agent from the pool.
#[must_use]
pub fn pick_user_agent() -> &'static str {
    use rand::Rng;
    let idx = rand::rng().random_range(0..USER_AGENT_POOL.len());
    USER_AGENT_POOL[idx]
}
