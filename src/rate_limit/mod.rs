//! Per-domain request spacing.
//!
//! Every outbound request passes through [`RateLimiter::wait_for_domain`]
//! before departure. Each domain owns an async mutex around its last
//! departure instant; holding the lock across the sleep serializes waits so
//! no two requests to one domain depart less than `min_delay` apart.

use chrono::Utc;
use dashmap::DashMap;
use log::debug;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

use crate::utils::constants::{DEFAULT_MIN_DELAY, MAX_RETRY_AFTER};
use crate::utils::extract_domain;

/// Per-domain politeness limiter.
pub struct RateLimiter {
    min_delay: Duration,
    domains: DashMap<String, Arc<Mutex<Option<Instant>>>>,
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(DEFAULT_MIN_DELAY)
    }
}

impl RateLimiter {
    #[must_use]
    pub fn new(min_delay: Duration) -> Self {
        Self {
            min_delay,
            domains: DashMap::new(),
        }
    }

    /// Minimum spacing this limiter enforces.
    #[must_use]
    pub fn min_delay(&self) -> Duration {
        self.min_delay
    }

    /// Sleep until the domain of `url` is allowed another request, then
    /// stamp the departure. URLs without a recognizable host pass through.
    pub async fn wait_for_domain(&self, url: &str) {
        let Some(domain) = extract_domain(url) else {
            return;
        };

        let slot = self
            .domains
            .entry(domain.clone())
            .or_insert_with(|| Arc::new(Mutex::new(None)))
            .clone();

        // The lock is held across the sleep: concurrent callers for the
        // same domain queue here and each gets its own full `min_delay` slot.
        let mut last_departure = slot.lock().await;
        if let Some(previous) = *last_departure {
            let elapsed = previous.elapsed();
            if elapsed < self.min_delay {
                let remaining = self.min_delay - elapsed;
                debug!("Rate limiting {domain}: waiting {remaining:?}");
                tokio::time::sleep(remaining).await;
            }
        }
        *last_departure = Some(Instant::now());
    }

    /// Honor a `Retry-After` header value: integer seconds or an RFC-1123
    /// date. The wait is clamped to five minutes. Unparseable values are
    /// ignored.
    pub async fn handle_retry_after(&self, value: &str) {
        let Some(wait) = parse_retry_after(value) else {
            debug!("Ignoring unparseable Retry-After value: {value:?}");
            return;
        };
        let wait = wait.min(MAX_RETRY_AFTER);
        debug!("Honoring Retry-After: sleeping {wait:?}");
        tokio::time::sleep(wait).await;
    }

    /// Number of domains currently tracked.
    #[must_use]
    pub fn tracked_count(&self) -> usize {
        self.domains.len()
    }
}

/// Parse a `Retry-After` value into a wait duration.
///
/// Numeric form is seconds; date form (RFC 1123) yields the positive delta
/// from now. Past dates and garbage return `None`.
#[must_use]
pub fn parse_retry_after(value: &str) -> Option<Duration> {
    let trimmed = value.trim();
    if let Ok(seconds) = trimmed.parse::<u64>() {
        return Some(Duration::from_secs(seconds));
    }

    let when = chrono::DateTime::parse_from_rfc2822(trimmed).ok()?;
    let delta = when.signed_duration_since(Utc::now());
    let seconds = delta.num_seconds();
    if seconds > 0 {
        Some(Duration::from_secs(seconds as u64))
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_numeric_retry_after() {
        assert_eq!(parse_retry_after("2"), Some(Duration::from_secs(2)));
        assert_eq!(parse_retry_after(" 10 "), Some(Duration::from_secs(10)));
    }

    #[test]
    fn rejects_garbage_and_past_dates() {
        assert_eq!(parse_retry_after("soon"), None);
        assert_eq!(parse_retry_after("Tue, 15 Nov 1994 08:12:31 GMT"), None);
    }

    #[test]
    fn parses_future_http_date() {
        let future = Utc::now() + chrono::Duration::seconds(90);
        let wait = parse_retry_after(&future.to_rfc2822()).expect("future date parses");
        assert!(wait >= Duration::from_secs(85) && wait <= Duration::from_secs(95));
    }
}
