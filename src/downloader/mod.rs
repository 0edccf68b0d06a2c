//! Rate-limited resource downloading with per-session deduplication.
//!
//! One `ResourceDownloader` exists per capture session. Bytes land in the
//! session's temp directory; the capture store later copies them into their
//! bucket. Repeat requests for a URL return the cached descriptor, so a
//! multi-page capture fetches each asset once.

pub mod filename;

use anyhow::{Context, Result};
use dashmap::DashMap;
use futures::future::join_all;
use log::{debug, warn};
use serde::Serialize;
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use url::Url;

use crate::config::ServiceConfig;
use crate::error::CaptureError;
use crate::rate_limit::RateLimiter;
use crate::utils::constants::{DEFAULT_DOWNLOAD_RETRIES, MAX_REDIRECTS, RESOURCE_TIMEOUT};

/// Bucket a resource belongs to inside the capture directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceKind {
    Image,
    Stylesheet,
    Script,
    Font,
    /// Linked PDF documents, downloaded when the capture opts in.
    Pdf,
    /// Saved at the capture root rather than in a bucket.
    Favicon,
}

impl ResourceKind {
    /// Subdirectory for this kind, `None` for root-level resources.
    #[must_use]
    pub fn bucket(&self) -> Option<&'static str> {
        match self {
            Self::Image => Some("images"),
            Self::Stylesheet => Some("css"),
            Self::Script => Some("js"),
            Self::Font => Some("fonts"),
            Self::Pdf => Some("pdfs"),
            Self::Favicon => None,
        }
    }
}

/// Record of one successfully downloaded resource.
#[derive(Debug, Clone, Serialize)]
pub struct ResourceDescriptor {
    /// Absolute URL as requested.
    pub url: String,
    /// Where the bytes currently live (session temp directory).
    pub local_path: PathBuf,
    pub filename: String,
    pub content_type: String,
    pub size: u64,
    pub kind: ResourceKind,
}

impl ResourceDescriptor {
    /// Relative archive path this resource will occupy.
    #[must_use]
    pub fn archive_path(&self) -> String {
        match self.kind.bucket() {
            Some(bucket) => format!("{bucket}/{}", self.filename),
            None => self.filename.clone(),
        }
    }
}

/// One failed resource, recorded in job stats.
#[derive(Debug, Clone, Serialize)]
pub struct DownloadFailure {
    pub url: String,
    pub error: String,
    #[serde(skip)]
    pub kind: ResourceKind,
}

/// Partitioned result of a bulk download.
#[derive(Debug, Default)]
pub struct DownloadOutcome {
    pub succeeded: Vec<ResourceDescriptor>,
    pub failed: Vec<DownloadFailure>,
}

/// Per-capture-session resource downloader.
pub struct ResourceDownloader {
    client: reqwest::Client,
    rate_limiter: Arc<RateLimiter>,
    base_url: Option<Url>,
    session_dir: PathBuf,
    cache: DashMap<String, ResourceDescriptor>,
    used_names: Mutex<HashSet<String>>,
    user_agent: String,
    extra_headers: Vec<(String, String)>,
    max_retries: u32,
    batch_size: usize,
}

impl ResourceDownloader {
    /// Create a downloader rooted at a fresh session temp directory.
    pub fn new(
        config: &ServiceConfig,
        rate_limiter: Arc<RateLimiter>,
        base_url: Option<Url>,
        user_agent: String,
        extra_headers: Vec<(String, String)>,
    ) -> Result<Self> {
        let session_dir = config
            .temp_dir
            .join(uuid::Uuid::new_v4().simple().to_string());
        std::fs::create_dir_all(&session_dir)
            .with_context(|| format!("Failed to create session dir {}", session_dir.display()))?;

        let client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::limited(MAX_REDIRECTS))
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            rate_limiter,
            base_url,
            session_dir,
            cache: DashMap::new(),
            used_names: Mutex::new(HashSet::new()),
            user_agent,
            extra_headers,
            max_retries: DEFAULT_DOWNLOAD_RETRIES,
            batch_size: config.download_concurrency.max(1),
        })
    }

    /// Session temp directory holding the downloaded bytes.
    #[must_use]
    pub fn session_dir(&self) -> &PathBuf {
        &self.session_dir
    }

    /// Descriptors downloaded so far in this session.
    #[must_use]
    pub fn descriptors(&self) -> Vec<ResourceDescriptor> {
        self.cache.iter().map(|entry| entry.value().clone()).collect()
    }

    /// Resolve a raw reference into an absolute URL.
    ///
    /// Scheme-relative (`//host/x`) promotes to https; root-relative (`/x`)
    /// resolves against the base origin; other relative forms resolve
    /// against the base URL. Relative input without a base fails fast.
    pub fn resolve_url(&self, raw: &str) -> Result<Url> {
        let raw = raw.trim();
        if raw.is_empty() {
            anyhow::bail!("empty URL");
        }
        if let Some(rest) = raw.strip_prefix("//") {
            return Url::parse(&format!("https://{rest}")).context("invalid scheme-relative URL");
        }
        match Url::parse(raw) {
            Ok(url) => Ok(url),
            Err(url::ParseError::RelativeUrlWithoutBase) => match &self.base_url {
                Some(base) => base
                    .join(raw)
                    .with_context(|| format!("cannot resolve {raw} against {base}")),
                None => anyhow::bail!("relative URL {raw:?} without a base URL"),
            },
            Err(e) => Err(e).with_context(|| format!("invalid URL {raw:?}")),
        }
    }

    /// Download one resource, deduplicating within the session.
    ///
    /// A 429 response is retried once after honoring `Retry-After`; a second
    /// rate-limit failure surfaces as [`CaptureError::RateLimited`] and is
    /// not retried further by [`Self::download_with_retry`].
    pub async fn download(&self, raw_url: &str, kind: ResourceKind) -> Result<ResourceDescriptor> {
        let url = self.resolve_url(raw_url)?;
        let key = url.to_string();

        if let Some(cached) = self.cache.get(&key) {
            debug!("Session cache hit: {key}");
            return Ok(cached.clone());
        }

        let response = self.fetch(&url).await?;
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("application/octet-stream")
            .to_string();

        let bytes = response
            .bytes()
            .await
            .with_context(|| format!("failed to read body of {url}"))?;

        let name = {
            let mut taken = self
                .used_names
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner);
            let candidate = filename::filename_for(&url, Some(&content_type));
            let unique = filename::disambiguate(&candidate, &url, &taken);
            taken.insert(unique.clone());
            unique
        };

        let local_path = self.session_dir.join(&name);
        tokio::fs::write(&local_path, &bytes)
            .await
            .with_context(|| format!("failed to write {}", local_path.display()))?;

        let descriptor = ResourceDescriptor {
            url: key.clone(),
            local_path,
            filename: name,
            content_type,
            size: bytes.len() as u64,
            kind,
        };
        self.cache.insert(key, descriptor.clone());
        Ok(descriptor)
    }

    /// Issue the GET, waiting on the rate limiter first. Handles exactly one
    /// 429 with `Retry-After`.
    async fn fetch(&self, url: &Url) -> Result<reqwest::Response> {
        for attempt in 0..2 {
            self.rate_limiter.wait_for_domain(url.as_str()).await;

            let mut request = self
                .client
                .get(url.clone())
                .timeout(RESOURCE_TIMEOUT)
                .header(reqwest::header::USER_AGENT, &self.user_agent)
                .header(reqwest::header::ACCEPT, "*/*");
            for (name, value) in &self.extra_headers {
                request = request.header(name, value);
            }

            let response = request
                .send()
                .await
                .with_context(|| format!("GET {url} failed"))?;

            if response.status() == reqwest::StatusCode::TOO_MANY_REQUESTS {
                if attempt == 0 {
                    let retry_after = response
                        .headers()
                        .get(reqwest::header::RETRY_AFTER)
                        .and_then(|v| v.to_str().ok())
                        .unwrap_or("1")
                        .to_string();
                    warn!("429 from {url}, honoring Retry-After: {retry_after}");
                    self.rate_limiter.handle_retry_after(&retry_after).await;
                    continue;
                }
                return Err(CaptureError::RateLimited(format!("{url} still returning 429")).into());
            }

            if !response.status().is_success() {
                anyhow::bail!("GET {url} returned status {}", response.status());
            }
            return Ok(response);
        }
        unreachable!("fetch loop always returns within two attempts")
    }

    /// Download with up to `max_retries` attempts and linear backoff
    /// (1 s × attempt). Rate-limit failures that already consumed their
    /// Retry-After retry are not attempted again.
    pub async fn download_with_retry(
        &self,
        raw_url: &str,
        kind: ResourceKind,
    ) -> Result<ResourceDescriptor> {
        let mut last_error = None;
        for attempt in 1..=self.max_retries {
            match self.download(raw_url, kind).await {
                Ok(descriptor) => return Ok(descriptor),
                Err(e) => {
                    let rate_limited = e
                        .downcast_ref::<CaptureError>()
                        .is_some_and(|c| matches!(c, CaptureError::RateLimited(_)));
                    if rate_limited || attempt == self.max_retries {
                        return Err(e);
                    }
                    debug!("Attempt {attempt} failed for {raw_url}: {e:#}");
                    tokio::time::sleep(Duration::from_secs(u64::from(attempt))).await;
                    last_error = Some(e);
                }
            }
        }
        Err(last_error.unwrap_or_else(|| anyhow::anyhow!("download failed: {raw_url}")))
    }

    /// Download a set of URLs in parallel batches, partitioning the results.
    pub async fn download_all(&self, urls: &[String], kind: ResourceKind) -> DownloadOutcome {
        let mut outcome = DownloadOutcome::default();

        // Dedup while preserving order; the session cache makes repeats
        // cheap but there is no point scheduling them.
        let mut seen = HashSet::new();
        let unique: Vec<&String> = urls.iter().filter(|u| seen.insert(u.as_str())).collect();

        for batch in unique.chunks(self.batch_size) {
            let futures = batch
                .iter()
                .map(|url| async move { (url.to_string(), self.download_with_retry(url, kind).await) });
            for (url, result) in join_all(futures).await {
                match result {
                    Ok(descriptor) => outcome.succeeded.push(descriptor),
                    Err(e) => {
                        debug!("Download failed for {url}: {e:#}");
                        outcome.failed.push(DownloadFailure {
                            url,
                            error: format!("{e:#}"),
                            kind,
                        });
                    }
                }
            }
        }
        outcome
    }

    /// Fetch a URL as text without persisting it (stylesheet bodies for
    /// font extraction). Shares the session client and rate limiter.
    pub async fn fetch_text(&self, url: &Url, timeout: Duration) -> Result<String> {
        self.rate_limiter.wait_for_domain(url.as_str()).await;
        let response = self
            .client
            .get(url.clone())
            .timeout(timeout)
            .header(reqwest::header::USER_AGENT, &self.user_agent)
            .send()
            .await
            .with_context(|| format!("GET {url} failed"))?;
        if !response.status().is_success() {
            anyhow::bail!("GET {url} returned status {}", response.status());
        }
        response
            .text()
            .await
            .with_context(|| format!("failed to read text body of {url}"))
    }

    /// Remove the session temp directory.
    pub async fn cleanup(&self) {
        if let Err(e) = tokio::fs::remove_dir_all(&self.session_dir).await {
            debug!("Could not remove session dir: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServiceConfig;

    fn downloader(base: Option<&str>) -> ResourceDownloader {
        let config = ServiceConfig::default()
            .with_temp_dir(std::env::temp_dir().join("pagevault-test-dl"));
        ResourceDownloader::new(
            &config,
            Arc::new(RateLimiter::default()),
            base.map(|b| Url::parse(b).expect("base parses")),
            "test-agent".to_string(),
            Vec::new(),
        )
        .expect("downloader builds")
    }

    #[test]
    fn scheme_relative_promotes_to_https() {
        let d = downloader(None);
        let url = d.resolve_url("//cdn.test/lib.js").expect("resolves");
        assert_eq!(url.as_str(), "https://cdn.test/lib.js");
    }

    #[test]
    fn root_relative_resolves_against_base_origin() {
        let d = downloader(Some("https://example.test/deep/page"));
        let url = d.resolve_url("/a.png").expect("resolves");
        assert_eq!(url.as_str(), "https://example.test/a.png");
    }

    #[test]
    fn relative_without_base_fails_fast() {
        let d = downloader(None);
        assert!(d.resolve_url("img/x.png").is_err());
    }
}
