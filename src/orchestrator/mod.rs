//! Top-level capture workflows.
//!
//! `start_capture` runs the single/multi-page pipeline for one URL,
//! `capture_multi` fans a URL list out into a batch, and `capture_curated`
//! turns a completed test crawl plus user curation into a batch. Work is
//! spawned; callers get an id back immediately and poll the trackers.
//!
//! Pipeline ordering inside one capture is strict: every resource download
//! completes before HTML rewriting begins, CSS rewriting runs after all
//! downloads, persistence runs last.

use anyhow::Result;
use log::{debug, info, warn};
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::Semaphore;
use url::Url;

use crate::browser::Browser;
use crate::config::{CaptureOptions, ServiceConfig};
use crate::crawler::{CapturedPage, Crawler};
use crate::downloader::{ResourceDescriptor, ResourceDownloader, ResourceKind};
use crate::error::{CaptureError, CaptureResult};
use crate::extractor::fonts;
use crate::jobs::{BatchTracker, JobStatus, JobTracker, ResourceFailure};
use crate::rate_limit::RateLimiter;
use crate::rewriter::{self, UrlMap};
use crate::store::{CaptureMode, CaptureStore, NewCapture, SavedCapture};
use crate::test_crawl::{TestCrawlManager, TestCrawlStatus};
use crate::utils::constants::pick_user_agent;

struct Inner {
    browser: Arc<dyn Browser>,
    config: ServiceConfig,
    store: Arc<CaptureStore>,
    jobs: Arc<JobTracker>,
    batches: Arc<BatchTracker>,
    test_crawls: TestCrawlManager,
    rate_limiter: Arc<RateLimiter>,
    slots: Arc<Semaphore>,
}

/// Binds crawler, downloader, rewriter, store and trackers into the
/// public capture API.
#[derive(Clone)]
pub struct Orchestrator {
    inner: Arc<Inner>,
}

impl Orchestrator {
    /// Build an orchestrator over a running browser, initializing the
    /// store and temp directory.
    pub async fn new(browser: Arc<dyn Browser>, config: ServiceConfig) -> Result<Self> {
        let store = Arc::new(CaptureStore::new(config.captures_dir()));
        store.initialize().await?;
        tokio::fs::create_dir_all(&config.temp_dir).await?;

        let jobs = Arc::new(JobTracker::new(config.max_concurrent_jobs));
        let slots = Arc::new(Semaphore::new(config.max_concurrent_jobs));
        let rate_limiter = Arc::new(RateLimiter::new(config.min_delay));
        let test_crawls = TestCrawlManager::new(browser.clone());

        Ok(Self {
            inner: Arc::new(Inner {
                browser,
                config,
                store,
                jobs,
                batches: Arc::new(BatchTracker::new()),
                test_crawls,
                rate_limiter,
                slots,
            }),
        })
    }

    #[must_use]
    pub fn store(&self) -> &Arc<CaptureStore> {
        &self.inner.store
    }

    #[must_use]
    pub fn jobs(&self) -> &Arc<JobTracker> {
        &self.inner.jobs
    }

    #[must_use]
    pub fn batches(&self) -> &Arc<BatchTracker> {
        &self.inner.batches
    }

    #[must_use]
    pub fn test_crawls(&self) -> &TestCrawlManager {
        &self.inner.test_crawls
    }

    /// Start a single capture. Returns the job id immediately; the work
    /// runs asynchronously.
    pub async fn start_capture(&self, url: &str, options: CaptureOptions) -> Result<String> {
        Url::parse(url).map_err(|e| CaptureError::Config(format!("invalid URL {url:?}: {e}")))?;
        let options = options.normalized();
        let job = self.inner.jobs.create_job(url, options.clone()).await;

        let inner = self.inner.clone();
        let job_id = job.id.clone();
        let url = url.to_string();
        tokio::spawn(async move {
            run_capture(inner, job_id, url, options, None).await;
        });

        Ok(job.id)
    }

    /// Capture a set of URLs as one batch. Per-URL failures do not abort
    /// the batch.
    pub async fn capture_multi(
        &self,
        urls: &[String],
        options: CaptureOptions,
    ) -> Result<String> {
        if urls.is_empty() {
            return Err(CaptureError::Config("no URLs to capture".to_string()).into());
        }
        let options = options.normalized();

        let mut members = Vec::with_capacity(urls.len());
        let mut spawned = Vec::with_capacity(urls.len());
        for url in urls {
            Url::parse(url)
                .map_err(|e| CaptureError::Config(format!("invalid URL {url:?}: {e}")))?;
            let job = self.inner.jobs.create_job(url, options.clone()).await;
            members.push((job.id.clone(), url.clone()));
            spawned.push((job.id, url.clone()));
        }

        let batch = self.inner.batches.create_batch(members).await;
        info!("Batch {} created with {} jobs", batch.batch_id, spawned.len());

        for (job_id, url) in spawned {
            let inner = self.inner.clone();
            let options = options.clone();
            let batch_id = batch.batch_id.clone();
            tokio::spawn(async move {
                run_capture(inner, job_id, url, options, Some(batch_id)).await;
            });
        }

        Ok(batch.batch_id)
    }

    /// Curated capture over a finished test crawl: the URL set is
    /// unique(selected ∪ additional) minus excluded.
    pub async fn capture_curated(
        &self,
        crawl_id: &str,
        selected: &[String],
        additional: &[String],
        excluded: &[String],
        options: CaptureOptions,
    ) -> Result<String> {
        let crawl = self
            .inner
            .test_crawls
            .get_status(crawl_id)
            .ok_or_else(|| CaptureError::Config(format!("test crawl {crawl_id} not found")))?;
        if crawl.status != TestCrawlStatus::Completed {
            return Err(CaptureError::Config(format!(
                "test crawl {crawl_id} is not completed"
            ))
            .into());
        }

        let excluded_set: HashSet<&str> = excluded.iter().map(String::as_str).collect();
        let mut seen = HashSet::new();
        let mut urls = Vec::new();
        for url in selected.iter().chain(additional.iter()) {
            if excluded_set.contains(url.as_str()) {
                continue;
            }
            if seen.insert(url.clone()) {
                urls.push(url.clone());
            }
        }

        if urls.is_empty() {
            return Err(CaptureError::Config("curated URL set is empty".to_string()).into());
        }
        self.capture_multi(&urls, options).await
    }

    /// Run every retention sweep once.
    pub async fn cleanup(&self) {
        let retention = &self.inner.config.retention;
        let jobs = self.inner.jobs.cleanup_old_jobs(retention.jobs).await;
        let batches = self
            .inner
            .batches
            .cleanup_old_batches(retention.batches)
            .await;
        let crawls = self.inner.test_crawls.cleanup(retention.test_crawls);
        let temp = cleanup_temp(&self.inner.config.temp_dir, retention.temp_files).await;
        debug!("Cleanup: {jobs} jobs, {batches} batches, {crawls} crawls, {temp} temp dirs");
    }

    /// Shut down the underlying browser.
    pub async fn shutdown(&self) -> Result<()> {
        self.inner.browser.shutdown().await
    }
}

/// Remove aged session directories from the temp area. Returns how many
/// were removed.
pub async fn cleanup_temp(temp_dir: &std::path::Path, max_age: std::time::Duration) -> usize {
    let mut removed = 0;
    let Ok(mut entries) = tokio::fs::read_dir(temp_dir).await else {
        return 0;
    };
    while let Ok(Some(entry)) = entries.next_entry().await {
        let Ok(metadata) = entry.metadata().await else {
            continue;
        };
        let Ok(modified) = metadata.modified() else {
            continue;
        };
        if modified.elapsed().map(|age| age > max_age).unwrap_or(false)
            && tokio::fs::remove_dir_all(entry.path()).await.is_ok()
        {
            removed += 1;
        }
    }
    removed
}

/// Gate on a concurrency slot, then run the pipeline and record the
/// terminal state on the job and (when present) the batch.
async fn run_capture(
    inner: Arc<Inner>,
    job_id: String,
    url: String,
    options: CaptureOptions,
    batch_id: Option<String>,
) {
    let permit = match inner.slots.clone().acquire_owned().await {
        Ok(permit) => permit,
        Err(_) => {
            inner.jobs.fail_job(&job_id, "capture slots closed").await;
            return;
        }
    };

    if !inner.jobs.start_job(&job_id).await {
        // Tracker refused (already terminal or at capacity); leave pending.
        warn!("Job {job_id} could not start");
        drop(permit);
        return;
    }
    if let Some(batch) = &batch_id {
        inner
            .batches
            .update_member(batch, &job_id, JobStatus::Processing)
            .await;
    }

    let result = run_capture_pipeline(&inner, &job_id, &url, &options).await;
    drop(permit);

    match result {
        Ok(saved) => {
            info!("Capture {job_id} completed: {}", saved.path.display());
            inner
                .jobs
                .complete_job(&job_id, saved.path.clone(), saved.id.clone())
                .await;
            if let Some(batch) = &batch_id {
                inner
                    .batches
                    .update_member(batch, &job_id, JobStatus::Completed)
                    .await;
            }
        }
        Err(e) => {
            warn!("Capture {job_id} failed: {e}");
            inner.jobs.fail_job(&job_id, &e.to_string()).await;
            if let Some(batch) = &batch_id {
                inner
                    .batches
                    .update_member(batch, &job_id, JobStatus::Failed)
                    .await;
            }
        }
    }
}

/// The capture pipeline: page actions, downloads, rewriting, persistence.
async fn run_capture_pipeline(
    inner: &Arc<Inner>,
    job_id: &str,
    url: &str,
    options: &CaptureOptions,
) -> CaptureResult<SavedCapture> {
    let page_url = Url::parse(url)
        .map_err(|e| CaptureError::Config(format!("invalid URL {url:?}: {e}")))?;
    let user_agent = options
        .user_agent
        .clone()
        .unwrap_or_else(|| pick_user_agent().to_string());
    let crawler = Crawler::new(inner.browser.clone());

    // Phase 1: page actions. Multi-page crawls span 0..50% of progress.
    let pages: Vec<CapturedPage> = if options.multi_page.enabled {
        inner.jobs.begin_step(job_id, "crawl").await;
        let jobs = inner.jobs.clone();
        let job_key = job_id.to_string();
        let on_page = move |_page: &CapturedPage, processed: usize, queued: usize| {
            let jobs = jobs.clone();
            let job_key = job_key.clone();
            tokio::spawn(async move {
                let total = processed + queued;
                jobs.with_stats(&job_key, |stats| {
                    stats.pages_processed = processed as u32;
                    stats.total_pages = total as u32;
                })
                .await;
                let progress = ((processed * 50) / total.max(1)).min(50) as u8;
                jobs.set_progress(&job_key, progress).await;
            });
        };
        crawler
            .crawl_capture(
                url,
                options,
                &user_agent,
                inner.config.crawl_parallelism,
                on_page,
            )
            .await?
    } else {
        inner.jobs.begin_step(job_id, "navigate").await;
        let page = crawler.capture_page(url, 0, options, &user_agent).await?;
        inner
            .jobs
            .with_stats(job_id, |stats| {
                stats.pages_processed = 1;
                stats.total_pages = 1;
            })
            .await;
        vec![page]
    };

    let seed = pages
        .first()
        .ok_or_else(|| CaptureError::Navigation("no pages captured".to_string()))?;
    if !seed.success {
        return Err(CaptureError::Navigation(
            seed.error
                .clone()
                .unwrap_or_else(|| "seed page capture failed".to_string()),
        ));
    }
    inner.jobs.set_progress(job_id, 50).await;

    // Phase 2: downloads. Everything lands before any rewrite runs.
    inner.jobs.begin_step(job_id, "download").await;
    let downloader = ResourceDownloader::new(
        &inner.config,
        inner.rate_limiter.clone(),
        Some(page_url.clone()),
        user_agent.clone(),
        options
            .headers
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect(),
    )
    .map_err(|e| CaptureError::Persistence(format!("{e:#}")))?;

    let successful_pages: Vec<&CapturedPage> = pages.iter().filter(|p| p.success).collect();

    let mut images = Vec::new();
    let mut stylesheets = Vec::new();
    let mut scripts = Vec::new();
    let mut pdfs = Vec::new();
    let mut font_urls = Vec::new();
    let mut favicon = None;
    for page in &successful_pages {
        images.extend(page.resources.images.iter().cloned());
        stylesheets.extend(page.resources.external_stylesheets());
        scripts.extend(page.resources.scripts.iter().cloned());
        if options.include_pdfs {
            pdfs.extend(page.resources.pdfs.iter().cloned());
        }
        if favicon.is_none() {
            favicon = page.resources.favicon.clone();
        }
        if let Ok(this_page_url) = Url::parse(&page.url) {
            font_urls.extend(
                fonts::extract_font_urls(&downloader, &page.resources.stylesheets, &this_page_url)
                    .await,
            );
        }
    }

    let mut downloaded: Vec<ResourceDescriptor> = Vec::new();
    for (urls, kind, progress) in [
        (&images, ResourceKind::Image, 60u8),
        (&stylesheets, ResourceKind::Stylesheet, 66),
        (&scripts, ResourceKind::Script, 72),
        (&font_urls, ResourceKind::Font, 76),
        (&pdfs, ResourceKind::Pdf, 80),
    ] {
        downloaded.extend(download_kind(inner, job_id, &downloader, urls, kind).await);
        inner.jobs.set_progress(job_id, progress).await;
    }
    if let Some(favicon_url) = &favicon {
        let urls = vec![favicon_url.clone()];
        downloaded.extend(download_kind(inner, job_id, &downloader, &urls, ResourceKind::Favicon).await);
    }

    // The URL map is built only from successful downloads; missing assets
    // keep their remote URLs in the archive.
    let mut map = UrlMap::new();
    for descriptor in &downloaded {
        map.insert(descriptor.url.clone(), descriptor.archive_path());
    }

    // Phase 3: rewriting. HTML first, then stylesheet bodies so
    // inter-resource references resolve.
    inner.jobs.begin_step(job_id, "rewrite").await;
    let seed_html = rewrite_page_html(&seed.html, &seed.url, &map, "");
    let mut subpages = Vec::new();
    for (ordinal, page) in successful_pages.iter().skip(1).enumerate() {
        let rewritten = rewrite_page_html(&page.html, &page.url, &map, "../");
        let name = format!("{:03}-{}.html", ordinal + 1, page_slug(page));
        subpages.push((name, rewritten));
    }

    for descriptor in &downloaded {
        if descriptor.kind != ResourceKind::Stylesheet {
            continue;
        }
        let Ok(sheet_url) = Url::parse(&descriptor.url) else {
            continue;
        };
        match tokio::fs::read_to_string(&descriptor.local_path).await {
            Ok(css) => {
                let rewritten = rewriter::css::rewrite_stylesheet(&css, &sheet_url, &map);
                if let Err(e) = tokio::fs::write(&descriptor.local_path, rewritten).await {
                    warn!("Could not write rewritten stylesheet {}: {e}", descriptor.filename);
                }
            }
            Err(e) => debug!(
                "Stylesheet {} is not valid UTF-8, leaving as-is: {e}",
                descriptor.filename
            ),
        }
    }
    inner.jobs.set_progress(job_id, 90).await;

    // Phase 4: persistence. Capture stats count page elements per kind;
    // per-file download truth stays in the job stats.
    inner.jobs.begin_step(job_id, "persist").await;
    let failed_pages = pages.len() - successful_pages.len();
    let capture_error = if failed_pages > 0 {
        Some(format!("{failed_pages} page(s) failed during crawl"))
    } else {
        None
    };
    let mut capture_stats = crate::store::CaptureStats {
        total_pages: successful_pages.len() as u32,
        fonts: {
            let mut unique: Vec<&String> = font_urls.iter().collect();
            unique.sort();
            unique.dedup();
            unique.len() as u32
        },
        ..crate::store::CaptureStats::default()
    };
    for page in &successful_pages {
        capture_stats.images += page.resources.image_count;
        capture_stats.stylesheets += page.resources.stylesheets.len() as u32;
        capture_stats.scripts += page.resources.scripts.len() as u32;
    }
    let saved = inner
        .store
        .save_capture(NewCapture {
            url,
            title: &seed.title,
            html: &seed_html,
            resources: &downloaded,
            mode: if options.multi_page.enabled {
                CaptureMode::MultiPage
            } else {
                CaptureMode::SinglePage
            },
            stats: capture_stats,
            subpages: &subpages,
            error: capture_error,
        })
        .await
        .map_err(|e| CaptureError::Persistence(format!("{e:#}")))?;

    downloader.cleanup().await;
    Ok(saved)
}

/// Download one kind and fold the outcome into the job stats.
async fn download_kind(
    inner: &Arc<Inner>,
    job_id: &str,
    downloader: &ResourceDownloader,
    urls: &[String],
    kind: ResourceKind,
) -> Vec<ResourceDescriptor> {
    if urls.is_empty() {
        return Vec::new();
    }
    let outcome = downloader.download_all(urls, kind).await;
    inner
        .jobs
        .with_stats(job_id, |stats| {
            stats.total_resources += (outcome.succeeded.len() + outcome.failed.len()) as u32;
            stats.resources_downloaded += outcome.succeeded.len() as u32;
            for descriptor in &outcome.succeeded {
                stats.succeeded.bump(descriptor.kind);
            }
            for failure in &outcome.failed {
                stats.failed.push(
                    failure.kind,
                    ResourceFailure {
                        url: failure.url.clone(),
                        error: failure.error.clone(),
                    },
                );
            }
        })
        .await;
    outcome.succeeded
}

/// Rewrite one page, falling back to the original HTML when the whole pass
/// fails; per-element failures are already handled inside the rewriter.
fn rewrite_page_html(html: &str, url: &str, map: &UrlMap, prefix: &str) -> String {
    let Ok(page_url) = Url::parse(url) else {
        return html.to_string();
    };
    match rewriter::rewrite_html(html, &page_url, map, prefix) {
        Ok(rewritten) => rewritten,
        Err(e) => {
            warn!("Rewrite failed for {url}, keeping original HTML: {e:#}");
            html.to_string()
        }
    }
}

/// Filesystem-safe slug for a subpage filename.
fn page_slug(page: &CapturedPage) -> String {
    let source = if page.title.trim().is_empty() {
        Url::parse(&page.url)
            .ok()
            .map(|u| u.path().trim_matches('/').to_string())
            .unwrap_or_default()
    } else {
        page.title.clone()
    };
    let mut slug = String::new();
    let mut last_dash = true;
    for c in source.chars().take(60) {
        if c.is_ascii_alphanumeric() {
            slug.push(c.to_ascii_lowercase());
            last_dash = false;
        } else if !last_dash {
            slug.push('-');
            last_dash = true;
        }
    }
    let slug = slug.trim_matches('-').to_string();
    if slug.is_empty() {
        "page".to_string()
    } else {
        slug
    }
}
