//! Breadth-first traversal over a site.
//!
//! Discovery mode records metadata only and processes one page at a time
//! for politeness; capture mode fetches full pages in batches of up to
//! three. Both share the same frontier: a FIFO queue with a visited set,
//! depth limit, same-domain guard, and a page budget.

pub mod types;

use log::{debug, info, warn};
use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use url::Url;

use crate::browser::{Browser, BrowserPage, InterceptPolicy, WaitUntil};
use crate::config::{CaptureOptions, DiscoveryOptions};
use crate::detector;
use crate::error::{CaptureError, CaptureResult};
use crate::extractor::{self, js_scripts};
use crate::utils::constants::{CSS_WEIGHT, FONT_WEIGHT, IMAGE_WEIGHT, JS_WEIGHT};
use crate::utils::{extract_domain, normalize_for_dedup};

pub use types::{CapturedPage, DiscoveredPage, QueueItem, ResourceCounts};

/// FIFO frontier with cycle and scope guards.
struct Frontier {
    queue: VecDeque<QueueItem>,
    visited: HashSet<String>,
    seed_domain: Option<String>,
    max_depth: u8,
    max_pages: usize,
    same_domain_only: bool,
}

impl Frontier {
    fn new(seed: &str, max_depth: u8, max_pages: usize, same_domain_only: bool) -> Self {
        let mut queue = VecDeque::new();
        queue.push_back(QueueItem {
            url: seed.to_string(),
            depth: 0,
        });
        Self {
            queue,
            visited: HashSet::new(),
            seed_domain: extract_domain(seed),
            max_depth,
            max_pages,
            same_domain_only,
        }
    }

    /// Pop up to `width` unvisited items, marking them visited. Respects
    /// the page budget.
    fn pop_batch(&mut self, width: usize) -> Vec<QueueItem> {
        let mut batch = Vec::new();
        while batch.len() < width && self.visited.len() < self.max_pages {
            let Some(item) = self.queue.pop_front() else {
                break;
            };
            let key = normalize_for_dedup(&item.url);
            if !self.visited.insert(key) {
                continue;
            }
            batch.push(item);
        }
        batch
    }

    /// Enqueue a child link unless a guard rejects it.
    fn maybe_enqueue(&mut self, url: &str, depth: u8) {
        if depth > self.max_depth {
            return;
        }
        if self.visited.contains(&normalize_for_dedup(url)) {
            return;
        }
        if self.same_domain_only && extract_domain(url) != self.seed_domain {
            return;
        }
        self.queue.push_back(QueueItem {
            url: url.to_string(),
            depth,
        });
    }

    fn queued(&self) -> usize {
        self.queue.len()
    }
}

/// BFS driver over the Browser capability.
pub struct Crawler {
    browser: Arc<dyn Browser>,
}

impl Crawler {
    #[must_use]
    pub fn new(browser: Arc<dyn Browser>) -> Self {
        Self { browser }
    }

    /// Discovery crawl: metadata only, one page at a time.
    ///
    /// `on_page` fires after each discovered page with the running visited
    /// count. Cancellation is observed at the top of the loop.
    pub async fn discover<F>(
        &self,
        seed: &str,
        options: &DiscoveryOptions,
        cancel: &AtomicBool,
        mut on_page: F,
    ) -> CaptureResult<Vec<DiscoveredPage>>
    where
        F: FnMut(&DiscoveredPage, usize),
    {
        let options = options.clone().normalized();
        let mut frontier = Frontier::new(
            seed,
            options.depth,
            options.max_pages,
            options.same_domain_only,
        );
        let mut pages = Vec::new();

        loop {
            if cancel.load(Ordering::Relaxed) {
                return Err(CaptureError::Cancelled);
            }

            let batch = frontier.pop_batch(1);
            if batch.is_empty() {
                break;
            }

            for item in batch {
                match self.discover_page(&item, &options).await {
                    Ok(page) => {
                        if page.depth < options.depth {
                            for link in &page.links {
                                frontier.maybe_enqueue(link, page.depth + 1);
                            }
                        }
                        on_page(&page, pages.len() + 1);
                        pages.push(page);
                    }
                    Err(e) => {
                        // A failed page aborts that page, not the crawl.
                        warn!("Discovery failed for {}: {e}", item.url);
                    }
                }
            }
        }

        info!("Discovery finished: {} pages", pages.len());
        Ok(pages)
    }

    /// Open a page with heavy resources blocked and read its metadata.
    async fn discover_page(
        &self,
        item: &QueueItem,
        options: &DiscoveryOptions,
    ) -> CaptureResult<DiscoveredPage> {
        let page = self
            .browser
            .new_page()
            .await
            .map_err(|e| CaptureError::Browser(format!("{e:#}")))?;

        let result = self.discover_on_page(page.as_ref(), item, options).await;
        if let Err(e) = page.close().await {
            debug!("Page close failed for {}: {e:#}", item.url);
        }
        result
    }

    async fn discover_on_page(
        &self,
        page: &dyn BrowserPage,
        item: &QueueItem,
        options: &DiscoveryOptions,
    ) -> CaptureResult<DiscoveredPage> {
        page.set_intercept_policy(InterceptPolicy::DocumentsAndScriptsOnly)
            .await
            .map_err(|e| CaptureError::Browser(format!("{e:#}")))?;

        page.navigate(
            &item.url,
            WaitUntil::DomContentLoadedAndNetworkIdle,
            options.timeout(),
        )
        .await
        .map_err(|e| CaptureError::Navigation(format!("{e:#}")))?;

        let value = page
            .evaluate(js_scripts::DISCOVERY_SCRIPT)
            .await
            .map_err(|e| CaptureError::Extraction(format!("{e:#}")))?;
        let snapshot: types::DiscoverySnapshot = serde_json::from_value(value)
            .map_err(|e| CaptureError::Extraction(format!("discovery payload: {e}")))?;

        let resources = ResourceCounts {
            images: snapshot.images,
            css: snapshot.css,
            js: snapshot.js,
            fonts: snapshot.fonts,
            links: snapshot.links.len() as u64,
        };
        let estimated_size = snapshot.html_length
            + IMAGE_WEIGHT * snapshot.images
            + CSS_WEIGHT * snapshot.css
            + JS_WEIGHT * snapshot.js
            + FONT_WEIGHT * snapshot.fonts;

        Ok(DiscoveredPage {
            url: item.url.clone(),
            title: snapshot.title,
            description: snapshot.description,
            depth: item.depth,
            resources,
            estimated_size,
            selected: false,
            links: snapshot.links,
        })
    }

    /// Capture crawl: full page actions in batches of `parallelism`.
    ///
    /// `on_page` fires after each page with (processed, queued) counts.
    /// A failing page is recorded with `success = false` and the crawl
    /// continues.
    pub async fn crawl_capture<F>(
        &self,
        seed: &str,
        options: &CaptureOptions,
        user_agent: &str,
        parallelism: usize,
        mut on_page: F,
    ) -> CaptureResult<Vec<CapturedPage>>
    where
        F: FnMut(&CapturedPage, usize, usize),
    {
        let multi = &options.multi_page;
        let (max_depth, max_pages) = if multi.enabled {
            (multi.depth, multi.max_pages)
        } else {
            (0, 1)
        };
        let mut frontier = Frontier::new(seed, max_depth, max_pages, multi.same_domain_only);
        let mut pages: Vec<CapturedPage> = Vec::new();

        loop {
            let batch = frontier.pop_batch(parallelism.max(1));
            if batch.is_empty() {
                break;
            }

            let futures = batch.iter().map(|item| self.capture_one(item, options, user_agent));
            for (item, result) in batch.iter().zip(futures::future::join_all(futures).await) {
                let page = match result {
                    Ok(page) => page,
                    Err(e) => {
                        warn!("Capture failed for {}: {e}", item.url);
                        CapturedPage {
                            url: item.url.clone(),
                            depth: item.depth,
                            title: String::new(),
                            html: String::new(),
                            resources: extractor::ExtractedResources::default(),
                            links: Vec::new(),
                            success: false,
                            error: Some(e.to_string()),
                        }
                    }
                };
                if page.depth < max_depth {
                    for link in &page.links {
                        frontier.maybe_enqueue(link, page.depth + 1);
                    }
                }
                on_page(&page, pages.len() + 1, frontier.queued());
                pages.push(page);
            }
        }

        Ok(pages)
    }

    async fn capture_one(
        &self,
        item: &QueueItem,
        options: &CaptureOptions,
        user_agent: &str,
    ) -> CaptureResult<CapturedPage> {
        let page = self
            .browser
            .new_page()
            .await
            .map_err(|e| CaptureError::Browser(format!("{e:#}")))?;

        let result = self
            .capture_page_inner(page.as_ref(), item, options, user_agent)
            .await;
        if let Err(e) = page.close().await {
            debug!("Page close failed for {}: {e:#}", item.url);
        }
        result
    }

    /// The capture-node action: navigate, trigger lazy loading, enumerate
    /// resources, read HTML/title, extract content-region links.
    pub async fn capture_page(
        &self,
        url: &str,
        depth: u8,
        options: &CaptureOptions,
        user_agent: &str,
    ) -> CaptureResult<CapturedPage> {
        let item = QueueItem {
            url: url.to_string(),
            depth,
        };
        self.capture_one(&item, options, user_agent).await
    }

    async fn capture_page_inner(
        &self,
        page: &dyn BrowserPage,
        item: &QueueItem,
        options: &CaptureOptions,
        user_agent: &str,
    ) -> CaptureResult<CapturedPage> {
        page.set_user_agent(user_agent)
            .await
            .map_err(|e| CaptureError::Browser(format!("{e:#}")))?;

        if !options.headers.is_empty() {
            let headers: Vec<(String, String)> = options
                .headers
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect();
            page.set_extra_headers(&headers)
                .await
                .map_err(|e| CaptureError::Browser(format!("{e:#}")))?;
        }

        page.navigate(&item.url, WaitUntil::NetworkIdle, options.timeout())
            .await
            .map_err(|e| CaptureError::Navigation(format!("{e:#}")))?;

        // Lazy images only load once scrolled into view.
        match page.evaluate(js_scripts::LAZY_IMAGE_PROBE_SCRIPT).await {
            Ok(serde_json::Value::Bool(true)) => {
                debug!("Triggering lazy-load scroll for {}", item.url);
                if let Err(e) = page.evaluate(js_scripts::LAZY_SCROLL_SCRIPT).await {
                    debug!("Lazy-load scroll failed for {}: {e:#}", item.url);
                }
            }
            Ok(_) => {}
            Err(e) => debug!("Lazy probe failed for {}: {e:#}", item.url),
        }

        let resources = extractor::extract_resources(page)
            .await
            .map_err(|e| CaptureError::Extraction(format!("{e:#}")))?;

        let html = page
            .content()
            .await
            .map_err(|e| CaptureError::Extraction(format!("{e:#}")))?;
        let title = page.title().await.unwrap_or_default();

        let page_url = Url::parse(&item.url)
            .map_err(|e| CaptureError::Navigation(format!("invalid page URL {}: {e}", item.url)))?;
        let links = match detector::extract_content_links(page).await {
            Ok(content) => detector::filter_links(
                &content.links,
                &page_url,
                options.multi_page.same_domain_only,
            ),
            Err(e) => {
                debug!("Content link extraction failed for {}: {e:#}", item.url);
                Vec::new()
            }
        };

        Ok(CapturedPage {
            url: item.url.clone(),
            depth: item.depth,
            title,
            html,
            resources,
            links,
            success: true,
            error: None,
        })
    }
}
