//! Discovery-only crawl sessions.
//!
//! A test crawl enumerates pages and their metadata without downloading
//! assets, so a user can curate the URL set before committing to a full
//! capture. Sessions live in memory; cancellation is cooperative and
//! observed at the top of the BFS loop.

use chrono::{DateTime, Utc};
use log::{info, warn};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use crate::browser::Browser;
use crate::config::DiscoveryOptions;
use crate::crawler::{Crawler, DiscoveredPage};
use crate::error::CaptureError;

/// Lifecycle of a test crawl.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TestCrawlStatus {
    Crawling,
    Completed,
    Failed,
}

/// Accumulated discovery results.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscoveredSet {
    pub pages: Vec<DiscoveredPage>,
    pub by_depth: BTreeMap<u8, usize>,
    pub total_estimated_size: u64,
}

/// One discovery session.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TestCrawl {
    pub crawl_id: String,
    pub seed_url: String,
    pub options: DiscoveryOptions,
    pub status: TestCrawlStatus,
    pub progress: u8,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub discovered: DiscoveredSet,
    pub error: Option<String>,
}

/// One page in the hierarchical listing.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PageNode {
    pub url: String,
    pub title: String,
    pub estimated_size: u64,
    /// Discovered pages this page links to.
    pub children: Vec<String>,
}

/// Pages grouped by depth.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DepthLevel {
    pub depth: u8,
    pub pages: Vec<PageNode>,
}

/// Shallow tree over a finished (or running) discovery.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HierarchicalView {
    pub crawl_id: String,
    pub status: TestCrawlStatus,
    pub levels: Vec<DepthLevel>,
    pub by_depth: BTreeMap<u8, usize>,
    pub total_estimated_size: u64,
}

struct TestCrawlEntry {
    crawl: TestCrawl,
    cancel: Arc<AtomicBool>,
}

/// Registry and driver for test crawls.
pub struct TestCrawlManager {
    browser: Arc<dyn Browser>,
    crawls: Arc<Mutex<HashMap<String, TestCrawlEntry>>>,
}

impl TestCrawlManager {
    #[must_use]
    pub fn new(browser: Arc<dyn Browser>) -> Self {
        Self {
            browser,
            crawls: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    fn lock(
        map: &Mutex<HashMap<String, TestCrawlEntry>>,
    ) -> std::sync::MutexGuard<'_, HashMap<String, TestCrawlEntry>> {
        map.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Start a discovery crawl and return its id immediately; the work runs
    /// in a spawned task.
    pub fn start(&self, url: &str, options: DiscoveryOptions) -> String {
        let options = options.normalized();
        let crawl_id = uuid::Uuid::new_v4().to_string();
        let cancel = Arc::new(AtomicBool::new(false));

        let crawl = TestCrawl {
            crawl_id: crawl_id.clone(),
            seed_url: url.to_string(),
            options: options.clone(),
            status: TestCrawlStatus::Crawling,
            progress: 0,
            started_at: Utc::now(),
            completed_at: None,
            discovered: DiscoveredSet::default(),
            error: None,
        };
        Self::lock(&self.crawls).insert(
            crawl_id.clone(),
            TestCrawlEntry {
                crawl,
                cancel: cancel.clone(),
            },
        );

        let crawler = Crawler::new(self.browser.clone());
        let crawls = self.crawls.clone();
        let id = crawl_id.clone();
        let seed = url.to_string();

        tokio::spawn(async move {
            let max_pages = options.max_pages.max(1);
            let on_page = |page: &DiscoveredPage, count: usize| {
                let mut map = Self::lock(&crawls);
                if let Some(entry) = map.get_mut(&id) {
                    let set = &mut entry.crawl.discovered;
                    *set.by_depth.entry(page.depth).or_insert(0) += 1;
                    set.total_estimated_size += page.estimated_size;
                    set.pages.push(page.clone());
                    entry.crawl.progress = (((count * 100) / max_pages).min(99)) as u8;
                }
            };

            let result = crawler.discover(&seed, &options, &cancel, on_page).await;

            let mut map = Self::lock(&crawls);
            if let Some(entry) = map.get_mut(&id) {
                match result {
                    Ok(pages) => {
                        info!("Test crawl {id} completed: {} pages", pages.len());
                        entry.crawl.status = TestCrawlStatus::Completed;
                        entry.crawl.progress = 100;
                        entry.crawl.completed_at = Some(Utc::now());
                    }
                    Err(CaptureError::Cancelled) => {
                        // cancel() already marked the crawl failed.
                        entry.crawl.completed_at = Some(Utc::now());
                    }
                    Err(e) => {
                        warn!("Test crawl {id} failed: {e}");
                        entry.crawl.status = TestCrawlStatus::Failed;
                        entry.crawl.error = Some(e.to_string());
                        entry.crawl.completed_at = Some(Utc::now());
                    }
                }
            }
        });

        crawl_id
    }

    /// Snapshot of one crawl.
    #[must_use]
    pub fn get_status(&self, crawl_id: &str) -> Option<TestCrawl> {
        Self::lock(&self.crawls)
            .get(crawl_id)
            .map(|entry| entry.crawl.clone())
    }

    /// Group discovered pages by depth into a shallow tree.
    #[must_use]
    pub fn get_hierarchical(&self, crawl_id: &str) -> Option<HierarchicalView> {
        let map = Self::lock(&self.crawls);
        let entry = map.get(crawl_id)?;
        let crawl = &entry.crawl;

        let discovered_urls: HashSet<&str> = crawl
            .discovered
            .pages
            .iter()
            .map(|p| p.url.as_str())
            .collect();

        let mut levels: BTreeMap<u8, Vec<PageNode>> = BTreeMap::new();
        for page in &crawl.discovered.pages {
            let children = page
                .links
                .iter()
                .filter(|link| discovered_urls.contains(link.as_str()))
                .cloned()
                .collect();
            levels.entry(page.depth).or_default().push(PageNode {
                url: page.url.clone(),
                title: page.title.clone(),
                estimated_size: page.estimated_size,
                children,
            });
        }

        Some(HierarchicalView {
            crawl_id: crawl.crawl_id.clone(),
            status: crawl.status,
            levels: levels
                .into_iter()
                .map(|(depth, pages)| DepthLevel { depth, pages })
                .collect(),
            by_depth: crawl.discovered.by_depth.clone(),
            total_estimated_size: crawl.discovered.total_estimated_size,
        })
    }

    /// Cancel a crawling session. The BFS loop observes the flag at its
    /// next iteration; the status flips immediately.
    pub fn cancel(&self, crawl_id: &str) -> Result<(), CaptureError> {
        let mut map = Self::lock(&self.crawls);
        let entry = map
            .get_mut(crawl_id)
            .ok_or_else(|| CaptureError::Other(format!("test crawl {crawl_id} not found")))?;
        if entry.crawl.status != TestCrawlStatus::Crawling {
            return Err(CaptureError::Other(format!(
                "test crawl {crawl_id} is not running"
            )));
        }
        entry.cancel.store(true, Ordering::Relaxed);
        entry.crawl.status = TestCrawlStatus::Failed;
        entry.crawl.error = Some("Cancelled by user".to_string());
        Ok(())
    }

    /// Sweep non-active crawls older than `max_age`. Returns the number
    /// removed.
    pub fn cleanup(&self, max_age: Duration) -> usize {
        let cutoff = Utc::now()
            - chrono::Duration::from_std(max_age).unwrap_or_else(|_| chrono::Duration::days(2));
        let mut map = Self::lock(&self.crawls);
        let before = map.len();
        map.retain(|_, entry| {
            entry.crawl.status == TestCrawlStatus::Crawling
                || entry
                    .crawl
                    .completed_at
                    .unwrap_or(entry.crawl.started_at)
                    >= cutoff
        });
        before - map.len()
    }
}
