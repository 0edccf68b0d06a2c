//! Scripted fake browser for crawler and orchestrator tests.
//!
//! Pages are keyed by URL; evaluation is dispatched on the exact script
//! constant the pipeline ships, so the fake stays honest about which
//! scripts actually run.

// Each test binary uses a subset of these helpers.
#![allow(dead_code)]

use anyhow::Result;
use async_trait::async_trait;
use serde_json::json;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use pagevault::browser::{Browser, BrowserPage, InterceptPolicy, WaitUntil};
use pagevault::detector::CONTENT_LINKS_SCRIPT;
use pagevault::extractor::js_scripts::{
    CAPTURE_RESOURCES_SCRIPT, DISCOVERY_SCRIPT, LAZY_IMAGE_PROBE_SCRIPT,
};

/// One scripted page.
#[derive(Clone)]
pub struct FakePageSpec {
    pub html: String,
    pub title: String,
    /// Shape of `CAPTURE_RESOURCES_SCRIPT`'s return value.
    pub resources: serde_json::Value,
    /// Shape of `DISCOVERY_SCRIPT`'s return value.
    pub discovery: serde_json::Value,
    /// Shape of `CONTENT_LINKS_SCRIPT`'s return value.
    pub content_links: serde_json::Value,
}

impl FakePageSpec {
    pub fn new(title: &str, html: &str) -> Self {
        Self {
            html: html.to_string(),
            title: title.to_string(),
            resources: json!({
                "images": [],
                "imageCount": 0,
                "stylesheets": [],
                "scripts": [],
                "pdfs": [],
                "favicon": null
            }),
            discovery: json!({
                "title": title,
                "description": "",
                "images": 0,
                "css": 0,
                "js": 0,
                "fonts": 0,
                "links": [],
                "htmlLength": html.len()
            }),
            content_links: json!({
                "links": [],
                "containerFound": true,
                "filteredCount": 0
            }),
        }
    }

    pub fn with_resources(mut self, resources: serde_json::Value) -> Self {
        self.resources = resources;
        self
    }

    pub fn with_links(mut self, links: &[&str]) -> Self {
        self.content_links = json!({
            "links": links,
            "containerFound": true,
            "filteredCount": 0
        });
        self.discovery["links"] = json!(links);
        self
    }

    pub fn with_discovery_counts(mut self, images: u64, css: u64, js: u64, fonts: u64) -> Self {
        self.discovery["images"] = json!(images);
        self.discovery["css"] = json!(css);
        self.discovery["js"] = json!(js);
        self.discovery["fonts"] = json!(fonts);
        self
    }
}

/// Scripted browser serving pre-baked pages.
pub struct FakeBrowser {
    pages: HashMap<String, FakePageSpec>,
    fail_navigation: HashSet<String>,
    navigation_delay: Option<Duration>,
    pub navigations: Mutex<Vec<String>>,
}

impl FakeBrowser {
    pub fn new() -> Self {
        Self {
            pages: HashMap::new(),
            fail_navigation: HashSet::new(),
            navigation_delay: None,
            navigations: Mutex::new(Vec::new()),
        }
    }

    pub fn with_page(mut self, url: &str, spec: FakePageSpec) -> Self {
        self.pages.insert(url.to_string(), spec);
        self
    }

    pub fn with_failing_url(mut self, url: &str) -> Self {
        self.fail_navigation.insert(url.to_string());
        self
    }

    pub fn with_navigation_delay(mut self, delay: Duration) -> Self {
        self.navigation_delay = Some(delay);
        self
    }

    pub fn visited(&self) -> Vec<String> {
        self.navigations
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

/// Thin handle so `Browser` (foreign trait, foreign `Arc`) can be
/// implemented for a local type without violating the orphan rule.
pub struct FakeBrowserHandle(pub Arc<FakeBrowser>);

#[async_trait]
impl Browser for FakeBrowserHandle {
    async fn new_page(&self) -> Result<Box<dyn BrowserPage>> {
        Ok(Box::new(FakePage {
            browser: self.0.clone(),
            current: Mutex::new(None),
        }))
    }

    async fn shutdown(&self) -> Result<()> {
        Ok(())
    }
}

pub struct FakePage {
    browser: Arc<FakeBrowser>,
    current: Mutex<Option<String>>,
}

impl FakePage {
    fn spec(&self) -> Result<FakePageSpec> {
        let current = self
            .current
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .ok_or_else(|| anyhow::anyhow!("no page loaded"))?;
        self.browser
            .pages
            .get(&current)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("no scripted page for {current}"))
    }
}

#[async_trait]
impl BrowserPage for FakePage {
    async fn set_user_agent(&self, _user_agent: &str) -> Result<()> {
        Ok(())
    }

    async fn set_extra_headers(&self, _headers: &[(String, String)]) -> Result<()> {
        Ok(())
    }

    async fn set_intercept_policy(&self, _policy: InterceptPolicy) -> Result<()> {
        Ok(())
    }

    async fn navigate(&self, url: &str, _wait: WaitUntil, _timeout: Duration) -> Result<()> {
        if let Some(delay) = self.browser.navigation_delay {
            tokio::time::sleep(delay).await;
        }
        self.browser
            .navigations
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(url.to_string());
        if self.browser.fail_navigation.contains(url) {
            anyhow::bail!("navigation refused for {url}");
        }
        if !self.browser.pages.contains_key(url) {
            anyhow::bail!("no scripted page for {url}");
        }
        *self.current.lock().unwrap_or_else(PoisonError::into_inner) = Some(url.to_string());
        Ok(())
    }

    async fn evaluate(&self, script: &str) -> Result<serde_json::Value> {
        let spec = self.spec()?;
        if script == CAPTURE_RESOURCES_SCRIPT {
            return Ok(spec.resources);
        }
        if script == DISCOVERY_SCRIPT {
            return Ok(spec.discovery);
        }
        if script == CONTENT_LINKS_SCRIPT {
            return Ok(spec.content_links);
        }
        if script == LAZY_IMAGE_PROBE_SCRIPT {
            return Ok(serde_json::Value::Bool(false));
        }
        if script == "document.title" {
            return Ok(serde_json::Value::String(spec.title));
        }
        Ok(serde_json::Value::Bool(true))
    }

    async fn title(&self) -> Result<String> {
        Ok(self.spec()?.title)
    }

    async fn content(&self) -> Result<String> {
        Ok(self.spec()?.html)
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }
}
