//! The Browser capability consumed by the capture pipeline.
//!
//! The core never talks to a concrete browser; it drives these traits.
//! Production uses the chromiumoxide adapter in [`chromium`]; tests
//! substitute a scripted fake.

pub mod chromium;

use anyhow::Result;
use async_trait::async_trait;
use std::time::Duration;

pub use chromium::ChromiumBrowser;

/// Wait condition for a navigation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitUntil {
    /// The load event fired.
    Load,
    /// DOMContentLoaded fired.
    DomContentLoaded,
    /// Load fired and the network has settled (networkidle2 equivalent).
    NetworkIdle,
    /// DOMContentLoaded fired and the network has settled. Used by
    /// discovery crawls.
    DomContentLoadedAndNetworkIdle,
}

/// Request-interception policy applied before navigation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterceptPolicy {
    /// Let every request through.
    AllowAll,
    /// Abort everything except document and script requests. Discovery
    /// crawls use this to skip image/font/media payloads.
    DocumentsAndScriptsOnly,
}

/// One open page in the browser.
#[async_trait]
pub trait BrowserPage: Send + Sync {
    /// Override the user agent for subsequent requests from this page.
    async fn set_user_agent(&self, user_agent: &str) -> Result<()>;

    /// Apply extra HTTP headers to every request from this page.
    async fn set_extra_headers(&self, headers: &[(String, String)]) -> Result<()>;

    /// Install a request-interception policy. Must be called before
    /// `navigate` to take effect for the page load.
    async fn set_intercept_policy(&self, policy: InterceptPolicy) -> Result<()>;

    /// Navigate and wait for the given condition, bounded by `timeout`.
    async fn navigate(&self, url: &str, wait: WaitUntil, timeout: Duration) -> Result<()>;

    /// Evaluate a script in the page and return its JSON result. Promises
    /// are awaited.
    async fn evaluate(&self, script: &str) -> Result<serde_json::Value>;

    /// Current document title.
    async fn title(&self) -> Result<String>;

    /// Serialized HTML of the current document.
    async fn content(&self) -> Result<String>;

    /// Close the page and release its target.
    async fn close(&self) -> Result<()>;
}

/// A running browser able to open pages.
#[async_trait]
pub trait Browser: Send + Sync {
    /// Open a blank page.
    async fn new_page(&self) -> Result<Box<dyn BrowserPage>>;

    /// Shut the browser down, closing every page.
    async fn shutdown(&self) -> Result<()>;
}
