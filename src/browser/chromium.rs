//! chromiumoxide-backed implementation of the Browser capability.
//!
//! Finds a system Chrome/Chromium (or downloads a managed build), launches
//! it with stealth arguments, and drives the CDP connection from a spawned
//! handler task.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chromiumoxide::browser::{Browser as CdpBrowser, BrowserConfigBuilder, HeadlessMode};
use chromiumoxide::cdp::browser_protocol::fetch;
use chromiumoxide::cdp::browser_protocol::network;
use chromiumoxide::fetcher::{BrowserFetcher, BrowserFetcherOptions};
use chromiumoxide::Page;
use futures::StreamExt;
use log::{debug, info, trace, warn};
use std::future::Future;
use std::path::PathBuf;
use std::process::Command;
use std::time::Duration;
use tokio::task::JoinHandle;

use super::{Browser, BrowserPage, InterceptPolicy, WaitUntil};

/// Wrap a page operation with an explicit timeout so CDP stalls cannot hang
/// a capture indefinitely.
async fn with_page_timeout<F, T>(operation: F, timeout: Duration, name: &str) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(timeout, operation).await {
        Ok(result) => result,
        Err(_) => Err(anyhow::anyhow!("{name} timeout after {:?}", timeout)),
    }
}

/// Find a Chrome/Chromium executable on the system.
///
/// `CHROMIUM_PATH` overrides all other discovery. Falls back to well-known
/// install locations, then `which`.
pub fn find_browser_executable() -> Result<PathBuf> {
    if let Ok(path) = std::env::var("CHROMIUM_PATH") {
        let path = PathBuf::from(path);
        if path.exists() {
            info!("Using browser from CHROMIUM_PATH: {}", path.display());
            return Ok(path);
        }
        warn!("CHROMIUM_PATH points at a non-existent file: {}", path.display());
    }

    let candidates: &[&str] = if cfg!(target_os = "macos") {
        &[
            "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
            "/Applications/Chromium.app/Contents/MacOS/Chromium",
            "/opt/homebrew/bin/chromium",
        ]
    } else if cfg!(target_os = "windows") {
        &[
            r"C:\Program Files\Google\Chrome\Application\chrome.exe",
            r"C:\Program Files (x86)\Google\Chrome\Application\chrome.exe",
            r"C:\Program Files\Chromium\Application\chrome.exe",
        ]
    } else {
        &[
            "/usr/bin/google-chrome",
            "/usr/bin/google-chrome-stable",
            "/usr/bin/chromium",
            "/usr/bin/chromium-browser",
            "/snap/bin/chromium",
            "/opt/google/chrome/chrome",
        ]
    };

    for candidate in candidates {
        let path = PathBuf::from(candidate);
        if path.exists() {
            info!("Found browser at: {}", path.display());
            return Ok(path);
        }
    }

    if !cfg!(target_os = "windows") {
        for cmd in &["chromium", "chromium-browser", "google-chrome", "chrome"] {
            if let Ok(output) = Command::new("which").arg(cmd).output()
                && output.status.success()
            {
                let path_str = String::from_utf8_lossy(&output.stdout).trim().to_string();
                if !path_str.is_empty() {
                    let path = PathBuf::from(path_str);
                    info!("Found browser via 'which': {}", path.display());
                    return Ok(path);
                }
            }
        }
    }

    Err(anyhow::anyhow!("Chrome/Chromium executable not found"))
}

/// Download a managed Chromium build into the user cache directory.
pub async fn download_managed_browser() -> Result<PathBuf> {
    info!("Downloading managed Chromium browser");

    let cache_dir = dirs::cache_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("pagevault")
        .join("chromium");
    std::fs::create_dir_all(&cache_dir).context("Failed to create browser cache directory")?;

    let fetcher = BrowserFetcher::new(
        BrowserFetcherOptions::builder()
            .with_path(&cache_dir)
            .build()
            .context("Failed to build fetcher options")?,
    );

    let revision_info = fetcher.fetch().await.context("Failed to fetch browser")?;
    info!("Downloaded Chromium to: {}", revision_info.folder_path.display());
    Ok(revision_info.executable_path)
}

/// Shared headless browser backing every capture page.
pub struct ChromiumBrowser {
    browser: tokio::sync::Mutex<CdpBrowser>,
    handler_task: JoinHandle<()>,
    user_data_dir: PathBuf,
}

impl ChromiumBrowser {
    /// Launch a browser instance with a unique user-data directory.
    pub async fn launch(headless: bool) -> Result<Self> {
        let chrome_path = match find_browser_executable() {
            Ok(path) => path,
            Err(_) => download_managed_browser().await?,
        };

        let user_data_dir = std::env::temp_dir().join(format!(
            "pagevault_chrome_{}_{}",
            std::process::id(),
            uuid::Uuid::new_v4().simple()
        ));
        std::fs::create_dir_all(&user_data_dir)
            .context("Failed to create user data directory")?;

        let mut config_builder = BrowserConfigBuilder::default()
            .request_timeout(Duration::from_secs(30))
            .window_size(1920, 1080)
            .user_data_dir(user_data_dir.clone())
            .chrome_executable(chrome_path);

        if headless {
            config_builder = config_builder.headless_mode(HeadlessMode::default());
        } else {
            config_builder = config_builder.with_head();
        }

        config_builder = config_builder
            .arg("--disable-blink-features=AutomationControlled")
            .arg("--disable-infobars")
            .arg("--disable-notifications")
            .arg("--disable-background-networking")
            .arg("--disable-background-timer-throttling")
            .arg("--disable-breakpad")
            .arg("--disable-hang-monitor")
            .arg("--disable-popup-blocking")
            .arg("--disable-prompt-on-repost")
            .arg("--no-first-run")
            .arg("--no-default-browser-check")
            .arg("--no-sandbox")
            .arg("--ignore-certificate-errors")
            .arg("--metrics-recording-only")
            .arg("--password-store=basic")
            .arg("--use-mock-keychain")
            .arg("--hide-scrollbars")
            .arg("--mute-audio");

        let browser_config = config_builder
            .build()
            .map_err(|e| anyhow::anyhow!("Failed to build browser config: {e}"))?;

        info!("Launching browser");
        let (browser, mut handler) = CdpBrowser::launch(browser_config)
            .await
            .context("Failed to launch browser")?;

        let handler_task = tokio::spawn(async move {
            while let Some(h) = handler.next().await {
                if let Err(e) = h {
                    let msg = e.to_string();
                    // Chrome emits CDP events chromiumoxide cannot decode;
                    // those are not actionable.
                    let benign = msg.contains("data did not match any variant")
                        || msg.contains("Failed to deserialize WS response");
                    if benign {
                        trace!("Suppressed benign CDP error: {msg}");
                    } else {
                        warn!("Browser handler error: {msg}");
                    }
                }
            }
            debug!("Browser handler task completed");
        });

        Ok(Self {
            browser: tokio::sync::Mutex::new(browser),
            handler_task,
            user_data_dir,
        })
    }
}

#[async_trait]
impl Browser for ChromiumBrowser {
    async fn new_page(&self) -> Result<Box<dyn BrowserPage>> {
        let page = {
            let browser = self.browser.lock().await;
            browser
                .new_page("about:blank")
                .await
                .context("Failed to create page")?
        };
        Ok(Box::new(ChromiumPage { page }))
    }

    async fn shutdown(&self) -> Result<()> {
        {
            let mut browser = self.browser.lock().await;
            if let Err(e) = browser.close().await {
                warn!("Browser close failed: {e}");
            }
            if let Err(e) = browser.wait().await {
                warn!("Browser wait failed: {e}");
            }
        }
        self.handler_task.abort();
        if let Err(e) = std::fs::remove_dir_all(&self.user_data_dir) {
            debug!("Could not remove user data dir: {e}");
        }
        Ok(())
    }
}

/// One chromiumoxide page behind the capability trait.
pub struct ChromiumPage {
    page: Page,
}

#[async_trait]
impl BrowserPage for ChromiumPage {
    async fn set_user_agent(&self, user_agent: &str) -> Result<()> {
        self.page
            .set_user_agent(user_agent)
            .await
            .context("Failed to override user agent")?;
        Ok(())
    }

    async fn set_extra_headers(&self, headers: &[(String, String)]) -> Result<()> {
        if headers.is_empty() {
            return Ok(());
        }
        self.page
            .execute(network::EnableParams::default())
            .await
            .context("Failed to enable network domain")?;

        let map: serde_json::Map<String, serde_json::Value> = headers
            .iter()
            .map(|(k, v)| (k.clone(), serde_json::Value::String(v.clone())))
            .collect();
        self.page
            .execute(network::SetExtraHttpHeadersParams {
                headers: network::Headers::new(serde_json::Value::Object(map)),
            })
            .await
            .context("Failed to set extra headers")?;
        Ok(())
    }

    async fn set_intercept_policy(&self, policy: InterceptPolicy) -> Result<()> {
        if policy == InterceptPolicy::AllowAll {
            return Ok(());
        }

        self.page
            .execute(fetch::EnableParams {
                patterns: Some(vec![fetch::RequestPattern {
                    url_pattern: Some("*".to_string()),
                    resource_type: None,
                    request_stage: Some(fetch::RequestStage::Request),
                }]),
                handle_auth_requests: Some(false),
            })
            .await
            .context("Failed to enable fetch interception")?;

        let mut paused = self
            .page
            .event_listener::<fetch::EventRequestPaused>()
            .await
            .context("Failed to subscribe to requestPaused events")?;
        let page = self.page.clone();

        tokio::spawn(async move {
            while let Some(event) = paused.next().await {
                let allowed = matches!(
                    event.resource_type,
                    network::ResourceType::Document | network::ResourceType::Script
                );
                let result = if allowed {
                    page.execute(fetch::ContinueRequestParams {
                        request_id: event.request_id.clone(),
                        url: None,
                        method: None,
                        post_data: None,
                        headers: None,
                        intercept_response: None,
                    })
                    .await
                    .map(|_| ())
                } else {
                    page.execute(fetch::FailRequestParams {
                        request_id: event.request_id.clone(),
                        error_reason: network::ErrorReason::BlockedByClient,
                    })
                    .await
                    .map(|_| ())
                };
                if let Err(e) = result {
                    trace!("Interception decision failed (page may be closing): {e}");
                }
            }
        });

        Ok(())
    }

    async fn navigate(&self, url: &str, wait: WaitUntil, timeout: Duration) -> Result<()> {
        with_page_timeout(
            async {
                self.page
                    .goto(url)
                    .await
                    .map_err(|e| anyhow::anyhow!("{e}"))?;
                Ok(())
            },
            timeout,
            "Page navigation",
        )
        .await?;

        if !matches!(wait, WaitUntil::DomContentLoaded) {
            with_page_timeout(
                async {
                    self.page
                        .wait_for_navigation()
                        .await
                        .map_err(|e| anyhow::anyhow!("{e}"))?;
                    Ok(())
                },
                timeout,
                "Page load",
            )
            .await?;
        }

        // networkidle2 approximation: the load event has fired; give late
        // XHR/asset requests a short settle window.
        if matches!(
            wait,
            WaitUntil::NetworkIdle | WaitUntil::DomContentLoadedAndNetworkIdle
        ) {
            tokio::time::sleep(Duration::from_millis(500)).await;
        }

        Ok(())
    }

    async fn evaluate(&self, script: &str) -> Result<serde_json::Value> {
        let result = self
            .page
            .evaluate(script)
            .await
            .map_err(|e| anyhow::anyhow!("Evaluation failed: {e}"))?;
        result
            .into_value()
            .map_err(|e| anyhow::anyhow!("Evaluation result was not JSON: {e}"))
    }

    async fn title(&self) -> Result<String> {
        let value = self
            .page
            .evaluate("document.title")
            .await
            .context("Failed to evaluate document.title")?
            .into_value()
            .map_err(|e| anyhow::anyhow!("Failed to read page title: {e}"))?;
        if let serde_json::Value::String(title) = value {
            Ok(title)
        } else {
            Ok(String::new())
        }
    }

    async fn content(&self) -> Result<String> {
        self.page
            .content()
            .await
            .map_err(|e| anyhow::anyhow!("Failed to get page content: {e}"))
    }

    async fn close(&self) -> Result<()> {
        self.page
            .clone()
            .close()
            .await
            .map_err(|e| anyhow::anyhow!("Failed to close page: {e}"))?;
        Ok(())
    }
}
