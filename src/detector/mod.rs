//! Content-region link extraction.
//!
//! Finds the DOM subtree most likely to hold primary content via a priority
//! selector list, collects its outbound HTTP links, and drops links sitting
//! inside navigation chrome (nav/header/footer/aside and their ARIA
//! equivalents). Post-processing applies the optional same-domain filter and
//! deduplicates after stripping fragments and one trailing slash.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::HashSet;
use url::Url;

use crate::browser::BrowserPage;
use crate::utils::{normalize_for_dedup, url_utils::extract_domain};

/// In-page script: locate the content container, collect `a[href]` inside
/// it, and filter anchors that live inside exclusion chrome.
pub const CONTENT_LINKS_SCRIPT: &str = r#"
    (() => {
        const contentSelectors = [
            'main', 'article', '[role="main"]',
            '.content', '.main-content', '.post-content', '.entry-content',
            '.article-body', '#content', '#main'
        ];
        const exclusionSelectors = [
            'nav', 'header', 'footer', 'aside',
            '[role="navigation"]', '[role="banner"]',
            '[role="complementary"]', '[role="contentinfo"]',
            '.nav', '.navbar', '.menu', '.sidebar',
            '.breadcrumb', '.breadcrumbs'
        ];

        let container = null;
        for (const selector of contentSelectors) {
            container = document.querySelector(selector);
            if (container) break;
        }
        const root = container || document.body;
        if (!root) {
            return { links: [], containerFound: false, filteredCount: 0 };
        }

        const excluded = [];
        exclusionSelectors.forEach(selector => {
            document.querySelectorAll(selector).forEach(el => excluded.push(el));
        });

        const links = [];
        let filtered = 0;
        root.querySelectorAll('a[href]').forEach(a => {
            const href = a.getAttribute('href');
            if (!href || href.startsWith('#')) return;
            let url;
            try {
                url = new URL(href, window.location.href);
            } catch (e) {
                return;
            }
            if (!['http:', 'https:'].includes(url.protocol)) return;
            if (excluded.some(el => el.contains(a))) {
                filtered += 1;
                return;
            }
            links.push(url.href);
        });

        return { links, containerFound: container !== null, filteredCount: filtered };
    })()
"#;

/// Raw result of the in-page pass.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentLinks {
    #[serde(default)]
    pub links: Vec<String>,
    /// Whether a content selector matched (false = fell back to `<body>`).
    #[serde(default)]
    pub container_found: bool,
    /// Links dropped because they sat inside exclusion chrome.
    #[serde(default)]
    pub filtered_count: usize,
}

/// Run the in-page pass and return links plus diagnostics.
pub async fn extract_content_links(page: &dyn BrowserPage) -> Result<ContentLinks> {
    let value = page
        .evaluate(CONTENT_LINKS_SCRIPT)
        .await
        .context("content link script failed")?;
    serde_json::from_value(value).context("content link script returned unexpected shape")
}

/// Post-process extracted links: optional same-domain filter against the
/// base URL's hostname, then dedup after fragment/trailing-slash stripping.
#[must_use]
pub fn filter_links(links: &[String], base: &Url, same_domain_only: bool) -> Vec<String> {
    let base_domain = extract_domain(base.as_str());
    let mut seen = HashSet::new();
    let mut result = Vec::new();

    for link in links {
        if same_domain_only {
            let link_domain = extract_domain(link);
            if link_domain.is_none() || link_domain != base_domain {
                continue;
            }
        }
        let normalized = normalize_for_dedup(link);
        if seen.insert(normalized.clone()) {
            result.push(normalized);
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_domain_filter_drops_foreign_hosts() {
        let base = Url::parse("https://example.test/article").expect("base parses");
        let links = vec![
            "https://example.test/p2".to_string(),
            "https://other.test/x".to_string(),
            "https://www.example.test/p3".to_string(),
        ];
        let filtered = filter_links(&links, &base, true);
        assert_eq!(
            filtered,
            vec![
                "https://example.test/p2".to_string(),
                "https://www.example.test/p3".to_string(),
            ]
        );
    }

    #[test]
    fn dedups_after_fragment_and_slash_stripping() {
        let base = Url::parse("https://example.test/").expect("base parses");
        let links = vec![
            "https://example.test/page".to_string(),
            "https://example.test/page/".to_string(),
            "https://example.test/page#section".to_string(),
        ];
        let filtered = filter_links(&links, &base, false);
        assert_eq!(filtered, vec!["https://example.test/page".to_string()]);
    }
}
