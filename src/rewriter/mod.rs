//! HTML rewriting: point the archived document at its local resources.
//!
//! The pass resolves every reference against the effective base URL
//! (`<base href>` wins over the page URL and is then stripped), replaces
//! mapped references with relative archive paths, removes SRI/CSP metadata
//! that would reject the local bytes, and absolutizes remaining relative
//! anchors so the archive links back to the live site.
//!
//! A handler failure on one element leaves that element untouched; the
//! capture proceeds.

pub mod css;

use anyhow::{Context, Result};
use lol_html::{element, rewrite_str, RewriteStrSettings};
use log::debug;
use regex::Regex;
use std::collections::HashMap;
use std::sync::OnceLock;
use url::Url;

use crate::utils::url_utils::has_image_extension;

/// Per-capture mapping from absolute resource URL to relative archive path
/// (`images/<file>`, `css/<file>`, …; favicon maps to a bare filename).
#[derive(Debug, Clone, Default)]
pub struct UrlMap {
    entries: HashMap<String, String>,
}

impl UrlMap {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, url: impl Into<String>, local: impl Into<String>) {
        self.entries.insert(url.into(), local.into());
    }

    #[must_use]
    pub fn get(&self, url: &str) -> Option<&String> {
        self.entries.get(url)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Resolve a raw reference against `base` and look it up.
    #[must_use]
    pub fn lookup(&self, base: &Url, raw: &str) -> Option<&String> {
        let absolute = base.join(raw).ok()?;
        self.entries.get(absolute.as_str())
    }

    /// Resolve a `/wiki/File:<name>` anchor: among mapped image URLs whose
    /// URL contains the decoded file name, pick the one with the largest
    /// `<N>px-` thumbnail prefix.
    #[must_use]
    pub fn find_wiki_file(&self, decoded_name: &str) -> Option<&String> {
        static PX_RE: OnceLock<Regex> = OnceLock::new();
        let px_re = PX_RE
            .get_or_init(|| Regex::new(r"/(\d+)px-").expect("static px pattern compiles"));

        self.entries
            .iter()
            .filter(|(url, local)| url.contains(decoded_name) && has_image_extension(local))
            .max_by_key(|(url, _)| {
                px_re
                    .captures(url)
                    .and_then(|c| c[1].parse::<u64>().ok())
                    .unwrap_or(0)
            })
            .map(|(_, local)| local)
    }
}

fn base_href_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"(?i)<base[^>]*\bhref\s*=\s*["']?([^"'\s>]+)"#)
            .expect("static base pattern compiles")
    })
}

/// Compute the effective base URL: `<base href>` resolved against the page
/// URL when present, the page URL otherwise.
#[must_use]
pub fn effective_base(html: &str, page_url: &Url) -> Url {
    if let Some(caps) = base_href_re().captures(html)
        && let Ok(resolved) = page_url.join(&caps[1])
    {
        return resolved;
    }
    page_url.clone()
}

/// Schemes and prefixes an anchor rewrite must never touch.
fn is_untouchable_href(href: &str) -> bool {
    let lower = href.trim_start().to_ascii_lowercase();
    lower.is_empty()
        || lower.starts_with('#')
        || lower.starts_with("javascript:")
        || lower.starts_with("mailto:")
        || lower.starts_with("tel:")
        || lower.starts_with("data:")
}

/// True when the href already points into a local archive bucket.
fn is_local_bucket_href(href: &str) -> bool {
    let trimmed = href.strip_prefix("../").unwrap_or(href);
    ["images/", "css/", "js/", "fonts/", "pdfs/", "pages/"]
        .iter()
        .any(|bucket| trimmed.starts_with(bucket))
}

/// Rewrite one srcset value, preserving candidate descriptors (`2x`, `250w`).
fn rewrite_srcset(srcset: &str, base: &Url, map: &UrlMap, prefix: &str) -> String {
    let candidates: Vec<String> = srcset
        .split(',')
        .filter_map(|candidate| {
            let candidate = candidate.trim();
            if candidate.is_empty() {
                return None;
            }
            let mut parts = candidate.split_whitespace();
            let url = parts.next()?;
            let descriptor = parts.collect::<Vec<_>>().join(" ");
            let target = map
                .lookup(base, url)
                .map_or_else(|| url.to_string(), |local| format!("{prefix}{local}"));
            if descriptor.is_empty() {
                Some(target)
            } else {
                Some(format!("{target} {descriptor}"))
            }
        })
        .collect();
    candidates.join(", ")
}

/// Set an attribute, leaving the element untouched on failure.
fn set_attr(el: &mut lol_html::html_content::Element<'_, '_>, name: &str, value: &str) {
    if let Err(e) = el.set_attribute(name, value) {
        debug!("Leaving <{}> untouched, could not set {name}: {e}", el.tag_name());
    }
}

/// Rewrite a page's HTML against the URL map.
///
/// `path_prefix` is `""` for the root `index.html` and `"../"` for pages
/// saved one level down in a multi-page capture.
pub fn rewrite_html(
    html: &str,
    page_url: &Url,
    map: &UrlMap,
    path_prefix: &str,
) -> Result<String> {
    let base = effective_base(html, page_url);

    let handlers = vec![
        // The base tag has been folded into `base`; a stale one would
        // re-point every relative reference we just rewrote.
        element!("base", |el| {
            el.remove();
            Ok(())
        }),
        element!("img", {
            let base = base.clone();
            move |el| {
                if let Some(src) = el.get_attribute("src")
                    && let Some(local) = map.lookup(&base, &src)
                {
                    set_attr(el, "src", &format!("{path_prefix}{local}"));
                }
                if let Some(srcset) = el.get_attribute("srcset") {
                    set_attr(el, "srcset", &rewrite_srcset(&srcset, &base, map, path_prefix));
                }
                Ok(())
            }
        }),
        element!("picture > source[srcset]", {
            let base = base.clone();
            move |el| {
                if let Some(srcset) = el.get_attribute("srcset") {
                    set_attr(el, "srcset", &rewrite_srcset(&srcset, &base, map, path_prefix));
                }
                Ok(())
            }
        }),
        element!("link", {
            let base = base.clone();
            move |el| {
                let rel = el.get_attribute("rel").unwrap_or_default().to_lowercase();
                if let Some(href) = el.get_attribute("href")
                    && (rel.contains("stylesheet") || rel.contains("icon"))
                    && let Some(local) = map.lookup(&base, &href)
                {
                    set_attr(el, "href", &format!("{path_prefix}{local}"));
                }
                // Local bytes no longer match remote hashes.
                el.remove_attribute("integrity");
                el.remove_attribute("crossorigin");
                Ok(())
            }
        }),
        element!("script", {
            let base = base.clone();
            move |el| {
                if let Some(src) = el.get_attribute("src")
                    && let Some(local) = map.lookup(&base, &src)
                {
                    set_attr(el, "src", &format!("{path_prefix}{local}"));
                }
                el.remove_attribute("integrity");
                el.remove_attribute("crossorigin");
                Ok(())
            }
        }),
        element!("meta[http-equiv]", |el| {
            let equiv = el.get_attribute("http-equiv").unwrap_or_default();
            if equiv.eq_ignore_ascii_case("content-security-policy") {
                el.remove();
            }
            Ok(())
        }),
        element!("a[href]", {
            let base = base.clone();
            move |el| {
                let Some(href) = el.get_attribute("href") else {
                    return Ok(());
                };
                if is_untouchable_href(&href) || is_local_bucket_href(&href) {
                    return Ok(());
                }

                let Ok(resolved) = base.join(&href) else {
                    return Ok(());
                };

                // Downloaded image or PDF target: link straight to the
                // local copy.
                if let Some(local) = map.get(resolved.as_str())
                    && (has_image_extension(local) || local.to_lowercase().ends_with(".pdf"))
                {
                    set_attr(el, "href", &format!("{path_prefix}{local}"));
                    return Ok(());
                }

                // Wikipedia file description pages: link to the best local
                // thumbnail of that file instead.
                if let Some(name) = resolved.path().strip_prefix("/wiki/File:") {
                    let decoded = urlencoding::decode(name)
                        .map_or_else(|_| name.to_string(), |d| d.into_owned());
                    if let Some(local) = map.find_wiki_file(&decoded) {
                        set_attr(el, "href", &format!("{path_prefix}{local}"));
                        return Ok(());
                    }
                }

                // Remaining relative links point back at the live site.
                if Url::parse(&href) == Err(url::ParseError::RelativeUrlWithoutBase) {
                    set_attr(el, "href", resolved.as_str());
                }
                Ok(())
            }
        }),
    ];

    rewrite_str(
        html,
        RewriteStrSettings {
            element_content_handlers: handlers,
            ..RewriteStrSettings::default()
        },
    )
    .context("HTML rewrite failed")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn map_with(entries: &[(&str, &str)]) -> UrlMap {
        let mut map = UrlMap::new();
        for (url, local) in entries {
            map.insert(*url, *local);
        }
        map
    }

    #[test]
    fn base_tag_overrides_page_url_and_is_removed() {
        let page = Url::parse("https://example.test/a/b").expect("page URL parses");
        let html = r#"<html><head><base href="https://cdn.test/assets/"></head><body><img src="x.png"></body></html>"#;
        let map = map_with(&[("https://cdn.test/assets/x.png", "images/x.png")]);
        let out = rewrite_html(html, &page, &map, "").expect("rewrite succeeds");
        assert!(!out.contains("<base"));
        assert!(out.contains(r#"src="images/x.png""#));
    }

    #[test]
    fn srcset_descriptors_survive() {
        let page = Url::parse("https://example.test/article").expect("page URL parses");
        let html = r#"<img src="https://cdn.test/b.jpg" srcset="https://cdn.test/b.jpg 1x, https://cdn.test/b@2x.jpg 2x">"#;
        let map = map_with(&[
            ("https://cdn.test/b.jpg", "images/b.jpg"),
            ("https://cdn.test/b@2x.jpg", "images/b_2x.jpg"),
        ]);
        let out = rewrite_html(html, &page, &map, "").expect("rewrite succeeds");
        assert!(out.contains(r#"srcset="images/b.jpg 1x, images/b_2x.jpg 2x""#), "got: {out}");
    }

    #[test]
    fn strips_sri_and_csp() {
        let page = Url::parse("https://example.test/").expect("page URL parses");
        let html = concat!(
            r#"<meta http-equiv="Content-Security-Policy" content="default-src 'self'">"#,
            r#"<script src="/app.js" integrity="sha384-xyz" crossorigin="anonymous"></script>"#,
        );
        let map = map_with(&[("https://example.test/app.js", "js/app.js")]);
        let out = rewrite_html(html, &page, &map, "").expect("rewrite succeeds");
        assert!(!out.contains("Content-Security-Policy"));
        assert!(!out.contains("integrity"));
        assert!(!out.contains("crossorigin"));
        assert!(out.contains(r#"src="js/app.js""#));
    }

    #[test]
    fn relative_anchors_absolutize() {
        let page = Url::parse("https://example.test/section/page").expect("page URL parses");
        let html = r##"<a href="/about">About</a><a href="other">Other</a><a href="#top">Top</a><a href="mailto:x@y.z">Mail</a>"##;
        let out = rewrite_html(html, &page, &UrlMap::new(), "").expect("rewrite succeeds");
        assert!(out.contains(r#"href="https://example.test/about""#));
        assert!(out.contains(r#"href="https://example.test/section/other""#));
        assert!(out.contains(r##"href="#top""##));
        assert!(out.contains(r#"href="mailto:x@y.z""#));
    }

    #[test]
    fn wiki_file_anchor_picks_largest_thumbnail() {
        let page = Url::parse("https://en.wikipedia.org/wiki/Example").expect("page URL parses");
        let html = r#"<a href="/wiki/File:Example.jpg">file page</a>"#;
        let map = map_with(&[
            (
                "https://upload.wikimedia.org/wikipedia/commons/thumb/a/ab/Example.jpg/250px-Example.jpg",
                "images/250px-Example.jpg",
            ),
            (
                "https://upload.wikimedia.org/wikipedia/commons/thumb/a/ab/Example.jpg/500px-Example.jpg",
                "images/500px-Example.jpg",
            ),
        ]);
        let out = rewrite_html(html, &page, &map, "").expect("rewrite succeeds");
        assert!(out.contains(r#"href="images/500px-Example.jpg""#), "got: {out}");
    }

    #[test]
    fn rewriting_twice_is_a_no_op() {
        let page = Url::parse("https://example.test/article").expect("page URL parses");
        let html = r#"<img src="/a.png"><link rel="stylesheet" href="/s.css"><a href="/p2">p2</a>"#;
        let map = map_with(&[
            ("https://example.test/a.png", "images/a.png"),
            ("https://example.test/s.css", "css/s.css"),
        ]);
        let once = rewrite_html(html, &page, &map, "").expect("first rewrite succeeds");
        let twice = rewrite_html(&once, &page, &map, "").expect("second rewrite succeeds");
        assert_eq!(once, twice);
    }
}
