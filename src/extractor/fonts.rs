//! Web-font discovery from stylesheet text.
//!
//! Stylesheet bodies are fetched text-only (never persisted here; the
//! downloader stores the stylesheet separately). `@font-face` blocks are
//! parsed for `src: url(...)` references resolved against the stylesheet's
//! own URL; inline `<style>` blocks resolve against the page URL.

use log::debug;
use regex::Regex;
use std::sync::OnceLock;
use url::Url;

use crate::downloader::ResourceDownloader;
use crate::utils::constants::STYLESHEET_FETCH_TIMEOUT;

use super::StylesheetRef;

fn font_face_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?s)@font-face\s*\{([^}]*)\}").expect("static font-face pattern compiles")
    })
}

fn src_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"src\s*:\s*([^;}]+)").expect("static src pattern compiles"))
}

fn url_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"url\(\s*['"]?([^'")]+)['"]?\s*\)"#).expect("static url pattern compiles")
    })
}

/// Extract every font URL declared by `@font-face` blocks in `css`,
/// resolved against `base`. `data:` URLs are skipped.
#[must_use]
pub fn parse_font_face_urls(css: &str, base: &Url) -> Vec<String> {
    let mut fonts = Vec::new();
    for block in font_face_re().captures_iter(css) {
        let body = &block[1];
        for src in src_re().captures_iter(body) {
            for reference in url_re().captures_iter(&src[1]) {
                let raw = reference[1].trim();
                if raw.starts_with("data:") {
                    continue;
                }
                match base.join(raw) {
                    Ok(resolved) => fonts.push(resolved.to_string()),
                    Err(e) => debug!("Skipping unresolvable font URL {raw:?}: {e}"),
                }
            }
        }
    }
    fonts
}

/// Collect font URLs from every stylesheet of a page.
///
/// External sheets are fetched through the session downloader (15 s
/// timeout); inline blocks are parsed as-is against the page URL.
pub async fn extract_font_urls(
    downloader: &ResourceDownloader,
    stylesheets: &[StylesheetRef],
    page_url: &Url,
) -> Vec<String> {
    let mut fonts = Vec::new();

    for sheet in stylesheets {
        if sheet.inline {
            if let Some(content) = &sheet.content {
                fonts.extend(parse_font_face_urls(content, page_url));
            }
            continue;
        }

        let Some(href) = &sheet.url else { continue };
        let Ok(sheet_url) = Url::parse(href) else {
            debug!("Skipping stylesheet with unparseable URL: {href}");
            continue;
        };
        match downloader
            .fetch_text(&sheet_url, STYLESHEET_FETCH_TIMEOUT)
            .await
        {
            Ok(css) => fonts.extend(parse_font_face_urls(&css, &sheet_url)),
            Err(e) => debug!("Could not fetch stylesheet {href} for font scan: {e:#}"),
        }
    }

    let mut seen = std::collections::HashSet::new();
    fonts.retain(|f| seen.insert(f.clone()));
    fonts
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_and_resolves_font_urls() {
        let css = r#"
            body { color: red; }
            @font-face {
                font-family: "Demo";
                src: url("/f.woff2") format("woff2"), url(fallback.woff) format("woff");
            }
        "#;
        let base = Url::parse("https://example.test/assets/s.css").expect("base parses");
        let fonts = parse_font_face_urls(css, &base);
        assert_eq!(
            fonts,
            vec![
                "https://example.test/f.woff2".to_string(),
                "https://example.test/assets/fallback.woff".to_string(),
            ]
        );
    }

    #[test]
    fn skips_data_urls() {
        let css = "@font-face { src: url(data:font/woff2;base64,AAAA) format('woff2'); }";
        let base = Url::parse("https://example.test/s.css").expect("base parses");
        assert!(parse_font_face_urls(css, &base).is_empty());
    }

    #[test]
    fn ignores_urls_outside_font_face() {
        let css = ".hero { background: url(/hero.png); }";
        let base = Url::parse("https://example.test/s.css").expect("base parses");
        assert!(parse_font_face_urls(css, &base).is_empty());
    }
}
