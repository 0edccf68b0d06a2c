//! Stylesheet `url(...)` rewriting.
//!
//! Runs after all downloads so every inter-resource reference the map knows
//! about can be rewritten. Stylesheets live under `css/`, so local targets
//! are reached through `../<bucket>/<filename>`.

use regex::Regex;
use std::sync::OnceLock;
use url::Url;

use super::UrlMap;

/// `url( ... )` with optional quotes; capture group 1 is the reference.
pub fn css_url_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"url\(\s*['"]?([^'")]+)['"]?\s*\)"#).expect("static url pattern compiles")
    })
}

/// Rewrite every `url(...)` in `css` whose absolute resolution against the
/// stylesheet's own URL is present in the map. `data:` URLs and unmapped
/// references are left untouched.
#[must_use]
pub fn rewrite_stylesheet(css: &str, stylesheet_url: &Url, map: &UrlMap) -> String {
    css_url_re()
        .replace_all(css, |caps: &regex::Captures<'_>| {
            let raw = caps[1].trim();
            if raw.starts_with("data:") {
                return caps[0].to_string();
            }
            let Ok(absolute) = stylesheet_url.join(raw) else {
                return caps[0].to_string();
            };
            match map.get(absolute.as_str()) {
                Some(local) => format!("url(\"../{local}\")"),
                None => caps[0].to_string(),
            }
        })
        .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rewrites_mapped_font_reference() {
        let mut map = UrlMap::new();
        map.insert("https://example.test/f.woff2", "fonts/f.woff2");
        let sheet = Url::parse("https://example.test/css/s.css").expect("sheet URL parses");
        let css = r#"@font-face { src: url("/f.woff2") format("woff2"); }"#;
        let rewritten = rewrite_stylesheet(css, &sheet, &map);
        assert!(rewritten.contains(r#"url("../fonts/f.woff2")"#), "got: {rewritten}");
    }

    #[test]
    fn leaves_unmapped_and_data_urls_alone() {
        let map = UrlMap::new();
        let sheet = Url::parse("https://example.test/css/s.css").expect("sheet URL parses");
        let css = "a { background: url(/missing.png); } b { background: url(data:image/png;base64,AA); }";
        assert_eq!(rewrite_stylesheet(css, &sheet, &map), css);
    }
}
