//! URL manipulation helpers shared by the crawler, downloader and rewriter.

use url::Url;

/// Check if a URL is crawlable: http(s) only, no data/javascript/mailto/tel.
#[must_use]
pub fn is_capturable_url(url: &str) -> bool {
    if url.is_empty() {
        return false;
    }

    if url.starts_with('#')
        || url.starts_with("data:")
        || url.starts_with("javascript:")
        || url.starts_with("mailto:")
        || url.starts_with("tel:")
    {
        return false;
    }

    match Url::parse(url) {
        Ok(parsed) => matches!(parsed.scheme(), "http" | "https"),
        Err(_) => false,
    }
}

/// Extract the normalized domain from a URL: lowercase host, leading `www.`
/// stripped. Returns `None` when the URL has no host.
#[must_use]
pub fn extract_domain(url: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    let host = parsed.host_str()?;
    let host = host.to_lowercase();
    let normalized = host.strip_prefix("www.").filter(|rest| !rest.is_empty());
    Some(normalized.map_or(host.clone(), str::to_string))
}

/// Normalize a URL for visited-set / dedup purposes: drop the fragment and
/// at most one trailing slash from the path.
#[must_use]
pub fn normalize_for_dedup(url: &str) -> String {
    let without_fragment = url.split('#').next().unwrap_or(url);
    let trimmed = without_fragment.strip_suffix('/').unwrap_or(without_fragment);
    trimmed.to_string()
}

/// True when both URLs share a hostname (exact match, case-insensitive).
#[must_use]
pub fn same_hostname(a: &Url, b: &Url) -> bool {
    match (a.host_str(), b.host_str()) {
        (Some(ha), Some(hb)) => ha.eq_ignore_ascii_case(hb),
        _ => false,
    }
}

/// File extensions the rewriter treats as images when deciding whether to
/// point an anchor at a local copy.
pub const IMAGE_EXTENSIONS: &[&str] = &[
    "png", "jpg", "jpeg", "gif", "webp", "svg", "avif", "ico", "bmp",
];

/// True when the path (or local archive path) ends in an image extension.
#[must_use]
pub fn has_image_extension(path: &str) -> bool {
    let stem = path.split(['?', '#']).next().unwrap_or(path);
    stem.rsplit('.')
        .next()
        .is_some_and(|ext| IMAGE_EXTENSIONS.iter().any(|e| ext.eq_ignore_ascii_case(e)))
}
