//! Local filename generation for downloaded resources.
//!
//! Names derive from the URL path basename, sanitized to `[A-Za-z0-9._-]`
//! with the query string dropped. Generic dispatcher scripts and
//! extension-less URLs get a content-address suffix so distinct URLs never
//! share a name.

use url::Url;
use xxhash_rust::xxh3::xxh3_64;

use crate::utils::constants::MAX_FILENAME_LEN;

/// Basenames that are dispatchers rather than real file names. With a query
/// string present, the query decides the content, so the name alone would
/// collide.
const GENERIC_DISPATCHERS: &[&str] = &["load.php", "index.php", "api.php", "script.php"];

/// Lowercase hex digest of `input`, truncated to `len` characters.
#[must_use]
pub fn short_hash(input: &str, len: usize) -> String {
    let digest = format!("{:016x}", xxh3_64(input.as_bytes()));
    digest[..len.min(digest.len())].to_string()
}

/// Map everything outside `[A-Za-z0-9._-]` to `_`.
fn sanitize(input: &str) -> String {
    input
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// Map a Content-Type to a file extension (with leading dot).
#[must_use]
pub fn extension_for_content_type(content_type: &str) -> Option<&'static str> {
    // Strip parameters like "; charset=utf-8"
    let essence = content_type.split(';').next().unwrap_or("").trim();
    let ext = match essence {
        "text/css" => ".css",
        "application/javascript" | "text/javascript" | "application/x-javascript" => ".js",
        "text/html" | "application/xhtml+xml" => ".html",
        "image/png" => ".png",
        "image/jpeg" => ".jpg",
        "image/gif" => ".gif",
        "image/webp" => ".webp",
        "image/svg+xml" => ".svg",
        "image/avif" => ".avif",
        "image/x-icon" | "image/vnd.microsoft.icon" => ".ico",
        "font/woff2" | "application/font-woff2" => ".woff2",
        "font/woff" | "application/font-woff" => ".woff",
        "font/ttf" | "application/x-font-ttf" => ".ttf",
        "font/otf" => ".otf",
        "application/vnd.ms-fontobject" => ".eot",
        "application/pdf" => ".pdf",
        "application/json" => ".json",
        _ => return None,
    };
    Some(ext)
}

/// Split a name into (stem, extension-with-dot). A trailing dot or a name
/// with no dot yields an empty extension.
fn split_extension(name: &str) -> (&str, &str) {
    match name.rfind('.') {
        Some(idx) if idx > 0 && idx < name.len() - 1 => (&name[..idx], &name[idx..]),
        _ => (name, ""),
    }
}

/// Truncate a filename to [`MAX_FILENAME_LEN`], preserving the extension.
fn cap_length(name: String) -> String {
    if name.len() <= MAX_FILENAME_LEN {
        return name;
    }
    let (stem, ext) = split_extension(&name);
    let keep = MAX_FILENAME_LEN.saturating_sub(ext.len()).max(1);
    let stem: String = stem.chars().take(keep).collect();
    format!("{stem}{ext}")
}

/// Generate the local filename for a downloaded resource.
///
/// `content_type` is the response Content-Type header, consulted for
/// dispatcher URLs and for URLs whose path carries no extension.
#[must_use]
pub fn filename_for(url: &Url, content_type: Option<&str>) -> String {
    let basename = url
        .path_segments()
        .and_then(|mut segments| segments.next_back())
        .unwrap_or("");
    let basename = sanitize(basename);

    let ct_ext = content_type.and_then(extension_for_content_type);

    // Dispatcher scripts: the query selects the payload, so hash the full
    // URL into the name and let the Content-Type pick the extension.
    if GENERIC_DISPATCHERS.contains(&basename.to_lowercase().as_str()) && url.query().is_some() {
        let (stem, original_ext) = split_extension(&basename);
        let ext = ct_ext.unwrap_or(original_ext);
        let suffix = short_hash(url.as_str(), 8);
        return cap_length(format!("{stem}_{suffix}{ext}"));
    }

    let (_, ext) = split_extension(&basename);
    if basename.is_empty() || ext.is_empty() {
        let suffix = short_hash(url.as_str(), 12);
        return cap_length(format!("resource_{suffix}{}", ct_ext.unwrap_or("")));
    }

    cap_length(basename)
}

/// Disambiguate `name` against already-used names. When taken, a hash of
/// the URL is inserted before the extension, keeping map injectivity.
#[must_use]
pub fn disambiguate(name: &str, url: &Url, taken: &std::collections::HashSet<String>) -> String {
    if !taken.contains(name) {
        return name.to_string();
    }
    let (stem, ext) = split_extension(name);
    let suffix = short_hash(url.as_str(), 8);
    cap_length(format!("{stem}_{suffix}{ext}"))
}
