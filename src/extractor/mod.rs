//! Resource enumeration for a loaded page.
//!
//! The in-page script collects image/stylesheet/script/favicon references;
//! font URLs come from an off-page `@font-face` scan of the stylesheets.

pub mod fonts;
pub mod js_scripts;

use anyhow::{Context, Result};
use regex::Regex;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::OnceLock;

use crate::browser::BrowserPage;

/// One stylesheet reference: external (`url`) or inline (`content` with its
/// document position).
#[derive(Debug, Clone, Deserialize)]
pub struct StylesheetRef {
    pub url: Option<String>,
    pub inline: bool,
    pub content: Option<String>,
    pub index: usize,
}

/// Everything the in-page enumeration found.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractedResources {
    /// Absolute image URLs: `src`, `srcset` candidates, `<picture>` sources
    /// and inline-style `url(...)` references, deduplicated.
    #[serde(default)]
    pub images: Vec<String>,
    /// Number of `<img src>` elements; capture stats count elements, not
    /// downloaded variants.
    #[serde(default)]
    pub image_count: u32,
    #[serde(default)]
    pub stylesheets: Vec<StylesheetRef>,
    #[serde(default)]
    pub scripts: Vec<String>,
    /// Linked PDF documents; only downloaded when the capture opts in.
    #[serde(default)]
    pub pdfs: Vec<String>,
    pub favicon: Option<String>,
}

impl ExtractedResources {
    /// External stylesheet URLs in document order.
    #[must_use]
    pub fn external_stylesheets(&self) -> Vec<String> {
        self.stylesheets
            .iter()
            .filter(|s| !s.inline)
            .filter_map(|s| s.url.clone())
            .collect()
    }
}

/// Run the in-page enumeration script.
pub async fn extract_resources(page: &dyn BrowserPage) -> Result<ExtractedResources> {
    let value = page
        .evaluate(js_scripts::CAPTURE_RESOURCES_SCRIPT)
        .await
        .context("resource enumeration script failed")?;
    serde_json::from_value(value).context("resource enumeration returned unexpected shape")
}

fn wikipedia_thumb_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^(?P<base>.*?/wikipedia/[^/]+)/thumb/(?P<d1>[^/]+)/(?P<d2>[^/]+)/(?P<file>[^/]+)/\d+px-[^/]+$")
            .expect("static wikipedia pattern compiles")
    })
}

/// Map Wikipedia thumbnail URLs to their full-resolution originals.
///
/// `…/wikipedia/<project>/thumb/<d1>/<d2>/<file>/<N>px-…` maps to
/// `…/wikipedia/<project>/<d1>/<d2>/<file>`. The mapping is informational;
/// the rewriter consults it when resolving `/wiki/File:` anchors.
#[must_use]
pub fn wikipedia_thumb_originals(images: &[String]) -> HashMap<String, String> {
    let mut originals = HashMap::new();
    for image in images {
        if let Some(caps) = wikipedia_thumb_re().captures(image) {
            let original = format!("{}/{}/{}/{}", &caps["base"], &caps["d1"], &caps["d2"], &caps["file"]);
            originals.insert(image.clone(), original);
        }
    }
    originals
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_wikipedia_thumbs_to_originals() {
        let images = vec![
            "https://upload.wikimedia.org/wikipedia/commons/thumb/a/ab/Example.jpg/250px-Example.jpg"
                .to_string(),
            "https://example.test/plain.png".to_string(),
        ];
        let originals = wikipedia_thumb_originals(&images);
        assert_eq!(originals.len(), 1);
        assert_eq!(
            originals
                .get("https://upload.wikimedia.org/wikipedia/commons/thumb/a/ab/Example.jpg/250px-Example.jpg")
                .map(String::as_str),
            Some("https://upload.wikimedia.org/wikipedia/commons/a/ab/Example.jpg")
        );
    }
}
