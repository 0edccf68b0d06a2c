//! Types shared by the two crawl modes.

use serde::{Deserialize, Serialize};

use crate::extractor::ExtractedResources;

/// One pending traversal item.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueItem {
    pub url: String,
    pub depth: u8,
}

/// Per-kind counts observed on a discovered page.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceCounts {
    pub images: u64,
    pub css: u64,
    pub js: u64,
    pub fonts: u64,
    pub links: u64,
}

/// Page metadata produced by a discovery crawl; no assets are downloaded.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscoveredPage {
    pub url: String,
    pub title: String,
    pub description: String,
    pub depth: u8,
    pub resources: ResourceCounts,
    /// HTML length plus per-kind heuristic weights, in bytes.
    pub estimated_size: u64,
    /// Pre-selection flag consumed by the curated-capture workflow.
    pub selected: bool,
    /// Child links feeding BFS expansion.
    pub links: Vec<String>,
}

/// Result of one capture-mode page action.
#[derive(Debug, Clone)]
pub struct CapturedPage {
    pub url: String,
    pub depth: u8,
    pub title: String,
    pub html: String,
    pub resources: ExtractedResources,
    pub links: Vec<String>,
    pub success: bool,
    pub error: Option<String>,
}

/// Shape returned by the in-page discovery script.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct DiscoverySnapshot {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub images: u64,
    #[serde(default)]
    pub css: u64,
    #[serde(default)]
    pub js: u64,
    #[serde(default)]
    pub fonts: u64,
    #[serde(default)]
    pub links: Vec<String>,
    #[serde(default)]
    pub html_length: u64,
}
