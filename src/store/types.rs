//! On-disk capture record types.
//!
//! Field names are camelCase on disk; the index summary mirrors a subset of
//! the per-capture metadata for fast listing.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// How a capture was produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CaptureMode {
    #[serde(rename = "single-page")]
    SinglePage,
    #[serde(rename = "multi-page")]
    MultiPage,
}

/// Per-capture resource statistics persisted in `metadata.json`.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CaptureStats {
    pub total_pages: u32,
    pub images: u32,
    pub stylesheets: u32,
    pub scripts: u32,
    pub fonts: u32,
    /// Recursive directory size in bytes.
    pub total_size: u64,
}

/// Full metadata written to `captures/<id>/metadata.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CaptureMetadata {
    pub id: String,
    pub url: String,
    pub title: String,
    pub captured_at: DateTime<Utc>,
    pub capture_mode: CaptureMode,
    pub stats: CaptureStats,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub notes: String,
    #[serde(default)]
    pub collections: Vec<String>,
    pub status: String,
    pub error: Option<String>,
}

/// Listing summary mirrored into `captures/index.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CaptureSummary {
    pub id: String,
    pub url: String,
    pub title: String,
    pub captured_at: DateTime<Utc>,
    /// Always null; kept for format compatibility.
    pub thumbnail: Option<String>,
    pub size: u64,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub collections: Vec<String>,
}

impl CaptureSummary {
    #[must_use]
    pub fn from_metadata(meta: &CaptureMetadata) -> Self {
        Self {
            id: meta.id.clone(),
            url: meta.url.clone(),
            title: meta.title.clone(),
            captured_at: meta.captured_at,
            thumbnail: None,
            size: meta.stats.total_size,
            tags: meta.tags.clone(),
            collections: meta.collections.clone(),
        }
    }
}

/// The `captures/index.json` document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaptureIndex {
    pub version: String,
    #[serde(default)]
    pub captures: Vec<CaptureSummary>,
    #[serde(default)]
    pub collections: Vec<String>,
}

impl Default for CaptureIndex {
    fn default() -> Self {
        Self {
            version: "1.0".to_string(),
            captures: Vec::new(),
            collections: Vec::new(),
        }
    }
}

/// Sort key for listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortKey {
    #[default]
    Date,
    Title,
    Size,
}

/// Sort direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    Asc,
    #[default]
    Desc,
}

/// Filter/sort/pagination parameters for `list_captures`.
#[derive(Debug, Clone, Default)]
pub struct ListQuery {
    pub tag: Option<String>,
    pub collection: Option<String>,
    /// Case-insensitive substring over title, URL and notes.
    pub search: Option<String>,
    pub sort: SortKey,
    pub order: SortOrder,
    pub limit: Option<usize>,
    pub offset: usize,
}

/// One page of listing results.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CaptureListPage {
    pub total: usize,
    pub captures: Vec<CaptureSummary>,
    pub has_more: bool,
}

/// Mutable metadata fields accepted by `update_metadata`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetadataUpdate {
    pub title: Option<String>,
    pub tags: Option<Vec<String>>,
    pub notes: Option<String>,
    pub collections: Option<Vec<String>>,
}
