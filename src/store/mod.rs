//! Durable capture store.
//!
//! Layout: `captures/<id>/` holds `index.html`, `metadata.json` and the
//! resource buckets; `captures/index.json` mirrors summaries for listing.
//! Index mutations run under a process-wide lock and `metadata.json` is
//! always written before the index entry, so a reader that sees an index
//! entry will find the metadata file.

pub mod types;

use anyhow::{Context, Result};
use log::{debug, warn};
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;

use crate::downloader::ResourceDescriptor;

pub use types::{
    CaptureIndex, CaptureListPage, CaptureMetadata, CaptureMode, CaptureStats, CaptureSummary,
    ListQuery, MetadataUpdate, SortKey, SortOrder,
};

/// Input for [`CaptureStore::save_capture`].
pub struct NewCapture<'a> {
    pub url: &'a str,
    pub title: &'a str,
    /// Rewritten HTML for the seed page.
    pub html: &'a str,
    /// Downloaded resources; each is copied into its bucket.
    pub resources: &'a [ResourceDescriptor],
    pub mode: CaptureMode,
    /// Page-derived resource counts. `total_size` is recomputed from the
    /// directory after the copy.
    pub stats: CaptureStats,
    /// Additional rewritten pages of a multi-page capture, saved under
    /// `pages/<name>`.
    pub subpages: &'a [(String, String)],
    pub error: Option<String>,
}

/// Handle of a persisted capture.
#[derive(Debug, Clone)]
pub struct SavedCapture {
    pub id: String,
    pub path: PathBuf,
    pub stats: CaptureStats,
}

/// The capture catalog rooted at `captures/`.
pub struct CaptureStore {
    base_dir: PathBuf,
    index_lock: Mutex<()>,
}

impl CaptureStore {
    #[must_use]
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
            index_lock: Mutex::new(()),
        }
    }

    #[must_use]
    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    fn index_path(&self) -> PathBuf {
        self.base_dir.join("index.json")
    }

    fn capture_dir(&self, id: &str) -> PathBuf {
        self.base_dir.join(id)
    }

    /// Create `captures/` and an empty index when missing, and prune index
    /// entries whose directory vanished.
    pub async fn initialize(&self) -> Result<()> {
        tokio::fs::create_dir_all(&self.base_dir)
            .await
            .with_context(|| format!("failed to create {}", self.base_dir.display()))?;

        let _guard = self.index_lock.lock().await;
        let mut index = self.read_index().await;
        let before = index.captures.len();
        let mut kept = Vec::with_capacity(before);
        for summary in index.captures {
            if tokio::fs::try_exists(self.capture_dir(&summary.id))
                .await
                .unwrap_or(false)
            {
                kept.push(summary);
            } else {
                warn!("Pruning orphaned index entry {}", summary.id);
            }
        }
        index.captures = kept;
        // Always rewrite: this also materializes a missing/corrupt index.
        self.write_index(&index).await?;
        if index.captures.len() != before {
            debug!("Index pruned: {} -> {}", before, index.captures.len());
        }
        Ok(())
    }

    /// Read the index, recreating an empty shell for absent/corrupt files.
    async fn read_index(&self) -> CaptureIndex {
        match tokio::fs::read(self.index_path()).await {
            Ok(bytes) => match serde_json::from_slice(&bytes) {
                Ok(index) => index,
                Err(e) => {
                    warn!("Corrupt index.json, recreating empty shell: {e}");
                    CaptureIndex::default()
                }
            },
            Err(_) => CaptureIndex::default(),
        }
    }

    async fn write_index(&self, index: &CaptureIndex) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(index).context("failed to serialize index")?;
        tokio::fs::write(self.index_path(), bytes)
            .await
            .context("failed to write index.json")?;
        Ok(())
    }

    /// Persist a capture: directory tree, resources, metadata, then the
    /// index entry (in that order). On any failure the directory is
    /// removed so no orphan survives.
    pub async fn save_capture(&self, new: NewCapture<'_>) -> Result<SavedCapture> {
        let id = uuid::Uuid::new_v4().to_string();
        let dir = self.capture_dir(&id);

        let result = self.save_capture_inner(&id, &dir, &new).await;
        match result {
            Ok(saved) => Ok(saved),
            Err(e) => {
                if let Err(cleanup) = tokio::fs::remove_dir_all(&dir).await {
                    debug!("Cleanup of failed capture {id} also failed: {cleanup}");
                }
                Err(e)
            }
        }
    }

    async fn save_capture_inner(
        &self,
        id: &str,
        dir: &Path,
        new: &NewCapture<'_>,
    ) -> Result<SavedCapture> {
        tokio::fs::create_dir_all(dir)
            .await
            .with_context(|| format!("failed to create {}", dir.display()))?;
        for bucket in ["images", "css", "js", "fonts"] {
            tokio::fs::create_dir_all(dir.join(bucket))
                .await
                .with_context(|| format!("failed to create bucket {bucket}"))?;
        }

        tokio::fs::write(dir.join("index.html"), new.html)
            .await
            .context("failed to write index.html")?;

        if !new.subpages.is_empty() {
            let pages_dir = dir.join("pages");
            tokio::fs::create_dir_all(&pages_dir)
                .await
                .context("failed to create pages/")?;
            for (name, html) in new.subpages {
                tokio::fs::write(pages_dir.join(name), html)
                    .await
                    .with_context(|| format!("failed to write pages/{name}"))?;
            }
        }

        for resource in new.resources {
            let target = dir.join(resource.archive_path());
            if let Some(parent) = target.parent() {
                // Covers optional buckets (pdfs/) the fixed set above omits.
                tokio::fs::create_dir_all(parent).await?;
            }
            tokio::fs::copy(&resource.local_path, &target)
                .await
                .with_context(|| {
                    format!(
                        "failed to copy {} into {}",
                        resource.local_path.display(),
                        target.display()
                    )
                })?;
        }

        let mut stats = new.stats;
        stats.total_pages = stats.total_pages.max(1);
        stats.total_size = directory_size(dir).await?;

        let metadata = CaptureMetadata {
            id: id.to_string(),
            url: new.url.to_string(),
            title: new.title.to_string(),
            captured_at: chrono::Utc::now(),
            capture_mode: new.mode,
            stats,
            tags: Vec::new(),
            notes: String::new(),
            collections: Vec::new(),
            status: if new.error.is_some() {
                "partial".to_string()
            } else {
                "complete".to_string()
            },
            error: new.error.clone(),
        };
        self.write_metadata(dir, &metadata).await?;

        // Index last: once the entry is visible, the metadata exists.
        {
            let _guard = self.index_lock.lock().await;
            let mut index = self.read_index().await;
            index.captures.push(CaptureSummary::from_metadata(&metadata));
            merge_collections(&mut index, &metadata.collections);
            self.write_index(&index).await?;
        }

        Ok(SavedCapture {
            id: id.to_string(),
            path: dir.to_path_buf(),
            stats,
        })
    }

    async fn write_metadata(&self, dir: &Path, metadata: &CaptureMetadata) -> Result<()> {
        let bytes =
            serde_json::to_vec_pretty(metadata).context("failed to serialize metadata")?;
        tokio::fs::write(dir.join("metadata.json"), bytes)
            .await
            .context("failed to write metadata.json")?;
        Ok(())
    }

    async fn read_metadata(&self, id: &str) -> Result<CaptureMetadata> {
        let path = self.capture_dir(id).join("metadata.json");
        let bytes = tokio::fs::read(&path)
            .await
            .with_context(|| format!("capture {id} not found"))?;
        serde_json::from_slice(&bytes)
            .with_context(|| format!("corrupt metadata for capture {id}"))
    }

    /// List captures with filtering, sorting and pagination.
    pub async fn list_captures(&self, query: &ListQuery) -> Result<CaptureListPage> {
        let index = {
            let _guard = self.index_lock.lock().await;
            self.read_index().await
        };

        let mut matches = Vec::new();
        for summary in index.captures {
            if let Some(tag) = &query.tag
                && !summary.tags.iter().any(|t| t == tag)
            {
                continue;
            }
            if let Some(collection) = &query.collection
                && !summary.collections.iter().any(|c| c == collection)
            {
                continue;
            }
            if let Some(search) = &query.search {
                let needle = search.to_lowercase();
                let mut haystack =
                    format!("{} {}", summary.title.to_lowercase(), summary.url.to_lowercase());
                // Notes live only in metadata.json; load lazily.
                if let Ok(meta) = self.read_metadata(&summary.id).await {
                    haystack.push(' ');
                    haystack.push_str(&meta.notes.to_lowercase());
                }
                if !haystack.contains(&needle) {
                    continue;
                }
            }
            matches.push(summary);
        }

        match query.sort {
            SortKey::Date => matches.sort_by_key(|s| s.captured_at),
            SortKey::Title => matches.sort_by(|a, b| {
                a.title.to_lowercase().cmp(&b.title.to_lowercase())
            }),
            SortKey::Size => matches.sort_by_key(|s| s.size),
        }
        if query.order == SortOrder::Desc {
            matches.reverse();
        }

        let total = matches.len();
        let offset = query.offset.min(total);
        let limit = query.limit.unwrap_or(total);
        let end = offset.saturating_add(limit).min(total);
        let page = matches[offset..end].to_vec();
        let has_more = end < total;

        Ok(CaptureListPage {
            total,
            captures: page,
            has_more,
        })
    }

    /// Metadata plus directory path for one capture.
    pub async fn get_capture(&self, id: &str) -> Result<(CaptureMetadata, PathBuf)> {
        let metadata = self.read_metadata(id).await?;
        Ok((metadata, self.capture_dir(id)))
    }

    /// Raw bytes of the capture's `index.html`.
    pub async fn get_capture_html(&self, id: &str) -> Result<Vec<u8>> {
        let path = self.capture_dir(id).join("index.html");
        tokio::fs::read(&path)
            .await
            .with_context(|| format!("capture {id} has no index.html"))
    }

    /// Remove a capture: the index entry first, then the directory.
    pub async fn delete_capture(&self, id: &str) -> Result<()> {
        {
            let _guard = self.index_lock.lock().await;
            let mut index = self.read_index().await;
            let before = index.captures.len();
            index.captures.retain(|s| s.id != id);
            if index.captures.len() == before {
                anyhow::bail!("capture {id} not found");
            }
            self.write_index(&index).await?;
        }
        tokio::fs::remove_dir_all(self.capture_dir(id))
            .await
            .with_context(|| format!("failed to remove capture {id}"))?;
        Ok(())
    }

    /// Update the mutable metadata fields and mirror them into the index.
    /// Both files are rewritten together under the index lock.
    pub async fn update_metadata(
        &self,
        id: &str,
        updates: &MetadataUpdate,
    ) -> Result<CaptureMetadata> {
        let _guard = self.index_lock.lock().await;

        let mut metadata = self.read_metadata(id).await?;
        if let Some(title) = &updates.title {
            metadata.title = title.clone();
        }
        if let Some(tags) = &updates.tags {
            metadata.tags = tags.clone();
        }
        if let Some(notes) = &updates.notes {
            metadata.notes = notes.clone();
        }
        if let Some(collections) = &updates.collections {
            metadata.collections = collections.clone();
        }

        self.write_metadata(&self.capture_dir(id), &metadata).await?;

        let mut index = self.read_index().await;
        if let Some(summary) = index.captures.iter_mut().find(|s| s.id == id) {
            *summary = CaptureSummary::from_metadata(&metadata);
        }
        merge_collections(&mut index, &metadata.collections);
        self.write_index(&index).await?;

        Ok(metadata)
    }
}

/// Union new collection names into the index list, preserving order.
fn merge_collections(index: &mut CaptureIndex, collections: &[String]) {
    for collection in collections {
        if !index.collections.contains(collection) {
            index.collections.push(collection.clone());
        }
    }
}

/// Recursive directory size without recursion (async fns cannot self-call
/// cheaply); a work stack walks the tree.
pub async fn directory_size(dir: &Path) -> Result<u64> {
    let mut total = 0u64;
    let mut stack = vec![dir.to_path_buf()];
    while let Some(current) = stack.pop() {
        let mut entries = tokio::fs::read_dir(&current)
            .await
            .with_context(|| format!("failed to read {}", current.display()))?;
        while let Some(entry) = entries.next_entry().await? {
            let file_type = entry.file_type().await?;
            if file_type.is_dir() {
                stack.push(entry.path());
            } else if file_type.is_file() {
                total += entry.metadata().await?.len();
            }
        }
    }
    Ok(total)
}
