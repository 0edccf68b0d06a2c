//! Batch archive export.
//!
//! Bundles every completed member of a batch into one ZIP: each capture
//! directory goes under `<hostname>-<jobPrefix>/` and a top-level
//! `manifest.json` carries the batch summary. Zip writing is synchronous,
//! so it runs on the blocking pool.

use anyhow::{Context, Result};
use log::info;
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::jobs::{BatchJob, JobStatus, JobTracker};
use crate::store::CaptureStore;
use crate::utils::extract_domain;

/// Write the batch archive into `dest_dir`, returning the ZIP path.
pub async fn export_batch_archive(
    store: &CaptureStore,
    jobs: &JobTracker,
    batch: &BatchJob,
    dest_dir: &Path,
) -> Result<PathBuf> {
    tokio::fs::create_dir_all(dest_dir)
        .await
        .with_context(|| format!("failed to create {}", dest_dir.display()))?;

    // Resolve each completed member to its capture directory.
    let mut entries: Vec<(String, PathBuf)> = Vec::new();
    for member in &batch.jobs {
        if member.status != JobStatus::Completed {
            continue;
        }
        let Some(job) = jobs.get_job(&member.job_id).await else {
            continue;
        };
        let Some(capture_id) = job.capture_id else {
            continue;
        };
        let (_, dir) = store.get_capture(&capture_id).await?;
        let hostname = extract_domain(&member.url).unwrap_or_else(|| "capture".to_string());
        let prefix = format!("{hostname}-{}", &member.job_id[..8.min(member.job_id.len())]);
        entries.push((prefix, dir));
    }

    let summary = batch.summary();
    let manifest = serde_json::json!({
        "batchId": batch.batch_id,
        "status": batch.status(),
        "progress": batch.progress(),
        "summary": summary,
        "jobs": batch.jobs,
        "exportedAt": chrono::Utc::now(),
    });
    let manifest =
        serde_json::to_string_pretty(&manifest).context("failed to serialize manifest")?;

    let zip_path = dest_dir.join(format!(
        "batch-{}.zip",
        &batch.batch_id[..8.min(batch.batch_id.len())]
    ));
    let path = zip_path.clone();
    let written = tokio::task::spawn_blocking(move || write_zip(path, &manifest, &entries))
        .await
        .context("zip task panicked")??;

    info!("Batch archive written: {}", written.display());
    Ok(written)
}

fn write_zip(path: PathBuf, manifest: &str, entries: &[(String, PathBuf)]) -> Result<PathBuf> {
    let file = std::fs::File::create(&path)
        .with_context(|| format!("failed to create {}", path.display()))?;
    let mut writer = zip::ZipWriter::new(file);
    let options = zip::write::SimpleFileOptions::default()
        .compression_method(zip::CompressionMethod::Deflated);

    writer
        .start_file("manifest.json", options)
        .context("failed to start manifest entry")?;
    writer
        .write_all(manifest.as_bytes())
        .context("failed to write manifest entry")?;

    for (prefix, dir) in entries {
        add_directory(&mut writer, dir, prefix, options)?;
    }

    writer.finish().context("failed to finish archive")?;
    Ok(path)
}

fn add_directory(
    writer: &mut zip::ZipWriter<std::fs::File>,
    root: &Path,
    prefix: &str,
    options: zip::write::SimpleFileOptions,
) -> Result<()> {
    let mut stack = vec![root.to_path_buf()];
    while let Some(current) = stack.pop() {
        for entry in std::fs::read_dir(&current)
            .with_context(|| format!("failed to read {}", current.display()))?
        {
            let entry = entry?;
            let path = entry.path();
            if entry.file_type()?.is_dir() {
                stack.push(path);
                continue;
            }
            let relative = path
                .strip_prefix(root)
                .context("entry escaped the capture root")?;
            let name = format!("{prefix}/{}", relative.to_string_lossy().replace('\\', "/"));
            writer
                .start_file(name, options)
                .context("failed to start archive entry")?;
            let mut source = std::fs::File::open(&path)
                .with_context(|| format!("failed to open {}", path.display()))?;
            std::io::copy(&mut source, writer).context("failed to copy archive entry")?;
        }
    }
    Ok(())
}
