//! Orphan reclamation: delete bucket objects no record references.
//!
//! Membership is decided on stable object paths. A record that stored a signed
//! or public URL instead of a path still protects its object, because the URL is
//! mapped back to a path before comparison.

use anyhow::{Context, Result};
use serde::Serialize;
use std::collections::HashSet;
use tracing::info;

use crate::memorial::types::Memorial;
use crate::storage::Bucket;

// ── Result types ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
pub struct ReclaimReport {
    /// Objects found in the bucket.
    pub scanned: usize,
    /// Distinct paths referenced by records.
    pub referenced: usize,
    pub orphaned: Vec<String>,
    pub deleted: Vec<String>,
    pub dry_run: bool,
}

impl ReclaimReport {
    pub fn message(&self) -> String {
        if self.orphaned.is_empty() {
            "No orphaned images to delete.".to_string()
        } else if self.dry_run {
            format!("Found {} orphaned images (dry run).", self.orphaned.len())
        } else {
            format!("Successfully deleted {} orphaned images.", self.orphaned.len())
        }
    }
}

// ── Reference collection ─────────────────────────────────────────────────────

/// Every bucket path referenced by `memorials`, through images or the primary image.
pub fn referenced_paths(bucket: &dyn Bucket, memorials: &[Memorial]) -> HashSet<String> {
    let urls = bucket.urls();
    let mut paths = HashSet::new();
    for memorial in memorials {
        for image in &memorial.images {
            if let Some(path) = &image.path {
                paths.insert(path.clone());
            }
            if let Some(path) = urls.path_from_url(&image.url) {
                paths.insert(path);
            }
        }
        if let Some(path) = &memorial.primary_image_path {
            paths.insert(path.clone());
        }
        if let Some(path) = memorial
            .primary_image_url
            .as_deref()
            .and_then(|url| urls.path_from_url(url))
        {
            paths.insert(path);
        }
    }
    paths
}

// ── Sweep ────────────────────────────────────────────────────────────────────

/// Remove every object in `bucket` that `memorials` do not reference.
///
/// All orphans go in a single `remove` call; with no orphans nothing is removed.
/// A dry run lists orphans and leaves the bucket untouched.
pub async fn reclaim_orphans(
    bucket: &dyn Bucket,
    memorials: &[Memorial],
    dry_run: bool,
) -> Result<ReclaimReport> {
    let referenced = referenced_paths(bucket, memorials);
    let objects = bucket.list().await.context("failed to list bucket objects")?;

    let orphaned: Vec<String> = objects
        .iter()
        .filter(|obj| !referenced.contains(&obj.path))
        .map(|obj| obj.path.clone())
        .collect();

    let deleted = if orphaned.is_empty() || dry_run {
        Vec::new()
    } else {
        bucket
            .remove(&orphaned)
            .await
            .context("failed to remove orphaned images")?
    };

    info!(
        scanned = objects.len(),
        referenced = referenced.len(),
        orphaned = orphaned.len(),
        deleted = deleted.len(),
        dry_run,
        "orphan sweep complete"
    );

    Ok(ReclaimReport {
        scanned: objects.len(),
        referenced: referenced.len(),
        orphaned,
        deleted,
        dry_run,
    })
}
