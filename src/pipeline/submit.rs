//! Turn a user's submission into a storable draft.
//!
//! Selected images may be owned (already in the bucket, in public or signed
//! form) or external search candidates. Owned images are normalized to their
//! stable path and public URL; external ones are persisted first. The caller
//! saves the returned draft.

use std::collections::{HashMap, HashSet};

use crate::memorial::types::{ImageReference, MemorialDraft};
use crate::storage::{validate_path, Bucket};

use super::persist::persist_with_origins;

/// One selected image after classification.
enum Selected {
    Owned(ImageReference),
    External(String),
}

/// Normalize images and resolve the primary image of `draft`.
pub async fn prepare_submission(
    http: &reqwest::Client,
    bucket: &dyn Bucket,
    mut draft: MemorialDraft,
) -> MemorialDraft {
    let mut selected = Vec::with_capacity(draft.images.len());
    let mut external = Vec::new();
    for image in &draft.images {
        match owned_path(bucket, image.path.as_deref(), &image.url) {
            Some(path) => selected.push(Selected::Owned(ImageReference::owned(
                path.clone(),
                bucket.public_url(&path),
                image.title.clone(),
            ))),
            None => {
                selected.push(Selected::External(image.url.clone()));
                external.push(image.clone());
            }
        }
    }

    let persisted: HashMap<String, ImageReference> = persist_with_origins(http, bucket, &external)
        .await
        .into_iter()
        .map(|p| (p.source_url, p.image))
        .collect();

    let mut seen = HashSet::new();
    let mut images = Vec::with_capacity(selected.len());
    for item in &selected {
        let image = match item {
            Selected::Owned(image) => Some(image.clone()),
            Selected::External(url) => persisted.get(url).cloned(),
        };
        let Some(image) = image else { continue };
        if let Some(path) = &image.path {
            if !seen.insert(path.clone()) {
                continue;
            }
        }
        images.push(image);
    }

    let selected_external: HashSet<&str> = external.iter().map(|i| i.url.as_str()).collect();
    let primary = match draft.primary_image_url.as_deref() {
        None => None,
        Some(url) => match owned_path(bucket, draft.primary_image_path.as_deref(), url) {
            Some(path) => Some((bucket.public_url(&path), Some(path))),
            None => match persisted.get(url) {
                Some(image) => Some((image.url.clone(), image.path.clone())),
                None if selected_external.contains(url) => {
                    tracing::debug!(url = %url, "primary image was not persisted, falling back");
                    None
                }
                None => Some((url.to_string(), None)),
            },
        },
    };
    let (primary_url, primary_path) = match primary {
        Some((url, path)) => (Some(url), path),
        None => match images.first() {
            Some(first) => (Some(first.url.clone()), first.path.clone()),
            None => (None, None),
        },
    };

    tracing::debug!(
        selected = selected.len(),
        persisted = persisted.len(),
        kept = images.len(),
        "submission images resolved"
    );

    draft.images = images;
    draft.primary_image_url = primary_url;
    draft.primary_image_path = primary_path;
    draft
}

/// Bucket path of an owned image, from its explicit path or its URL.
fn owned_path(bucket: &dyn Bucket, path: Option<&str>, url: &str) -> Option<String> {
    path.filter(|p| validate_path(p).is_ok())
        .map(str::to_string)
        .or_else(|| bucket.urls().path_from_url(url))
}
