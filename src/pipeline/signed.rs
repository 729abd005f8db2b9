//! Replace owned image URLs with time-limited signed URLs for display.
//!
//! Resolution never fails as a whole: an image whose path cannot be derived, or
//! whose object cannot be signed, keeps the URL it came with.

use std::collections::HashMap;
use std::time::Duration;

use crate::memorial::types::{ImageReference, Memorial};
use crate::storage::Bucket;

/// Stable bucket path of an image: its `path` field, or one derived from its URL.
pub fn image_path(bucket: &dyn Bucket, image: &ImageReference) -> Option<String> {
    image
        .path
        .clone()
        .or_else(|| bucket.urls().path_from_url(&image.url))
}

/// Images with display URLs swapped for signed ones. `path` is filled in where it
/// could be derived.
pub async fn resolve_images(
    bucket: &dyn Bucket,
    images: &[ImageReference],
    ttl: Duration,
) -> Vec<ImageReference> {
    let paths: Vec<Option<String>> = images.iter().map(|img| image_path(bucket, img)).collect();
    let wanted: Vec<String> = paths.iter().flatten().cloned().collect();
    if wanted.is_empty() {
        return images.to_vec();
    }

    let signed: HashMap<String, String> = bucket
        .create_signed_urls(&wanted, ttl)
        .await
        .into_iter()
        .filter_map(|s| match s.signed_url {
            Some(url) => Some((s.path, url)),
            None => {
                tracing::debug!(path = %s.path, error = ?s.error, "signing failed, keeping original url");
                None
            }
        })
        .collect();

    images
        .iter()
        .zip(paths)
        .map(|(img, path)| {
            let url = path
                .as_ref()
                .and_then(|p| signed.get(p).cloned())
                .unwrap_or_else(|| img.url.clone());
            ImageReference {
                url,
                title: img.title.clone(),
                path: path.or_else(|| img.path.clone()),
            }
        })
        .collect()
}

/// A record prepared for display: images and the primary image carry signed URLs.
pub async fn resolve_memorial(bucket: &dyn Bucket, mut memorial: Memorial, ttl: Duration) -> Memorial {
    memorial.images = resolve_images(bucket, &memorial.images, ttl).await;

    if let Some(primary) = memorial.primary_image_url.clone() {
        let path = memorial
            .primary_image_path
            .clone()
            .or_else(|| bucket.urls().path_from_url(&primary));
        if let Some(path) = path {
            match bucket.create_signed_url(&path, ttl).await {
                Ok(url) => memorial.primary_image_url = Some(url),
                Err(e) => tracing::debug!(path = %path, error = %e, "primary image not signed"),
            }
        }
    }
    memorial
}
