//! Copy externally hosted images into the owned bucket.
//!
//! Every input is fetched and uploaded concurrently. An image that fails to fetch
//! or upload is logged and left out of the result; it never fails the batch.

use futures::future::join_all;
use tracing::{debug, warn};

use crate::memorial::types::ImageReference;
use crate::storage::Bucket;

/// Extension used when the response does not declare a usable content type.
const DEFAULT_EXTENSION: &str = "jpg";

/// An owned image together with the external URL it was copied from.
#[derive(Debug, Clone)]
pub struct PersistedImage {
    pub source_url: String,
    pub image: ImageReference,
}

/// Persist `images` and return the owned references of those that succeeded.
pub async fn persist_external_images(
    http: &reqwest::Client,
    bucket: &dyn Bucket,
    images: &[ImageReference],
) -> Vec<ImageReference> {
    persist_with_origins(http, bucket, images)
        .await
        .into_iter()
        .map(|p| p.image)
        .collect()
}

/// Like [`persist_external_images`], keeping the source URL of each result.
pub async fn persist_with_origins(
    http: &reqwest::Client,
    bucket: &dyn Bucket,
    images: &[ImageReference],
) -> Vec<PersistedImage> {
    if images.is_empty() {
        return Vec::new();
    }

    let results = join_all(images.iter().map(|image| persist_one(http, bucket, image))).await;
    let persisted: Vec<PersistedImage> = results.into_iter().flatten().collect();

    debug!(
        requested = images.len(),
        persisted = persisted.len(),
        "external images persisted"
    );
    persisted
}

async fn persist_one(
    http: &reqwest::Client,
    bucket: &dyn Bucket,
    image: &ImageReference,
) -> Option<PersistedImage> {
    let response = match http.get(&image.url).send().await {
        Ok(response) => response,
        Err(e) => {
            warn!(url = %image.url, error = %e, "failed to fetch image");
            return None;
        }
    };
    if !response.status().is_success() {
        warn!(url = %image.url, status = %response.status(), "failed to fetch image");
        return None;
    }

    let content_type = response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let bytes = match response.bytes().await {
        Ok(bytes) => bytes,
        Err(e) => {
            warn!(url = %image.url, error = %e, "failed to read image body");
            return None;
        }
    };

    let file_name = format!(
        "{}.{}",
        uuid::Uuid::new_v4(),
        extension_for(content_type.as_deref())
    );
    let path = match bucket
        .upload(&file_name, &bytes, content_type.as_deref(), true)
        .await
    {
        Ok(path) => path,
        Err(e) => {
            warn!(url = %image.url, error = %e, "failed to upload image");
            return None;
        }
    };

    Some(PersistedImage {
        source_url: image.url.clone(),
        image: ImageReference::owned(path.clone(), bucket.public_url(&path), image.title.clone()),
    })
}

/// File extension for a declared content type: the media subtype with
/// parameters and any structured-syntax suffix removed.
pub fn extension_for(content_type: Option<&str>) -> String {
    let subtype = content_type
        .and_then(|ct| ct.split(';').next())
        .and_then(|mime| mime.trim().split_once('/'))
        .map(|(_, sub)| sub.split('+').next().unwrap_or(sub).trim().to_ascii_lowercase())
        .unwrap_or_default();

    if subtype.is_empty() || !subtype.chars().all(|c| c.is_ascii_alphanumeric() || c == '-') {
        DEFAULT_EXTENSION.to_string()
    } else {
        subtype
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extension_from_content_type() {
        assert_eq!(extension_for(Some("image/png")), "png");
        assert_eq!(extension_for(Some("image/jpeg; charset=binary")), "jpeg");
        assert_eq!(extension_for(Some("image/svg+xml")), "svg");
        assert_eq!(extension_for(Some("IMAGE/WEBP")), "webp");
    }

    #[test]
    fn extension_defaults_to_jpg() {
        assert_eq!(extension_for(None), "jpg");
        assert_eq!(extension_for(Some("")), "jpg");
        assert_eq!(extension_for(Some("garbage")), "jpg");
        assert_eq!(extension_for(Some("image/")), "jpg");
        assert_eq!(extension_for(Some("image/../../etc")), "jpg");
        assert_eq!(extension_for(Some("image/..")), "jpg");
    }
}
