//! Direct user uploads into the bucket.

use anyhow::{bail, Context, Result};

use crate::memorial::types::ImageReference;
use crate::storage::{content_type_for, Bucket};

/// Store a user-supplied file at `{user_id}/{unix_millis}_{file_name}`.
///
/// Never overwrites: a colliding path is an error.
pub async fn store_upload(
    bucket: &dyn Bucket,
    user_id: &str,
    file_name: &str,
    title: Option<&str>,
    bytes: &[u8],
) -> Result<ImageReference> {
    let user = sanitize_segment(user_id);
    let name = sanitize_segment(file_name);
    if user.is_empty() {
        bail!("user_id is required");
    }
    if name.is_empty() {
        bail!("file_name is required");
    }
    if bytes.is_empty() {
        bail!("upload body is empty");
    }

    let millis = chrono::Utc::now().timestamp_millis();
    let path = format!("{user}/{millis}_{name}");
    let stored = bucket
        .upload(&path, bytes, Some(content_type_for(&name)), false)
        .await
        .with_context(|| format!("failed to store upload {path}"))?;

    tracing::info!(path = %stored, size = bytes.len(), "upload stored");
    let title = title
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .unwrap_or(file_name)
        .to_string();
    Ok(ImageReference::owned(stored.clone(), bucket.public_url(&stored), title))
}

/// Keep a name usable as one path segment: letters, digits, `.`, `-`, `_`;
/// anything else becomes `_`. Leading dots are stripped.
pub fn sanitize_segment(name: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or(name).trim();
    let cleaned: String = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();
    cleaned.trim_start_matches('.').to_string()
}
