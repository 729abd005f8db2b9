//! Object storage for memorial images.
//!
//! Provides the [`Bucket`] trait, a filesystem implementation in [`local`], and
//! [`BucketUrls`], which owns the public/signed URL scheme for a bucket:
//!
//! - public: `{base}/storage/v1/object/public/{bucket}/{path}`
//! - signed: `{base}/storage/v1/object/sign/{bucket}/{path}?expires={unix}&token={hex}`
//!
//! Object paths are the stable identifiers. URLs are derived from them and are
//! only parsed back into paths by [`BucketUrls::path_from_url`].

pub mod local;

use async_trait::async_trait;
use hmac::{Hmac, Mac};
use rand::RngCore;
use reqwest::Url;
use sha2::Sha256;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

type HmacSha256 = Hmac<Sha256>;

const PUBLIC_SEGMENT: &str = "public";
const SIGN_SEGMENT: &str = "sign";

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("invalid object path: {0:?}")]
    InvalidPath(String),
    #[error("object not found: {0}")]
    NotFound(String),
    #[error("object already exists: {0}")]
    AlreadyExists(String),
    #[error("invalid signature for {0}")]
    InvalidSignature(String),
    #[error("signed URL for {0} has expired")]
    Expired(String),
    #[error("invalid URL: {0}")]
    Url(String),
    #[error("storage I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// A file in the bucket.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct StoredObject {
    pub path: String,
    pub size: u64,
}

/// Outcome of signing one path in a batch.
#[derive(Debug, Clone, serde::Serialize)]
pub struct SignedUrl {
    pub path: String,
    pub signed_url: Option<String>,
    pub error: Option<String>,
}

/// Storage bucket operations.
#[async_trait]
pub trait Bucket: Send + Sync {
    /// URL scheme for this bucket.
    fn urls(&self) -> &BucketUrls;

    /// Write `bytes` at `path`. Without `upsert`, an existing object is an error.
    /// Returns the stored path.
    async fn upload(
        &self,
        path: &str,
        bytes: &[u8],
        content_type: Option<&str>,
        upsert: bool,
    ) -> Result<String, StorageError>;

    /// Every object in the bucket, recursively, sorted by path.
    async fn list(&self) -> Result<Vec<StoredObject>, StorageError>;

    async fn read(&self, path: &str) -> Result<Vec<u8>, StorageError>;

    async fn exists(&self, path: &str) -> Result<bool, StorageError>;

    /// Remove objects in one batch. Missing paths are skipped. Returns the removed paths.
    async fn remove(&self, paths: &[String]) -> Result<Vec<String>, StorageError>;

    fn public_url(&self, path: &str) -> String {
        self.urls().public_url(path)
    }

    /// Sign an existing object for `ttl`.
    async fn create_signed_url(&self, path: &str, ttl: Duration) -> Result<String, StorageError> {
        if !self.exists(path).await? {
            return Err(StorageError::NotFound(path.to_string()));
        }
        self.urls().signed_url(path, ttl)
    }

    /// Sign a batch of paths. Each path succeeds or fails on its own.
    async fn create_signed_urls(&self, paths: &[String], ttl: Duration) -> Vec<SignedUrl> {
        let mut out = Vec::with_capacity(paths.len());
        for path in paths {
            let (signed_url, error) = match self.create_signed_url(path, ttl).await {
                Ok(url) => (Some(url), None),
                Err(e) => (None, Some(e.to_string())),
            };
            out.push(SignedUrl {
                path: path.clone(),
                signed_url,
                error,
            });
        }
        out
    }
}

/// Reject empty, absolute, and parent-escaping paths.
pub fn validate_path(path: &str) -> Result<(), StorageError> {
    let bad = path.is_empty()
        || path.starts_with('/')
        || path.contains('\\')
        || path
            .split('/')
            .any(|seg| seg.is_empty() || seg == "." || seg == ".." || seg.starts_with('.'));
    if bad {
        return Err(StorageError::InvalidPath(path.to_string()));
    }
    Ok(())
}

/// Public and signed URL construction for one bucket.
#[derive(Clone)]
pub struct BucketUrls {
    base: Url,
    bucket: String,
    secret: Vec<u8>,
}

impl std::fmt::Debug for BucketUrls {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BucketUrls")
            .field("base", &self.base.as_str())
            .field("bucket", &self.bucket)
            .finish_non_exhaustive()
    }
}

impl BucketUrls {
    /// `secret` empty means a random key for this process; signed URLs will not
    /// survive a restart.
    pub fn new(base_url: &str, bucket: &str, secret: &str) -> Result<Self, StorageError> {
        let base = Url::parse(base_url).map_err(|e| StorageError::Url(format!("{base_url}: {e}")))?;
        if base.cannot_be_a_base() {
            return Err(StorageError::Url(format!("{base_url}: not a base URL")));
        }
        let secret = if secret.is_empty() {
            tracing::warn!("no signing secret configured, using a random per-process key");
            let mut key = vec![0u8; 32];
            rand::thread_rng().fill_bytes(&mut key);
            key
        } else {
            secret.as_bytes().to_vec()
        };
        Ok(Self {
            base,
            bucket: bucket.to_string(),
            secret,
        })
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    fn object_url(&self, kind: &str, path: &str) -> Url {
        let mut url = self.base.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments
                .pop_if_empty()
                .extend(["storage", "v1", "object", kind, self.bucket.as_str()])
                .extend(path.split('/'));
        }
        url
    }

    pub fn public_url(&self, path: &str) -> String {
        self.object_url(PUBLIC_SEGMENT, path).to_string()
    }

    /// Signed URL valid for `ttl` from now.
    pub fn signed_url(&self, path: &str, ttl: Duration) -> Result<String, StorageError> {
        let expires = unix_now() + ttl.as_secs();
        let token = self.token(path, expires)?;
        let mut url = self.object_url(SIGN_SEGMENT, path);
        url.query_pairs_mut()
            .append_pair("expires", &expires.to_string())
            .append_pair("token", &token);
        Ok(url.to_string())
    }

    /// Check a token presented for `path`.
    pub fn verify(&self, path: &str, expires: u64, token: &str) -> Result<(), StorageError> {
        let presented =
            hex::decode(token).map_err(|_| StorageError::InvalidSignature(path.to_string()))?;
        self.mac(path, expires)?
            .verify_slice(&presented)
            .map_err(|_| StorageError::InvalidSignature(path.to_string()))?;
        if expires < unix_now() {
            return Err(StorageError::Expired(path.to_string()));
        }
        Ok(())
    }

    /// Object path addressed by `url`, if it is a public or signed URL of this
    /// bucket. Query strings are ignored, so a signed URL maps to the same path
    /// as the public one.
    pub fn path_from_url(&self, url: &str) -> Option<String> {
        let parsed = Url::parse(url).ok()?;
        if parsed.scheme() != self.base.scheme()
            || parsed.host_str() != self.base.host_str()
            || parsed.port_or_known_default() != self.base.port_or_known_default()
        {
            return None;
        }
        let base_segments: Vec<&str> = self
            .base
            .path_segments()
            .map(|s| s.filter(|seg| !seg.is_empty()).collect())
            .unwrap_or_default();
        let mut segments = parsed.path_segments()?.skip(base_segments.len());
        let prefix: Vec<&str> = segments.by_ref().take(5).collect();
        let [storage, v1, object, kind, bucket] = prefix.as_slice() else {
            return None;
        };
        if *storage != "storage"
            || *v1 != "v1"
            || *object != "object"
            || !(*kind == PUBLIC_SEGMENT || *kind == SIGN_SEGMENT)
            || *bucket != self.bucket
        {
            return None;
        }
        let decoded: Vec<String> = segments
            .map(|seg| urlencoding::decode(seg).ok().map(|s| s.into_owned()))
            .collect::<Option<_>>()?;
        let path = decoded.join("/");
        validate_path(&path).ok()?;
        Some(path)
    }

    fn mac(&self, path: &str, expires: u64) -> Result<HmacSha256, StorageError> {
        let mut mac = HmacSha256::new_from_slice(&self.secret)
            .map_err(|e| StorageError::Url(format!("signing key rejected: {e}")))?;
        mac.update(format!("{}/{}\n{}", self.bucket, path, expires).as_bytes());
        Ok(mac)
    }

    fn token(&self, path: &str, expires: u64) -> Result<String, StorageError> {
        Ok(hex::encode(self.mac(path, expires)?.finalize().into_bytes()))
    }
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Best-effort content type from a file extension.
pub fn content_type_for(path: &str) -> &'static str {
    let ext = path.rsplit_once('.').map(|(_, e)| e.to_ascii_lowercase());
    match ext.as_deref() {
        Some("jpg" | "jpeg") => "image/jpeg",
        Some("png") => "image/png",
        Some("gif") => "image/gif",
        Some("webp") => "image/webp",
        Some("avif") => "image/avif",
        Some("svg") => "image/svg+xml",
        Some("bmp") => "image/bmp",
        Some("heic") => "image/heic",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn urls() -> BucketUrls {
        BucketUrls::new("https://cdn.example", "memorial_images", "secret").unwrap()
    }

    #[test]
    fn public_url_layout() {
        assert_eq!(
            urls().public_url("x.jpg"),
            "https://cdn.example/storage/v1/object/public/memorial_images/x.jpg"
        );
        assert_eq!(
            urls().public_url("user-1/171_my photo.png"),
            "https://cdn.example/storage/v1/object/public/memorial_images/user-1/171_my%20photo.png"
        );
    }

    #[test]
    fn base_url_with_prefix_path() {
        let urls = BucketUrls::new("https://host.example/api/", "b", "k").unwrap();
        let url = urls.public_url("a.png");
        assert_eq!(url, "https://host.example/api/storage/v1/object/public/b/a.png");
        assert_eq!(urls.path_from_url(&url).as_deref(), Some("a.png"));
    }

    #[test]
    fn path_round_trips_through_public_and_signed_urls() {
        let urls = urls();
        let path = "user-1/171_my photo.png";
        assert_eq!(urls.path_from_url(&urls.public_url(path)).as_deref(), Some(path));
        let signed = urls.signed_url(path, Duration::from_secs(60)).unwrap();
        assert!(signed.contains("/object/sign/memorial_images/"));
        assert_eq!(urls.path_from_url(&signed).as_deref(), Some(path));
    }

    #[test]
    fn encoded_segments_are_decoded() {
        let urls = urls();
        assert_eq!(
            urls.path_from_url("https://cdn.example/storage/v1/object/public/memorial_images/u%2Fx/caf%C3%A9.jpg")
                .as_deref(),
            Some("u/x/café.jpg")
        );
        assert!(urls
            .path_from_url("https://cdn.example/storage/v1/object/public/memorial_images/%FF.jpg")
            .is_none());
    }

    #[test]
    fn foreign_urls_have_no_path() {
        let urls = urls();
        assert!(urls.path_from_url("https://other.example/storage/v1/object/public/memorial_images/x.jpg").is_none());
        assert!(urls.path_from_url("https://cdn.example/storage/v1/object/public/other_bucket/x.jpg").is_none());
        assert!(urls.path_from_url("https://cdn.example/images/x.jpg").is_none());
        assert!(urls.path_from_url("not a url").is_none());
        assert!(urls.path_from_url("https://cdn.example/storage/v1/object/public/memorial_images/").is_none());
    }

    #[test]
    fn signed_url_verifies_and_rejects_tampering() {
        let urls = urls();
        let signed = Url::parse(&urls.signed_url("x.jpg", Duration::from_secs(60)).unwrap()).unwrap();
        let query: std::collections::HashMap<_, _> = signed.query_pairs().into_owned().collect();
        let expires: u64 = query["expires"].parse().unwrap();
        let token = &query["token"];

        assert!(urls.verify("x.jpg", expires, token).is_ok());
        assert!(matches!(urls.verify("y.jpg", expires, token), Err(StorageError::InvalidSignature(_))));
        assert!(matches!(urls.verify("x.jpg", expires + 1, token), Err(StorageError::InvalidSignature(_))));
        assert!(matches!(urls.verify("x.jpg", expires, "zz"), Err(StorageError::InvalidSignature(_))));
    }

    #[test]
    fn expired_token_is_rejected() {
        let urls = urls();
        let expires = unix_now() - 10;
        let token = urls.token("x.jpg", expires).unwrap();
        assert!(matches!(urls.verify("x.jpg", expires, &token), Err(StorageError::Expired(_))));
    }

    #[test]
    fn back_to_back_signatures_both_cover_ttl() {
        let urls = urls();
        let ttl = Duration::from_secs(3600);
        let issued = unix_now();
        for _ in 0..2 {
            let signed = Url::parse(&urls.signed_url("x.jpg", ttl).unwrap()).unwrap();
            let expires: u64 = signed
                .query_pairs()
                .find(|(k, _)| k == "expires")
                .unwrap()
                .1
                .parse()
                .unwrap();
            assert!(expires >= issued + ttl.as_secs());
        }
    }

    #[test]
    fn different_secrets_do_not_verify_each_other() {
        let a = BucketUrls::new("https://cdn.example", "b", "one").unwrap();
        let b = BucketUrls::new("https://cdn.example", "b", "two").unwrap();
        let expires = unix_now() + 60;
        let token = a.token("x.jpg", expires).unwrap();
        assert!(b.verify("x.jpg", expires, &token).is_err());
    }

    #[test]
    fn path_validation() {
        assert!(validate_path("a.jpg").is_ok());
        assert!(validate_path("user/1_a.jpg").is_ok());
        for bad in ["", "/a.jpg", "../a.jpg", "a//b.jpg", "a/./b", ".hidden", "a\\b"] {
            assert!(validate_path(bad).is_err(), "{bad:?} should be rejected");
        }
    }

    #[test]
    fn content_types_from_extension() {
        assert_eq!(content_type_for("a.JPG"), "image/jpeg");
        assert_eq!(content_type_for("x/y.webp"), "image/webp");
        assert_eq!(content_type_for("noext"), "application/octet-stream");
    }
}
