//! Filesystem-backed bucket.
//!
//! Objects live at `{root}/{path}`. Writes go to a hidden temp file in the same
//! directory and are renamed into place, so readers never observe partial objects
//! and `list` never reports in-flight uploads.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

use super::{validate_path, Bucket, BucketUrls, StorageError, StoredObject};

pub struct LocalBucket {
    root: PathBuf,
    urls: BucketUrls,
}

impl LocalBucket {
    pub fn new(root: impl Into<PathBuf>, urls: BucketUrls) -> Self {
        Self {
            root: root.into(),
            urls,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn full_path(&self, path: &str) -> Result<PathBuf, StorageError> {
        validate_path(path)?;
        Ok(self.root.join(path))
    }

    /// Create the root directory and check it is writable.
    pub async fn validate(&self) -> Result<(), StorageError> {
        fs::create_dir_all(&self.root).await?;
        let probe = self.root.join(format!(".probe-{}", uuid::Uuid::new_v4()));
        fs::write(&probe, b"probe").await?;
        fs::remove_file(&probe).await?;
        Ok(())
    }
}

#[async_trait]
impl Bucket for LocalBucket {
    fn urls(&self) -> &BucketUrls {
        &self.urls
    }

    async fn upload(
        &self,
        path: &str,
        bytes: &[u8],
        content_type: Option<&str>,
        upsert: bool,
    ) -> Result<String, StorageError> {
        let full_path = self.full_path(path)?;
        debug!(path = %path, size = bytes.len(), content_type = ?content_type, upsert, "bucket: upload");

        if !upsert && fs::try_exists(&full_path).await? {
            return Err(StorageError::AlreadyExists(path.to_string()));
        }

        let parent = full_path.parent().unwrap_or(&self.root);
        fs::create_dir_all(parent).await?;

        let file_name = full_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let temp_path = parent.join(format!(".{file_name}.{}.part", uuid::Uuid::new_v4()));
        let mut file = fs::File::create(&temp_path).await?;
        if let Err(e) = file.write_all(bytes).await {
            drop(file);
            let _ = fs::remove_file(&temp_path).await;
            return Err(e.into());
        }
        file.sync_all().await?;
        drop(file);

        fs::rename(&temp_path, &full_path).await.map_err(|e| {
            warn!(from = %temp_path.display(), to = %full_path.display(), error = %e, "bucket: rename failed");
            e
        })?;

        Ok(path.to_string())
    }

    async fn list(&self) -> Result<Vec<StoredObject>, StorageError> {
        let mut objects = Vec::new();
        if !fs::try_exists(&self.root).await? {
            return Ok(objects);
        }

        let mut pending = vec![self.root.clone()];
        while let Some(dir) = pending.pop() {
            let mut entries = fs::read_dir(&dir).await?;
            while let Some(entry) = entries.next_entry().await? {
                let name = entry.file_name().to_string_lossy().into_owned();
                if name.starts_with('.') {
                    continue;
                }
                let file_type = entry.file_type().await?;
                if file_type.is_dir() {
                    pending.push(entry.path());
                } else if file_type.is_file() {
                    let Ok(relative) = entry.path().strip_prefix(&self.root).map(Path::to_path_buf)
                    else {
                        continue;
                    };
                    let path = relative
                        .components()
                        .map(|c| c.as_os_str().to_string_lossy().into_owned())
                        .collect::<Vec<_>>()
                        .join("/");
                    let size = entry.metadata().await?.len();
                    objects.push(StoredObject { path, size });
                }
            }
        }

        objects.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(objects)
    }

    async fn read(&self, path: &str) -> Result<Vec<u8>, StorageError> {
        let full_path = self.full_path(path)?;
        match fs::read(&full_path).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(StorageError::NotFound(path.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn exists(&self, path: &str) -> Result<bool, StorageError> {
        let full_path = self.full_path(path)?;
        Ok(fs::try_exists(full_path).await?)
    }

    async fn remove(&self, paths: &[String]) -> Result<Vec<String>, StorageError> {
        let mut removed = Vec::with_capacity(paths.len());
        for path in paths {
            let full_path = self.full_path(path)?;
            match fs::remove_file(&full_path).await {
                Ok(()) => removed.push(path.clone()),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    debug!(path = %path, "bucket: remove skipped missing object");
                }
                Err(e) => return Err(e.into()),
            }
        }
        Ok(removed)
    }
}
