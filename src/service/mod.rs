//! Operations behind the HTTP routes and CLI commands.
//!
//! [`MemorialService`] holds the shared state (database connection, bucket,
//! HTTP client, enricher, config). Every database call runs on the blocking pool.

pub mod params;

use rusqlite::Connection;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::config::MemorialConfig;
use crate::db;
use crate::enrich::{EnrichError, Enricher, LookupResponse};
use crate::memorial::store;
use crate::memorial::types::{ImageReference, Memorial, MemorialDraft};
use crate::pipeline::{persist, reclaim, signed, submit, upload};
use crate::storage::local::LocalBucket;
use crate::storage::{content_type_for, Bucket, BucketUrls, StorageError};
use params::UploadParams;

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    /// Rejected input; reported to callers as a client error.
    #[error("{0}")]
    Invalid(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Forbidden(String),
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error(transparent)]
    Enrich(#[from] EnrichError),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

pub type ServiceResult<T> = Result<T, ServiceError>;

/// An object read from the bucket, ready to serve.
#[derive(Debug)]
pub struct ObjectBody {
    pub bytes: Vec<u8>,
    pub content_type: &'static str,
}

#[derive(Clone)]
pub struct MemorialService {
    db: Arc<Mutex<Connection>>,
    bucket: Arc<dyn Bucket>,
    http: reqwest::Client,
    enricher: Enricher,
    config: Arc<MemorialConfig>,
}

impl MemorialService {
    pub fn new(
        db: Arc<Mutex<Connection>>,
        bucket: Arc<dyn Bucket>,
        http: reqwest::Client,
        enricher: Enricher,
        config: Arc<MemorialConfig>,
    ) -> Self {
        Self {
            db,
            bucket,
            http,
            enricher,
            config,
        }
    }

    /// Open the database and bucket named by `config` and build the outbound clients.
    pub async fn open(config: MemorialConfig) -> anyhow::Result<Self> {
        let db_path = config.resolved_db_path();
        let conn = db::open_database(&db_path)?;
        tracing::info!(db = %db_path.display(), "database ready");

        let urls = BucketUrls::new(
            &config.storage.public_base_url,
            &config.storage.bucket,
            &config.storage.signing_secret,
        )?;
        let bucket = LocalBucket::new(config.resolved_bucket_dir(), urls);
        bucket.validate().await?;
        tracing::info!(root = %bucket.root().display(), bucket = %config.storage.bucket, "bucket ready");

        let http = build_http_client(&config)?;
        let enricher = Enricher::from_config(&config, http.clone())?;

        Ok(Self::new(
            Arc::new(Mutex::new(conn)),
            Arc::new(bucket),
            http,
            enricher,
            Arc::new(config),
        ))
    }

    pub fn bucket(&self) -> &dyn Bucket {
        self.bucket.as_ref()
    }

    /// Run `f` against the connection on the blocking pool.
    async fn with_db<T, F>(&self, f: F) -> ServiceResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> anyhow::Result<T> + Send + 'static,
    {
        let db = Arc::clone(&self.db);
        let result = tokio::task::spawn_blocking(move || {
            let mut conn = db
                .lock()
                .map_err(|e| anyhow::anyhow!("db lock poisoned: {e}"))?;
            f(&mut conn)
        })
        .await
        .map_err(|e| anyhow::anyhow!("db task failed: {e}"))??;
        Ok(result)
    }

    // ── Lookup ───────────────────────────────────────────────────────────────

    /// Return the oldest stored record whose name contains `name`, with signed
    /// image URLs, or synthesize a candidate from the web.
    pub async fn lookup(&self, name: &str) -> ServiceResult<LookupResponse> {
        let name = name.trim().to_string();
        if name.is_empty() {
            return Err(ServiceError::Invalid("Name is required".into()));
        }

        let needle = name.clone();
        let existing = self
            .with_db(move |conn| store::find_by_name(conn, &needle))
            .await?;
        if let Some(memorial) = existing {
            tracing::info!(id = %memorial.id, query = %name, "lookup matched stored memorial");
            let memorial =
                signed::resolve_memorial(self.bucket(), memorial, self.config.display.lookup_ttl())
                    .await;
            return Ok(LookupResponse::existing(memorial));
        }

        let candidate = self.enricher.synthesize(&name).await.map_err(|e| {
            tracing::warn!(query = %name, error = %e, "enrichment failed");
            e
        })?;
        tracing::info!(
            query = %name,
            sources = candidate.sources.len(),
            images = candidate.images.len(),
            "lookup synthesized candidate"
        );
        Ok(LookupResponse::Candidate(candidate))
    }

    // ── Images ───────────────────────────────────────────────────────────────

    pub async fn persist_images(&self, images: &[ImageReference]) -> Vec<ImageReference> {
        persist::persist_external_images(&self.http, self.bucket(), images).await
    }

    pub async fn upload(&self, params: &UploadParams, bytes: &[u8]) -> ServiceResult<ImageReference> {
        if params.user_id.trim().is_empty() || params.file_name.trim().is_empty() {
            return Err(ServiceError::Invalid("file_name and user_id are required".into()));
        }
        if bytes.is_empty() {
            return Err(ServiceError::Invalid("upload body is empty".into()));
        }
        let image = upload::store_upload(
            self.bucket(),
            &params.user_id,
            &params.file_name,
            params.title.as_deref(),
            bytes,
        )
        .await?;
        Ok(image)
    }

    /// Delete unreferenced bucket objects, or list them when `dry_run` is set.
    pub async fn cleanup(&self, dry_run: bool) -> ServiceResult<reclaim::ReclaimReport> {
        let memorials = self.with_db(|conn| store::list_memorials(conn)).await?;
        let report = reclaim::reclaim_orphans(self.bucket(), &memorials, dry_run).await?;

        if !report.deleted.is_empty() {
            let bucket = self.bucket.urls().bucket().to_string();
            let deleted = report.deleted.clone();
            self.with_db(move |conn| store::record_reclaim(conn, &bucket, &deleted))
                .await?;
        }
        Ok(report)
    }

    /// Read an object through a signed URL's `expires`/`token` pair.
    pub async fn read_signed(
        &self,
        bucket: &str,
        path: &str,
        expires: u64,
        token: &str,
    ) -> ServiceResult<ObjectBody> {
        self.check_bucket(bucket, path)?;
        self.bucket.urls().verify(path, expires, token)?;
        self.read_object(path).await
    }

    /// Read an object without a signature. Only allowed when public reads are enabled.
    pub async fn read_public(&self, bucket: &str, path: &str) -> ServiceResult<ObjectBody> {
        if !self.config.storage.public_read {
            return Err(ServiceError::Forbidden("public reads are disabled".into()));
        }
        self.check_bucket(bucket, path)?;
        self.read_object(path).await
    }

    fn check_bucket(&self, bucket: &str, path: &str) -> ServiceResult<()> {
        if bucket != self.bucket.urls().bucket() {
            return Err(ServiceError::NotFound(format!("bucket not found: {bucket}")));
        }
        crate::storage::validate_path(path)?;
        Ok(())
    }

    async fn read_object(&self, path: &str) -> ServiceResult<ObjectBody> {
        let bytes = self.bucket.read(path).await?;
        Ok(ObjectBody {
            bytes,
            content_type: content_type_for(path),
        })
    }

    // ── Records ──────────────────────────────────────────────────────────────

    /// All records, images signed for list display.
    pub async fn list_memorials(&self) -> ServiceResult<Vec<Memorial>> {
        let memorials = self.with_db(|conn| store::list_memorials(conn)).await?;
        let ttl = self.config.display.list_ttl();
        let mut resolved = Vec::with_capacity(memorials.len());
        for memorial in memorials {
            resolved.push(signed::resolve_memorial(self.bucket(), memorial, ttl).await);
        }
        Ok(resolved)
    }

    /// One record, images signed for detail display.
    pub async fn get_memorial(&self, id: &str) -> ServiceResult<Memorial> {
        let key = id.to_string();
        let memorial = self
            .with_db(move |conn| store::get_memorial(conn, &key))
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("memorial not found: {id}")))?;
        Ok(signed::resolve_memorial(self.bucket(), memorial, self.config.display.detail_ttl()).await)
    }

    /// Normalize images, persist external ones, and store the record.
    pub async fn submit(&self, draft: MemorialDraft) -> ServiceResult<Memorial> {
        draft
            .validate()
            .map_err(|e| ServiceError::Invalid(e.to_string()))?;

        let prepared = submit::prepare_submission(&self.http, self.bucket(), draft).await;
        let stored = self
            .with_db(move |conn| {
                if let Some(id) = prepared.id.as_deref() {
                    if store::get_memorial(conn, id)?.is_none() {
                        return Ok(None);
                    }
                }
                store::save_memorial(conn, &prepared).map(Some)
            })
            .await?
            .ok_or_else(|| ServiceError::NotFound("memorial not found".into()))?;

        tracing::info!(id = %stored.id, images = stored.images.len(), "memorial stored");
        Ok(stored)
    }
}

/// Shared outbound client: configured timeout and user agent.
pub fn build_http_client(config: &MemorialConfig) -> anyhow::Result<reqwest::Client> {
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(config.http.timeout_secs))
        .user_agent(config.http.user_agent.clone())
        .build()?;
    Ok(client)
}
