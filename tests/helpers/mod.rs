#![allow(dead_code)]

use async_trait::async_trait;
use axum::http::{header, StatusCode};
use axum::routing::get;
use axum::Router;
use chrono::NaiveDate;
use memorial::config::MemorialConfig;
use memorial::db;
use memorial::enrich::{
    CitedSource, EnrichError, Enricher, Extraction, Extractor, SearchProvider, SearchResponse,
    SearchResult,
};
use memorial::memorial::types::{ImageReference, MemorialDraft, SourceLink};
use memorial::service::MemorialService;
use memorial::storage::local::LocalBucket;
use memorial::storage::BucketUrls;
use rusqlite::Connection;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

pub const BASE_URL: &str = "http://127.0.0.1:8080";
pub const BUCKET: &str = "memorial_images";
pub const PNG_BYTES: &[u8] = b"\x89PNG\r\n\x1a\nfake";

/// Open a fresh in-memory database with schema and migrations applied.
pub fn test_db() -> Connection {
    db::open_memory_database().unwrap()
}

pub fn test_urls() -> BucketUrls {
    BucketUrls::new(BASE_URL, BUCKET, "test-secret").unwrap()
}

/// Empty bucket rooted inside `tmp`.
pub fn test_bucket(tmp: &TempDir) -> LocalBucket {
    LocalBucket::new(tmp.path().join("bucket"), test_urls())
}

/// A valid draft with one source and no images.
pub fn sample_draft(name: &str) -> MemorialDraft {
    MemorialDraft {
        name: name.into(),
        date_of_birth: NaiveDate::from_ymd_opt(1980, 3, 14),
        date_of_death: NaiveDate::from_ymd_opt(2023, 10, 17),
        age: Some(43),
        place_of_death: Some("Gaza City".into()),
        story: "A teacher and a father of three.".into(),
        sources: vec![SourceLink {
            url: "https://news.example/story".into(),
            title: "Story".into(),
        }],
        ..Default::default()
    }
}

/// Serve stand-in external images on an ephemeral port:
/// `/ok.png` (200, image/png), `/photo` (200, image/jpeg), anything else 404.
pub async fn spawn_image_host() -> String {
    let router = Router::new()
        .route(
            "/ok.png",
            get(|| async { ([(header::CONTENT_TYPE, "image/png")], PNG_BYTES) }),
        )
        .route(
            "/photo",
            get(|| async { ([(header::CONTENT_TYPE, "image/jpeg; q=0.9")], &b"jpeg"[..]) }),
        )
        .fallback(|| async { (StatusCode::NOT_FOUND, "not found") });

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{addr}")
}

pub fn external(url: impl Into<String>) -> ImageReference {
    ImageReference::external(url, "candidate")
}

/// Search fake: fixed results, counts calls.
#[derive(Default)]
pub struct FakeSearch {
    pub calls: AtomicUsize,
    pub response: SearchResponse,
}

impl FakeSearch {
    pub fn with_results() -> Self {
        Self {
            calls: AtomicUsize::new(0),
            response: SearchResponse {
                results: vec![
                    SearchResult {
                        url: "https://news.example/a".into(),
                        content: "John Doe was a nurse.".into(),
                        title: Some("News A".into()),
                    },
                    SearchResult {
                        url: "https://blog.example/b".into(),
                        content: "He worked at the hospital.".into(),
                        title: None,
                    },
                ],
                images: vec!["https://img.example/1.jpg".into()],
            },
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SearchProvider for FakeSearch {
    async fn search(&self, _name: &str) -> Result<SearchResponse, EnrichError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.response.clone())
    }
}

/// Extractor fake: returns `extraction`, or `NoExtraction` when unset.
#[derive(Default)]
pub struct FakeExtractor {
    pub calls: AtomicUsize,
    pub extraction: Option<Extraction>,
}

impl FakeExtractor {
    pub fn john_doe() -> Self {
        Self {
            calls: AtomicUsize::new(0),
            extraction: Some(Extraction {
                name: Some("John Doe".into()),
                date_of_birth: Some("1990-05-01".into()),
                date_of_death: Some("2024-02-10".into()),
                age: Some(33.7),
                place_of_death: Some("Khan Younis".into()),
                story: Some("A nurse.".into()),
                sources: Some(vec![CitedSource {
                    url: Some("https://blog.example/b".into()),
                    title: Some("Blog B".into()),
                }]),
                ..Default::default()
            }),
        }
    }
}

#[async_trait]
impl Extractor for FakeExtractor {
    async fn extract(&self, _name: &str, _context: &str) -> Result<Extraction, EnrichError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.extraction.clone().ok_or(EnrichError::NoExtraction)
    }
}

/// Service over an in-memory database and a bucket inside `tmp`.
pub fn test_service(
    tmp: &TempDir,
    search: Arc<FakeSearch>,
    extractor: Arc<FakeExtractor>,
    config: MemorialConfig,
) -> MemorialService {
    MemorialService::new(
        Arc::new(Mutex::new(test_db())),
        Arc::new(test_bucket(tmp)),
        reqwest::Client::new(),
        Enricher::new(search, extractor),
        Arc::new(config),
    )
}

pub fn test_config() -> MemorialConfig {
    let mut config = MemorialConfig::default();
    config.storage.public_base_url = BASE_URL.into();
    config.storage.bucket = BUCKET.into();
    config.storage.signing_secret = "test-secret".into();
    config
}
