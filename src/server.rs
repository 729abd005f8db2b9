//! HTTP server: function endpoints, record API, and bucket object routes.
//!
//! Every route answers `OPTIONS` preflights with `ok`, and every response carries
//! the permissive CORS headers browsers need to call the function endpoints.

use std::sync::Arc;

use anyhow::{Context, Result};
use axum::{
    body::{Body, Bytes},
    extract::{DefaultBodyLimit, Path, Query, Request, State},
    http::{header, HeaderValue, Method, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use crate::config::MemorialConfig;
use crate::enrich::LookupResponse;
use crate::memorial::types::{ImageReference, Memorial, MemorialDraft};
use crate::service::params::{
    LookupParams, MessageResponse, PersistImagesParams, SignedReadParams, UploadParams,
};
use crate::service::{MemorialService, ObjectBody, ServiceError};
use crate::storage::StorageError;

const ALLOW_HEADERS: &str = "authorization, x-client-info, apikey, content-type";
/// Largest accepted request body (direct uploads).
const MAX_BODY_BYTES: usize = 20 * 1024 * 1024;

type AppState = Arc<MemorialService>;

/// Open storage, bind `server.host:server.port`, and serve until Ctrl-C.
pub async fn serve(config: MemorialConfig) -> Result<()> {
    let bind_addr = config.bind_addr();
    let service = MemorialService::open(config).await?;

    let app = build_router(Arc::new(service)).layer(TraceLayer::new_for_http());

    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("failed to bind {bind_addr}"))?;
    info!(addr = %bind_addr, "memorial server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server exited")?;
    info!("memorial server shut down");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/functions/v1/lookup-memorial", post(lookup_memorial))
        .route("/functions/v1/persist-images", post(persist_images))
        .route("/functions/v1/cleanup-images", post(cleanup_images))
        .route("/api/memorials", get(list_memorials).post(submit_memorial))
        .route("/api/memorials/{id}", get(get_memorial))
        .route("/api/uploads", post(upload_image))
        .route("/storage/v1/object/sign/{bucket}/{*path}", get(read_signed))
        .route("/storage/v1/object/public/{bucket}/{*path}", get(read_public))
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(middleware::from_fn(cors))
        .with_state(state)
}

/// Answer preflights directly and stamp CORS headers on everything else.
async fn cors(request: Request, next: Next) -> Response {
    let mut response = if request.method() == Method::OPTIONS {
        "ok".into_response()
    } else {
        next.run(request).await
    };
    let headers = response.headers_mut();
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_ORIGIN,
        HeaderValue::from_static("*"),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_HEADERS,
        HeaderValue::from_static(ALLOW_HEADERS),
    );
    response
}

// ── Handlers ─────────────────────────────────────────────────────────────────

async fn healthz() -> &'static str {
    "ok"
}

async fn lookup_memorial(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<LookupResponse>, ApiError> {
    let params: LookupParams = parse_body(&body)?;
    let response = state.lookup(&params.name).await?;
    Ok(Json(response))
}

async fn persist_images(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<Vec<ImageReference>>, ApiError> {
    let params: PersistImagesParams = parse_body(&body)?;
    let images = params.images.unwrap_or_default();
    Ok(Json(state.persist_images(&images).await))
}

async fn cleanup_images(State(state): State<AppState>) -> Result<Json<MessageResponse>, ApiError> {
    let report = state.cleanup(false).await?;
    Ok(Json(MessageResponse {
        message: report.message(),
    }))
}

async fn list_memorials(State(state): State<AppState>) -> Result<Json<Vec<Memorial>>, ApiError> {
    Ok(Json(state.list_memorials().await?))
}

async fn get_memorial(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Memorial>, ApiError> {
    Ok(Json(state.get_memorial(&id).await?))
}

async fn submit_memorial(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<(StatusCode, Json<Memorial>), ApiError> {
    let draft: MemorialDraft = parse_body(&body)?;
    let status = if draft.id.is_some() {
        StatusCode::OK
    } else {
        StatusCode::CREATED
    };
    Ok((status, Json(state.submit(draft).await?)))
}

async fn upload_image(
    State(state): State<AppState>,
    Query(params): Query<UploadParams>,
    body: Bytes,
) -> Result<(StatusCode, Json<ImageReference>), ApiError> {
    let image = state.upload(&params, &body).await?;
    Ok((StatusCode::CREATED, Json(image)))
}

async fn read_signed(
    State(state): State<AppState>,
    Path((bucket, path)): Path<(String, String)>,
    Query(params): Query<SignedReadParams>,
) -> Result<Response, ApiError> {
    let object = state
        .read_signed(&bucket, &path, params.expires, &params.token)
        .await?;
    Ok(object_response(object, "private"))
}

async fn read_public(
    State(state): State<AppState>,
    Path((bucket, path)): Path<(String, String)>,
) -> Result<Response, ApiError> {
    let object = state.read_public(&bucket, &path).await?;
    Ok(object_response(object, "public, max-age=3600"))
}

fn object_response(object: ObjectBody, cache_control: &'static str) -> Response {
    (
        [
            (header::CONTENT_TYPE, object.content_type),
            (header::CACHE_CONTROL, cache_control),
        ],
        Body::from(object.bytes),
    )
        .into_response()
}

/// Decode a JSON body; an empty body decodes as the default value.
fn parse_body<T: DeserializeOwned + Default>(body: &[u8]) -> Result<T, ApiError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(T::default());
    }
    serde_json::from_slice(body).map_err(|e| ApiError::bad_request(format!("invalid JSON body: {e}")))
}

// ── Errors ───────────────────────────────────────────────────────────────────

#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    fn forbidden(message: impl Into<String>) -> Self {
        Self::new(StatusCode::FORBIDDEN, message)
    }

    fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }

    fn internal<E: std::fmt::Display>(err: E) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, err.to_string())
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        Self::internal(format!("{err:#}"))
    }
}

impl From<StorageError> for ApiError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::InvalidPath(_) => ApiError::bad_request(err.to_string()),
            StorageError::NotFound(_) => ApiError::not_found(err.to_string()),
            StorageError::AlreadyExists(_) => ApiError::new(StatusCode::CONFLICT, err.to_string()),
            StorageError::InvalidSignature(_) | StorageError::Expired(_) => {
                ApiError::forbidden(err.to_string())
            }
            StorageError::Url(_) | StorageError::Io(_) => ApiError::internal(err),
        }
    }
}

impl From<ServiceError> for ApiError {
    fn from(err: ServiceError) -> Self {
        match err {
            ServiceError::Invalid(message) => ApiError::bad_request(message),
            ServiceError::NotFound(message) => ApiError::not_found(message),
            ServiceError::Forbidden(message) => ApiError::forbidden(message),
            ServiceError::Storage(err) => err.into(),
            ServiceError::Enrich(err) => ApiError::internal(err),
            ServiceError::Internal(err) => err.into(),
        }
    }
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            error!(status = %self.status, message = %self.message, "api error");
        } else {
            warn!(status = %self.status, message = %self.message, "request rejected");
        }
        (
            self.status,
            Json(ErrorBody {
                error: self.message,
            }),
        )
            .into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use crate::enrich::{
        EnrichError, Enricher, Extraction, Extractor, SearchProvider, SearchResponse,
    };
    use crate::storage::local::LocalBucket;
    use crate::storage::BucketUrls;
    use async_trait::async_trait;
    use axum::body::to_bytes;
    use axum::http::Request;
    use serde_json::Value;
    use std::sync::Mutex;
    use tempfile::TempDir;
    use tower::ServiceExt;

    struct Unreachable;

    #[async_trait]
    impl SearchProvider for Unreachable {
        async fn search(&self, _: &str) -> Result<SearchResponse, EnrichError> {
            Err(EnrichError::NotConfigured("search api key"))
        }
    }

    #[async_trait]
    impl Extractor for Unreachable {
        async fn extract(&self, _: &str, _: &str) -> Result<Extraction, EnrichError> {
            Err(EnrichError::NotConfigured("llm api key"))
        }
    }

    fn setup_test_app() -> (Router, TempDir) {
        let tmp = TempDir::new().unwrap();
        let urls = BucketUrls::new("http://127.0.0.1:8080", "memorial_images", "secret").unwrap();
        let service = MemorialService::new(
            Arc::new(Mutex::new(db::open_memory_database().unwrap())),
            Arc::new(LocalBucket::new(tmp.path().join("bucket"), urls)),
            reqwest::Client::new(),
            Enricher::new(Arc::new(Unreachable), Arc::new(Unreachable)),
            Arc::new(MemorialConfig::default()),
        );
        (build_router(Arc::new(service)), tmp)
    }

    async fn json_body(response: Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn preflight_answers_ok_with_cors_headers() {
        let (router, _tmp) = setup_test_app();
        let request = Request::builder()
            .method("OPTIONS")
            .uri("/functions/v1/lookup-memorial")
            .body(Body::empty())
            .unwrap();

        let response = router.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()["access-control-allow-origin"], "*");
        assert_eq!(response.headers()["access-control-allow-headers"], ALLOW_HEADERS);
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&body[..], b"ok");
    }

    #[tokio::test]
    async fn blank_lookup_is_bad_request() {
        let (router, _tmp) = setup_test_app();
        let request = Request::builder()
            .method("POST")
            .uri("/functions/v1/lookup-memorial")
            .header("content-type", "application/json")
            .body(Body::from(r#"{"name": "  "}"#))
            .unwrap();

        let response = router.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(response.headers()["access-control-allow-origin"], "*");
        assert_eq!(json_body(response).await["error"], "Name is required");
    }

    #[tokio::test]
    async fn upstream_failure_is_internal_error() {
        let (router, _tmp) = setup_test_app();
        let request = Request::builder()
            .method("POST")
            .uri("/functions/v1/lookup-memorial")
            .body(Body::from(r#"{"name": "Someone"}"#))
            .unwrap();

        let response = router.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(json_body(response).await["error"].is_string());
    }

    #[tokio::test]
    async fn persist_with_no_images_returns_empty_list() {
        let (router, _tmp) = setup_test_app();
        for body in ["", "{}", r#"{"images": []}"#] {
            let request = Request::builder()
                .method("POST")
                .uri("/functions/v1/persist-images")
                .body(Body::from(body))
                .unwrap();
            let response = router.clone().oneshot(request).await.unwrap();
            assert_eq!(response.status(), StatusCode::OK);
            assert_eq!(json_body(response).await, serde_json::json!([]));
        }
    }

    #[tokio::test]
    async fn unknown_memorial_is_not_found() {
        let (router, _tmp) = setup_test_app();
        let request = Request::builder()
            .uri("/api/memorials/nope")
            .body(Body::empty())
            .unwrap();
        let response = router.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(json_body(response).await["error"], "memorial not found: nope");
    }

    #[tokio::test]
    async fn healthz_is_ok() {
        let (router, _tmp) = setup_test_app();
        let request = Request::builder().uri("/healthz").body(Body::empty()).unwrap();
        let response = router.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
