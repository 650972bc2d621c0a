//! HTTP surface for the PDF Q&A service.
//!
//! - `GET /` – health message.
//! - `POST /upload-pdf/:session_id` – multipart upload (`file` field). Stores the PDF, builds the
//!   retrieval index and conversation handle, summarizes the document, and registers the session.
//!   Returns `{ "message", "session_id" }`.
//! - `GET /ws/:session_id` – WebSocket chat for an uploaded document.
//! - `GET /metrics` – upload and conversation counters.
//!
//! Errors use `{ "detail": "<message>" }` bodies.

use crate::chat::{ConnectionManager, websocket_handler};
use crate::metrics::ServiceMetrics;
use crate::session::SessionStore;
use crate::upload::{UploadError, UploadService};
use axum::{
    Json, Router,
    extract::{DefaultBodyLimit, Multipart, Path, State, multipart::MultipartError},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;
use tower_http::cors::CorsLayer;

const HEALTH_MESSAGE: &str = "PDF Q&A Backend is running!";
const UPLOAD_SUCCESS_MESSAGE: &str = "PDF uploaded and processed successfully!";
const FILE_FIELD: &str = "file";

/// Shared handles passed to every handler. Built once at startup.
#[derive(Clone)]
pub struct AppState {
    /// Session Store.
    pub sessions: Arc<SessionStore>,
    /// Live connection registry.
    pub connections: Arc<ConnectionManager>,
    /// Upload flow.
    pub uploads: Arc<UploadService>,
    /// Service counters.
    pub metrics: Arc<ServiceMetrics>,
    /// Request body limit for uploads, in bytes.
    pub upload_limit: usize,
}

/// Build the HTTP router exposing the upload, chat, and diagnostics endpoints.
pub fn create_router(state: AppState) -> Router {
    let upload_limit = state.upload_limit;
    Router::new()
        .route("/", get(read_root))
        .route(
            "/upload-pdf/:session_id",
            post(upload_pdf).layer(DefaultBodyLimit::max(upload_limit)),
        )
        .route("/ws/:session_id", get(websocket_handler))
        .route("/metrics", get(get_metrics))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn read_root() -> Json<serde_json::Value> {
    Json(json!({ "message": HEALTH_MESSAGE }))
}

/// Success body for `POST /upload-pdf/:session_id`.
#[derive(Serialize)]
struct UploadResponse {
    message: &'static str,
    session_id: String,
}

async fn upload_pdf(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>, ApiError> {
    while let Some(field) = multipart.next_field().await? {
        if field.name() != Some(FILE_FIELD) {
            continue;
        }
        let file_name = field.file_name().unwrap_or_default().to_string();
        tracing::info!(session_id = %session_id, file_name = %file_name, "Upload received");

        let outcome = state
            .uploads
            .upload(&session_id, &file_name, Box::pin(field))
            .await?;
        return Ok(Json(UploadResponse {
            message: UPLOAD_SUCCESS_MESSAGE,
            session_id: outcome.session_id,
        }));
    }
    Err(ApiError::Upload(UploadError::MissingFile))
}

/// Response body for `GET /metrics`.
#[derive(Serialize)]
struct MetricsResponse {
    documents_processed: u64,
    chunks_indexed: u64,
    questions_answered: u64,
    model_failures: u64,
    active_sessions: usize,
    active_connections: usize,
}

async fn get_metrics(State(state): State<AppState>) -> Json<MetricsResponse> {
    let snapshot = state.metrics.snapshot();
    Json(MetricsResponse {
        documents_processed: snapshot.documents_processed,
        chunks_indexed: snapshot.chunks_indexed,
        questions_answered: snapshot.questions_answered,
        model_failures: snapshot.model_failures,
        active_sessions: state.sessions.len(),
        active_connections: state.connections.len(),
    })
}

enum ApiError {
    Upload(UploadError),
    Multipart(MultipartError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, detail) = match self {
            Self::Upload(error) => {
                let status = match error {
                    UploadError::InvalidInput => StatusCode::BAD_REQUEST,
                    UploadError::MissingFile => StatusCode::UNPROCESSABLE_ENTITY,
                    UploadError::Conflict(_) => StatusCode::CONFLICT,
                    UploadError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
                };
                (status, error.to_string())
            }
            Self::Multipart(error) => (error.status(), error.body_text()),
        };
        (status, Json(json!({ "detail": detail }))).into_response()
    }
}

impl From<UploadError> for ApiError {
    fn from(inner: UploadError) -> Self {
        Self::Upload(inner)
    }
}

impl From<MultipartError> for ApiError {
    fn from(inner: MultipartError) -> Self {
        Self::Multipart(inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conversation::{ConversationError, ConversationHandle};
    use crate::processing::{DocumentProcessor, ProcessedDocument, ProcessingError, VectorIndex};
    use async_trait::async_trait;
    use axum::{
        body::{Body, to_bytes},
        http::{Method, Request},
    };
    use std::path::Path as FsPath;
    use tower::ServiceExt;

    const BOUNDARY: &str = "pdfqa-test-boundary";

    struct FixedAnswer;

    #[async_trait]
    impl ConversationHandle for FixedAnswer {
        async fn ask(&self, _question: &str) -> Result<String, ConversationError> {
            Ok("answer".into())
        }
    }

    struct StubProcessor {
        fail: bool,
    }

    #[async_trait]
    impl DocumentProcessor for StubProcessor {
        async fn process(&self, _path: &FsPath) -> Result<ProcessedDocument, ProcessingError> {
            if self.fail {
                return Err(ProcessingError::EmptyDocument);
            }
            Ok(ProcessedDocument {
                index: Arc::new(VectorIndex::default()),
                conversation: Arc::new(FixedAnswer),
                summary: "Summary text".into(),
                chunk_count: 1,
            })
        }
    }

    fn state(dir: &FsPath, fail: bool) -> AppState {
        let sessions = Arc::new(SessionStore::new());
        let uploads = Arc::new(UploadService::new(
            Arc::clone(&sessions),
            Arc::new(StubProcessor { fail }),
            dir.to_path_buf(),
        ));
        AppState {
            sessions,
            connections: Arc::new(ConnectionManager::new()),
            uploads,
            metrics: Arc::new(ServiceMetrics::new()),
            upload_limit: 1024 * 1024,
        }
    }

    fn multipart_request(session_id: &str, field: &str, file_name: &str) -> Request<Body> {
        let body = format!(
            "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{field}\"; filename=\"{file_name}\"\r\nContent-Type: application/pdf\r\n\r\n%PDF-1.4 test\r\n--{BOUNDARY}--\r\n"
        );
        Request::builder()
            .method(Method::POST)
            .uri(format!("/upload-pdf/{session_id}"))
            .header(
                "content-type",
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(body))
            .expect("request")
    }

    async fn json_body(response: Response) -> serde_json::Value {
        let bytes = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body bytes");
        serde_json::from_slice(&bytes).expect("json body")
    }

    #[tokio::test]
    async fn root_reports_health() {
        let dir = tempfile::tempdir().expect("tempdir");
        let response = create_router(state(dir.path(), false))
            .oneshot(Request::get("/").body(Body::empty()).expect("request"))
            .await
            .expect("router response");

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await["message"], HEALTH_MESSAGE);
    }

    #[tokio::test]
    async fn upload_registers_session() {
        let dir = tempfile::tempdir().expect("tempdir");
        let state = state(dir.path(), false);
        let sessions = Arc::clone(&state.sessions);

        let response = create_router(state)
            .oneshot(multipart_request("abc", "file", "doc.pdf"))
            .await
            .expect("router response");

        assert_eq!(response.status(), StatusCode::OK);
        let json = json_body(response).await;
        assert_eq!(json["session_id"], "abc");
        assert_eq!(json["message"], UPLOAD_SUCCESS_MESSAGE);
        assert_eq!(sessions.summary("abc").as_deref(), Some("Summary text"));
    }

    #[tokio::test]
    async fn wrong_extension_is_a_client_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let state = state(dir.path(), false);
        let sessions = Arc::clone(&state.sessions);

        let response = create_router(state)
            .oneshot(multipart_request("abc", "file", "notes.docx"))
            .await
            .expect("router response");

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            json_body(response).await["detail"],
            "Invalid file type. Only PDF files are allowed."
        );
        assert!(sessions.is_empty());
        assert_eq!(std::fs::read_dir(dir.path()).expect("dir").count(), 0);
    }

    #[tokio::test]
    async fn encoded_traversal_session_id_is_stored_inside_upload_dir() {
        let root = tempfile::tempdir().expect("tempdir");
        let uploads = root.path().join("uploads");
        std::fs::create_dir(&uploads).expect("uploads dir");
        let state = state(&uploads, false);
        let sessions = Arc::clone(&state.sessions);

        let response = create_router(state)
            .oneshot(multipart_request("..%2Fescaped", "file", "doc.pdf"))
            .await
            .expect("router response");

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await["session_id"], "../escaped");
        let stored = sessions.doc_path("../escaped").expect("stored path");
        assert_eq!(stored.parent(), Some(uploads.as_path()));
        assert_eq!(std::fs::read_dir(&uploads).expect("uploads").count(), 1);
        let siblings: Vec<_> = std::fs::read_dir(root.path())
            .expect("root")
            .map(|entry| entry.expect("entry").file_name())
            .collect();
        assert_eq!(siblings, vec![std::ffi::OsString::from("uploads")]);
    }

    #[tokio::test]
    async fn missing_file_field_is_unprocessable() {
        let dir = tempfile::tempdir().expect("tempdir");
        let response = create_router(state(dir.path(), false))
            .oneshot(multipart_request("abc", "attachment", "doc.pdf"))
            .await
            .expect("router response");

        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn processing_failure_is_a_server_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let response = create_router(state(dir.path(), true))
            .oneshot(multipart_request("abc", "file", "doc.pdf"))
            .await
            .expect("router response");

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            json_body(response).await["detail"],
            "Error processing PDF: no extractable text found in document"
        );
    }

    #[tokio::test]
    async fn metrics_reports_session_count() {
        let dir = tempfile::tempdir().expect("tempdir");
        let app = create_router(state(dir.path(), false));

        app.clone()
            .oneshot(multipart_request("abc", "file", "doc.pdf"))
            .await
            .expect("upload");
        let response = app
            .oneshot(Request::get("/metrics").body(Body::empty()).expect("request"))
            .await
            .expect("router response");

        assert_eq!(response.status(), StatusCode::OK);
        let json = json_body(response).await;
        assert_eq!(json["active_sessions"], 1);
        assert_eq!(json["active_connections"], 0);
    }
}
