// HTTP server
// JSON endpoints for uploading a PDF and chatting about it


use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use axum::{
    Json, Router,
    extract::{DefaultBodyLimit, Multipart, State, rejection::JsonRejection},
    http::StatusCode,
    response::{Html, IntoResponse, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info, warn};

use crate::ChatError;
use crate::conversation::ConversationTurn;
use crate::session::SessionManager;

const INDEX_PAGE: &str = include_str!("../../static/index.html");

const DOCUMENT_READY: &str =
    "Document successfully uploaded and processed. You can now ask questions about it.";
const NO_FILE_PART: &str = "It seems like the file was not uploaded correctly. Please try again. \
If the problem persists, try using a different file.";
const NO_FILE_SELECTED: &str = "No file selected for uploading. Please choose a file and try again.";

#[derive(Clone)]
pub struct AppState {
    pub manager: Arc<SessionManager>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageRequest {
    pub user_message: String,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BotResponse {
    pub bot_response: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UploadResponse {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_path: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub document_loaded: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HistoryResponse {
    pub document: Option<String>,
    pub turns: Vec<ConversationTurn>,
}

/// Error rendered as a JSON object with a single message field
struct ApiErrorResponse {
    status: StatusCode,
    field: &'static str,
    message: String,
}

impl ApiErrorResponse {
    fn bot(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            field: "botResponse",
            message: message.into(),
        }
    }

    fn upload(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            field: "message",
            message: message.into(),
        }
    }
}

impl IntoResponse for ApiErrorResponse {
    fn into_response(self) -> Response {
        let mut body = serde_json::Map::new();
        body.insert(
            self.field.to_string(),
            serde_json::Value::String(self.message),
        );
        (self.status, Json(body)).into_response()
    }
}

/// HTTP status for a pipeline error
#[inline]
pub fn status_for(error: &ChatError) -> StatusCode {
    match error {
        ChatError::NoDocumentLoaded => StatusCode::BAD_REQUEST,
        ChatError::DocumentLoad(_) => StatusCode::UNPROCESSABLE_ENTITY,
        ChatError::EmbeddingService(_) | ChatError::Generation(_) => StatusCode::BAD_GATEWAY,
        ChatError::Retrieval(_)
        | ChatError::Index(_)
        | ChatError::Config(_)
        | ChatError::Io(_)
        | ChatError::Other(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

#[inline]
pub fn router(state: AppState) -> Router {
    let body_limit = state.manager.config().server.max_upload_bytes;

    Router::new()
        .route("/", get(index_handler))
        .route("/health", get(health_handler))
        .route("/history", get(history_handler))
        .route("/process-message", post(process_message_handler))
        .route("/process-document", post(process_document_handler))
        .route("/upload", post(upload_handler))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}

/// Bind `addr` and serve until Ctrl-C, then release the loaded document
#[inline]
pub async fn serve(manager: Arc<SessionManager>, addr: SocketAddr) -> anyhow::Result<()> {
    let app = router(AppState {
        manager: Arc::clone(&manager),
    });

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    info!("Chat server listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server terminated")?;

    info!("Chat server shutting down");
    manager
        .close()
        .await
        .context("Failed to release the document index")?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
}

async fn index_handler() -> Html<&'static str> {
    Html(INDEX_PAGE)
}

async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        document_loaded: state.manager.has_document().await,
    })
}

async fn history_handler(State(state): State<AppState>) -> Json<HistoryResponse> {
    let (document, turns) = state
        .manager
        .with_session(|session| {
            session.conversation().map_or((None, Vec::new()), |c| {
                (
                    Some(c.document_name().to_string()),
                    c.history().turns().to_vec(),
                )
            })
        })
        .await;
    Json(HistoryResponse { document, turns })
}

async fn process_message_handler(
    State(state): State<AppState>,
    request: Result<Json<MessageRequest>, JsonRejection>,
) -> Result<Json<BotResponse>, ApiErrorResponse> {
    let Json(request) = request.map_err(|rejection| {
        debug!("Rejected message body: {}", rejection.body_text());
        ApiErrorResponse::bot(
            StatusCode::BAD_REQUEST,
            format!(
                "Could not read the message. Send JSON like {{\"userMessage\": \"...\"}}. ({})",
                rejection.body_text()
            ),
        )
    })?;
    let question = request.user_message.trim();
    if question.is_empty() {
        return Err(ApiErrorResponse::bot(
            StatusCode::BAD_REQUEST,
            "Please type a question first.",
        ));
    }
    debug!("Received question: {}", question);

    match state.manager.ask(question).await {
        Ok(answer) => Ok(Json(BotResponse {
            bot_response: answer,
        })),
        Err(e) => {
            warn!("Failed to answer question: {}", e);
            let message = match &e {
                ChatError::NoDocumentLoaded => e.to_string(),
                other => format!("Sorry, I couldn't answer that: {}", other),
            };
            Err(ApiErrorResponse::bot(status_for(&e), message))
        }
    }
}

async fn process_document_handler(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Json<BotResponse>, ApiErrorResponse> {
    let upload_dir = state.manager.config().upload_dir();
    let saved = save_upload(multipart, &upload_dir)
        .await
        .map_err(|e| ApiErrorResponse::bot(e.status, e.message))?;

    match state.manager.ingest(&saved).await {
        Ok(chunks) => {
            info!("Processed {} into {} chunks", saved.display(), chunks);
            Ok(Json(BotResponse {
                bot_response: DOCUMENT_READY.to_string(),
            }))
        }
        Err(e) => {
            error!("Failed to process {}: {}", saved.display(), e);
            Err(ApiErrorResponse::bot(
                status_for(&e),
                format!("An error occurred while processing the document: {}", e),
            ))
        }
    }
}

async fn upload_handler(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Json<UploadResponse>, ApiErrorResponse> {
    let upload_dir = state.manager.config().upload_dir();
    let saved = save_upload(multipart, &upload_dir)
        .await
        .map_err(|e| ApiErrorResponse::upload(e.status, e.message))?;

    Ok(Json(UploadResponse {
        message: "File successfully uploaded.".to_string(),
        file_path: Some(saved.display().to_string()),
    }))
}

#[derive(Debug)]
struct UploadFailure {
    status: StatusCode,
    message: String,
}

impl UploadFailure {
    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }
}

/// Save the `file` field under `upload_dir`, keeping only its file-name component
async fn save_upload(mut multipart: Multipart, upload_dir: &Path) -> Result<PathBuf, UploadFailure> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| UploadFailure::bad_request(format!("Malformed upload: {}", e)))?
    {
        if field.name() != Some("file") {
            continue;
        }

        let Some(file_name) = field.file_name().and_then(sanitize_file_name) else {
            return Err(UploadFailure::bad_request(NO_FILE_SELECTED));
        };

        let bytes = field
            .bytes()
            .await
            .map_err(|e| UploadFailure::bad_request(format!("Failed to read upload: {}", e)))?;

        tokio::fs::create_dir_all(upload_dir)
            .await
            .map_err(|e| upload_io_failure(upload_dir, &e))?;
        let path = upload_dir.join(&file_name);
        tokio::fs::write(&path, &bytes)
            .await
            .map_err(|e| upload_io_failure(&path, &e))?;

        info!("Saved upload {} ({} bytes)", path.display(), bytes.len());
        return Ok(path);
    }

    Err(UploadFailure::bad_request(NO_FILE_PART))
}

fn upload_io_failure(path: &Path, error: &std::io::Error) -> UploadFailure {
    error!("Failed to store upload at {}: {}", path.display(), error);
    UploadFailure {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        message: format!("File upload failed: {}", error),
    }
}

/// Reduce a client-supplied name to a bare file name
#[inline]
pub fn sanitize_file_name(name: &str) -> Option<String> {
    let name = name.rsplit(['/', '\\']).next()?.trim();
    if name.is_empty() || name == "." || name == ".." {
        return None;
    }
    Some(name.to_string())
}
