//! HTTP transport.
//!
//! `POST /api/v1/chat` takes a JSON [`AskRequest`]; `POST /api/v1/chat/upload`
//! takes a multipart form with a `question` field and an optional `image`
//! file, then follows the same path.

use std::sync::Arc;

use axum::{
    extract::{DefaultBodyLimit, Multipart, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::post,
    Router,
};
use base64::Engine;
use serde::{Deserialize, Serialize};

use docvqa_core::{AskRequest, AskResponse};
use docvqa_runtime::{Orchestrator, RuntimeError};

/// Scanned pages are large; axum's default body limit is 2 MB.
const MAX_UPLOAD_BYTES: usize = 20 * 1024 * 1024;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<Orchestrator>,
}

impl AppState {
    pub fn new(orchestrator: Orchestrator) -> Self {
        Self {
            orchestrator: Arc::new(orchestrator),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

#[derive(Debug)]
pub enum AppError {
    /// Malformed or incomplete request
    BadRequest(String),
    /// The request could not be answered
    Runtime(RuntimeError),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AppError::BadRequest(message) => (StatusCode::BAD_REQUEST, message),
            AppError::Runtime(e) if e.is_collaborator_failure() => {
                tracing::error!(error = %e, "Collaborator failure");
                (StatusCode::BAD_GATEWAY, e.to_string())
            }
            AppError::Runtime(e) => {
                tracing::error!(error = %e, "Request failed");
                (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
            }
        };

        (status, Json(ErrorResponse { error: message })).into_response()
    }
}

impl From<RuntimeError> for AppError {
    fn from(e: RuntimeError) -> Self {
        AppError::Runtime(e)
    }
}

/// POST /api/v1/chat
async fn chat(
    State(state): State<AppState>,
    Json(request): Json<AskRequest>,
) -> Result<Json<AskResponse>, AppError> {
    answer(&state, request).await
}

/// POST /api/v1/chat/upload
async fn chat_upload(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<AskResponse>, AppError> {
    let mut question = None;
    let mut image = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::BadRequest(e.to_string()))?
    {
        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some("question") => {
                let text = field
                    .text()
                    .await
                    .map_err(|e| AppError::BadRequest(e.to_string()))?;
                question = Some(text);
            }
            Some("image") => {
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| AppError::BadRequest(e.to_string()))?;
                if !bytes.is_empty() {
                    image = Some(base64::engine::general_purpose::STANDARD.encode(&bytes));
                }
            }
            _ => {}
        }
    }

    let question =
        question.ok_or_else(|| AppError::BadRequest("Missing 'question' field".to_string()))?;

    let mut request = AskRequest::question(question);
    request.image_base64 = image;
    answer(&state, request).await
}

async fn answer(state: &AppState, request: AskRequest) -> Result<Json<AskResponse>, AppError> {
    if request.question.trim().is_empty() {
        return Err(AppError::BadRequest("Question must not be empty".to_string()));
    }

    let (response, report) = state.orchestrator.ask(request).await?;
    tracing::info!(
        request_id = %report.request_id,
        outcome = ?report.outcome,
        steps = report.path.len(),
        tokens = report.total_tokens,
        elapsed_ms = report.elapsed_ms,
        "Request complete"
    );

    Ok(Json(response))
}

/// Create the axum router with all routes
pub fn create_router(state: AppState) -> Router {
    let api = Router::new()
        .route("/chat", post(chat))
        .route("/chat/upload", post(chat_upload));

    Router::new()
        .nest("/api/v1", api)
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .with_state(state)
}

/// Bind and serve until the process is stopped.
pub async fn serve(state: AppState, addr: &str) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(addr, "Listening");
    axum::serve(listener, create_router(state)).await
}
