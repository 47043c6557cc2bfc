//! HTTP surface for the audit assistant.
//!
//! - `GET /health` – Liveness plus whether the RAG components are ready. Never triggers
//!   initialization.
//! - `POST /predict` – Multipart upload (field `file`, `pdf`/`docx`/`txt`). The file is staged in
//!   a per-request temp workspace, processed, and answered against the fixed analysis questions.
//! - `POST /query` – JSON `{ "query": "..." }` answered against the last processed document.
//!
//! Every error is a JSON body carrying at least an `error` field.

use crate::analysis::{
    AnalysisApi, AnalysisError, AnalysisResult, NO_DOCUMENTS_MESSAGE, QueryOutcome,
    SETUP_INSTRUCTIONS, SETUP_MESSAGE,
};
use crate::intake::{IntakeError, UploadedFile, validate};
use crate::workspace::TempWorkspace;
use axum::{
    Json, Router,
    body::Bytes,
    extract::{
        DefaultBodyLimit, Multipart, State,
        multipart::{MultipartError, MultipartRejection},
        rejection::BytesRejection,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::Serialize;
use serde_json::{Value, json};
use std::path::PathBuf;
use std::sync::Arc;

/// Limits and placement for staged uploads.
#[derive(Debug, Clone)]
pub struct UploadSettings {
    /// Maximum accepted request body size in bytes.
    pub max_bytes: usize,
    /// Parent directory for temp workspaces; the system temp dir when `None`.
    pub temp_root: Option<PathBuf>,
}

struct ApiState<S> {
    service: Arc<S>,
    uploads: Arc<UploadSettings>,
}

impl<S> Clone for ApiState<S> {
    fn clone(&self) -> Self {
        Self {
            service: self.service.clone(),
            uploads: self.uploads.clone(),
        }
    }
}

/// Build the HTTP router exposing the health, upload and query endpoints.
pub fn create_router<S>(service: Arc<S>, uploads: UploadSettings) -> Router
where
    S: AnalysisApi + 'static,
{
    let body_limit = uploads.max_bytes;
    Router::new()
        .route("/health", get(health::<S>))
        .route("/predict", post(predict::<S>))
        .route("/query", post(query::<S>))
        .layer(DefaultBodyLimit::max(body_limit))
        .with_state(ApiState {
            service,
            uploads: Arc::new(uploads),
        })
}

/// Response body for `GET /health`.
#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    message: &'static str,
    rag_initialized: bool,
}

async fn health<S>(State(state): State<ApiState<S>>) -> Json<HealthResponse>
where
    S: AnalysisApi,
{
    Json(HealthResponse {
        status: "healthy",
        message: "Server is running",
        rag_initialized: state.service.is_ready().await,
    })
}

/// Success body for `POST /predict`.
#[derive(Serialize)]
struct PredictResponse {
    success: bool,
    message: String,
    filename: String,
    analysis: AnalysisResult,
    document_processed: bool,
}

/// Validate, stage and analyze an uploaded document.
///
/// Intake errors return before anything touches disk. Once staged, the workspace is cleaned
/// up whether analysis succeeds or fails; dropping it covers cancellation and panics.
async fn predict<S>(
    State(state): State<ApiState<S>>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<PredictResponse>, ApiError>
where
    S: AnalysisApi,
{
    let mut multipart = multipart.map_err(|rejection| {
        tracing::debug!(error = %rejection, "Request is not a multipart upload");
        IntakeError::MissingFile
    })?;
    let upload = read_upload(&mut multipart, state.uploads.max_bytes).await?;

    let mut workspace = TempWorkspace::stage(
        state.uploads.temp_root.as_deref(),
        &upload.sanitized_name,
        &upload.bytes,
    )
    .await
    .map_err(|err| AnalysisError::Unexpected(format!("Failed to store upload: {err}")))?;

    let outcome = state
        .service
        .analyze_document(workspace.file_path(), &upload.sanitized_name)
        .await;
    workspace.cleanup();
    let result = outcome?;

    tracing::info!(
        filename = %result.filename,
        original = %upload.original_name,
        "Predict request completed"
    );
    Ok(Json(PredictResponse {
        success: true,
        message: result.message,
        filename: result.filename,
        analysis: result.analysis,
        document_processed: true,
    }))
}

/// Pull the `file` part out of the multipart stream and validate it.
///
/// Parts with other names, and `file` parts without a filename, are skipped.
async fn read_upload(multipart: &mut Multipart, limit: usize) -> Result<UploadedFile, IntakeError> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|err| multipart_error(err, limit))?
    {
        if field.name() != Some("file") {
            continue;
        }
        let Some(file_name) = field.file_name().map(str::to_string) else {
            continue;
        };

        let extension = validate(Some(&file_name))?;
        let bytes = field
            .bytes()
            .await
            .map_err(|err| multipart_error(err, limit))?;
        return Ok(UploadedFile::new(&file_name, extension, bytes.to_vec()));
    }
    Err(IntakeError::MissingFile)
}

fn multipart_error(err: MultipartError, limit: usize) -> IntakeError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        IntakeError::PayloadTooLarge { limit }
    } else {
        IntakeError::MalformedBody(err.body_text())
    }
}

/// Body for `POST /query` outcomes that are not errors.
#[derive(Serialize)]
struct QueryResponse {
    success: bool,
    message: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    query: Option<String>,
    response: String,
}

/// Answer a caller-supplied question against the last processed document.
///
/// An over-limit body is rejected with 413. Any other unreadable body counts as carrying no
/// query.
async fn query<S>(
    State(state): State<ApiState<S>>,
    body: Result<Bytes, BytesRejection>,
) -> Result<Json<QueryResponse>, ApiError>
where
    S: AnalysisApi,
{
    let body = match body {
        Ok(body) => body,
        Err(rejection) if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE => {
            return Err(ApiError::BodyTooLarge {
                limit: state.uploads.max_bytes,
            });
        }
        Err(rejection) => {
            tracing::debug!(error = %rejection, "Unreadable query body");
            Bytes::new()
        }
    };
    let text = query_text(&body);
    let outcome = state.service.answer_query(text.as_deref()).await?;

    Ok(Json(match outcome {
        QueryOutcome::NoDocuments => QueryResponse {
            success: false,
            message: NO_DOCUMENTS_MESSAGE,
            query: None,
            response: String::new(),
        },
        QueryOutcome::Answered { query, response } => QueryResponse {
            success: true,
            message: "Query processed successfully",
            query: Some(query),
            response,
        },
    }))
}

/// The `query` string of a JSON object body; `None` for anything else.
fn query_text(body: &[u8]) -> Option<String> {
    match serde_json::from_slice::<Value>(body).ok()? {
        Value::Object(mut fields) => match fields.remove("query") {
            Some(Value::String(text)) => Some(text),
            _ => None,
        },
        _ => None,
    }
}

enum ApiError {
    Intake(IntakeError),
    Analysis(AnalysisError),
    BodyTooLarge { limit: usize },
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::Intake(err) => {
                let status = match err {
                    IntakeError::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
                    _ => StatusCode::BAD_REQUEST,
                };
                tracing::debug!(error = %err, %status, "Rejected upload");
                (status, Json(json!({ "error": err.to_string() }))).into_response()
            }
            ApiError::BodyTooLarge { limit } => (
                StatusCode::PAYLOAD_TOO_LARGE,
                Json(json!({
                    "error": format!("Request body exceeds the maximum allowed size of {limit} bytes")
                })),
            )
                .into_response(),
            ApiError::Analysis(AnalysisError::EmptyQuery) => (
                StatusCode::BAD_REQUEST,
                Json(json!({ "error": AnalysisError::EmptyQuery.to_string() })),
            )
                .into_response(),
            ApiError::Analysis(err @ AnalysisError::NotInitialized) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({
                    "success": false,
                    "error": err.to_string(),
                    "message": SETUP_MESSAGE,
                    "instructions": SETUP_INSTRUCTIONS,
                })),
            )
                .into_response(),
            ApiError::Analysis(err) => {
                tracing::error!(error = %err, "Request failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({ "error": err.to_string() })),
                )
                    .into_response()
            }
        }
    }
}

impl From<IntakeError> for ApiError {
    fn from(inner: IntakeError) -> Self {
        Self::Intake(inner)
    }
}

impl From<AnalysisError> for ApiError {
    fn from(inner: AnalysisError) -> Self {
        Self::Analysis(inner)
    }
}
