//! HTTP routes.

use crate::error::ApiError;
use crate::state::AppState;
use axum::extract::{DefaultBodyLimit, Multipart, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::json;
use speakeval::assessment::{fields, initial_context};
use speakeval::context::RunIdentity;
use speakeval::pipeline::{RunOutcome, RunReport};
use tempfile::NamedTempFile;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};
use uuid::Uuid;

/// Name of the service reported by the health check.
pub const SERVICE_NAME: &str = "IELTS Speaking Feedback API";

/// Accepted upload suffixes, compared case-insensitively.
pub const AUDIO_EXTENSIONS: [&str; 4] = [".mp3", ".wav", ".m4a", ".ogg"];

/// Multipart field carrying the recording.
pub const FILE_FIELD: &str = "file";

/// Builds the application router.
pub fn router(state: AppState, max_upload_bytes: usize) -> Router {
    Router::new()
        .route("/", get(health))
        .route("/process/speaking", post(process_speaking))
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Returns `true` if `file_name` ends with an accepted audio suffix.
pub fn is_audio_file(file_name: &str) -> bool {
    let lower = file_name.to_ascii_lowercase();
    AUDIO_EXTENSIONS.iter().any(|ext| lower.ends_with(ext))
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "healthy", "service": SERVICE_NAME }))
}

struct Upload {
    file_name: String,
    content_type: Option<String>,
    bytes: axum::body::Bytes,
}

async fn read_upload(multipart: &mut Multipart) -> Result<Upload, ApiError> {
    while let Some(field) = multipart.next_field().await? {
        if field.name() != Some(FILE_FIELD) {
            continue;
        }
        let file_name = field.file_name().unwrap_or_default().to_string();
        let content_type = field.content_type().map(str::to_string);
        let bytes = field.bytes().await?;
        return Ok(Upload {
            file_name,
            content_type,
            bytes,
        });
    }
    Err(ApiError::bad_request(
        "MISSING_FILE",
        format!("Multipart field '{FILE_FIELD}' is required."),
    ))
}

async fn spool(upload: &Upload) -> Result<NamedTempFile, ApiError> {
    let suffix: String = upload
        .file_name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '.' { c } else { '_' })
        .collect();
    let temp = tempfile::Builder::new()
        .prefix("speakeval_")
        .suffix(&format!("_{suffix}"))
        .tempfile()?;
    tokio::fs::write(temp.path(), &upload.bytes).await?;
    Ok(temp)
}

async fn process_speaking(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Response, ApiError> {
    let request_id = Uuid::new_v4().simple().to_string()[..8].to_string();
    let upload = read_upload(&mut multipart).await?;
    info!(
        request_id = %request_id,
        file = %upload.file_name,
        content_type = ?upload.content_type,
        bytes = upload.bytes.len(),
        "Processing audio"
    );

    if !is_audio_file(&upload.file_name) {
        warn!(request_id = %request_id, file = %upload.file_name, "Invalid file format");
        return Err(ApiError::bad_request(
            "INVALID_FORMAT",
            "Invalid file format. Please upload an audio file.",
        ));
    }

    let temp = spool(&upload).await?;
    let identity = RunIdentity::new().with_request_id(request_id.clone());
    let run = state
        .executor()
        .run_with_identity(identity, initial_context(temp.path()));
    let result = tokio::time::timeout(state.request_timeout(), run).await;

    if let Err(e) = temp.close() {
        warn!(request_id = %request_id, error = %e, "Failed to remove uploaded file");
    }

    let report = match result {
        Ok(report) => report?,
        Err(_) => {
            error!(
                request_id = %request_id,
                timeout_secs = state.request_timeout().as_secs(),
                "Assessment timed out"
            );
            return Err(ApiError::gateway_timeout("Assessment did not finish in time."));
        }
    };
    respond(&request_id, &report)
}

fn respond(request_id: &str, report: &RunReport) -> Result<Response, ApiError> {
    match &report.outcome {
        RunOutcome::Completed => {
            let feedback = report.field(fields::FINAL_FEEDBACK).ok_or_else(|| {
                error!(request_id, "No feedback generated");
                ApiError::internal("NO_FEEDBACK", "Failed to generate feedback.")
            })?;
            info!(request_id, duration_ms = report.duration_ms, "Request completed");
            Ok(Json(feedback.clone()).into_response())
        }
        RunOutcome::Skipped { reason } => {
            info!(request_id, reason = %reason, "Nothing to analyze");
            Ok((
                StatusCode::OK,
                Json(json!({
                    "status": "skipped",
                    "message": "Nothing to analyze.",
                    "reason": reason,
                })),
            )
                .into_response())
        }
        RunOutcome::Failed { error } => {
            error!(request_id, stage = %error.stage, error = %error.message, "Assessment failed");
            Err(ApiError::stage_failed(error))
        }
    }
}
