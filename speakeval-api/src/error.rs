//! API error type and its HTTP rendering.

use axum::extract::multipart::MultipartError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use speakeval::errors::{EngineError, StageError};

/// API error with HTTP status, machine-readable code and message.
#[derive(Debug)]
pub struct ApiError {
    /// Error code (e.g. `"INVALID_FORMAT"`).
    pub code: &'static str,
    /// Human-readable message.
    pub message: String,
    /// HTTP status code.
    pub status: StatusCode,
    /// Stage responsible, for failed runs.
    pub stage: Option<String>,
}

impl ApiError {
    /// Creates a new API error.
    pub fn new(code: &'static str, message: impl Into<String>, status: StatusCode) -> Self {
        Self {
            code,
            message: message.into(),
            status,
            stage: None,
        }
    }

    /// Creates a 400 Bad Request error.
    pub fn bad_request(code: &'static str, message: impl Into<String>) -> Self {
        Self::new(code, message, StatusCode::BAD_REQUEST)
    }

    /// Creates a 500 Internal Server Error.
    pub fn internal(code: &'static str, message: impl Into<String>) -> Self {
        Self::new(code, message, StatusCode::INTERNAL_SERVER_ERROR)
    }

    /// Creates a 504 Gateway Timeout error.
    pub fn gateway_timeout(message: impl Into<String>) -> Self {
        Self::new("TIMEOUT", message, StatusCode::GATEWAY_TIMEOUT)
    }

    /// Creates a 500 naming the stage that failed the run.
    pub fn stage_failed(error: &StageError) -> Self {
        let message = match &error.cause {
            Some(cause) => format!("{}: {cause}", error.message),
            None => error.message.clone(),
        };
        Self {
            stage: Some(error.stage.clone()),
            ..Self::internal("STAGE_FAILED", message)
        }
    }
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

impl std::error::Error for ApiError {}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let mut error = serde_json::json!({
            "code": self.code,
            "message": self.message,
            "status": self.status.as_u16(),
        });
        if let Some(stage) = self.stage {
            error["stage"] = serde_json::json!(stage);
        }
        (self.status, Json(serde_json::json!({ "error": error }))).into_response()
    }
}

impl From<EngineError> for ApiError {
    fn from(err: EngineError) -> Self {
        Self::internal("ENGINE_ERROR", err.to_string())
    }
}

impl From<MultipartError> for ApiError {
    fn from(err: MultipartError) -> Self {
        Self::new("BAD_UPLOAD", err.body_text(), err.status())
    }
}

impl From<std::io::Error> for ApiError {
    fn from(err: std::io::Error) -> Self {
        Self::internal("UPLOAD_FAILED", format!("failed to store upload: {err}"))
    }
}
