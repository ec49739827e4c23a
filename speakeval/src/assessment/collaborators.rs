//! Boundaries to the external speech-to-text and structured-generation services.

use crate::errors::CollaboratorError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt::Debug;
use std::path::Path;

/// Result of a speech-to-text call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transcription {
    /// Transcribed text.
    pub text: String,
    /// Audio length in seconds.
    pub duration: f64,
}

impl Transcription {
    /// Creates a transcription.
    #[must_use]
    pub fn new(text: impl Into<String>, duration: f64) -> Self {
        Self {
            text: text.into(),
            duration,
        }
    }
}

/// A request for JSON output matching `schema`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StructuredRequest {
    /// System prompt.
    pub system: String,
    /// User prompt.
    pub user: String,
    /// Name of the schema, as sent to the service.
    pub schema_name: String,
    /// JSON schema the response must follow.
    pub schema: serde_json::Value,
}

impl StructuredRequest {
    /// Creates a request.
    #[must_use]
    pub fn new(
        system: impl Into<String>,
        user: impl Into<String>,
        schema_name: impl Into<String>,
        schema: serde_json::Value,
    ) -> Self {
        Self {
            system: system.into(),
            user: user.into(),
            schema_name: schema_name.into(),
            schema,
        }
    }
}

/// Converts recorded speech to text.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Transcriber: Send + Sync + Debug {
    /// Transcribes the audio file at `path`.
    ///
    /// # Errors
    ///
    /// Returns `CollaboratorError::NotFound` if the file does not exist, or
    /// any error raised by the service.
    async fn transcribe(&self, path: &Path) -> Result<Transcription, CollaboratorError>;
}

/// Produces JSON that follows a schema.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait LanguageModel: Send + Sync + Debug {
    /// Runs one structured-output call.
    ///
    /// # Errors
    ///
    /// Returns an error if the service fails or the answer is not JSON.
    async fn generate(&self, request: StructuredRequest) -> Result<serde_json::Value, CollaboratorError>;
}
