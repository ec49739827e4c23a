//! Speech-to-text over `/audio/transcriptions`.

use super::OpenAiClient;
use crate::assessment::{Transcriber, Transcription};
use crate::errors::CollaboratorError;
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use std::io::ErrorKind;
use std::path::Path;
use std::sync::Arc;

/// Whisper-backed [`Transcriber`].
#[derive(Debug, Clone)]
pub struct OpenAiTranscriber {
    client: Arc<OpenAiClient>,
}

impl OpenAiTranscriber {
    /// Creates a transcriber sharing `client`.
    #[must_use]
    pub fn new(client: Arc<OpenAiClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Transcriber for OpenAiTranscriber {
    async fn transcribe(&self, path: &Path) -> Result<Transcription, CollaboratorError> {
        let bytes = match tokio::fs::read(path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(CollaboratorError::NotFound {
                    path: path.display().to_string(),
                })
            }
            Err(e) => return Err(e.into()),
        };
        let file_name = path
            .file_name()
            .map_or_else(|| "audio".to_string(), |n| n.to_string_lossy().to_string());

        let config = self.client.config();
        let url = config.endpoint("audio/transcriptions");
        let model = config.transcription_model.clone();

        let value = self
            .client
            .send_json("transcription", |http| {
                let part = Part::bytes(bytes.clone()).file_name(file_name.clone());
                let form = Form::new()
                    .text("model", model.clone())
                    .text("response_format", "verbose_json")
                    .part("file", part);
                http.post(&url).multipart(form)
            })
            .await?;

        parse_transcription(&value)
    }
}

/// Extracts text and duration from a `verbose_json` transcription.
///
/// A missing duration reads as 0.
///
/// # Errors
///
/// Returns `CollaboratorError::InvalidResponse` if `text` is missing.
pub fn parse_transcription(value: &serde_json::Value) -> Result<Transcription, CollaboratorError> {
    let text = value
        .get("text")
        .and_then(serde_json::Value::as_str)
        .ok_or_else(|| CollaboratorError::invalid_response("transcription has no text"))?;
    let duration = value
        .get("duration")
        .and_then(serde_json::Value::as_f64)
        .unwrap_or(0.0);
    Ok(Transcription::new(text.trim(), duration))
}
