//! The entry stage: speech to text.

use super::collaborators::Transcriber;
use super::{fields, stage_names};
use crate::context::ContextProjection;
use crate::core::{FieldMap, StageOutcome};
use crate::errors::{CollaboratorError, StageError};
use crate::stages::{Stage, StageContract};
use async_trait::async_trait;
use serde_json::json;
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

/// Transcribes the recording referenced by `audio_path`.
#[derive(Debug, Clone)]
pub struct TranscribeStage {
    transcriber: Arc<dyn Transcriber>,
}

impl TranscribeStage {
    /// Creates the stage.
    #[must_use]
    pub fn new(transcriber: Arc<dyn Transcriber>) -> Self {
        Self { transcriber }
    }

    async fn transcribe(&self, ctx: &ContextProjection) -> Result<FieldMap, StageError> {
        let stage = stage_names::TRANSCRIBE;
        let audio_path = ctx.text(fields::AUDIO_PATH)?.unwrap_or_default();
        let path = Path::new(audio_path);

        let exists = tokio::fs::try_exists(path).await.unwrap_or(false);
        if !exists {
            return Err(StageError::from_collaborator(
                stage,
                &CollaboratorError::NotFound {
                    path: audio_path.to_string(),
                },
            ));
        }

        let transcription = self
            .transcriber
            .transcribe(path)
            .await
            .map_err(|e| StageError::from_collaborator(stage, &e))?;
        debug!(
            stage,
            chars = transcription.text.len(),
            duration = transcription.duration,
            "Transcribed audio"
        );

        Ok(FieldMap::from([
            (fields::TRANSCRIPT.to_string(), json!(transcription.text)),
            (fields::DURATION.to_string(), json!(transcription.duration)),
        ]))
    }
}

#[async_trait]
impl Stage for TranscribeStage {
    fn name(&self) -> &str {
        stage_names::TRANSCRIBE
    }

    fn contract(&self) -> StageContract {
        StageContract::new()
            .requires([fields::AUDIO_PATH])
            .produces([fields::TRANSCRIPT, fields::DURATION])
    }

    async fn run(&self, ctx: &ContextProjection) -> StageOutcome {
        match self.transcribe(ctx).await {
            Ok(data) => StageOutcome::completed(data),
            Err(e) => StageOutcome::from(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assessment::collaborators::{MockTranscriber, Transcription};
    use crate::context::ResultContext;
    use std::io::Write;

    fn project(stage: &TranscribeStage, path: &str) -> ContextProjection {
        let contract = stage.contract();
        ResultContext::new()
            .with_field(fields::AUDIO_PATH, json!(path))
            .project(stage.name(), &contract.required_inputs, &contract.optional_inputs)
    }

    #[tokio::test]
    async fn test_transcribes_existing_file() {
        let mut file = tempfile::Builder::new().suffix(".wav").tempfile().unwrap();
        file.write_all(b"RIFF").unwrap();
        let path = file.path().to_string_lossy().to_string();

        let mut transcriber = MockTranscriber::new();
        transcriber
            .expect_transcribe()
            .times(1)
            .returning(|_| Ok(Transcription::new("I like reading books", 2.5)));
        let stage = TranscribeStage::new(Arc::new(transcriber));

        let outcome = stage.run(&project(&stage, &path)).await;

        assert_eq!(outcome.get(fields::TRANSCRIPT), Some(&json!("I like reading books")));
        assert_eq!(outcome.get(fields::DURATION), Some(&json!(2.5)));
    }

    #[tokio::test]
    async fn test_missing_file_fails_without_calling_service() {
        let mut transcriber = MockTranscriber::new();
        transcriber.expect_transcribe().times(0);
        let stage = TranscribeStage::new(Arc::new(transcriber));

        let outcome = stage.run(&project(&stage, "/definitely/not/here.wav")).await;

        let error = outcome.error().unwrap();
        assert_eq!(error.stage, stage_names::TRANSCRIBE);
        assert_eq!(error.message, "Audio file not found: /definitely/not/here.wav");
    }

    #[tokio::test]
    async fn test_service_error_is_wrapped() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let path = file.path().to_string_lossy().to_string();

        let mut transcriber = MockTranscriber::new();
        transcriber
            .expect_transcribe()
            .returning(|_| Err(CollaboratorError::Transport("connection reset".to_string())));
        let stage = TranscribeStage::new(Arc::new(transcriber));

        let outcome = stage.run(&project(&stage, &path)).await;

        let error = outcome.error().unwrap();
        assert_eq!(error.message, "collaborator call failed");
        assert!(error.cause.as_deref().unwrap().contains("connection reset"));
    }
}
