//! OpenAI-backed collaborators.
//!
//! Enabled by the `openai` feature (on by default).

mod chat;
mod config;
mod http;
mod transcriber;

pub use chat::{build_chat_body, parse_chat_response, OpenAiChatModel};
pub use config::{
    HttpRetryConfig, ModelConfig, API_KEY_VAR, BASE_URL_VAR, CHAT_MODEL_VAR, TRANSCRIPTION_MODEL_VAR,
};
pub use http::OpenAiClient;
pub use transcriber::{parse_transcription, OpenAiTranscriber};

use crate::assessment::{LanguageModel, Transcriber};
use crate::errors::CollaboratorError;
use std::sync::Arc;

/// Builds a transcriber and a language model sharing one HTTP client.
///
/// # Errors
///
/// Returns an error if the HTTP client cannot be built.
pub fn connect(
    config: ModelConfig,
) -> Result<(Arc<dyn Transcriber>, Arc<dyn LanguageModel>), CollaboratorError> {
    let client = Arc::new(OpenAiClient::new(config)?);
    Ok((
        Arc::new(OpenAiTranscriber::new(client.clone())),
        Arc::new(OpenAiChatModel::new(client)),
    ))
}
