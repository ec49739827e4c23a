//! Structured generation over `/chat/completions`.

use super::OpenAiClient;
use crate::assessment::{LanguageModel, StructuredRequest};
use crate::errors::CollaboratorError;
use async_trait::async_trait;
use serde_json::json;
use std::sync::Arc;

/// Chat-completions-backed [`LanguageModel`] using `json_schema` output.
#[derive(Debug, Clone)]
pub struct OpenAiChatModel {
    client: Arc<OpenAiClient>,
}

impl OpenAiChatModel {
    /// Creates a model sharing `client`.
    #[must_use]
    pub fn new(client: Arc<OpenAiClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl LanguageModel for OpenAiChatModel {
    async fn generate(&self, request: StructuredRequest) -> Result<serde_json::Value, CollaboratorError> {
        let config = self.client.config();
        let url = config.endpoint("chat/completions");
        let body = build_chat_body(&config.chat_model, config.temperature, &request);

        let response = self
            .client
            .send_json(&request.schema_name, |http| http.post(&url).json(&body))
            .await?;
        parse_chat_response(&response)
    }
}

/// Builds the request body.
#[must_use]
pub fn build_chat_body(model: &str, temperature: f64, request: &StructuredRequest) -> serde_json::Value {
    json!({
        "model": model,
        "temperature": temperature,
        "messages": [
            {"role": "system", "content": request.system},
            {"role": "user", "content": request.user}
        ],
        "response_format": {
            "type": "json_schema",
            "json_schema": {
                "name": request.schema_name,
                "strict": true,
                "schema": request.schema
            }
        }
    })
}

/// Decodes the JSON document in the first choice's message.
///
/// # Errors
///
/// Returns `CollaboratorError::InvalidResponse` if the model refused, the
/// message is missing, or its content is not JSON.
pub fn parse_chat_response(response: &serde_json::Value) -> Result<serde_json::Value, CollaboratorError> {
    let message = response
        .pointer("/choices/0/message")
        .ok_or_else(|| CollaboratorError::invalid_response("response has no choices"))?;

    if let Some(refusal) = message.get("refusal").and_then(serde_json::Value::as_str) {
        return Err(CollaboratorError::invalid_response(format!("model refused: {refusal}")));
    }

    let content = message
        .get("content")
        .and_then(serde_json::Value::as_str)
        .ok_or_else(|| CollaboratorError::invalid_response("message has no content"))?;
    Ok(serde_json::from_str(content)?)
}
