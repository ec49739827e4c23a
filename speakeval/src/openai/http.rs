//! Shared HTTP client with bounded retries.

use super::ModelConfig;
use crate::errors::CollaboratorError;
use reqwest::{Client, RequestBuilder};
use tracing::{debug, warn};

const MAX_ERROR_BODY: usize = 512;

/// Authenticated client for the OpenAI REST API.
#[derive(Debug, Clone)]
pub struct OpenAiClient {
    http: Client,
    config: ModelConfig,
}

impl OpenAiClient {
    /// Creates a client.
    ///
    /// # Errors
    ///
    /// Returns `CollaboratorError::Config` if the HTTP client cannot be built.
    pub fn new(config: ModelConfig) -> Result<Self, CollaboratorError> {
        let http = Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| CollaboratorError::Config(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { http, config })
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> &ModelConfig {
        &self.config
    }

    /// Sends the request produced by `build` and decodes the JSON body,
    /// retrying transient failures.
    ///
    /// `build` is called once per attempt.
    ///
    /// # Errors
    ///
    /// Returns the last error once retries are exhausted, or the first
    /// non-transient error.
    pub async fn send_json<F>(&self, operation: &str, build: F) -> Result<serde_json::Value, CollaboratorError>
    where
        F: Fn(&Client) -> RequestBuilder,
    {
        let retry = &self.config.retry;
        let mut attempt = 0;
        loop {
            let request = build(&self.http).bearer_auth(&self.config.api_key);
            match send_once(request).await {
                Err(e) if e.is_transient() && attempt < retry.max_retries => {
                    let delay = retry.delay_for_attempt(attempt);
                    warn!(
                        operation,
                        attempt = attempt + 1,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Retrying after error"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
                Ok(value) => {
                    debug!(operation, attempts = attempt + 1, "Request succeeded");
                    return Ok(value);
                }
            }
        }
    }
}

async fn send_once(request: RequestBuilder) -> Result<serde_json::Value, CollaboratorError> {
    let response = request
        .send()
        .await
        .map_err(|e| CollaboratorError::Transport(e.to_string()))?;
    let status = response.status();
    let body = response
        .text()
        .await
        .map_err(|e| CollaboratorError::Transport(e.to_string()))?;

    if !status.is_success() {
        return Err(CollaboratorError::Http {
            status: status.as_u16(),
            body: truncate(&body, MAX_ERROR_BODY),
        });
    }
    Ok(serde_json::from_str(&body)?)
}

fn truncate(body: &str, max_chars: usize) -> String {
    if body.chars().count() <= max_chars {
        body.to_string()
    } else {
        let mut cut: String = body.chars().take(max_chars).collect();
        cut.push_str("...");
        cut
    }
}
