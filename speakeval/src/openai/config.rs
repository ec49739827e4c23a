//! Configuration for the OpenAI-backed collaborators.

use crate::errors::CollaboratorError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Environment variable holding the API key.
pub const API_KEY_VAR: &str = "OPENAI_API_KEY";
/// Environment variable overriding the API base URL.
pub const BASE_URL_VAR: &str = "OPENAI_BASE_URL";
/// Environment variable overriding the chat model.
pub const CHAT_MODEL_VAR: &str = "OPENAI_MODEL";
/// Environment variable overriding the transcription model.
pub const TRANSCRIPTION_MODEL_VAR: &str = "OPENAI_TRANSCRIPTION_MODEL";

/// Connection and model settings.
#[derive(Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// API key. Never serialized.
    #[serde(skip_serializing, default)]
    pub api_key: String,
    /// API base URL, without trailing slash.
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Model used for structured generation.
    #[serde(default = "default_chat_model")]
    pub chat_model: String,
    /// Model used for speech-to-text.
    #[serde(default = "default_transcription_model")]
    pub transcription_model: String,
    /// Sampling temperature.
    #[serde(default)]
    pub temperature: f64,
    /// Per-request timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout_seconds: f64,
    /// Retry policy for transient failures.
    #[serde(default)]
    pub retry: HttpRetryConfig,
}

fn default_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_chat_model() -> String {
    "gpt-4o".to_string()
}

fn default_transcription_model() -> String {
    "whisper-1".to_string()
}

fn default_timeout() -> f64 {
    60.0
}

impl fmt::Debug for ModelConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelConfig")
            .field("api_key", &"<redacted>")
            .field("base_url", &self.base_url)
            .field("chat_model", &self.chat_model)
            .field("transcription_model", &self.transcription_model)
            .field("temperature", &self.temperature)
            .field("timeout_seconds", &self.timeout_seconds)
            .field("retry", &self.retry)
            .finish()
    }
}

impl ModelConfig {
    /// Creates a configuration with default models.
    #[must_use]
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: default_base_url(),
            chat_model: default_chat_model(),
            transcription_model: default_transcription_model(),
            temperature: 0.0,
            timeout_seconds: default_timeout(),
            retry: HttpRetryConfig::default(),
        }
    }

    /// Reads the configuration from the process environment.
    ///
    /// # Errors
    ///
    /// Returns `CollaboratorError::Config` if `OPENAI_API_KEY` is unset or empty.
    pub fn from_env() -> Result<Self, CollaboratorError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Reads the configuration through `lookup`.
    ///
    /// # Errors
    ///
    /// Returns `CollaboratorError::Config` if the API key is missing.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, CollaboratorError> {
        let api_key = lookup(API_KEY_VAR)
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| {
                CollaboratorError::Config(format!("{API_KEY_VAR} not found in environment variables"))
            })?;

        let mut config = Self::new(api_key);
        if let Some(url) = lookup(BASE_URL_VAR).filter(|v| !v.is_empty()) {
            config = config.with_base_url(url);
        }
        if let Some(model) = lookup(CHAT_MODEL_VAR).filter(|v| !v.is_empty()) {
            config.chat_model = model;
        }
        if let Some(model) = lookup(TRANSCRIPTION_MODEL_VAR).filter(|v| !v.is_empty()) {
            config.transcription_model = model;
        }
        Ok(config)
    }

    /// Sets the base URL.
    #[must_use]
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    /// Sets the chat model.
    #[must_use]
    pub fn with_chat_model(mut self, model: impl Into<String>) -> Self {
        self.chat_model = model.into();
        self
    }

    /// Sets the per-request timeout.
    #[must_use]
    pub fn with_timeout(mut self, seconds: f64) -> Self {
        self.timeout_seconds = seconds;
        self
    }

    /// Sets the retry policy.
    #[must_use]
    pub fn with_retry(mut self, retry: HttpRetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Gets timeout as Duration.
    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_secs_f64(self.timeout_seconds.max(0.0))
    }

    /// Joins `path` onto the base URL.
    #[must_use]
    pub fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }
}

/// Retry policy for 429 and 5xx responses and transport errors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HttpRetryConfig {
    /// Retries after the first attempt.
    #[serde(default = "default_max_retries")]
    pub max_retries: usize,
    /// Delay before the first retry, in milliseconds.
    #[serde(default = "default_initial_delay")]
    pub initial_delay_ms: u64,
    /// Backoff multiplier.
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,
    /// Maximum delay between retries, in milliseconds.
    #[serde(default = "default_max_delay")]
    pub max_delay_ms: u64,
}

fn default_max_retries() -> usize {
    2
}

fn default_initial_delay() -> u64 {
    500
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

fn default_max_delay() -> u64 {
    8_000
}

impl Default for HttpRetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            initial_delay_ms: default_initial_delay(),
            backoff_multiplier: default_backoff_multiplier(),
            max_delay_ms: default_max_delay(),
        }
    }
}

impl HttpRetryConfig {
    /// A policy that never retries.
    #[must_use]
    pub fn disabled() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    /// Sets the number of retries.
    #[must_use]
    pub fn with_max_retries(mut self, retries: usize) -> Self {
        self.max_retries = retries;
        self
    }

    /// Calculates the delay before retry number `attempt` (zero-based).
    #[must_use]
    pub fn delay_for_attempt(&self, attempt: usize) -> Duration {
        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
        let delay = self.initial_delay_ms as f64 * self.backoff_multiplier.powi(exponent);
        let capped = delay.min(self.max_delay_ms as f64).max(0.0);
        Duration::from_millis(capped as u64)
    }
}
