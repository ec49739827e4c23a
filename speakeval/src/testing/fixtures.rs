//! Canned model answers and scripted collaborators.

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::json;
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::assessment::{LanguageModel, Section, StructuredRequest, Transcriber, Transcription};
use crate::errors::CollaboratorError;

/// Transcript used by the canned fixtures.
pub const SAMPLE_TRANSCRIPT: &str =
    "Well I usually go hiking at weekends because it help me relax and I enjoy being outdoors";

/// Duration, in seconds, that goes with [`SAMPLE_TRANSCRIPT`].
pub const SAMPLE_DURATION: f64 = 6.0;

/// A well-formed section analysis as the model would return it.
#[must_use]
pub fn sample_section(section: Section) -> serde_json::Value {
    let mut value = json!({
        "score": 6.5,
        "evaluation": [
            {"criteria": "Strengths", "description": format!("Reasonable {}.", section.focus())},
            {"criteria": "Weaknesses", "description": "Some slips under pressure."}
        ],
        "errors": [
            {
                "original": "it help me",
                "suggested": "it helps me",
                "explanation": "Third person singular takes -s."
            }
        ],
        "feedback": format!("Solid {} overall.", section.focus())
    });
    if section.emits_wpm() {
        value["wpm"] = json!(0.0);
    }
    value
}

/// A well-formed aggregation answer.
#[must_use]
pub fn sample_verdict() -> serde_json::Value {
    json!({
        "overall_score": 6.5,
        "general_suggestions": [
            "Practise linking ideas with a wider range of connectives.",
            "Record yourself and check verb agreement."
        ]
    })
}

/// Schema name the analysis stage for `section` sends.
#[must_use]
pub fn section_schema_name(section: Section) -> String {
    format!("{}_feedback", section.key())
}

/// Schema name the aggregation stage sends.
pub const VERDICT_SCHEMA_NAME: &str = "ielts_feedback";

/// A transcriber that returns one fixed answer and records the paths it saw.
#[derive(Debug)]
pub struct ScriptedTranscriber {
    answer: Result<Transcription, CollaboratorError>,
    calls: Mutex<Vec<PathBuf>>,
}

impl ScriptedTranscriber {
    /// Always answers with `text` and `duration`.
    #[must_use]
    pub fn new(text: impl Into<String>, duration: f64) -> Self {
        Self {
            answer: Ok(Transcription::new(text, duration)),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Answers with [`SAMPLE_TRANSCRIPT`].
    #[must_use]
    pub fn sample() -> Self {
        Self::new(SAMPLE_TRANSCRIPT, SAMPLE_DURATION)
    }

    /// Always fails with `error`.
    #[must_use]
    pub fn failing(error: CollaboratorError) -> Self {
        Self {
            answer: Err(error),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Returns how many times the service was called.
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }

    /// Returns the paths passed in, in call order.
    #[must_use]
    pub fn paths(&self) -> Vec<PathBuf> {
        self.calls.lock().clone()
    }
}

#[async_trait]
impl Transcriber for ScriptedTranscriber {
    async fn transcribe(&self, path: &Path) -> Result<Transcription, CollaboratorError> {
        self.calls.lock().push(path.to_path_buf());
        self.answer.clone()
    }
}

/// A language model that answers by schema name.
///
/// Unscripted schema names get the matching canned fixture: section
/// schemas get [`sample_section`], the aggregation schema gets
/// [`sample_verdict`].
#[derive(Debug, Default)]
pub struct ScriptedModel {
    answers: BTreeMap<String, serde_json::Value>,
    failures: BTreeMap<String, CollaboratorError>,
    delays: BTreeMap<String, Duration>,
    requests: Mutex<Vec<StructuredRequest>>,
}

impl ScriptedModel {
    /// Creates a model answering every schema with its canned fixture.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Answers `schema_name` with `value`.
    #[must_use]
    pub fn answering(mut self, schema_name: impl Into<String>, value: serde_json::Value) -> Self {
        self.answers.insert(schema_name.into(), value);
        self
    }

    /// Fails every request for `schema_name`.
    #[must_use]
    pub fn failing(mut self, schema_name: impl Into<String>, error: CollaboratorError) -> Self {
        self.failures.insert(schema_name.into(), error);
        self
    }

    /// Waits `delay` before answering `schema_name`.
    #[must_use]
    pub fn delaying(mut self, schema_name: impl Into<String>, delay: Duration) -> Self {
        self.delays.insert(schema_name.into(), delay);
        self
    }

    /// Returns every request received, in arrival order.
    #[must_use]
    pub fn requests(&self) -> Vec<StructuredRequest> {
        self.requests.lock().clone()
    }

    /// Returns the schema names requested, deduplicated.
    #[must_use]
    pub fn schemas_requested(&self) -> BTreeSet<String> {
        self.requests.lock().iter().map(|r| r.schema_name.clone()).collect()
    }

    /// Returns how many requests named `schema_name`.
    #[must_use]
    pub fn call_count(&self, schema_name: &str) -> usize {
        self.requests
            .lock()
            .iter()
            .filter(|r| r.schema_name == schema_name)
            .count()
    }

    fn canned(schema_name: &str) -> Option<serde_json::Value> {
        if schema_name == VERDICT_SCHEMA_NAME {
            return Some(sample_verdict());
        }
        Section::ALL
            .into_iter()
            .find(|s| section_schema_name(*s) == schema_name)
            .map(sample_section)
    }
}

#[async_trait]
impl LanguageModel for ScriptedModel {
    async fn generate(&self, request: StructuredRequest) -> Result<serde_json::Value, CollaboratorError> {
        let schema_name = request.schema_name.clone();
        self.requests.lock().push(request);

        if let Some(delay) = self.delays.get(&schema_name) {
            tokio::time::sleep(*delay).await;
        }
        if let Some(error) = self.failures.get(&schema_name) {
            return Err(error.clone());
        }
        self.answers
            .get(&schema_name)
            .cloned()
            .or_else(|| Self::canned(&schema_name))
            .ok_or_else(|| CollaboratorError::invalid_response(format!("no answer scripted for {schema_name}")))
    }
}
