//! The four fan-out analysis stages.

use super::collaborators::{LanguageModel, StructuredRequest};
use super::feedback::{section_schema, SectionFeedback};
use super::{fields, prompts, stage_names};
use crate::context::ContextProjection;
use crate::core::StageOutcome;
use crate::errors::{CollaboratorError, StageError};
use crate::stages::{Stage, StageContract};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// An IELTS speaking criterion, one per fan-out stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Section {
    /// Fluency and coherence.
    Fluency,
    /// Pronunciation.
    Pronunciation,
    /// Grammatical range and accuracy.
    Grammar,
    /// Lexical resource.
    Vocabulary,
}

impl Section {
    /// Every section, in report order.
    pub const ALL: [Self; 4] = [Self::Fluency, Self::Pronunciation, Self::Grammar, Self::Vocabulary];

    /// Key of the section in the report's `details`.
    #[must_use]
    pub fn key(&self) -> &'static str {
        match self {
            Self::Fluency => "fluency",
            Self::Pronunciation => "pronunciation",
            Self::Grammar => "grammar",
            Self::Vocabulary => "vocabulary",
        }
    }

    /// Name of the stage that analyzes this section.
    #[must_use]
    pub fn stage_name(&self) -> &'static str {
        match self {
            Self::Fluency => stage_names::ANALYZE_FLUENCY,
            Self::Pronunciation => stage_names::ANALYZE_PRONUNCIATION,
            Self::Grammar => stage_names::ANALYZE_GRAMMAR,
            Self::Vocabulary => stage_names::ANALYZE_VOCABULARY,
        }
    }

    /// Context field the stage writes.
    #[must_use]
    pub fn output_field(&self) -> &'static str {
        match self {
            Self::Fluency => fields::FLUENCY_ANALYSIS,
            Self::Pronunciation => fields::PRONUNCIATION_ANALYSIS,
            Self::Grammar => fields::GRAMMAR_ANALYSIS,
            Self::Vocabulary => fields::VOCABULARY_ANALYSIS,
        }
    }

    /// Name of the IELTS criterion.
    #[must_use]
    pub fn focus(&self) -> &'static str {
        match self {
            Self::Fluency => "Fluency and Coherence",
            Self::Pronunciation => "Pronunciation",
            Self::Grammar => "Grammatical Range and Accuracy",
            Self::Vocabulary => "Lexical Resource",
        }
    }

    /// Short heading used in the aggregation prompt.
    #[must_use]
    pub fn title(&self) -> &'static str {
        match self {
            Self::Fluency => "Fluency",
            Self::Pronunciation => "Pronunciation",
            Self::Grammar => "Grammar",
            Self::Vocabulary => "Vocabulary",
        }
    }

    pub(crate) fn error_hint(&self) -> &'static str {
        match self {
            Self::Fluency => "List of fluency issues found (hesitations, repetitions, self-corrections)",
            Self::Pronunciation => "List of words or phrases likely to be mispronounced or unclear",
            Self::Grammar => "List of grammatical errors found",
            Self::Vocabulary => "List of words or phrases that could be replaced by better synonyms or idioms",
        }
    }

    /// Returns true if the section's prompt includes duration and speaking rate.
    #[must_use]
    pub fn uses_timing(&self) -> bool {
        matches!(self, Self::Fluency | Self::Pronunciation)
    }

    /// Returns true if the section's feedback carries `wpm`.
    #[must_use]
    pub fn emits_wpm(&self) -> bool {
        matches!(self, Self::Fluency)
    }
}

impl fmt::Display for Section {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// Words per minute, or 0 when the duration is not positive.
#[must_use]
pub fn speaking_rate(transcript: &str, duration: f64) -> f64 {
    if duration > 0.0 {
        transcript.split_whitespace().count() as f64 / duration * 60.0
    } else {
        0.0
    }
}

/// Asks the model to assess one section of the transcript.
#[derive(Debug, Clone)]
pub struct AnalysisStage {
    section: Section,
    model: Arc<dyn LanguageModel>,
}

impl AnalysisStage {
    /// Creates an analysis stage for `section`.
    #[must_use]
    pub fn new(section: Section, model: Arc<dyn LanguageModel>) -> Self {
        Self { section, model }
    }

    /// Returns the analyzed section.
    #[must_use]
    pub fn section(&self) -> Section {
        self.section
    }

    async fn analyze(&self, ctx: &ContextProjection) -> Result<SectionFeedback, StageError> {
        let stage = self.section.stage_name();
        let transcript = ctx.text(fields::TRANSCRIPT)?.unwrap_or_default();
        let duration = if self.section.uses_timing() {
            ctx.number(fields::DURATION)?.unwrap_or(0.0)
        } else {
            0.0
        };
        let wpm = speaking_rate(transcript, duration);

        let request = StructuredRequest::new(
            prompts::section_system(self.section),
            prompts::section_user(self.section, transcript, duration, wpm),
            format!("{}_feedback", self.section.key()),
            section_schema(self.section.emits_wpm()),
        );
        debug!(stage, section = %self.section, wpm, "Requesting section analysis");

        let value = self
            .model
            .generate(request)
            .await
            .map_err(|e| StageError::from_collaborator(stage, &e))?;

        let mut feedback: SectionFeedback = serde_json::from_value(value)
            .map_err(|e| StageError::from_collaborator(stage, &CollaboratorError::from(e)))?;
        feedback.wpm = self.section.emits_wpm().then_some(wpm);
        feedback
            .validate()
            .map_err(|e| StageError::from_collaborator(stage, &e))?;
        Ok(feedback)
    }
}

#[async_trait]
impl Stage for AnalysisStage {
    fn name(&self) -> &str {
        self.section.stage_name()
    }

    fn contract(&self) -> StageContract {
        let contract = StageContract::new()
            .requires([fields::TRANSCRIPT])
            .produces([self.section.output_field()]);
        if self.section.uses_timing() {
            contract.reads([fields::DURATION])
        } else {
            contract
        }
    }

    async fn run(&self, ctx: &ContextProjection) -> StageOutcome {
        let feedback = match self.analyze(ctx).await {
            Ok(feedback) => feedback,
            Err(e) => return StageOutcome::from(e),
        };
        match serde_json::to_value(&feedback) {
            Ok(value) => StageOutcome::completed_value(self.section.output_field(), value),
            Err(e) => StageOutcome::from(
                StageError::new(self.name(), "could not encode feedback").with_cause(e.to_string()),
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assessment::collaborators::MockLanguageModel;
    use crate::context::ResultContext;
    use serde_json::json;

    fn model_answer() -> serde_json::Value {
        json!({
            "score": 6.5,
            "evaluation": [{"criteria": "Strengths", "description": "Clear ideas"}],
            "errors": [],
            "feedback": "Mostly fluent.",
            "wpm": 999.0
        })
    }

    fn project(stage: &AnalysisStage, ctx: &ResultContext) -> ContextProjection {
        let contract = stage.contract();
        ctx.project(stage.name(), &contract.required_inputs, &contract.optional_inputs)
    }

    fn context() -> ResultContext {
        ResultContext::new()
            .with_field(fields::TRANSCRIPT, json!("one two three four five six"))
            .with_field(fields::DURATION, json!(3.0))
    }

    #[test]
    fn test_speaking_rate() {
        assert_eq!(speaking_rate("one two three", 3.0), 60.0);
        assert_eq!(speaking_rate("  one   two ", 60.0), 2.0);
        assert_eq!(speaking_rate("one two", 0.0), 0.0);
        assert_eq!(speaking_rate("one two", -1.0), 0.0);
        assert_eq!(speaking_rate("", 10.0), 0.0);
    }

    #[test]
    fn test_contracts() {
        let model: Arc<dyn LanguageModel> = Arc::new(MockLanguageModel::new());
        let fluency = AnalysisStage::new(Section::Fluency, model.clone()).contract();
        assert!(fluency.optional_inputs.contains(fields::DURATION));
        assert!(fluency.produced_outputs.contains(fields::FLUENCY_ANALYSIS));

        let grammar = AnalysisStage::new(Section::Grammar, model).contract();
        assert!(grammar.optional_inputs.is_empty());
        assert!(grammar.required_inputs.contains(fields::TRANSCRIPT));
    }

    #[tokio::test]
    async fn test_fluency_overwrites_wpm() {
        let mut model = MockLanguageModel::new();
        model
            .expect_generate()
            .withf(|req| req.schema_name == "fluency_feedback" && req.user.contains("120.00"))
            .times(1)
            .returning(|_| Ok(model_answer()));
        let stage = AnalysisStage::new(Section::Fluency, Arc::new(model));

        let outcome = stage.run(&project(&stage, &context())).await;

        let value = outcome.get(fields::FLUENCY_ANALYSIS).unwrap();
        assert_eq!(value["wpm"], json!(120.0));
        assert_eq!(value["score"], json!(6.5));
    }

    #[tokio::test]
    async fn test_other_sections_drop_wpm() {
        let mut model = MockLanguageModel::new();
        model.expect_generate().returning(|_| Ok(model_answer()));
        let stage = AnalysisStage::new(Section::Vocabulary, Arc::new(model));

        let outcome = stage.run(&project(&stage, &context())).await;

        let value = outcome.get(fields::VOCABULARY_ANALYSIS).unwrap();
        assert!(value.get("wpm").is_none());
    }

    #[tokio::test]
    async fn test_invalid_shape_fails() {
        let mut model = MockLanguageModel::new();
        model
            .expect_generate()
            .returning(|_| Ok(json!({"score": 12.0, "evaluation": [], "errors": [], "feedback": "?"})));
        let stage = AnalysisStage::new(Section::Grammar, Arc::new(model));

        let outcome = stage.run(&project(&stage, &context())).await;

        let error = outcome.error().unwrap();
        assert_eq!(error.stage, stage_names::ANALYZE_GRAMMAR);
        assert!(error.message.contains("score must be between"));
    }

    #[tokio::test]
    async fn test_missing_lists_fail() {
        let mut model = MockLanguageModel::new();
        model
            .expect_generate()
            .returning(|_| Ok(json!({"score": 6, "feedback": "ok"})));
        let stage = AnalysisStage::new(Section::Vocabulary, Arc::new(model));

        let outcome = stage.run(&project(&stage, &context())).await;

        assert!(outcome.is_failed());
        let error = outcome.error().unwrap();
        assert_eq!(error.stage, stage_names::ANALYZE_VOCABULARY);
        assert!(error.message.contains("missing field"), "{}", error.message);
    }

    #[tokio::test]
    async fn test_collaborator_failure() {
        let mut model = MockLanguageModel::new();
        model.expect_generate().returning(|_| {
            Err(CollaboratorError::Http {
                status: 500,
                body: "upstream".to_string(),
            })
        });
        let stage = AnalysisStage::new(Section::Pronunciation, Arc::new(model));

        let outcome = stage.run(&project(&stage, &context())).await;

        assert!(outcome.is_failed());
        assert_eq!(outcome.error().unwrap().message, "collaborator call failed");
    }
}
