//! The aggregation stage: composite score report.

use super::collaborators::{LanguageModel, StructuredRequest};
use super::feedback::{verdict_schema, FeedbackVerdict, FinalReport, ReportDetails};
use super::{fields, prompts, stage_names, Section};
use crate::context::ContextProjection;
use crate::core::StageOutcome;
use crate::errors::{CollaboratorError, StageError};
use crate::stages::{Stage, StageContract};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, info};

/// Combines every available section analysis into the final report.
///
/// The model only supplies the overall score and general suggestions;
/// `transcript` and `details` are copied from the context as they are.
#[derive(Debug, Clone)]
pub struct FeedbackStage {
    model: Arc<dyn LanguageModel>,
}

impl FeedbackStage {
    /// Creates the stage.
    #[must_use]
    pub fn new(model: Arc<dyn LanguageModel>) -> Self {
        Self { model }
    }

    async fn aggregate(&self, ctx: &ContextProjection) -> Result<FinalReport, StageError> {
        let stage = stage_names::GENERATE_FEEDBACK;
        let transcript = ctx.text(fields::TRANSCRIPT)?.unwrap_or_default().to_string();

        let mut sections = Vec::with_capacity(Section::ALL.len());
        for section in Section::ALL {
            sections.push((section, ctx.get(section.output_field())?));
        }
        let available = sections.iter().filter(|(_, v)| v.is_some()).count();
        debug!(stage, available, "Aggregating section analyses");

        let request = StructuredRequest::new(
            prompts::FEEDBACK_SYSTEM,
            prompts::feedback_user(&transcript, &sections),
            "ielts_feedback",
            verdict_schema(),
        );
        let value = self
            .model
            .generate(request)
            .await
            .map_err(|e| StageError::from_collaborator(stage, &e))?;
        let verdict: FeedbackVerdict = serde_json::from_value(value)
            .map_err(|e| StageError::from_collaborator(stage, &CollaboratorError::from(e)))?;
        verdict
            .validate()
            .map_err(|e| StageError::from_collaborator(stage, &e))?;

        let section_value = |section: Section| {
            sections
                .iter()
                .find(|(s, _)| *s == section)
                .and_then(|(_, v)| v.cloned())
                .unwrap_or(serde_json::Value::Null)
        };
        let details = ReportDetails {
            fluency: section_value(Section::Fluency),
            pronunciation: section_value(Section::Pronunciation),
            grammar: section_value(Section::Grammar),
            vocabulary: section_value(Section::Vocabulary),
        };

        info!(stage, overall_score = verdict.overall_score, available, "Final report ready");
        Ok(FinalReport {
            overall_score: verdict.overall_score,
            transcript,
            details,
            general_suggestions: verdict.general_suggestions,
        })
    }
}

#[async_trait]
impl Stage for FeedbackStage {
    fn name(&self) -> &str {
        stage_names::GENERATE_FEEDBACK
    }

    fn contract(&self) -> StageContract {
        StageContract::new()
            .requires([fields::TRANSCRIPT])
            .reads(Section::ALL.map(|s| s.output_field()))
            .produces([fields::FINAL_FEEDBACK])
    }

    async fn run(&self, ctx: &ContextProjection) -> StageOutcome {
        let report = match self.aggregate(ctx).await {
            Ok(report) => report,
            Err(e) => return StageOutcome::from(e),
        };
        match serde_json::to_value(&report) {
            Ok(value) => StageOutcome::completed_value(fields::FINAL_FEEDBACK, value),
            Err(e) => StageOutcome::from(
                StageError::new(self.name(), "could not encode report").with_cause(e.to_string()),
            ),
        }
    }
}
