//! Speaking assessment built on the stage engine.
//!
//! The standard graph transcribes the recording, fans out into four
//! section analyses (fluency, pronunciation, grammar, vocabulary) and folds
//! them into one report:
//!
//! ```text
//! transcribe ─┬─ analyze_fluency ───────┬─ generate_feedback
//!             ├─ analyze_pronunciation ─┤
//!             ├─ analyze_grammar ───────┤
//!             └─ analyze_vocabulary ────┘
//! ```

mod aggregate;
mod analysis;
pub mod collaborators;
pub mod feedback;
pub mod prompts;
mod transcribe;

pub use aggregate::FeedbackStage;
pub use analysis::{speaking_rate, AnalysisStage, Section};
pub use collaborators::{LanguageModel, StructuredRequest, Transcriber, Transcription};
pub use feedback::{
    ErrorDetail, EvaluationDetail, FeedbackVerdict, FinalReport, ReportDetails, SectionFeedback,
};
pub use transcribe::TranscribeStage;

use crate::core::FieldMap;
use crate::errors::GraphValidationError;
use crate::pipeline::{GraphBuilder, StageGraph};
use std::path::Path;
use std::sync::Arc;

/// Result context field names.
pub mod fields {
    /// Path of the uploaded recording. Seeded by the caller.
    pub const AUDIO_PATH: &str = "audio_path";
    /// Transcribed text.
    pub const TRANSCRIPT: &str = "transcript";
    /// Recording length in seconds.
    pub const DURATION: &str = "duration";
    /// Fluency and coherence analysis.
    pub const FLUENCY_ANALYSIS: &str = "fluency_analysis";
    /// Pronunciation analysis.
    pub const PRONUNCIATION_ANALYSIS: &str = "pronunciation_analysis";
    /// Grammar analysis.
    pub const GRAMMAR_ANALYSIS: &str = "grammar_analysis";
    /// Vocabulary analysis.
    pub const VOCABULARY_ANALYSIS: &str = "vocabulary_analysis";
    /// The aggregated report.
    pub const FINAL_FEEDBACK: &str = "final_feedback";
}

/// Stage names of the standard graph.
pub mod stage_names {
    /// Entry stage.
    pub const TRANSCRIBE: &str = "transcribe";
    /// Fluency fan-out stage.
    pub const ANALYZE_FLUENCY: &str = "analyze_fluency";
    /// Pronunciation fan-out stage.
    pub const ANALYZE_PRONUNCIATION: &str = "analyze_pronunciation";
    /// Grammar fan-out stage.
    pub const ANALYZE_GRAMMAR: &str = "analyze_grammar";
    /// Vocabulary fan-out stage.
    pub const ANALYZE_VOCABULARY: &str = "analyze_vocabulary";
    /// Aggregation stage.
    pub const GENERATE_FEEDBACK: &str = "generate_feedback";
}

/// Name of the standard graph.
pub const GRAPH_NAME: &str = "speaking_feedback";

/// Builds the standard six-stage assessment graph.
///
/// # Errors
///
/// Returns an error only if the stage contracts are inconsistent, which
/// would be a bug in this module.
pub fn default_graph(
    transcriber: Arc<dyn Transcriber>,
    model: Arc<dyn LanguageModel>,
) -> Result<StageGraph, GraphValidationError> {
    let mut builder = GraphBuilder::new(GRAPH_NAME).entry(Arc::new(TranscribeStage::new(transcriber)))?;
    for section in Section::ALL {
        builder = builder.fan_out(Arc::new(AnalysisStage::new(section, model.clone())))?;
    }
    builder.aggregate(Arc::new(FeedbackStage::new(model)))?.build()
}

/// Initial context for one recording.
#[must_use]
pub fn initial_context(audio_path: &Path) -> FieldMap {
    FieldMap::from([(
        fields::AUDIO_PATH.to_string(),
        serde_json::json!(audio_path.to_string_lossy()),
    )])
}
