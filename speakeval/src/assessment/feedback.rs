//! Feedback payloads written by the analysis and aggregation stages, and
//! the JSON schemas requested from the language model.

use crate::errors::CollaboratorError;
use serde::{Deserialize, Serialize};
use serde_json::json;

/// Lowest band score.
pub const MIN_SCORE: f64 = 0.0;
/// Highest band score.
pub const MAX_SCORE: f64 = 9.0;

/// One evaluation note (e.g. "Strengths", "Weaknesses", "Improvements").
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationDetail {
    /// Criterion the note is about.
    pub criteria: String,
    /// The note itself.
    pub description: String,
}

/// One concrete issue found in the transcript.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorDetail {
    /// The problematic text.
    pub original: String,
    /// A better alternative.
    pub suggested: String,
    /// Why it is an issue.
    pub explanation: String,
}

/// Assessment of one scoring criterion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SectionFeedback {
    /// Band score, 0 to 9.
    pub score: f64,
    /// Evaluation notes.
    pub evaluation: Vec<EvaluationDetail>,
    /// Issues found.
    pub errors: Vec<ErrorDetail>,
    /// Overall commentary.
    pub feedback: String,
    /// Speaking rate in words per minute. Only the fluency section carries it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wpm: Option<f64>,
}

impl SectionFeedback {
    /// Checks the score range and the speaking rate.
    ///
    /// # Errors
    ///
    /// Returns `CollaboratorError::InvalidResponse` describing the first bad value.
    pub fn validate(&self) -> Result<(), CollaboratorError> {
        check_score("score", self.score)?;
        if let Some(wpm) = self.wpm {
            if !wpm.is_finite() || wpm < 0.0 {
                return Err(CollaboratorError::invalid_response(format!(
                    "wpm must be a non-negative number, got {wpm}"
                )));
            }
        }
        Ok(())
    }
}

/// What the model contributes to the final report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedbackVerdict {
    /// Overall band score, 0 to 9.
    pub overall_score: f64,
    /// General suggestions for improvement.
    pub general_suggestions: Vec<String>,
}

impl FeedbackVerdict {
    /// Checks the score range.
    ///
    /// # Errors
    ///
    /// Returns `CollaboratorError::InvalidResponse` if the score is out of range.
    pub fn validate(&self) -> Result<(), CollaboratorError> {
        check_score("overall_score", self.overall_score)
    }
}

/// Per-section detail of the final report. Missing sections are `null`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReportDetails {
    /// Fluency and coherence.
    pub fluency: serde_json::Value,
    /// Pronunciation.
    pub pronunciation: serde_json::Value,
    /// Grammatical range and accuracy.
    pub grammar: serde_json::Value,
    /// Lexical resource.
    pub vocabulary: serde_json::Value,
}

/// The aggregated report written to `final_feedback`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinalReport {
    /// Overall band score, 0 to 9.
    pub overall_score: f64,
    /// The transcript the report is about.
    pub transcript: String,
    /// The section analyses, unmodified.
    pub details: ReportDetails,
    /// General suggestions for improvement.
    pub general_suggestions: Vec<String>,
}

fn check_score(field: &str, score: f64) -> Result<(), CollaboratorError> {
    if score.is_finite() && (MIN_SCORE..=MAX_SCORE).contains(&score) {
        Ok(())
    } else {
        Err(CollaboratorError::invalid_response(format!(
            "{field} must be between {MIN_SCORE} and {MAX_SCORE}, got {score}"
        )))
    }
}

/// JSON schema for a section analysis.
#[must_use]
pub fn section_schema(with_wpm: bool) -> serde_json::Value {
    let mut properties = json!({
        "score": {"type": "number", "description": "Band score from 0 to 9"},
        "evaluation": {
            "type": "array",
            "items": {
                "type": "object",
                "properties": {
                    "criteria": {"type": "string"},
                    "description": {"type": "string"}
                },
                "required": ["criteria", "description"],
                "additionalProperties": false
            }
        },
        "errors": {
            "type": "array",
            "items": {
                "type": "object",
                "properties": {
                    "original": {"type": "string"},
                    "suggested": {"type": "string"},
                    "explanation": {"type": "string"}
                },
                "required": ["original", "suggested", "explanation"],
                "additionalProperties": false
            }
        },
        "feedback": {"type": "string"}
    });
    let mut required = vec!["score", "evaluation", "errors", "feedback"];
    if with_wpm {
        properties["wpm"] = json!({"type": "number", "description": "Words per minute"});
        required.push("wpm");
    }

    json!({
        "type": "object",
        "properties": properties,
        "required": required,
        "additionalProperties": false
    })
}

/// JSON schema for the aggregation verdict.
#[must_use]
pub fn verdict_schema() -> serde_json::Value {
    json!({
        "type": "object",
        "properties": {
            "overall_score": {"type": "number", "description": "Overall band score from 0 to 9"},
            "general_suggestions": {"type": "array", "items": {"type": "string"}}
        },
        "required": ["overall_score", "general_suggestions"],
        "additionalProperties": false
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_section_decode() {
        let feedback: SectionFeedback = serde_json::from_value(json!({
            "score": 6.5,
            "evaluation": [],
            "errors": [],
            "feedback": "Good range."
        }))
        .unwrap();

        assert!(feedback.wpm.is_none());
        assert!(feedback.validate().is_ok());
        assert_eq!(
            serde_json::to_value(&feedback).unwrap(),
            json!({"score": 6.5, "evaluation": [], "errors": [], "feedback": "Good range."})
        );
    }

    #[test]
    fn test_lists_are_required() {
        let partial = serde_json::from_value::<SectionFeedback>(json!({"score": 6.0, "feedback": "ok"}));
        assert!(partial.unwrap_err().to_string().contains("evaluation"));

        let no_errors = serde_json::from_value::<SectionFeedback>(
            json!({"score": 6.0, "evaluation": [], "feedback": "ok"}),
        );
        assert!(no_errors.unwrap_err().to_string().contains("errors"));

        let verdict = serde_json::from_value::<FeedbackVerdict>(json!({"overall_score": 6.0}));
        assert!(verdict.unwrap_err().to_string().contains("general_suggestions"));
    }

    #[test]
    fn test_score_out_of_range() {
        let feedback = SectionFeedback {
            score: 9.5,
            evaluation: vec![],
            errors: vec![],
            feedback: String::new(),
            wpm: None,
        };
        let err = feedback.validate().unwrap_err();
        assert!(err.to_string().contains("score must be between"));

        let verdict = FeedbackVerdict {
            overall_score: -1.0,
            general_suggestions: vec![],
        };
        assert!(verdict.validate().is_err());
    }

    #[test]
    fn test_negative_wpm_rejected() {
        let feedback = SectionFeedback {
            score: 5.0,
            evaluation: vec![],
            errors: vec![],
            feedback: String::new(),
            wpm: Some(-3.0),
        };
        assert!(feedback.validate().is_err());
    }

    #[test]
    fn test_missing_details_serialize_as_null() {
        let report = FinalReport {
            overall_score: 6.0,
            transcript: "hello".to_string(),
            details: ReportDetails {
                grammar: json!({"score": 6}),
                ..ReportDetails::default()
            },
            general_suggestions: vec!["Practice linking words.".to_string()],
        };
        let value = serde_json::to_value(&report).unwrap();
        assert_eq!(value["details"]["fluency"], json!(null));
        assert_eq!(value["details"]["grammar"], json!({"score": 6}));
    }

    #[test]
    fn test_schemas() {
        let fluency = section_schema(true);
        assert_eq!(fluency["required"].as_array().unwrap().len(), 5);
        assert!(fluency["properties"].get("wpm").is_some());

        let grammar = section_schema(false);
        assert!(grammar["properties"].get("wpm").is_none());

        assert_eq!(verdict_schema()["required"], json!(["overall_score", "general_suggestions"]));
    }
}
