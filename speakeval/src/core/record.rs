//! Per-stage run records.

use super::{StageOutcome, StageRole, StageStatus};
use crate::errors::StageError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// What happened to one stage during one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageRunRecord {
    /// Stage name.
    pub stage: String,
    /// Stage role in the graph.
    pub role: StageRole,
    /// Current status.
    pub status: StageStatus,
    /// When the stage was launched.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    /// When the stage reached a terminal state.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<DateTime<Utc>>,
    /// Wall time spent in the stage.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<f64>,
    /// Skip reason, for skipped stages.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skip_reason: Option<String>,
    /// Error payload, for failed stages.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<StageError>,
}

impl StageRunRecord {
    /// Creates a pending record.
    #[must_use]
    pub fn pending(stage: impl Into<String>, role: StageRole) -> Self {
        Self {
            stage: stage.into(),
            role,
            status: StageStatus::Pending,
            started_at: None,
            ended_at: None,
            duration_ms: None,
            skip_reason: None,
            error: None,
        }
    }

    /// Marks the stage as running.
    pub fn mark_running(&mut self) {
        self.status = StageStatus::Running;
        self.started_at = Some(Utc::now());
    }

    /// Moves the record to the terminal state described by `outcome`.
    pub fn finish(&mut self, outcome: &StageOutcome, duration_ms: f64) {
        self.status = outcome.status();
        self.ended_at = Some(Utc::now());
        self.duration_ms = Some(duration_ms);
        self.skip_reason = outcome.skip_reason().map(ToString::to_string);
        self.error = outcome.error().cloned();
    }

    /// Returns true once the stage is terminal.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pending_record() {
        let record = StageRunRecord::pending("transcribe", StageRole::Entry);
        assert_eq!(record.status, StageStatus::Pending);
        assert!(record.started_at.is_none());
        assert!(!record.is_terminal());
    }

    #[test]
    fn test_record_lifecycle() {
        let mut record = StageRunRecord::pending("analyze_grammar", StageRole::FanOut);
        record.mark_running();
        assert_eq!(record.status, StageStatus::Running);
        assert!(record.started_at.is_some());

        record.finish(&StageOutcome::failed("analyze_grammar", "timeout"), 12.5);
        assert_eq!(record.status, StageStatus::Failed);
        assert!(record.is_terminal());
        assert_eq!(record.duration_ms, Some(12.5));
        assert_eq!(record.error.as_ref().map(|e| e.message.as_str()), Some("timeout"));
        assert!(record.skip_reason.is_none());
    }

    #[test]
    fn test_record_skip_reason() {
        let mut record = StageRunRecord::pending("analyze_vocabulary", StageRole::FanOut);
        record.mark_running();
        record.finish(&StageOutcome::skipped("required input 'transcript' is absent"), 0.1);

        assert_eq!(record.status, StageStatus::Skipped);
        assert!(record.skip_reason.is_some());
        assert!(record.error.is_none());
    }
}
