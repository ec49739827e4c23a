//! The result of one graph run.

use crate::context::ResultContext;
use crate::core::{RunStatus, StageRunRecord, StageStatus};
use crate::errors::StageError;
use serde::Serialize;
use std::collections::BTreeMap;
use uuid::Uuid;

/// Terminal outcome of a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RunOutcome {
    /// The aggregation stage completed.
    Completed,
    /// Nothing usable was produced.
    Skipped {
        /// Why the run produced nothing.
        reason: String,
    },
    /// The entry or aggregation stage failed.
    Failed {
        /// The error of the stage that ended the run.
        error: StageError,
    },
}

impl RunOutcome {
    /// Returns the run status.
    #[must_use]
    pub fn status(&self) -> RunStatus {
        match self {
            Self::Completed => RunStatus::Completed,
            Self::Skipped { .. } => RunStatus::Skipped,
            Self::Failed { .. } => RunStatus::Failed,
        }
    }
}

/// Everything a caller learns about one run.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    /// Run identifier.
    pub run_id: Uuid,
    /// Terminal outcome.
    pub outcome: RunOutcome,
    /// Final merged context.
    pub context: ResultContext,
    /// Per-stage records, keyed by stage name.
    pub records: BTreeMap<String, StageRunRecord>,
    /// Wall time of the whole run.
    pub duration_ms: f64,
}

impl RunReport {
    /// Returns the run status.
    #[must_use]
    pub fn status(&self) -> RunStatus {
        self.outcome.status()
    }

    /// Returns true if the aggregation stage completed.
    #[must_use]
    pub fn is_completed(&self) -> bool {
        self.status() == RunStatus::Completed
    }

    /// Returns true if the run produced nothing usable.
    #[must_use]
    pub fn is_skipped(&self) -> bool {
        self.status() == RunStatus::Skipped
    }

    /// Returns true if the run failed.
    #[must_use]
    pub fn is_failed(&self) -> bool {
        self.status() == RunStatus::Failed
    }

    /// Returns the record of one stage.
    #[must_use]
    pub fn record(&self, stage: &str) -> Option<&StageRunRecord> {
        self.records.get(stage)
    }

    /// Returns the status of one stage.
    #[must_use]
    pub fn stage_status(&self, stage: &str) -> Option<StageStatus> {
        self.records.get(stage).map(|r| r.status)
    }

    /// Returns a context field, treating the `null` sentinel as absent.
    #[must_use]
    pub fn field(&self, name: &str) -> Option<&serde_json::Value> {
        self.context.get(name)
    }

    /// Returns the errors of every failed stage.
    #[must_use]
    pub fn failures(&self) -> Vec<&StageError> {
        self.records.values().filter_map(|r| r.error.as_ref()).collect()
    }

    /// Returns the names of stages in `status`.
    #[must_use]
    pub fn stages_with_status(&self, status: StageStatus) -> Vec<&str> {
        self.records
            .values()
            .filter(|r| r.status == status)
            .map(|r| r.stage.as_str())
            .collect()
    }
}
