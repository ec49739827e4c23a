//! Stage status, role and run status enums.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The position a stage occupies in the graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageRole {
    /// The single stage with no dependencies (e.g., transcription).
    Entry,
    /// An independent stage that depends only on the entry stage.
    FanOut,
    /// The single stage that depends on every fan-out stage.
    Aggregation,
}

impl StageRole {
    /// Returns true if a failure of this stage terminates the whole run.
    #[must_use]
    pub fn aborts_run_on_failure(&self) -> bool {
        matches!(self, Self::Entry | Self::Aggregation)
    }
}

impl fmt::Display for StageRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Entry => write!(f, "entry"),
            Self::FanOut => write!(f, "fan_out"),
            Self::Aggregation => write!(f, "aggregation"),
        }
    }
}

/// The execution status of a stage within one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    /// Stage has not been launched.
    #[default]
    Pending,
    /// Stage is currently running.
    Running,
    /// Stage skipped because a required input was absent.
    Skipped,
    /// Stage completed and its outputs were merged.
    Completed,
    /// Stage failed; none of its outputs were written.
    Failed,
}

impl fmt::Display for StageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Running => write!(f, "running"),
            Self::Skipped => write!(f, "skipped"),
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

impl StageStatus {
    /// Returns true if the status represents a terminal state.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Skipped | Self::Failed)
    }

    /// Returns true if the status indicates failure.
    #[must_use]
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failed)
    }
}

/// The terminal status of a whole run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// The aggregation stage completed.
    Completed,
    /// Nothing usable was produced; not an error.
    Skipped,
    /// The entry or aggregation stage failed.
    Failed,
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Completed => write!(f, "completed"),
            Self::Skipped => write!(f, "skipped"),
            Self::Failed => write!(f, "failed"),
        }
    }
}
