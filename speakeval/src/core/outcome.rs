//! Tagged stage outcome returned by every stage.

use super::StageStatus;
use crate::errors::StageError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Field name to value mapping produced by a stage.
///
/// Ordered so that merged contexts serialize identically regardless of the
/// order in which stages finished.
pub type FieldMap = BTreeMap<String, serde_json::Value>;

/// The outcome of a single stage execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum StageOutcome {
    /// The stage produced exactly its declared outputs.
    Completed {
        /// The produced fields.
        data: FieldMap,
    },
    /// A required input was absent; the stage did no work.
    Skipped {
        /// Why the stage skipped.
        reason: String,
    },
    /// The stage's work raised an error.
    Failed {
        /// The structured error.
        error: StageError,
    },
}

impl StageOutcome {
    /// Creates a completed outcome with data.
    #[must_use]
    pub fn completed(data: FieldMap) -> Self {
        Self::Completed { data }
    }

    /// Creates a completed outcome with a single field.
    #[must_use]
    pub fn completed_value(key: impl Into<String>, value: serde_json::Value) -> Self {
        let mut data = FieldMap::new();
        data.insert(key.into(), value);
        Self::completed(data)
    }

    /// Creates a skip outcome with a reason.
    #[must_use]
    pub fn skipped(reason: impl Into<String>) -> Self {
        Self::Skipped {
            reason: reason.into(),
        }
    }

    /// Creates a failure outcome for `stage`.
    #[must_use]
    pub fn failed(stage: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Failed {
            error: StageError::new(stage, message),
        }
    }

    /// Returns the status this outcome maps to.
    #[must_use]
    pub fn status(&self) -> StageStatus {
        match self {
            Self::Completed { .. } => StageStatus::Completed,
            Self::Skipped { .. } => StageStatus::Skipped,
            Self::Failed { .. } => StageStatus::Failed,
        }
    }

    /// Returns true if the stage completed.
    #[must_use]
    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed { .. })
    }

    /// Returns true if the stage skipped.
    #[must_use]
    pub fn is_skipped(&self) -> bool {
        matches!(self, Self::Skipped { .. })
    }

    /// Returns true if the stage failed.
    #[must_use]
    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }

    /// Returns the produced data, if completed.
    #[must_use]
    pub fn data(&self) -> Option<&FieldMap> {
        match self {
            Self::Completed { data } => Some(data),
            _ => None,
        }
    }

    /// Gets a produced field.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&serde_json::Value> {
        self.data().and_then(|d| d.get(key))
    }

    /// Returns the error, if failed.
    #[must_use]
    pub fn error(&self) -> Option<&StageError> {
        match self {
            Self::Failed { error } => Some(error),
            _ => None,
        }
    }

    /// Returns the skip reason, if skipped.
    #[must_use]
    pub fn skip_reason(&self) -> Option<&str> {
        match self {
            Self::Skipped { reason } => Some(reason),
            _ => None,
        }
    }
}

impl From<StageError> for StageOutcome {
    fn from(error: StageError) -> Self {
        Self::Failed { error }
    }
}
