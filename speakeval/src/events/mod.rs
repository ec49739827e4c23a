//! Lifecycle events emitted by the executor.
//!
//! Every run emits `run.started`, one `stage.*` pair per launched stage, and
//! `run.finished`. Sinks decide what to do with them.

mod sink;

pub use sink::{CollectingEventSink, EventSink, LoggingEventSink, NoOpEventSink};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// The kind of a lifecycle event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventKind {
    /// The executor accepted the initial context.
    #[serde(rename = "run.started")]
    RunStarted,
    /// A stage was launched.
    #[serde(rename = "stage.started")]
    StageStarted,
    /// A stage completed and its outputs were merged.
    #[serde(rename = "stage.completed")]
    StageCompleted,
    /// A stage skipped.
    #[serde(rename = "stage.skipped")]
    StageSkipped,
    /// A stage failed.
    #[serde(rename = "stage.failed")]
    StageFailed,
    /// The run reached its terminal outcome.
    #[serde(rename = "run.finished")]
    RunFinished,
}

impl EventKind {
    /// Returns the dotted event type string.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RunStarted => "run.started",
            Self::StageStarted => "stage.started",
            Self::StageCompleted => "stage.completed",
            Self::StageSkipped => "stage.skipped",
            Self::StageFailed => "stage.failed",
            Self::RunFinished => "run.finished",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single lifecycle event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LifecycleEvent {
    /// Event kind.
    #[serde(rename = "type")]
    pub kind: EventKind,
    /// Run the event belongs to.
    pub run_id: Uuid,
    /// Stage the event concerns, for `stage.*` events.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stage: Option<String>,
    /// Emission time.
    pub timestamp: DateTime<Utc>,
    /// Event payload (durations, errors, outcome).
    #[serde(default)]
    pub data: serde_json::Value,
}

impl LifecycleEvent {
    /// Creates a run-level event.
    #[must_use]
    pub fn run(kind: EventKind, run_id: Uuid) -> Self {
        Self {
            kind,
            run_id,
            stage: None,
            timestamp: Utc::now(),
            data: serde_json::Value::Null,
        }
    }

    /// Creates a stage-level event.
    #[must_use]
    pub fn stage(kind: EventKind, run_id: Uuid, stage: impl Into<String>) -> Self {
        Self {
            stage: Some(stage.into()),
            ..Self::run(kind, run_id)
        }
    }

    /// Sets the payload.
    #[must_use]
    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = data;
        self
    }
}
