//! Error types for the speakeval engine.
//!
//! Three families live here:
//! - graph construction errors ([`GraphValidationError`], [`CycleDetectedError`]),
//!   raised once when a [`StageGraph`](crate::pipeline::StageGraph) is built;
//! - run-time contract errors ([`ContractViolationError`], [`FieldConflictError`]),
//!   which abort the offending run;
//! - stage-scoped failures ([`StageError`], [`CollaboratorError`]), which are
//!   recorded on the stage and never escape the executor as errors.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use thiserror::Error;

/// The main error type returned by the engine.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The stage graph failed validation.
    #[error("{0}")]
    Validation(#[from] GraphValidationError),

    /// A stage returned fields outside its declared output set.
    #[error("{0}")]
    ContractViolation(#[from] ContractViolationError),

    /// Two writers targeted the same result field.
    #[error("{0}")]
    FieldConflict(#[from] FieldConflictError),

    /// The blocking runtime could not be started.
    #[error("Runtime error: {0}")]
    Runtime(String),

    /// A generic internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Metadata about a contract error for better diagnostics.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct ContractErrorInfo {
    /// Error code (e.g., "GRAPH-004-CYCLE").
    pub code: String,
    /// Short summary of the error.
    pub summary: String,
    /// Hint for fixing the error.
    pub fix_hint: Option<String>,
    /// Additional context key-value pairs.
    #[serde(default)]
    pub context: HashMap<String, String>,
}

impl ContractErrorInfo {
    /// Creates a new contract error info.
    #[must_use]
    pub fn new(code: impl Into<String>, summary: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            summary: summary.into(),
            fix_hint: None,
            context: HashMap::new(),
        }
    }

    /// Sets the fix hint.
    #[must_use]
    pub fn with_fix_hint(mut self, hint: impl Into<String>) -> Self {
        self.fix_hint = Some(hint.into());
        self
    }

    /// Adds a single context entry.
    #[must_use]
    pub fn with_context_entry(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }
}

/// Error codes attached to [`GraphValidationError`]s.
pub mod codes {
    /// The graph has no stages.
    pub const EMPTY: &str = "GRAPH-001-EMPTY";
    /// Two stages share a name.
    pub const DUPLICATE: &str = "GRAPH-002-DUPLICATE";
    /// A stage depends on a stage that does not exist.
    pub const MISSING_DEP: &str = "GRAPH-003-MISSING_DEP";
    /// The dependency edges form a cycle.
    pub const CYCLE: &str = "GRAPH-004-CYCLE";
    /// Two stages declare the same output field.
    pub const COLLISION: &str = "GRAPH-005-COLLISION";
    /// The graph does not have the entry / fan-out / aggregation shape.
    pub const TOPOLOGY: &str = "GRAPH-006-TOPOLOGY";
    /// The aggregation stage reads a field nobody produces.
    pub const COVERAGE: &str = "GRAPH-007-COVERAGE";
    /// A stage name is empty or whitespace.
    pub const BLANK_NAME: &str = "GRAPH-008-BLANK_NAME";
    /// A stage declares no output fields.
    pub const NO_OUTPUTS: &str = "GRAPH-009-NO_OUTPUTS";
}

/// Error raised when a stage graph fails construction-time validation.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct GraphValidationError {
    /// The error message.
    pub message: String,
    /// The stages involved in the error.
    pub stages: Vec<String>,
    /// Optional contract error info.
    pub error_info: Option<ContractErrorInfo>,
}

impl GraphValidationError {
    /// Creates a new graph validation error.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            stages: Vec::new(),
            error_info: None,
        }
    }

    /// Sets the stages involved.
    #[must_use]
    pub fn with_stages(mut self, stages: Vec<String>) -> Self {
        self.stages = stages;
        self
    }

    /// Sets the contract error info.
    #[must_use]
    pub fn with_error_info(mut self, info: ContractErrorInfo) -> Self {
        self.error_info = Some(info);
        self
    }

    /// Returns the error code, if any.
    #[must_use]
    pub fn code(&self) -> Option<&str> {
        self.error_info.as_ref().map(|info| info.code.as_str())
    }
}

/// Error raised when a cycle is detected in the stage graph.
#[derive(Debug, Clone, Error)]
#[error("Cycle detected in stage graph: {}", cycle_path.join(" -> "))]
pub struct CycleDetectedError {
    /// The path of stages forming the cycle.
    pub cycle_path: Vec<String>,
    /// Contract error info.
    pub error_info: ContractErrorInfo,
}

impl CycleDetectedError {
    /// Creates a new cycle detected error.
    #[must_use]
    pub fn new(cycle_path: Vec<String>) -> Self {
        let info = ContractErrorInfo::new(
            codes::CYCLE,
            format!("Stage graph contains a dependency cycle: {}", cycle_path.join(" -> ")),
        )
        .with_fix_hint("Remove one of the dependencies in the cycle to break it.");

        Self {
            cycle_path,
            error_info: info,
        }
    }
}

impl From<CycleDetectedError> for GraphValidationError {
    fn from(err: CycleDetectedError) -> Self {
        Self {
            message: err.to_string(),
            stages: err.cycle_path.clone(),
            error_info: Some(err.error_info),
        }
    }
}

/// Error raised when a stage completes with a field set that differs from
/// its declared outputs.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("Stage '{stage}' violated its output contract (unexpected: {unexpected:?}, missing: {missing:?})")]
pub struct ContractViolationError {
    /// The offending stage.
    pub stage: String,
    /// Fields returned but not declared.
    pub unexpected: Vec<String>,
    /// Fields declared but not returned.
    pub missing: Vec<String>,
}

impl ContractViolationError {
    /// Creates a new contract violation error.
    #[must_use]
    pub fn new(stage: impl Into<String>, unexpected: Vec<String>, missing: Vec<String>) -> Self {
        Self {
            stage: stage.into(),
            unexpected,
            missing,
        }
    }
}

/// Error raised when a field is written by a second owner.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("Field conflict: '{field}' is owned by '{owner}' and cannot be written by '{writer}'")]
pub struct FieldConflictError {
    /// The conflicting field.
    pub field: String,
    /// The stage that already wrote the field.
    pub owner: String,
    /// The stage that attempted the second write.
    pub writer: String,
}

impl FieldConflictError {
    /// Creates a new field conflict error.
    #[must_use]
    pub fn new(
        field: impl Into<String>,
        owner: impl Into<String>,
        writer: impl Into<String>,
    ) -> Self {
        Self {
            field: field.into(),
            owner: owner.into(),
            writer: writer.into(),
        }
    }
}

/// Error raised when a stage reads a field it did not declare as an input.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("Undeclared input: stage '{stage}' attempted to read '{field}'")]
pub struct UndeclaredInputError {
    /// The stage attempting access.
    pub stage: String,
    /// The undeclared field.
    pub field: String,
}

impl UndeclaredInputError {
    /// Creates a new undeclared input error.
    #[must_use]
    pub fn new(stage: impl Into<String>, field: impl Into<String>) -> Self {
        Self {
            stage: stage.into(),
            field: field.into(),
        }
    }
}

/// Structured payload of a failed stage.
#[derive(Debug, Clone, Error, PartialEq, Eq, Serialize, Deserialize)]
#[error("Stage {stage} failed: {message}")]
pub struct StageError {
    /// Stage that failed.
    pub stage: String,
    /// Human readable message.
    pub message: String,
    /// Underlying cause, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cause: Option<String>,
}

impl StageError {
    /// Creates a new stage error.
    #[must_use]
    pub fn new(stage: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            stage: stage.into(),
            message: message.into(),
            cause: None,
        }
    }

    /// Sets the underlying cause.
    #[must_use]
    pub fn with_cause(mut self, cause: impl Into<String>) -> Self {
        self.cause = Some(cause.into());
        self
    }

    /// Wraps a collaborator failure raised inside `stage`.
    #[must_use]
    pub fn from_collaborator(stage: impl Into<String>, err: &CollaboratorError) -> Self {
        let stage = stage.into();
        match err {
            CollaboratorError::NotFound { .. } | CollaboratorError::InvalidResponse(_) => {
                Self::new(stage, err.to_string())
            }
            _ => Self::new(stage, "collaborator call failed").with_cause(err.to_string()),
        }
    }

    /// Converts to a JSON object.
    #[must_use]
    pub fn to_dict(&self) -> BTreeMap<String, serde_json::Value> {
        let mut map = BTreeMap::new();
        map.insert("stage".to_string(), serde_json::json!(self.stage));
        map.insert("message".to_string(), serde_json::json!(self.message));
        if let Some(ref cause) = self.cause {
            map.insert("cause".to_string(), serde_json::json!(cause));
        }
        map
    }
}

impl From<UndeclaredInputError> for StageError {
    fn from(err: UndeclaredInputError) -> Self {
        Self::new(err.stage.clone(), err.to_string())
    }
}

/// Errors raised by external collaborators (speech-to-text, structured generation).
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CollaboratorError {
    /// The referenced source does not exist.
    #[error("Audio file not found: {path}")]
    NotFound {
        /// The missing path.
        path: String,
    },

    /// The collaborator is misconfigured.
    #[error("Configuration error: {0}")]
    Config(String),

    /// The remote service answered with a non-success status.
    #[error("HTTP {status}: {body}")]
    Http {
        /// HTTP status code.
        status: u16,
        /// Response body (possibly truncated).
        body: String,
    },

    /// The request could not be sent or the response not read.
    #[error("Transport error: {0}")]
    Transport(String),

    /// The response did not match the expected shape.
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// Local I/O failed.
    #[error("IO error: {0}")]
    Io(String),
}

impl CollaboratorError {
    /// Creates an invalid response error.
    #[must_use]
    pub fn invalid_response(message: impl Into<String>) -> Self {
        Self::InvalidResponse(message.into())
    }

    /// Returns true when retrying the call may succeed.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Http { status, .. } => *status == 429 || *status >= 500,
            Self::Transport(_) => true,
            _ => false,
        }
    }
}

impl From<std::io::Error> for CollaboratorError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

impl From<serde_json::Error> for CollaboratorError {
    fn from(err: serde_json::Error) -> Self {
        Self::InvalidResponse(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_contract_error_info_creation() {
        let info = ContractErrorInfo::new("TEST-001", "Test error")
            .with_fix_hint("Fix this by doing that")
            .with_context_entry("stage", "my_stage");

        assert_eq!(info.code, "TEST-001");
        assert_eq!(info.summary, "Test error");
        assert_eq!(info.fix_hint, Some("Fix this by doing that".to_string()));
        assert_eq!(info.context.get("stage"), Some(&"my_stage".to_string()));
    }

    #[test]
    fn test_cycle_detected_error() {
        let err = CycleDetectedError::new(vec![
            "a".to_string(),
            "b".to_string(),
            "a".to_string(),
        ]);

        assert!(err.to_string().contains("a -> b -> a"));
        assert_eq!(err.error_info.code, codes::CYCLE);

        let validation: GraphValidationError = err.into();
        assert_eq!(validation.code(), Some(codes::CYCLE));
        assert_eq!(validation.stages.len(), 3);
    }

    #[test]
    fn test_stage_error_display_and_dict() {
        let err = StageError::new("transcribe", "Audio file not found: /tmp/x.wav")
            .with_cause("ENOENT");

        assert!(err.to_string().contains("transcribe"));
        let dict = err.to_dict();
        assert_eq!(dict.get("cause"), Some(&serde_json::json!("ENOENT")));
    }

    #[test]
    fn test_stage_error_from_collaborator() {
        let not_found = CollaboratorError::NotFound {
            path: "/missing.wav".to_string(),
        };
        let err = StageError::from_collaborator("transcribe", &not_found);
        assert_eq!(err.message, "Audio file not found: /missing.wav");
        assert!(err.cause.is_none());

        let http = CollaboratorError::Http {
            status: 502,
            body: "bad gateway".to_string(),
        };
        let err = StageError::from_collaborator("analyze_grammar", &http);
        assert_eq!(err.message, "collaborator call failed");
        assert_eq!(err.cause.as_deref(), Some("HTTP 502: bad gateway"));
    }

    #[test]
    fn test_collaborator_error_transient() {
        assert!(CollaboratorError::Http { status: 429, body: String::new() }.is_transient());
        assert!(CollaboratorError::Http { status: 503, body: String::new() }.is_transient());
        assert!(!CollaboratorError::Http { status: 400, body: String::new() }.is_transient());
        assert!(CollaboratorError::Transport("reset".to_string()).is_transient());
        assert!(!CollaboratorError::invalid_response("bad json").is_transient());
    }

    #[test]
    fn test_undeclared_input_into_stage_error() {
        let err: StageError = UndeclaredInputError::new("analyze_grammar", "duration").into();
        assert_eq!(err.stage, "analyze_grammar");
        assert!(err.message.contains("duration"));
    }
}
