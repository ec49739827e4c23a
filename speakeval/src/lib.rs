//! # Speakeval
//!
//! A stage-graph engine for scoring recorded answers to IELTS-style
//! speaking questions.
//!
//! A run walks a fixed-shape graph:
//!
//! - **Entry**: one stage that turns the recording into a transcript
//! - **Fan-out**: independent analyses that each read the transcript
//! - **Aggregation**: one stage that folds whatever analyses succeeded into a report
//!
//! A failing fan-out stage leaves its fields absent and the run carries on;
//! a failing entry or aggregation stage fails the run.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use speakeval::prelude::*;
//!
//! let (transcriber, model) = speakeval::openai::connect(ModelConfig::from_env()?)?;
//! let graph = default_graph(transcriber, model)?;
//! let report = Executor::new(graph)
//!     .run(initial_context(Path::new("answer.wav")))
//!     .await?;
//!
//! if let Some(feedback) = report.field(fields::FINAL_FEEDBACK) {
//!     println!("{feedback:#}");
//! }
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod assessment;
pub mod context;
pub mod core;
pub mod errors;
pub mod events;
pub mod observability;
pub mod pipeline;
pub mod stages;
pub mod testing;

#[cfg(feature = "openai")]
pub mod openai;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::assessment::{
        default_graph, fields, initial_context, stage_names, FinalReport, LanguageModel, Section,
        SectionFeedback, StructuredRequest, Transcriber, Transcription,
    };
    pub use crate::context::{ContextProjection, ResultContext, RunIdentity};
    pub use crate::core::{FieldMap, RunStatus, StageOutcome, StageRole, StageStatus};
    pub use crate::errors::{
        CollaboratorError, ContractViolationError, EngineError, GraphValidationError, StageError,
    };
    pub use crate::events::{CollectingEventSink, EventSink, LoggingEventSink, NoOpEventSink};
    pub use crate::observability::{init_tracing, LogFormat, LoggingConfig};
    pub use crate::pipeline::{
        ExecutionMode, Executor, ExecutorConfig, GraphBuilder, RunOutcome, RunReport, StageGraph,
    };
    pub use crate::stages::{FnStage, Stage, StageContract};

    #[cfg(feature = "openai")]
    pub use crate::openai::ModelConfig;
}
