//! Testing utilities for stage graphs.
//!
//! This module provides:
//! - Mock stages with declared contracts
//! - Scripted transcription and language-model collaborators
//! - Assertions over run reports

pub mod assertions;
pub mod fixtures;
pub mod mocks;

pub use assertions::{
    assert_field_absent, assert_field_present, assert_run_status, assert_stage_status,
    assert_stages_with_status,
};
pub use fixtures::{
    sample_section, sample_verdict, ScriptedModel, ScriptedTranscriber, SAMPLE_DURATION,
    SAMPLE_TRANSCRIPT,
};
pub use mocks::{FailingStage, SlowStage, StaticStage};
