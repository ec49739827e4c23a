//! Core domain model types for the engine.
//!
//! This module contains the fundamental types used throughout the crate:
//! - Stage status, role and run status enums
//! - The tagged stage outcome
//! - Per-stage run records

mod outcome;
mod record;
mod status;

pub use outcome::{FieldMap, StageOutcome};
pub use record::StageRunRecord;
pub use status::{RunStatus, StageRole, StageStatus};
