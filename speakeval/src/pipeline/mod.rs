//! Graph building and execution.
//!
//! This module provides:
//! - Stage specifications
//! - The graph builder with construction-time validation
//! - The validated DAG
//! - The executor and its run report

mod builder;
mod dag;
mod executor;
mod report;
mod spec;

#[cfg(test)]
mod integration_tests;

pub use builder::GraphBuilder;
pub use dag::StageGraph;
pub use executor::{ExecutionMode, Executor, ExecutorConfig};
pub use report::{RunOutcome, RunReport};
pub use spec::StageSpec;
