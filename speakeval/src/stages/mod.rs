//! Stage trait and declared input/output contracts.
//!
//! Stages are the units of work composed into a [`StageGraph`](crate::pipeline::StageGraph).
//! A stage declares which context fields it reads and which it writes; the
//! engine enforces both sides of that contract.

use crate::context::ContextProjection;
use crate::core::StageOutcome;
use async_trait::async_trait;
use std::collections::BTreeSet;
use std::fmt::Debug;

/// The fields a stage reads and writes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StageContract {
    /// Fields that must be present (truthy) for the stage to do any work.
    pub required_inputs: BTreeSet<String>,
    /// Fields the stage may read when present.
    pub optional_inputs: BTreeSet<String>,
    /// Fields the stage writes, exclusively.
    pub produced_outputs: BTreeSet<String>,
}

impl StageContract {
    /// Creates an empty contract.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds required inputs.
    #[must_use]
    pub fn requires(mut self, fields: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.required_inputs.extend(fields.into_iter().map(Into::into));
        self
    }

    /// Adds optional inputs.
    #[must_use]
    pub fn reads(mut self, fields: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.optional_inputs.extend(fields.into_iter().map(Into::into));
        self
    }

    /// Adds produced outputs.
    #[must_use]
    pub fn produces(mut self, fields: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.produced_outputs.extend(fields.into_iter().map(Into::into));
        self
    }

    /// Returns every field the stage may read.
    #[must_use]
    pub fn inputs(&self) -> BTreeSet<String> {
        self.required_inputs
            .union(&self.optional_inputs)
            .cloned()
            .collect()
    }
}

/// Trait for graph stages.
///
/// `run` is only invoked once every required input is present; the engine
/// handles the skip path and output validation.
#[async_trait]
pub trait Stage: Send + Sync + Debug {
    /// Returns the name of the stage.
    fn name(&self) -> &str;

    /// Returns the stage's declared inputs and outputs.
    fn contract(&self) -> StageContract;

    /// Performs the stage's work.
    ///
    /// # Arguments
    ///
    /// * `ctx` - Read-only view of the stage's declared inputs
    ///
    /// # Returns
    ///
    /// `Completed` with exactly the declared outputs, or `Skipped`/`Failed`.
    async fn run(&self, ctx: &ContextProjection) -> StageOutcome;
}

/// A simple function-based stage.
pub struct FnStage<F>
where
    F: Fn(&ContextProjection) -> StageOutcome + Send + Sync,
{
    name: String,
    contract: StageContract,
    func: F,
}

impl<F> FnStage<F>
where
    F: Fn(&ContextProjection) -> StageOutcome + Send + Sync,
{
    /// Creates a new function-based stage.
    pub fn new(name: impl Into<String>, contract: StageContract, func: F) -> Self {
        Self {
            name: name.into(),
            contract,
            func,
        }
    }
}

impl<F> Debug for FnStage<F>
where
    F: Fn(&ContextProjection) -> StageOutcome + Send + Sync,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnStage")
            .field("name", &self.name)
            .field("contract", &self.contract)
            .finish()
    }
}

#[async_trait]
impl<F> Stage for FnStage<F>
where
    F: Fn(&ContextProjection) -> StageOutcome + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn contract(&self) -> StageContract {
        self.contract.clone()
    }

    async fn run(&self, ctx: &ContextProjection) -> StageOutcome {
        (self.func)(ctx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::ResultContext;

    #[test]
    fn test_contract_builder() {
        let contract = StageContract::new()
            .requires(["transcript"])
            .reads(["duration"])
            .produces(["fluency_analysis"]);

        assert!(contract.required_inputs.contains("transcript"));
        assert_eq!(contract.inputs().len(), 2);
        assert_eq!(contract.produced_outputs.len(), 1);
    }

    #[tokio::test]
    async fn test_fn_stage() {
        let stage = FnStage::new(
            "echo",
            StageContract::new().requires(["transcript"]).produces(["echo"]),
            |ctx| match ctx.text("transcript") {
                Ok(Some(text)) => StageOutcome::completed_value("echo", serde_json::json!(text)),
                Ok(None) => StageOutcome::skipped("no transcript"),
                Err(e) => StageOutcome::from(crate::errors::StageError::from(e)),
            },
        );

        assert_eq!(stage.name(), "echo");

        let contract = stage.contract();
        let ctx = ResultContext::new()
            .with_field("transcript", serde_json::json!("hello"))
            .project("echo", &contract.required_inputs, &contract.optional_inputs);
        let outcome = stage.run(&ctx).await;
        assert_eq!(outcome.get("echo"), Some(&serde_json::json!("hello")));
    }
}
