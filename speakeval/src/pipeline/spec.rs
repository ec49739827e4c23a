//! Stage descriptors.

use crate::context::ContextProjection;
use crate::core::{StageOutcome, StageRole};
use crate::errors::{codes, ContractErrorInfo, ContractViolationError, GraphValidationError};
use crate::stages::{Stage, StageContract};
use std::collections::BTreeSet;
use std::sync::Arc;

/// Immutable description of one stage in a graph.
#[derive(Debug, Clone)]
pub struct StageSpec {
    /// The unique name of the stage.
    pub name: String,
    /// The stage implementation.
    pub runner: Arc<dyn Stage>,
    /// The stage's declared inputs and outputs, captured at construction.
    pub contract: StageContract,
    /// Names of stages this stage depends on.
    pub dependencies: BTreeSet<String>,
    /// Position in the graph.
    pub role: StageRole,
}

impl StageSpec {
    /// Creates a new stage specification from a stage implementation.
    #[must_use]
    pub fn new(runner: Arc<dyn Stage>, role: StageRole) -> Self {
        Self {
            name: runner.name().to_string(),
            contract: runner.contract(),
            runner,
            dependencies: BTreeSet::new(),
            role,
        }
    }

    /// Sets the dependencies.
    #[must_use]
    pub fn with_dependencies(mut self, deps: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.dependencies = deps.into_iter().map(Into::into).collect();
        self
    }

    /// Adds a dependency.
    #[must_use]
    pub fn with_dependency(mut self, dep: impl Into<String>) -> Self {
        self.dependencies.insert(dep.into());
        self
    }

    /// Returns the required inputs.
    #[must_use]
    pub fn required_inputs(&self) -> &BTreeSet<String> {
        &self.contract.required_inputs
    }

    /// Returns the optional inputs.
    #[must_use]
    pub fn optional_inputs(&self) -> &BTreeSet<String> {
        &self.contract.optional_inputs
    }

    /// Returns the produced outputs.
    #[must_use]
    pub fn produced_outputs(&self) -> &BTreeSet<String> {
        &self.contract.produced_outputs
    }

    /// Validates the stage specification.
    ///
    /// # Errors
    ///
    /// Returns an error if the name is blank, the stage depends on itself,
    /// or it declares no outputs.
    pub fn validate(&self) -> Result<(), GraphValidationError> {
        if self.name.trim().is_empty() {
            return Err(GraphValidationError::new("Stage name cannot be empty")
                .with_error_info(ContractErrorInfo::new(
                    codes::BLANK_NAME,
                    "Stage names must be non-empty",
                )));
        }
        if self.dependencies.contains(&self.name) {
            return Err(GraphValidationError::new(format!(
                "Stage '{}' cannot depend on itself",
                self.name
            ))
            .with_stages(vec![self.name.clone()])
            .with_error_info(ContractErrorInfo::new(
                codes::CYCLE,
                format!("Stage '{}' lists itself as a dependency", self.name),
            )));
        }
        if self.contract.produced_outputs.is_empty() {
            return Err(GraphValidationError::new(format!(
                "Stage '{}' declares no output fields",
                self.name
            ))
            .with_stages(vec![self.name.clone()])
            .with_error_info(ContractErrorInfo::new(
                codes::NO_OUTPUTS,
                format!("Stage '{}' must produce at least one field", self.name),
            )));
        }
        Ok(())
    }

    /// Runs the stage against `ctx`, enforcing its contract.
    ///
    /// Returns `Skipped` without invoking the stage when a required input
    /// is absent or empty.
    ///
    /// # Errors
    ///
    /// Returns `ContractViolationError` if the stage completed with a field
    /// set different from its declared outputs.
    pub async fn execute(
        &self,
        ctx: &ContextProjection,
    ) -> Result<StageOutcome, ContractViolationError> {
        if let Some(missing) = self
            .contract
            .required_inputs
            .iter()
            .find(|field| !ctx.is_present(field))
        {
            return Ok(StageOutcome::skipped(format!(
                "required input '{missing}' is absent"
            )));
        }

        let outcome = self.runner.run(ctx).await;

        if let StageOutcome::Completed { data } = &outcome {
            let produced: BTreeSet<&String> = data.keys().collect();
            let declared: BTreeSet<&String> = self.contract.produced_outputs.iter().collect();
            if produced != declared {
                return Err(ContractViolationError::new(
                    &self.name,
                    produced.difference(&declared).map(|s| (*s).clone()).collect(),
                    declared.difference(&produced).map(|s| (*s).clone()).collect(),
                ));
            }
        }

        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::ResultContext;
    use crate::stages::FnStage;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn echo_stage(calls: Arc<AtomicUsize>) -> Arc<dyn Stage> {
        Arc::new(FnStage::new(
            "echo",
            StageContract::new().requires(["transcript"]).produces(["echo"]),
            move |ctx| {
                calls.fetch_add(1, Ordering::SeqCst);
                let text = ctx.text("transcript").ok().flatten().unwrap_or_default();
                StageOutcome::completed_value("echo", json!(text))
            },
        ))
    }

    fn project(spec: &StageSpec, ctx: &ResultContext) -> ContextProjection {
        ctx.project(&spec.name, spec.required_inputs(), spec.optional_inputs())
    }

    #[test]
    fn test_spec_captures_contract() {
        let spec = StageSpec::new(echo_stage(Arc::default()), StageRole::FanOut)
            .with_dependencies(["transcribe"]);

        assert_eq!(spec.name, "echo");
        assert!(spec.required_inputs().contains("transcript"));
        assert!(spec.produced_outputs().contains("echo"));
        assert_eq!(spec.dependencies.len(), 1);
        assert!(spec.validate().is_ok());
    }

    #[test]
    fn test_spec_self_dependency() {
        let spec = StageSpec::new(echo_stage(Arc::default()), StageRole::FanOut).with_dependency("echo");
        let err = spec.validate().unwrap_err();
        assert_eq!(err.code(), Some(codes::CYCLE));
    }

    #[test]
    fn test_spec_blank_name() {
        let mut spec = StageSpec::new(echo_stage(Arc::default()), StageRole::FanOut);
        spec.name = "   ".to_string();
        let err = spec.validate().unwrap_err();
        assert_eq!(err.code(), Some(codes::BLANK_NAME));
    }

    #[test]
    fn test_spec_without_outputs() {
        let silent: Arc<dyn Stage> = Arc::new(FnStage::new(
            "silent",
            StageContract::new().requires(["transcript"]),
            |_: &ContextProjection| StageOutcome::completed(crate::core::FieldMap::new()),
        ));
        let err = StageSpec::new(silent, StageRole::FanOut).validate().unwrap_err();
        assert_eq!(err.code(), Some(codes::NO_OUTPUTS));
        assert_eq!(err.stages, vec!["silent".to_string()]);
    }

    #[tokio::test]
    async fn test_execute_skips_without_invoking_work() {
        let calls = Arc::new(AtomicUsize::new(0));
        let spec = StageSpec::new(echo_stage(calls.clone()), StageRole::FanOut);
        let ctx = ResultContext::new().with_field("transcript", json!(""));

        let outcome = spec.execute(&project(&spec, &ctx)).await.unwrap();

        assert!(outcome.is_skipped());
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_execute_runs_when_inputs_present() {
        let calls = Arc::new(AtomicUsize::new(0));
        let spec = StageSpec::new(echo_stage(calls.clone()), StageRole::FanOut);
        let ctx = ResultContext::new().with_field("transcript", json!("hi"));

        let outcome = spec.execute(&project(&spec, &ctx)).await.unwrap();

        assert_eq!(outcome.get("echo"), Some(&json!("hi")));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_execute_rejects_undeclared_outputs() {
        let stage: Arc<dyn Stage> = Arc::new(FnStage::new(
            "leaky",
            StageContract::new().produces(["a", "b"]),
            |_| {
                let mut data = crate::core::FieldMap::new();
                data.insert("a".to_string(), json!(1));
                data.insert("c".to_string(), json!(3));
                StageOutcome::completed(data)
            },
        ));
        let spec = StageSpec::new(stage, StageRole::FanOut);

        let err = spec
            .execute(&project(&spec, &ResultContext::new()))
            .await
            .unwrap_err();

        assert_eq!(err.stage, "leaky");
        assert_eq!(err.unexpected, vec!["c".to_string()]);
        assert_eq!(err.missing, vec!["b".to_string()]);
    }
}
