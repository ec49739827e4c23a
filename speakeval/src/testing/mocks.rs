//! Mock stages for testing.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;

use crate::context::ContextProjection;
use crate::core::{FieldMap, StageOutcome};
use crate::stages::{Stage, StageContract};

fn fields<'a>(names: &'a [&'a str]) -> impl Iterator<Item = String> + 'a {
    names.iter().map(|s| (*s).to_string())
}

/// A stage that completes with one value per declared output and records
/// every projection it was handed.
///
/// Unless overridden, each output holds the string `"<stage>:<field>"`.
#[derive(Debug)]
pub struct StaticStage {
    name: String,
    contract: StageContract,
    outputs: FieldMap,
    calls: Mutex<Vec<FieldMap>>,
}

impl StaticStage {
    /// Creates a new static stage.
    #[must_use]
    pub fn new(name: impl Into<String>, requires: &[&str], produces: &[&str]) -> Self {
        let name = name.into();
        let outputs = fields(produces)
            .map(|f| {
                let value = serde_json::json!(format!("{name}:{f}"));
                (f, value)
            })
            .collect();
        Self {
            contract: StageContract::new().requires(fields(requires)).produces(fields(produces)),
            name,
            outputs,
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Declares optional inputs.
    #[must_use]
    pub fn reading(mut self, optional: &[&str]) -> Self {
        self.contract = self.contract.reads(fields(optional));
        self
    }

    /// Overrides the value written for `field`.
    #[must_use]
    pub fn with_output(mut self, field: impl Into<String>, value: serde_json::Value) -> Self {
        self.outputs.insert(field.into(), value);
        self
    }

    /// Returns the number of times the stage's work ran.
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }

    /// Returns the fields visible to each call.
    #[must_use]
    pub fn recorded_inputs(&self) -> Vec<FieldMap> {
        self.calls.lock().clone()
    }
}

#[async_trait]
impl Stage for StaticStage {
    fn name(&self) -> &str {
        &self.name
    }

    fn contract(&self) -> StageContract {
        self.contract.clone()
    }

    async fn run(&self, ctx: &ContextProjection) -> StageOutcome {
        self.calls.lock().push(ctx.fields().clone());
        StageOutcome::completed(self.outputs.clone())
    }
}

/// A stage that always fails.
#[derive(Debug)]
pub struct FailingStage {
    name: String,
    contract: StageContract,
    error: String,
    calls: Mutex<usize>,
}

impl FailingStage {
    /// Creates a new failing stage.
    #[must_use]
    pub fn new(name: impl Into<String>, produces: &[&str], error: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            contract: StageContract::new().produces(fields(produces)),
            error: error.into(),
            calls: Mutex::new(0),
        }
    }

    /// Declares required inputs.
    #[must_use]
    pub fn requiring(mut self, required: &[&str]) -> Self {
        self.contract = self.contract.requires(fields(required));
        self
    }

    /// Returns the number of times the stage's work ran.
    #[must_use]
    pub fn call_count(&self) -> usize {
        *self.calls.lock()
    }
}

#[async_trait]
impl Stage for FailingStage {
    fn name(&self) -> &str {
        &self.name
    }

    fn contract(&self) -> StageContract {
        self.contract.clone()
    }

    async fn run(&self, _ctx: &ContextProjection) -> StageOutcome {
        *self.calls.lock() += 1;
        StageOutcome::failed(&self.name, &self.error)
    }
}

/// Wraps another stage and sleeps before running it.
#[derive(Debug)]
pub struct SlowStage {
    inner: Arc<dyn Stage>,
    delay: Duration,
}

impl SlowStage {
    /// Creates a new slow stage.
    #[must_use]
    pub fn new(inner: Arc<dyn Stage>, delay: Duration) -> Self {
        Self { inner, delay }
    }

    /// Creates a slow stage with delay in milliseconds.
    #[must_use]
    pub fn with_delay_ms(inner: Arc<dyn Stage>, ms: u64) -> Self {
        Self::new(inner, Duration::from_millis(ms))
    }
}

#[async_trait]
impl Stage for SlowStage {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn contract(&self) -> StageContract {
        self.inner.contract()
    }

    async fn run(&self, ctx: &ContextProjection) -> StageOutcome {
        tokio::time::sleep(self.delay).await;
        self.inner.run(ctx).await
    }
}
