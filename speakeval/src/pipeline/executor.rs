//! The driver loop.
//!
//! Stages are launched as soon as every dependency is terminal. The driver
//! is the only writer of the [`ResultContext`]: stages receive an owned
//! projection and hand back an owned outcome, which is merged once, after
//! the stage is terminal.

use super::{RunOutcome, RunReport, StageGraph, StageSpec};
use crate::context::{ResultContext, RunIdentity};
use crate::core::{FieldMap, StageOutcome, StageRunRecord, StageStatus};
use crate::errors::{ContractViolationError, EngineError, StageError};
use crate::events::{EventKind, EventSink, LifecycleEvent, LoggingEventSink, NoOpEventSink};
use crate::observability::SpanTimer;
use futures::future::BoxFuture;
use futures::stream::{FuturesUnordered, StreamExt};
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::collections::BTreeMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tracing::{debug, error, info, info_span, warn, Instrument};

/// How ready fan-out stages are scheduled.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionMode {
    /// Every ready stage runs on its own tokio task.
    #[default]
    Concurrent,
    /// One stage at a time, in execution order.
    Sequential,
}

/// Executor configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutorConfig {
    /// Scheduling mode.
    #[serde(default)]
    pub mode: ExecutionMode,
    /// Route lifecycle events to the tracing log.
    #[serde(default = "default_log_events")]
    pub log_events: bool,
}

fn default_log_events() -> bool {
    true
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            mode: ExecutionMode::default(),
            log_events: default_log_events(),
        }
    }
}

impl ExecutorConfig {
    /// Sets the scheduling mode.
    #[must_use]
    pub fn with_mode(mut self, mode: ExecutionMode) -> Self {
        self.mode = mode;
        self
    }

    /// Enables or disables event logging.
    #[must_use]
    pub fn with_log_events(mut self, enabled: bool) -> Self {
        self.log_events = enabled;
        self
    }
}

/// Outcome of one launched stage as seen by the driver.
struct Finished {
    stage: String,
    duration_ms: f64,
    result: Result<Result<StageOutcome, ContractViolationError>, String>,
}

/// Runs a [`StageGraph`] against an initial context.
///
/// An executor holds no per-run state and can be shared across runs.
#[derive(Debug, Clone)]
pub struct Executor {
    graph: Arc<StageGraph>,
    mode: ExecutionMode,
    sink: Arc<dyn EventSink>,
}

impl Executor {
    /// Creates an executor with concurrent scheduling and no event sink.
    #[must_use]
    pub fn new(graph: impl Into<Arc<StageGraph>>) -> Self {
        Self {
            graph: graph.into(),
            mode: ExecutionMode::default(),
            sink: Arc::new(NoOpEventSink),
        }
    }

    /// Creates an executor from configuration.
    #[must_use]
    pub fn from_config(graph: impl Into<Arc<StageGraph>>, config: &ExecutorConfig) -> Self {
        let executor = Self::new(graph).with_mode(config.mode);
        if config.log_events {
            executor.with_event_sink(Arc::new(LoggingEventSink::default()))
        } else {
            executor
        }
    }

    /// Sets the scheduling mode.
    #[must_use]
    pub fn with_mode(mut self, mode: ExecutionMode) -> Self {
        self.mode = mode;
        self
    }

    /// Sets the event sink.
    #[must_use]
    pub fn with_event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Returns the graph.
    #[must_use]
    pub fn graph(&self) -> &StageGraph {
        &self.graph
    }

    /// Returns the scheduling mode.
    #[must_use]
    pub fn mode(&self) -> ExecutionMode {
        self.mode
    }

    /// Runs the graph with a fresh run identity.
    ///
    /// # Errors
    ///
    /// Returns an error only when the run had to be aborted because a stage
    /// broke its output contract or a field was written twice. Stage
    /// failures are reported in the returned [`RunReport`].
    pub async fn run(&self, initial: FieldMap) -> Result<RunReport, EngineError> {
        self.run_with_identity(RunIdentity::new(), initial).await
    }

    /// Runs the graph synchronously on a private current-thread runtime.
    ///
    /// Must not be called from inside an async context.
    ///
    /// # Errors
    ///
    /// Returns an error if the runtime cannot be started, or for the same
    /// reasons as [`run`](Self::run).
    pub fn run_blocking(&self, initial: FieldMap) -> Result<RunReport, EngineError> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| EngineError::Runtime(e.to_string()))?;
        runtime.block_on(self.run(initial))
    }

    /// Runs the graph under the given identity.
    ///
    /// # Errors
    ///
    /// See [`run`](Self::run).
    pub async fn run_with_identity(
        &self,
        identity: RunIdentity,
        initial: FieldMap,
    ) -> Result<RunReport, EngineError> {
        let span = info_span!(
            "graph_run",
            graph = %self.graph.name(),
            run_id = %identity.run_id,
            request_id = %identity.label(),
        );
        self.drive(identity, initial).instrument(span).await
    }

    async fn drive(&self, identity: RunIdentity, initial: FieldMap) -> Result<RunReport, EngineError> {
        let timer = SpanTimer::start(self.graph.name());
        let run_id = identity.run_id;
        let graph = &self.graph;

        let mut ctx = ResultContext::from_fields(initial);
        let mut records: BTreeMap<String, StageRunRecord> = graph
            .stages()
            .map(|s| (s.name.clone(), StageRunRecord::pending(&s.name, s.role)))
            .collect();

        info!(stages = graph.stage_count(), mode = ?self.mode, "Run started");
        self.sink
            .emit(&LifecycleEvent::run(EventKind::RunStarted, run_id).with_data(serde_json::json!({
                "graph": graph.name(),
                "stages": graph.stage_count(),
            })))
            .await;

        let mut in_flight: FuturesUnordered<BoxFuture<'static, Finished>> = FuturesUnordered::new();
        let mut spawned: Vec<tokio::task::AbortHandle> = Vec::new();
        let mut abort: Option<StageError> = None;
        let mut iterations = 0usize;

        loop {
            if abort.is_none() {
                let ready: Vec<StageSpec> = graph.ready_stages(&records).into_iter().cloned().collect();
                let launch = match self.mode {
                    ExecutionMode::Concurrent => ready.len(),
                    ExecutionMode::Sequential if in_flight.is_empty() => ready.len().min(1),
                    ExecutionMode::Sequential => 0,
                };
                for spec in ready.into_iter().take(launch) {
                    if let Some(record) = records.get_mut(&spec.name) {
                        record.mark_running();
                    }
                    debug!(stage = %spec.name, role = %spec.role, "Stage started");
                    self.sink
                        .emit(&LifecycleEvent::stage(EventKind::StageStarted, run_id, &spec.name))
                        .await;
                    let projection = ctx.project(&spec.name, spec.required_inputs(), spec.optional_inputs());
                    in_flight.push(self.launch(spec, projection, &mut spawned));
                }
            }

            let Some(finished) = in_flight.next().await else {
                break;
            };
            iterations += 1;

            let Finished {
                stage,
                duration_ms,
                result,
            } = finished;
            let spec = graph
                .stage(&stage)
                .ok_or_else(|| EngineError::Internal(format!("finished stage '{stage}' is not in the graph")))?;

            let outcome = match result {
                Ok(Ok(outcome)) => outcome,
                Ok(Err(violation)) => {
                    spawned.iter().for_each(tokio::task::AbortHandle::abort);
                    error!(stage = %stage, error = %violation, "Stage violated its output contract");
                    return Err(violation.into());
                }
                Err(panic) => StageOutcome::from(StageError::new(&stage, "stage panicked").with_cause(panic)),
            };

            if let Some(record) = records.get_mut(&stage) {
                record.finish(&outcome, duration_ms);
            }

            let event = match &outcome {
                StageOutcome::Completed { .. } => {
                    info!(stage = %stage, duration_ms, "Stage completed");
                    LifecycleEvent::stage(EventKind::StageCompleted, run_id, &stage)
                        .with_data(serde_json::json!({ "duration_ms": duration_ms }))
                }
                StageOutcome::Skipped { reason } => {
                    info!(stage = %stage, reason = %reason, "Stage skipped");
                    LifecycleEvent::stage(EventKind::StageSkipped, run_id, &stage)
                        .with_data(serde_json::json!({ "reason": reason, "duration_ms": duration_ms }))
                }
                StageOutcome::Failed { error } => {
                    warn!(
                        stage = %stage,
                        role = %spec.role,
                        error = %error.message,
                        cause = ?error.cause,
                        duration_ms,
                        "Stage failed"
                    );
                    LifecycleEvent::stage(EventKind::StageFailed, run_id, &stage).with_data(serde_json::json!({
                        "error": error,
                        "duration_ms": duration_ms,
                    }))
                }
            };
            self.sink.emit(&event).await;

            match outcome {
                StageOutcome::Completed { data } => ctx.merge(&stage, data)?,
                StageOutcome::Skipped { .. } => ctx.mark_absent(&stage, spec.produced_outputs())?,
                StageOutcome::Failed { error } => {
                    if spec.role.aborts_run_on_failure() {
                        abort = Some(error);
                    }
                }
            }
        }

        let outcome = match abort {
            Some(error) => RunOutcome::Failed { error },
            None => self.settle(&records)?,
        };
        let duration_ms = timer.finish();

        info!(outcome = %outcome.status(), duration_ms, iterations, "Run finished");
        self.sink
            .emit(&LifecycleEvent::run(EventKind::RunFinished, run_id).with_data(serde_json::json!({
                "outcome": &outcome,
                "duration_ms": duration_ms,
            })))
            .await;

        Ok(RunReport {
            run_id,
            outcome,
            context: ctx,
            records,
            duration_ms,
        })
    }

    fn launch(
        &self,
        spec: StageSpec,
        projection: crate::context::ContextProjection,
        spawned: &mut Vec<tokio::task::AbortHandle>,
    ) -> BoxFuture<'static, Finished> {
        let timer = SpanTimer::start(spec.name.clone());
        let stage = spec.name.clone();

        match self.mode {
            ExecutionMode::Concurrent => {
                let handle = tokio::spawn(async move { spec.execute(&projection).await });
                spawned.push(handle.abort_handle());
                async move {
                    let result = handle.await.map_err(|e| {
                        if e.is_panic() {
                            panic_message(&*e.into_panic())
                        } else {
                            e.to_string()
                        }
                    });
                    Finished {
                        stage,
                        duration_ms: timer.finish(),
                        result,
                    }
                }
                .boxed()
            }
            ExecutionMode::Sequential => async move {
                let result = AssertUnwindSafe(spec.execute(&projection))
                    .catch_unwind()
                    .await
                    .map_err(|payload| panic_message(&*payload));
                Finished {
                    stage,
                    duration_ms: timer.finish(),
                    result,
                }
            }
            .boxed(),
        }
    }

    /// Derives the outcome of a run that was not aborted.
    fn settle(&self, records: &BTreeMap<String, StageRunRecord>) -> Result<RunOutcome, EngineError> {
        let stalled: Vec<&str> = records
            .values()
            .filter(|r| r.status == StageStatus::Pending)
            .map(|r| r.stage.as_str())
            .collect();
        if !stalled.is_empty() {
            return Err(EngineError::Internal(format!(
                "run stalled with pending stages: {}",
                stalled.join(", ")
            )));
        }

        let aggregation = self.graph.aggregation();
        let record = records.get(&aggregation.name);
        Ok(match record.map(|r| r.status) {
            Some(StageStatus::Completed) => RunOutcome::Completed,
            _ => RunOutcome::Skipped {
                reason: record
                    .and_then(|r| r.skip_reason.clone())
                    .unwrap_or_else(|| format!("stage '{}' produced nothing", aggregation.name)),
            },
        })
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| (*s).to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::RunStatus;
    use crate::events::CollectingEventSink;
    use crate::pipeline::GraphBuilder;
    use crate::stages::{FnStage, Stage, StageContract};
    use crate::testing::mocks::{FailingStage, StaticStage};
    use serde_json::json;

    fn graph_with(fan_out: Vec<Arc<dyn Stage>>) -> StageGraph {
        let mut builder = GraphBuilder::new("test")
            .entry(Arc::new(StaticStage::new("entry", &["audio_path"], &["transcript"])))
            .unwrap();
        for stage in fan_out {
            builder = builder.fan_out(stage).unwrap();
        }
        builder
            .aggregate(Arc::new(StaticStage::new("agg", &["transcript"], &["report"])))
            .unwrap()
            .build()
            .unwrap()
    }

    fn initial() -> FieldMap {
        FieldMap::from([("audio_path".to_string(), json!("/tmp/a.wav"))])
    }

    #[test]
    fn test_config_defaults() {
        let config: ExecutorConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config, ExecutorConfig::default());
        assert_eq!(config.mode, ExecutionMode::Concurrent);
        assert!(config.log_events);

        let config: ExecutorConfig = serde_json::from_value(json!({"mode": "sequential"})).unwrap();
        assert_eq!(config.mode, ExecutionMode::Sequential);
    }

    #[tokio::test]
    async fn test_run_completes() {
        let graph = graph_with(vec![
            Arc::new(StaticStage::new("a", &["transcript"], &["a_out"])),
            Arc::new(StaticStage::new("b", &["transcript"], &["b_out"])),
        ]);
        let report = Executor::new(graph).run(initial()).await.unwrap();

        assert_eq!(report.status(), RunStatus::Completed);
        assert!(report.field("report").is_some());
        assert!(report.records.values().all(StageRunRecord::is_terminal));
        assert_eq!(report.context.owner("a_out"), Some("a"));
    }

    #[tokio::test]
    async fn test_emits_lifecycle_events() {
        let sink = Arc::new(CollectingEventSink::new());
        let graph = graph_with(vec![Arc::new(StaticStage::new("a", &["transcript"], &["a_out"]))]);
        Executor::new(graph)
            .with_mode(ExecutionMode::Sequential)
            .with_event_sink(sink.clone())
            .run(initial())
            .await
            .unwrap();

        let kinds = sink.kinds();
        assert_eq!(kinds.first(), Some(&EventKind::RunStarted));
        assert_eq!(kinds.last(), Some(&EventKind::RunFinished));
        assert_eq!(sink.events_of_kind(EventKind::StageStarted).len(), 3);
        assert_eq!(sink.events_of_kind(EventKind::StageCompleted).len(), 3);
    }

    #[tokio::test]
    async fn test_contract_violation_aborts_run() {
        let leaky: Arc<dyn Stage> = Arc::new(FnStage::new(
            "leaky",
            StageContract::new().requires(["transcript"]).produces(["leaky_out"]),
            |_| StageOutcome::completed_value("something_else", json!(1)),
        ));
        let graph = graph_with(vec![leaky]);

        let err = Executor::new(graph).run(initial()).await.unwrap_err();
        assert!(matches!(err, EngineError::ContractViolation(ref v) if v.stage == "leaky"));
    }

    #[tokio::test]
    async fn test_seeded_field_conflict() {
        let graph = graph_with(vec![Arc::new(StaticStage::new("a", &["transcript"], &["a_out"]))]);
        let mut seeded = initial();
        seeded.insert("transcript".to_string(), json!("already here"));

        let err = Executor::new(graph).run(seeded).await.unwrap_err();
        assert!(matches!(err, EngineError::FieldConflict(ref c) if c.field == "transcript"));
    }

    #[tokio::test]
    async fn test_panicking_stage_is_isolated() {
        for mode in [ExecutionMode::Concurrent, ExecutionMode::Sequential] {
            let panicky: Arc<dyn Stage> = Arc::new(FnStage::new(
                "panicky",
                StageContract::new().requires(["transcript"]).produces(["p_out"]),
                |_| panic!("model returned garbage"),
            ));
            let graph = graph_with(vec![
                panicky,
                Arc::new(StaticStage::new("a", &["transcript"], &["a_out"])),
            ]);

            let report = Executor::new(graph).with_mode(mode).run(initial()).await.unwrap();

            assert!(report.is_completed());
            let error = report.record("panicky").and_then(|r| r.error.clone()).unwrap();
            assert_eq!(error.message, "stage panicked");
            assert_eq!(error.cause.as_deref(), Some("model returned garbage"));
            assert!(!report.context.contains("p_out"));
        }
    }

    #[tokio::test]
    async fn test_entry_failure_stops_run() {
        let graph = GraphBuilder::new("failing-entry")
            .entry(Arc::new(FailingStage::new("entry", &["transcript"], "boom")))
            .unwrap()
            .fan_out(Arc::new(StaticStage::new("a", &["transcript"], &["a_out"])))
            .unwrap()
            .aggregate(Arc::new(StaticStage::new("agg", &["transcript"], &["report"])))
            .unwrap()
            .build()
            .unwrap();

        let report = Executor::new(graph).run(initial()).await.unwrap();

        assert!(report.is_failed());
        assert_eq!(report.stage_status("a"), Some(StageStatus::Pending));
        assert_eq!(report.stage_status("agg"), Some(StageStatus::Pending));
        assert!(matches!(report.outcome, RunOutcome::Failed { ref error } if error.stage == "entry"));
    }

    #[test]
    fn test_run_blocking() {
        let graph = graph_with(vec![Arc::new(StaticStage::new("a", &["transcript"], &["a_out"]))]);
        let report = Executor::new(graph).run_blocking(initial()).unwrap();
        assert!(report.is_completed());
    }
}
