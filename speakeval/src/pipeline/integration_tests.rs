//! End-to-end tests for graph execution.

use crate::assessment::{default_graph, fields, initial_context, stage_names, Section};
use crate::core::{FieldMap, RunStatus, StageStatus};
use crate::errors::CollaboratorError;
use crate::events::{CollectingEventSink, EventKind};
use crate::pipeline::{ExecutionMode, Executor, GraphBuilder, RunOutcome, StageGraph};
use crate::stages::Stage;
use crate::testing::fixtures::{section_schema_name, VERDICT_SCHEMA_NAME};
use crate::testing::{
    assert_field_absent, assert_field_present, assert_run_status, assert_stage_status,
    assert_stages_with_status, FailingStage, ScriptedModel, ScriptedTranscriber, SlowStage, StaticStage,
    SAMPLE_TRANSCRIPT,
};
use pretty_assertions::assert_eq;
use serde_json::json;
use std::sync::Arc;
use tempfile::NamedTempFile;

const MODES: [ExecutionMode; 2] = [ExecutionMode::Concurrent, ExecutionMode::Sequential];

fn recording() -> NamedTempFile {
    tempfile::Builder::new()
        .suffix(".wav")
        .tempfile()
        .unwrap()
}

fn synthetic_graph(fan_out: Vec<Arc<dyn Stage>>, reads: &[&str]) -> StageGraph {
    let mut builder = GraphBuilder::new("synthetic")
        .entry(Arc::new(StaticStage::new("entry", &["source"], &["text"])))
        .unwrap();
    for stage in fan_out {
        builder = builder.fan_out(stage).unwrap();
    }
    builder
        .aggregate(Arc::new(StaticStage::new("agg", &["text"], &["summary"]).reading(reads)))
        .unwrap()
        .build()
        .unwrap()
}

fn source() -> FieldMap {
    FieldMap::from([("source".to_string(), json!("input"))])
}

// ============================================================================
// Engine properties
// ============================================================================

#[tokio::test]
async fn test_each_stage_runs_at_most_once() {
    for mode in MODES {
        let fan_out: Vec<Arc<dyn Stage>> = vec![
            Arc::new(StaticStage::new("a", &["text"], &["a_out"])),
            Arc::new(FailingStage::new("b", &["b_out"], "boom").requiring(&["text"])),
            Arc::new(StaticStage::new("c", &["missing"], &["c_out"])),
        ];
        let graph = synthetic_graph(fan_out, &["a_out", "b_out", "c_out"]);
        let sink = Arc::new(CollectingEventSink::new());
        let executor = Executor::new(graph).with_mode(mode).with_event_sink(sink.clone());

        let report = executor.run(source()).await.unwrap();

        assert_eq!(report.records.len(), 5);
        assert!(report.records.values().all(|r| r.is_terminal()));
        assert_eq!(sink.events_of_kind(EventKind::StageStarted).len(), 5);
        for stage in ["entry", "a", "b", "c", "agg"] {
            assert_eq!(sink.events_for_stage(stage).len(), 2, "stage {stage} in {mode:?}");
        }
    }
}

#[tokio::test]
async fn test_skipped_entry_skips_everything() {
    let a = Arc::new(StaticStage::new("a", &["text"], &["a_out"]));
    let b = Arc::new(StaticStage::new("b", &["text"], &["b_out"]));
    let graph = synthetic_graph(
        vec![a.clone() as Arc<dyn Stage>, b.clone() as Arc<dyn Stage>],
        &["a_out", "b_out"],
    );

    let report = Executor::new(graph).run(FieldMap::new()).await.unwrap();

    assert_run_status(&report, RunStatus::Skipped);
    assert_stages_with_status(&report, StageStatus::Skipped, &["entry", "a", "b", "agg"]);
    assert_eq!(a.call_count(), 0);
    assert_eq!(b.call_count(), 0);
    assert_field_absent(&report, "summary");
    assert_eq!(report.context.raw("text"), Some(&serde_json::Value::Null));
}

#[tokio::test]
async fn test_one_fan_out_failure_is_tolerated() {
    for mode in MODES {
        let fan_out: Vec<Arc<dyn Stage>> = vec![
            Arc::new(StaticStage::new("a", &["text"], &["a_out"])),
            Arc::new(FailingStage::new("b", &["b_out"], "model unavailable").requiring(&["text"])),
            Arc::new(StaticStage::new("c", &["text"], &["c_out"])),
        ];
        let agg_inputs = ["a_out", "b_out", "c_out"];
        let graph = synthetic_graph(fan_out, &agg_inputs);

        let report = Executor::new(graph).with_mode(mode).run(source()).await.unwrap();

        assert_run_status(&report, RunStatus::Completed);
        assert_stage_status(&report, "b", StageStatus::Failed);
        assert_stage_status(&report, "agg", StageStatus::Completed);
        assert_field_present(&report, "a_out");
        assert_field_present(&report, "c_out");
        assert!(!report.context.contains("b_out"));
        assert_field_present(&report, "summary");

        let failures = report.failures();
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].stage, "b");
        assert_eq!(failures[0].message, "model unavailable");
    }
}

#[tokio::test]
async fn test_aggregation_sees_only_successful_inputs() {
    let agg = Arc::new(StaticStage::new("agg", &["text"], &["summary"]).reading(&["a_out", "b_out"]));
    let graph = GraphBuilder::new("synthetic")
        .entry(Arc::new(StaticStage::new("entry", &["source"], &["text"])))
        .unwrap()
        .fan_out(Arc::new(StaticStage::new("a", &["text"], &["a_out"])))
        .unwrap()
        .fan_out(Arc::new(FailingStage::new("b", &["b_out"], "boom")))
        .unwrap()
        .aggregate(agg.clone())
        .unwrap()
        .build()
        .unwrap();

    Executor::new(graph).run(source()).await.unwrap();

    let inputs = agg.recorded_inputs();
    assert_eq!(inputs.len(), 1);
    assert_eq!(inputs[0].get("a_out"), Some(&json!("a:a_out")));
    assert!(!inputs[0].contains_key("b_out"));
}

#[tokio::test]
async fn test_merge_is_independent_of_completion_order() {
    const ORDERS: [[&str; 3]; 6] = [
        ["a", "b", "c"],
        ["a", "c", "b"],
        ["b", "a", "c"],
        ["b", "c", "a"],
        ["c", "a", "b"],
        ["c", "b", "a"],
    ];
    // Earlier insertions sleep longer, so concurrent runs finish in reverse
    // insertion order and sequential runs launch in insertion order.
    const DELAYS_MS: [u64; 3] = [25, 15, 5];
    let mut serialized = Vec::new();

    for mode in MODES {
        for order in ORDERS {
            let fan_out: Vec<Arc<dyn Stage>> = order
                .iter()
                .zip(DELAYS_MS)
                .map(|(name, ms)| {
                    let out = format!("{name}_out");
                    let inner: Arc<dyn Stage> = Arc::new(StaticStage::new(*name, &["text"], &[out.as_str()]));
                    Arc::new(SlowStage::with_delay_ms(inner, ms)) as Arc<dyn Stage>
                })
                .collect();
            let graph = synthetic_graph(fan_out, &["a_out", "b_out", "c_out"]);

            let report = Executor::new(graph).with_mode(mode).run(source()).await.unwrap();
            assert_run_status(&report, RunStatus::Completed);
            serialized.push(serde_json::to_string(&report.context).unwrap());
        }
    }

    assert_eq!(serialized.len(), 12);
    assert!(serialized.windows(2).all(|w| w[0] == w[1]));
}

// ============================================================================
// Speaking assessment graph
// ============================================================================

async fn assess(
    transcriber: &Arc<ScriptedTranscriber>,
    model: &Arc<ScriptedModel>,
    initial: FieldMap,
    mode: ExecutionMode,
) -> crate::pipeline::RunReport {
    let graph = default_graph(transcriber.clone(), model.clone()).unwrap();
    Executor::new(graph).with_mode(mode).run(initial).await.unwrap()
}

#[tokio::test]
async fn test_assessment_happy_path() {
    let audio = recording();
    let transcriber = Arc::new(ScriptedTranscriber::sample());
    let model = Arc::new(ScriptedModel::new());

    let report = assess(&transcriber, &model, initial_context(audio.path()), ExecutionMode::Concurrent).await;

    assert_run_status(&report, RunStatus::Completed);
    assert_eq!(report.failures().len(), 0);
    assert_eq!(transcriber.call_count(), 1);
    assert_eq!(model.requests().len(), 5);
    assert_eq!(model.call_count(VERDICT_SCHEMA_NAME), 1);

    let final_feedback = report.field(fields::FINAL_FEEDBACK).unwrap();
    assert_eq!(final_feedback["overall_score"], 6.5);
    assert_eq!(final_feedback["transcript"], SAMPLE_TRANSCRIPT);
    assert_eq!(final_feedback["general_suggestions"].as_array().unwrap().len(), 2);

    // 17 words over 6 seconds
    let wpm = report.field(fields::FLUENCY_ANALYSIS).unwrap()["wpm"].as_f64().unwrap();
    assert!((wpm - 170.0).abs() < 1e-9, "wpm = {wpm}");
    assert!(report.field(fields::GRAMMAR_ANALYSIS).unwrap().get("wpm").is_none());
}

#[tokio::test]
async fn test_report_details_are_unmodified_analyses() {
    let audio = recording();
    let transcriber = Arc::new(ScriptedTranscriber::sample());
    let model = Arc::new(ScriptedModel::new());

    let report = assess(&transcriber, &model, initial_context(audio.path()), ExecutionMode::Sequential).await;

    let details = &report.field(fields::FINAL_FEEDBACK).unwrap()["details"];
    for section in Section::ALL {
        assert_eq!(
            &details[section.key()],
            report.field(section.output_field()).unwrap(),
            "details.{} differs from {}",
            section.key(),
            section.output_field()
        );
    }
}

#[tokio::test]
async fn test_failed_section_is_null_in_report() {
    let audio = recording();
    let transcriber = Arc::new(ScriptedTranscriber::sample());
    let model = Arc::new(
        ScriptedModel::new()
            .failing(section_schema_name(Section::Grammar), CollaboratorError::Transport("reset".into())),
    );

    for mode in MODES {
        let report = assess(&transcriber, &model, initial_context(audio.path()), mode).await;

        assert_run_status(&report, RunStatus::Completed);
        assert_stage_status(&report, stage_names::ANALYZE_GRAMMAR, StageStatus::Failed);
        assert_field_absent(&report, fields::GRAMMAR_ANALYSIS);

        let details = &report.field(fields::FINAL_FEEDBACK).unwrap()["details"];
        assert_eq!(details["grammar"], serde_json::Value::Null);
        assert!(details["fluency"].is_object());
        assert!(details["pronunciation"].is_object());
        assert!(details["vocabulary"].is_object());
    }

    let prompt = &model
        .requests()
        .into_iter()
        .find(|r| r.schema_name == VERDICT_SCHEMA_NAME)
        .unwrap()
        .user;
    assert!(prompt.contains("Not available."));
}

#[tokio::test]
async fn test_empty_recording_skips_run() {
    let audio = recording();
    let transcriber = Arc::new(ScriptedTranscriber::new("", 0.0));
    let model = Arc::new(ScriptedModel::new());

    let report = assess(&transcriber, &model, initial_context(audio.path()), ExecutionMode::Concurrent).await;

    assert_run_status(&report, RunStatus::Skipped);
    assert_stage_status(&report, stage_names::TRANSCRIBE, StageStatus::Completed);
    for section in Section::ALL {
        assert_stage_status(&report, section.stage_name(), StageStatus::Skipped);
    }
    assert_stage_status(&report, stage_names::GENERATE_FEEDBACK, StageStatus::Skipped);
    assert_field_absent(&report, fields::FINAL_FEEDBACK);
    assert!(model.requests().is_empty());

    let RunOutcome::Skipped { reason } = &report.outcome else {
        panic!("expected skipped outcome, got {:?}", report.outcome);
    };
    assert!(reason.contains(fields::TRANSCRIPT), "{reason}");
}

#[tokio::test]
async fn test_missing_recording_fails_run() {
    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join("nope.wav");
    let transcriber = Arc::new(ScriptedTranscriber::sample());
    let model = Arc::new(ScriptedModel::new());

    for mode in MODES {
        let report = assess(&transcriber, &model, initial_context(&missing), mode).await;

        assert_run_status(&report, RunStatus::Failed);
        let RunOutcome::Failed { error } = &report.outcome else {
            panic!("expected failed outcome");
        };
        assert_eq!(error.stage, stage_names::TRANSCRIBE);
        assert!(error.message.contains("Audio file not found"));
        assert_stage_status(&report, stage_names::ANALYZE_FLUENCY, StageStatus::Pending);
    }
    assert_eq!(transcriber.call_count(), 0);
    assert!(model.requests().is_empty());
}

#[tokio::test]
async fn test_aggregation_failure_fails_run() {
    let audio = recording();
    let transcriber = Arc::new(ScriptedTranscriber::sample());
    let model = Arc::new(ScriptedModel::new().answering(
        VERDICT_SCHEMA_NAME,
        json!({"overall_score": 12.0, "general_suggestions": []}),
    ));

    let report = assess(&transcriber, &model, initial_context(audio.path()), ExecutionMode::Concurrent).await;

    assert_run_status(&report, RunStatus::Failed);
    let RunOutcome::Failed { error } = &report.outcome else {
        panic!("expected failed outcome");
    };
    assert_eq!(error.stage, stage_names::GENERATE_FEEDBACK);
    assert!(error.message.contains("overall_score must be between"));
    assert_field_absent(&report, fields::FINAL_FEEDBACK);
}
