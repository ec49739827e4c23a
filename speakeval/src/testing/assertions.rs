//! Assertions over run reports.

use crate::core::{RunStatus, StageStatus};
use crate::pipeline::RunReport;

/// Asserts the overall run status.
pub fn assert_run_status(report: &RunReport, expected: RunStatus) {
    assert_eq!(
        report.status(),
        expected,
        "Expected run status {:?}, got {:?} (outcome: {:?})",
        expected,
        report.status(),
        report.outcome
    );
}

/// Asserts the terminal status of one stage.
pub fn assert_stage_status(report: &RunReport, stage: &str, expected: StageStatus) {
    let actual = report.stage_status(stage);
    assert_eq!(
        actual,
        Some(expected),
        "Expected stage '{stage}' to be {expected:?}, got {actual:?}"
    );
}

/// Asserts that a field holds a truthy value.
pub fn assert_field_present(report: &RunReport, field: &str) {
    assert!(
        report.context.is_present(field),
        "Expected field '{}' to be present. Fields: {:?}",
        field,
        report.context.fields().keys().collect::<Vec<_>>()
    );
}

/// Asserts that a field is missing or falsy.
pub fn assert_field_absent(report: &RunReport, field: &str) {
    assert!(
        !report.context.is_present(field),
        "Expected field '{}' to be absent, found {:?}",
        field,
        report.context.raw(field)
    );
}

/// Asserts that exactly `stages` have `status`, in any order.
pub fn assert_stages_with_status(report: &RunReport, status: StageStatus, stages: &[&str]) {
    let mut actual = report.stages_with_status(status);
    actual.sort_unstable();
    let mut expected = stages.to_vec();
    expected.sort_unstable();
    assert_eq!(actual, expected, "Stages with status {status:?} differ");
}
