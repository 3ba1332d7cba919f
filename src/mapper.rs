//! Mapping parsed reports onto normalized results.
//!
//! [`map_report`] is a pure function: the same report, output and process
//! error always produce the same [`NormalizedResult`], which makes it safe
//! to test against golden files.
//!
//! # Status Derivation
//!
//! | Report | Process | Status |
//! |--------|---------|--------|
//! | any failure counter or failed check | any | failed |
//! | clean | ok | passed |
//! | clean | error | passed, plus a warning about the discrepancy |
//!
//! Reports that cannot be parsed never reach the mapper; the orchestrator
//! turns them into [`Status::Error`] results.

use std::time::Duration;

use crate::process::ProcessError;
use crate::report::RawReport;
use crate::result::{NormalizedResult, Status, StepResult};

/// Name of the synthetic step used when a report has no finer breakdown.
pub const AGGREGATE_STEP: &str = "aggregate";

/// Converts a parsed report into a normalized result.
///
/// Steps are emitted in a fixed order: scenarios, expectation checks, then
/// failure counters, each sorted by name. A report without any of those
/// yields a single [`AGGREGATE_STEP`].
pub fn map_report(
    report: &RawReport,
    output: &str,
    process_error: Option<&ProcessError>,
) -> NormalizedResult {
    let mut steps = Vec::new();
    let mut errors = Vec::new();

    let session_length = report
        .summaries
        .get("vusers.session_length")
        .and_then(|s| s.median)
        .map(millis);

    for (scenario, created) in &report.scenarios {
        let mut step = StepResult::passed(scenario)
            .with_message(format!("{} virtual users created", created));
        if let Some(median) = session_length {
            step = step.with_duration(median);
        }
        steps.push(step);
    }

    for (check, counts) in report.checks() {
        if counts.failed > 0 {
            let message = format!(
                "check {} failed {} of {} times",
                check,
                counts.failed,
                counts.passed.saturating_add(counts.failed)
            );
            errors.push(message.clone());
            steps.push(StepResult::failed(check, message));
        } else {
            steps.push(
                StepResult::passed(check).with_message(format!("{} passed", counts.passed)),
            );
        }
    }

    for (counter, count) in report.failure_counters() {
        let message = format!("{}: {}", counter, count);
        errors.push(message.clone());
        steps.push(StepResult::failed(counter, message));
    }

    let duration = report.duration().unwrap_or(Duration::ZERO);

    if steps.is_empty() {
        let mut message = format!("{} requests completed", report.requests_completed());
        if report.periods > 0 {
            message.push_str(&format!(" over {} reporting periods", report.periods));
        }
        steps.push(
            StepResult::passed(AGGREGATE_STEP)
                .with_message(message)
                .with_duration(duration),
        );
    }

    let status = if report.has_failures() {
        Status::Failed
    } else {
        Status::Passed
    };

    let mut result = NormalizedResult::new(status, steps)
        .with_duration(duration)
        .with_output(output);
    result.errors = errors;

    if let Some(err) = process_error {
        let warning = match status {
            Status::Passed => format!(
                "load test tool reported an error but the report shows no failures: {}",
                err
            ),
            _ => format!("load test tool reported an error: {}", err),
        };
        result.append_warning(warning);
    }

    result
}

fn millis(ms: f64) -> Duration {
    if ms.is_finite() && ms > 0.0 {
        Duration::from_secs_f64(ms / 1000.0)
    } else {
        Duration::ZERO
    }
}
