//! Artillery JSON report parsing.
//!
//! Artillery writes its report with `-o <file>`. Two layouts are in the
//! wild and both are accepted:
//!
//! ```json
//! {"aggregate": {
//!    "counters": {"vusers.created": 10, "vusers.failed": 1, "errors.ETIMEDOUT": 1},
//!    "summaries": {"http.response_time": {"min": 3, "max": 80, "median": 12.1, "p95": 55, "p99": 78}},
//!    "firstCounterAt": 1700000000000, "lastCounterAt": 1700000060000
//! }}
//! ```
//!
//! ```json
//! {"aggregate": {
//!    "timestamp": "2023-11-14T22:13:20.000Z",
//!    "scenariosCreated": 10, "scenariosCompleted": 9,
//!    "requestsCompleted": 100, "requestsFailed": 2,
//!    "scenarioCounts": {"checkout": 10},
//!    "errors": {"ECONNREFUSED": 1}, "codes": {"200": 98},
//!    "latency": {"min": 3, "max": 80, "median": 12.1, "p95": 55, "p99": 78}
//! }}
//! ```
//!
//! Both are folded into one [`RawReport`]. Legacy top-level counters keep
//! their JSON names (`requestsFailed`), the legacy `errors` and `codes` maps
//! become `errors.<code>` and `http.codes.<code>` counters, and legacy
//! latency becomes the `http.response_time` summary.
//!
//! The parser makes exactly one read attempt. Waiting for the tool to flush
//! the file is the caller's business.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, TimeZone, Utc};
use serde::Deserialize;

/// Counter prefix for error codes.
pub const ERRORS_PREFIX: &str = "errors.";

/// Counter prefix for passed expectation checks.
pub const CHECK_OK_PREFIX: &str = "plugins.expect.ok";

/// Counter prefix for failed expectation checks.
pub const CHECK_FAILED_PREFIX: &str = "plugins.expect.failed";

/// Counter prefix for per-scenario virtual user counts.
const CREATED_BY_NAME_PREFIX: &str = "vusers.created_by_name.";

/// Errors that can occur while reading a report.
#[derive(Debug, thiserror::Error)]
pub enum ReportParseError {
    /// The report file does not exist (yet).
    #[error("report file not found: {0}")]
    NotFound(PathBuf),

    /// The report file exists but could not be read.
    #[error("failed to read report {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The report is not valid JSON or has badly typed fields.
    #[error("malformed report: {0}")]
    Malformed(#[from] serde_json::Error),

    /// The report has no `aggregate` section.
    #[error("report has no aggregate section")]
    MissingAggregate,

    /// The `aggregate` section holds no counters, so nothing was measured.
    #[error("report aggregate has no counters")]
    EmptyAggregate,
}

/// Latency or duration statistics, in milliseconds.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct Summary {
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub count: Option<u64>,
    pub mean: Option<f64>,
    pub median: Option<f64>,
    pub p95: Option<f64>,
    pub p99: Option<f64>,
}

/// A parsed Artillery report.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawReport {
    /// Named counters from the aggregate section.
    pub counters: BTreeMap<String, u64>,

    /// Timing statistics keyed by metric name.
    pub summaries: BTreeMap<String, Summary>,

    /// Virtual users created per scenario name.
    pub scenarios: BTreeMap<String, u64>,

    pub first_counter_at: Option<DateTime<Utc>>,
    pub last_counter_at: Option<DateTime<Utc>>,

    /// Number of intermediate reporting periods.
    pub periods: usize,
}

impl RawReport {
    /// Returns a counter value, or zero if absent.
    pub fn counter(&self, name: &str) -> u64 {
        self.counters.get(name).copied().unwrap_or(0)
    }

    /// Requests that received a response.
    pub fn requests_completed(&self) -> u64 {
        self.counters
            .get("requestsCompleted")
            .or_else(|| self.counters.get("http.responses"))
            .copied()
            .unwrap_or(0)
    }

    /// Pass/fail counts per named expectation check.
    ///
    /// Only the aggregate `plugins.expect.failed` counter without per-check
    /// names is reported as a check called `expect`.
    pub fn checks(&self) -> BTreeMap<String, CheckCounts> {
        let mut checks: BTreeMap<String, CheckCounts> = BTreeMap::new();
        for (name, count) in &self.counters {
            if let Some(check) = check_name(name, CHECK_OK_PREFIX) {
                let counts = checks.entry(check.to_string()).or_default();
                counts.passed = counts.passed.saturating_add(*count);
            } else if let Some(check) = check_name(name, CHECK_FAILED_PREFIX) {
                let counts = checks.entry(check.to_string()).or_default();
                counts.failed = counts.failed.saturating_add(*count);
            }
        }

        let aggregate_failed = self.counter(CHECK_FAILED_PREFIX);
        if checks.is_empty() && aggregate_failed > 0 {
            checks.insert(
                "expect".to_string(),
                CheckCounts {
                    passed: self.counter(CHECK_OK_PREFIX),
                    failed: aggregate_failed,
                },
            );
        }
        checks
    }

    /// Non-zero counters that indicate failure, in counter-name order.
    ///
    /// Expectation checks are reported through [`checks`](Self::checks)
    /// instead.
    pub fn failure_counters(&self) -> Vec<(&str, u64)> {
        self.counters
            .iter()
            .filter(|(name, count)| **count > 0 && is_failure_counter(name))
            .map(|(name, count)| (name.as_str(), *count))
            .collect()
    }

    /// Returns `true` if any failure counter or check failure is non-zero.
    pub fn has_failures(&self) -> bool {
        !self.failure_counters().is_empty() || self.checks().values().any(|c| c.failed > 0)
    }

    /// Wall-clock span between the first and last counters.
    pub fn duration(&self) -> Option<std::time::Duration> {
        let (first, last) = (self.first_counter_at?, self.last_counter_at?);
        (last - first).to_std().ok()
    }
}

/// Pass/fail tally for a single expectation check.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CheckCounts {
    pub passed: u64,
    pub failed: u64,
}

fn check_name<'a>(counter: &'a str, prefix: &str) -> Option<&'a str> {
    counter
        .strip_prefix(prefix)?
        .strip_prefix('.')
        .filter(|name| !name.is_empty())
}

/// Returns `true` for counters whose non-zero value means the run failed.
pub fn is_failure_counter(name: &str) -> bool {
    matches!(name, "requestsFailed" | "scenariosFailed" | "vusers.failed")
        || name.starts_with(ERRORS_PREFIX)
}

/// Reads and parses the report at `path`.
///
/// # Errors
///
/// Returns [`ReportParseError::NotFound`] if the file does not exist, and
/// any error from [`parse_report`].
pub fn read_report(path: &Path) -> Result<RawReport, ReportParseError> {
    let bytes = std::fs::read(path).map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => ReportParseError::NotFound(path.to_path_buf()),
        _ => ReportParseError::Io {
            path: path.to_path_buf(),
            source: e,
        },
    })?;
    parse_report(&bytes)
}

/// Parses report bytes.
///
/// # Errors
///
/// Returns [`ReportParseError::Malformed`] for invalid JSON (including an
/// empty, not yet flushed file), [`ReportParseError::MissingAggregate`]
/// when there is no `aggregate` object and [`ReportParseError::EmptyAggregate`]
/// when it counts nothing.
pub fn parse_report(bytes: &[u8]) -> Result<RawReport, ReportParseError> {
    let document: ReportDocument = serde_json::from_slice(bytes)?;
    let aggregate = document
        .aggregate
        .ok_or(ReportParseError::MissingAggregate)?;

    let mut report = RawReport {
        periods: document.intermediate.len(),
        ..Default::default()
    };

    report.counters = aggregate.counters;
    report.summaries = aggregate.summaries;

    for (name, value) in [
        ("scenariosCreated", aggregate.scenarios_created),
        ("scenariosCompleted", aggregate.scenarios_completed),
        ("scenariosFailed", aggregate.scenarios_failed),
        ("requestsCompleted", aggregate.requests_completed),
        ("requestsFailed", aggregate.requests_failed),
    ] {
        if let Some(value) = value {
            report.counters.insert(name.to_string(), value);
        }
    }
    for (code, count) in aggregate.errors {
        let total = report
            .counters
            .entry(format!("{}{}", ERRORS_PREFIX, code))
            .or_default();
        *total = total.saturating_add(count);
    }
    for (code, count) in aggregate.codes {
        let total = report
            .counters
            .entry(format!("http.codes.{}", code))
            .or_default();
        *total = total.saturating_add(count);
    }
    if let Some(latency) = aggregate.latency {
        report
            .summaries
            .entry("http.response_time".to_string())
            .or_insert(latency);
    }
    if let Some(duration) = aggregate.scenario_duration {
        report
            .summaries
            .entry("vusers.session_length".to_string())
            .or_insert(duration);
    }

    report.scenarios = aggregate.scenario_counts;
    if report.counters.is_empty() && report.scenarios.is_empty() {
        return Err(ReportParseError::EmptyAggregate);
    }
    for (name, count) in &report.counters {
        if let Some(scenario) = name.strip_prefix(CREATED_BY_NAME_PREFIX) {
            report
                .scenarios
                .entry(scenario.to_string())
                .or_insert(*count);
        }
    }

    report.first_counter_at = aggregate
        .first_counter_at
        .and_then(|ms| Utc.timestamp_millis_opt(ms).single())
        .or(aggregate.timestamp);
    report.last_counter_at = aggregate
        .last_counter_at
        .and_then(|ms| Utc.timestamp_millis_opt(ms).single());

    Ok(report)
}

#[derive(Deserialize)]
struct ReportDocument {
    aggregate: Option<AggregateDocument>,
    #[serde(default)]
    intermediate: Vec<serde_json::Value>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AggregateDocument {
    #[serde(default)]
    counters: BTreeMap<String, u64>,
    #[serde(default)]
    summaries: BTreeMap<String, Summary>,
    first_counter_at: Option<i64>,
    last_counter_at: Option<i64>,

    timestamp: Option<DateTime<Utc>>,
    scenarios_created: Option<u64>,
    scenarios_completed: Option<u64>,
    scenarios_failed: Option<u64>,
    requests_completed: Option<u64>,
    requests_failed: Option<u64>,
    #[serde(default)]
    scenario_counts: BTreeMap<String, u64>,
    #[serde(default)]
    errors: BTreeMap<String, u64>,
    #[serde(default)]
    codes: BTreeMap<String, u64>,
    latency: Option<Summary>,
    scenario_duration: Option<Summary>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_minimal_legacy_report() {
        let report =
            parse_report(br#"{"aggregate":{"requestsCompleted":100,"requestsFailed":0}}"#)
                .unwrap();
        assert_eq!(report.requests_completed(), 100);
        assert_eq!(report.counter("requestsFailed"), 0);
        assert!(!report.has_failures());
        assert!(report.duration().is_none());
    }

    #[test]
    fn test_parse_legacy_report_folds_maps() {
        let report = parse_report(
            br#"{"aggregate":{
                "timestamp":"2023-11-14T22:13:20.000Z",
                "scenariosCreated":10,"scenariosCompleted":9,
                "requestsCompleted":80,"requestsFailed":20,
                "scenarioCounts":{"checkout":6,"browse":4},
                "errors":{"ECONNREFUSED":3},
                "codes":{"200":77,"500":3},
                "latency":{"min":3.1,"max":80,"median":12.5,"p95":55,"p99":78}
            },"intermediate":[{},{}]}"#,
        )
        .unwrap();

        assert_eq!(report.counter("scenariosCreated"), 10);
        assert_eq!(report.counter("errors.ECONNREFUSED"), 3);
        assert_eq!(report.counter("http.codes.500"), 3);
        assert_eq!(report.scenarios.get("checkout"), Some(&6));
        assert_eq!(report.periods, 2);
        assert_eq!(
            report.summaries["http.response_time"].p95,
            Some(55.0)
        );
        assert!(report.first_counter_at.is_some());
        assert_eq!(
            report.failure_counters(),
            vec![("errors.ECONNREFUSED", 3), ("requestsFailed", 20)]
        );
    }

    #[test]
    fn test_parse_counters_report() {
        let report = parse_report(
            br#"{"aggregate":{
                "counters":{
                    "vusers.created":5,
                    "vusers.created_by_name.login":5,
                    "vusers.failed":0,
                    "http.responses":50,
                    "plugins.expect.ok":48,
                    "plugins.expect.ok.statusCode":24,
                    "plugins.expect.ok.contentType":24,
                    "plugins.expect.failed":2,
                    "plugins.expect.failed.statusCode":2
                },
                "summaries":{"http.response_time":{"min":1,"max":9,"count":50,"median":4.2,"p95":8.1,"p99":9}},
                "firstCounterAt":1700000000000,
                "lastCounterAt":1700000061500
            }}"#,
        )
        .unwrap();

        assert_eq!(report.requests_completed(), 50);
        assert_eq!(report.scenarios.get("login"), Some(&5));
        assert_eq!(report.duration(), Some(std::time::Duration::from_millis(61_500)));

        let checks = report.checks();
        assert_eq!(checks.len(), 2);
        assert_eq!(checks["statusCode"], CheckCounts { passed: 24, failed: 2 });
        assert_eq!(checks["contentType"], CheckCounts { passed: 24, failed: 0 });
        assert!(report.failure_counters().is_empty());
        assert!(report.has_failures());
    }

    #[test]
    fn test_aggregate_check_without_names() {
        let report = parse_report(
            br#"{"aggregate":{"counters":{"plugins.expect.ok":3,"plugins.expect.failed":1}}}"#,
        )
        .unwrap();
        let checks = report.checks();
        assert_eq!(checks["expect"], CheckCounts { passed: 3, failed: 1 });
    }

    #[test]
    fn test_empty_aggregate() {
        for body in [
            r#"{"aggregate":{}}"#,
            r#"{"aggregate":{"counters":{},"firstCounterAt":1000}}"#,
            r#"{"aggregate":{"errors":{},"codes":{}}}"#,
        ] {
            let err = parse_report(body.as_bytes()).unwrap_err();
            assert!(matches!(err, ReportParseError::EmptyAggregate), "{}", body);
        }
    }

    #[test]
    fn test_counts_saturate() {
        let report = parse_report(
            br#"{"aggregate":{
                "counters":{"errors.ETIMEDOUT":18446744073709551615},
                "errors":{"ETIMEDOUT":5}
            }}"#,
        )
        .unwrap();
        assert_eq!(report.counter("errors.ETIMEDOUT"), u64::MAX);
    }

    #[test]
    fn test_missing_aggregate() {
        let err = parse_report(br#"{"intermediate":[]}"#).unwrap_err();
        assert!(matches!(err, ReportParseError::MissingAggregate));

        let err = parse_report(br#"{"aggregate":null}"#).unwrap_err();
        assert!(matches!(err, ReportParseError::MissingAggregate));
    }

    #[test]
    fn test_malformed_report() {
        assert!(matches!(
            parse_report(b"").unwrap_err(),
            ReportParseError::Malformed(_)
        ));
        assert!(matches!(
            parse_report(br#"{"aggregate":{"requestsFailed":"many"}}"#).unwrap_err(),
            ReportParseError::Malformed(_)
        ));
        assert!(matches!(
            parse_report(br#"{"aggregate":42}"#).unwrap_err(),
            ReportParseError::Malformed(_)
        ));
    }

    #[test]
    fn test_read_report_not_found() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("test-report.json");
        let err = read_report(&path).unwrap_err();
        assert!(matches!(err, ReportParseError::NotFound(p) if p == path));
    }

    #[test]
    fn test_read_report_from_disk() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("test-report.json");
        std::fs::write(&path, r#"{"aggregate":{"requestsCompleted":7}}"#).unwrap();
        assert_eq!(read_report(&path).unwrap().requests_completed(), 7);
    }
}
