//! Normalized, tool-agnostic execution results.
//!
//! A [`NormalizedResult`] is built once per execution by the
//! [`mapper`](crate::mapper) (or directly from an error when the pipeline
//! fails early). After construction the only mutators are
//! [`append_error`](NormalizedResult::append_error) and
//! [`append_warning`](NormalizedResult::append_warning), both of which keep
//! everything already recorded.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Status of an execution or of a single step.
///
/// | Status | Meaning | Exit code |
/// |--------|---------|-----------|
/// | Passed | Report parsed, no failure counters | 0 |
/// | Failed | Report parsed, at least one failure counter | 1 |
/// | Error | No usable report, or the pipeline itself failed | 2 |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Passed,
    Failed,
    Error,
}

impl Status {
    /// Returns `true` only for [`Status::Passed`].
    pub fn is_success(&self) -> bool {
        matches!(self, Status::Passed)
    }

    /// Conventional process exit code for this status.
    pub fn exit_code(&self) -> i32 {
        match self {
            Status::Passed => 0,
            Status::Failed => 1,
            Status::Error => 2,
        }
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Status::Passed => "passed",
            Status::Failed => "failed",
            Status::Error => "error",
        };
        f.write_str(name)
    }
}

/// Outcome of one scenario, check, or failure counter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepResult {
    pub name: String,
    pub status: Status,
    #[serde(with = "duration_ms")]
    pub duration: Duration,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl StepResult {
    /// Creates a passed step with no duration or message.
    ///
    /// # Example
    ///
    /// ```
    /// use std::time::Duration;
    /// use artillery_runner::result::{Status, StepResult};
    ///
    /// let step = StepResult::passed("checkout")
    ///     .with_message("20 virtual users created")
    ///     .with_duration(Duration::from_millis(850));
    /// assert_eq!(step.status, Status::Passed);
    /// ```
    pub fn passed(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            status: Status::Passed,
            duration: Duration::ZERO,
            message: None,
        }
    }

    /// Creates a failed step. Failed steps always carry a message.
    pub fn failed(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            status: Status::Failed,
            duration: Duration::ZERO,
            message: Some(message.into()),
        }
    }

    /// Sets the message, replacing any previous one.
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    /// Sets the duration.
    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = duration;
        self
    }
}

/// The normalized record of one execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedResult {
    pub status: Status,

    #[serde(default)]
    pub steps: Vec<StepResult>,

    #[serde(with = "duration_ms")]
    pub duration: Duration,

    #[serde(default)]
    pub errors: Vec<String>,

    /// Non-fatal discrepancies, such as a non-zero exit with a clean report.
    #[serde(default)]
    pub warnings: Vec<String>,

    /// Captured tool output, with secret values already redacted.
    #[serde(default)]
    pub output: String,
}

impl NormalizedResult {
    /// Creates a result with the given status and steps.
    pub fn new(status: Status, steps: Vec<StepResult>) -> Self {
        Self {
            status,
            steps,
            duration: Duration::ZERO,
            errors: Vec::new(),
            warnings: Vec::new(),
            output: String::new(),
        }
    }

    /// A result for an execution that produced nothing usable.
    pub fn from_error(message: impl Into<String>) -> Self {
        let mut result = Self::new(Status::Error, Vec::new());
        result.errors.push(message.into());
        result
    }

    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = duration;
        self
    }

    pub fn with_output(mut self, output: impl Into<String>) -> Self {
        self.output = output.into();
        self
    }

    /// Records an error and marks the result as [`Status::Error`].
    ///
    /// Steps, earlier errors, and warnings are preserved.
    pub fn append_error(&mut self, message: impl Into<String>) {
        self.status = Status::Error;
        self.errors.push(message.into());
    }

    /// Records a warning without touching the status.
    pub fn append_warning(&mut self, message: impl Into<String>) {
        self.warnings.push(message.into());
    }

    /// Number of steps with the given status.
    pub fn count(&self, status: Status) -> usize {
        self.steps.iter().filter(|s| s.status == status).count()
    }
}

/// Prints a summary of an execution result to the console.
pub fn print_summary(result: &NormalizedResult) {
    println!();
    println!("Execution Result:");
    for step in &result.steps {
        let marker = match step.status {
            Status::Passed => console::style("PASS").green(),
            Status::Failed => console::style("FAIL").red(),
            Status::Error => console::style("ERR ").red().bold(),
        };
        match &step.message {
            Some(message) => println!("  {} {} ({})", marker, step.name, message),
            None => println!("  {} {}", marker, step.name),
        }
    }
    println!("  Passed:   {}", console::style(result.count(Status::Passed)).green());
    println!("  Failed:   {}", console::style(result.count(Status::Failed)).red());
    println!("  Duration: {:?}", result.duration);

    for warning in &result.warnings {
        println!("  {} {}", console::style("warning:").yellow(), warning);
    }
    for error in &result.errors {
        println!("  {} {}", console::style("error:").red(), error);
    }

    println!();
    match result.status {
        Status::Passed => println!("{}", console::style("Load test passed!").green().bold()),
        Status::Failed => println!("{}", console::style("Load test failed.").red().bold()),
        Status::Error => println!(
            "{}",
            console::style("Load test could not be evaluated.").red().bold()
        ),
    }
}

/// Serializes durations as integer milliseconds.
mod duration_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(d.as_millis().try_into().unwrap_or(u64::MAX))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(deserializer)?))
    }
}
