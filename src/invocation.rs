//! Building the load-testing tool's command line.
//!
//! The [`InvocationBuilder`] translates an [`ExecutionRequest`] into a
//! [`ToolInvocation`]: where to run, what to run, and where the report
//! will land.
//!
//! # Argument Order
//!
//! ```text
//! artillery run <content-path> [--dotenv <file> | NAME=VALUE ...] -o <working-dir>/test-report.json [extra args...]
//! ```
//!
//! Extra arguments from the request come last so callers can override the
//! generated defaults.
//!
//! # Working Directory
//!
//! | Request | Working directory |
//! |---------|-------------------|
//! | no override | directory containing the fetched content |
//! | repository `working_dir = "sub/dir"` | `<data_dir>/repo/sub/dir` |

use std::io::Write;
use std::path::{Component, Path, PathBuf};

use tempfile::NamedTempFile;

use crate::config::{RunnerConfig, VariableInjection};
use crate::execution::{ExecutionRequest, RuntimeVariable};
use crate::process::Command;

/// Errors that can occur while building an invocation.
#[derive(Debug, thiserror::Error)]
pub enum InvocationError {
    /// The request cannot be turned into a command.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// The dotenv file could not be created or written.
    #[error("could not create dotenv file: {0}")]
    VariableFile(#[source] std::io::Error),

    /// A report left over from an earlier run could not be removed.
    #[error("could not remove previous report {path}: {source}")]
    StaleReport {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// A transient `NAME=VALUE` file holding runtime variables.
///
/// The file gets a unique name in the transient directory and is deleted
/// when this value is dropped or [`close`](Self::close)d.
#[derive(Debug)]
pub struct VariableFile {
    file: NamedTempFile,
}

impl VariableFile {
    /// Writes the variables, one per line, secrets in plaintext.
    ///
    /// Values that a dotenv parser would truncate or trim are quoted, see
    /// [`dotenv_line`].
    pub fn create(dir: &Path, variables: &[RuntimeVariable]) -> Result<Self, InvocationError> {
        let mut file = tempfile::Builder::new()
            .prefix("artillery-vars-")
            .suffix(".env")
            .tempfile_in(dir)
            .map_err(InvocationError::VariableFile)?;

        let mut contents = String::new();
        for variable in variables {
            contents.push_str(&dotenv_line(variable)?);
            contents.push('\n');
        }
        file.write_all(contents.as_bytes())
            .and_then(|_| file.flush())
            .map_err(InvocationError::VariableFile)?;

        Ok(Self { file })
    }

    pub fn path(&self) -> &Path {
        self.file.path()
    }

    /// Deletes the file, reporting any I/O error.
    pub fn close(self) -> std::io::Result<()> {
        self.file.close()
    }
}

/// Formats one `NAME=VALUE` line as the npm `dotenv` parser reads it.
///
/// | Value | Written as |
/// |-------|------------|
/// | plain | `NAME=value` |
/// | line break, no `"` or literal `\n` | `NAME="a\nb"` (escaped) |
/// | `#`, quotes, or outer whitespace | wrapped in the first of `'`, `` ` ``, `"` it does not contain |
///
/// Unquoted values stop at `#` and are trimmed, and only double-quoted
/// values expand `\n`, so anything else is written verbatim inside quotes.
///
/// # Errors
///
/// Returns [`InvocationError::InvalidRequest`] when the value contains all
/// three quote characters and needs quoting.
pub fn dotenv_line(variable: &RuntimeVariable) -> Result<String, InvocationError> {
    let value = &variable.value;
    let has_break = value.contains(['\n', '\r']);
    let needs_quotes = has_break
        || value.contains(['#', '"', '\'', '`'])
        || value.trim() != value.as_str();
    if !needs_quotes {
        return Ok(format!("{}={}", variable.name, value));
    }

    if has_break && !value.contains('"') && !value.contains("\\n") && !value.contains("\\r") {
        let escaped = value.replace('\r', "\\r").replace('\n', "\\n");
        return Ok(format!("{}=\"{}\"", variable.name, escaped));
    }

    match ['\'', '`', '"'].into_iter().find(|q| !value.contains(*q)) {
        Some(quote) => Ok(format!("{}={}{}{}", variable.name, quote, value, quote)),
        None => Err(InvocationError::InvalidRequest(format!(
            "value of variable '{}' cannot be quoted for a dotenv file",
            variable.name
        ))),
    }
}

/// Everything needed to run the tool once.
///
/// Built once per execution and consumed once. Dropping the invocation
/// removes its variable file.
#[derive(Debug)]
pub struct ToolInvocation {
    pub working_dir: PathBuf,
    pub executable: String,
    pub args: Vec<String>,
    pub report_path: PathBuf,
    pub env: Vec<(String, String)>,
    pub timeout_secs: Option<u64>,
    variable_file: Option<VariableFile>,
}

impl ToolInvocation {
    /// Path of the generated dotenv file, if any.
    pub fn variable_file(&self) -> Option<&Path> {
        self.variable_file.as_ref().map(VariableFile::path)
    }

    /// The process command for this invocation.
    pub fn command(&self) -> Command {
        let mut cmd = Command::new(&self.executable)
            .args(self.args.iter().cloned())
            .working_dir(self.working_dir.to_string_lossy());
        for (key, value) in &self.env {
            cmd = cmd.env(key, value);
        }
        if let Some(secs) = self.timeout_secs {
            cmd = cmd.timeout(secs);
        }
        cmd
    }

    /// Removes a report left at [`report_path`](Self::report_path) by an
    /// earlier run, so a run that writes nothing cannot pass on stale data.
    ///
    /// A missing file is not an error.
    pub fn clear_report(&self) -> Result<(), InvocationError> {
        match std::fs::remove_file(&self.report_path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(InvocationError::StaleReport {
                path: self.report_path.clone(),
                source: e,
            }),
        }
    }

    /// Releases transient files.
    ///
    /// A no-op when no variable file was created.
    pub fn cleanup(mut self) -> std::io::Result<()> {
        match self.variable_file.take() {
            Some(file) => file.close(),
            None => Ok(()),
        }
    }
}

/// Builds [`ToolInvocation`]s from requests.
pub struct InvocationBuilder<'a> {
    config: &'a RunnerConfig,
}

impl<'a> InvocationBuilder<'a> {
    pub fn new(config: &'a RunnerConfig) -> Self {
        Self { config }
    }

    /// Builds the invocation for a request whose content was fetched to
    /// `content_path`.
    ///
    /// # Errors
    ///
    /// - [`InvocationError::InvalidRequest`] if the content path has no
    ///   containing directory, or the working-directory override escapes
    ///   the repository root.
    /// - [`InvocationError::VariableFile`] if the dotenv file cannot be
    ///   written.
    pub fn build(
        &self,
        request: &ExecutionRequest,
        content_path: &Path,
        variables: &[RuntimeVariable],
    ) -> Result<ToolInvocation, InvocationError> {
        let content_dir = content_dir(content_path)?;
        let working_dir = self.working_dir(request, &content_dir)?;

        let mut args = vec!["run".to_string(), content_path.to_string_lossy().into_owned()];

        let mut variable_file = None;
        if !variables.is_empty() {
            match self.config.variable_injection {
                VariableInjection::Dotenv => {
                    let file = VariableFile::create(&self.config.transient_dir, variables)?;
                    args.push("--dotenv".to_string());
                    args.push(file.path().to_string_lossy().into_owned());
                    variable_file = Some(file);
                }
                VariableInjection::Inline => {
                    args.extend(variables.iter().map(|v| format!("{}={}", v.name, v.value)));
                }
            }
        }

        let report_path = working_dir.join(&self.config.report_file);
        args.push("-o".to_string());
        args.push(report_path.to_string_lossy().into_owned());

        args.extend(request.args.iter().cloned());

        Ok(ToolInvocation {
            working_dir,
            executable: self.config.executable.clone(),
            args,
            report_path,
            env: self
                .config
                .env
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
            timeout_secs: self.config.timeout_secs,
            variable_file,
        })
    }

    /// Resolves where the tool runs.
    pub fn working_dir(
        &self,
        request: &ExecutionRequest,
        content_dir: &Path,
    ) -> Result<PathBuf, InvocationError> {
        let Some(dir) = request
            .repository()
            .and_then(|repo| repo.working_dir_override())
        else {
            return Ok(content_dir.to_path_buf());
        };

        let relative = Path::new(dir);
        if relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir))
        {
            return Err(InvocationError::InvalidRequest(format!(
                "working directory '{}' must be relative to the repository",
                dir
            )));
        }
        Ok(self.config.data_dir.join("repo").join(relative))
    }
}

fn content_dir(content_path: &Path) -> Result<PathBuf, InvocationError> {
    let dir = match content_path.parent() {
        Some(parent) if parent.as_os_str().is_empty() => PathBuf::from("."),
        Some(parent) => parent.to_path_buf(),
        None => {
            return Err(InvocationError::InvalidRequest(format!(
                "content path '{}' has no parent directory",
                content_path.display()
            )));
        }
    };
    if !dir.is_dir() {
        return Err(InvocationError::InvalidRequest(format!(
            "content directory '{}' does not exist",
            dir.display()
        )));
    }
    Ok(dir)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::execution::{ContentDescriptor, Repository};
    use tempfile::TempDir;

    struct Fixture {
        _dir: TempDir,
        content: PathBuf,
        config: RunnerConfig,
    }

    fn fixture(injection: VariableInjection) -> Fixture {
        let dir = TempDir::new().unwrap();
        let tests = dir.path().join("tests");
        let transient = dir.path().join("tmp");
        std::fs::create_dir_all(&tests).unwrap();
        std::fs::create_dir_all(&transient).unwrap();
        let content = tests.join("flow.yaml");
        std::fs::write(&content, "config: {}").unwrap();

        let config = RunnerConfig {
            data_dir: PathBuf::from("/data"),
            transient_dir: transient,
            variable_injection: injection,
            ..Default::default()
        };
        Fixture {
            _dir: dir,
            content,
            config,
        }
    }

    fn request() -> ExecutionRequest {
        ExecutionRequest::new("exec-1", ContentDescriptor::string("config: {}"))
    }

    #[test]
    fn test_args_without_variables() {
        let fx = fixture(VariableInjection::Dotenv);
        let request = request().with_arg("--quiet");
        let inv = InvocationBuilder::new(&fx.config)
            .build(&request, &fx.content, &[])
            .unwrap();

        let tests_dir = fx.content.parent().unwrap();
        let report = tests_dir.join("test-report.json");
        assert_eq!(inv.working_dir, tests_dir);
        assert_eq!(inv.report_path, report);
        assert_eq!(
            inv.args,
            vec![
                "run".to_string(),
                fx.content.display().to_string(),
                "-o".to_string(),
                report.display().to_string(),
                "--quiet".to_string(),
            ]
        );
        assert!(inv.variable_file().is_none());
        assert_eq!(inv.executable, "artillery");
    }

    #[test]
    fn test_dotenv_file_written_and_cleaned() {
        let fx = fixture(VariableInjection::Dotenv);
        let vars = vec![
            RuntimeVariable::basic("HOST", "example.com"),
            RuntimeVariable::secret("TOKEN", "s3cr3t"),
        ];
        let inv = InvocationBuilder::new(&fx.config)
            .build(&request(), &fx.content, &vars)
            .unwrap();

        let file = inv.variable_file().unwrap().to_path_buf();
        assert!(file.starts_with(&fx.config.transient_dir));
        assert_eq!(
            std::fs::read_to_string(&file).unwrap(),
            "HOST=example.com\nTOKEN=s3cr3t\n"
        );
        assert_eq!(inv.args[2], "--dotenv");
        assert_eq!(inv.args[3], file.display().to_string());
        assert_eq!(inv.args[4], "-o");

        inv.cleanup().unwrap();
        assert!(!file.exists());
    }

    #[test]
    fn test_dropping_invocation_removes_file() {
        let fx = fixture(VariableInjection::Dotenv);
        let vars = vec![RuntimeVariable::secret("TOKEN", "s3cr3t")];
        let inv = InvocationBuilder::new(&fx.config)
            .build(&request(), &fx.content, &vars)
            .unwrap();
        let file = inv.variable_file().unwrap().to_path_buf();
        drop(inv);
        assert!(!file.exists());
    }

    #[test]
    fn test_variable_files_are_unique() {
        let fx = fixture(VariableInjection::Dotenv);
        let vars = vec![RuntimeVariable::basic("A", "1")];
        let builder = InvocationBuilder::new(&fx.config);
        let a = builder.build(&request(), &fx.content, &vars).unwrap();
        let b = builder.build(&request(), &fx.content, &vars).unwrap();
        assert_ne!(a.variable_file(), b.variable_file());
    }

    #[test]
    fn test_inline_variables() {
        let fx = fixture(VariableInjection::Inline);
        let vars = vec![
            RuntimeVariable::basic("HOST", "example.com"),
            RuntimeVariable::secret("TOKEN", "s3cr3t"),
        ];
        let inv = InvocationBuilder::new(&fx.config)
            .build(&request().with_arg("--quiet"), &fx.content, &vars)
            .unwrap();

        assert!(inv.variable_file().is_none());
        assert_eq!(inv.args[2], "HOST=example.com");
        assert_eq!(inv.args[3], "TOKEN=s3cr3t");
        assert_eq!(inv.args[4], "-o");
        assert_eq!(inv.args.last().map(String::as_str), Some("--quiet"));
        assert_eq!(
            std::fs::read_dir(&fx.config.transient_dir).unwrap().count(),
            0
        );
    }

    #[test]
    fn test_working_dir_override() {
        let fx = fixture(VariableInjection::Dotenv);
        let content = ContentDescriptor::git_file(
            Repository::new("https://example.com/r.git").with_working_dir("sub/dir"),
        );
        let request = ExecutionRequest::new("exec-1", content);
        let inv = InvocationBuilder::new(&fx.config)
            .build(&request, &fx.content, &[])
            .unwrap();

        assert_eq!(inv.working_dir, PathBuf::from("/data/repo/sub/dir"));
        assert_eq!(
            inv.report_path,
            PathBuf::from("/data/repo/sub/dir/test-report.json")
        );
    }

    #[test]
    fn test_working_dir_override_cannot_escape() {
        let fx = fixture(VariableInjection::Dotenv);
        for dir in ["../etc", "/etc"] {
            let content = ContentDescriptor::git_file(
                Repository::new("https://example.com/r.git").with_working_dir(dir),
            );
            let request = ExecutionRequest::new("exec-1", content);
            let err = InvocationBuilder::new(&fx.config)
                .build(&request, &fx.content, &[])
                .unwrap_err();
            assert!(matches!(err, InvocationError::InvalidRequest(_)));
        }
    }

    #[test]
    fn test_missing_content_dir() {
        let fx = fixture(VariableInjection::Dotenv);
        let err = InvocationBuilder::new(&fx.config)
            .build(&request(), Path::new("/definitely/not/here/flow.yaml"), &[])
            .unwrap_err();
        assert!(matches!(err, InvocationError::InvalidRequest(_)));
    }

    #[test]
    fn test_dotenv_values_are_quoted_when_needed() {
        let line = |value: &str| dotenv_line(&RuntimeVariable::secret("V", value)).unwrap();

        assert_eq!(line("plain-value"), "V=plain-value");
        assert_eq!(line("a\nb"), "V=\"a\\nb\"");
        assert_eq!(line("p@ss#word "), "V='p@ss#word '");
        assert_eq!(line(" padded"), "V=' padded'");
        assert_eq!(line("it's"), "V=`it's`");
        assert_eq!(line("say \"hi\""), "V='say \"hi\"'");
        assert_eq!(line("'`x"), "V=\"'`x\"");
        assert_eq!(line("quote\"\nbreak"), "V='quote\"\nbreak'");
    }

    #[test]
    fn test_unquotable_dotenv_value_is_rejected() {
        let err = dotenv_line(&RuntimeVariable::secret("V", "'`\"#")).unwrap_err();
        assert!(matches!(err, InvocationError::InvalidRequest(_)));
        assert!(!err.to_string().contains('#'));
    }

    #[test]
    fn test_clear_report_removes_previous_report() {
        let fx = fixture(VariableInjection::Dotenv);
        let inv = InvocationBuilder::new(&fx.config)
            .build(&request(), &fx.content, &[])
            .unwrap();

        inv.clear_report().unwrap();
        std::fs::write(&inv.report_path, "{}").unwrap();
        inv.clear_report().unwrap();
        assert!(!inv.report_path.exists());
    }

    #[test]
    fn test_command_carries_env_and_timeout() {
        let mut fx = fixture(VariableInjection::Dotenv);
        fx.config.timeout_secs = Some(30);
        fx.config
            .env
            .insert("NODE_ENV".to_string(), "ci".to_string());
        let inv = InvocationBuilder::new(&fx.config)
            .build(&request(), &fx.content, &[])
            .unwrap();
        let cmd = inv.command();

        assert_eq!(cmd.program, "artillery");
        assert_eq!(cmd.timeout_secs, Some(30));
        assert_eq!(cmd.env, vec![("NODE_ENV".to_string(), "ci".to_string())]);
        assert_eq!(
            cmd.working_dir.as_deref(),
            fx.content.parent().unwrap().to_str()
        );
    }
}
