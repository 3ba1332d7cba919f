//! Execution requests and their content descriptors.
//!
//! An [`ExecutionRequest`] is the tool-agnostic description of one test run:
//! where the test definition lives, which runtime variables it needs and
//! which extra CLI arguments to pass through. Requests are usually read
//! from JSON:
//!
//! ```json
//! {
//!   "id": "exec-42",
//!   "content": {
//!     "type": "git-file",
//!     "repository": {
//!       "uri": "https://github.com/acme/load-tests",
//!       "branch": "main",
//!       "path": "checkout/flow.yaml",
//!       "working_dir": "checkout"
//!     }
//!   },
//!   "args": ["--quiet"],
//!   "variables": {
//!     "API_KEY": { "name": "API_KEY", "value": "abc", "type": "secret" }
//!   }
//! }
//! ```

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// One requested execution of a load test.
///
/// The orchestrator never mutates the caller's request; credential
/// injection happens on a private copy.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionRequest {
    /// Execution identifier. Used to key archived artifacts.
    #[serde(default)]
    pub id: String,

    /// Where the test definition comes from. Required.
    #[serde(default)]
    pub content: Option<ContentDescriptor>,

    /// Extra CLI arguments, appended verbatim after the generated ones.
    #[serde(default)]
    pub args: Vec<String>,

    /// Runtime variables keyed by name.
    #[serde(default)]
    pub variables: BTreeMap<String, RuntimeVariable>,

    /// Free-form parameters for collaborators.
    #[serde(default)]
    pub params: BTreeMap<String, String>,
}

impl ExecutionRequest {
    /// Creates a request with the given id and content.
    pub fn new(id: impl Into<String>, content: ContentDescriptor) -> Self {
        Self {
            id: id.into(),
            content: Some(content),
            ..Default::default()
        }
    }

    /// Appends an extra CLI argument.
    pub fn with_arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Adds a runtime variable, replacing any variable with the same name.
    pub fn with_variable(mut self, variable: RuntimeVariable) -> Self {
        self.variables.insert(variable.name.clone(), variable);
        self
    }

    /// Fills in a generated id when the request has none.
    pub fn normalized(mut self) -> Self {
        if self.id.trim().is_empty() {
            self.id = uuid::Uuid::new_v4().to_string();
        }
        self
    }

    /// Returns the repository descriptor, if the content has one.
    pub fn repository(&self) -> Option<&Repository> {
        self.content.as_ref()?.repository.as_ref()
    }

    /// Checks that the request carries everything needed to fetch content.
    ///
    /// # Errors
    ///
    /// Returns a human-readable reason when the request is unusable.
    pub fn validate(&self) -> Result<(), String> {
        let Some(content) = &self.content else {
            return Err("can't find any content to run in execution data".to_string());
        };

        match content.content_type {
            ContentType::String => {
                if content.data.as_deref().is_none_or(|d| d.trim().is_empty()) {
                    return Err("string content requires non-empty data".to_string());
                }
            }
            ContentType::FileUri => {
                if content.uri.as_deref().is_none_or(str::is_empty) {
                    return Err("file-uri content requires a uri".to_string());
                }
            }
            ContentType::GitFile | ContentType::GitDir | ContentType::Git => {
                let Some(repo) = &content.repository else {
                    return Err(format!(
                        "{} content requires a repository",
                        content.content_type
                    ));
                };
                if repo.uri.trim().is_empty() {
                    return Err("repository uri is empty".to_string());
                }
            }
        }

        for (key, variable) in &self.variables {
            if variable.name.is_empty() {
                return Err(format!("variable '{}' has an empty name", key));
            }
            if variable.name.contains('=') || variable.name.contains('\n') {
                return Err(format!("variable name '{}' is not valid", variable.name));
            }
        }

        Ok(())
    }
}

/// Kind of test content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ContentType {
    /// Test definition passed inline in `data`.
    String,
    /// A file on the local filesystem (`uri` is a path or `file://` URI).
    FileUri,
    /// A single file inside a repository.
    GitFile,
    /// A directory inside a repository.
    GitDir,
    /// A whole repository.
    Git,
}

impl std::fmt::Display for ContentType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ContentType::String => "string",
            ContentType::FileUri => "file-uri",
            ContentType::GitFile => "git-file",
            ContentType::GitDir => "git-dir",
            ContentType::Git => "git",
        };
        f.write_str(name)
    }
}

/// Where a test definition comes from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentDescriptor {
    #[serde(rename = "type")]
    pub content_type: ContentType,

    /// Inline test body for [`ContentType::String`].
    #[serde(default)]
    pub data: Option<String>,

    /// Location for [`ContentType::FileUri`].
    #[serde(default)]
    pub uri: Option<String>,

    /// Repository for the git content types.
    #[serde(default)]
    pub repository: Option<Repository>,
}

impl ContentDescriptor {
    /// Inline test content.
    pub fn string(data: impl Into<String>) -> Self {
        Self {
            content_type: ContentType::String,
            data: Some(data.into()),
            uri: None,
            repository: None,
        }
    }

    /// Local file content.
    pub fn file(uri: impl Into<String>) -> Self {
        Self {
            content_type: ContentType::FileUri,
            data: None,
            uri: Some(uri.into()),
            repository: None,
        }
    }

    /// Repository file content.
    pub fn git_file(repository: Repository) -> Self {
        Self {
            content_type: ContentType::GitFile,
            data: None,
            uri: None,
            repository: Some(repository),
        }
    }
}

/// A repository holding test content.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Repository {
    pub uri: String,

    #[serde(default)]
    pub branch: Option<String>,

    #[serde(default)]
    pub commit: Option<String>,

    /// Path of the test inside the repository.
    #[serde(default)]
    pub path: Option<String>,

    /// Working directory override, relative to the repository checkout.
    #[serde(default, alias = "workingDir")]
    pub working_dir: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
}

impl Repository {
    pub fn new(uri: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            ..Default::default()
        }
    }

    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn with_working_dir(mut self, dir: impl Into<String>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    /// Returns the working-directory override when it is set and non-empty.
    pub fn working_dir_override(&self) -> Option<&str> {
        self.working_dir.as_deref().filter(|d| !d.trim().is_empty())
    }
}

/// A named runtime variable.
///
/// Secret values are redacted from every piece of captured output before it
/// is logged or returned.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuntimeVariable {
    pub name: String,

    #[serde(default)]
    pub value: String,

    #[serde(default, rename = "type", with = "variable_kind")]
    pub secret: bool,
}

impl RuntimeVariable {
    /// A plain variable.
    pub fn basic(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            secret: false,
        }
    }

    /// A variable whose value must never be surfaced.
    pub fn secret(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            secret: true,
        }
    }
}

impl std::fmt::Debug for RuntimeVariable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let value = if self.secret { "********" } else { &self.value };
        f.debug_struct("RuntimeVariable")
            .field("name", &self.name)
            .field("value", &value)
            .field("secret", &self.secret)
            .finish()
    }
}

/// Serializes the secret flag as `"type": "secret" | "basic"`.
mod variable_kind {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(secret: &bool, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(if *secret { "secret" } else { "basic" })
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<bool, D::Error> {
        let kind = String::deserialize(deserializer)?;
        match kind.to_ascii_lowercase().as_str() {
            "secret" => Ok(true),
            "basic" | "" => Ok(false),
            other => Err(serde::de::Error::unknown_variant(other, &["basic", "secret"])),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize_request() {
        let request: ExecutionRequest = serde_json::from_str(
            r#"{
                "id": "exec-1",
                "content": {
                    "type": "git-file",
                    "repository": {
                        "uri": "https://example.com/repo.git",
                        "path": "tests/flow.yaml",
                        "workingDir": "tests"
                    }
                },
                "args": ["--quiet"],
                "variables": {
                    "TOKEN": {"name": "TOKEN", "value": "abc", "type": "secret"},
                    "HOST": {"name": "HOST", "value": "example.com"}
                }
            }"#,
        )
        .unwrap();

        assert_eq!(request.id, "exec-1");
        assert_eq!(request.args, vec!["--quiet"]);
        assert!(request.variables["TOKEN"].secret);
        assert!(!request.variables["HOST"].secret);
        assert_eq!(
            request.repository().and_then(Repository::working_dir_override),
            Some("tests")
        );
        assert!(request.validate().is_ok());
    }

    #[test]
    fn test_validate_missing_content() {
        let request = ExecutionRequest::default();
        let err = request.validate().unwrap_err();
        assert!(err.contains("content"));
    }

    #[test]
    fn test_validate_empty_string_content() {
        let request = ExecutionRequest::new("1", ContentDescriptor::string("   "));
        assert!(request.validate().is_err());
    }

    #[test]
    fn test_validate_git_without_repository() {
        let mut content = ContentDescriptor::file("x");
        content.content_type = ContentType::GitDir;
        content.uri = None;
        let request = ExecutionRequest::new("1", content);
        let err = request.validate().unwrap_err();
        assert!(err.contains("git-dir"));
    }

    #[test]
    fn test_validate_bad_variable_name() {
        let request = ExecutionRequest::new("1", ContentDescriptor::string("config: {}"))
            .with_variable(RuntimeVariable::basic("A=B", "c"));
        assert!(request.validate().is_err());
    }

    #[test]
    fn test_normalized_generates_id() {
        let request = ExecutionRequest::new("", ContentDescriptor::string("x")).normalized();
        assert!(!request.id.is_empty());

        let request = ExecutionRequest::new("keep", ContentDescriptor::string("x")).normalized();
        assert_eq!(request.id, "keep");
    }

    #[test]
    fn test_secret_debug_is_masked() {
        let variable = RuntimeVariable::secret("PASSWORD", "hunter2");
        let debug = format!("{:?}", variable);
        assert!(!debug.contains("hunter2"));
    }

    #[test]
    fn test_empty_working_dir_is_no_override() {
        let repo = Repository::new("https://example.com/r.git").with_working_dir("  ");
        assert!(repo.working_dir_override().is_none());
    }
}
