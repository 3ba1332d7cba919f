//! Runtime variable resolution and secret redaction.
//!
//! A [`SecretManager`] decides which variables an execution receives and
//! scrubs secret values from any text before it leaves the orchestrator.
//! Managers are stateless with respect to executions: the variables are
//! passed in on every call, so one manager can serve concurrent runs.

use regex::Regex;

use crate::execution::{ExecutionRequest, RuntimeVariable};

/// Replacement for redacted secret values.
pub const MASK: &str = "********";

/// Resolves runtime variables and redacts secret values.
pub trait SecretManager: Send + Sync {
    /// Returns the variables for this request, in a stable order.
    fn resolve_variables(&self, request: &ExecutionRequest) -> Vec<RuntimeVariable>;

    /// Replaces every secret value in `text` with [`MASK`].
    ///
    /// Must be idempotent: obfuscating twice yields the same text as once.
    fn obfuscate(&self, text: &str, variables: &[RuntimeVariable]) -> String;
}

/// Default secret manager backed by the request's own variables.
///
/// Variables are returned sorted by name, which keeps generated dotenv
/// files and inline arguments reproducible.
#[derive(Debug, Clone, Default)]
pub struct EnvManager;

impl EnvManager {
    pub fn new() -> Self {
        Self
    }
}

impl SecretManager for EnvManager {
    fn resolve_variables(&self, request: &ExecutionRequest) -> Vec<RuntimeVariable> {
        // BTreeMap iteration is already sorted by key; sort by name in case
        // a key and its variable's name disagree.
        let mut variables: Vec<RuntimeVariable> = request.variables.values().cloned().collect();
        variables.sort_by(|a, b| a.name.cmp(&b.name));
        variables
    }

    fn obfuscate(&self, text: &str, variables: &[RuntimeVariable]) -> String {
        redact(text, variables.iter().filter(|v| v.secret).map(|v| v.value.as_str()))
    }
}

/// Replaces each secret value in `text` with [`MASK`].
///
/// Values are matched longest first in a single alternation, and the
/// replacement is repeated until the text stops changing. That keeps the
/// result free of any secret even when a replacement happens to splice
/// together a new occurrence. Empty values and values made only of mask
/// characters are ignored.
pub fn redact<'a>(text: &str, secrets: impl IntoIterator<Item = &'a str>) -> String {
    let mut values: Vec<&str> = secrets
        .into_iter()
        .filter(|v| !v.is_empty() && !v.chars().all(|c| c == '*'))
        .collect();
    if values.is_empty() {
        return text.to_string();
    }
    values.sort_by(|a, b| b.len().cmp(&a.len()).then_with(|| a.cmp(b)));
    values.dedup();

    let pattern = values
        .iter()
        .map(|v| regex::escape(v))
        .collect::<Vec<_>>()
        .join("|");
    let Ok(re) = Regex::new(&pattern) else {
        // Escaped literals always compile unless the pattern is too large;
        // fall back to plain replacement.
        let mut redacted = text.to_string();
        for value in &values {
            redacted = redacted.replace(value, MASK);
        }
        return redacted;
    };

    // Every replacement removes at least one non-mask character, so this
    // terminates.
    let mut current = text.to_string();
    loop {
        let next = re.replace_all(&current, MASK).into_owned();
        if next == current {
            return current;
        }
        current = next;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::execution::ContentDescriptor;

    fn vars() -> Vec<RuntimeVariable> {
        vec![
            RuntimeVariable::secret("TOKEN", "s3cr3t"),
            RuntimeVariable::secret("PASSWORD", "hunter2"),
            RuntimeVariable::basic("HOST", "example.com"),
        ]
    }

    #[test]
    fn test_obfuscate_hides_secrets_only() {
        let manager = EnvManager::new();
        let text = "GET https://example.com?token=s3cr3t pw=hunter2 again s3cr3t";
        let redacted = manager.obfuscate(text, &vars());

        assert!(!redacted.contains("s3cr3t"));
        assert!(!redacted.contains("hunter2"));
        assert!(redacted.contains("example.com"));
        assert_eq!(
            redacted,
            "GET https://example.com?token=******** pw=******** again ********"
        );
    }

    #[test]
    fn test_obfuscate_is_idempotent() {
        let manager = EnvManager::new();
        let text = "s3cr3t hunter2 s3cr3thunter2";
        let once = manager.obfuscate(text, &vars());
        let twice = manager.obfuscate(&once, &vars());
        assert_eq!(once, twice);
    }

    #[test]
    fn test_overlapping_secrets_longest_wins() {
        let redacted = redact("abcdef", ["abc", "abcdef"]);
        assert_eq!(redacted, MASK);
    }

    #[test]
    fn test_spliced_secret_is_removed() {
        // Replacing "abc" produces "********x", which contains "*x".
        let redacted = redact("abcx", ["abc", "*x"]);
        assert!(!redacted.contains("*x"));
        assert!(!redacted.contains("abc"));
        assert_eq!(redact(&redacted, ["abc", "*x"]), redacted);
    }

    #[test]
    fn test_regex_metacharacters_are_literal() {
        let redacted = redact("price=$1.00 (a+b)", ["$1.00", "(a+b)"]);
        assert_eq!(redacted, format!("price={} {}", MASK, MASK));
    }

    #[test]
    fn test_empty_and_mask_values_ignored() {
        assert_eq!(redact("keep ** this", ["", "**"]), "keep ** this");
    }

    #[test]
    fn test_resolve_variables_sorted() {
        let mut request = ExecutionRequest::new("1", ContentDescriptor::string("x"));
        for v in vars() {
            request = request.with_variable(v);
        }
        let names: Vec<_> = EnvManager::new()
            .resolve_variables(&request)
            .into_iter()
            .map(|v| v.name)
            .collect();
        assert_eq!(names, vec!["HOST", "PASSWORD", "TOKEN"]);
    }
}
