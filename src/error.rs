use std::path::PathBuf;

use thiserror::Error;

/// A single schema check failure: where in the tree, and what went wrong.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Violation {
    /// Dotted path from the root, e.g. `ccu.django.port`. Empty at the root.
    pub path: String,
    pub reason: String,
}

impl Violation {
    pub fn new(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            reason: reason.into(),
        }
    }
}

impl std::fmt::Display for Violation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.path.is_empty() {
            write!(f, "<root>: {}", self.reason)
        } else {
            write!(f, "{}: {}", self.path, self.reason)
        }
    }
}

#[derive(Debug, Error)]
pub enum StagefigError {
    /// Every violation found across the whole tree, not just the first.
    #[error("Config validation failed:{}", format_violations(.0))]
    SchemaViolations(Vec<Violation>),

    #[error("Conflicting env value at '{path}': {reason}")]
    PathConflict { path: String, reason: String },

    #[error("Failed to parse {source_name}: {reason}")]
    Parse { source_name: String, reason: String },

    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Missing extension source '{reference}' (referenced from {referrer})")]
    MissingExtension { reference: String, referrer: String },

    #[error("Failed to fetch '{reference}': {reason}")]
    Fetch { reference: String, reason: String },

    #[error("Cyclic $extends chain: {}", .cycle.join(" -> "))]
    CyclicExtends { cycle: Vec<String> },

    #[error("Key not found: {0}")]
    KeyNotFound(String),

    #[error("Failed to decode config: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("A schema is required — call .schema() or .registry() on the builder")]
    SchemaRequired,
}

fn format_violations(violations: &[Violation]) -> String {
    let mut out = String::new();
    for violation in violations {
        out.push_str("\n  - ");
        out.push_str(&violation.to_string());
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn violations_list_every_failure() {
        let err = StagefigError::SchemaViolations(vec![
            Violation::new("ccu.django.port", "missing required value"),
            Violation::new("sentry.dsn", "not a valid URL: relative URL without a base"),
        ]);
        let msg = err.to_string();
        assert!(msg.contains("ccu.django.port: missing required value"));
        assert!(msg.contains("sentry.dsn: not a valid URL"));
    }

    #[test]
    fn root_violation_labeled() {
        let violation = Violation::new("", "expected object, got list");
        assert_eq!(violation.to_string(), "<root>: expected object, got list");
    }

    #[test]
    fn cycle_formats_as_chain() {
        let err = StagefigError::CyclicExtends {
            cycle: vec!["app".into(), "base".into(), "app".into()],
        };
        assert!(err.to_string().contains("app -> base -> app"));
    }

    #[test]
    fn key_not_found_formats() {
        let err = StagefigError::KeyNotFound("ccu.django.url".into());
        assert!(err.to_string().contains("ccu.django.url"));
    }

    #[test]
    fn schema_required_names_the_builder_methods() {
        let err = StagefigError::SchemaRequired;
        assert!(err.to_string().contains(".schema()"));
    }
}
