use std::path::PathBuf;

use serde_json::Value;

/// A JSON object, the node type at every level of a configuration tree.
pub type Tree = serde_json::Map<String, Value>;

/// Reserved key naming a layer's extension references. Consumed while the
/// layer is loaded; never part of a resolved tree.
pub const EXTENDS_KEY: &str = "$extends";

/// Reserved key holding per-stage override subtrees. Popped from the merged
/// tree before validation and applied after it.
pub const ENV_KEY: &str = "$env";

/// One configuration layer, in ascending precedence order.
#[derive(Debug, Clone, PartialEq)]
pub enum LayerSource {
    /// A config file that must exist.
    File(PathBuf),
    /// A config file that is silently skipped when absent.
    OptionalFile(PathBuf),
    /// An in-memory tree (tests, programmatic overrides). Must be an object.
    Inline(Value),
}

/// Short name for a JSON value's shape, for error messages.
pub(crate) fn kind_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "list",
        Value::Object(_) => "object",
    }
}
