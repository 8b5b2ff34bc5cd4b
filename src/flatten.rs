use std::collections::BTreeMap;

use serde_json::Value;

use crate::types::Tree;

/// Flatten a config tree into env-style `NAME__LIKE_THIS` pairs.
///
/// Arrays are leaves: joined with commas, never index-expanded. Nesting
/// levels join with `delimiter` (pass `"__"` for the [`env_to_tree`]
/// convention, `"."` for dotted paths). Keys convert to upper snake by
/// inserting `_` before each uppercase run, so `allowedHosts` becomes
/// `ALLOWED_HOSTS`.
///
/// Best-effort inverse of [`env_to_tree`]: a string leaf containing a
/// comma re-decodes as a list, so exact round-trips hold only for trees
/// without commas in scalar strings.
///
/// [`env_to_tree`]: crate::env_to_tree
pub fn tree_to_env(tree: &Tree, delimiter: &str) -> BTreeMap<String, String> {
    let mut out = BTreeMap::new();
    flatten_into(tree, "", delimiter, &mut out);
    out
}

fn flatten_into(tree: &Tree, prefix: &str, delimiter: &str, out: &mut BTreeMap<String, String>) {
    for (key, value) in tree {
        let env_key = if prefix.is_empty() {
            screaming_snake(key)
        } else {
            format!("{prefix}{delimiter}{}", screaming_snake(key))
        };
        match value {
            Value::Object(sub) => flatten_into(sub, &env_key, delimiter, out),
            leaf => {
                out.insert(env_key, leaf_to_string(leaf));
            }
        }
    }
}

/// `allowedHosts` → `ALLOWED_HOSTS`. A run of uppercase letters counts as
/// one word, so `externalAPI` → `EXTERNAL_API`.
pub(crate) fn screaming_snake(key: &str) -> String {
    let mut out = String::with_capacity(key.len() + 4);
    let mut prev_upper = false;
    for ch in key.chars() {
        let upper = ch.is_ascii_uppercase();
        if upper && !prev_upper && !out.is_empty() {
            out.push('_');
        }
        prev_upper = upper;
        out.push(ch.to_ascii_uppercase());
    }
    out
}

fn leaf_to_string(value: &Value) -> String {
    match value {
        Value::Array(items) => items
            .iter()
            .map(scalar_to_string)
            .collect::<Vec<_>>()
            .join(","),
        other => scalar_to_string(other),
    }
}

fn scalar_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
