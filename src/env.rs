use log::warn;
use serde_json::Value;

use crate::error::StagefigError;
use crate::types::Tree;

/// Build a nested config tree from `NAME__LIKE_THIS` environment pairs.
///
/// Double underscore `__` separates nesting levels. Single `_` joins words
/// within one level, and each level becomes a camelCase key, so
/// `CCU__DJANGO__ALLOWED_HOSTS=a,b` yields
/// `{"ccu": {"django": {"allowedHosts": ["a", "b"]}}}`.
///
/// Values are parsed heuristically: comma list → bool → JSON literal →
/// string. A comma anywhere makes the value a list of the raw
/// comma-separated parts, with no trimming, and that check runs first, so
/// a value can never be a scalar containing a comma.
///
/// Pairs are processed in sorted key order so structural conflicts surface
/// deterministically. Writing a value where a nested section already
/// exists, or descending through an existing non-section value, is a
/// [`StagefigError::PathConflict`].
///
/// Takes an iterator so callers can pass filtered `std::env::vars()` or
/// synthetic data in tests.
pub fn env_to_tree(
    vars: impl IntoIterator<Item = (String, String)>,
) -> Result<Tree, StagefigError> {
    let mut entries: Vec<(String, String)> = vars.into_iter().collect();
    entries.sort();

    let mut tree = Tree::new();
    for (key, raw) in entries {
        let path: Vec<String> = key.split("__").map(camel_segment).collect();
        if path.iter().any(String::is_empty) {
            warn!("skipping env var with malformed name: {key}");
            continue;
        }
        insert_nested(&mut tree, &path, "", parse_env_value(&raw))?;
    }
    Ok(tree)
}

/// `ALLOWED_HOSTS` → `allowedHosts`. Empty output means the segment had no
/// word characters at all.
fn camel_segment(segment: &str) -> String {
    let mut out = String::with_capacity(segment.len());
    for (i, word) in segment.split('_').filter(|w| !w.is_empty()).enumerate() {
        let lower = word.to_ascii_lowercase();
        if i == 0 {
            out.push_str(&lower);
        } else {
            let mut chars = lower.chars();
            if let Some(first) = chars.next() {
                out.push(first.to_ascii_uppercase());
                out.push_str(chars.as_str());
            }
        }
    }
    out
}

fn insert_nested(
    tree: &mut Tree,
    path: &[String],
    walked: &str,
    value: Value,
) -> Result<(), StagefigError> {
    debug_assert!(!path.is_empty());

    let key = &path[0];
    let dotted = if walked.is_empty() {
        key.clone()
    } else {
        format!("{walked}.{key}")
    };

    if path.len() == 1 {
        if let Some(Value::Object(_)) = tree.get(key) {
            return Err(StagefigError::PathConflict {
                path: dotted,
                reason: "a value would replace an existing nested section".into(),
            });
        }
        tree.insert(key.clone(), value);
        Ok(())
    } else {
        match tree
            .entry(key.clone())
            .or_insert_with(|| Value::Object(Tree::new()))
        {
            Value::Object(sub) => insert_nested(sub, &path[1..], &dotted, value),
            _ => Err(StagefigError::PathConflict {
                path: dotted,
                reason: "a nested section would replace an existing value".into(),
            }),
        }
    }
}

/// Parse an env var value into a typed JSON value.
/// Tries: comma list → bool → JSON literal → string.
fn parse_env_value(raw: &str) -> Value {
    if raw.contains(',') {
        return Value::Array(
            raw.split(',')
                .map(|part| Value::String(part.to_string()))
                .collect(),
        );
    }
    if raw.eq_ignore_ascii_case("true") {
        return Value::Bool(true);
    }
    if raw.eq_ignore_ascii_case("false") {
        return Value::Bool(false);
    }
    // Covers integers, floats, null, and quoted strings. "NaN" and "inf"
    // are not JSON, so they stay strings.
    if let Ok(literal) = serde_json::from_str::<Value>(raw) {
        return literal;
    }
    Value::String(raw.to_string())
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn simple_key() {
        let tree = env_to_tree(vars(&[("HOST", "0.0.0.0")])).unwrap();
        assert_eq!(tree["host"], json!("0.0.0.0"));
    }

    #[test]
    fn nested_key() {
        let tree = env_to_tree(vars(&[("CCU__DATABASE__URL", "postgres://db")])).unwrap();
        assert_eq!(tree["ccu"]["database"]["url"], json!("postgres://db"));
    }

    #[test]
    fn words_within_a_segment_become_camel_case() {
        let tree = env_to_tree(vars(&[("CCU__DATABASE__POOL_SIZE", "10")])).unwrap();
        assert_eq!(tree["ccu"]["database"]["poolSize"], json!(10));
    }

    #[test]
    fn comma_value_becomes_string_list() {
        let tree = env_to_tree(vars(&[(
            "CCU__DJANGO__ALLOWED_HOSTS",
            "a.example.com,b.example.com",
        )]))
        .unwrap();
        assert_eq!(
            tree["ccu"]["django"]["allowedHosts"],
            json!(["a.example.com", "b.example.com"])
        );
    }

    #[test]
    fn comma_parts_kept_verbatim_without_trimming() {
        let tree = env_to_tree(vars(&[("LIST", "a, b")])).unwrap();
        assert_eq!(tree["list"], json!(["a", " b"]));
    }

    #[test]
    fn comma_check_runs_before_literal_parsing() {
        // Numbers inside a comma list stay strings.
        let tree = env_to_tree(vars(&[("PORTS", "8000,8001")])).unwrap();
        assert_eq!(tree["ports"], json!(["8000", "8001"]));
    }

    #[test]
    fn parse_bool_case_insensitive() {
        let tree = env_to_tree(vars(&[("DEBUG", "True"), ("VERBOSE", "FALSE")])).unwrap();
        assert_eq!(tree["debug"], json!(true));
        assert_eq!(tree["verbose"], json!(false));
    }

    #[test]
    fn parse_integer() {
        let tree = env_to_tree(vars(&[("PORT", "8000")])).unwrap();
        assert_eq!(tree["port"], json!(8000));
    }

    #[test]
    fn parse_negative_integer() {
        let tree = env_to_tree(vars(&[("OFFSET", "-5")])).unwrap();
        assert_eq!(tree["offset"], json!(-5));
    }

    #[test]
    fn parse_float() {
        let tree = env_to_tree(vars(&[("RATE", "1.5")])).unwrap();
        assert_eq!(tree["rate"], json!(1.5));
    }

    #[test]
    fn parse_null() {
        let tree = env_to_tree(vars(&[("DSN", "null")])).unwrap();
        assert_eq!(tree["dsn"], Value::Null);
    }

    #[test]
    fn quoted_literal_forces_string() {
        let tree = env_to_tree(vars(&[("PORT", "\"8000\"")])).unwrap();
        assert_eq!(tree["port"], json!("8000"));
    }

    #[test]
    fn parse_string_fallback() {
        let tree = env_to_tree(vars(&[("NAME", "hello world")])).unwrap();
        assert_eq!(tree["name"], json!("hello world"));
    }

    #[test]
    fn nan_stays_string() {
        let tree = env_to_tree(vars(&[("RATE", "NaN")])).unwrap();
        assert_eq!(tree["rate"], json!("NaN"));
    }

    #[test]
    fn multiple_vars_combined() {
        let tree = env_to_tree(vars(&[
            ("CCU__DJANGO__DEBUG", "true"),
            ("CCU__DJANGO__PORT", "8000"),
            ("CCU__DATABASE__URL", "pg://"),
            ("SENTRY__TRACE_EXCLUDE_URLS", "/health,/ready"),
        ]))
        .unwrap();
        assert_eq!(tree["ccu"]["django"]["debug"], json!(true));
        assert_eq!(tree["ccu"]["django"]["port"], json!(8000));
        assert_eq!(tree["ccu"]["database"]["url"], json!("pg://"));
        assert_eq!(tree["sentry"]["traceExcludeUrls"], json!(["/health", "/ready"]));
    }

    #[test]
    fn descending_through_a_value_conflicts() {
        // Sorted order puts CCU__DB before CCU__DB__URL, so the scalar
        // lands first and the nested write must fail.
        let err = env_to_tree(vars(&[("CCU__DB__URL", "y"), ("CCU__DB", "x")])).unwrap_err();
        match err {
            StagefigError::PathConflict { path, .. } => assert_eq!(path, "ccu.db"),
            other => panic!("expected PathConflict, got {other:?}"),
        }
    }

    #[test]
    fn value_over_section_conflicts() {
        // "CCU__Db" sorts after "CCU__DB__URL" and maps to the same
        // ccu.db path, hitting the section built by the first var.
        let err = env_to_tree(vars(&[("CCU__DB__URL", "y"), ("CCU__Db", "x")])).unwrap_err();
        match err {
            StagefigError::PathConflict { path, .. } => assert_eq!(path, "ccu.db"),
            other => panic!("expected PathConflict, got {other:?}"),
        }
    }

    #[test]
    fn malformed_name_skipped() {
        let tree = env_to_tree(vars(&[("CCU____PORT", "1"), ("CCU__HOST", "x")])).unwrap();
        assert_eq!(tree["ccu"], json!({"host": "x"}));
    }
}
