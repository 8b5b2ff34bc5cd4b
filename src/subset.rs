use serde_json::Value;

use crate::types::Tree;

/// Project `source` down to the key paths named by `mask`.
///
/// Mask values are ignored; only its key structure matters. A non-object
/// or empty-object mask value selects the source value at that path
/// wholesale; a non-empty object mask over an object source recurses.
/// Paths missing from `source` are skipped, and sub-objects whose
/// recursion selected nothing are dropped, so the result is always a
/// subset of `source`. Missing paths are not an error and are never
/// null-filled.
pub fn pick_subset(source: &Value, mask: &Value) -> Value {
    match (source, mask) {
        (Value::Object(source_obj), Value::Object(keys)) if !keys.is_empty() => {
            let mut out = Tree::new();
            for (key, sub_mask) in keys {
                let Some(sub_source) = source_obj.get(key) else {
                    continue;
                };
                if recurses(sub_source, sub_mask) {
                    let picked = pick_subset(sub_source, sub_mask);
                    if picked.as_object().is_some_and(|m| !m.is_empty()) {
                        out.insert(key.clone(), picked);
                    }
                } else {
                    out.insert(key.clone(), sub_source.clone());
                }
            }
            Value::Object(out)
        }
        (source, _) => source.clone(),
    }
}

fn recurses(source: &Value, mask: &Value) -> bool {
    matches!((source, mask), (Value::Object(_), Value::Object(m)) if !m.is_empty())
}
