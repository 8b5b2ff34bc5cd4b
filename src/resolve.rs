//! Core resolution pipeline: merge every config layer and validate the result.
//!
//! Operates on pre-loaded data (`ResolveInput`) with no I/O, making the full
//! pipeline testable with synthetic inputs. Steps:
//!
//! 1. Deep-merge programmatic defaults (registration order)
//! 2. Deep-merge file layers on top (later overrides earlier)
//! 3. Decode env pairs into a tree and deep-merge it on top
//! 4. Pop the `$env` section, then validate against the schema (coercions,
//!    defaults, refinements)
//! 5. If a stage is set, deep-merge its overlay onto the validated tree and
//!    validate again

use std::collections::BTreeMap;

use log::{debug, warn};
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::env::env_to_tree;
use crate::error::{StagefigError, Violation};
use crate::flatten::tree_to_env;
use crate::merge::deep_merge;
use crate::schema::Schema;
use crate::subset::pick_subset;
use crate::types::{ENV_KEY, Tree, kind_name};

/// All pre-loaded data needed to resolve a config. No I/O happens here.
pub struct ResolveInput {
    /// Programmatic defaults, lowest priority, merged in registration order.
    pub defaults: Vec<Tree>,
    /// Parsed file layers as `(label, tree)` pairs in precedence order:
    /// first = lowest priority, last = highest. `$extends` chains are
    /// already expanded by the loader.
    pub files: Vec<(String, Tree)>,
    /// Environment pairs, already filtered to the relevant prefixes (pass
    /// synthetic data in tests).
    pub env_vars: Vec<(String, String)>,
    /// Stage whose `$env` overlay applies after the main merge.
    pub stage: Option<String>,
    /// Schema the merged tree must satisfy.
    pub schema: Schema,
}

/// Resolve configuration from pre-loaded inputs.
pub fn resolve(input: ResolveInput) -> Result<ResolvedConfig, StagefigError> {
    let mut layers = Vec::new();

    // 1-2: Defaults, then file layers
    let mut merged = Tree::new();
    for (i, defaults) in input.defaults.into_iter().enumerate() {
        layers.push(format!("defaults[{i}]"));
        merged = deep_merge(merged, defaults);
    }
    for (label, tree) in input.files {
        layers.push(label);
        merged = deep_merge(merged, tree);
    }

    // 3: Env vars on top
    if !input.env_vars.is_empty() {
        let env_tree = env_to_tree(input.env_vars)?;
        if !env_tree.is_empty() {
            layers.push("env".to_string());
            merged = deep_merge(merged, env_tree);
        }
    }

    // 4: Pop `$env` before validation so overlays are never schema-checked
    // in their raw, un-merged form.
    let overlays = pop_overlays(&mut merged)?;
    let mut tree = validate_tree(&input.schema, merged)?;

    // 5: Stage overlay on top of the validated tree, then validate again
    if let Some(stage) = &input.stage {
        match overlays {
            None => debug!("no {ENV_KEY} section in merged config; stage '{stage}' changes nothing"),
            Some(mut overlays) => match overlays.remove(stage.as_str()) {
                None => warn!("stage '{stage}' has no entry under {ENV_KEY}; merged config used as-is"),
                Some(Value::Object(overlay)) => {
                    layers.push(format!("{ENV_KEY}.{stage}"));
                    tree = validate_tree(&input.schema, deep_merge(tree, overlay))?;
                }
                Some(other) => {
                    return Err(StagefigError::Parse {
                        source_name: format!("{ENV_KEY}.{stage}"),
                        reason: format!(
                            "stage overlay must be an object, got {}",
                            kind_name(&other)
                        ),
                    });
                }
            },
        }
    }

    Ok(ResolvedConfig {
        tree,
        stage: input.stage,
        layers,
    })
}

fn pop_overlays(merged: &mut Tree) -> Result<Option<Tree>, StagefigError> {
    match merged.remove(ENV_KEY) {
        None => Ok(None),
        Some(Value::Object(overlays)) => Ok(Some(overlays)),
        Some(other) => Err(StagefigError::Parse {
            source_name: ENV_KEY.to_string(),
            reason: format!(
                "expected an object mapping stage names to overlays, got {}",
                kind_name(&other)
            ),
        }),
    }
}

fn validate_tree(schema: &Schema, tree: Tree) -> Result<Tree, StagefigError> {
    match schema.validate(&Value::Object(tree))? {
        Value::Object(tree) => Ok(tree),
        other => Err(StagefigError::SchemaViolations(vec![Violation::new(
            "",
            format!("expected an object at the root, got {}", kind_name(&other)),
        )])),
    }
}

/// A fully merged, validated configuration tree.
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    tree: Tree,
    stage: Option<String>,
    layers: Vec<String>,
}

impl ResolvedConfig {
    pub fn tree(&self) -> &Tree {
        &self.tree
    }

    pub fn into_tree(self) -> Tree {
        self.tree
    }

    /// Stage the config was resolved for, if any.
    pub fn stage(&self) -> Option<&str> {
        self.stage.as_deref()
    }

    /// Labels of the layers that contributed, lowest priority first,
    /// e.g. `["defaults[0]", "config/app.json5", "env", "$env.production"]`.
    pub fn layers(&self) -> &[String] {
        &self.layers
    }

    /// Look up a value by dotted path, e.g. `"database.poolSize"`.
    pub fn get(&self, path: &str) -> Option<&Value> {
        let mut segments = path.split('.');
        let mut value = self.tree.get(segments.next()?)?;
        for segment in segments {
            value = value.as_object()?.get(segment)?;
        }
        Some(value)
    }

    /// Like [`get`](Self::get), but a missing path is an error.
    pub fn require(&self, path: &str) -> Result<&Value, StagefigError> {
        self.get(path)
            .ok_or_else(|| StagefigError::KeyNotFound(path.to_string()))
    }

    /// Project the tree through a mask, keeping only masked branches. See
    /// [`pick_subset`].
    pub fn subset(&self, mask: &Value) -> Value {
        pick_subset(&Value::Object(self.tree.clone()), mask)
    }

    /// Flatten the tree back into `NAME__LIKE_THIS` environment pairs.
    pub fn to_env(&self) -> BTreeMap<String, String> {
        tree_to_env(&self.tree, "__")
    }

    /// Deserialize the tree into a typed struct.
    pub fn deserialize<T: DeserializeOwned>(&self) -> Result<T, StagefigError> {
        Ok(serde_json::from_value(Value::Object(self.tree.clone()))?)
    }
}
