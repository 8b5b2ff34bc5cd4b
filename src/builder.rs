use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde_json::Value;

use crate::error::StagefigError;
use crate::extends::{DirResolver, ExtendsResolver, canonical_id, expand_extends};
use crate::file;
use crate::flatten::screaming_snake;
use crate::registry::SchemaRegistry;
use crate::resolve::{self, ResolveInput, ResolvedConfig};
use crate::schema::Schema;
use crate::types::{LayerSource, Tree, kind_name};

/// Entry point for building a stagefig configuration.
pub struct Stagefig;

impl Stagefig {
    pub fn builder() -> StagefigBuilder {
        StagefigBuilder::new()
    }
}

/// Builder for configuring and loading layered configuration.
///
/// Layers merge in ascending precedence: programmatic
/// [`defaults()`](Self::defaults), then [`file()`](Self::file) /
/// [`inline()`](Self::inline) layers in registration order, then
/// environment variables, then the [`stage()`](Self::stage) overlay from
/// the merged `$env` section.
pub struct StagefigBuilder {
    schema: Option<Schema>,
    defaults: Vec<Value>,
    layers: Vec<LayerSource>,
    extends_root: Option<PathBuf>,
    resolver: Option<Box<dyn ExtendsResolver>>,
    remote_timeout: Duration,
    env_enabled: bool,
    env_prefixes: Option<Vec<String>>,
    stage: Option<String>,
}

impl StagefigBuilder {
    fn new() -> Self {
        Self {
            schema: None,
            defaults: Vec::new(),
            layers: Vec::new(),
            extends_root: None,
            resolver: None,
            remote_timeout: Duration::from_secs(10),
            env_enabled: true,
            env_prefixes: None,
            stage: None,
        }
    }

    /// Set the schema the resolved tree must satisfy. Required, unless
    /// [`registry()`](Self::registry) is used instead.
    pub fn schema(mut self, schema: Schema) -> Self {
        self.schema = Some(schema);
        self
    }

    /// Compose the schema from a [`SchemaRegistry`]'s fragments.
    pub fn registry(mut self, registry: &SchemaRegistry) -> Self {
        self.schema = Some(registry.compose());
        self
    }

    /// Add a programmatic defaults tree, the lowest-priority layer. May be
    /// called repeatedly; later calls override earlier ones. Must be an
    /// object.
    pub fn defaults(mut self, defaults: Value) -> Self {
        self.defaults.push(defaults);
        self
    }

    /// Add a config file layer. Missing file is an error at
    /// [`load()`](Self::load) time.
    pub fn file(mut self, path: impl Into<PathBuf>) -> Self {
        self.layers.push(LayerSource::File(path.into()));
        self
    }

    /// Add a config file layer that is silently skipped when absent.
    pub fn optional_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.layers.push(LayerSource::OptionalFile(path.into()));
        self
    }

    /// Add an in-memory layer. Must be an object; `$extends` works here
    /// like in a file.
    pub fn inline(mut self, tree: Value) -> Self {
        self.layers.push(LayerSource::Inline(tree));
        self
    }

    /// Select the stage whose `$env` overlay applies after the main merge.
    pub fn stage(mut self, stage: impl Into<String>) -> Self {
        self.stage = Some(stage.into());
        self
    }

    /// Read the stage from an environment variable, e.g. `CCU_STAGE`.
    /// Unset or empty leaves the stage unchanged.
    pub fn stage_from_env(mut self, var: &str) -> Self {
        if let Ok(value) = env::var(var)
            && !value.is_empty()
        {
            self.stage = Some(value);
        }
        self
    }

    /// Replace the derived env prefixes. Only variables whose first `__`
    /// segment equals one of these are read, e.g. `["CCU", "SENTRY"]`.
    pub fn env_prefixes<I, S>(mut self, prefixes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.env_prefixes = Some(prefixes.into_iter().map(Into::into).collect());
        self
    }

    /// Disable environment variable loading entirely.
    pub fn no_env(mut self) -> Self {
        self.env_enabled = false;
        self
    }

    /// Set the directory `$extends` references resolve against (default:
    /// the first file layer's directory, else the current directory).
    pub fn extends_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.extends_root = Some(root.into());
        self
    }

    /// Replace the built-in [`DirResolver`] for `$extends` references.
    pub fn extends_resolver(mut self, resolver: impl ExtendsResolver + 'static) -> Self {
        self.resolver = Some(Box::new(resolver));
        self
    }

    /// Timeout for remote `$extends` fetches (default: 10s). Only
    /// meaningful with the `remote` feature.
    pub fn remote_timeout(mut self, timeout: Duration) -> Self {
        self.remote_timeout = timeout;
        self
    }

    /// Resolve the directory the default resolver searches.
    fn effective_extends_root(&self) -> PathBuf {
        if let Some(root) = &self.extends_root {
            return root.clone();
        }
        for layer in &self.layers {
            let (LayerSource::File(path) | LayerSource::OptionalFile(path)) = layer else {
                continue;
            };
            if let Some(parent) = path.parent()
                && parent != Path::new("")
            {
                return parent.to_path_buf();
            }
        }
        PathBuf::from(".")
    }

    /// Resolve the effective env prefixes (`None` means env disabled).
    /// Defaults to the schema's root keys in `SCREAMING_SNAKE` form, so a
    /// schema rooted at `ccu` and `sentry` reads `CCU__*` and `SENTRY__*`
    /// without picking up the rest of the process environment.
    fn effective_env_prefixes(&self) -> Option<Vec<String>> {
        if !self.env_enabled {
            return None;
        }
        if let Some(prefixes) = &self.env_prefixes {
            return Some(prefixes.clone());
        }
        let derived: Vec<String> = self
            .schema
            .as_ref()
            .map(|schema| {
                schema
                    .root_keys()
                    .iter()
                    .map(|key| screaming_snake(key))
                    .collect()
            })
            .unwrap_or_default();
        if derived.is_empty() { None } else { Some(derived) }
    }

    /// Build the `ResolveInput` from current builder state. All I/O
    /// happens here: files are read, `$extends` chains fetched, and the
    /// process environment captured.
    fn build_input(&self) -> Result<ResolveInput, StagefigError> {
        let schema = self.schema.clone().ok_or(StagefigError::SchemaRequired)?;

        let mut defaults = Vec::with_capacity(self.defaults.len());
        for (i, value) in self.defaults.iter().enumerate() {
            defaults.push(require_tree(value, &format!("defaults[{i}]"))?);
        }

        let default_resolver;
        let resolver: &dyn ExtendsResolver = match &self.resolver {
            Some(custom) => custom.as_ref(),
            None => {
                default_resolver =
                    DirResolver::with_timeout(self.effective_extends_root(), self.remote_timeout);
                &default_resolver
            }
        };

        let mut files = Vec::with_capacity(self.layers.len());
        for layer in &self.layers {
            let (label, origin, tree) = match layer {
                LayerSource::File(path) | LayerSource::OptionalFile(path) => {
                    let optional = matches!(layer, LayerSource::OptionalFile(_));
                    let Some(tree) = file::load_layer(path, optional)? else {
                        continue;
                    };
                    (path.display().to_string(), canonical_id(path), tree)
                }
                LayerSource::Inline(value) => (
                    "<inline>".to_string(),
                    "<inline>".to_string(),
                    require_tree(value, "<inline>")?,
                ),
            };
            files.push((label, expand_extends(tree, &origin, resolver)?));
        }

        let env_vars = match self.effective_env_prefixes() {
            Some(prefixes) => filter_env(env::vars(), &prefixes),
            None => Vec::new(),
        };

        Ok(ResolveInput {
            defaults,
            files,
            env_vars,
            stage: self.stage.clone(),
            schema,
        })
    }

    /// Load and resolve the configuration through all layers.
    pub fn load(self) -> Result<ResolvedConfig, StagefigError> {
        resolve::resolve(self.build_input()?)
    }
}

fn require_tree(value: &Value, source_name: &str) -> Result<Tree, StagefigError> {
    match value {
        Value::Object(tree) => Ok(tree.clone()),
        other => Err(StagefigError::Parse {
            source_name: source_name.to_string(),
            reason: format!("layer must be an object, got {}", kind_name(other)),
        }),
    }
}

/// Keep only vars whose first `__` segment is one of `prefixes`.
fn filter_env(
    vars: impl IntoIterator<Item = (String, String)>,
    prefixes: &[String],
) -> Vec<(String, String)> {
    vars.into_iter()
        .filter(|(name, _)| {
            let head = name.split("__").next().unwrap_or(name);
            prefixes.iter().any(|prefix| prefix == head)
        })
        .collect()
}
