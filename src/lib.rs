//! Layered, stage-aware configuration resolution. Declare a schema, point at
//! your files, pick a stage, and go.
//!
//! Stagefig merges configuration from programmatic defaults, config files
//! (JSON5, JSON, YAML), environment variables, and per-stage overlays into
//! one validated tree, through a builder API:
//!
//! ```ignore
//! let config = Stagefig::builder()
//!     .schema(platform_schema())
//!     .optional_file("config/base.json5")
//!     .file("config/app.json5")
//!     .stage_from_env("CCU_STAGE")
//!     .load()?;
//!
//! let port = config.require("django.port")?;
//! ```
//!
//! That single call reads the files, expands their `$extends` chains, folds
//! in matching environment variables, validates the merged tree against the
//! schema (coercing and defaulting as it goes), and applies the selected
//! stage's `$env` overlay on top.
//!
//! # Why stagefig
//!
//! A service platform's effective configuration is assembled from many
//! hands: library defaults, a shared base file, a per-service file, site
//! overrides, deploy-time environment variables, and stage-specific tweaks
//! for production or staging. Wiring those sources by hand means ad-hoc
//! merge code, scattered validation, and drift between what the files say
//! and what the process actually runs with.
//!
//! Stagefig owns that pipeline end to end. Sources stay sparse (each layer
//! names only the keys it overrides), the merge order is fixed and
//! documented, and the schema checks the final tree in one pass, reporting
//! every violation at once instead of stopping at the first.
//!
//! # Design: schemas are values
//!
//! The schema is built at runtime from composable [`Schema`] values rather
//! than derived from a struct. That choice is deliberate: the modules of a
//! platform each know their own settings, so each contributes a fragment to
//! a [`SchemaRegistry`] and the registry composes the root schema. A schema
//! carries three things per node:
//!
//! - **Kinds with coercions.** `Schema::number()` accepts `"8000"` from an
//!   env var and hands back `8000`. `Schema::string_or_list()` accepts
//!   `"a,b"` and hands back `["a", "b"]`. Validated output is what your
//!   code reads, so downstream never re-parses.
//! - **Defaults.** `Field::default(...)` fills absent keys, recursively, and
//!   defaulted values pass through the same coercion and checks as user
//!   input. [`Field::default_from_env`] seeds a default from the process
//!   environment at schema construction time.
//! - **Refinements.** Declarative checks ([`Schema::range`],
//!   [`Schema::url`], [`Schema::one_of`], ...) that run after the kind
//!   check passes.
//!
//! Validation never fails fast. The whole tree is walked and every problem
//! is collected into one [`StagefigError::SchemaViolations`], each with its
//! dotted path, so a broken deploy surfaces all of its mistakes in a single
//! run.
//!
//! # Layer precedence
//!
//! ```text
//! Programmatic defaults   .defaults()
//!        ↑ overridden by
//! Config files            .file() / .inline(), later layers win
//!        ↑ overridden by
//! Environment vars        PREFIX__KEY
//!        ↑ overridden by
//! Stage overlay           $env.<stage>, applied after validation
//! ```
//!
//! Merging is deep on objects and wholesale on everything else: lists and
//! scalars replace, `null` overrides. Every layer is sparse, so a file can
//! override a single nested key and leave the rest of the tree alone.
//!
//! # Environment variables
//!
//! Variables map to tree paths via double-underscore nesting, with each
//! segment camelCased:
//!
//! | Env var | Config key |
//! |---------|------------|
//! | `CCU__HOST` | `ccu.host` |
//! | `CCU__DATABASE__POOL_SIZE` | `ccu.database.poolSize` |
//!
//! `__` separates nesting levels; single `_` joins words within one level.
//! Values parse heuristically: a comma anywhere makes a string list, then
//! `true`/`false` (any case), then a JSON literal, then a plain string. By
//! default only variables whose first segment matches one of the schema's
//! root keys are read, so `PATH` and friends never leak into the tree; set
//! [`env_prefixes()`](StagefigBuilder::env_prefixes) to override, or
//! [`no_env()`](StagefigBuilder::no_env) to opt out.
//!
//! The mapping runs both ways: [`ResolvedConfig::to_env`] (and
//! [`tree_to_env`]) flattens a tree back into `NAME__LIKE_THIS` pairs for
//! handing to a child process. Lists flatten to comma-joined strings, so a
//! list item containing a comma does not survive a round trip; keep commas
//! out of list items that cross the env boundary.
//!
//! # Stages
//!
//! A config file may carry a reserved `$env` section mapping stage names to
//! sparse overlay trees:
//!
//! ```json5
//! {
//!   django: {debug: true},
//!   $env: {
//!     production: {django: {debug: false}},
//!   },
//! }
//! ```
//!
//! The `$env` sections themselves deep-merge across layers like any other
//! subtree. After the main merge validates, the overlay for the selected
//! stage merges on top and the result is validated again, so an overlay can
//! break the config in exactly the ways any other layer can, and is caught
//! the same way. Selecting a stage with no overlay logs a warning and
//! changes nothing. `$env` never appears in the resolved tree.
//!
//! # Extending files
//!
//! A layer names its base documents with the reserved `$extends` key:
//!
//! ```json5
//! {
//!   $extends: ["base", "?site-overrides"],
//!   django: {port: 9000},
//! }
//! ```
//!
//! Bases merge in listed order (later wins), with the referring document on
//! top. Chains expand recursively; a `?` prefix makes a reference optional.
//! References resolve through an [`ExtendsResolver`]; the default
//! [`DirResolver`] probes a root directory for known extensions and, with
//! the `remote` Cargo feature, fetches `http(s)://` references. A cyclic
//! chain fails with the full cycle path in the error.
//!
//! # Reading the result
//!
//! [`ResolvedConfig`] is the validated tree plus provenance: dotted-path
//! [`get`](ResolvedConfig::get) / [`require`](ResolvedConfig::require),
//! typed [`deserialize`](ResolvedConfig::deserialize) into any
//! `serde::Deserialize` struct, [`subset`](ResolvedConfig::subset) for
//! projecting a masked slice of the tree (say, just the keys one container
//! should see), and [`to_env`](ResolvedConfig::to_env) for the flat form.
//!
//! # Errors
//!
//! All fallible operations return [`StagefigError`]. Configuration errors
//! are fatal by design: a service must refuse to start on a config it
//! cannot fully resolve and validate. Messages are user-facing, naming the
//! offending source, dotted path, or cycle. See the [`error`] module.
//!
//! # Cargo features
//!
//! - `yaml` (default): YAML file layers via serde_yaml.
//! - `remote`: `http(s)://` `$extends` references via reqwest.

pub mod error;
pub mod types;

mod builder;
mod env;
mod extends;
mod file;
mod flatten;
pub(crate) mod merge;
mod registry;
mod resolve;
mod schema;
mod subset;

#[cfg(test)]
mod fixtures;

pub use builder::{Stagefig, StagefigBuilder};
pub use env::env_to_tree;
pub use error::{StagefigError, Violation};
pub use extends::{DirResolver, ExtendsResolver, FetchedSource, expand_extends};
pub use file::{Format, load_layer};
pub use flatten::tree_to_env;
pub use merge::deep_merge;
pub use registry::SchemaRegistry;
pub use resolve::{ResolveInput, ResolvedConfig, resolve};
pub use schema::{Field, Refinement, Schema};
pub use subset::pick_subset;
pub use types::{ENV_KEY, EXTENDS_KEY, LayerSource, Tree};
