//! Runtime-composed schemas: declare the shape once, then validate, coerce,
//! and default-fill merged config trees against it.
//!
//! Schemas are plain values built with constructor methods, so collaborating
//! modules can each define a fragment and compose them (see
//! [`SchemaRegistry`](crate::SchemaRegistry)). Validation walks the whole
//! tree and reports every failure at once rather than stopping at the first.

use std::env;

use serde_json::Value;
use url::Url;

use crate::error::{StagefigError, Violation};
use crate::types::{Tree, kind_name};

/// A composable schema node.
///
/// Built with the constructor methods ([`string`](Schema::string),
/// [`object`](Schema::object), ...), refined with the checker methods
/// ([`range`](Schema::range), [`url`](Schema::url), ...), and attached to
/// object fields via [`Field::new`].
#[derive(Debug, Clone)]
pub struct Schema {
    kind: Kind,
    refinements: Vec<Refinement>,
}

#[derive(Debug, Clone)]
enum Kind {
    String,
    Number,
    Bool,
    StringList,
    StringOrList,
    Object { fields: Vec<Field>, passthrough: bool },
    OpenMap,
    Any,
}

/// A named field inside an object schema. Required unless marked
/// [`optional`](Field::optional) or given a default.
#[derive(Debug, Clone)]
pub struct Field {
    name: String,
    schema: Schema,
    default: Option<Value>,
    optional: bool,
    nullable: bool,
}

/// A declarative check applied after kind coercion. Data rather than a
/// closure, so schemas stay `Clone + Debug`.
#[derive(Debug, Clone, PartialEq)]
pub enum Refinement {
    /// Inclusive numeric range.
    Range { min: f64, max: f64 },
    /// Minimum number of list items.
    MinItems(usize),
    /// Non-empty string or list.
    NonEmpty,
    /// Must parse as an absolute URL.
    Url,
    /// String must be one of the listed options.
    OneOf(Vec<String>),
}

impl Schema {
    pub fn string() -> Self {
        Self::of(Kind::String)
    }

    /// Accepts any JSON number. Numeric strings coerce: integer first,
    /// then float only when the text contains a dot, so "NaN" and "inf"
    /// stay strings and fail the kind check.
    pub fn number() -> Self {
        Self::of(Kind::Number)
    }

    /// Accepts JSON booleans plus the strings "true"/"false" in any case,
    /// so Python-style `True` from env files coerces cleanly.
    pub fn bool() -> Self {
        Self::of(Kind::Bool)
    }

    /// A list of strings. A plain string input coerces by splitting on
    /// commas (a string without commas becomes a one-element list).
    pub fn string_list() -> Self {
        Self::of(Kind::StringList)
    }

    /// A string, unless the input contains a comma, in which case it
    /// splits into a string list. For fields whose consumers accept both
    /// shapes.
    pub fn string_or_list() -> Self {
        Self::of(Kind::StringOrList)
    }

    /// An object with the given named fields. Closed: unknown keys are
    /// violations unless [`passthrough`](Schema::passthrough) is set.
    pub fn object(fields: impl IntoIterator<Item = Field>) -> Self {
        Self::of(Kind::Object {
            fields: fields.into_iter().collect(),
            passthrough: false,
        })
    }

    /// An object with arbitrary string keys and unchecked values, for
    /// key-value stores like secret maps.
    pub fn open_map() -> Self {
        Self::of(Kind::OpenMap)
    }

    /// Anything goes.
    pub fn any() -> Self {
        Self::of(Kind::Any)
    }

    fn of(kind: Kind) -> Self {
        Self {
            kind,
            refinements: Vec::new(),
        }
    }

    /// Retain unknown keys verbatim instead of rejecting them. Only
    /// meaningful on object schemas.
    pub fn passthrough(mut self) -> Self {
        if let Kind::Object { passthrough, .. } = &mut self.kind {
            *passthrough = true;
        }
        self
    }

    pub fn refine(mut self, refinement: Refinement) -> Self {
        self.refinements.push(refinement);
        self
    }

    pub fn range(self, min: f64, max: f64) -> Self {
        self.refine(Refinement::Range { min, max })
    }

    pub fn min_items(self, n: usize) -> Self {
        self.refine(Refinement::MinItems(n))
    }

    pub fn non_empty(self) -> Self {
        self.refine(Refinement::NonEmpty)
    }

    pub fn url(self) -> Self {
        self.refine(Refinement::Url)
    }

    pub fn one_of<I, S>(self, options: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.refine(Refinement::OneOf(
            options.into_iter().map(Into::into).collect(),
        ))
    }

    /// Fill absent keys from declared defaults, recursively, without any
    /// checking. Inserted object defaults are recursed into so nested
    /// defaults fill too.
    pub fn apply_defaults(&self, input: &Value) -> Value {
        match (&self.kind, input) {
            (Kind::Object { fields, .. }, Value::Object(map)) => {
                let mut out = map.clone();
                for field in fields {
                    match out.get(&field.name) {
                        Some(present) => {
                            let filled = field.schema.apply_defaults(present);
                            out.insert(field.name.clone(), filled);
                        }
                        None => {
                            if let Some(default) = &field.default {
                                out.insert(
                                    field.name.clone(),
                                    field.schema.apply_defaults(default),
                                );
                            }
                        }
                    }
                }
                Value::Object(out)
            }
            _ => input.clone(),
        }
    }

    /// Validate `input` against this schema.
    ///
    /// Coerces declared coercions, checks kinds, applies refinements, and
    /// fills defaults, in that order at every node. The whole tree is
    /// walked and every failure collected into one
    /// [`StagefigError::SchemaViolations`]. On success the returned tree
    /// is fully defaulted, and validating it again returns it unchanged.
    pub fn validate(&self, input: &Value) -> Result<Value, StagefigError> {
        let mut violations = Vec::new();
        let out = self.check(input, "", &mut violations);
        if violations.is_empty() {
            Ok(out)
        } else {
            Err(StagefigError::SchemaViolations(violations))
        }
    }

    /// Names of the root object's fields. Empty for non-object schemas.
    pub(crate) fn root_keys(&self) -> Vec<&str> {
        match &self.kind {
            Kind::Object { fields, .. } => fields.iter().map(|f| f.name.as_str()).collect(),
            _ => Vec::new(),
        }
    }

    fn check(&self, input: &Value, path: &str, violations: &mut Vec<Violation>) -> Value {
        let before = violations.len();
        let value = self.check_kind(input, path, violations);
        if violations.len() == before {
            for refinement in &self.refinements {
                if let Err(reason) = refinement.check(&value) {
                    violations.push(Violation::new(path, reason));
                }
            }
        }
        value
    }

    fn check_kind(&self, input: &Value, path: &str, violations: &mut Vec<Violation>) -> Value {
        match &self.kind {
            Kind::Any => input.clone(),

            Kind::String => match input {
                Value::String(_) => input.clone(),
                other => mismatch(violations, path, "string", other),
            },

            Kind::Number => match input {
                Value::Number(_) => input.clone(),
                Value::String(s) => match parse_number(s) {
                    Some(n) => n,
                    None => mismatch(violations, path, "number", input),
                },
                other => mismatch(violations, path, "number", other),
            },

            Kind::Bool => match input {
                Value::Bool(_) => input.clone(),
                Value::String(s) if s.eq_ignore_ascii_case("true") => Value::Bool(true),
                Value::String(s) if s.eq_ignore_ascii_case("false") => Value::Bool(false),
                other => mismatch(violations, path, "bool", other),
            },

            Kind::StringList => match input {
                Value::String(s) => split_commas(s),
                Value::Array(items) => checked_string_items(items, path, violations),
                other => mismatch(violations, path, "list of strings", other),
            },

            Kind::StringOrList => match input {
                Value::String(s) if s.contains(',') => split_commas(s),
                Value::String(_) => input.clone(),
                Value::Array(items) => checked_string_items(items, path, violations),
                other => mismatch(violations, path, "string or list of strings", other),
            },

            Kind::OpenMap => match input {
                Value::Object(_) => input.clone(),
                other => mismatch(violations, path, "object", other),
            },

            Kind::Object {
                fields,
                passthrough,
            } => {
                let Value::Object(map) = input else {
                    return mismatch(violations, path, "object", input);
                };
                let mut out = Tree::new();
                for field in fields {
                    let child_path = join_path(path, &field.name);
                    match map.get(&field.name) {
                        Some(Value::Null) => {
                            if field.nullable {
                                out.insert(field.name.clone(), Value::Null);
                            } else {
                                violations
                                    .push(Violation::new(&child_path, "null is not permitted"));
                            }
                        }
                        Some(present) => {
                            let checked = field.schema.check(present, &child_path, violations);
                            out.insert(field.name.clone(), checked);
                        }
                        None => match &field.default {
                            Some(default) => {
                                let checked = field.schema.check(default, &child_path, violations);
                                out.insert(field.name.clone(), checked);
                            }
                            None if field.optional => {}
                            None => {
                                violations
                                    .push(Violation::new(&child_path, "missing required value"));
                            }
                        },
                    }
                }
                for (key, value) in map {
                    if fields.iter().any(|f| f.name == *key) {
                        continue;
                    }
                    if *passthrough {
                        out.insert(key.clone(), value.clone());
                    } else {
                        violations.push(Violation::new(&join_path(path, key), "unknown key"));
                    }
                }
                Value::Object(out)
            }
        }
    }
}

impl Field {
    /// Declare a required field.
    pub fn new(name: impl Into<String>, schema: Schema) -> Self {
        Self {
            name: name.into(),
            schema,
            default: None,
            optional: false,
            nullable: false,
        }
    }

    /// Absent is fine; the key is simply omitted from the output.
    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }

    /// Explicit JSON null is allowed and kept as-is.
    pub fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    /// Static fallback used when no layer supplies the field. Defaults
    /// pass through the same coercions and checks as supplied values.
    pub fn default(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(value.into());
        self
    }

    /// Fallback captured from the process environment right now, at
    /// schema construction time. Never re-read during validation. An
    /// absent variable records no default.
    pub fn default_from_env(mut self, var: &str) -> Self {
        if let Ok(value) = env::var(var) {
            self.default = Some(Value::String(value));
        }
        self
    }
}

impl Refinement {
    fn check(&self, value: &Value) -> Result<(), String> {
        match self {
            Refinement::Range { min, max } => {
                if let Some(n) = value.as_f64()
                    && (n < *min || n > *max)
                {
                    return Err(format!("{n} is outside the range {min}..={max}"));
                }
                Ok(())
            }
            Refinement::MinItems(n) => {
                if let Value::Array(items) = value
                    && items.len() < *n
                {
                    return Err(format!("needs at least {n} item(s), got {}", items.len()));
                }
                Ok(())
            }
            Refinement::NonEmpty => match value {
                Value::String(s) if s.is_empty() => Err("must not be empty".into()),
                Value::Array(items) if items.is_empty() => Err("must not be empty".into()),
                _ => Ok(()),
            },
            Refinement::Url => match value {
                Value::String(s) => Url::parse(s)
                    .map(|_| ())
                    .map_err(|e| format!("not a valid URL: {e}")),
                _ => Ok(()),
            },
            Refinement::OneOf(options) => match value {
                Value::String(s) if !options.iter().any(|o| o == s) => {
                    Err(format!("'{s}' is not one of {options:?}"))
                }
                _ => Ok(()),
            },
        }
    }
}

fn mismatch(violations: &mut Vec<Violation>, path: &str, expected: &str, got: &Value) -> Value {
    violations.push(Violation::new(
        path,
        format!("expected {expected}, got {}", kind_name(got)),
    ));
    Value::Null
}

fn join_path(prefix: &str, key: &str) -> String {
    if prefix.is_empty() {
        key.to_string()
    } else {
        format!("{prefix}.{key}")
    }
}

fn split_commas(s: &str) -> Value {
    Value::Array(
        s.split(',')
            .map(|part| Value::String(part.to_string()))
            .collect(),
    )
}

fn checked_string_items(items: &[Value], path: &str, violations: &mut Vec<Violation>) -> Value {
    for (i, item) in items.iter().enumerate() {
        if !item.is_string() {
            violations.push(Violation::new(
                format!("{path}[{i}]"),
                format!("expected string, got {}", kind_name(item)),
            ));
        }
    }
    Value::Array(items.to_vec())
}

fn parse_number(s: &str) -> Option<Value> {
    if let Ok(i) = s.parse::<i64>() {
        return Some(Value::from(i));
    }
    // Only accept a float if the string actually contains a dot, to
    // avoid "NaN" / "inf" being parsed as numbers.
    if s.contains('.')
        && let Ok(f) = s.parse::<f64>()
    {
        return Some(Value::from(f));
    }
    None
}
