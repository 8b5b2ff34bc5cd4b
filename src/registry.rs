use log::warn;
use serde_json::json;

use crate::schema::{Field, Schema};

/// Explicit registry of named schema fragments.
///
/// Each collaborating module registers the schema for its own config domain
/// under that domain's root key; [`compose`](SchemaRegistry::compose) mounts
/// every fragment as a field of one root object schema. Mounted fragments
/// default to an empty section, so a fragment's own defaults materialize
/// even when no layer mentions the domain at all, and a fragment with
/// required, defaultless fields still fails loudly when its domain is
/// missing.
#[derive(Debug, Default)]
pub struct SchemaRegistry {
    fragments: Vec<(String, Schema)>,
}

impl SchemaRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `fragment` under `name`. Registering the same name again
    /// replaces the earlier fragment (logged at warn).
    pub fn register(&mut self, name: impl Into<String>, fragment: Schema) -> &mut Self {
        let name = name.into();
        if let Some(existing) = self.fragments.iter_mut().find(|(n, _)| *n == name) {
            warn!("schema fragment '{name}' registered twice, replacing the earlier one");
            existing.1 = fragment;
        } else {
            self.fragments.push((name, fragment));
        }
        self
    }

    pub fn is_empty(&self) -> bool {
        self.fragments.is_empty()
    }

    /// Registered fragment names, in registration order.
    pub fn names(&self) -> Vec<&str> {
        self.fragments.iter().map(|(n, _)| n.as_str()).collect()
    }

    /// Mount all fragments into a single root object schema.
    pub fn compose(&self) -> Schema {
        Schema::object(
            self.fragments
                .iter()
                .map(|(name, fragment)| Field::new(name.clone(), fragment.clone()).default(json!({}))),
        )
    }
}
