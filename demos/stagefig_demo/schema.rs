//! Schema fragments for the stagefig demo.
//!
//! Each platform domain owns its fragment; the registry composes them into
//! the root schema. Env prefixes derive from the root keys, so only
//! `CCU__*` and `SENTRY__*` variables are read.

use serde_json::json;
use stagefig::{Field, Schema, SchemaRegistry};

pub fn registry() -> SchemaRegistry {
    let mut registry = SchemaRegistry::new();
    registry.register("ccu", ccu());
    registry.register("sentry", sentry());
    registry
}

/// The Django service and its database. `allowedHosts` has no default on
/// purpose: some layer must always name the hosts a deploy serves.
fn ccu() -> Schema {
    Schema::object([
        Field::new(
            "django",
            Schema::object([
                Field::new("host", Schema::string()).default("127.0.0.1"),
                Field::new("port", Schema::number().range(1.0, 65535.0)).default(8000),
                Field::new("debug", Schema::bool()).default(false),
                Field::new("allowedHosts", Schema::string_or_list().min_items(1)),
            ]),
        ),
        Field::new(
            "database",
            Schema::object([
                Field::new("url", Schema::string().url()).optional(),
                Field::new("poolSize", Schema::number().range(1.0, 100.0)).default(5),
            ]),
        )
        .default(json!({})),
    ])
}

fn sentry() -> Schema {
    Schema::object([
        Field::new("dsn", Schema::string().url()).optional(),
        Field::new("tracesSampleRate", Schema::number().range(0.0, 1.0)).default(0.0),
    ])
}
