#[cfg(test)]
pub mod test {
    use serde_json::json;

    use crate::schema::{Field, Schema};
    use crate::types::Tree;

    /// Schema for a small service platform: nested objects, coercions,
    /// defaults, and refinements, shared across pipeline tests.
    pub fn platform_schema() -> Schema {
        Schema::object([
            Field::new("host", Schema::string()).default("localhost"),
            Field::new("port", Schema::number().range(1.0, 65535.0)).default(8080),
            Field::new("debug", Schema::bool()).default(false),
            Field::new(
                "database",
                Schema::object([
                    Field::new("url", Schema::string().url()).optional(),
                    Field::new("poolSize", Schema::number()).default(5),
                ]),
            )
            .default(json!({})),
            Field::new("allowedHosts", Schema::string_or_list()).default(json!([])),
        ])
    }

    /// Unwrap a `json!` object literal into a [`Tree`].
    pub fn tree(value: serde_json::Value) -> Tree {
        value.as_object().expect("object fixture").clone()
    }

    #[test]
    fn platform_schema_accepts_its_own_defaults() {
        let schema = platform_schema();
        let out = schema.validate(&json!({})).unwrap();
        assert_eq!(out["host"], json!("localhost"));
        assert_eq!(out["port"], json!(8080));
        assert_eq!(out["database"]["poolSize"], json!(5));
        assert_eq!(out["allowedHosts"], json!([]));
    }
}
