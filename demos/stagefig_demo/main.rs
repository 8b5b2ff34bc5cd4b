//! # stagefig demo application
//!
//! A sample service launcher showing how a platform wires
//! [stagefig](https://docs.rs/stagefig) end to end. It is not a real app;
//! it exists to demonstrate and manually verify stagefig's features.
//!
//! ## Running
//!
//! ```sh
//! cargo run --example stagefig_demo
//! CCU_STAGE=production cargo run --example stagefig_demo
//! ```
//!
//! ## Features demonstrated
//!
//! | Feature            | How to exercise it                                         |
//! |--------------------|------------------------------------------------------------|
//! | `$extends` chain   | `config/app.json5` extends `config/base.json5`             |
//! | Optional layer     | create `config/local.json5` and override any key           |
//! | Stage overlays     | `CCU_STAGE=production` or `CCU_STAGE=staging`              |
//! | Env var override   | `CCU__DJANGO__PORT=9999 cargo run --example stagefig_demo` |
//! | Comma list         | `CCU__DJANGO__ALLOWED_HOSTS=a.example.com,b.example.com`   |
//! | Aggregated errors  | `CCU__DJANGO__PORT=eleventy CCU__DJANGO__DEBUG=maybe ...`  |
//! | Subset masks       | printed under "django view" on every run                   |
//! | Env flattening     | printed under "as env vars" on every run                   |

mod schema;

use std::path::PathBuf;
use std::process::exit;

use serde_json::{Value, json};
use stagefig::Stagefig;

fn config_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("demos/stagefig_demo/config")
}

fn main() {
    let dir = config_dir();

    let config = Stagefig::builder()
        .registry(&schema::registry())
        .file(dir.join("app.json5"))
        .optional_file(dir.join("local.json5"))
        .stage_from_env("CCU_STAGE")
        .load()
        .unwrap_or_else(|e| {
            eprintln!("Failed to load config:\n{e}");
            exit(1);
        });

    println!("stage:  {}", config.stage().unwrap_or("<none>"));
    println!("layers: {}", config.layers().join("  <  "));

    println!("\n--- resolved tree ---");
    println!("{:#}", Value::Object(config.tree().clone()));

    println!("\n--- django view (subset mask) ---");
    let mask = json!({"ccu": {"django": {"port": true, "debug": true, "allowedHosts": true}}});
    println!("{:#}", config.subset(&mask));

    println!("\n--- as env vars ---");
    for (name, value) in config.to_env() {
        println!("{name}={value}");
    }
}
