//! Reading and parsing config layer files.
//!
//! Formats are chosen by extension: `.json` and `.json5` always, `.yaml` /
//! `.yml` behind the `yaml` feature. JSON files go through the JSON5 parser
//! (a strict superset), so comments and trailing commas are tolerated
//! everywhere.
//!
//! Optional layers that don't exist are skipped with a debug log; every
//! other failure (unreadable file, malformed content, non-object top level)
//! aborts the load.

use std::fs;
use std::io::ErrorKind;
use std::path::Path;

use log::debug;
use serde_json::Value;

use crate::error::StagefigError;
use crate::types::{Tree, kind_name};

/// Supported layer file formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Json,
    Json5,
    #[cfg(feature = "yaml")]
    Yaml,
}

impl Format {
    /// Detect from a path's extension. `None` for unsupported extensions.
    pub fn from_path(path: &Path) -> Option<Format> {
        match path.extension().and_then(|e| e.to_str()) {
            Some("json") => Some(Format::Json),
            Some("json5") => Some(Format::Json5),
            #[cfg(feature = "yaml")]
            Some("yaml") | Some("yml") => Some(Format::Yaml),
            _ => None,
        }
    }
}

/// Extensions tried, in order, when a bare extension reference needs a file.
pub(crate) fn known_extensions() -> &'static [&'static str] {
    #[cfg(feature = "yaml")]
    {
        &["json5", "json", "yaml", "yml"]
    }
    #[cfg(not(feature = "yaml"))]
    {
        &["json5", "json"]
    }
}

/// Read and parse one config layer file.
///
/// `optional` files that don't exist yield `Ok(None)` with a debug log, so
/// sparse layer stacks (machine-local overrides, per-developer files) cost
/// no ceremony. Everything else is fatal.
pub fn load_layer(path: &Path, optional: bool) -> Result<Option<Tree>, StagefigError> {
    let Some(format) = Format::from_path(path) else {
        return Err(StagefigError::Parse {
            source_name: path.display().to_string(),
            reason: format!(
                "unsupported config format (expected one of: {})",
                known_extensions().join(", ")
            ),
        });
    };
    match fs::read_to_string(path) {
        Ok(contents) => {
            let tree = parse_tree(&contents, format, &path.display().to_string())?;
            Ok(Some(tree))
        }
        Err(err) if optional && err.kind() == ErrorKind::NotFound => {
            debug!("optional config layer not found, skipping: {}", path.display());
            Ok(None)
        }
        Err(err) => Err(StagefigError::Io {
            path: path.to_path_buf(),
            source: err,
        }),
    }
}

/// Parse layer contents into a tree. The top level must be an object.
pub fn parse_tree(contents: &str, format: Format, source_name: &str) -> Result<Tree, StagefigError> {
    let value: Value = match format {
        Format::Json | Format::Json5 => {
            json5::from_str(contents).map_err(|e| StagefigError::Parse {
                source_name: source_name.to_string(),
                reason: e.to_string(),
            })?
        }
        #[cfg(feature = "yaml")]
        Format::Yaml => serde_yaml::from_str(contents).map_err(|e| StagefigError::Parse {
            source_name: source_name.to_string(),
            reason: e.to_string(),
        })?,
    };
    match value {
        Value::Object(tree) => Ok(tree),
        other => Err(StagefigError::Parse {
            source_name: source_name.to_string(),
            reason: format!("top level must be an object, got {}", kind_name(&other)),
        }),
    }
}
