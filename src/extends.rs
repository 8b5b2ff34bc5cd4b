//! `$extends` resolution: a layer can declare an ordered list of base
//! documents to merge underneath itself.
//!
//! References are fetched depth-first and merged in array order (later
//! parents override earlier ones), with the referring document merged last,
//! so precedence reads left to right, self last. A leading `?` marks a
//! reference optional. Cycles are detected via the resolution stack and
//! reported with the full chain.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;

use log::debug;
use serde_json::Value;

use crate::error::StagefigError;
use crate::file::{self, Format};
use crate::merge::deep_merge;
use crate::types::{EXTENDS_KEY, Tree, kind_name};

/// A fetched extension source: contents plus a stable identity used for
/// cycle detection and error reporting.
#[derive(Debug, Clone)]
pub struct FetchedSource {
    pub id: String,
    pub contents: String,
    pub format: Format,
}

/// Resolves `$extends` references to their contents.
///
/// The built-in [`DirResolver`] covers files under a root directory, plus
/// `http(s)://` URLs with the `remote` feature. Implement this to fetch
/// from anywhere else, e.g. an object store.
pub trait ExtendsResolver {
    /// Fetch one reference. `Ok(None)` means not found, which is fatal
    /// for plain references and skipped for `?`-prefixed optional ones.
    fn fetch(&self, reference: &str) -> Result<Option<FetchedSource>, StagefigError>;
}

/// Resolves references against a root directory.
///
/// A reference with a known extension is joined to the root as-is
/// (subdirectories allowed); a bare name tries the known extensions in
/// order. With the `remote` feature, `http://` and `https://` references
/// are fetched over HTTP, bounded by [`with_timeout`](DirResolver::with_timeout).
#[derive(Debug, Clone)]
pub struct DirResolver {
    root: PathBuf,
    #[cfg_attr(not(feature = "remote"), allow(dead_code))]
    timeout: Duration,
}

impl DirResolver {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self::with_timeout(root, Duration::from_secs(10))
    }

    /// `timeout` bounds each remote fetch end to end. Unused without the
    /// `remote` feature.
    pub fn with_timeout(root: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            root: root.into(),
            timeout,
        }
    }

    fn fetch_file(&self, reference: &str) -> Result<Option<FetchedSource>, StagefigError> {
        let direct = self.root.join(reference);
        let candidates = if Format::from_path(&direct).is_some() {
            vec![direct]
        } else {
            file::known_extensions()
                .iter()
                .map(|ext| self.root.join(format!("{reference}.{ext}")))
                .collect()
        };
        for candidate in candidates {
            match fs::read_to_string(&candidate) {
                Ok(contents) => {
                    let Some(format) = Format::from_path(&candidate) else {
                        continue;
                    };
                    return Ok(Some(FetchedSource {
                        id: canonical_id(&candidate),
                        contents,
                        format,
                    }));
                }
                Err(err) if err.kind() == ErrorKind::NotFound => continue,
                Err(err) => {
                    return Err(StagefigError::Io {
                        path: candidate,
                        source: err,
                    });
                }
            }
        }
        Ok(None)
    }

    #[cfg(feature = "remote")]
    fn fetch_remote(&self, url: &str) -> Result<Option<FetchedSource>, StagefigError> {
        let fetch_err = |reason: String| StagefigError::Fetch {
            reference: url.to_string(),
            reason,
        };
        let client = reqwest::blocking::Client::builder()
            .timeout(self.timeout)
            .build()
            .map_err(|e| fetch_err(e.to_string()))?;
        let response = client.get(url).send().map_err(|e| fetch_err(e.to_string()))?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let response = response
            .error_for_status()
            .map_err(|e| fetch_err(e.to_string()))?;
        let contents = response.text().map_err(|e| fetch_err(e.to_string()))?;
        let bare = url.split(['?', '#']).next().unwrap_or(url);
        let format = Format::from_path(Path::new(bare)).unwrap_or(Format::Json5);
        Ok(Some(FetchedSource {
            id: url.to_string(),
            contents,
            format,
        }))
    }

    #[cfg(not(feature = "remote"))]
    fn fetch_remote(&self, url: &str) -> Result<Option<FetchedSource>, StagefigError> {
        Err(StagefigError::Fetch {
            reference: url.to_string(),
            reason: "remote references require the 'remote' feature".into(),
        })
    }
}

impl ExtendsResolver for DirResolver {
    fn fetch(&self, reference: &str) -> Result<Option<FetchedSource>, StagefigError> {
        if reference.starts_with("http://") || reference.starts_with("https://") {
            return self.fetch_remote(reference);
        }
        self.fetch_file(reference)
    }
}

/// A path's canonical form, for stable source identities. Falls back to
/// the path as written when canonicalization fails (e.g. the file is gone).
pub(crate) fn canonical_id(path: &Path) -> String {
    fs::canonicalize(path)
        .unwrap_or_else(|_| path.to_path_buf())
        .display()
        .to_string()
}

/// Expand a document's `$extends` chain into one merged tree.
///
/// `origin` is the document's own identity (its canonical path) and seeds
/// cycle detection, so a document extending itself is reported rather
/// than looped.
pub fn expand_extends(
    doc: Tree,
    origin: &str,
    resolver: &dyn ExtendsResolver,
) -> Result<Tree, StagefigError> {
    let mut stack = vec![origin.to_string()];
    expand_inner(doc, origin, resolver, &mut stack)
}

fn expand_inner(
    mut doc: Tree,
    origin: &str,
    resolver: &dyn ExtendsResolver,
    stack: &mut Vec<String>,
) -> Result<Tree, StagefigError> {
    let Some(refs_value) = doc.remove(EXTENDS_KEY) else {
        return Ok(doc);
    };
    let refs = parse_refs(&refs_value, origin)?;

    let mut merged = Tree::new();
    for raw_ref in refs {
        let (reference, optional) = match raw_ref.strip_prefix('?') {
            Some(rest) => (rest, true),
            None => (raw_ref.as_str(), false),
        };
        let Some(fetched) = resolver.fetch(reference)? else {
            if optional {
                debug!("optional extension '{reference}' not found, skipping");
                continue;
            }
            return Err(StagefigError::MissingExtension {
                reference: reference.to_string(),
                referrer: origin.to_string(),
            });
        };
        if let Some(pos) = stack.iter().position(|seen| *seen == fetched.id) {
            let mut cycle = stack[pos..].to_vec();
            cycle.push(fetched.id.clone());
            return Err(StagefigError::CyclicExtends { cycle });
        }
        let parent = file::parse_tree(&fetched.contents, fetched.format, &fetched.id)?;
        stack.push(fetched.id.clone());
        let parent = expand_inner(parent, &fetched.id, resolver, stack)?;
        stack.pop();
        merged = deep_merge(merged, parent);
    }
    Ok(deep_merge(merged, doc))
}

fn parse_refs(value: &Value, origin: &str) -> Result<Vec<String>, StagefigError> {
    let bad_refs = |got: &Value| StagefigError::Parse {
        source_name: origin.to_string(),
        reason: format!(
            "{EXTENDS_KEY} must be a string or a list of strings, got {}",
            kind_name(got)
        ),
    };
    match value {
        Value::String(s) => Ok(vec![s.clone()]),
        Value::Array(items) => items
            .iter()
            .map(|item| match item {
                Value::String(s) => Ok(s.clone()),
                other => Err(bad_refs(other)),
            })
            .collect(),
        other => Err(bad_refs(other)),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::fs;

    use pretty_assertions::assert_eq;
    use serde_json::json;
    use tempfile::TempDir;

    use super::*;

    struct MapResolver {
        sources: HashMap<&'static str, &'static str>,
    }

    impl MapResolver {
        fn new(sources: &[(&'static str, &'static str)]) -> Self {
            Self {
                sources: sources.iter().copied().collect(),
            }
        }
    }

    impl ExtendsResolver for MapResolver {
        fn fetch(&self, reference: &str) -> Result<Option<FetchedSource>, StagefigError> {
            Ok(self.sources.get(reference).map(|contents| FetchedSource {
                id: reference.to_string(),
                contents: contents.to_string(),
                format: Format::Json5,
            }))
        }
    }

    fn doc(value: serde_json::Value) -> Tree {
        value.as_object().expect("object fixture").clone()
    }

    #[test]
    fn no_extends_passes_through() {
        let resolver = MapResolver::new(&[]);
        let out = expand_extends(doc(json!({"a": 1})), "app", &resolver).unwrap();
        assert_eq!(out, doc(json!({"a": 1})));
    }

    #[test]
    fn document_wins_over_its_parent() {
        let resolver = MapResolver::new(&[("base", r#"{"port": 8000, "host": "base"}"#)]);
        let out = expand_extends(
            doc(json!({"$extends": ["base"], "host": "app"})),
            "app",
            &resolver,
        )
        .unwrap();
        assert_eq!(out, doc(json!({"port": 8000, "host": "app"})));
    }

    #[test]
    fn later_parent_overrides_earlier() {
        let resolver = MapResolver::new(&[
            ("first", r#"{"who": "first", "keep": 1}"#),
            ("second", r#"{"who": "second"}"#),
        ]);
        let out = expand_extends(
            doc(json!({"$extends": ["first", "second"]})),
            "app",
            &resolver,
        )
        .unwrap();
        assert_eq!(out, doc(json!({"who": "second", "keep": 1})));
    }

    #[test]
    fn chains_expand_recursively() {
        let resolver = MapResolver::new(&[
            ("mid", r#"{"$extends": ["root"], "level": "mid"}"#),
            ("root", r#"{"level": "root", "deep": true}"#),
        ]);
        let out = expand_extends(doc(json!({"$extends": ["mid"]})), "app", &resolver).unwrap();
        assert_eq!(out, doc(json!({"level": "mid", "deep": true})));
    }

    #[test]
    fn single_string_reference_accepted() {
        let resolver = MapResolver::new(&[("base", r#"{"a": 1}"#)]);
        let out = expand_extends(doc(json!({"$extends": "base"})), "app", &resolver).unwrap();
        assert_eq!(out, doc(json!({"a": 1})));
    }

    #[test]
    fn optional_missing_reference_skipped() {
        let resolver = MapResolver::new(&[("base", r#"{"a": 1}"#)]);
        let out = expand_extends(
            doc(json!({"$extends": ["base", "?site-overrides"]})),
            "app",
            &resolver,
        )
        .unwrap();
        assert_eq!(out, doc(json!({"a": 1})));
    }

    #[test]
    fn required_missing_reference_fails() {
        let resolver = MapResolver::new(&[]);
        let err = expand_extends(doc(json!({"$extends": ["ghost"]})), "app", &resolver)
            .unwrap_err();
        match err {
            StagefigError::MissingExtension {
                reference,
                referrer,
            } => {
                assert_eq!(reference, "ghost");
                assert_eq!(referrer, "app");
            }
            other => panic!("expected MissingExtension, got {other:?}"),
        }
    }

    #[test]
    fn self_reference_reports_cycle() {
        let resolver = MapResolver::new(&[("x", r#"{"$extends": ["x"]}"#)]);
        let err = expand_extends(doc(json!({"$extends": ["x"]})), "x", &resolver).unwrap_err();
        match err {
            StagefigError::CyclicExtends { cycle } => assert_eq!(cycle, vec!["x", "x"]),
            other => panic!("expected CyclicExtends, got {other:?}"),
        }
    }

    #[test]
    fn indirect_cycle_reports_full_chain() {
        let resolver = MapResolver::new(&[
            ("a", r#"{"$extends": ["b"]}"#),
            ("b", r#"{"$extends": ["a"]}"#),
        ]);
        let err = expand_extends(doc(json!({"$extends": ["b"]})), "a", &resolver).unwrap_err();
        match err {
            StagefigError::CyclicExtends { cycle } => assert_eq!(cycle, vec!["a", "b", "a"]),
            other => panic!("expected CyclicExtends, got {other:?}"),
        }
    }

    #[test]
    fn diamond_is_not_a_cycle() {
        let resolver = MapResolver::new(&[
            ("left", r#"{"$extends": ["base"], "l": 1}"#),
            ("right", r#"{"$extends": ["base"], "r": 2}"#),
            ("base", r#"{"shared": true}"#),
        ]);
        let out = expand_extends(
            doc(json!({"$extends": ["left", "right"]})),
            "app",
            &resolver,
        )
        .unwrap();
        assert_eq!(out, doc(json!({"shared": true, "l": 1, "r": 2})));
    }

    #[test]
    fn env_overlay_maps_merge_across_the_chain() {
        let resolver = MapResolver::new(&[(
            "base",
            r#"{"$env": {"production": {"debug": false}}, "debug": true}"#,
        )]);
        let out = expand_extends(
            doc(json!({"$extends": ["base"], "$env": {"staging": {"debug": true}}})),
            "app",
            &resolver,
        )
        .unwrap();
        assert_eq!(
            out["$env"],
            json!({"production": {"debug": false}, "staging": {"debug": true}})
        );
    }

    #[test]
    fn non_string_reference_rejected() {
        let resolver = MapResolver::new(&[]);
        let err =
            expand_extends(doc(json!({"$extends": [42]})), "app", &resolver).unwrap_err();
        assert!(err.to_string().contains("$extends must be a string"));
    }

    // --- DirResolver ---

    #[test]
    fn bare_name_tries_known_extensions() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("base.json5"), r#"{"a": 1}"#).unwrap();
        let resolver = DirResolver::new(dir.path());
        let fetched = resolver.fetch("base").unwrap().unwrap();
        assert_eq!(fetched.format, Format::Json5);
        assert!(fetched.contents.contains("\"a\""));
    }

    #[test]
    fn explicit_extension_used_as_is() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("base.json"), r#"{"a": 1}"#).unwrap();
        let resolver = DirResolver::new(dir.path());
        let fetched = resolver.fetch("base.json").unwrap().unwrap();
        assert_eq!(fetched.format, Format::Json);
    }

    #[test]
    fn relative_subdirectory_reference() {
        let dir = TempDir::new().unwrap();
        fs::create_dir(dir.path().join("shared")).unwrap();
        fs::write(dir.path().join("shared/base.json5"), r#"{"a": 1}"#).unwrap();
        let resolver = DirResolver::new(dir.path());
        assert!(resolver.fetch("shared/base").unwrap().is_some());
    }

    #[test]
    fn missing_file_is_none() {
        let dir = TempDir::new().unwrap();
        let resolver = DirResolver::new(dir.path());
        assert!(resolver.fetch("ghost").unwrap().is_none());
    }

    #[cfg(not(feature = "remote"))]
    #[test]
    fn url_reference_needs_the_remote_feature() {
        let dir = TempDir::new().unwrap();
        let resolver = DirResolver::new(dir.path());
        let err = resolver.fetch("https://example.com/base.json5").unwrap_err();
        assert!(err.to_string().contains("remote"));
    }

    #[test]
    fn extends_chain_on_disk() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join("base.json5"),
            r#"{port: 8000, host: "base"}"#,
        )
        .unwrap();
        fs::write(
            dir.path().join("app.json5"),
            r#"{$extends: ["base"], host: "app"}"#,
        )
        .unwrap();
        let resolver = DirResolver::new(dir.path());
        let app_path = dir.path().join("app.json5");
        let tree = file::load_layer(&app_path, false).unwrap().unwrap();
        let out = expand_extends(tree, &canonical_id(&app_path), &resolver).unwrap();
        assert_eq!(out, doc(json!({"port": 8000, "host": "app"})));
    }

    #[test]
    fn on_disk_self_cycle_detected() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("loop.json5"), r#"{$extends: ["loop"]}"#).unwrap();
        let resolver = DirResolver::new(dir.path());
        let path = dir.path().join("loop.json5");
        let tree = file::load_layer(&path, false).unwrap().unwrap();
        let err = expand_extends(tree, &canonical_id(&path), &resolver).unwrap_err();
        assert!(matches!(err, StagefigError::CyclicExtends { .. }));
    }
}
