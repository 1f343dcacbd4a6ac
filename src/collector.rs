//! Intake of raw declarations from package metadata.
//!
//! Each package's `extra` block may declare patches three ways:
//!
//! - `patches`: `{target: {label: declaration}}` or `{target: [declaration]}`
//! - `patches-file`: JSON file(s) relative to the package holding the same
//!   `{"patches": {...}}` shape
//! - `patches-search`: directories searched for `*.patch` files with headers

use crate::config::EffectiveConfig;
use crate::definition::{normalize, PatchDefinition, RawDeclaration};
use crate::package::{InstallPathResolver, Package};
use crate::search::PatchSearch;
use serde_json::{Map, Value};
use std::fs;
use std::path::Path;
use tracing::{debug, warn};

pub const PATCHES: &str = "patches";
pub const PATCHES_FILE: &str = "patches-file";
pub const PATCHES_SEARCH: &str = "patches-search";

pub struct Collector<'a> {
    config: &'a EffectiveConfig,
    installs: &'a dyn InstallPathResolver,
    search: PatchSearch,
}

impl<'a> Collector<'a> {
    pub fn new(config: &'a EffectiveConfig, installs: &'a dyn InstallPathResolver) -> Self {
        Self {
            config,
            installs,
            search: PatchSearch::new(),
        }
    }

    /// Collect definitions from the root project and every installed
    /// package that `patcher-sources` allows, root first.
    pub fn collect(&self, root: &Package, packages: &[Package]) -> Vec<PatchDefinition> {
        let sources = &self.config.sources;
        if sources.is_disabled() {
            debug!("patcher-sources disabled, no patches collected");
            return Vec::new();
        }

        let mut definitions = Vec::new();
        if sources.allows_project(root) {
            definitions.extend(self.collect_package(root));
        }
        for package in packages {
            if package.name == root.name || !sources.allows_package(package) {
                continue;
            }
            definitions.extend(self.collect_package(package));
        }
        definitions
    }

    fn collect_package(&self, package: &Package) -> Vec<PatchDefinition> {
        let owner = package.name.as_str();
        let mut definitions = Vec::new();

        if let Some(value) = package.extra.get(PATCHES) {
            definitions.extend(declarations(owner, value));
        }

        let base = self.installs.install_path(package);

        if let Some(value) = package.extra.get(PATCHES_FILE) {
            match &base {
                Some(base) => {
                    for file in string_list(value) {
                        definitions.extend(read_patches_file(owner, &base.join(&file)));
                    }
                }
                None => warn!(package = owner, "no install path, patches-file ignored"),
            }
        }

        if let Some(value) = package.extra.get(PATCHES_SEARCH) {
            match &base {
                Some(base) => {
                    let roots = string_list(value);
                    for group in self.search.load(owner, base, &roots) {
                        definitions.extend(group.into_values().flatten());
                    }
                }
                None => warn!(package = owner, "no install path, patches-search ignored"),
            }
        }

        definitions
    }
}

/// Normalize every declaration in a `patches` map.
pub fn declarations(owner: &str, value: &Value) -> Vec<PatchDefinition> {
    let Value::Object(targets) = value else {
        debug!(owner, "patches is not a map, ignored");
        return Vec::new();
    };

    let mut definitions = Vec::new();
    for (target, entries) in targets {
        match entries {
            Value::Object(labelled) => {
                for (label, raw) in labelled {
                    definitions.extend(declaration(target, owner, label, raw));
                }
            }
            Value::Array(items) => {
                for raw in items {
                    definitions.extend(declaration(target, owner, "", raw));
                }
            }
            other => definitions.extend(declaration(target, owner, "", other)),
        }
    }
    definitions
}

fn declaration(target: &str, owner: &str, label: &str, raw: &Value) -> Option<PatchDefinition> {
    let raw: RawDeclaration = match serde_json::from_value(raw.clone()) {
        Ok(raw) => raw,
        Err(err) => {
            debug!(owner, target, error = %err, "unreadable patch declaration");
            return None;
        }
    };
    let mut definition = normalize(target, owner, label, raw).into_definition()?;
    if definition.label.is_empty() {
        definition.label = definition.source.clone();
    }
    Some(definition)
}

fn read_patches_file(owner: &str, path: &Path) -> Vec<PatchDefinition> {
    let contents = match fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(err) => {
            warn!(owner, path = %path.display(), error = %err, "patches-file unreadable");
            return Vec::new();
        }
    };
    match serde_json::from_str::<Map<String, Value>>(&contents) {
        Ok(map) => map
            .get(PATCHES)
            .map(|value| declarations(owner, value))
            .unwrap_or_default(),
        Err(err) => {
            warn!(owner, path = %path.display(), error = %err, "patches-file is not valid JSON");
            Vec::new()
        }
    }
}

fn string_list(value: &Value) -> Vec<String> {
    match value {
        Value::String(s) => vec![s.clone()],
        Value::Array(items) => items
            .iter()
            .filter_map(|item| item.as_str().map(str::to_string))
            .collect(),
        _ => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PatcherSources;
    use crate::package::VendorLayout;
    use serde_json::json;

    #[test]
    fn test_declaration_shapes() {
        let defs = declarations(
            "acme/app",
            &json!({
                "acme/lib": {"Fix escaping": "patches/escape.patch"},
                "acme/util": ["patches/util.patch", {"url": "https://x/y.patch", "label": "Remote"}],
                "acme/broken": [{"label": "no source"}, 42]
            }),
        );
        assert_eq!(defs.len(), 3);
        assert_eq!(defs[0].label, "Fix escaping");
        assert_eq!(defs[0].targets, vec!["acme/lib"]);
        assert_eq!(defs[1].label, "patches/util.patch");
        assert_eq!(defs[2].source, "https://x/y.patch");
        assert!(defs.iter().all(|d| d.owner == "acme/app"));
    }

    #[test]
    fn test_collect_respects_sources() {
        let dir = tempfile::tempdir().unwrap();
        let layout = VendorLayout::new(dir.path(), "vendor", "acme/app");
        let root = Package::new("acme/app", "1.0.0")
            .with_extra(json!({"patches": {"acme/app": ["patches/self.patch"]}}));
        let lib = Package::new("acme/lib", "1.0.0")
            .with_extra(json!({"patches": {"acme/util": ["patches/util.patch"]}}));

        let mut config = EffectiveConfig::defaults();
        let collected = Collector::new(&config, &layout).collect(&root, &[lib.clone()]);
        assert_eq!(collected.len(), 2);

        config.sources = PatcherSources::packages_disabled();
        let collected = Collector::new(&config, &layout).collect(&root, &[lib.clone()]);
        assert_eq!(collected.len(), 1);
        assert_eq!(collected[0].owner, "acme/app");

        config.sources = PatcherSources::Toggle(false);
        assert!(Collector::new(&config, &layout)
            .collect(&root, &[lib])
            .is_empty());
    }

    #[test]
    fn test_patches_file_and_search() {
        let dir = tempfile::tempdir().unwrap();
        let lib_dir = dir.path().join("vendor/acme/lib");
        fs::create_dir_all(lib_dir.join("patches")).unwrap();
        fs::write(
            lib_dir.join("patches.json"),
            r#"{"patches": {"acme/util": {"From file": "patches/file.patch"}}}"#,
        )
        .unwrap();
        fs::write(
            lib_dir.join("patches/found.patch"),
            "Target: acme/core\n--- a/x\n+++ b/x\n",
        )
        .unwrap();

        let layout = VendorLayout::new(dir.path(), "vendor", "acme/app");
        let root = Package::new("acme/app", "1.0.0");
        let lib = Package::new("acme/lib", "1.0.0").with_extra(json!({
            "patches-file": "patches.json",
            "patches-search": ["patches"]
        }));

        let config = EffectiveConfig::defaults();
        let collected = Collector::new(&config, &layout).collect(&root, &[lib]);
        assert_eq!(collected.len(), 2);
        assert_eq!(collected[0].label, "From file");
        assert_eq!(collected[1].targets, vec!["acme/core"]);
        assert_eq!(collected[1].source, "patches/found.patch");
        assert_eq!(collected[1].owner, "acme/lib");
    }
}
