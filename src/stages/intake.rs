use super::{Context, Stage, StageOutput};
use crate::definition::{PatchDefinition, BUNDLE_TARGET};
use std::collections::BTreeSet;
use std::fs;
use std::path::Path;
use tracing::debug;

/// Expands bundle definitions (target `*`) into the packages their diff
/// touches.
///
/// A bundle is a single diff spanning several packages, rooted at the
/// project directory. Each `---`/`+++` path is matched against the install
/// directories of the installed packages.
#[derive(Debug, Clone, Copy, Default)]
pub struct BundleStage;

impl BundleStage {
    fn expand(&self, definition: &PatchDefinition, ctx: &Context<'_>) -> Result<Vec<String>, String> {
        if definition.is_remote() {
            return Err("bundle patches must be local files".to_string());
        }
        let path = ctx
            .local_path(definition)
            .ok_or_else(|| format!("no install path for owner {}", definition.owner))?;
        let contents = fs::read(&path)
            .map_err(|err| format!("unreadable bundle {}: {err}", path.display()))?;
        let contents = String::from_utf8_lossy(&contents);

        let project_root = ctx
            .project_root()
            .ok_or_else(|| "no project root to resolve bundle paths against".to_string())?;
        let prefixes: Vec<(String, &str)> = ctx
            .installed()
            .filter_map(|package| {
                let dir = ctx.installs.install_path(package)?;
                let relative = dir.strip_prefix(&project_root).ok()?;
                Some((slash_path(relative), package.name.as_str()))
            })
            .filter(|(prefix, _)| !prefix.is_empty())
            .collect();

        let mut targets = Vec::new();
        let mut seen = BTreeSet::new();
        for file in diff_paths(&contents) {
            for (prefix, name) in &prefixes {
                let inside = file
                    .strip_prefix(prefix.as_str())
                    .is_some_and(|rest| rest.starts_with('/'));
                if inside && seen.insert(*name) {
                    targets.push(name.to_string());
                }
            }
        }
        Ok(targets)
    }
}

impl Stage for BundleStage {
    fn process(&self, patches: Vec<PatchDefinition>, ctx: &Context<'_>) -> StageOutput {
        let mut output = StageOutput::default();
        for mut definition in patches {
            if !definition.is_bundle() {
                output.keep(definition);
                continue;
            }
            match self.expand(&definition, ctx) {
                Ok(found) if found.is_empty() => {
                    output.exclude(definition, "bundle touches no installed package");
                }
                Ok(found) => {
                    debug!(source = %definition.source, targets = ?found, "expanded bundle");
                    definition.targets.retain(|target| target != BUNDLE_TARGET);
                    for target in found {
                        definition.push_target(target);
                    }
                    output.keep(definition);
                }
                Err(reason) => output.exclude(definition, reason),
            }
        }
        output
    }
}

/// Paths named by `---` and `+++` lines, without `a/`, `b/` prefixes.
fn diff_paths(contents: &str) -> Vec<String> {
    let mut paths = Vec::new();
    for line in contents.lines() {
        let Some(rest) = line
            .strip_prefix("--- ")
            .or_else(|| line.strip_prefix("+++ "))
        else {
            continue;
        };
        let path = rest.split('\t').next().unwrap_or_default().trim();
        if path.is_empty() || path == "/dev/null" {
            continue;
        }
        let path = path
            .strip_prefix("a/")
            .or_else(|| path.strip_prefix("b/"))
            .unwrap_or(path);
        let path = path.to_string();
        if !paths.contains(&path) {
            paths.push(path);
        }
    }
    paths
}

fn slash_path(path: &Path) -> String {
    path.components()
        .map(|component| component.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

/// Lets the root project override dependency-provided patches.
///
/// A definition from an installed package is dropped when the root declares
/// a patch for the same target with the same label, or the same URL.
/// Unlabelled declarations carry their source as label and only override by
/// URL.
#[derive(Debug, Clone, Copy, Default)]
pub struct RootPatchStage;

fn declared_label(definition: &PatchDefinition) -> Option<&str> {
    (definition.label != definition.source).then_some(definition.label.as_str())
}

impl Stage for RootPatchStage {
    fn process(&self, patches: Vec<PatchDefinition>, ctx: &Context<'_>) -> StageOutput {
        let root = ctx.root.name.as_str();
        let mut labels = BTreeSet::new();
        let mut urls = BTreeSet::new();
        for definition in patches.iter().filter(|d| d.owner == root) {
            if let Some(label) = declared_label(definition) {
                for target in &definition.targets {
                    labels.insert((target.clone(), label.to_string()));
                }
            }
            if definition.is_remote() {
                urls.insert(definition.source.clone());
            }
        }

        let mut output = StageOutput::default();
        for definition in patches {
            let overridden = definition.owner != root
                && (urls.contains(&definition.source)
                    || declared_label(&definition).is_some_and(|label| {
                        definition
                            .targets
                            .iter()
                            .any(|t| labels.contains(&(t.clone(), label.to_string())))
                    }));
            if overridden {
                output.exclude(definition, "overridden by root project declaration");
            } else {
                output.keep(definition);
            }
        }
        output
    }
}
