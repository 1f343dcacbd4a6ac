//! Filesystem patch search.
//!
//! Walks search roots below a package's base directory for `*.patch` files,
//! reads each file's metadata header and turns it into a definition for the
//! package the header targets.

use crate::definition::PatchDefinition;
use crate::header::{read_tags, tags, HeaderTags};
use rayon::prelude::*;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use walkdir::WalkDir;

/// Extension (case-insensitive) of files picked up by the search.
pub const PATCH_EXTENSION: &str = "patch";

/// Version constraint used when a header names no version.
pub const DEFAULT_CONSTRAINT: &str = ">=0.0.0";

/// Target package -> definitions found for it, in path order.
pub type SearchGroup = BTreeMap<String, Vec<PatchDefinition>>;

/// Values a header contributes once the target is known.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaderDefinition {
    pub target: String,
    pub depends: String,
    pub version: String,
    pub label: String,
    pub skip: bool,
    pub after: Vec<String>,
    pub issue: Option<String>,
    pub link: Option<String>,
}

/// Infer a definition from alias-resolved header tags.
///
/// Returns `None` when no target package can be inferred.
pub fn header_definition(data: &HeaderTags) -> Option<HeaderDefinition> {
    let mut package = first(data, tags::PACKAGE).unwrap_or_default();
    let mut depends = first(data, tags::DEPENDS).unwrap_or_default();
    let mut version =
        first(data, tags::VERSION).unwrap_or_else(|| DEFAULT_CONSTRAINT.to_string());

    if let Some((dependency, constraint)) = version.split_once(':') {
        depends = dependency.trim().to_string();
        version = constraint.trim().to_string();
    }

    if let Some((name, constraint)) = package.split_once(':') {
        let (name, constraint) = (name.trim().to_string(), constraint.trim().to_string());
        package = name;
        version = constraint;
    }

    let target = if !package.is_empty() {
        package
    } else if !depends.is_empty() {
        depends.clone()
    } else {
        return None;
    };

    if depends.is_empty() {
        depends = target.clone();
    }

    let label = data
        .get(tags::LABEL)
        .map(|values| values.join("\n"))
        .unwrap_or_default();

    Some(HeaderDefinition {
        target,
        depends,
        version,
        label,
        skip: data.contains_key(tags::SKIP),
        after: data
            .get(tags::AFTER)
            .map(|values| values.iter().filter(|v| !v.is_empty()).cloned().collect())
            .unwrap_or_default(),
        issue: first(data, tags::ISSUE).filter(|v| !v.is_empty()),
        link: first(data, tags::LINK).filter(|v| !v.is_empty()),
    })
}

fn first(data: &HeaderTags, name: &str) -> Option<String> {
    data.get(name).and_then(|values| values.first()).cloned()
}

/// Build a definition from file contents.
///
/// `source` is the path relative to the search base and `path` the absolute
/// file location.
pub fn definition_from_contents(
    contents: &str,
    owner: &str,
    source: String,
    path: PathBuf,
) -> Option<PatchDefinition> {
    let header = header_definition(&read_tags(contents))?;
    let label = if header.label.trim().is_empty() {
        source.clone()
    } else {
        header.label
    };

    Some(PatchDefinition {
        source,
        targets: vec![header.target],
        owner: owner.to_string(),
        label,
        skip: header.skip,
        depends: BTreeMap::from([(header.depends, header.version)]),
        issue: header.issue,
        link: header.link,
        after: header.after,
        path: Some(path),
    })
}

/// Searches package trees for patch files.
#[derive(Debug, Clone, Default)]
pub struct PatchSearch;

impl PatchSearch {
    pub fn new() -> Self {
        Self
    }

    /// Search each root (relative to `base`) and group the results by target.
    ///
    /// One group per root, in the order the roots were given. Files are
    /// parsed in parallel; groups are filled in path order once all files
    /// are read.
    pub fn load<S: AsRef<str>>(&self, owner: &str, base: &Path, roots: &[S]) -> Vec<SearchGroup> {
        roots
            .iter()
            .map(|root| self.load_root(owner, base, root.as_ref()))
            .collect()
    }

    fn load_root(&self, owner: &str, base: &Path, root: &str) -> SearchGroup {
        let search_root = base.join(root);
        let mut paths = collect_patch_paths(&search_root);
        paths.sort();

        let definitions: Vec<Option<PatchDefinition>> = paths
            .par_iter()
            .map(|path| {
                let contents = match fs::read(path) {
                    Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
                    Err(err) => {
                        warn!(path = %path.display(), error = %err, "unreadable patch file");
                        return None;
                    }
                };
                let source = relative_source(base, path);
                let definition = definition_from_contents(&contents, owner, source, path.clone());
                if definition.is_none() {
                    debug!(path = %path.display(), "patch header names no target, skipping");
                }
                definition
            })
            .collect();

        let mut groups = SearchGroup::new();
        for definition in definitions.into_iter().flatten() {
            let target = definition.targets[0].clone();
            groups.entry(target).or_default().push(definition);
        }
        groups
    }
}

/// All patch-convention files below `root`, recursively.
pub fn collect_patch_paths(root: &Path) -> Vec<PathBuf> {
    if !root.exists() {
        return Vec::new();
    }
    WalkDir::new(root)
        .follow_links(true)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().is_file() && is_patch_file(entry.path()))
        .map(|entry| entry.into_path())
        .collect()
}

fn is_patch_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case(PATCH_EXTENSION))
}

/// Path relative to `base`, forward slashes, no leading separators.
pub fn relative_source(base: &Path, path: &Path) -> String {
    let relative = path.strip_prefix(base).unwrap_or(path);
    let joined = relative
        .components()
        .map(|component| component.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/");
    joined.trim_start_matches('/').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::header::{apply_aliases, default_aliases, parse_tags};

    fn tags_from(lines: &[&str]) -> HeaderTags {
        let lines: Vec<String> = lines.iter().map(|l| l.to_string()).collect();
        apply_aliases(parse_tags(&lines), default_aliases())
    }

    #[test]
    fn test_version_colon_split() {
        let header = header_definition(&tags_from(&["Version: vendor/pkg: ^2.0"])).unwrap();
        assert_eq!(header.target, "vendor/pkg");
        assert_eq!(header.depends, "vendor/pkg");
        assert_eq!(header.version, "^2.0");
    }

    #[test]
    fn test_package_colon_split() {
        let header = header_definition(&tags_from(&["Target: acme/lib:>=1.4"])).unwrap();
        assert_eq!(header.target, "acme/lib");
        assert_eq!(header.depends, "acme/lib");
        assert_eq!(header.version, ">=1.4");
    }

    #[test]
    fn test_depends_differs_from_target() {
        let header = header_definition(&tags_from(&[
            "Target: acme/lib",
            "Depends: acme/core",
            "Version: ~2.1",
        ]))
        .unwrap();
        assert_eq!(header.target, "acme/lib");
        assert_eq!(header.depends, "acme/core");
        assert_eq!(header.version, "~2.1");
    }

    #[test]
    fn test_default_version_and_no_target() {
        let header = header_definition(&tags_from(&["Module: acme/lib"])).unwrap();
        assert_eq!(header.version, DEFAULT_CONSTRAINT);

        assert!(header_definition(&tags_from(&["Label: orphan"])).is_none());
    }

    #[test]
    fn test_multiline_label_and_after() {
        let header = header_definition(&tags_from(&[
            "Target: acme/lib",
            "Label: first",
            "Label: second",
            "After: patches/base.patch",
            "After:",
            "Skip:",
        ]))
        .unwrap();
        assert_eq!(header.label, "first\nsecond");
        assert_eq!(header.after, vec!["patches/base.patch"]);
        assert!(header.skip);
    }

    #[test]
    fn test_relative_source() {
        let base = Path::new("/srv/app");
        assert_eq!(
            relative_source(base, Path::new("/srv/app/patches/a/fix.patch")),
            "patches/a/fix.patch"
        );
    }

    #[test]
    fn test_load_groups_by_target() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path();
        fs::create_dir_all(base.join("patches/sub")).unwrap();
        fs::write(
            base.join("patches/b.patch"),
            "Target: vendor/lib\nVersion: vendor/lib: ^1.0\n--- a/x\n+++ b/x\n",
        )
        .unwrap();
        fs::write(
            base.join("patches/sub/a.PATCH"),
            "Target: vendor/lib\n--- a/y\n+++ b/y\n",
        )
        .unwrap();
        fs::write(base.join("patches/c.patch"), "Desc: no target\n--- a/z\n").unwrap();
        fs::write(base.join("patches/readme.txt"), "Target: vendor/other\n").unwrap();

        let groups = PatchSearch::new().load("acme/app", base, &["patches", "missing"]);
        assert_eq!(groups.len(), 2);
        assert!(groups[1].is_empty());

        let lib = &groups[0]["vendor/lib"];
        assert_eq!(lib.len(), 2);
        assert_eq!(lib[0].source, "patches/b.patch");
        assert_eq!(lib[0].depends["vendor/lib"], "^1.0");
        assert_eq!(lib[1].source, "patches/sub/a.PATCH");
        assert_eq!(lib[1].depends["vendor/lib"], DEFAULT_CONSTRAINT);
        assert_eq!(lib[1].label, "patches/sub/a.PATCH");
        assert!(lib[0].path.as_ref().unwrap().is_absolute());
        assert!(!groups[0].contains_key("vendor/other"));
    }
}
