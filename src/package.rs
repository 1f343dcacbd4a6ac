//! Package identities and the host-side collaborators the pipeline consumes.

use crate::config::version::matches_requirement;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// One package known to the host package manager.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Package {
    pub name: String,
    #[serde(default = "default_version")]
    pub version: String,
    /// Extension-metadata block (`extra`) of the package manifest
    #[serde(default)]
    pub extra: Map<String, Value>,
}

fn default_version() -> String {
    "0.0.0".to_string()
}

impl Package {
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            extra: Map::new(),
        }
    }

    pub fn with_extra(mut self, extra: Value) -> Self {
        if let Value::Object(map) = extra {
            self.extra = map;
        }
        self
    }

    /// Vendor prefix of a `vendor/name` package name.
    pub fn vendor(&self) -> &str {
        self.name.split_once('/').map_or("", |(vendor, _)| vendor)
    }
}

/// Resolves where a package's files live on disk.
pub trait InstallPathResolver: Send + Sync {
    fn install_path(&self, package: &Package) -> Option<PathBuf>;
}

/// Standard layout: the root package lives at the project directory, every
/// other package at `<project>/<vendor-dir>/<vendor>/<name>`.
#[derive(Debug, Clone)]
pub struct VendorLayout {
    project_root: PathBuf,
    vendor_dir: PathBuf,
    root_name: String,
}

impl VendorLayout {
    pub fn new(
        project_root: impl Into<PathBuf>,
        vendor_dir: impl AsRef<Path>,
        root_name: impl Into<String>,
    ) -> Self {
        let project_root = project_root.into();
        let vendor_dir = project_root.join(vendor_dir);
        Self {
            project_root,
            vendor_dir,
            root_name: root_name.into(),
        }
    }

    pub fn project_root(&self) -> &Path {
        &self.project_root
    }

    pub fn vendor_dir(&self) -> &Path {
        &self.vendor_dir
    }
}

impl InstallPathResolver for VendorLayout {
    fn install_path(&self, package: &Package) -> Option<PathBuf> {
        if package.name == self.root_name {
            return Some(self.project_root.clone());
        }
        let mut path = self.vendor_dir.clone();
        for segment in package.name.split('/') {
            if segment.is_empty() || segment == "." || segment == ".." {
                return None;
            }
            path.push(segment);
        }
        Some(path)
    }
}

/// Synthetic packages describing the runtime platform (`php`, `ext-json`,
/// `rust`, ...). `depends` entries naming one of them are checked against
/// this table instead of the installed package set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Platform {
    packages: BTreeMap<String, String>,
}

impl Platform {
    pub fn new(packages: BTreeMap<String, String>) -> Self {
        Self { packages }
    }

    pub fn insert(&mut self, name: impl Into<String>, version: impl Into<String>) {
        self.packages.insert(name.into(), version.into());
    }

    pub fn contains(&self, name: &str) -> bool {
        self.packages.contains_key(name)
    }

    pub fn version(&self, name: &str) -> Option<&str> {
        self.packages.get(name).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.packages.is_empty()
    }

    /// Check a constraint against a platform package.
    ///
    /// Returns `None` when `name` is not a platform package.
    pub fn satisfies(&self, name: &str, constraint: &str) -> Option<bool> {
        let version = self.version(name)?;
        Some(matches_requirement(version, Some(constraint)).unwrap_or(false))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_vendor_layout_paths() {
        let layout = VendorLayout::new("/srv/app", "vendor", "acme/app");
        let root = Package::new("acme/app", "1.0.0");
        let lib = Package::new("acme/lib", "1.0.0");
        let hostile = Package::new("../etc", "1.0.0");

        assert_eq!(layout.install_path(&root), Some(PathBuf::from("/srv/app")));
        assert_eq!(
            layout.install_path(&lib),
            Some(PathBuf::from("/srv/app/vendor/acme/lib"))
        );
        assert_eq!(layout.install_path(&hostile), None);
    }

    #[test]
    fn test_package_vendor_and_extra() {
        let pkg = Package::new("acme/lib", "1.0.0").with_extra(json!({"patches": {}}));
        assert_eq!(pkg.vendor(), "acme");
        assert!(pkg.extra.contains_key("patches"));
        assert_eq!(Package::new("standalone", "1.0.0").vendor(), "");
    }

    #[test]
    fn test_platform_satisfies() {
        let mut platform = Platform::default();
        platform.insert("php", "8.1.2");
        assert_eq!(platform.satisfies("php", ">=8.0"), Some(true));
        assert_eq!(platform.satisfies("php", "<8.0"), Some(false));
        assert_eq!(platform.satisfies("ext-json", "*"), None);
    }
}
