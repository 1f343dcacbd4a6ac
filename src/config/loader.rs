use crate::package::{Package, Platform};
use serde::Deserialize;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug)]
pub enum ConfigError {
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    Json {
        path: Option<PathBuf>,
        source: serde_json::Error,
    },
    Toml {
        path: Option<PathBuf>,
        source: toml_edit::de::Error,
    },
    /// A `patcher-config-root*` value could not be read as a config layer
    InvalidLayer {
        key: String,
        source: serde_json::Error,
    },
    /// No `default` applier remained after merging all layers
    MissingDefaultApplier,
}

impl ConfigError {
    fn with_path(self, path: &Path) -> Self {
        let path = path.to_path_buf();
        match self {
            ConfigError::Json { path: None, source } => ConfigError::Json {
                path: Some(path),
                source,
            },
            ConfigError::Toml { path: None, source } => ConfigError::Toml {
                path: Some(path),
                source,
            },
            other => other,
        }
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Io { path, source } => {
                write!(f, "failed to read {}: {}", path.display(), source)
            }
            ConfigError::Json { path, source } => match path {
                Some(path) => write!(f, "failed to parse JSON ({}): {}", path.display(), source),
                None => write!(f, "failed to parse JSON: {}", source),
            },
            ConfigError::Toml { path, source } => match path {
                Some(path) => write!(f, "failed to parse TOML ({}): {}", path.display(), source),
                None => write!(f, "failed to parse TOML: {}", source),
            },
            ConfigError::InvalidLayer { key, source } => {
                write!(f, "invalid patcher config under '{}': {}", key, source)
            }
            ConfigError::MissingDefaultApplier => {
                write!(f, "patcher-appliers has no 'default' applier to base appliers on")
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::Io { source, .. } => Some(source),
            ConfigError::Json { source, .. } => Some(source),
            ConfigError::Toml { source, .. } => Some(source),
            ConfigError::InvalidLayer { source, .. } => Some(source),
            ConfigError::MissingDefaultApplier => None,
        }
    }
}

/// Manifest formats understood by the loaders.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Json,
    Toml,
}

impl Format {
    /// Pick a format from a file extension; anything but `.toml` is JSON.
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("toml") => Format::Toml,
            _ => Format::Json,
        }
    }
}

/// The root project's manifest.
#[derive(Debug, Clone, Deserialize)]
pub struct ProjectManifest {
    #[serde(flatten)]
    pub package: Package,
    #[serde(default)]
    pub config: HostConfig,
}

/// Host package-manager settings the pipeline needs.
#[derive(Debug, Clone, Deserialize)]
pub struct HostConfig {
    #[serde(rename = "vendor-dir", default = "default_vendor_dir")]
    pub vendor_dir: PathBuf,
    #[serde(default)]
    pub platform: Platform,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            vendor_dir: default_vendor_dir(),
            platform: Platform::default(),
        }
    }
}

fn default_vendor_dir() -> PathBuf {
    PathBuf::from("vendor")
}

#[derive(Deserialize)]
#[serde(untagged)]
enum InstalledRepr {
    List(Vec<Package>),
    Wrapped { packages: Vec<Package> },
}

fn parse<T: for<'de> Deserialize<'de>>(input: &str, format: Format) -> Result<T, ConfigError> {
    match format {
        Format::Json => serde_json::from_str(input)
            .map_err(|source| ConfigError::Json { path: None, source }),
        Format::Toml => toml_edit::de::from_str(input)
            .map_err(|source| ConfigError::Toml { path: None, source }),
    }
}

fn read(path: &Path) -> Result<String, ConfigError> {
    fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })
}

pub fn load_manifest_from_str(input: &str, format: Format) -> Result<ProjectManifest, ConfigError> {
    parse(input, format)
}

pub fn load_manifest_from_path(path: impl AsRef<Path>) -> Result<ProjectManifest, ConfigError> {
    let path = path.as_ref();
    let contents = read(path)?;
    load_manifest_from_str(&contents, Format::from_path(path)).map_err(|error| error.with_path(path))
}

/// Installed packages: either a JSON list or `{"packages": [...]}`.
pub fn load_installed_from_str(input: &str, format: Format) -> Result<Vec<Package>, ConfigError> {
    Ok(match parse::<InstalledRepr>(input, format)? {
        InstalledRepr::List(packages) => packages,
        InstalledRepr::Wrapped { packages } => packages,
    })
}

pub fn load_installed_from_path(path: impl AsRef<Path>) -> Result<Vec<Package>, ConfigError> {
    let path = path.as_ref();
    let contents = read(path)?;
    load_installed_from_str(&contents, Format::from_path(path)).map_err(|error| error.with_path(path))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_json_manifest() {
        let manifest = load_manifest_from_str(
            r#"{
                "name": "acme/app",
                "version": "1.0.0",
                "extra": {"patches": {"acme/lib": ["patches/fix.patch"]}},
                "config": {"vendor-dir": "deps", "platform": {"php": "8.2.0"}}
            }"#,
            Format::Json,
        )
        .unwrap();
        assert_eq!(manifest.package.name, "acme/app");
        assert!(manifest.package.extra.contains_key("patches"));
        assert_eq!(manifest.config.vendor_dir, PathBuf::from("deps"));
        assert_eq!(manifest.config.platform.version("php"), Some("8.2.0"));
    }

    #[test]
    fn test_load_toml_manifest() {
        let manifest = load_manifest_from_str(
            r#"
name = "acme/app"

[extra]
enable-patching = false

[extra.patches]
"acme/lib" = ["patches/fix.patch"]
"#,
            Format::Toml,
        )
        .unwrap();
        assert_eq!(manifest.package.version, "0.0.0");
        assert_eq!(manifest.package.extra["enable-patching"], serde_json::json!(false));
        assert_eq!(manifest.config.vendor_dir, PathBuf::from("vendor"));
    }

    #[test]
    fn test_load_installed_shapes() {
        let list =
            load_installed_from_str(r#"[{"name": "acme/lib", "version": "1.2.0"}]"#, Format::Json)
                .unwrap();
        assert_eq!(list.len(), 1);

        let wrapped = load_installed_from_str(
            r#"{"packages": [{"name": "acme/lib"}, {"name": "acme/util", "version": "2.0"}]}"#,
            Format::Json,
        )
        .unwrap();
        assert_eq!(wrapped[1].version, "2.0");
    }

    #[test]
    fn test_error_carries_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.json");
        fs::write(&path, "{ not json").unwrap();
        let err = load_manifest_from_path(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Json { path: Some(_), .. }));
        assert!(err.to_string().contains("broken.json"));
    }
}
