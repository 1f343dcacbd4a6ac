//! Canonical patch definition and the raw declaration shapes it is built from.

pub mod normalizer;

pub use normalizer::{normalize, Normalized};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Source-string suffix (after `#`) that marks a patch as skipped.
pub const SKIP_MARKER: &str = "skip";

/// Target name used for patches that touch several packages at once.
pub const BUNDLE_TARGET: &str = "*";

/// The canonical unit flowing through the resolution pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatchDefinition {
    /// File path or URL of the patch contents
    pub source: String,
    /// Packages this patch applies to, in declaration order
    pub targets: Vec<String>,
    /// Package whose metadata declared the patch
    pub owner: String,
    pub label: String,
    #[serde(default)]
    pub skip: bool,
    /// Package name -> version constraint
    #[serde(default)]
    pub depends: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub issue: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link: Option<String>,
    /// Sources (or labels) that must be applied before this one
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub after: Vec<String>,
    /// Resolved local file, once known
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
}

impl PatchDefinition {
    /// True when the source points at a remote location.
    pub fn is_remote(&self) -> bool {
        is_url(&self.source)
    }

    /// True when the patch was declared for the bundle target.
    pub fn is_bundle(&self) -> bool {
        self.targets.iter().any(|target| target == BUNDLE_TARGET)
    }

    pub fn targets_package(&self, name: &str) -> bool {
        self.targets.iter().any(|target| target == name)
    }

    /// Add a target, keeping the list free of duplicates.
    pub fn push_target(&mut self, target: impl Into<String>) {
        let target = target.into();
        if !self.targets.contains(&target) {
            self.targets.push(target);
        }
    }
}

pub(crate) fn is_url(source: &str) -> bool {
    source.contains("://")
}

/// One raw declaration as written in package metadata.
///
/// Declarations are either a bare source string or a partial map; the
/// normalizer turns both into a [`PatchDefinition`].
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum RawDeclaration {
    Source(String),
    Detailed(DeclarationFields),
}

impl From<&str> for RawDeclaration {
    fn from(source: &str) -> Self {
        RawDeclaration::Source(source.to_string())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct DeclarationFields {
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub targets: Option<Vec<String>>,
    #[serde(default)]
    pub skip: Option<bool>,
    #[serde(default)]
    pub label: Option<String>,
    /// Either a single constraint for the declaring package or a
    /// package -> constraint map
    #[serde(default)]
    pub version: Option<Value>,
    #[serde(default)]
    pub depends: Option<BTreeMap<String, String>>,
    #[serde(default)]
    pub issue: Option<String>,
    #[serde(default)]
    pub link: Option<String>,
    #[serde(default)]
    pub after: Option<OneOrMany>,
}

/// A value that may be written as one string or as a list of strings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum OneOrMany {
    One(String),
    Many(Vec<String>),
}

impl OneOrMany {
    pub fn into_vec(self) -> Vec<String> {
        match self {
            OneOrMany::One(value) => vec![value],
            OneOrMany::Many(values) => values,
        }
    }
}

impl Default for OneOrMany {
    fn default() -> Self {
        OneOrMany::Many(Vec::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_raw_declaration_shapes() {
        let plain: RawDeclaration = serde_json::from_str(r#""patches/fix.patch""#).unwrap();
        assert_eq!(plain, RawDeclaration::from("patches/fix.patch"));

        let detailed: RawDeclaration =
            serde_json::from_str(r#"{"source": "a.patch", "version": {"acme/lib": "^1.0"}}"#)
                .unwrap();
        match detailed {
            RawDeclaration::Detailed(fields) => {
                assert_eq!(fields.source.as_deref(), Some("a.patch"));
                assert!(fields.version.unwrap().is_object());
            }
            other => panic!("expected detailed declaration, got {other:?}"),
        }
    }

    #[test]
    fn test_push_target_dedupes() {
        let mut def = PatchDefinition {
            source: "a.patch".into(),
            targets: vec!["acme/lib".into()],
            owner: "acme/root".into(),
            label: "a".into(),
            skip: false,
            depends: BTreeMap::new(),
            issue: None,
            link: None,
            after: Vec::new(),
            path: None,
        };
        def.push_target("acme/lib");
        def.push_target("acme/other");
        assert_eq!(def.targets, vec!["acme/lib", "acme/other"]);
        assert!(!def.is_remote());
        assert!(!def.is_bundle());
    }
}
