use crate::package::Package;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;

pub const PATCHER_CONFIG_ROOT: &str = "patcher-config-root";
pub const LEGACY_PATCHER_CONFIG: &str = "patcher-config";
pub const PATCHER_SOURCES: &str = "patcher-sources";
pub const PATCHER_APPLIERS: &str = "patcher-appliers";
pub const LEGACY_PATCHER_APPLIERS: &str = "patchers";
pub const EXCLUDED_PATCHES: &str = "excluded-patches";
pub const ENABLE_PATCHING: &str = "enable-patching";
pub const ENABLE_PATCHING_FROM_PACKAGES: &str = "enable-patching-from-packages";

/// Reserved applier every other applier is overlaid onto.
pub const APPLIER_DEFAULT: &str = "default";

/// Operation code -> operation value (a template, or an OS-keyed map of them).
pub type Operations = BTreeMap<String, Value>;
/// Applier code -> operations.
pub type Appliers = BTreeMap<String, Operations>;
/// Owner package -> patch paths excluded from its declarations.
pub type Exclusions = BTreeMap<String, Vec<String>>;

/// Owner key matching declarations from any package.
pub const ANY_OWNER: &str = "*";

/// `excluded-patches` is either `{owner: [paths]}` or a flat list of paths
/// applying to every owner.
#[derive(Deserialize)]
#[serde(untagged)]
enum ExclusionsRepr {
    ByOwner(Exclusions),
    Any(Vec<String>),
}

impl From<ExclusionsRepr> for Exclusions {
    fn from(repr: ExclusionsRepr) -> Self {
        match repr {
            ExclusionsRepr::ByOwner(map) => map,
            ExclusionsRepr::Any(paths) => Exclusions::from([(ANY_OWNER.to_string(), paths)]),
        }
    }
}

fn exclusions<'de, D>(deserializer: D) -> Result<Option<Exclusions>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Option::<ExclusionsRepr>::deserialize(deserializer).map(|repr| repr.map(Exclusions::from))
}

/// Parse an `excluded-patches` value found outside a config layer.
pub fn parse_exclusions(value: &Value) -> Option<Exclusions> {
    serde_json::from_value::<ExclusionsRepr>(value.clone())
        .ok()
        .map(Exclusions::from)
}

/// Which declaration sources may contribute patches.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PatcherSources {
    Toggle(bool),
    Scoped(SourceScopes),
}

impl Default for PatcherSources {
    fn default() -> Self {
        PatcherSources::Scoped(SourceScopes::default())
    }
}

impl PatcherSources {
    pub fn packages_disabled() -> Self {
        PatcherSources::Scoped(SourceScopes {
            project: SourceFilter::Toggle(true),
            packages: SourceFilter::Toggle(false),
            vendors: SourceFilter::Toggle(false),
        })
    }

    pub fn is_disabled(&self) -> bool {
        matches!(self, PatcherSources::Toggle(false))
    }

    /// Whether the root project's own declarations are read.
    pub fn allows_project(&self, root: &Package) -> bool {
        match self {
            PatcherSources::Toggle(enabled) => *enabled,
            PatcherSources::Scoped(scopes) => scopes.project.allows(&root.name),
        }
    }

    /// Whether an installed package's declarations are read. Both the
    /// package filter (by name) and the vendor filter (by vendor prefix)
    /// must allow it.
    pub fn allows_package(&self, package: &Package) -> bool {
        match self {
            PatcherSources::Toggle(enabled) => *enabled,
            PatcherSources::Scoped(scopes) => {
                scopes.packages.allows(&package.name) && scopes.vendors.allows(package.vendor())
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct SourceScopes {
    #[serde(default)]
    pub project: SourceFilter,
    #[serde(default)]
    pub packages: SourceFilter,
    #[serde(default)]
    pub vendors: SourceFilter,
}

/// `true`/`false`, or an allow-list of names.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SourceFilter {
    Toggle(bool),
    Only(Vec<String>),
}

impl Default for SourceFilter {
    fn default() -> Self {
        SourceFilter::Toggle(true)
    }
}

impl SourceFilter {
    pub fn allows(&self, name: &str) -> bool {
        match self {
            SourceFilter::Toggle(enabled) => *enabled,
            SourceFilter::Only(names) => names.iter().any(|allowed| allowed == name),
        }
    }
}

/// Order in which the external applier tries appliers and operations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sequence {
    #[serde(default)]
    pub appliers: Vec<String>,
    #[serde(default)]
    pub operations: Vec<String>,
}

/// One partial configuration source, as written under a
/// `patcher-config-root*` key or passed by the caller.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ConfigLayer {
    #[serde(rename = "patcher-sources", default)]
    pub sources: Option<PatcherSources>,
    #[serde(rename = "patcher-appliers", default)]
    pub appliers: Option<Appliers>,
    #[serde(rename = "excluded-patches", default, deserialize_with = "exclusions")]
    pub excluded_patches: Option<Exclusions>,
    #[serde(default)]
    pub graceful: Option<bool>,
    #[serde(rename = "secure-http", default)]
    pub secure_http: Option<bool>,
    #[serde(default)]
    pub levels: Option<Vec<u32>>,
    #[serde(default)]
    pub sequence: Option<Sequence>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl ConfigLayer {
    /// Parse a raw layer, folding the legacy `patchers` key into
    /// `patcher-appliers` when the latter is absent.
    pub fn from_map(mut raw: Map<String, Value>) -> Result<Self, serde_json::Error> {
        if let Some(legacy) = raw.remove(LEGACY_PATCHER_APPLIERS) {
            if !raw.contains_key(PATCHER_APPLIERS) {
                raw.insert(PATCHER_APPLIERS.to_string(), legacy);
            }
        }
        serde_json::from_value(Value::Object(raw))
    }

    pub fn is_empty(&self) -> bool {
        self == &ConfigLayer::default()
    }
}

/// The resolved configuration for one run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EffectiveConfig {
    #[serde(rename = "patcher-sources")]
    pub sources: PatcherSources,
    #[serde(rename = "patcher-appliers")]
    pub appliers: Appliers,
    #[serde(rename = "excluded-patches")]
    pub excluded_patches: Exclusions,
    pub graceful: bool,
    #[serde(rename = "secure-http")]
    pub secure_http: bool,
    pub levels: Vec<u32>,
    pub sequence: Sequence,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl Default for EffectiveConfig {
    fn default() -> Self {
        Self::defaults()
    }
}

impl EffectiveConfig {
    /// Built-in defaults.
    pub fn defaults() -> Self {
        let mut appliers = Appliers::new();
        appliers.insert(
            APPLIER_DEFAULT.to_string(),
            operations([("resolver", json!({"default": "< which", "windows": "< where"}))]),
        );
        appliers.insert(
            "patch".to_string(),
            operations([
                ("bin", json!("[[resolver]] patch")),
                (
                    "check",
                    json!("[[bin]] -t --verbose -p{{level}} --no-backup-if-mismatch --dry-run < {{file}}"),
                ),
                (
                    "patch",
                    json!("[[bin]] -t -p{{level}} --no-backup-if-mismatch < {{file}}"),
                ),
            ]),
        );
        appliers.insert(
            "git".to_string(),
            operations([
                ("bin", json!("[[resolver]] git")),
                ("check", json!("[[bin]] apply -p{{level}} --check {{file}}")),
                ("patch", json!("[[bin]] apply -p{{level}} {{file}}")),
            ]),
        );

        Self {
            sources: PatcherSources::default(),
            appliers,
            excluded_patches: Exclusions::new(),
            graceful: false,
            secure_http: true,
            levels: vec![0, 1, 2],
            sequence: Sequence {
                appliers: vec!["patch".to_string(), "git".to_string()],
                operations: vec![
                    "resolver".to_string(),
                    "check".to_string(),
                    "patch".to_string(),
                ],
            },
            extra: BTreeMap::new(),
        }
    }

    /// Shallow overlay: every key present in `layer` replaces the current
    /// value wholesale.
    pub fn overlay(&mut self, layer: ConfigLayer) {
        if let Some(sources) = layer.sources {
            self.sources = sources;
        }
        if let Some(appliers) = layer.appliers {
            self.appliers = appliers;
        }
        self.apply_scalars(layer.excluded_patches, layer.graceful, layer.secure_http);
        self.apply_lists(layer.levels, layer.sequence, layer.extra);
    }

    /// Applier-aware merge: appliers merge per applier and per operation,
    /// everything else replaces.
    pub fn merge(&mut self, layer: ConfigLayer) {
        if let Some(sources) = layer.sources {
            self.sources = sources;
        }
        if let Some(appliers) = layer.appliers {
            for (code, ops) in appliers {
                let target = self.appliers.entry(code).or_default();
                for (op_code, value) in ops {
                    merge_operation(target, op_code, value);
                }
            }
        }
        self.apply_scalars(layer.excluded_patches, layer.graceful, layer.secure_http);
        self.apply_lists(layer.levels, layer.sequence, layer.extra);
    }

    fn apply_scalars(
        &mut self,
        excluded: Option<Exclusions>,
        graceful: Option<bool>,
        secure_http: Option<bool>,
    ) {
        if let Some(excluded) = excluded {
            self.excluded_patches = excluded;
        }
        if let Some(graceful) = graceful {
            self.graceful = graceful;
        }
        if let Some(secure_http) = secure_http {
            self.secure_http = secure_http;
        }
    }

    fn apply_lists(
        &mut self,
        levels: Option<Vec<u32>>,
        sequence: Option<Sequence>,
        extra: BTreeMap<String, Value>,
    ) {
        if let Some(levels) = levels {
            self.levels = levels;
        }
        if let Some(sequence) = sequence {
            self.sequence = sequence;
        }
        self.extra.extend(extra);
    }

    pub fn applier(&self, code: &str) -> Option<&Operations> {
        self.appliers.get(code)
    }

    pub fn operation(&self, applier: &str, op_code: &str) -> Option<&Value> {
        self.appliers.get(applier)?.get(op_code)
    }
}

fn operations<const N: usize>(entries: [(&str, Value); N]) -> Operations {
    entries
        .into_iter()
        .map(|(code, value)| (code.to_string(), value))
        .collect()
}

fn merge_operation(target: &mut Operations, op_code: String, value: Value) {
    if let (Some(Value::Object(existing)), Value::Object(update)) =
        (target.get_mut(&op_code), &value)
    {
        if is_scoped_operation(existing) && is_scoped_operation(update) {
            existing.extend(update.clone());
            return;
        }
    }
    target.insert(op_code, value);
}

/// Whether an object-valued operation is keyed by scope rather than being a
/// purely numerically indexed list.
pub fn is_scoped_operation(map: &Map<String, Value>) -> bool {
    map.keys().any(|key| key.parse::<i64>().is_err())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn layer(value: Value) -> ConfigLayer {
        match value {
            Value::Object(map) => ConfigLayer::from_map(map).unwrap(),
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_legacy_patchers_key() {
        let parsed = layer(json!({"patchers": {"patch": {"bin": "x"}}}));
        assert_eq!(parsed.appliers.unwrap()["patch"]["bin"], json!("x"));

        let parsed = layer(json!({
            "patchers": {"patch": {"bin": "legacy"}},
            "patcher-appliers": {"patch": {"bin": "new"}}
        }));
        let appliers = parsed.appliers.unwrap();
        assert_eq!(appliers["patch"]["bin"], json!("new"));
        assert!(!parsed.extra.contains_key("patchers"));
    }

    #[test]
    fn test_sources_shapes() {
        let parsed = layer(json!({"patcher-sources": false}));
        assert!(parsed.sources.unwrap().is_disabled());

        let parsed = layer(json!({"patcher-sources": {"packages": ["acme/lib"], "vendors": true}}));
        let sources = parsed.sources.unwrap();
        let root = Package::new("acme/root", "1.0.0");
        assert!(sources.allows_project(&root));
        assert!(sources.allows_package(&Package::new("acme/lib", "1.0.0")));
        assert!(!sources.allows_package(&Package::new("acme/other", "1.0.0")));
    }

    #[test]
    fn test_vendor_filter() {
        let sources = PatcherSources::Scoped(SourceScopes {
            vendors: SourceFilter::Only(vec!["trusted".to_string()]),
            ..SourceScopes::default()
        });
        assert!(sources.allows_package(&Package::new("trusted/lib", "1.0.0")));
        assert!(!sources.allows_package(&Package::new("random/lib", "1.0.0")));
        assert!(!PatcherSources::packages_disabled()
            .allows_package(&Package::new("trusted/lib", "1.0.0")));
    }

    #[test]
    fn test_merge_keeps_sibling_operations() {
        let mut config = EffectiveConfig::defaults();
        config.merge(layer(json!({"patcher-appliers": {"patch": {"check": "custom"}}})));
        assert_eq!(config.operation("patch", "check"), Some(&json!("custom")));
        assert_eq!(
            config.operation("patch", "bin"),
            Some(&json!("[[resolver]] patch"))
        );
    }

    #[test]
    fn test_merge_scoped_operation_keys() {
        let mut config = EffectiveConfig::defaults();
        config.merge(layer(json!({
            "patcher-appliers": {"default": {"resolver": {"macos": "< command -v"}}}
        })));
        let resolver = config.operation("default", "resolver").unwrap();
        assert_eq!(resolver["macos"], json!("< command -v"));
        assert_eq!(resolver["default"], json!("< which"));
    }

    #[test]
    fn test_overlay_replaces_appliers() {
        let mut config = EffectiveConfig::defaults();
        config.overlay(layer(json!({"patcher-appliers": {"default": {}}})));
        assert_eq!(config.appliers.len(), 1);
    }

    #[test]
    fn test_exclusion_shapes() {
        let parsed = layer(json!({"excluded-patches": {"acme/lib": ["patches/a.patch"]}}));
        assert_eq!(parsed.excluded_patches.unwrap()["acme/lib"], vec!["patches/a.patch"]);

        let parsed = layer(json!({"excluded-patches": ["patches/b.patch"]}));
        assert_eq!(parsed.excluded_patches.unwrap()[ANY_OWNER], vec!["patches/b.patch"]);
    }

    #[test]
    fn test_numeric_keyed_map_is_not_scoped() {
        let map = match json!({"0": "a", "1": "b"}) {
            Value::Object(map) => map,
            _ => unreachable!(),
        };
        assert!(!is_scoped_operation(&map));
    }
}
