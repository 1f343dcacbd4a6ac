//! Builds the [`EffectiveConfig`] for a run.
//!
//! Layers are merged in this order, later layers winning:
//!
//! 1. built-in defaults, shallow-overlaid with the caller's override layer
//! 2. `patcher-config-root` (unscoped)
//! 3. `patcher-config-root-<family>`
//! 4. `patcher-config-root-<name>`
//! 5. `patcher-config-root-<code>`
//! 6. caller-supplied layers, in the order given
//!
//! Afterwards every non-default applier is overlaid onto the `default`
//! applier and OS-keyed operations collapse to the value for this platform.

use super::loader::ConfigError;
use super::schema::{
    parse_exclusions, ConfigLayer, EffectiveConfig, PatcherSources, APPLIER_DEFAULT,
    ENABLE_PATCHING, ENABLE_PATCHING_FROM_PACKAGES, EXCLUDED_PATCHES, LEGACY_PATCHER_CONFIG,
    PATCHER_CONFIG_ROOT,
};
use super::scope::OsContext;
use serde_json::{Map, Value};
use tracing::debug;

/// Environment variable enabling graceful mode.
pub const GRACEFUL_ENV: &str = "PATCH_RESOLVER_GRACEFUL";

/// Environment toggles read once per config build.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Environment {
    pub graceful: bool,
}

impl Environment {
    pub fn from_env() -> Self {
        let graceful = std::env::var(GRACEFUL_ENV)
            .map(|value| is_truthy(&value))
            .unwrap_or(false);
        Self { graceful }
    }
}

fn is_truthy(value: &str) -> bool {
    !matches!(value.trim(), "" | "0" | "false" | "no" | "off")
}

#[derive(Debug, Clone)]
pub struct ConfigResolver {
    os: OsContext,
    env: Environment,
    overrides: ConfigLayer,
}

impl Default for ConfigResolver {
    /// Current platform and process environment.
    fn default() -> Self {
        Self::new(OsContext::detect(), Environment::from_env())
    }
}

impl ConfigResolver {
    pub fn new(os: OsContext, env: Environment) -> Self {
        Self {
            os,
            env,
            overrides: ConfigLayer::default(),
        }
    }

    /// Resolver for a named OS, ignoring the process environment.
    pub fn for_os(name: &str) -> Self {
        Self::new(OsContext::for_name(name), Environment::default())
    }

    /// Caller override layer, shallow-overlaid onto the built-in defaults.
    pub fn with_overrides(mut self, overrides: ConfigLayer) -> Self {
        self.overrides = overrides;
        self
    }

    pub fn os(&self) -> &OsContext {
        &self.os
    }

    /// Resolve the effective config from the root package's `extra` block
    /// and any caller-supplied layers.
    pub fn resolve(
        &self,
        extra: &Map<String, Value>,
        sources: Vec<ConfigLayer>,
    ) -> Result<EffectiveConfig, ConfigError> {
        let mut config = EffectiveConfig::defaults();
        config.overlay(self.overrides.clone());

        let mut layers = sources;
        for key in self.os.scope_keys() {
            let root_key = match key {
                Some(key) => format!("{PATCHER_CONFIG_ROOT}-{key}"),
                None => PATCHER_CONFIG_ROOT.to_string(),
            };
            let layer = scoped_layer(extra, &root_key)?;
            if !layer.is_empty() {
                debug!(key = %root_key, "using scoped patcher config");
                layers.insert(0, layer);
            }
        }

        let mut excluded_set = false;
        for layer in layers {
            excluded_set |= layer.excluded_patches.is_some();
            config.merge(layer);
        }

        if !excluded_set {
            if let Some(excluded) = extra.get(EXCLUDED_PATCHES).and_then(parse_exclusions) {
                config.excluded_patches = excluded;
            }
        }

        config.graceful |= self.env.graceful;

        resolve_sub_operations(&mut config, &self.os)?;
        Ok(config)
    }
}

fn scoped_layer(extra: &Map<String, Value>, root_key: &str) -> Result<ConfigLayer, ConfigError> {
    let raw = match extra.get(root_key) {
        Some(value) => Some(value),
        None if root_key == PATCHER_CONFIG_ROOT => extra.get(LEGACY_PATCHER_CONFIG),
        None => None,
    };

    let mut layer = match raw {
        Some(Value::Bool(false)) => ConfigLayer {
            sources: Some(PatcherSources::Toggle(false)),
            ..ConfigLayer::default()
        },
        Some(Value::Object(map)) => {
            ConfigLayer::from_map(map.clone()).map_err(|source| ConfigError::InvalidLayer {
                key: root_key.to_string(),
                source,
            })?
        }
        _ => ConfigLayer::default(),
    };

    if layer.sources.is_none() {
        if extra.get(ENABLE_PATCHING).is_some_and(is_falsy) {
            layer.sources = Some(PatcherSources::Toggle(false));
        } else if extra.get(ENABLE_PATCHING_FROM_PACKAGES).is_some_and(is_falsy) {
            layer.sources = Some(PatcherSources::packages_disabled());
        }
    }

    Ok(layer)
}

fn is_falsy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => !b,
        Value::Number(n) => n.as_f64() == Some(0.0),
        Value::String(s) => s.is_empty() || s == "0",
        Value::Array(items) => items.is_empty(),
        Value::Object(map) => map.is_empty(),
    }
}

/// Overlay every non-default applier onto the `default` applier, then
/// collapse OS-keyed operations to the value for `os`.
///
/// Operations that are not scope-keyed objects, or that have no key matching
/// this platform, are left as they are.
pub fn resolve_sub_operations(
    config: &mut EffectiveConfig,
    os: &OsContext,
) -> Result<(), ConfigError> {
    let base = config
        .appliers
        .get(APPLIER_DEFAULT)
        .cloned()
        .ok_or(ConfigError::MissingDefaultApplier)?;

    for (code, operations) in config.appliers.iter_mut() {
        if code == APPLIER_DEFAULT {
            continue;
        }

        let mut merged = base.clone();
        merged.extend(std::mem::take(operations));

        for value in merged.values_mut() {
            let selected = match value {
                Value::Object(map) if super::schema::is_scoped_operation(map) => {
                    os.resolve(map).cloned()
                }
                _ => None,
            };
            if let Some(selected) = selected {
                *value = selected;
            }
        }

        *operations = merged;
    }

    Ok(())
}
