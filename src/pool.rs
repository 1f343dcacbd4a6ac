//! Loader component pool.
//!
//! Holds the ordered set of pipeline stages. The thirteen built-in stages
//! always run in a fixed order; callers may replace or disable any of them
//! by name, and register extra stages that run after the built-ins in
//! registration order.
//!
//! # Example
//!
//! ```
//! use patch_resolver::config::EffectiveConfig;
//! use patch_resolver::pool::{ComponentPool, StageName};
//!
//! let mut pool = ComponentPool::new();
//! pool.register(StageName::Sorter, None);
//!
//! let stages = pool.build(&[], &EffectiveConfig::defaults());
//! assert!(stages.iter().all(|entry| entry.name != StageName::Sorter));
//! ```

use crate::config::EffectiveConfig;
use crate::stages::{
    BundleStage, ConstraintsStage, CustomExcludeStage, DownloaderStage, GlobalExcludeStage,
    LocalExcludeStage, MergerStage, PathNormalizerStage, PlatformStage, RootPatchStage, Stage,
    SorterStage, TargetsResolverStage, ValidatorStage,
};
use std::fmt;

/// Name of a pipeline stage.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum StageName {
    Bundle,
    GlobalExclude,
    LocalExclude,
    RootPatch,
    CustomExclude,
    PathNormalizer,
    Platform,
    Constraints,
    Downloader,
    Validator,
    TargetsResolver,
    Merger,
    Sorter,
    /// Caller-supplied stage
    Custom(String),
}

impl StageName {
    /// Built-in stages in execution order.
    pub const BUILTIN: [StageName; 13] = [
        StageName::Bundle,
        StageName::GlobalExclude,
        StageName::LocalExclude,
        StageName::RootPatch,
        StageName::CustomExclude,
        StageName::PathNormalizer,
        StageName::Platform,
        StageName::Constraints,
        StageName::Downloader,
        StageName::Validator,
        StageName::TargetsResolver,
        StageName::Merger,
        StageName::Sorter,
    ];

    pub fn as_str(&self) -> &str {
        match self {
            StageName::Bundle => "bundle",
            StageName::GlobalExclude => "global-exclude",
            StageName::LocalExclude => "local-exclude",
            StageName::RootPatch => "root-patch",
            StageName::CustomExclude => "custom-exclude",
            StageName::PathNormalizer => "path-normalizer",
            StageName::Platform => "platform",
            StageName::Constraints => "constraints",
            StageName::Downloader => "downloader",
            StageName::Validator => "validator",
            StageName::TargetsResolver => "targets-resolver",
            StageName::Merger => "merger",
            StageName::Sorter => "sorter",
            StageName::Custom(name) => name,
        }
    }

    pub fn is_builtin(&self) -> bool {
        !matches!(self, StageName::Custom(_))
    }
}

impl From<&str> for StageName {
    fn from(name: &str) -> Self {
        StageName::BUILTIN
            .into_iter()
            .find(|builtin| builtin.as_str() == name)
            .unwrap_or_else(|| StageName::Custom(name.to_string()))
    }
}

impl fmt::Display for StageName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A named stage ready to run.
pub struct PoolEntry {
    pub name: StageName,
    pub stage: Box<dyn Stage>,
}

impl fmt::Debug for PoolEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PoolEntry").field("name", &self.name).finish()
    }
}

/// Registry of caller overrides on top of the built-in stages.
#[derive(Default)]
pub struct ComponentPool {
    registered: Vec<(StageName, Option<Box<dyn Stage>>)>,
}

impl ComponentPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a stage under `name`, or disable it with `None`.
    ///
    /// A built-in name replaces (or disables) that built-in in place. Any
    /// other name adds a stage after the built-ins. Registering the same
    /// name again overrides the earlier registration.
    pub fn register(
        &mut self,
        name: impl Into<StageName>,
        stage: Option<Box<dyn Stage>>,
    ) -> &mut Self {
        let name = name.into();
        match self.registered.iter_mut().find(|(existing, _)| *existing == name) {
            Some(slot) => slot.1 = stage,
            None => self.registered.push((name, stage)),
        }
        self
    }

    fn take_override(&mut self, name: &StageName) -> Option<Option<Box<dyn Stage>>> {
        let at = self.registered.iter().position(|(n, _)| n == name)?;
        Some(self.registered.remove(at).1)
    }

    /// Produce the ordered stage list for one run.
    ///
    /// `global-exclude` is only built when the config lists exclusions.
    pub fn build(mut self, skipped_packages: &[String], config: &EffectiveConfig) -> Vec<PoolEntry> {
        let mut entries = Vec::new();
        for name in StageName::BUILTIN {
            let stage = match self.take_override(&name) {
                Some(replacement) => replacement,
                None => default_stage(&name, skipped_packages, config),
            };
            if let Some(stage) = stage {
                entries.push(PoolEntry { name, stage });
            }
        }
        for (name, stage) in self.registered {
            if let Some(stage) = stage {
                entries.push(PoolEntry { name, stage });
            }
        }
        entries
    }
}

fn default_stage(
    name: &StageName,
    skipped_packages: &[String],
    config: &EffectiveConfig,
) -> Option<Box<dyn Stage>> {
    let stage: Box<dyn Stage> = match name {
        StageName::Bundle => Box::new(BundleStage),
        StageName::GlobalExclude => {
            if config.excluded_patches.values().all(Vec::is_empty) {
                return None;
            }
            Box::new(GlobalExcludeStage::new(config.excluded_patches.clone()))
        }
        StageName::LocalExclude => Box::new(LocalExcludeStage),
        StageName::RootPatch => Box::new(RootPatchStage),
        StageName::CustomExclude => Box::new(CustomExcludeStage::new(skipped_packages.to_vec())),
        StageName::PathNormalizer => Box::new(PathNormalizerStage),
        StageName::Platform => Box::new(PlatformStage),
        StageName::Constraints => Box::new(ConstraintsStage),
        StageName::Downloader => Box::new(DownloaderStage),
        StageName::Validator => Box::new(ValidatorStage),
        StageName::TargetsResolver => Box::new(TargetsResolverStage),
        StageName::Merger => Box::new(MergerStage),
        StageName::Sorter => Box::new(SorterStage),
        StageName::Custom(_) => return None,
    };
    Some(stage)
}
