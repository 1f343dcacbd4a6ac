//! Resolution pipeline.
//!
//! [`PatchResolver`] ties the pieces together: it resolves the effective
//! config, collects raw definitions from the root and installed packages,
//! builds the stage list from the [`ComponentPool`] and runs every stage in
//! order over the whole collection.

use crate::cache::DownloadCache;
use crate::collector::Collector;
use crate::config::{ConfigError, ConfigLayer, ConfigResolver, EffectiveConfig};
use crate::definition::PatchDefinition;
use crate::fetch::{Fetcher, LocalFetcher};
use crate::package::{InstallPathResolver, Package, Platform};
use crate::pool::{ComponentPool, PoolEntry, StageName};
use crate::stages::{Context, Stage};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;
use tracing::{debug, info, info_span, warn};

/// A definition some stage dropped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Exclusion {
    pub stage: String,
    pub reason: String,
    pub definition: PatchDefinition,
}

/// A definition that hit a runtime error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Failure {
    pub stage: String,
    pub reason: String,
    pub definition: PatchDefinition,
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({}): {}",
            self.definition.source, self.stage, self.reason
        )
    }
}

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("{} patch definition(s) failed to resolve: {}", .0.len(), summarize(.0))]
    PatchFailures(Vec<Failure>),
}

fn summarize(failures: &[Failure]) -> String {
    failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Outcome of a run: the ordered patch list plus everything dropped.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Resolution {
    pub patches: Vec<PatchDefinition>,
    pub excluded: Vec<Exclusion>,
    pub failures: Vec<Failure>,
}

impl Resolution {
    /// Final patches grouped per target package, each list in apply order.
    pub fn grouped(&self) -> BTreeMap<&str, Vec<&PatchDefinition>> {
        let mut groups: BTreeMap<&str, Vec<&PatchDefinition>> = BTreeMap::new();
        for definition in &self.patches {
            for target in &definition.targets {
                groups.entry(target.as_str()).or_default().push(definition);
            }
        }
        groups
    }

    /// Fail the run when it recorded failures and is not graceful.
    pub fn into_result(self, graceful: bool) -> Result<Self, PipelineError> {
        if !graceful && !self.failures.is_empty() {
            return Err(PipelineError::PatchFailures(self.failures));
        }
        Ok(self)
    }
}

/// Runs a fixed list of stages.
#[derive(Debug)]
pub struct Pipeline {
    stages: Vec<PoolEntry>,
}

impl Pipeline {
    pub fn new(stages: Vec<PoolEntry>) -> Self {
        Self { stages }
    }

    pub fn stage_names(&self) -> Vec<&StageName> {
        self.stages.iter().map(|entry| &entry.name).collect()
    }

    pub fn run(&self, patches: Vec<PatchDefinition>, ctx: &Context<'_>) -> Resolution {
        let mut resolution = Resolution {
            patches,
            ..Resolution::default()
        };

        for entry in &self.stages {
            let stage = entry.name.to_string();
            let _span = info_span!("stage", name = %stage).entered();
            let before = resolution.patches.len();

            let output = entry.stage.process(std::mem::take(&mut resolution.patches), ctx);
            resolution.patches = output.patches;

            for (definition, reason) in output.excluded {
                debug!(source = %definition.source, %reason, "excluded");
                resolution.excluded.push(Exclusion {
                    stage: stage.clone(),
                    reason,
                    definition,
                });
            }
            for (definition, reason) in output.failures {
                warn!(source = %definition.source, %reason, "patch failed");
                resolution.failures.push(Failure {
                    stage: stage.clone(),
                    reason,
                    definition,
                });
            }
            debug!(before, after = resolution.patches.len(), "stage complete");
        }
        resolution
    }
}

/// Top-level entry point for one resolution run.
pub struct PatchResolver<'a> {
    root: &'a Package,
    packages: &'a [Package],
    installs: &'a dyn InstallPathResolver,
    fetcher: Box<dyn Fetcher>,
    platform: Platform,
    cache: DownloadCache,
    skipped: Vec<String>,
    layers: Vec<ConfigLayer>,
    config_resolver: ConfigResolver,
    pool: ComponentPool,
}

impl<'a> PatchResolver<'a> {
    pub fn new(
        root: &'a Package,
        packages: &'a [Package],
        installs: &'a dyn InstallPathResolver,
    ) -> Self {
        Self {
            root,
            packages,
            installs,
            fetcher: Box::new(LocalFetcher),
            platform: Platform::default(),
            cache: DownloadCache::default_location(),
            skipped: Vec::new(),
            layers: Vec::new(),
            config_resolver: ConfigResolver::default(),
            pool: ComponentPool::new(),
        }
    }

    pub fn with_fetcher(mut self, fetcher: Box<dyn Fetcher>) -> Self {
        self.fetcher = fetcher;
        self
    }

    pub fn with_platform(mut self, platform: Platform) -> Self {
        self.platform = platform;
        self
    }

    pub fn with_cache(mut self, cache: DownloadCache) -> Self {
        self.cache = cache;
        self
    }

    pub fn with_config_resolver(mut self, resolver: ConfigResolver) -> Self {
        self.config_resolver = resolver;
        self
    }

    /// Caller config layer; later layers win over earlier ones and over
    /// every scoped layer from the root package.
    pub fn with_layer(mut self, layer: ConfigLayer) -> Self {
        self.layers.push(layer);
        self
    }

    /// Target packages to leave untouched in this run.
    pub fn skip_packages<I, S>(mut self, packages: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.skipped.extend(packages.into_iter().map(Into::into));
        self
    }

    /// Replace or disable a stage by name, or add a custom one.
    pub fn register_stage(
        mut self,
        name: impl Into<StageName>,
        stage: Option<Box<dyn Stage>>,
    ) -> Self {
        self.pool.register(name, stage);
        self
    }

    pub fn effective_config(&self) -> Result<EffectiveConfig, ConfigError> {
        self.config_resolver
            .resolve(&self.root.extra, self.layers.clone())
    }

    /// Run the full resolution.
    ///
    /// Config errors are returned before any package is touched. Per-patch
    /// failures fail the run unless the effective config is graceful, in
    /// which case they are reported in [`Resolution::failures`].
    pub fn resolve(self) -> Result<Resolution, PipelineError> {
        let config = self.effective_config()?;
        let _span = info_span!("resolve", root = %self.root.name).entered();

        let collected = Collector::new(&config, self.installs).collect(self.root, self.packages);
        info!(count = collected.len(), "collected patch definitions");

        let pipeline = Pipeline::new(self.pool.build(&self.skipped, &config));
        let ctx = Context::new(
            self.root,
            self.packages,
            self.installs,
            self.fetcher.as_ref(),
            &self.platform,
            &config,
            &self.cache,
        );
        let resolution = pipeline.run(collected, &ctx);
        info!(
            patches = resolution.patches.len(),
            excluded = resolution.excluded.len(),
            failures = resolution.failures.len(),
            "resolution complete"
        );
        resolution.into_result(config.graceful)
    }
}
