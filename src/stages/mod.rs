//! Pipeline stages.
//!
//! Every stage consumes the complete collection produced by the previous
//! one and returns the transformed collection together with the definitions
//! it dropped. Stages hold only their construction parameters; everything
//! shared lives in the read-only [`Context`].

mod constraints;
mod downloader;
mod exclude;
mod intake;
mod merger;
mod paths;
mod platform;
mod sorter;
mod targets;
mod validator;

pub use constraints::ConstraintsStage;
pub use downloader::{DownloaderStage, MAX_ATTEMPTS};
pub use exclude::{CustomExcludeStage, GlobalExcludeStage, LocalExcludeStage};
pub use intake::{BundleStage, RootPatchStage};
pub use merger::MergerStage;
pub use paths::PathNormalizerStage;
pub use platform::PlatformStage;
pub use sorter::SorterStage;
pub use targets::TargetsResolverStage;
pub use validator::ValidatorStage;

use crate::cache::DownloadCache;
use crate::config::EffectiveConfig;
use crate::definition::PatchDefinition;
use crate::fetch::Fetcher;
use crate::package::{InstallPathResolver, Package, Platform};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Shared, read-only state for one resolution run.
pub struct Context<'a> {
    pub root: &'a Package,
    packages: BTreeMap<&'a str, &'a Package>,
    pub installs: &'a dyn InstallPathResolver,
    pub fetcher: &'a dyn Fetcher,
    pub platform: &'a Platform,
    pub config: &'a EffectiveConfig,
    pub cache: &'a DownloadCache,
}

impl<'a> Context<'a> {
    pub fn new(
        root: &'a Package,
        packages: &'a [Package],
        installs: &'a dyn InstallPathResolver,
        fetcher: &'a dyn Fetcher,
        platform: &'a Platform,
        config: &'a EffectiveConfig,
        cache: &'a DownloadCache,
    ) -> Self {
        let packages = packages
            .iter()
            .filter(|package| package.name != root.name)
            .map(|package| (package.name.as_str(), package))
            .collect();
        Self {
            root,
            packages,
            installs,
            fetcher,
            platform,
            config,
            cache,
        }
    }

    /// Root or installed package by name.
    pub fn package(&self, name: &str) -> Option<&'a Package> {
        if name == self.root.name {
            return Some(self.root);
        }
        self.packages.get(name).copied()
    }

    /// Installed packages, root excluded, by name.
    pub fn installed(&self) -> impl Iterator<Item = &'a Package> + '_ {
        self.packages.values().copied()
    }

    pub fn is_known(&self, name: &str) -> bool {
        self.package(name).is_some()
    }

    /// Directory a package's relative patch sources resolve against.
    pub fn base_dir(&self, name: &str) -> Option<PathBuf> {
        self.installs.install_path(self.package(name)?)
    }

    pub fn project_root(&self) -> Option<PathBuf> {
        self.installs.install_path(self.root)
    }

    /// Local file for a definition: its resolved path, or the source
    /// resolved against the owner's base directory.
    pub fn local_path(&self, definition: &PatchDefinition) -> Option<PathBuf> {
        if let Some(path) = &definition.path {
            return Some(path.clone());
        }
        if definition.is_remote() {
            return None;
        }
        let source = Path::new(&definition.source);
        if source.is_absolute() {
            return Some(source.to_path_buf());
        }
        Some(self.base_dir(&definition.owner)?.join(source))
    }
}

/// Result of one stage.
#[derive(Debug, Default)]
#[must_use = "stage output carries the surviving definitions"]
pub struct StageOutput {
    pub patches: Vec<PatchDefinition>,
    /// Definitions filtered out, with the reason
    pub excluded: Vec<(PatchDefinition, String)>,
    /// Definitions that hit a runtime error
    pub failures: Vec<(PatchDefinition, String)>,
}

impl StageOutput {
    pub fn new(patches: Vec<PatchDefinition>) -> Self {
        Self {
            patches,
            ..Self::default()
        }
    }

    pub fn keep(&mut self, definition: PatchDefinition) {
        self.patches.push(definition);
    }

    pub fn exclude(&mut self, definition: PatchDefinition, reason: impl Into<String>) {
        self.excluded.push((definition, reason.into()));
    }

    pub fn fail(&mut self, definition: PatchDefinition, reason: impl Into<String>) {
        self.failures.push((definition, reason.into()));
    }
}

/// One pipeline stage.
pub trait Stage: Send + Sync {
    fn process(&self, patches: Vec<PatchDefinition>, ctx: &Context<'_>) -> StageOutput;
}

impl<F> Stage for F
where
    F: Fn(Vec<PatchDefinition>, &Context<'_>) -> StageOutput + Send + Sync,
{
    fn process(&self, patches: Vec<PatchDefinition>, ctx: &Context<'_>) -> StageOutput {
        self(patches, ctx)
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use crate::fetch::LocalFetcher;
    use crate::package::VendorLayout;

    /// Owned pieces a [`Context`] borrows from.
    pub struct Fixture {
        pub dir: tempfile::TempDir,
        pub root: Package,
        pub packages: Vec<Package>,
        pub layout: VendorLayout,
        pub platform: Platform,
        pub config: EffectiveConfig,
        pub cache: DownloadCache,
        pub fetcher: LocalFetcher,
    }

    impl Fixture {
        pub fn new(packages: Vec<Package>) -> Self {
            let dir = tempfile::tempdir().unwrap();
            let layout = VendorLayout::new(dir.path(), "vendor", "acme/app");
            let cache = DownloadCache::new(dir.path().join("cache"));
            Self {
                root: Package::new("acme/app", "1.0.0"),
                packages,
                layout,
                platform: Platform::default(),
                config: EffectiveConfig::defaults(),
                cache,
                fetcher: LocalFetcher,
                dir,
            }
        }

        pub fn context(&self) -> Context<'_> {
            Context::new(
                &self.root,
                &self.packages,
                &self.layout,
                &self.fetcher,
                &self.platform,
                &self.config,
                &self.cache,
            )
        }

        pub fn write(&self, relative: &str, contents: &str) -> PathBuf {
            let path = self.dir.path().join(relative);
            std::fs::create_dir_all(path.parent().unwrap()).unwrap();
            std::fs::write(&path, contents).unwrap();
            path
        }
    }

    pub fn def(source: &str, targets: &[&str], owner: &str) -> PatchDefinition {
        PatchDefinition {
            source: source.to_string(),
            targets: targets.iter().map(|t| t.to_string()).collect(),
            owner: owner.to_string(),
            label: source.to_string(),
            skip: false,
            depends: BTreeMap::new(),
            issue: None,
            link: None,
            after: Vec::new(),
            path: None,
        }
    }
}
