//! Patch Resolver: dependency patch collection and resolution
//!
//! Given a root project and its installed packages, works out which patch
//! files apply to which packages, in what order, under which effective
//! configuration. Applying the patches is left to the caller.
//!
//! # Architecture
//!
//! Raw declarations come from package metadata (`patches`, `patches-file`)
//! and from header-annotated `*.patch` files found by [`search`]. The
//! [`collector`] normalizes them into [`PatchDefinition`]s, and a fixed
//! sequence of [`stages`] (assembled by the [`pool`]) filters, resolves,
//! downloads, validates, merges and orders them.
//!
//! Configuration is layered: built-in defaults, OS-scoped
//! `patcher-config-root*` blocks from the root package, then caller layers.
//! See [`config::resolver`].
//!
//! # Example
//!
//! ```no_run
//! use patch_resolver::{Package, PatchResolver, VendorLayout};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let root = Package::new("acme/app", "1.0.0");
//! let installed = vec![Package::new("acme/lib", "1.4.0")];
//! let layout = VendorLayout::new("/srv/app", "vendor", "acme/app");
//!
//! let resolution = PatchResolver::new(&root, &installed, &layout).resolve()?;
//! for (target, patches) in resolution.grouped() {
//!     println!("{target}: {} patch(es)", patches.len());
//! }
//! # Ok(())
//! # }
//! ```

pub mod cache;
pub mod collector;
pub mod config;
pub mod definition;
pub mod fetch;
pub mod header;
pub mod package;
pub mod pipeline;
pub mod pool;
pub mod search;
pub mod stages;

// Re-exports
pub use cache::DownloadCache;
pub use config::{
    load_installed_from_path, load_manifest_from_path, matches_requirement, ConfigError,
    ConfigLayer, ConfigResolver, EffectiveConfig, OsContext, VersionError,
};
pub use definition::{normalize, Normalized, PatchDefinition, RawDeclaration};
pub use fetch::{FetchError, Fetcher, LocalFetcher};
#[cfg(feature = "http")]
pub use fetch::HttpFetcher;
pub use package::{InstallPathResolver, Package, Platform, VendorLayout};
pub use pipeline::{Exclusion, Failure, PatchResolver, Pipeline, PipelineError, Resolution};
pub use pool::{ComponentPool, StageName};
pub use stages::{Context, Stage, StageOutput};
