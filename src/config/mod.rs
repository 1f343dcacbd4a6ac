pub mod loader;
pub mod resolver;
pub mod schema;
pub mod scope;
pub mod version;

pub use loader::{
    load_installed_from_path, load_installed_from_str, load_manifest_from_path,
    load_manifest_from_str, ConfigError, Format, HostConfig, ProjectManifest,
};
pub use resolver::{resolve_sub_operations, ConfigResolver, Environment, GRACEFUL_ENV};
pub use schema::{
    Appliers, ConfigLayer, EffectiveConfig, Exclusions, Operations, PatcherSources, Sequence,
    SourceFilter, SourceScopes, APPLIER_DEFAULT,
};
pub use scope::{OsContext, OsScope};
pub use version::{canonicalize_constraint, matches_requirement, VersionError};
