use anyhow::{Context as _, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use patch_resolver::config::{
    load_installed_from_path, load_manifest_from_path, ConfigLayer, ConfigResolver,
    ProjectManifest,
};
use patch_resolver::search::{collect_patch_paths, definition_from_contents, relative_source};
use patch_resolver::{DownloadCache, Fetcher, Package, PatchResolver, Resolution, VendorLayout};
use std::fs;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "patch-resolver")]
#[command(about = "Resolve which patches apply to which installed packages", long_about = None)]
#[command(version)]
struct Cli {
    /// Enable debug logging (overridden by RUST_LOG)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Resolve patches for a project and print them per target package
    Resolve {
        /// Project manifest (JSON or TOML)
        #[arg(short, long)]
        manifest: PathBuf,

        /// Installed packages (JSON or TOML list)
        #[arg(short, long)]
        installed: Option<PathBuf>,

        /// Target package to leave untouched (repeatable)
        #[arg(long = "skip", value_name = "PACKAGE")]
        skip: Vec<String>,

        /// Report failed patches instead of aborting
        #[arg(short, long)]
        graceful: bool,

        /// Print the resolution as JSON
        #[arg(long)]
        json: bool,

        /// Resolve OS-scoped config for this OS instead of the current one
        #[arg(long, value_name = "NAME")]
        os: Option<String>,

        /// Download cache directory
        #[arg(long)]
        cache_dir: Option<PathBuf>,
    },

    /// Print the effective configuration as JSON
    Config {
        /// Project manifest (JSON or TOML)
        #[arg(short, long)]
        manifest: PathBuf,

        /// Resolve OS-scoped config for this OS instead of the current one
        #[arg(long, value_name = "NAME")]
        os: Option<String>,
    },

    /// List patch files below a directory with their inferred targets
    Scan {
        /// Directory to search
        dir: PathBuf,

        /// Package credited as the owner of found patches
        #[arg(long, default_value = "root")]
        owner: String,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Commands::Resolve {
            manifest,
            installed,
            skip,
            graceful,
            json,
            os,
            cache_dir,
        } => cmd_resolve(&manifest, installed.as_deref(), skip, graceful, json, os, cache_dir),

        Commands::Config { manifest, os } => cmd_config(&manifest, os),

        Commands::Scan { dir, owner } => cmd_scan(&dir, &owner),
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose {
        "patch_resolver=debug"
    } else {
        "patch_resolver=warn"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact()
        .init();
}

fn config_resolver(os: Option<String>) -> ConfigResolver {
    match os {
        Some(name) => ConfigResolver::for_os(&name),
        None => ConfigResolver::default(),
    }
}

fn load_project(manifest_path: &Path) -> Result<(ProjectManifest, PathBuf)> {
    let manifest = load_manifest_from_path(manifest_path)
        .with_context(|| format!("loading manifest {}", manifest_path.display()))?;
    let project_dir = manifest_path
        .parent()
        .filter(|dir| !dir.as_os_str().is_empty())
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));
    Ok((manifest, project_dir))
}

#[cfg(feature = "http")]
fn fetcher() -> Result<Box<dyn Fetcher>> {
    Ok(Box::new(patch_resolver::HttpFetcher::new()?))
}

#[cfg(not(feature = "http"))]
fn fetcher() -> Result<Box<dyn Fetcher>> {
    Ok(Box::new(patch_resolver::LocalFetcher))
}

fn cmd_resolve(
    manifest_path: &Path,
    installed_path: Option<&Path>,
    skip: Vec<String>,
    graceful: bool,
    json: bool,
    os: Option<String>,
    cache_dir: Option<PathBuf>,
) -> Result<()> {
    let (manifest, project_dir) = load_project(manifest_path)?;
    let installed: Vec<Package> = match installed_path {
        Some(path) => load_installed_from_path(path)
            .with_context(|| format!("loading installed packages {}", path.display()))?,
        None => Vec::new(),
    };

    let root = &manifest.package;
    let layout = VendorLayout::new(&project_dir, &manifest.config.vendor_dir, &root.name);
    let cache = cache_dir
        .map(DownloadCache::new)
        .unwrap_or_else(DownloadCache::default_location);

    let mut resolver = PatchResolver::new(root, &installed, &layout)
        .with_fetcher(fetcher()?)
        .with_platform(manifest.config.platform.clone())
        .with_cache(cache)
        .with_config_resolver(config_resolver(os))
        .skip_packages(skip);
    if graceful {
        resolver = resolver.with_layer(ConfigLayer {
            graceful: Some(true),
            ..ConfigLayer::default()
        });
    }

    let resolution = resolver.resolve()?;

    if json {
        let report = serde_json::json!({
            "targets": resolution.grouped(),
            "excluded": resolution.excluded,
            "failures": resolution.failures,
        });
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_resolution(&resolution);
    }
    Ok(())
}

fn print_resolution(resolution: &Resolution) {
    let groups = resolution.grouped();
    if groups.is_empty() {
        println!("{}", "No patches apply".yellow());
    }

    for (target, patches) in &groups {
        println!("{}", target.bold());
        for patch in patches {
            if patch.label == patch.source {
                println!("  {} {}", "✓".green(), patch.source);
            } else {
                println!(
                    "  {} {} {}",
                    "✓".green(),
                    patch.label,
                    format!("({})", patch.source).dimmed()
                );
            }
        }
    }

    if !resolution.excluded.is_empty() {
        println!();
        println!("{}", format!("Excluded ({}):", resolution.excluded.len()).yellow());
        for exclusion in &resolution.excluded {
            println!(
                "  {} {} {}",
                "-".yellow(),
                exclusion.definition.source,
                format!("[{}] {}", exclusion.stage, exclusion.reason).dimmed()
            );
        }
    }

    if !resolution.failures.is_empty() {
        println!();
        println!("{}", format!("Failed ({}):", resolution.failures.len()).red());
        for failure in &resolution.failures {
            println!("  {} {}", "✗".red(), failure);
        }
    }
}

fn cmd_config(manifest_path: &Path, os: Option<String>) -> Result<()> {
    let (manifest, _) = load_project(manifest_path)?;
    let config = config_resolver(os).resolve(&manifest.package.extra, Vec::new())?;
    println!("{}", serde_json::to_string_pretty(&config)?);
    Ok(())
}

fn cmd_scan(dir: &Path, owner: &str) -> Result<()> {
    if !dir.is_dir() {
        anyhow::bail!("{} is not a directory", dir.display());
    }

    let mut paths = collect_patch_paths(dir);
    paths.sort();
    if paths.is_empty() {
        println!("{}", "No patch files found".yellow());
        return Ok(());
    }

    for path in paths {
        let source = relative_source(dir, &path);
        let contents = fs::read(&path).with_context(|| format!("reading {}", path.display()))?;
        let contents = String::from_utf8_lossy(&contents);
        match definition_from_contents(&contents, owner, source.clone(), path.clone()) {
            Some(definition) => {
                let depends = definition
                    .depends
                    .iter()
                    .map(|(name, constraint)| format!("{name} {constraint}"))
                    .collect::<Vec<_>>()
                    .join(", ");
                let marker = if definition.skip {
                    "skip".yellow()
                } else {
                    "✓".green()
                };
                println!(
                    "{} {} -> {} {}",
                    marker,
                    source,
                    definition.targets.join(", ").bold(),
                    format!("[{depends}]").dimmed()
                );
            }
            None => println!("{} {} {}", "?".red(), source, "(no target)".dimmed()),
        }
    }
    Ok(())
}
