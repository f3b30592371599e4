//! Cross toolchain build system.
//!
//! Structure:
//! - `config` - `build.json` and environment overrides
//! - `target` - arch/libc pairs and derived names
//! - `vendor` - source tarballs (fetch, verify, extract, cache)
//! - `host` - host tool preflight
//! - `stages/` - binutils, gcc, linux headers, musl, glibc
//! - `envfile` - `env.sh` and `toolchain.json`
//! - `verify` - smoke tests of a built toolchain
//! - `release` - reproducible release archives
//! - `clean` - removal of build state

pub mod archive;
pub mod clean;
pub mod command;
pub mod config;
pub mod envfile;
pub mod error;
pub mod host;
pub mod logging;
pub mod release;
pub mod stages;
pub mod target;
pub mod vendor;
pub mod verify;

use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use config::Config;
use error::BuildError;
use stages::BuildContext;
use std::collections::BTreeMap;
use target::{Libc, Target};
use tracing::info;
use vendor::FetchOptions;

/// Target selection shared by several commands.
#[derive(Args, Debug, Clone, Default)]
pub struct TargetArgs {
    /// Target architecture (x86_64, aarch64)
    #[arg(long, env = "ARCH")]
    pub arch: Option<String>,
    /// C library (musl, gnu)
    #[arg(long, env = "TOOLCHAIN")]
    pub toolchain: Option<String>,
}

/// Build commands for the CLI.
#[derive(Subcommand, Debug)]
pub enum BuildCommands {
    /// Build one cross toolchain
    Toolchain {
        #[command(flatten)]
        target: TargetArgs,
        /// Rebuild every stage even if it looks done
        #[arg(long)]
        force: bool,
        /// Use only tarballs already in the package cache
        #[arg(long)]
        offline: bool,
    },
    /// Build every supported arch x toolchain combination
    AllToolchains {
        #[arg(long)]
        force: bool,
        #[arg(long)]
        offline: bool,
    },
    /// Smoke-test built toolchains
    Verify {
        #[command(flatten)]
        target: TargetArgs,
        /// Verify every supported target
        #[arg(long)]
        all: bool,
    },
    /// Remove the build directory
    Clean {
        /// Also remove artifacts and the package cache
        #[arg(long, conflicts_with = "package")]
        all: bool,
        /// Remove only this package's cached tarball
        #[arg(long)]
        package: Option<String>,
    },
    /// Remove build, artifacts and package cache
    CleanAll,
    /// Fetch source tarballs into the package cache
    DownloadPackages {
        /// Only the packages this toolchain type needs (omit for all)
        #[arg(long, env = "TOOLCHAIN")]
        toolchain: Option<String>,
        /// Do not check sha256 of downloads
        #[arg(long)]
        skip_verify: bool,
        #[arg(long)]
        offline: bool,
    },
    /// Pack built toolchains into release archives
    Release {
        #[command(flatten)]
        target: TargetArgs,
        /// Release every built target
        #[arg(long)]
        all: bool,
        /// Pack without running verify first
        #[arg(long)]
        skip_verify: bool,
    },
    /// Show package cache and toolchain status
    Status,
}

/// Knobs for a toolchain build.
#[derive(Debug, Clone, Copy)]
pub struct BuildOptions {
    pub force: bool,
    pub offline: bool,
    pub jobs: usize,
}

/// Run a parsed command.
pub fn dispatch(config: &Config, command: BuildCommands, jobs: usize) -> Result<()> {
    match command {
        BuildCommands::Toolchain {
            target,
            force,
            offline,
        } => {
            let target =
                config.select_target(target.arch.as_deref(), target.toolchain.as_deref())?;
            build_toolchain(config, target, BuildOptions { force, offline, jobs })
        }
        BuildCommands::AllToolchains { force, offline } => {
            build_all_toolchains(config, BuildOptions { force, offline, jobs })
        }
        BuildCommands::Verify { target, all } => {
            let targets = resolve_targets(config, &target, all)?;
            verify::verify(config, &targets)
        }
        BuildCommands::Clean { all, package } => match package {
            Some(name) => vendor::clean(config, Some(&name)),
            None => clean::clean(config, all),
        },
        BuildCommands::CleanAll => clean::clean(config, true),
        BuildCommands::DownloadPackages {
            toolchain,
            skip_verify,
            offline,
        } => {
            let libc = match toolchain.as_deref() {
                Some(t) => Some(config.select_target(None, Some(t))?.libc),
                None => None,
            };
            download_packages(
                config,
                libc,
                FetchOptions {
                    offline,
                    verify: !skip_verify,
                },
            )
        }
        BuildCommands::Release {
            target,
            all,
            skip_verify,
        } => {
            let targets = if all {
                built_targets(config)?
            } else {
                resolve_targets(config, &target, false)?
            };
            release::release(config, &targets, release::ReleaseOptions { skip_verify })?;
            Ok(())
        }
        BuildCommands::Status => status(config),
    }
}

fn resolve_targets(config: &Config, args: &TargetArgs, all: bool) -> Result<Vec<Target>> {
    if all {
        return Ok(config.all_targets());
    }
    Ok(vec![config.select_target(args.arch.as_deref(), args.toolchain.as_deref())?])
}

/// Every configured target that has a complete toolchain.
fn built_targets(config: &Config) -> Result<Vec<Target>> {
    let built: Vec<_> = config
        .all_targets()
        .into_iter()
        .filter(|t| toolchain_complete(config, *t))
        .collect();
    if built.is_empty() {
        anyhow::bail!(
            "No built toolchains in {}; run `crossbuild toolchain` first",
            config.output_dir().display()
        );
    }
    Ok(built)
}

/// Final compilers and `env.sh` are all present.
pub fn toolchain_complete(config: &Config, target: Target) -> bool {
    let prefix = config.prefix(target);
    let bin = prefix.join("bin");
    let cross = target.cross_compile();
    bin.join(format!("{cross}gcc")).exists()
        && bin.join(format!("{cross}g++")).exists()
        && prefix.join(envfile::ENV_FILE).exists()
}

/// Build one toolchain into `<output>/<arch>-<libc>`.
pub fn build_toolchain(config: &Config, target: Target, opts: BuildOptions) -> Result<()> {
    let prefix = config.prefix(target);
    if !opts.force && toolchain_complete(config, target) {
        info!("{target} toolchain already built at {}", prefix.display());
        info!("Use --force to rebuild");
        return Ok(());
    }

    info!("=== Building {} toolchain ===", target.triple());
    host::preflight(target.libc)?;

    let fetch = FetchOptions {
        offline: opts.offline,
        ..FetchOptions::default()
    };
    let mut ctx = BuildContext::new(config, target, opts.jobs);
    let mut versions = BTreeMap::new();
    for name in vendor::packages_for(config, target.libc) {
        let pkg = config.package(name)?;
        vendor::fetch(&pkg, fetch)?;
        let dir = vendor::extract(&pkg)?;
        ctx.sources.insert(name.to_string(), dir);
        versions.insert(name.to_string(), pkg.version);
    }

    std::fs::create_dir_all(&ctx.prefix)
        .with_context(|| format!("Failed to create {}", ctx.prefix.display()))?;

    for stage in stages::stages_for(target.libc) {
        if !opts.force && stage.is_done(&ctx) {
            info!("[{}] already done, skipping", stage.name());
            continue;
        }

        info!("=== Stage {} ===", stage.name());
        stage
            .build(&ctx)
            .with_context(|| format!("Stage {} failed for {target}", stage.name()))?;

        if !stage.is_done(&ctx) {
            return Err(BuildError::StepFailed {
                step: stage.name().to_string(),
                status: format!("{} was not produced", stage.output(&ctx).display()),
            }
            .into());
        }
    }

    envfile::write(&prefix, target)?;
    envfile::ToolchainInfo::new(target, versions, config.source_date_epoch).write(&prefix)?;

    info!("=== {} toolchain complete ===", target.triple());
    info!("Use it with: source {}", prefix.join(envfile::ENV_FILE).display());
    Ok(())
}

/// Build every target in order, stopping at the first failure.
pub fn build_all_toolchains(config: &Config, opts: BuildOptions) -> Result<()> {
    let targets = config.all_targets();
    info!("Building {} toolchains", targets.len());
    for target in targets {
        build_toolchain(config, target, opts)?;
    }
    Ok(())
}

/// Fetch what one libc needs, or every configured package.
pub fn download_packages(config: &Config, libc: Option<Libc>, opts: FetchOptions) -> Result<()> {
    let names: Vec<&str> = match libc {
        Some(libc) => vendor::packages_for(config, libc),
        None => config.package_names().collect(),
    };
    vendor::fetch_all(config, names, opts)?;
    info!("All packages present in {}", config.packages_dir().display());
    Ok(())
}

/// Print package cache and per-target build state.
pub fn status(config: &Config) -> Result<()> {
    vendor::status(config)?;

    println!("\nToolchains: {}\n", config.output_dir().display());
    for target in config.all_targets() {
        let state = if toolchain_complete(config, target) {
            "built"
        } else if config.prefix(target).exists() {
            "partial"
        } else {
            "missing"
        };
        println!("  {:14} [{state}] {}", target.name(), target.triple());
    }
    Ok(())
}
