//! # crossbuild
//!
//! Build cross-compilation toolchains (binutils + gcc + musl/glibc) from
//! upstream release tarballs.
//!
//! ## Usage
//!
//! ```bash
//! crossbuild toolchain --arch aarch64 --toolchain musl   # Build one toolchain
//! crossbuild all-toolchains                              # Every supported arch x libc
//! crossbuild download-packages                           # Fetch all source tarballs
//! crossbuild verify --all                                # Smoke-test built toolchains
//! crossbuild release --all                               # Pack artifacts into tar.xz
//! crossbuild status                                      # Show cache + build status
//! crossbuild clean [--all]                               # Remove build (and outputs)
//! crossbuild clean --package gcc                         # Drop one cached tarball
//! ```
//!
//! Configuration comes from `build.json`; `ARCH`, `TOOLCHAIN`, `BUILD_DIR`,
//! `ARTIFACTS_DIR`, `PACKAGES_DIR`, `SOURCE_DATE_EPOCH`, `DEBUG` and
//! `LOG_TO_FILE` override it.

use anyhow::Result;
use clap::Parser;
use crossbuild::builder::{self, config, logging, BuildCommands};
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser)]
#[command(name = "crossbuild", version, about = "Cross-compilation toolchain builder")]
struct Cli {
    /// Path to the build configuration
    #[arg(long, env = "CROSSBUILD_CONFIG", default_value = config::DEFAULT_CONFIG)]
    config: PathBuf,

    /// Parallel jobs passed to make (defaults to available CPUs)
    #[arg(long, short, env = "JOBS")]
    jobs: Option<usize>,

    /// Debug logging (same as DEBUG=1)
    #[arg(long)]
    debug: bool,

    #[command(subcommand)]
    command: BuildCommands,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let settings = logging::LogSettings::from_env(cli.debug);
    if let Err(e) = logging::init(&settings) {
        eprintln!("crossbuild: {e:#}");
        return ExitCode::FAILURE;
    }

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{e:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<()> {
    let overrides = config::Overrides::from_env()?;
    let config = config::Config::load(&cli.config, &overrides)?;
    let jobs = cli.jobs.unwrap_or_else(builder::command::make_jobs);

    builder::dispatch(&config, cli.command, jobs)
}
