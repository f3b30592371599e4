//! Source package management (fetch, verify, extract, cache, clean).
//!
//! Tarballs are listed in `build.packages`; downloads try the forge mirror
//! first and fall back to the upstream URL. Nothing is fetched twice: an
//! existing tarball or an extracted tree with its marker is reused as-is.

#![allow(clippy::cast_precision_loss)] // File sizes don't need u64 precision for display

use super::archive;
use super::config::{Config, ResolvedPackage};
use super::error::BuildError;
use super::target::Libc;
use anyhow::{Context, Result};
use sha2::{Digest, Sha256};
use std::fs::File;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Marker written once a source tree is completely extracted.
const EXTRACTED_MARKER: &str = ".extracted";

/// GCC prerequisites, linked into the gcc tree when configured.
pub const GCC_PREREQUISITES: &[&str] = &["gmp", "mpfr", "mpc"];

/// Packages every toolchain of the given libc needs.
pub fn required_packages(libc: Libc) -> [&'static str; 4] {
    ["binutils", "gcc", "linux", libc.package()]
}

/// Required packages plus whichever optional ones the config lists.
pub fn packages_for(config: &Config, libc: Libc) -> Vec<&'static str> {
    let mut names: Vec<&'static str> = required_packages(libc).to_vec();
    names.extend(GCC_PREREQUISITES.iter().filter(|n| config.has_package(n)));
    names
}

/// How packages are obtained.
#[derive(Debug, Clone, Copy)]
pub struct FetchOptions {
    /// Never touch the network; a missing tarball is an error.
    pub offline: bool,
    /// Check `sha256` after download when the package declares one.
    pub verify: bool,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            offline: false,
            verify: true,
        }
    }
}

/// Get the path to a downloaded tarball, failing if not cached.
pub fn require(pkg: &ResolvedPackage) -> Result<PathBuf> {
    if !pkg.tarball.exists() {
        return Err(BuildError::MissingPackage {
            name: pkg.name.clone(),
            path: pkg.tarball.clone(),
        }
        .into());
    }
    Ok(pkg.tarball.clone())
}

/// Fetch a single package tarball.
pub fn fetch(pkg: &ResolvedPackage, opts: FetchOptions) -> Result<PathBuf> {
    if pkg.tarball.exists() {
        info!("{} already cached at {}", pkg.filename, pkg.tarball.display());
        return Ok(pkg.tarball.clone());
    }

    if opts.offline {
        return require(pkg);
    }

    let dir = pkg
        .tarball
        .parent()
        .with_context(|| format!("Invalid package path: {}", pkg.tarball.display()))?;
    std::fs::create_dir_all(dir)?;

    let part = dir.join(format!("{}.part", pkg.filename));
    let candidates = pkg.mirror_url.iter().chain(std::iter::once(&pkg.url));

    let mut last_err = None;
    for url in candidates {
        info!("Fetching {} {} from {url}", pkg.name, pkg.version);
        match download(url, &part) {
            Ok(bytes) => {
                debug!(url = %url, bytes, "download complete");
                last_err = None;
                break;
            }
            Err(e) => {
                warn!(url = %url, "download failed: {e:#}");
                let _ = std::fs::remove_file(&part);
                last_err = Some(e);
            }
        }
    }
    if let Some(e) = last_err {
        return Err(e.context(format!("Failed to download {}", pkg.filename)));
    }

    if opts.verify {
        if let Some(expected) = &pkg.sha256 {
            if let Err(e) = verify_checksum(&part, expected) {
                let _ = std::fs::remove_file(&part);
                return Err(e);
            }
            info!("  Checksum verified: {}", &expected[..expected.len().min(16)]);
        }
    }

    std::fs::rename(&part, &pkg.tarball)?;

    let size = std::fs::metadata(&pkg.tarball)?.len();
    info!(
        "  Cached: {} ({:.1} MB)",
        pkg.tarball.display(),
        size as f64 / 1_000_000.0
    );

    Ok(pkg.tarball.clone())
}

/// Fetch several packages by name.
pub fn fetch_all<'a>(
    config: &Config,
    names: impl IntoIterator<Item = &'a str>,
    opts: FetchOptions,
) -> Result<()> {
    info!("=== Fetching packages ===");
    for name in names {
        fetch(&config.package(name)?, opts)?;
    }
    Ok(())
}

/// Copy `url` to `dest`, returning the number of bytes written.
fn download(url: &str, dest: &Path) -> Result<u64> {
    if let Some(path) = url.strip_prefix("file://") {
        return std::fs::copy(path, dest).with_context(|| format!("Failed to copy {path}"));
    }

    let client = reqwest::blocking::Client::builder()
        .user_agent(concat!("crossbuild/", env!("CARGO_PKG_VERSION")))
        .build()
        .context("Failed to create HTTP client")?;

    let mut response = client
        .get(url)
        .send()
        .and_then(reqwest::blocking::Response::error_for_status)
        .with_context(|| format!("GET {url}"))?;

    let mut file =
        File::create(dest).with_context(|| format!("Failed to create {}", dest.display()))?;
    let bytes = response
        .copy_to(&mut file)
        .with_context(|| format!("Failed to write {}", dest.display()))?;
    Ok(bytes)
}

/// SHA-256 of a file as lowercase hex.
pub fn sha256_file(path: &Path) -> Result<String> {
    let mut file = File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
    let mut hasher = Sha256::new();
    std::io::copy(&mut file, &mut hasher)?;
    Ok(hex::encode(hasher.finalize()))
}

/// Compare a file's SHA-256 against `expected`.
pub fn verify_checksum(path: &Path, expected: &str) -> Result<()> {
    let actual = sha256_file(path)?;
    if !actual.eq_ignore_ascii_case(expected.trim()) {
        let file = path
            .file_name()
            .map_or_else(|| path.display().to_string(), |n| n.to_string_lossy().into_owned());
        return Err(BuildError::ChecksumMismatch {
            file: file.trim_end_matches(".part").to_string(),
            expected: expected.trim().to_string(),
            actual,
        }
        .into());
    }
    Ok(())
}

/// Extract a cached package into its source directory.
pub fn extract(pkg: &ResolvedPackage) -> Result<PathBuf> {
    let marker = pkg.source_dir.join(EXTRACTED_MARKER);
    if marker.exists() {
        debug!("{} already extracted", pkg.source_dir.display());
        return Ok(pkg.source_dir.clone());
    }

    let tarball = require(pkg)?;

    // A tree without the marker is a leftover from an interrupted run.
    if pkg.source_dir.exists() {
        std::fs::remove_dir_all(&pkg.source_dir)?;
    }

    info!("Extracting {} -> {}", pkg.filename, pkg.source_dir.display());
    archive::extract(&tarball, &pkg.source_dir, 1)
        .with_context(|| format!("Failed to extract {}", pkg.filename))?;
    std::fs::write(&marker, format!("{}\n", pkg.version))?;

    Ok(pkg.source_dir.clone())
}

/// Show cache status for all configured packages.
pub fn status(config: &Config) -> Result<()> {
    println!("Package cache: {}\n", config.packages_dir().display());

    let mut total_size: u64 = 0;
    let mut cached = 0;
    let mut count = 0;

    for name in config.package_names() {
        count += 1;
        let pkg = match config.package(name) {
            Ok(pkg) => pkg,
            Err(e) => {
                println!("  {name:12} [invalid] {e}");
                continue;
            }
        };
        if pkg.tarball.exists() {
            let size = std::fs::metadata(&pkg.tarball)?.len();
            total_size += size;
            cached += 1;
            let extracted = if pkg.source_dir.join(EXTRACTED_MARKER).exists() {
                " extracted"
            } else {
                ""
            };
            println!(
                "  {:12} [cached{extracted}] {} {:.1} MB",
                name,
                pkg.version,
                size as f64 / 1_000_000.0
            );
        } else {
            println!("  {:12} [missing] {} {}", name, pkg.version, pkg.url);
        }
    }

    println!();
    println!(
        "  Total: {}/{} cached ({:.1} MB)",
        cached,
        count,
        total_size as f64 / 1_000_000.0
    );

    Ok(())
}

/// Clean cached tarballs.
pub fn clean(config: &Config, name: Option<&str>) -> Result<()> {
    if let Some(name) = name {
        let pkg = config.package(name)?;
        if pkg.tarball.exists() {
            std::fs::remove_file(&pkg.tarball)?;
            info!("Cleaned: {}", pkg.filename);
        } else {
            info!("{name} not in cache");
        }
    } else if config.packages_dir().exists() {
        std::fs::remove_dir_all(config.packages_dir())?;
        info!("Cleaned all cached packages");
    }
    Ok(())
}
