//! Release archives of built toolchains.
//!
//! Archives are reproducible: sorted entries, owner 0:0 and every mtime set
//! to `SOURCE_DATE_EPOCH` (0 when unset), so the same tree packed twice
//! gives the same bytes.

use super::archive;
use super::config::Config;
use super::envfile;
use super::error::BuildError;
use super::target::Target;
use super::vendor;
use super::verify;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::info;

pub const MANIFEST_FILE: &str = "release.json";

#[derive(Debug, Clone, Copy, Default)]
pub struct ReleaseOptions {
    pub skip_verify: bool,
}

/// `release.json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleaseManifest {
    pub version: String,
    pub created: String,
    pub source_date_epoch: Option<i64>,
    pub archives: Vec<ReleaseArchive>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleaseArchive {
    pub target: String,
    pub triple: String,
    pub file: String,
    pub sha256: String,
    pub size: u64,
}

pub fn archive_name(config: &Config, target: Target) -> String {
    format!("crossbuild-{}-{}.tar.xz", config.version, target.name())
}

/// Pack every target into `<output>/releases` and write the manifest.
pub fn release(
    config: &Config,
    targets: &[Target],
    opts: ReleaseOptions,
) -> Result<ReleaseManifest> {
    for &target in targets {
        if !super::toolchain_complete(config, target) {
            return Err(BuildError::VerificationFailed {
                target: target.name(),
                reason: format!("toolchain not built in {}", config.prefix(target).display()),
            }
            .into());
        }
    }

    if opts.skip_verify {
        info!("Skipping verification");
    } else {
        verify::verify(config, targets)?;
    }

    let out_dir = config.releases_dir();
    std::fs::create_dir_all(&out_dir)
        .with_context(|| format!("Failed to create {}", out_dir.display()))?;

    let mtime = config
        .source_date_epoch
        .and_then(|e| u64::try_from(e).ok())
        .unwrap_or(0);

    info!("=== Packing release {} ===", config.version);
    let mut archives = Vec::with_capacity(targets.len());
    for &target in targets {
        archives.push(pack_target(config, target, &out_dir, mtime)?);
    }

    let manifest = ReleaseManifest {
        version: config.version.clone(),
        created: envfile::timestamp(config.source_date_epoch),
        source_date_epoch: config.source_date_epoch,
        archives,
    };
    let path = out_dir.join(MANIFEST_FILE);
    std::fs::write(&path, serde_json::to_string_pretty(&manifest)? + "\n")
        .with_context(|| format!("Failed to write {}", path.display()))?;
    info!("Wrote {}", path.display());

    Ok(manifest)
}

fn pack_target(
    config: &Config,
    target: Target,
    out_dir: &Path,
    mtime: u64,
) -> Result<ReleaseArchive> {
    let file = archive_name(config, target);
    let path = out_dir.join(&file);

    info!("Packing {target} -> {}", path.display());
    archive::pack_dir(&config.prefix(target), &target.name(), &path, mtime)
        .with_context(|| format!("Failed to pack {target}"))?;

    let sha256 = vendor::sha256_file(&path)?;
    write_sidecar(&path, &file, &sha256)?;
    let size = std::fs::metadata(&path)?.len();
    info!("  {sha256}  {file}");

    Ok(ReleaseArchive {
        target: target.name(),
        triple: target.triple(),
        file,
        sha256,
        size,
    })
}

/// `<archive>.sha256` in `sha256sum` format.
fn write_sidecar(archive: &Path, file: &str, sha256: &str) -> Result<PathBuf> {
    let mut name = archive.as_os_str().to_owned();
    name.push(".sha256");
    let sidecar = PathBuf::from(name);
    std::fs::write(&sidecar, format!("{sha256}  {file}\n"))
        .with_context(|| format!("Failed to write {}", sidecar.display()))?;
    Ok(sidecar)
}
