//! `build.json` loading, validation and environment overrides.
//!
//! Relative directories in the file resolve against the directory holding
//! `build.json`; directories given through the environment resolve against
//! the current working directory.

use super::error::BuildError;
use super::target::{Arch, Libc, Target};
use super::vendor;
use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

pub const DEFAULT_CONFIG: &str = "build.json";

const DEFAULT_FILENAME: &str = "{name}-{version}.tar.xz";

/// Raw on-disk shape of `build.json`.
#[derive(Debug, Clone, Deserialize)]
pub struct BuildFile {
    pub metadata: Metadata,
    pub build: BuildSection,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Metadata {
    pub version: String,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BuildSection {
    #[serde(default)]
    pub directories: Directories,
    pub architecture: ArchitectureSection,
    pub toolchain: ToolchainSection,
    pub packages: BTreeMap<String, PackageSpec>,
    #[serde(default)]
    pub repository: Repository,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Directories {
    pub build: PathBuf,
    pub output: PathBuf,
    pub packages: PathBuf,
}

impl Default for Directories {
    fn default() -> Self {
        Self {
            build: PathBuf::from("build"),
            output: PathBuf::from("artifacts"),
            packages: PathBuf::from("packages"),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ArchitectureSection {
    pub default: String,
    pub supported: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ToolchainSection {
    pub types: Vec<String>,
    pub default: String,
    /// Fallback versions for packages that omit `version`.
    #[serde(default)]
    pub versions: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PackageSpec {
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub filename: Option<String>,
    pub url: String,
    #[serde(default)]
    pub sha256: Option<String>,
}

/// Optional mirror hosting every tarball under a single release tag.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Repository {
    #[serde(default)]
    pub forge_packages_releases: Option<String>,
    #[serde(default)]
    pub forge_packages_version: Option<String>,
}

/// Values taken from the environment that win over `build.json`.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub build_dir: Option<PathBuf>,
    pub artifacts_dir: Option<PathBuf>,
    pub packages_dir: Option<PathBuf>,
    pub source_date_epoch: Option<i64>,
}

impl Overrides {
    /// Read `BUILD_DIR`, `ARTIFACTS_DIR`, `PACKAGES_DIR` and `SOURCE_DATE_EPOCH`.
    pub fn from_env() -> Result<Self, BuildError> {
        let dir = |key: &str| {
            std::env::var_os(key)
                .filter(|v| !v.is_empty())
                .map(PathBuf::from)
        };

        let source_date_epoch = match std::env::var("SOURCE_DATE_EPOCH") {
            Ok(v) if !v.trim().is_empty() => Some(parse_epoch(&v)?),
            _ => None,
        };

        Ok(Self {
            build_dir: dir("BUILD_DIR"),
            artifacts_dir: dir("ARTIFACTS_DIR"),
            packages_dir: dir("PACKAGES_DIR"),
            source_date_epoch,
        })
    }
}

fn parse_epoch(value: &str) -> Result<i64, BuildError> {
    value
        .trim()
        .parse()
        .map_err(|_| BuildError::Config(format!("SOURCE_DATE_EPOCH is not an integer: {value}")))
}

/// A package with every template expanded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedPackage {
    pub name: String,
    pub version: String,
    pub filename: String,
    pub url: String,
    pub mirror_url: Option<String>,
    pub sha256: Option<String>,
    /// Where the tarball lives once downloaded.
    pub tarball: PathBuf,
    /// Where the tarball is extracted to.
    pub source_dir: PathBuf,
}

/// Validated configuration with absolute directories.
#[derive(Debug, Clone)]
pub struct Config {
    pub version: String,
    pub description: Option<String>,
    pub default_arch: Arch,
    pub supported_arches: Vec<Arch>,
    pub default_libc: Libc,
    pub toolchain_types: Vec<Libc>,
    pub source_date_epoch: Option<i64>,
    build_dir: PathBuf,
    output_dir: PathBuf,
    packages_dir: PathBuf,
    versions: BTreeMap<String, String>,
    packages: BTreeMap<String, PackageSpec>,
    repository: Repository,
}

impl Config {
    /// Load and validate `path`, then apply `overrides`.
    pub fn load(path: &Path, overrides: &Overrides) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;

        let root = match path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };

        Self::from_json(&text, &root, overrides)
            .with_context(|| format!("Failed to load config {}", path.display()))
    }

    /// Parse a config document whose relative paths are anchored at `root`.
    pub fn from_json(text: &str, root: &Path, overrides: &Overrides) -> Result<Self> {
        let file: BuildFile = serde_json::from_str(text).context("Malformed build.json")?;
        Ok(Self::from_file(file, root, overrides)?)
    }

    fn from_file(file: BuildFile, root: &Path, overrides: &Overrides) -> Result<Self, BuildError> {
        let BuildSection {
            directories,
            architecture,
            toolchain,
            packages,
            repository,
        } = file.build;

        let supported_arches = architecture
            .supported
            .iter()
            .map(|a| a.parse::<Arch>())
            .collect::<Result<Vec<_>, _>>()?;
        let default_arch: Arch = architecture.default.parse()?;
        if !supported_arches.contains(&default_arch) {
            return Err(BuildError::Config(format!(
                "default architecture {default_arch} is not in architecture.supported"
            )));
        }

        let toolchain_types = toolchain
            .types
            .iter()
            .map(|t| t.parse::<Libc>())
            .collect::<Result<Vec<_>, _>>()?;
        let default_libc: Libc = toolchain.default.parse()?;
        if !toolchain_types.contains(&default_libc) {
            return Err(BuildError::Config(format!(
                "default toolchain {default_libc} is not in toolchain.types"
            )));
        }

        let resolve = |configured: &Path, over: &Option<PathBuf>| -> Result<PathBuf, BuildError> {
            let path = match over {
                Some(p) => p.clone(),
                None => root.join(configured),
            };
            std::path::absolute(&path).map_err(|e| {
                BuildError::Config(format!("cannot resolve {}: {e}", path.display()))
            })
        };

        let config = Self {
            version: file.metadata.version,
            description: file.metadata.description,
            default_arch,
            supported_arches,
            default_libc,
            toolchain_types,
            source_date_epoch: overrides.source_date_epoch,
            build_dir: resolve(&directories.build, &overrides.build_dir)?,
            output_dir: resolve(&directories.output, &overrides.artifacts_dir)?,
            packages_dir: resolve(&directories.packages, &overrides.packages_dir)?,
            versions: toolchain.versions,
            packages,
            repository,
        };

        // Every configured toolchain type must be buildable from the package list.
        for libc in &config.toolchain_types {
            for name in vendor::required_packages(*libc) {
                config.package(name).map_err(|e| {
                    BuildError::Config(format!("{libc} toolchain needs package {name}: {e}"))
                })?;
            }
        }

        Ok(config)
    }

    /// Pick a target, falling back to the configured defaults.
    pub fn select_target(
        &self,
        arch: Option<&str>,
        toolchain: Option<&str>,
    ) -> Result<Target, BuildError> {
        let arch = match arch {
            Some(a) => a.parse()?,
            None => self.default_arch,
        };
        if !self.supported_arches.contains(&arch) {
            return Err(BuildError::UnsupportedArch(format!(
                "{arch} (supported: {})",
                join(&self.supported_arches)
            )));
        }

        let libc = match toolchain {
            Some(t) => t.parse()?,
            None => self.default_libc,
        };
        if !self.toolchain_types.contains(&libc) {
            return Err(BuildError::UnsupportedToolchain(format!(
                "{libc} (supported: {})",
                join(&self.toolchain_types)
            )));
        }

        Ok(Target::new(arch, libc))
    }

    /// Every supported arch crossed with every toolchain type.
    pub fn all_targets(&self) -> Vec<Target> {
        self.supported_arches
            .iter()
            .flat_map(|arch| {
                self.toolchain_types
                    .iter()
                    .map(move |libc| Target::new(*arch, *libc))
            })
            .collect()
    }

    /// Resolve a package entry, expanding `{name}`, `{version}` and `{filename}`.
    pub fn package(&self, name: &str) -> Result<ResolvedPackage, BuildError> {
        let spec = self
            .packages
            .get(name)
            .ok_or_else(|| BuildError::UnknownPackage(name.to_string()))?;

        let version = spec
            .version
            .clone()
            .or_else(|| self.versions.get(name).cloned())
            .ok_or_else(|| BuildError::Config(format!("package {name} has no version")))?;

        let filename = expand(
            spec.filename.as_deref().unwrap_or(DEFAULT_FILENAME),
            name,
            &version,
            "",
        );
        let url = expand(&spec.url, name, &version, &filename);

        let mirror_url = match (
            &self.repository.forge_packages_releases,
            &self.repository.forge_packages_version,
        ) {
            (Some(base), Some(tag)) if !base.is_empty() && !tag.is_empty() => Some(format!(
                "{}/download/{tag}/{filename}",
                base.trim_end_matches('/')
            )),
            _ => None,
        };

        Ok(ResolvedPackage {
            name: name.to_string(),
            tarball: self.packages_dir.join(&filename),
            source_dir: self.sources_dir().join(format!("{name}-{version}")),
            version,
            filename,
            url,
            mirror_url,
            sha256: spec.sha256.as_ref().map(|s| s.trim().to_ascii_lowercase()),
        })
    }

    pub fn has_package(&self, name: &str) -> bool {
        self.packages.contains_key(name)
    }

    pub fn package_names(&self) -> impl Iterator<Item = &str> {
        self.packages.keys().map(String::as_str)
    }

    pub fn build_dir(&self) -> &Path {
        &self.build_dir
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    pub fn packages_dir(&self) -> &Path {
        &self.packages_dir
    }

    /// Extracted sources, shared by every target.
    pub fn sources_dir(&self) -> PathBuf {
        self.build_dir.join("sources")
    }

    pub fn releases_dir(&self) -> PathBuf {
        self.output_dir.join("releases")
    }

    /// Installation prefix of a toolchain: `<output>/<arch>-<libc>`.
    pub fn prefix(&self, target: Target) -> PathBuf {
        self.output_dir.join(target.name())
    }

    /// Scratch directory for a toolchain's out-of-tree builds.
    pub fn target_build_dir(&self, target: Target) -> PathBuf {
        self.build_dir.join(target.name())
    }
}

fn expand(template: &str, name: &str, version: &str, filename: &str) -> String {
    template
        .replace("{name}", name)
        .replace("{version}", version)
        .replace("{filename}", filename)
}

fn join<T: std::fmt::Display>(items: &[T]) -> String {
    items
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}
