//! Files written into a finished toolchain prefix: `env.sh` and
//! `toolchain.json`.

use super::target::{Arch, Libc, Target};
use anyhow::{Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

pub const ENV_FILE: &str = "env.sh";
pub const INFO_FILE: &str = "toolchain.json";

/// Variables exported as `<VAR>="${CROSS_COMPILE}<tool>"`.
const TOOLS: &[(&str, &str)] = &[
    ("CC", "gcc"),
    ("CXX", "g++"),
    ("AR", "ar"),
    ("AS", "as"),
    ("LD", "ld"),
    ("NM", "nm"),
    ("OBJCOPY", "objcopy"),
    ("OBJDUMP", "objdump"),
    ("RANLIB", "ranlib"),
    ("READELF", "readelf"),
    ("STRIP", "strip"),
];

/// Render a relocatable `env.sh`; it finds its own directory when sourced.
pub fn render(target: Target) -> String {
    let triple = target.triple();
    let cross_compile = target.cross_compile();
    let tools: String = TOOLS
        .iter()
        .map(|(var, tool)| format!("export {var}=\"${{CROSS_COMPILE}}{tool}\"\n"))
        .collect();

    format!(
        r#"# shellcheck shell=bash
# Cross toolchain environment for {triple}.
# Usage: source {ENV_FILE}

CROSSBUILD_ROOT="$(cd "$(dirname "${{BASH_SOURCE[0]:-$0}}")" && pwd)"
export CROSSBUILD_ROOT
export TARGET="{triple}"
export SYSROOT="$CROSSBUILD_ROOT/{triple}"
export CROSS_COMPILE="{cross_compile}"
export PATH="$CROSSBUILD_ROOT/bin:$PATH"

{tools}"#
    )
}

/// Write `env.sh` into `prefix`.
pub fn write(prefix: &Path, target: Target) -> Result<PathBuf> {
    let path = prefix.join(ENV_FILE);
    std::fs::write(&path, render(target))
        .with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(path)
}

/// Build record stored next to the toolchain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolchainInfo {
    pub target: String,
    pub triple: String,
    pub arch: Arch,
    pub libc: Libc,
    /// Package name to version.
    pub packages: BTreeMap<String, String>,
    pub crossbuild_version: String,
    pub built_at: String,
}

impl ToolchainInfo {
    pub fn new(target: Target, packages: BTreeMap<String, String>, epoch: Option<i64>) -> Self {
        Self {
            target: target.name(),
            triple: target.triple(),
            arch: target.arch,
            libc: target.libc,
            packages,
            crossbuild_version: env!("CARGO_PKG_VERSION").to_string(),
            built_at: timestamp(epoch),
        }
    }

    pub fn write(&self, prefix: &Path) -> Result<PathBuf> {
        let path = prefix.join(INFO_FILE);
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(&path, json + "\n")
            .with_context(|| format!("Failed to write {}", path.display()))?;
        Ok(path)
    }

    pub fn read(prefix: &Path) -> Result<Self> {
        let path = prefix.join(INFO_FILE);
        let text = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        serde_json::from_str(&text).with_context(|| format!("Malformed {}", path.display()))
    }
}

/// RFC 3339 time of `SOURCE_DATE_EPOCH`, or now when unset.
pub fn timestamp(epoch: Option<i64>) -> String {
    epoch
        .and_then(|secs| DateTime::<Utc>::from_timestamp(secs, 0))
        .unwrap_or_else(Utc::now)
        .to_rfc3339_opts(SecondsFormat::Secs, true)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_env_exports() {
        let env = render(Target::new(Arch::Aarch64, Libc::Musl));
        assert!(env.contains("export TARGET=\"aarch64-linux-musl\"\n"));
        assert!(env.contains("export CROSS_COMPILE=\"aarch64-linux-musl-\"\n"));
        assert!(env.contains("export CC=\"${CROSS_COMPILE}gcc\"\n"));
        assert!(env.contains("export CXX=\"${CROSS_COMPILE}g++\"\n"));
        assert!(env.contains("export SYSROOT=\"$CROSSBUILD_ROOT/aarch64-linux-musl\"\n"));
        assert!(env.contains("${BASH_SOURCE[0]:-$0}"));
    }

    #[test]
    fn test_env_exports_every_tool_once() {
        let env = render(Target::new(Arch::X86_64, Libc::Gnu));
        let exports: Vec<_> = env
            .lines()
            .filter(|l| l.contains("${CROSS_COMPILE}"))
            .collect();
        assert_eq!(exports.len(), TOOLS.len());
        assert_eq!(exports.last(), Some(&"export STRIP=\"${CROSS_COMPILE}strip\""));
        assert!(env.starts_with("# shellcheck shell=bash\n"));
        assert!(env.ends_with("strip\"\n"));
    }

    #[test]
    fn test_env_sh_is_valid_shell() {
        let tmp = tempfile::tempdir().unwrap();
        write(tmp.path(), Target::new(Arch::X86_64, Libc::Gnu)).unwrap();

        let out = std::process::Command::new("bash")
            .arg("-c")
            .arg(format!(
                "source {}/env.sh && echo \"$CC|$SYSROOT\"",
                tmp.path().display()
            ))
            .output()
            .unwrap();
        assert!(out.status.success());
        let line = String::from_utf8_lossy(&out.stdout).trim().to_string();
        assert_eq!(
            line,
            format!("x86_64-linux-gnu-gcc|{}/x86_64-linux-gnu", tmp.path().display())
        );
    }

    #[test]
    fn test_info_round_trip_with_epoch() {
        let tmp = tempfile::tempdir().unwrap();
        let packages = BTreeMap::from([("gcc".to_string(), "14.2.0".to_string())]);
        let info = ToolchainInfo::new(Target::new(Arch::X86_64, Libc::Musl), packages, Some(0));
        assert_eq!(info.built_at, "1970-01-01T00:00:00Z");

        info.write(tmp.path()).unwrap();
        assert_eq!(ToolchainInfo::read(tmp.path()).unwrap(), info);
    }
}
