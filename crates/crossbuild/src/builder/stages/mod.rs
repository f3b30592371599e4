//! Native build stages of a cross toolchain.
//!
//! Each stage wraps one upstream build system. A stage is done when its
//! output file exists; nothing else is tracked.

mod binutils;
mod gcc;
mod glibc;
mod linux_headers;
mod musl;

pub use binutils::Binutils;
pub use gcc::{Gcc, GccStage1};
pub use glibc::Glibc;
pub use linux_headers::LinuxHeaders;
pub use musl::Musl;

use super::command::Step;
use super::config::Config;
use super::error::BuildError;
use super::target::{Libc, Target};
use anyhow::Result;
use std::collections::BTreeMap;
use std::ffi::OsString;
use std::path::{Path, PathBuf};

/// Everything a stage needs to know about the toolchain being built.
#[derive(Debug, Clone)]
pub struct BuildContext {
    pub target: Target,
    /// Installation prefix, `<output>/<arch>-<libc>`.
    pub prefix: PathBuf,
    /// Out-of-tree build directories live under here.
    pub build_root: PathBuf,
    /// Extracted source trees keyed by package name.
    pub sources: BTreeMap<String, PathBuf>,
    pub jobs: usize,
    pub source_date_epoch: Option<i64>,
}

impl BuildContext {
    pub fn new(config: &Config, target: Target, jobs: usize) -> Self {
        Self {
            target,
            prefix: config.prefix(target),
            build_root: config.target_build_dir(target),
            sources: BTreeMap::new(),
            jobs: jobs.max(1),
            source_date_epoch: config.source_date_epoch,
        }
    }

    pub fn triple(&self) -> String {
        self.target.triple()
    }

    /// `<prefix>/<triple>`: target headers and libraries.
    pub fn sysroot(&self) -> PathBuf {
        self.prefix.join(self.triple())
    }

    /// Path of an installed cross tool, e.g. `bin/aarch64-linux-musl-gcc`.
    pub fn tool(&self, name: &str) -> PathBuf {
        self.prefix
            .join("bin")
            .join(format!("{}{name}", self.target.cross_compile()))
    }

    pub fn build_dir(&self, stage: &str) -> PathBuf {
        self.build_root.join(stage)
    }

    pub fn source(&self, package: &str) -> Result<&Path, BuildError> {
        self.sources
            .get(package)
            .map(PathBuf::as_path)
            .ok_or_else(|| BuildError::MissingPackage {
                name: package.to_string(),
                path: self.build_root.join("sources").join(package),
            })
    }

    pub fn jobs_arg(&self) -> String {
        format!("-j{}", self.jobs)
    }

    /// A step with the toolchain environment: `<prefix>/bin` first on `PATH`,
    /// no texinfo, and `SOURCE_DATE_EPOCH` when set.
    pub fn step(&self, label: impl Into<String>, program: impl Into<OsString>) -> Step {
        let existing = std::env::var_os("PATH").unwrap_or_default();
        let mut paths = vec![self.prefix.join("bin")];
        paths.extend(std::env::split_paths(&existing));
        let path = std::env::join_paths(paths).unwrap_or(existing);

        let mut step = Step::new(label, program)
            .env("PATH", path)
            .env("MAKEINFO", "true")
            .env("LC_ALL", "C");
        if let Some(epoch) = self.source_date_epoch {
            step = step.env("SOURCE_DATE_EPOCH", epoch.to_string());
        }
        step
    }
}

/// A native build stage.
pub trait Stage: Sync {
    fn name(&self) -> &'static str;

    /// Source package the stage builds from.
    fn package(&self) -> &'static str;

    /// File whose existence marks the stage as done.
    fn output(&self, ctx: &BuildContext) -> PathBuf;

    fn build(&self, ctx: &BuildContext) -> Result<()>;

    fn is_done(&self, ctx: &BuildContext) -> bool {
        self.output(ctx).exists()
    }
}

/// Pipeline order; each stage depends on the ones before it.
static MUSL_STAGES: &[&dyn Stage] = &[&Binutils, &GccStage1, &LinuxHeaders, &Musl, &Gcc];
static GNU_STAGES: &[&dyn Stage] = &[&Binutils, &GccStage1, &LinuxHeaders, &Glibc, &Gcc];

pub fn stages_for(libc: Libc) -> &'static [&'static dyn Stage] {
    match libc {
        Libc::Musl => MUSL_STAGES,
        Libc::Gnu => GNU_STAGES,
    }
}

/// Run `<src>/configure` from `dir`.
fn run_configure(
    ctx: &BuildContext,
    label: &str,
    src: &Path,
    dir: &Path,
    args: &[String],
) -> Result<()> {
    std::fs::create_dir_all(dir)?;
    ctx.step(format!("{label} configure"), src.join("configure"))
        .args(args)
        .current_dir(dir)
        .run()
}

fn run_make(ctx: &BuildContext, label: &str, dir: &Path, args: &[&str]) -> Result<()> {
    let what = args
        .iter()
        .find(|a| !a.starts_with('-') && !a.contains('='))
        .unwrap_or(&"all");
    ctx.step(format!("{label} make {what}"), "make")
        .args(args)
        .current_dir(dir)
        .run()
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::builder::target::Arch;

    pub(crate) fn context(root: &Path, arch: Arch, libc: Libc) -> BuildContext {
        let target = Target::new(arch, libc);
        BuildContext {
            target,
            prefix: root.join("artifacts").join(target.name()),
            build_root: root.join("build").join(target.name()),
            sources: ["binutils", "gcc", "linux", "musl", "glibc"]
                .into_iter()
                .map(|p| (p.to_string(), root.join("build/sources").join(p)))
                .collect(),
            jobs: 8,
            source_date_epoch: Some(1_700_000_000),
        }
    }

    #[test]
    fn test_stage_order() {
        let names: Vec<_> = stages_for(Libc::Musl).iter().map(|s| s.name()).collect();
        assert_eq!(names, ["binutils", "gcc-stage1", "linux-headers", "musl", "gcc"]);
        let names: Vec<_> = stages_for(Libc::Gnu).iter().map(|s| s.name()).collect();
        assert_eq!(names, ["binutils", "gcc-stage1", "linux-headers", "glibc", "gcc"]);
    }

    #[test]
    fn test_stage_packages() {
        let packages: Vec<_> = stages_for(Libc::Gnu).iter().map(|s| s.package()).collect();
        assert_eq!(packages, ["binutils", "gcc", "linux", "glibc", "gcc"]);
        assert_eq!(stages_for(Libc::Musl)[3].package(), "musl");
    }

    #[test]
    fn test_context_paths() {
        let ctx = context(Path::new("/w"), Arch::Aarch64, Libc::Musl);
        assert_eq!(ctx.sysroot(), Path::new("/w/artifacts/aarch64-musl/aarch64-linux-musl"));
        assert_eq!(
            ctx.tool("gcc"),
            Path::new("/w/artifacts/aarch64-musl/bin/aarch64-linux-musl-gcc")
        );
        assert_eq!(ctx.jobs_arg(), "-j8");
    }

    #[test]
    fn test_step_environment() {
        let ctx = context(Path::new("/w"), Arch::X86_64, Libc::Gnu);
        let step = ctx.step("env check", "true");
        let path = step.get_env("PATH").unwrap().to_string_lossy().into_owned();
        assert!(path.starts_with("/w/artifacts/x86_64-gnu/bin"));
        assert_eq!(step.get_env("MAKEINFO").unwrap(), "true");
        assert_eq!(step.get_env("SOURCE_DATE_EPOCH").unwrap(), "1700000000");
    }

    #[test]
    fn test_done_when_output_exists() {
        let tmp = tempfile::tempdir().unwrap();
        let ctx = context(tmp.path(), Arch::X86_64, Libc::Musl);
        let stage = stages_for(Libc::Musl)[0];
        assert!(!stage.is_done(&ctx));

        let out = stage.output(&ctx);
        std::fs::create_dir_all(out.parent().unwrap()).unwrap();
        std::fs::write(&out, "").unwrap();
        assert!(stage.is_done(&ctx));
    }

    #[test]
    fn test_missing_source() {
        let mut ctx = context(Path::new("/w"), Arch::X86_64, Libc::Musl);
        ctx.sources.clear();
        assert!(matches!(ctx.source("gcc"), Err(BuildError::MissingPackage { .. })));
    }
}
