//! GCC, built twice: a C-only bootstrap compiler before the libc exists,
//! then the full C/C++ compiler against the installed sysroot.

use super::{run_configure, run_make, BuildContext, Stage};
use crate::builder::target::Libc;
use crate::builder::vendor::GCC_PREREQUISITES;
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Stage-1 compiler: no headers, no shared libgcc, no target runtimes.
pub struct GccStage1;

/// Final compiler with C++ and the target's libc.
pub struct Gcc;

/// Options both GCC builds share.
fn common_args(ctx: &BuildContext) -> Vec<String> {
    vec![
        format!("--target={}", ctx.triple()),
        format!("--prefix={}", ctx.prefix.display()),
        format!("--with-sysroot={}", ctx.sysroot().display()),
        "--disable-multilib".into(),
        "--disable-nls".into(),
        "--disable-bootstrap".into(),
    ]
}

/// Symlink configured gmp/mpfr/mpc trees into the gcc source so they are
/// built in-tree instead of being required on the host.
fn link_prerequisites(ctx: &BuildContext, gcc_src: &Path) -> Result<()> {
    for name in GCC_PREREQUISITES {
        let Some(src) = ctx.sources.get(*name) else {
            continue;
        };
        let link = gcc_src.join(name);
        if link.symlink_metadata().is_ok() {
            continue;
        }
        debug!("linking {} -> {}", link.display(), src.display());
        std::os::unix::fs::symlink(src, &link)
            .with_context(|| format!("Failed to link {name} into gcc source"))?;
    }
    Ok(())
}

impl GccStage1 {
    fn configure_args(ctx: &BuildContext) -> Vec<String> {
        let mut args = common_args(ctx);
        args.extend(
            [
                "--enable-languages=c",
                "--with-newlib",
                "--without-headers",
                "--disable-shared",
                "--disable-threads",
                "--disable-decimal-float",
                "--disable-libatomic",
                "--disable-libgomp",
                "--disable-libquadmath",
                "--disable-libssp",
                "--disable-libsanitizer",
                "--disable-libvtv",
                "--disable-libstdcxx",
            ]
            .map(String::from),
        );
        args
    }
}

impl Stage for GccStage1 {
    fn name(&self) -> &'static str {
        "gcc-stage1"
    }

    fn package(&self) -> &'static str {
        "gcc"
    }

    fn output(&self, ctx: &BuildContext) -> PathBuf {
        ctx.tool("gcc")
    }

    fn build(&self, ctx: &BuildContext) -> Result<()> {
        let src = ctx.source(self.package())?;
        let dir = ctx.build_dir(self.name());

        link_prerequisites(ctx, src)?;
        run_configure(ctx, self.name(), src, &dir, &Self::configure_args(ctx))?;
        run_make(
            ctx,
            self.name(),
            &dir,
            &[&ctx.jobs_arg(), "all-gcc", "all-target-libgcc"],
        )?;
        run_make(
            ctx,
            self.name(),
            &dir,
            &["install-gcc", "install-target-libgcc"],
        )?;

        Ok(())
    }
}

impl Gcc {
    fn configure_args(ctx: &BuildContext) -> Vec<String> {
        let mut args = common_args(ctx);
        args.push("--enable-languages=c,c++".into());
        args.push("--enable-threads=posix".into());
        match ctx.target.libc {
            Libc::Musl => {
                // libsanitizer assumes glibc internals.
                args.push("--disable-libsanitizer".into());
                args.push("--enable-tls".into());
            }
            Libc::Gnu => {
                args.push("--enable-shared".into());
                args.push("--enable-__cxa_atexit".into());
            }
        }
        args
    }
}

impl Stage for Gcc {
    fn name(&self) -> &'static str {
        "gcc"
    }

    fn package(&self) -> &'static str {
        "gcc"
    }

    fn output(&self, ctx: &BuildContext) -> PathBuf {
        ctx.tool("g++")
    }

    fn build(&self, ctx: &BuildContext) -> Result<()> {
        let src = ctx.source(self.package())?;
        let dir = ctx.build_dir(self.name());

        link_prerequisites(ctx, src)?;
        run_configure(ctx, self.name(), src, &dir, &Self::configure_args(ctx))?;
        run_make(ctx, self.name(), &dir, &[&ctx.jobs_arg()])?;
        run_make(ctx, self.name(), &dir, &["install"])?;

        Ok(())
    }
}
