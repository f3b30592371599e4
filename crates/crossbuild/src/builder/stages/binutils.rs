//! GNU binutils (assembler, linker, object tools) for the target.

use super::{run_configure, run_make, BuildContext, Stage};
use anyhow::Result;
use std::path::PathBuf;

pub struct Binutils;

impl Binutils {
    fn configure_args(ctx: &BuildContext) -> Vec<String> {
        vec![
            format!("--target={}", ctx.triple()),
            format!("--prefix={}", ctx.prefix.display()),
            format!("--with-sysroot={}", ctx.sysroot().display()),
            "--disable-nls".into(),
            "--disable-werror".into(),
            "--disable-multilib".into(),
            "--disable-gprofng".into(),
        ]
    }
}

impl Stage for Binutils {
    fn name(&self) -> &'static str {
        "binutils"
    }

    fn package(&self) -> &'static str {
        "binutils"
    }

    fn output(&self, ctx: &BuildContext) -> PathBuf {
        ctx.tool("ld")
    }

    fn build(&self, ctx: &BuildContext) -> Result<()> {
        let src = ctx.source(self.package())?;
        let dir = ctx.build_dir(self.name());

        run_configure(ctx, self.name(), src, &dir, &Self::configure_args(ctx))?;
        run_make(ctx, self.name(), &dir, &[&ctx.jobs_arg()])?;
        run_make(ctx, self.name(), &dir, &["install"])?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::stages::tests::context;
    use crate::builder::target::{Arch, Libc};
    use std::path::Path;

    #[test]
    fn test_configure_args() {
        let ctx = context(Path::new("/w"), Arch::Aarch64, Libc::Musl);
        let args = Binutils::configure_args(&ctx);
        assert_eq!(args[0], "--target=aarch64-linux-musl");
        assert!(args.contains(&"--prefix=/w/artifacts/aarch64-musl".to_string()));
        assert!(args.contains(
            &"--with-sysroot=/w/artifacts/aarch64-musl/aarch64-linux-musl".to_string()
        ));
        assert!(args.contains(&"--disable-werror".to_string()));
    }

    #[test]
    fn test_output_is_linker() {
        let ctx = context(Path::new("/w"), Arch::X86_64, Libc::Gnu);
        assert_eq!(
            Binutils.output(&ctx),
            Path::new("/w/artifacts/x86_64-gnu/bin/x86_64-linux-gnu-ld")
        );
    }
}
