//! musl libc, built with the stage-1 compiler.

use super::{run_make, BuildContext, Stage};
use anyhow::Result;
use std::path::PathBuf;

pub struct Musl;

impl Musl {
    fn configure_args(ctx: &BuildContext) -> Vec<String> {
        vec![
            "--prefix=/usr".into(),
            "--syslibdir=/lib".into(),
            format!("--target={}", ctx.triple()),
        ]
    }
}

impl Stage for Musl {
    fn name(&self) -> &'static str {
        "musl"
    }

    fn package(&self) -> &'static str {
        "musl"
    }

    fn output(&self, ctx: &BuildContext) -> PathBuf {
        ctx.sysroot().join("usr/lib/libc.a")
    }

    fn build(&self, ctx: &BuildContext) -> Result<()> {
        let src = ctx.source(self.package())?;
        let dir = ctx.build_dir("libc");
        std::fs::create_dir_all(&dir)?;

        let cross = ctx.target.cross_compile();
        ctx.step("musl configure", src.join("configure"))
            .args(Self::configure_args(ctx))
            .env("CROSS_COMPILE", &cross)
            .env("CC", format!("{cross}gcc"))
            .env("AR", format!("{cross}ar"))
            .env("RANLIB", format!("{cross}ranlib"))
            .current_dir(&dir)
            .run()?;

        run_make(ctx, self.name(), &dir, &[&ctx.jobs_arg()])?;
        run_make(
            ctx,
            self.name(),
            &dir,
            &[&format!("DESTDIR={}", ctx.sysroot().display()), "install"],
        )?;

        Ok(())
    }
}
