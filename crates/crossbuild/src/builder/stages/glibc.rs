//! GNU C library, built out-of-tree with the stage-1 compiler.

use super::{run_configure, run_make, BuildContext, Stage};
use crate::builder::error::BuildError;
use anyhow::Result;
use std::path::{Path, PathBuf};

/// Oldest kernel the installed glibc supports.
const MIN_KERNEL: &str = "4.19";

pub struct Glibc;

impl Glibc {
    fn configure_args(ctx: &BuildContext, build_triple: &str) -> Vec<String> {
        vec![
            "--prefix=/usr".into(),
            format!("--host={}", ctx.triple()),
            format!("--build={build_triple}"),
            format!(
                "--with-headers={}",
                ctx.sysroot().join("usr/include").display()
            ),
            format!("--enable-kernel={MIN_KERNEL}"),
            "--disable-werror".into(),
            "--disable-nscd".into(),
            "libc_cv_slibdir=/usr/lib".into(),
        ]
    }

    /// Host triple as glibc's own `config.guess` reports it.
    fn build_triple(ctx: &BuildContext, src: &Path) -> Result<String> {
        let output = ctx
            .step("glibc config.guess", src.join("scripts/config.guess"))
            .output()?;
        if !output.status.success() {
            return Err(BuildError::StepFailed {
                step: "glibc config.guess".into(),
                status: output.status.to_string(),
            }
            .into());
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }
}

impl Stage for Glibc {
    fn name(&self) -> &'static str {
        "glibc"
    }

    fn package(&self) -> &'static str {
        "glibc"
    }

    fn output(&self, ctx: &BuildContext) -> PathBuf {
        ctx.sysroot().join("usr/lib/libc.so.6")
    }

    fn build(&self, ctx: &BuildContext) -> Result<()> {
        let src = ctx.source(self.package())?;
        let dir = ctx.build_dir("libc");
        std::fs::create_dir_all(&dir)?;

        // Keep sbin programs under /usr like the rest of the sysroot.
        std::fs::write(dir.join("configparms"), "rootsbindir=/usr/sbin\n")?;

        let build_triple = Self::build_triple(ctx, src)?;
        run_configure(
            ctx,
            self.name(),
            src,
            &dir,
            &Self::configure_args(ctx, &build_triple),
        )?;
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::stages::tests::context;
    use crate::builder::target::{Arch, Libc};

    #[test]
    fn test_configure_args() {
        let ctx = context(Path::new("/w"), Arch::Aarch64, Libc::Gnu);
        let args = Glibc::configure_args(&ctx, "x86_64-pc-linux-gnu");
        assert!(args.contains(&"--host=aarch64-linux-gnu".to_string()));
        assert!(args.contains(&"--build=x86_64-pc-linux-gnu".to_string()));
        assert!(args.contains(
            &"--with-headers=/w/artifacts/aarch64-gnu/aarch64-linux-gnu/usr/include".to_string()
        ));
        assert!(args.contains(&"libc_cv_slibdir=/usr/lib".to_string()));
    }

    fn fake_source(root: &Path, name: &str, script: &str) -> PathBuf {
        use std::os::unix::fs::PermissionsExt;

        let src = root.join(name);
        std::fs::create_dir_all(src.join("scripts")).unwrap();
        let guess = src.join("scripts/config.guess");
        std::fs::write(&guess, script).unwrap();
        std::fs::set_permissions(&guess, std::fs::Permissions::from_mode(0o755)).unwrap();
        src
    }

    #[test]
    fn test_build_triple() {
        let tmp = tempfile::tempdir().unwrap();
        let ctx = context(tmp.path(), Arch::X86_64, Libc::Gnu);

        let broken = fake_source(tmp.path(), "glibc-broken", "#!/bin/sh\nexit 3\n");
        assert!(Glibc::build_triple(&ctx, &broken).is_err());

        let good = fake_source(tmp.path(), "glibc-good", "#!/bin/sh\necho x86_64-pc-linux-gnu\n");
        assert_eq!(Glibc::build_triple(&ctx, &good).unwrap(), "x86_64-pc-linux-gnu");
    }
}
