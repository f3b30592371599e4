//! Linux UAPI headers installed into the sysroot.

use super::{BuildContext, Stage};
use anyhow::Result;
use std::path::PathBuf;

pub struct LinuxHeaders;

impl LinuxHeaders {
    fn make_args(ctx: &BuildContext) -> Vec<String> {
        vec![
            format!("O={}", ctx.build_dir("linux-headers").display()),
            format!("ARCH={}", ctx.target.arch.kernel_arch()),
            format!("INSTALL_HDR_PATH={}", ctx.sysroot().join("usr").display()),
            "headers_install".into(),
        ]
    }
}

impl Stage for LinuxHeaders {
    fn name(&self) -> &'static str {
        "linux-headers"
    }

    fn package(&self) -> &'static str {
        "linux"
    }

    fn output(&self, ctx: &BuildContext) -> PathBuf {
        ctx.sysroot().join("usr/include/linux/version.h")
    }

    fn build(&self, ctx: &BuildContext) -> Result<()> {
        let src = ctx.source(self.package())?;
        std::fs::create_dir_all(ctx.build_dir(self.name()))?;

        // The kernel tree stays pristine; objects go to O=.
        ctx.step("linux headers_install", "make")
            .args(Self::make_args(ctx))
            .current_dir(src)
            .run()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::stages::tests::context;
    use crate::builder::target::{Arch, Libc};
    use std::path::Path;

    #[test]
    fn test_headers_go_to_sysroot_usr() {
        let ctx = context(Path::new("/w"), Arch::Aarch64, Libc::Gnu);
        let args = LinuxHeaders::make_args(&ctx);
        assert!(args.contains(&"ARCH=arm64".to_string()));
        assert!(args.contains(
            &"INSTALL_HDR_PATH=/w/artifacts/aarch64-gnu/aarch64-linux-gnu/usr".to_string()
        ));
        assert_eq!(
            LinuxHeaders.output(&ctx),
            Path::new("/w/artifacts/aarch64-gnu/aarch64-linux-gnu/usr/include/linux/version.h")
        );
    }
}
