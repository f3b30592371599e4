//! Smoke tests for a built toolchain: run the compiler, build static hello
//! worlds and check what `file` says about them.

use super::command::Step;
use super::config::Config;
use super::error::BuildError;
use super::host;
use super::target::Target;
use anyhow::Result;
use std::path::{Path, PathBuf};
use tracing::info;

const HELLO_C: &str = r#"#include <stdio.h>

int main(void) {
    printf("hello from crossbuild\n");
    return 0;
}
"#;

const HELLO_CXX: &str = r#"#include <iostream>

int main() {
    std::cout << "hello from crossbuild" << std::endl;
    return 0;
}
"#;

/// Verify each target in order, stopping at the first failure.
pub fn verify(config: &Config, targets: &[Target]) -> Result<()> {
    let file_cmd = host::require_tool("file", "toolchain verification")?;

    for &target in targets {
        verify_target(&config.prefix(target), target, &file_cmd)?;
    }
    Ok(())
}

/// Verify the toolchain installed at `prefix`.
pub fn verify_target(prefix: &Path, target: Target, file_cmd: &Path) -> Result<()> {
    info!("=== Verifying {target} ===");

    let fail = |reason: String| BuildError::VerificationFailed {
        target: target.name(),
        reason,
    };

    if !prefix.is_dir() {
        return Err(fail(format!("toolchain not built ({} missing)", prefix.display())).into());
    }

    let cross = target.cross_compile();
    let gcc = prefix.join("bin").join(format!("{cross}gcc"));
    let gxx = prefix.join("bin").join(format!("{cross}g++"));

    let version = Step::new(format!("{cross}gcc --version"), &gcc)
        .arg("--version")
        .output()
        .map_err(|e| fail(format!("cannot run {}: {e:#}", gcc.display())))?;
    if !version.status.success() {
        return Err(fail(format!("{cross}gcc --version exited with {}", version.status)).into());
    }
    let banner = String::from_utf8_lossy(&version.stdout);
    info!("  {}", banner.lines().next().unwrap_or_default());

    let scratch = tempfile::Builder::new()
        .prefix("crossbuild-verify-")
        .tempdir()?;

    let hello = compile(&gcc, scratch.path(), "hello.c", HELLO_C).map_err(&fail)?;
    check_binary(file_cmd, &hello, target).map_err(&fail)?;
    info!("  [OK] static C binary");

    if gxx.exists() {
        let hello = compile(&gxx, scratch.path(), "hello.cpp", HELLO_CXX).map_err(&fail)?;
        check_binary(file_cmd, &hello, target).map_err(&fail)?;
        info!("  [OK] static C++ binary");
    }

    info!("{target} verified");
    Ok(())
}

/// Compile `source` statically, returning the binary path.
fn compile(compiler: &Path, dir: &Path, name: &str, source: &str) -> Result<PathBuf, String> {
    let src = dir.join(name);
    std::fs::write(&src, source).map_err(|e| format!("cannot write {name}: {e}"))?;
    let out = src.with_extension("");

    let output = Step::new(format!("compile {name}"), compiler)
        .arg("-static")
        .arg("-o")
        .arg(&out)
        .arg(&src)
        .current_dir(dir)
        .output()
        .map_err(|e| format!("{e:#}"))?;

    if !output.status.success() {
        return Err(format!(
            "{name} failed to compile ({}): {}",
            output.status,
            String::from_utf8_lossy(&output.stderr).trim()
        ));
    }
    Ok(out)
}

fn check_binary(file_cmd: &Path, binary: &Path, target: Target) -> Result<(), String> {
    let output = Step::new("file", file_cmd)
        .arg(binary)
        .output()
        .map_err(|e| format!("{e:#}"))?;
    check_file_output(&String::from_utf8_lossy(&output.stdout), target)
}

/// Check a `file` description: right machine, statically linked.
pub fn check_file_output(description: &str, target: Target) -> Result<(), String> {
    let machine = target.arch.file_machine();
    if !description.contains(machine) {
        return Err(format!("expected a {machine} binary, got: {}", description.trim()));
    }
    if !(description.contains("statically linked") || description.contains("static-pie linked")) {
        return Err(format!("binary is not static: {}", description.trim()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::target::{Arch, Libc};

    #[test]
    fn test_file_output_accepted() {
        let aarch64 = Target::new(Arch::Aarch64, Libc::Musl);
        let desc = "hello: ELF 64-bit LSB executable, ARM aarch64, version 1 (SYSV), statically linked, not stripped\n";
        assert!(check_file_output(desc, aarch64).is_ok());

        let x86 = Target::new(Arch::X86_64, Libc::Gnu);
        let desc = "hello: ELF 64-bit LSB pie executable, x86-64, version 1 (SYSV), static-pie linked, with debug_info";
        assert!(check_file_output(desc, x86).is_ok());
    }

    #[test]
    fn test_file_output_rejected() {
        let target = Target::new(Arch::Aarch64, Libc::Gnu);
        let wrong_arch = "hello: ELF 64-bit LSB executable, x86-64, statically linked";
        assert!(check_file_output(wrong_arch, target)
            .unwrap_err()
            .contains("ARM aarch64"));

        let dynamic = "hello: ELF 64-bit LSB executable, ARM aarch64, dynamically linked, interpreter /lib/ld-linux-aarch64.so.1";
        assert!(check_file_output(dynamic, target)
            .unwrap_err()
            .contains("not static"));
    }

    #[test]
    fn test_missing_prefix() {
        let tmp = tempfile::tempdir().unwrap();
        let target = Target::new(Arch::X86_64, Libc::Musl);
        let err = verify_target(&tmp.path().join("absent"), target, Path::new("/usr/bin/file"))
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<BuildError>(),
            Some(BuildError::VerificationFailed { target, .. }) if target == "x86_64-musl"
        ));
    }

    #[test]
    fn test_broken_compiler() {
        use std::os::unix::fs::PermissionsExt;

        let tmp = tempfile::tempdir().unwrap();
        let target = Target::new(Arch::X86_64, Libc::Musl);
        let bin = tmp.path().join("bin");
        std::fs::create_dir_all(&bin).unwrap();
        let gcc = bin.join("x86_64-linux-musl-gcc");
        std::fs::write(&gcc, "#!/bin/sh\nexit 1\n").unwrap();
        std::fs::set_permissions(&gcc, std::fs::Permissions::from_mode(0o755)).unwrap();

        let err = verify_target(tmp.path(), target, Path::new("/usr/bin/file")).unwrap_err();
        assert!(err.to_string().contains("--version"));
    }
}
