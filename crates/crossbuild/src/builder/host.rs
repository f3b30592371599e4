//! Host tool preflight checks.

use super::error::BuildError;
use super::target::Libc;
use anyhow::Result;
use std::path::PathBuf;
use tracing::{error, info};

/// (tool, what needs it)
const COMMON_TOOLS: &[(&str, &str)] = &[
    ("make", "every native build"),
    ("gcc", "host C compiler"),
    ("g++", "host C++ compiler"),
    ("bison", "binutils/gcc parsers"),
    ("flex", "binutils lexers"),
    ("gawk", "gcc/glibc build scripts"),
    ("m4", "autotools macros"),
    ("perl", "linux headers_install"),
    ("rsync", "linux headers_install"),
];

const GLIBC_TOOLS: &[(&str, &str)] = &[("python3", "glibc configure")];

/// Tools a toolchain of the given libc needs on the build host.
pub fn host_tools(libc: Libc) -> Vec<(&'static str, &'static str)> {
    let mut tools = COMMON_TOOLS.to_vec();
    if libc == Libc::Gnu {
        tools.extend_from_slice(GLIBC_TOOLS);
    }
    tools
}

/// Check every host tool, reporting all of them before failing.
pub fn preflight(libc: Libc) -> Result<()> {
    info!("=== Checking host tools ===");

    let mut missing = Vec::new();
    for (tool, purpose) in host_tools(libc) {
        match which::which(tool) {
            Ok(path) => info!("[OK] {tool} ({})", path.display()),
            Err(_) => {
                error!("[FAIL] missing `{tool}` in PATH ({purpose})");
                missing.push(tool);
            }
        }
    }

    if !missing.is_empty() {
        return Err(BuildError::MissingDependency {
            tool: missing.join(", "),
            purpose: format!("building a {libc} toolchain"),
        }
        .into());
    }
    Ok(())
}

/// Locate a single tool.
pub fn require_tool(tool: &str, purpose: &str) -> Result<PathBuf, BuildError> {
    which::which(tool).map_err(|_| BuildError::MissingDependency {
        tool: tool.to_string(),
        purpose: purpose.to_string(),
    })
}
