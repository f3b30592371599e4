//! Target architectures, C libraries and the triples derived from them.

use super::error::BuildError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// CPU architecture of the toolchain target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Arch {
    X86_64,
    Aarch64,
}

impl Arch {
    pub fn as_str(self) -> &'static str {
        match self {
            Arch::X86_64 => "x86_64",
            Arch::Aarch64 => "aarch64",
        }
    }

    /// Value of `ARCH=` for the kernel's `headers_install`.
    pub fn kernel_arch(self) -> &'static str {
        match self {
            Arch::X86_64 => "x86",
            Arch::Aarch64 => "arm64",
        }
    }

    /// Machine description `file(1)` prints for ELF binaries of this arch.
    pub fn file_machine(self) -> &'static str {
        match self {
            Arch::X86_64 => "x86-64",
            Arch::Aarch64 => "ARM aarch64",
        }
    }
}

impl fmt::Display for Arch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Arch {
    type Err = BuildError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "x86_64" | "amd64" => Ok(Arch::X86_64),
            "aarch64" | "arm64" => Ok(Arch::Aarch64),
            other => Err(BuildError::UnsupportedArch(other.to_string())),
        }
    }
}

/// C library the toolchain targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Libc {
    Musl,
    Gnu,
}

impl Libc {
    pub fn as_str(self) -> &'static str {
        match self {
            Libc::Musl => "musl",
            Libc::Gnu => "gnu",
        }
    }

    /// Name of the source package providing this libc.
    pub fn package(self) -> &'static str {
        match self {
            Libc::Musl => "musl",
            Libc::Gnu => "glibc",
        }
    }
}

impl fmt::Display for Libc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Libc {
    type Err = BuildError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "musl" => Ok(Libc::Musl),
            "gnu" | "glibc" => Ok(Libc::Gnu),
            other => Err(BuildError::UnsupportedToolchain(other.to_string())),
        }
    }
}

/// One toolchain variant: an architecture paired with a libc.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Target {
    pub arch: Arch,
    pub libc: Libc,
}

impl Target {
    pub fn new(arch: Arch, libc: Libc) -> Self {
        Self { arch, libc }
    }

    /// GNU target triple, e.g. `aarch64-linux-musl`.
    pub fn triple(&self) -> String {
        format!("{}-linux-{}", self.arch, self.libc)
    }

    /// Artifact directory name, e.g. `aarch64-musl`.
    pub fn name(&self) -> String {
        format!("{}-{}", self.arch, self.libc)
    }

    /// Prefix for binutils/gcc executables, e.g. `aarch64-linux-musl-`.
    pub fn cross_compile(&self) -> String {
        format!("{}-", self.triple())
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name())
    }
}
