//! Failure taxonomy for the build pipeline.
//!
//! Every variant ends the run with exit code 1; there is no retry.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BuildError {
    #[error("missing host dependency: {tool} (needed for {purpose})")]
    MissingDependency { tool: String, purpose: String },

    #[error("missing package {name}: expected {}", path.display())]
    MissingPackage { name: String, path: PathBuf },

    #[error("unknown package: {0} (not listed in build.packages)")]
    UnknownPackage(String),

    #[error("{step} failed ({status})")]
    StepFailed { step: String, status: String },

    #[error("verification failed for {target}: {reason}")]
    VerificationFailed { target: String, reason: String },

    #[error("checksum mismatch for {file}: expected {expected}, got {actual}")]
    ChecksumMismatch {
        file: String,
        expected: String,
        actual: String,
    },

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("unsupported architecture: {0}")]
    UnsupportedArch(String),

    #[error("unsupported toolchain type: {0}")]
    UnsupportedToolchain(String),

    #[error("unsupported archive format: {0}")]
    UnsupportedArchive(String),
}
