//! External command execution.

use super::error::BuildError;
use anyhow::{Context, Result};
use std::ffi::{OsStr, OsString};
use std::path::PathBuf;
use std::process::{Command, Output};
use tracing::{debug, info};

/// One invocation of a native build tool.
#[derive(Debug, Clone)]
pub struct Step {
    label: String,
    program: OsString,
    args: Vec<OsString>,
    dir: Option<PathBuf>,
    env: Vec<(OsString, OsString)>,
}

impl Step {
    pub fn new(label: impl Into<String>, program: impl Into<OsString>) -> Self {
        Self {
            label: label.into(),
            program: program.into(),
            args: Vec::new(),
            dir: None,
            env: Vec::new(),
        }
    }

    #[must_use]
    pub fn arg(mut self, arg: impl AsRef<OsStr>) -> Self {
        self.args.push(arg.as_ref().to_owned());
        self
    }

    #[must_use]
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        self.args
            .extend(args.into_iter().map(|a| a.as_ref().to_owned()));
        self
    }

    #[must_use]
    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.dir = Some(dir.into());
        self
    }

    #[must_use]
    pub fn env(mut self, key: impl AsRef<OsStr>, value: impl AsRef<OsStr>) -> Self {
        self.env
            .push((key.as_ref().to_owned(), value.as_ref().to_owned()));
        self
    }

    pub fn get_env(&self, key: &str) -> Option<&OsStr> {
        self.env
            .iter()
            .rev()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_os_str())
    }

    /// Shell-like rendering for logs.
    pub fn command_line(&self) -> String {
        std::iter::once(&self.program)
            .chain(&self.args)
            .map(|a| a.to_string_lossy().into_owned())
            .collect::<Vec<_>>()
            .join(" ")
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args);
        if let Some(dir) = &self.dir {
            cmd.current_dir(dir);
        }
        for (k, v) in &self.env {
            cmd.env(k, v);
        }
        cmd
    }

    fn spawn_error(&self, e: &std::io::Error) -> anyhow::Error {
        if e.kind() == std::io::ErrorKind::NotFound {
            BuildError::MissingDependency {
                tool: self.program.to_string_lossy().into_owned(),
                purpose: self.label.clone(),
            }
            .into()
        } else {
            anyhow::anyhow!("Failed to run {}: {e}", self.program.to_string_lossy())
        }
    }

    /// Run with inherited stdio; a non-zero exit is a failed step.
    pub fn run(&self) -> Result<()> {
        info!("  [{}] {}", self.label, self.program.to_string_lossy());
        debug!(
            dir = %self.dir.as_deref().unwrap_or(std::path::Path::new(".")).display(),
            "{}",
            self.command_line()
        );

        let status = self.command().status().map_err(|e| self.spawn_error(&e))?;
        if !status.success() {
            return Err(BuildError::StepFailed {
                step: self.label.clone(),
                status: status.to_string(),
            }
            .into());
        }
        Ok(())
    }

    /// Run capturing stdout/stderr; the caller inspects the status.
    pub fn output(&self) -> Result<Output> {
        debug!("{}", self.command_line());
        self.command()
            .output()
            .map_err(|e| self.spawn_error(&e))
            .with_context(|| format!("{} could not start", self.label))
    }
}

/// Parallel jobs for `make -j`.
pub fn make_jobs() -> usize {
    std::thread::available_parallelism()
        .map(std::num::NonZero::get)
        .unwrap_or(1)
}
