//! Tracing setup: stderr always, plus an optional plain-text log file.

use anyhow::{Context, Result};
use std::fs::File;
use std::io::IsTerminal;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Logging knobs taken from `DEBUG`, `LOG_TO_FILE` and `--debug`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LogSettings {
    pub debug: bool,
    pub file: Option<PathBuf>,
}

impl LogSettings {
    pub fn from_env(debug_flag: bool) -> Self {
        Self::from_values(
            debug_flag,
            std::env::var("DEBUG").ok().as_deref(),
            std::env::var("LOG_TO_FILE").ok().as_deref(),
        )
    }

    fn from_values(debug_flag: bool, debug: Option<&str>, log_to_file: Option<&str>) -> Self {
        Self {
            debug: debug_flag || debug.is_some_and(is_truthy),
            file: log_to_file.and_then(log_file_from),
        }
    }
}

/// `1`, `true`, `yes` and `on`, case-insensitive.
pub fn is_truthy(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

fn is_falsy(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "" | "0" | "false" | "no" | "off"
    )
}

fn log_file_from(value: &str) -> Option<PathBuf> {
    if is_falsy(value) {
        None
    } else if is_truthy(value) {
        let stamp = chrono::Local::now().format("%Y%m%d-%H%M%S");
        Some(Path::new("logs").join(format!("crossbuild-{stamp}.log")))
    } else {
        Some(PathBuf::from(value.trim()))
    }
}

/// Install the global subscriber. `RUST_LOG` still wins when set.
pub fn init(settings: &LogSettings) -> Result<()> {
    let default = if settings.debug {
        "crossbuild=debug"
    } else {
        "crossbuild=info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    let file_layer = match &settings.file {
        Some(path) => {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent)?;
            }
            let file = File::create(path)
                .with_context(|| format!("Failed to create log file {}", path.display()))?;
            Some(
                fmt::layer()
                    .with_ansi(false)
                    .with_target(false)
                    .with_writer(Arc::new(file)),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_target(false)
                .with_ansi(std::io::stderr().is_terminal())
                .with_writer(std::io::stderr),
        )
        .with(file_layer)
        .try_init()
        .context("Failed to initialise logging")?;

    if let Some(path) = &settings.file {
        tracing::info!("Logging to {}", path.display());
    }
    Ok(())
}
