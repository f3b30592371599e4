//! Removal of build state.

use super::config::Config;
use super::vendor;
use anyhow::{Context, Result};
use std::path::Path;
use tracing::info;

/// Remove the build directory; with `all`, also the outputs and the
/// package cache.
pub fn clean(config: &Config, all: bool) -> Result<()> {
    remove_if_exists(config.build_dir())?;
    if all {
        remove_if_exists(config.output_dir())?;
        vendor::clean(config, None)?;
    }
    Ok(())
}

fn remove_if_exists(dir: &Path) -> Result<()> {
    if dir.exists() {
        std::fs::remove_dir_all(dir)
            .with_context(|| format!("Failed to remove {}", dir.display()))?;
        info!("Removed {}", dir.display());
    } else {
        info!("{} does not exist, nothing to remove", dir.display());
    }
    Ok(())
}
