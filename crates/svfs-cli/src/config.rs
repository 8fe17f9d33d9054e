//! Volume configuration for the CLI.
//!
//! Configuration is loaded from `~/.config/svfs/volumes.toml` unless a path is
//! given with `--config`.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use directories::ProjectDirs;
use svfs_core::VfsConfig;

/// Load configuration from the default path.
///
/// If the config file doesn't exist, returns an empty configuration.
pub fn load() -> Result<VfsConfig> {
    let path = config_path()?;

    if !path.exists() {
        tracing::debug!("No config file at {}, mounting nothing", path.display());
        return Ok(VfsConfig::default());
    }

    load_from(&path)
}

/// Load configuration from a specific path.
///
/// Relative volume roots are resolved against the file's directory.
pub fn load_from(path: &Path) -> Result<VfsConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config from {}", path.display()))?;

    let mut config = VfsConfig::from_toml_str(&content)
        .with_context(|| format!("Failed to parse config from {}", path.display()))?;

    if let Some(base) = path.parent() {
        for volume in &mut config.volumes {
            if let Some(root) = volume.root.as_mut()
                && root.is_relative()
            {
                *root = base.join(&*root);
            }
        }
    }

    Ok(config)
}

/// Get the default config file path.
pub fn config_path() -> Result<PathBuf> {
    let dirs =
        ProjectDirs::from("", "", "svfs").context("Could not determine config directory")?;

    Ok(dirs.config_dir().join("volumes.toml"))
}
