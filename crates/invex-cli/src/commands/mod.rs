//! CLI subcommands.

pub mod config;
pub mod extract;
pub mod history;
pub mod serve;

use std::path::{Path, PathBuf};

use invex_core::InvexConfig;

/// Platform config location, e.g. `~/.config/invex/config.json`.
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("invex")
        .join("config.json")
}

/// The config file in effect: `--config` if given, else the default path.
pub fn config_path(explicit: Option<&str>) -> PathBuf {
    explicit.map(PathBuf::from).unwrap_or_else(default_config_path)
}

/// Load the config in effect, falling back to defaults when the default
/// file does not exist. An explicit `--config` must exist.
pub fn load_config(explicit: Option<&str>) -> anyhow::Result<InvexConfig> {
    match explicit {
        Some(path) => Ok(InvexConfig::from_file(Path::new(path))?),
        None => {
            let path = default_config_path();
            if path.exists() {
                Ok(InvexConfig::from_file(&path)?)
            } else {
                Ok(InvexConfig::default())
            }
        }
    }
}
