use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::Deserialize;

use crate::pages::PagesOptions;
use crate::poster::PosterOptions;
use crate::report::ReportOptions;
use crate::site::DeployOptions;

/// Per-action defaults loaded from TOML. Each table is optional and every key
/// inside a table falls back to the action's built-in default.
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub report: ReportOptions,
    pub pages: PagesOptions,
    pub deploy: DeployOptions,
    pub poster: PosterOptions,
}

/// Load action configuration from a TOML file.
pub fn load_config(path: &Path) -> anyhow::Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    let config: Config =
        toml::from_str(&content).with_context(|| format!("Failed to parse config: {}", path.display()))?;
    Ok(config)
}

/// Load the explicitly requested config file, or the default one if it exists.
/// An explicit path that does not exist is an error; a missing default is not.
pub fn resolve_config(explicit: Option<&Path>) -> anyhow::Result<Config> {
    match explicit {
        Some(path) => load_config(path),
        None => {
            let path = default_config_path();
            if path.exists() {
                load_config(&path)
            } else {
                Ok(Config::default())
            }
        }
    }
}

/// Returns the default path to `config/actions.toml` relative to the current directory.
pub fn default_config_path() -> PathBuf {
    PathBuf::from("config/actions.toml")
}
