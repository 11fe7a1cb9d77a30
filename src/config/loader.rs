// Configuration loader
// Reads ~/.petfeeder/config.toml unless an explicit path is given

use anyhow::{bail, Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

use super::settings::Settings;

/// Default location of the config file: `~/.petfeeder/config.toml`.
pub fn default_config_path() -> Result<PathBuf> {
    let home = dirs::home_dir().context("Could not determine home directory")?;
    Ok(home.join(".petfeeder").join("config.toml"))
}

/// Default location of the durable state file: `~/.petfeeder/state.json`.
pub fn default_state_path() -> Result<PathBuf> {
    let home = dirs::home_dir().context("Could not determine home directory")?;
    Ok(home.join(".petfeeder").join("state.json"))
}

/// Load and validate settings from `path`, or from the default location.
pub fn load_settings(path: Option<&Path>) -> Result<Settings> {
    let config_path = match path {
        Some(p) => p.to_path_buf(),
        None => default_config_path()?,
    };

    if !config_path.exists() {
        bail!(
            "No configuration found at {}.\n\n\
            Create it with at least:\n\n\
            [device]\n\
            host = \"<feeder LAN address>\"\n\
            device_id = \"<tuya device id>\"\n\
            local_key = \"<tuya local key>\"\n\
            feed_dp = \"3\"\n\n\
            [operators]\n\
            seed = [<your operator id>]",
            config_path.display()
        );
    }

    let contents = fs::read_to_string(&config_path)
        .with_context(|| format!("Failed to read config from {}", config_path.display()))?;

    let settings: Settings = toml::from_str(&contents)
        .with_context(|| format!("Failed to parse config at {}", config_path.display()))?;

    settings
        .validate()
        .context("Configuration validation failed")?;

    Ok(settings)
}
