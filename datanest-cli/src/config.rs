//! Environment and config file discovery

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use datanest::DataConfig;
use tracing::{debug, info};

const CONFIG_DIR: &str = ".datanest";

/// Load `.env` from the current directory, then `~/.datanest/.env`.
/// Variables already set are never overwritten.
pub fn load_dotenv() {
    let mut loaded = false;

    if let Ok(path) = dotenvy::dotenv() {
        debug!("Loaded .env from current directory: {}", path.display());
        loaded = true;
    }

    if let Some(dir) = config_dir() {
        let env_file = dir.join(".env");
        if env_file.exists() {
            match dotenvy::from_path(&env_file) {
                Ok(()) => {
                    debug!("Loaded .env from {}", env_file.display());
                    loaded = true;
                }
                Err(e) => debug!("Failed to load {}: {}", env_file.display(), e),
            }
        }
    }

    if !loaded {
        debug!("No .env files found (current dir or ~/{})", CONFIG_DIR);
    }
}

/// `~/.datanest`
pub fn config_dir() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(CONFIG_DIR))
}

/// The explicit path if given, else `~/.datanest/config.toml`.
pub fn config_path(explicit: Option<&Path>) -> Option<PathBuf> {
    match explicit {
        Some(path) => Some(path.to_path_buf()),
        None => config_dir().map(|dir| dir.join("config.toml")),
    }
}

/// Config file (if any) overlaid with the environment.
pub fn load(explicit: Option<&Path>) -> Result<DataConfig> {
    if let Some(path) = explicit {
        anyhow::ensure!(path.exists(), "config file {} not found", path.display());
    }
    let path = config_path(explicit);
    let config = DataConfig::load(path.as_deref())
        .context("Failed to load data configuration")?;
    info!(backend = %config.backend, url = %config.redacted_url(), "Using data store");
    Ok(config)
}
