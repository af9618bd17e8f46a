use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::error::{Result, TabletError};

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Directory the catalog persists tables into.
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Whether logins, sessions, and ownership scoping are enforced.
    #[serde(default = "default_true")]
    pub auth_enabled: bool,

    /// Session lifetime in hours.
    #[serde(default = "default_session_ttl_hours")]
    pub session_ttl_hours: i64,
}

fn default_data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from(".local/share"))
        .join("tablet")
}

fn default_true() -> bool {
    true
}

fn default_session_ttl_hours() -> i64 {
    crate::auth::DEFAULT_SESSION_TTL_HOURS
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            auth_enabled: true,
            session_ttl_hours: default_session_ttl_hours(),
        }
    }
}

impl Config {
    /// Load config from the given path, or the default XDG config location.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config_path = match path {
            Some(p) => p.to_path_buf(),
            None => Self::default_config_path(),
        };

        let config = if config_path.exists() {
            info!("loading config from {}", config_path.display());
            let contents = std::fs::read_to_string(&config_path)?;
            toml::from_str(&contents)
                .map_err(|e| TabletError::Config(format!("parse error: {e}")))?
        } else {
            info!("no config file found, using defaults");
            Config::default()
        };

        Ok(config)
    }

    /// Returns the default config file path: `$XDG_CONFIG_HOME/tablet/config.toml`
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from(".config"))
            .join("tablet")
            .join("config.toml")
    }
}
