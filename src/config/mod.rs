//! Configuration management for appupdate.
//!
//! The agent reads a single TOML file. Its location is, in order:
//!
//! 1. the `--config` command-line option
//! 2. the `APPUPDATE_CONFIG_PATH` environment variable
//! 3. `~/.appupdate/config.toml` (`%LOCALAPPDATA%\appupdate\config.toml` on Windows)
//!
//! A missing file is not an error; every setting has a default except the
//! two URLs, which [`UpdateConfig::validate`] checks before a cycle runs.
//!
//! # File Format
//!
//! ```toml
//! [update]
//! descriptor_url = "https://example.com/app/version.json"
//! artifact_url = "https://example.com/app/app.pkg"
//! package = "app"
//! check_interval = 14400
//! verify_checksum = true
//! ```

mod update;

pub use update::UpdateConfig;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::debug;

/// Environment variable overriding the configuration file location.
pub const CONFIG_PATH_ENV: &str = "APPUPDATE_CONFIG_PATH";

/// Top-level configuration file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct AgentConfig {
    /// Update pipeline settings
    #[serde(default)]
    pub update: UpdateConfig,
}

impl AgentConfig {
    /// Load from the default location, or defaults if no file exists.
    pub async fn load() -> Result<Self> {
        Self::load_with_optional(None).await
    }

    /// Load from `path` if given, else from the default location.
    pub async fn load_with_optional(path: Option<PathBuf>) -> Result<Self> {
        let path = match path {
            Some(path) => path,
            None => Self::default_path()?,
        };
        if fs::try_exists(&path).await.unwrap_or(false) {
            Self::load_from(&path).await
        } else {
            debug!("No config file at {}, using defaults", path.display());
            Ok(Self::default())
        }
    }

    /// Load from a specific file.
    pub async fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read config from {}", path.display()))?;

        toml::from_str(&content)
            .with_context(|| format!("Failed to parse config from {}", path.display()))
    }

    /// Write the configuration to `path`, creating parent directories.
    pub async fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await.with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;
        fs::write(path, content)
            .await
            .with_context(|| format!("Failed to write config to {}", path.display()))
    }

    /// Default configuration file location.
    pub fn default_path() -> Result<PathBuf> {
        if let Ok(path) = std::env::var(CONFIG_PATH_ENV) {
            return Ok(PathBuf::from(path));
        }

        let config_dir = if cfg!(target_os = "windows") {
            dirs::data_local_dir()
                .ok_or_else(|| anyhow::anyhow!("Unable to determine local data directory"))?
                .join("appupdate")
        } else {
            dirs::home_dir()
                .ok_or_else(|| anyhow::anyhow!("Unable to determine home directory"))?
                .join(".appupdate")
        };

        Ok(config_dir.join("config.toml"))
    }

    /// Example configuration written by `appupdate config init`.
    pub fn init_example() -> Self {
        Self {
            update: UpdateConfig {
                descriptor_url: "https://example.com/app/version.json".to_string(),
                artifact_url: "https://example.com/app/app.pkg".to_string(),
                ..UpdateConfig::default()
            },
        }
    }
}
