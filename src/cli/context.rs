//! Configuration and host services shared by the pipeline commands.

use crate::config::{AgentConfig, UpdateConfig};
use crate::constants::UPDATE_LOCK_NAME;
use crate::platform::{CurrentProcess, ProcessLauncher};
use crate::update::UpdateCoordinator;
use crate::utils::UpdateLock;
use anyhow::{Context, Result};
use std::path::PathBuf;

/// Validated configuration shared by the commands that run the pipeline.
pub struct AgentContext {
    config: UpdateConfig,
}

impl AgentContext {
    /// Load the configuration and check it is usable for an update cycle.
    pub async fn load(config_path: Option<PathBuf>) -> Result<Self> {
        let config = AgentConfig::load_with_optional(config_path).await?;
        config.update.validate().context("Invalid configuration")?;
        Ok(Self {
            config: config.update,
        })
    }

    /// Package being kept up to date.
    pub fn package(&self) -> &str {
        &self.config.package
    }

    /// Update settings.
    pub fn config(&self) -> &UpdateConfig {
        &self.config
    }

    /// Coordinator backed by the host platform.
    pub fn coordinator(&self) -> Result<UpdateCoordinator> {
        UpdateCoordinator::from_config(&self.config)
    }

    /// Whether installing the package replaces this running executable.
    pub fn updates_self(&self) -> Result<bool> {
        let launcher =
            ProcessLauncher::new(self.config.install_dir()?, self.config.launch_command.clone())
                .with_current_process(CurrentProcess::detect());
        Ok(launcher.relaunches_self(&self.config.package))
    }

    /// Lock excluding other `appupdate` processes using the same download directory.
    pub async fn lock(&self) -> Result<UpdateLock> {
        UpdateLock::acquire(&self.config.download_dir()?, UPDATE_LOCK_NAME).await
    }
}
