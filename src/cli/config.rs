//! Manage the agent configuration file.
//!
//! ```bash
//! appupdate config init            # write an example configuration
//! appupdate config init --force    # overwrite an existing one
//! appupdate config show            # print the effective configuration
//! appupdate config path            # print the file location
//! appupdate config                 # same as `show`
//! ```

use crate::config::AgentConfig;
use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use colored::Colorize;
use std::path::PathBuf;

/// Command to inspect or create the configuration file.
#[derive(Args)]
pub struct ConfigCommand {
    /// Configuration operation to perform
    #[command(subcommand)]
    command: Option<ConfigSubcommands>,
}

#[derive(Subcommand)]
enum ConfigSubcommands {
    /// Write an example configuration file.
    ///
    /// Refuses to overwrite an existing file unless `--force` is given.
    Init {
        /// Overwrite an existing configuration file
        #[arg(long)]
        force: bool,
    },

    /// Show the effective configuration, defaults included.
    Show,

    /// Print the configuration file location.
    Path,
}

impl ConfigCommand {
    /// Execute the config command against `config_path` or the default location.
    pub async fn execute(self, config_path: Option<PathBuf>) -> Result<()> {
        match self.command {
            Some(ConfigSubcommands::Init {
                force,
            }) => Self::init(force, config_path).await,
            Some(ConfigSubcommands::Show) | None => Self::show(config_path).await,
            Some(ConfigSubcommands::Path) => Self::show_path(config_path),
        }
    }

    fn resolve(config_path: Option<PathBuf>) -> Result<PathBuf> {
        match config_path {
            Some(path) => Ok(path),
            None => AgentConfig::default_path(),
        }
    }

    async fn init(force: bool, config_path: Option<PathBuf>) -> Result<()> {
        let config_path = Self::resolve(config_path)?;

        if config_path.exists() && !force {
            println!("❌ Config already exists at: {}", config_path.display());
            println!("   Use --force to overwrite");
            return Ok(());
        }

        let config = AgentConfig::init_example();
        config.save_to(&config_path).await?;

        println!("✅ Created config at: {}", config_path.display());
        println!("\n{}", "Example configuration:".bold());
        println!("{}", toml::to_string_pretty(&config).context("Failed to render config")?);
        println!("\n{}", "Next steps:".yellow());
        println!("  1. Point descriptor_url and artifact_url at your release channel");
        println!("  2. Set package and install_dir for the application to keep updated");
        Ok(())
    }

    async fn show(config_path: Option<PathBuf>) -> Result<()> {
        let config_path = Self::resolve(config_path)?;
        let config = AgentConfig::load_with_optional(Some(config_path.clone())).await?;

        println!("{}", "Agent Configuration".bold());
        println!("Location: {}\n", config_path.display());
        if !config_path.exists() {
            println!("{}", "No config file found, showing defaults.".yellow());
            println!("  Run 'appupdate config init' to create one\n");
        }
        println!("{}", toml::to_string_pretty(&config).context("Failed to render config")?);

        if let Err(e) = config.update.validate() {
            println!("{} {e}", "Warning:".yellow());
        }
        Ok(())
    }

    fn show_path(config_path: Option<PathBuf>) -> Result<()> {
        println!("{}", Self::resolve(config_path)?.display());
        Ok(())
    }
}
