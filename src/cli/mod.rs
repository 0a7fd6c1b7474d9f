//! Command-line interface for appupdate.
//!
//! # Available Commands
//!
//! - `run` - run one update cycle: check, download, install, relaunch
//! - `check` - compare the remote version with the installed one
//! - `watch` - run update cycles on an interval until Ctrl-C
//! - `config` - create or inspect the configuration file
//!
//! # Global Options
//!
//! - `--verbose` - enable debug logging
//! - `--quiet` - only log errors
//! - `--config` - path to a configuration file
//!
//! `RUST_LOG` takes precedence over both verbosity flags.
//!
//! # Example
//!
//! ```bash
//! appupdate config init
//! appupdate check
//! appupdate --verbose run
//! appupdate watch --interval 3600
//! ```

mod check;
mod config;
mod context;
mod run;
mod watch;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

pub use context::AgentContext;

/// Top-level command line.
#[derive(Parser)]
#[command(
    name = "appupdate",
    about = "Self-update agent - keep an installed application on its latest release",
    version,
    author,
    long_about = "appupdate checks a remote version descriptor, downloads newer package \
                  artifacts, installs them in place and relaunches the application."
)]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable debug logging
    #[arg(short, long, global = true, conflicts_with = "quiet")]
    verbose: bool,

    /// Only log errors
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Path to the configuration file
    ///
    /// Defaults to `APPUPDATE_CONFIG_PATH`, then `~/.appupdate/config.toml`.
    #[arg(short, long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one update cycle
    Run(run::RunCommand),

    /// Check whether an update is available without installing it
    Check(check::CheckCommand),

    /// Run update cycles periodically until interrupted
    Watch(watch::WatchCommand),

    /// Manage the configuration file
    Config(config::ConfigCommand),
}

impl Cli {
    /// Install logging and run the selected command.
    pub async fn execute(self) -> Result<()> {
        self.init_logging();

        match self.command {
            Commands::Run(cmd) => cmd.execute(AgentContext::load(self.config).await?).await,
            Commands::Check(cmd) => cmd.execute(AgentContext::load(self.config).await?).await,
            Commands::Watch(cmd) => cmd.execute(AgentContext::load(self.config).await?).await,
            Commands::Config(cmd) => cmd.execute(self.config).await,
        }
    }

    /// Log level selected by the verbosity flags.
    #[must_use]
    pub fn log_level(&self) -> &'static str {
        if self.verbose {
            "debug"
        } else if self.quiet {
            "error"
        } else {
            "info"
        }
    }

    fn init_logging(&self) {
        let filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(self.log_level()));

        // A subscriber may already be installed when embedded in tests
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .with_writer(std::io::stderr)
            .try_init();
    }
}
