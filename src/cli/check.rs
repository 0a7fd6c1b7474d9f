//! Report whether a newer version is available without installing it.

use super::context::AgentContext;
use anyhow::Result;
use clap::Args;
use colored::Colorize;

/// Compare the remote descriptor with the installed version.
#[derive(Args)]
pub struct CheckCommand {
    /// Print the result as JSON
    #[arg(long)]
    json: bool,
}

impl CheckCommand {
    /// Execute the version check.
    pub async fn execute(self, context: AgentContext) -> Result<()> {
        let coordinator = context.coordinator()?;
        let check = coordinator.oracle().check().await?;

        if self.json {
            let report = serde_json::json!({
                "package": context.package(),
                "installed": check.local.version_code,
                "available": check.remote.version_code,
                "update_available": check.update_available(),
            });
            println!("{}", serde_json::to_string_pretty(&report)?);
            return Ok(());
        }

        println!("Installed: {}", check.local.version_code);
        println!("Available: {}", check.remote.version_code);
        if check.update_available() {
            println!("{}", "Update available. Run 'appupdate run' to install it.".yellow());
        } else {
            println!("{} {} is up to date", "✓".green(), context.package());
        }
        Ok(())
    }
}
