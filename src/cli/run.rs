//! Run a single update cycle.

use super::context::AgentContext;
use crate::update::CycleOutcome;
use anyhow::Result;
use clap::Args;
use colored::Colorize;

/// Check for a newer version and install it if there is one.
///
/// The application is started again after a successful install. A failed
/// cycle leaves any downloaded artifact in place for the next run.
#[derive(Args)]
pub struct RunCommand {}

impl RunCommand {
    /// Execute one cycle with the loaded configuration.
    pub async fn execute(self, context: AgentContext) -> Result<()> {
        let _lock = context.lock().await?;
        let coordinator = context.coordinator()?;

        match coordinator.run_update_cycle().await? {
            CycleOutcome::NoUpdate {
                local,
                ..
            } => {
                println!("{} {} is up to date ({local})", "✓".green(), context.package());
            }
            CycleOutcome::Updated {
                version_code,
                relaunched,
            } => {
                println!("{} Updated {} to {version_code}", "✓".green(), context.package());
                if !relaunched {
                    println!("  {}", "The application was not restarted; start it manually.".yellow());
                }
            }
        }
        Ok(())
    }
}
