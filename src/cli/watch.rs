//! Keep checking for updates on an interval.

use super::context::AgentContext;
use crate::update::PeriodicTrigger;
use anyhow::Result;
use clap::Args;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Run update cycles every `check_interval` until interrupted with Ctrl-C.
#[derive(Args)]
pub struct WatchCommand {
    /// Seconds between cycles, overriding `update.check_interval`
    #[arg(long, value_name = "SECONDS")]
    interval: Option<u64>,

    /// Wait one interval before the first cycle
    #[arg(long)]
    delay_first: bool,
}

impl WatchCommand {
    /// Execute the periodic loop.
    pub async fn execute(self, context: AgentContext) -> Result<()> {
        let interval = match self.interval {
            Some(0) => anyhow::bail!("--interval must be greater than zero"),
            Some(seconds) => Duration::from_secs(seconds),
            None => context.config().check_interval(),
        };

        // One agent per download directory while watching
        let _lock = context.lock().await?;
        let coordinator = Arc::new(context.coordinator()?);
        // A relaunched agent takes over from this process
        let trigger = PeriodicTrigger::new(coordinator, interval)
            .with_immediate_run(!self.delay_first)
            .with_stop_after_relaunch(context.updates_self()?);

        let cycles = trigger
            .run_until(async {
                if let Err(e) = tokio::signal::ctrl_c().await {
                    warn!("Failed to listen for Ctrl-C: {e}");
                    std::future::pending::<()>().await;
                }
            })
            .await;

        info!("Stopped after {cycles} update cycle(s)");
        Ok(())
    }
}
