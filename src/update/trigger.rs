//! Periodic driver for the update coordinator.

use super::coordinator::{CycleOutcome, UpdateCoordinator};
use crate::core::UpdateError;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

/// Runs update cycles on a fixed interval.
///
/// A cycle that overruns its slot does not cause a burst of catch-up cycles;
/// missed ticks are skipped. A running cycle is never cancelled, shutdown is
/// observed between cycles.
pub struct PeriodicTrigger {
    coordinator: Arc<UpdateCoordinator>,
    interval: Duration,
    run_immediately: bool,
    stop_after_relaunch: bool,
}

impl PeriodicTrigger {
    /// Trigger running `coordinator` every `interval`.
    pub fn new(coordinator: Arc<UpdateCoordinator>, interval: Duration) -> Self {
        Self {
            coordinator,
            interval,
            run_immediately: true,
            stop_after_relaunch: false,
        }
    }

    /// Whether the first cycle runs right away instead of after one interval.
    pub fn with_immediate_run(mut self, run_immediately: bool) -> Self {
        self.run_immediately = run_immediately;
        self
    }

    /// Whether to stop once a cycle has installed and relaunched a new release.
    ///
    /// Used when the updated package is this process, so the relaunched
    /// process takes over.
    pub fn with_stop_after_relaunch(mut self, stop_after_relaunch: bool) -> Self {
        self.stop_after_relaunch = stop_after_relaunch;
        self
    }

    /// Run one cycle now.
    pub async fn invoke(&self) -> Result<CycleOutcome, UpdateError> {
        self.coordinator.run_update_cycle().await
    }

    /// Run cycles until `shutdown` completes. Returns the number of cycles run.
    pub async fn run_until<F>(&self, shutdown: F) -> usize
    where
        F: Future<Output = ()>,
    {
        let start = if self.run_immediately {
            Instant::now()
        } else {
            Instant::now() + self.interval
        };
        let mut ticker = tokio::time::interval_at(start, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        info!("Checking for updates every {}s", self.interval.as_secs());
        tokio::pin!(shutdown);

        let mut cycles = 0;
        loop {
            tokio::select! {
                () = &mut shutdown => {
                    debug!("Shutdown requested after {cycles} cycle(s)");
                    break;
                }
                _ = ticker.tick() => {
                    let result = self.invoke().await;
                    cycles += 1;
                    match result {
                        Ok(CycleOutcome::Updated { relaunched: true, .. })
                            if self.stop_after_relaunch =>
                        {
                            info!("Relaunched into the new release, stopping");
                            break;
                        }
                        Ok(_) => {}
                        // Failures are already logged by the coordinator
                        Err(e) => warn!("Will retry at the next interval: {e}"),
                    }
                }
            }
        }
        cycles
    }
}
