//! The update cycle state machine.
//!
//! ```text
//! Idle -> CheckingVersion -> NoUpdate ------------------------------> Idle
//!                         -> Fetching -> Installing -> Succeeded ---> Idle
//!                                   \            \--> Failed ------> Idle
//!                                    \--------------> Failed ------> Idle
//! ```
//!
//! Each stage runs only when the previous one succeeded. The first failure
//! ends the cycle; the next trigger starts over from the version check.

use super::fetcher::{ArtifactFetcher, UpdateArtifact};
use super::install::InstallSession;
use super::verification::ChecksumVerifier;
use super::version::VersionOracle;
use crate::config::UpdateConfig;
use crate::core::{FetchError, UpdateError};
use crate::platform::{self, Launcher, Platform};
use anyhow::Result;
use chrono::{DateTime, Utc};
use std::io;
use std::sync::Arc;
use tokio::sync::{Mutex, watch};
use tracing::{debug, error, info, warn};

/// Where the coordinator currently is in a cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleState {
    /// No cycle running
    Idle,
    /// Fetching the descriptor and comparing versions
    CheckingVersion,
    /// The installed version is current
    NoUpdate,
    /// Making the artifact available locally
    Fetching,
    /// Handing the artifact to the installer
    Installing,
    /// Installed; cleanup and relaunch done
    Succeeded,
    /// A stage failed
    Failed,
}

/// Result of a cycle that did not fail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    /// Remote version is not newer than the installed one.
    NoUpdate {
        /// Installed version code
        local: i64,
        /// Remote version code
        remote: i64,
    },
    /// A new version was installed.
    Updated {
        /// Version code that was installed
        version_code: i64,
        /// Whether the application was started again
        relaunched: bool,
    },
}

/// Summary of the last finished cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleReport {
    /// When the cycle acquired the coordinator
    pub started_at: DateTime<Utc>,
    /// When it finished
    pub finished_at: DateTime<Utc>,
    /// Outcome, or the failure message
    pub result: Result<CycleOutcome, String>,
}

/// Sequences version check, fetch, install, cleanup and relaunch.
///
/// A coordinator runs at most one cycle at a time. A trigger arriving while
/// a cycle is in progress waits for it to finish and then runs its own cycle.
pub struct UpdateCoordinator {
    oracle: VersionOracle,
    fetcher: ArtifactFetcher,
    installer: InstallSession,
    launcher: Arc<dyn Launcher>,
    package: String,
    verify_checksum: bool,
    cycle_lock: Mutex<()>,
    state: watch::Sender<CycleState>,
    last_report: watch::Sender<Option<CycleReport>>,
}

impl UpdateCoordinator {
    /// Coordinator driving `platform` with the given settings.
    pub fn new(platform: Platform, config: &UpdateConfig) -> Result<Self> {
        let client = platform::http_client(config.request_timeout())?;
        let destination = config.artifact_path()?;

        Ok(Self {
            oracle: VersionOracle::new(
                client,
                config.descriptor_url.clone(),
                config.package.clone(),
                platform.registry,
            ),
            fetcher: ArtifactFetcher::new(
                platform.downloader,
                config.artifact_url.clone(),
                destination,
            ),
            installer: InstallSession::new(platform.installer, config.package.clone()),
            launcher: platform.launcher,
            package: config.package.clone(),
            verify_checksum: config.verify_checksum,
            cycle_lock: Mutex::new(()),
            state: watch::Sender::new(CycleState::Idle),
            last_report: watch::Sender::new(None),
        })
    }

    /// Coordinator backed by the host platform implementations.
    pub fn from_config(config: &UpdateConfig) -> Result<Self> {
        Self::new(Platform::host(config)?, config)
    }

    /// Current state.
    pub fn state(&self) -> CycleState {
        *self.state.borrow()
    }

    /// Receiver observing every state change.
    pub fn subscribe(&self) -> watch::Receiver<CycleState> {
        self.state.subscribe()
    }

    /// Report of the last finished cycle, if any.
    pub fn last_report(&self) -> Option<CycleReport> {
        self.last_report.borrow().clone()
    }

    /// Version stage, for callers that only want to check.
    pub fn oracle(&self) -> &VersionOracle {
        &self.oracle
    }

    /// Run one full update cycle.
    pub async fn run_update_cycle(&self) -> Result<CycleOutcome, UpdateError> {
        let _guard = match self.cycle_lock.try_lock() {
            Ok(guard) => guard,
            Err(_) => {
                info!("An update cycle is already running, waiting for it to finish");
                self.cycle_lock.lock().await
            }
        };

        let started_at = Utc::now();
        let result = self.run_stages().await;

        match &result {
            Ok(CycleOutcome::NoUpdate {
                local,
                remote,
            }) => info!("{} is up to date (installed {local}, available {remote})", self.package),
            Ok(CycleOutcome::Updated {
                version_code,
                relaunched,
            }) => info!("Updated {} to {version_code} (relaunched: {relaunched})", self.package),
            Err(e) => error!("Update cycle failed: {e}"),
        }

        self.last_report.send_replace(Some(CycleReport {
            started_at,
            finished_at: Utc::now(),
            result: result.as_ref().cloned().map_err(|e| e.to_string()),
        }));
        self.set_state(CycleState::Idle);
        result
    }

    async fn run_stages(&self) -> Result<CycleOutcome, UpdateError> {
        self.set_state(CycleState::CheckingVersion);
        let check = self.oracle.check().await.map_err(|e| self.fail(e))?;
        if !check.update_available() {
            self.set_state(CycleState::NoUpdate);
            return Ok(CycleOutcome::NoUpdate {
                local: check.local.version_code,
                remote: check.remote.version_code,
            });
        }

        self.set_state(CycleState::Fetching);
        let artifact = self.fetcher.ensure_local().await.map_err(|e| self.fail(e))?;
        if self.verify_checksum {
            if let Some(expected) = &check.remote.sha256 {
                self.verify(&artifact, expected).await.map_err(|e| self.fail(e))?;
            }
        }

        self.set_state(CycleState::Installing);
        if let Err(e) = self.installer.install(&artifact).await {
            warn!("Keeping {} for the next attempt", artifact.local_path.display());
            return Err(self.fail(e));
        }

        self.oracle.record_installed(check.remote.version_code);
        remove_artifact(&artifact).await;
        let relaunched = self.relaunch();
        self.set_state(CycleState::Succeeded);

        Ok(CycleOutcome::Updated {
            version_code: check.remote.version_code,
            relaunched,
        })
    }

    async fn verify(&self, artifact: &UpdateArtifact, expected: &str) -> Result<(), FetchError> {
        let actual = match ChecksumVerifier::verify_checksum(artifact.source.path(), expected).await {
            Ok(None) => return Ok(()),
            Ok(Some(actual)) => actual,
            Err(e) => format!("unreadable ({e})"),
        };

        // A corrupt artifact must not be reused by the next cycle
        remove_artifact(artifact).await;
        Err(FetchError::ChecksumMismatch {
            path: artifact.local_path.display().to_string(),
            expected: expected.to_string(),
            actual,
        })
    }

    fn relaunch(&self) -> bool {
        let Some(target) = self.launcher.launch_entry_point(&self.package) else {
            warn!("No launch entry point for {}, not relaunching", self.package);
            return false;
        };

        match self.launcher.start(&target) {
            Ok(()) => {
                info!("Relaunched {}", target.program.display());
                true
            }
            Err(e) => {
                warn!("Failed to relaunch {}: {e}", target.program.display());
                false
            }
        }
    }

    fn fail(&self, error: impl Into<UpdateError>) -> UpdateError {
        self.set_state(CycleState::Failed);
        error.into()
    }

    fn set_state(&self, state: CycleState) {
        let previous = self.state.send_replace(state);
        debug!("Update cycle state: {previous:?} -> {state:?}");
    }
}

async fn remove_artifact(artifact: &UpdateArtifact) {
    match tokio::fs::remove_file(&artifact.local_path).await {
        Ok(()) => debug!("Removed {}", artifact.local_path.display()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => warn!("Failed to remove {}: {e}", artifact.local_path.display()),
    }
}
