//! Platform collaborators of the update pipeline.
//!
//! The update core never talks to the operating system directly. It drives
//! four capabilities, each behind a small object-safe trait:
//!
//! - [`PackageRegistry`] - reports the installed version of a package
//! - [`Downloader`] - accepts download requests and announces completion on a [`SignalHub`]
//! - [`PackageInstaller`] - stages an install session and reports its result on a [`SignalHub`]
//! - [`Launcher`] - resolves and starts the application's launch entry point
//!
//! The host implementations in the submodules make the agent work on a
//! desktop system. Tests substitute the fakes from `test_utils`.

pub mod download;
pub mod installer;
pub mod launcher;
pub mod registry;

pub use download::HttpDownloader;
pub use installer::DirectoryInstaller;
pub use launcher::{CurrentProcess, ProcessLauncher};
pub use registry::BuildInfoRegistry;

use crate::config::UpdateConfig;
use crate::update::signal::SignalHub;
use anyhow::{Context, Result};
use std::io;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWrite;

/// Identifier the downloader assigns to an enqueued request.
pub type DownloadId = u64;

/// Network types a download may use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NetworkTypes {
    /// Wi-Fi connections are allowed
    pub wifi: bool,
    /// Mobile data connections are allowed
    pub mobile: bool,
}

impl NetworkTypes {
    /// Wi-Fi or mobile data.
    pub const WIFI_OR_MOBILE: Self = Self {
        wifi: true,
        mobile: true,
    };
}

/// Whether the downloader shows progress to the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationVisibility {
    /// Progress is shown
    Visible,
    /// The download runs silently
    Hidden,
}

/// A request handed to a [`Downloader`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadRequest {
    /// Remote location of the artifact
    pub url: String,
    /// Where the finished file must end up
    pub destination: PathBuf,
    /// Allowed network types
    pub network_types: NetworkTypes,
    /// Progress visibility
    pub notification: NotificationVisibility,
}

/// Broadcast by a [`Downloader`] when a request finishes, successfully or not.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadComplete {
    /// The finished request
    pub download_id: DownloadId,
}

/// Opaque reference to readable package content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentHandle(PathBuf);

impl ContentHandle {
    /// Handle for a file on local storage.
    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        Self(path.into())
    }

    /// Location the content can be read from.
    pub fn path(&self) -> &Path {
        &self.0
    }
}

/// Identifier of an install session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId(pub u64);

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "session-{}", self.0)
    }
}

/// Which installer event carried a status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstallEventKind {
    /// The session was committed
    SessionCommitted,
    /// The package was newly added
    PackageAdded,
    /// An existing package was replaced
    PackageReplaced,
}

/// Install result broadcast by a [`PackageInstaller`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallStatusEvent {
    /// Session the result belongs to
    pub session: SessionId,
    /// Event that carried the result
    pub kind: InstallEventKind,
    /// Platform status code, see [`InstallStatus`](crate::update::InstallStatus)
    pub status_code: i32,
}

/// Callback target handed to [`PackageInstaller::commit`].
///
/// The installer calls [`deliver`](Self::deliver) once the commit has a result.
#[derive(Debug, Clone)]
pub struct InstallCallback {
    session: SessionId,
    hub: SignalHub<InstallStatusEvent>,
}

impl InstallCallback {
    /// Callback that reports results for `session` on `hub`.
    pub fn new(session: SessionId, hub: SignalHub<InstallStatusEvent>) -> Self {
        Self { session, hub }
    }

    /// Session this callback belongs to.
    pub fn session(&self) -> SessionId {
        self.session
    }

    /// Report the commit result.
    pub fn deliver(self, kind: InstallEventKind, status_code: i32) {
        self.hub.broadcast(InstallStatusEvent {
            session: self.session,
            kind,
            status_code,
        });
    }
}

/// Writer that receives the package bytes of a session.
pub type SessionWriter = Pin<Box<dyn AsyncWrite + Send>>;

/// How to start the application.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchTarget {
    /// Executable to start
    pub program: PathBuf,
    /// Arguments passed to it
    pub args: Vec<String>,
}

/// Installed package metadata.
pub trait PackageRegistry: Send + Sync {
    /// Version code of the installed `package`.
    fn installed_version(&self, package: &str) -> io::Result<i64>;

    /// Note that `version_code` of `package` was just installed.
    ///
    /// Platforms whose installer updates package metadata itself keep the
    /// default, which does nothing.
    fn record_installed(&self, package: &str, version_code: i64) -> io::Result<()> {
        let _ = (package, version_code);
        Ok(())
    }
}

/// Asynchronous download service.
pub trait Downloader: Send + Sync {
    /// Queue a download; completion is broadcast on [`completion_signals`](Self::completion_signals).
    fn enqueue(&self, request: DownloadRequest) -> io::Result<DownloadId>;

    /// Resolve a finished download to its content, `None` if it failed.
    fn resolve_content_handle(&self, download_id: DownloadId) -> Option<ContentHandle>;

    /// Hub announcing finished downloads.
    fn completion_signals(&self) -> &SignalHub<DownloadComplete>;
}

/// Transactional package installer.
pub trait PackageInstaller: Send + Sync {
    /// Open a full-install session scoped to `package`.
    fn create_session(&self, package: &str) -> io::Result<SessionId>;

    /// Writer for the package content of `session`.
    fn open_write(&self, session: SessionId) -> io::Result<SessionWriter>;

    /// Commit `session`; the result is delivered later through `callback`.
    fn commit(&self, session: SessionId, callback: InstallCallback) -> io::Result<()>;

    /// Discard a session that will not be committed.
    fn abandon(&self, session: SessionId);

    /// Hub the commit results are broadcast on.
    fn status_signals(&self) -> &SignalHub<InstallStatusEvent>;
}

/// Application launcher.
pub trait Launcher: Send + Sync {
    /// Launch entry point of `package`, if it has one.
    fn launch_entry_point(&self, package: &str) -> Option<LaunchTarget>;

    /// Start `target` as a new process.
    fn start(&self, target: &LaunchTarget) -> io::Result<()>;
}

/// The set of collaborators an update coordinator drives.
#[derive(Clone)]
pub struct Platform {
    /// Installed version lookup
    pub registry: Arc<dyn PackageRegistry>,
    /// Download service
    pub downloader: Arc<dyn Downloader>,
    /// Package installer
    pub installer: Arc<dyn PackageInstaller>,
    /// Relaunch support
    pub launcher: Arc<dyn Launcher>,
}

impl Platform {
    /// Host implementations configured from `config`.
    pub fn host(config: &UpdateConfig) -> Result<Self> {
        let install_dir = config.install_dir()?;
        let client = download_client(config.request_timeout())?;
        let registry = BuildInfoRegistry::from_config(config)
            .context("Failed to determine the installed version")?;

        Ok(Self {
            registry: Arc::new(registry),
            downloader: Arc::new(HttpDownloader::new(client)),
            installer: Arc::new(DirectoryInstaller::new(install_dir.clone())),
            launcher: Arc::new(
                ProcessLauncher::new(install_dir, config.launch_command.clone())
                    .with_current_process(CurrentProcess::detect()),
            ),
        })
    }
}

/// HTTP client shared by the version check and the downloader.
pub fn http_client(timeout: Duration) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .user_agent(concat!("appupdate/", env!("CARGO_PKG_VERSION")))
        .timeout(timeout)
        .build()
        .context("Failed to build HTTP client")
}

/// HTTP client for artifact downloads.
///
/// Only connecting is bounded by `connect_timeout`; the transfer itself may
/// take as long as the network needs.
pub fn download_client(connect_timeout: Duration) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .user_agent(concat!("appupdate/", env!("CARGO_PKG_VERSION")))
        .connect_timeout(connect_timeout)
        .build()
        .context("Failed to build download client")
}
