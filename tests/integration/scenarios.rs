//! End-to-end update cycles with fake platform collaborators.

use appupdate::config::UpdateConfig;
use appupdate::core::{FetchError, InstallError, UpdateError};
use appupdate::platform::{
    Downloader, InstallCallback, PackageInstaller, Platform, SessionId, SessionWriter,
};
use appupdate::test_utils::{
    DownloadBehavior, FakeDownloader, FakeInstaller, FakeLauncher, FakeRegistry,
    init_test_logging, test_config,
};
use appupdate::update::signal::SignalHub;
use appupdate::update::{CycleOutcome, CycleState, InstallStatus, UpdateCoordinator};
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use tempfile::TempDir;

const NEW_BUILD: &[u8] = b"release 5";

struct Harness {
    _temp_dir: TempDir,
    server: mockito::ServerGuard,
    _descriptor: Option<mockito::Mock>,
    config: UpdateConfig,
    downloader: Arc<FakeDownloader>,
    installer: Arc<FakeInstaller>,
    launcher: Arc<FakeLauncher>,
}

impl Harness {
    async fn new() -> Self {
        init_test_logging(None);
        let temp_dir = TempDir::new().unwrap();
        let server = mockito::Server::new_async().await;
        let config = test_config(&server.url(), temp_dir.path());
        Self {
            _temp_dir: temp_dir,
            server,
            _descriptor: None,
            config,
            downloader: Arc::new(FakeDownloader::new(DownloadBehavior::Succeed(NEW_BUILD.to_vec()))),
            installer: Arc::new(FakeInstaller::new(InstallStatus::Success.code())),
            launcher: Arc::new(FakeLauncher::new()),
        }
    }

    async fn remote_version(mut self, version_code: i64) -> Self {
        let mock = self
            .server
            .mock("GET", "/version.json")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(format!(r#"{{"version_code": {version_code}}}"#))
            .create_async()
            .await;
        self._descriptor = Some(mock);
        self
    }

    fn artifact_path(&self) -> PathBuf {
        self.config.artifact_path().unwrap()
    }

    fn cache_artifact(&self, bytes: &[u8]) {
        let path = self.artifact_path();
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, bytes).unwrap();
    }

    fn platform(&self, local: i64) -> Platform {
        Platform {
            registry: Arc::new(FakeRegistry::new(&self.config.package, local)),
            downloader: self.downloader.clone(),
            installer: self.installer.clone(),
            launcher: self.launcher.clone(),
        }
    }

    fn coordinator(&self, local: i64) -> UpdateCoordinator {
        UpdateCoordinator::new(self.platform(local), &self.config).unwrap()
    }

    fn assert_no_listener_leaks(&self) {
        let downloads = self.downloader.completion_signals().stats();
        assert_eq!(downloads.registered, downloads.unregistered, "download listeners leaked");
        let installs = self.installer.status_signals().stats();
        assert_eq!(installs.registered, installs.unregistered, "install listeners leaked");
    }
}

#[tokio::test]
async fn test_newer_version_is_downloaded_installed_and_relaunched() {
    let harness = Harness::new().await.remote_version(5).await;
    let coordinator = harness.coordinator(4);

    let outcome = coordinator.run_update_cycle().await.unwrap();

    assert_eq!(
        outcome,
        CycleOutcome::Updated {
            version_code: 5,
            relaunched: true
        }
    );
    assert_eq!(harness.downloader.enqueued().len(), 1);
    assert_eq!(harness.installer.committed(), vec![NEW_BUILD.to_vec()]);
    assert!(!harness.artifact_path().exists(), "artifact should be removed after install");
    assert_eq!(harness.launcher.started().len(), 1);
    assert_eq!(harness.downloader.completion_signals().stats().registered, 1);
    assert_eq!(harness.installer.status_signals().stats().registered, 1);
    harness.assert_no_listener_leaks();
}

#[tokio::test]
async fn test_equal_version_does_nothing() {
    let harness = Harness::new().await.remote_version(4).await;
    let coordinator = harness.coordinator(4);

    let outcome = coordinator.run_update_cycle().await.unwrap();

    assert_eq!(
        outcome,
        CycleOutcome::NoUpdate {
            local: 4,
            remote: 4
        }
    );
    assert!(harness.downloader.enqueued().is_empty());
    assert!(harness.installer.committed().is_empty());
    assert!(harness.launcher.started().is_empty());
}

#[tokio::test]
async fn test_older_remote_version_is_not_installed() {
    let harness = Harness::new().await.remote_version(3).await;
    let coordinator = harness.coordinator(4);

    let outcome = coordinator.run_update_cycle().await.unwrap();
    assert!(matches!(outcome, CycleOutcome::NoUpdate { .. }));
    assert!(harness.installer.committed().is_empty());
}

#[tokio::test]
async fn test_cached_artifact_is_installed_without_download() {
    let harness = Harness::new().await.remote_version(5).await;
    harness.cache_artifact(b"cached release");
    let coordinator = harness.coordinator(4);

    coordinator.run_update_cycle().await.unwrap();

    assert!(harness.downloader.enqueued().is_empty());
    assert_eq!(harness.installer.committed(), vec![b"cached release".to_vec()]);
    assert!(!harness.artifact_path().exists());
    assert_eq!(harness.downloader.completion_signals().stats().registered, 0);
}

#[tokio::test]
async fn test_storage_failure_keeps_artifact() {
    let mut harness = Harness::new().await.remote_version(5).await;
    harness.installer = Arc::new(FakeInstaller::new(InstallStatus::Storage.code()));
    let coordinator = harness.coordinator(4);

    let err = coordinator.run_update_cycle().await.unwrap_err();

    assert_eq!(err.to_string(), "Installation failed due to storage issues.");
    assert!(matches!(
        err,
        UpdateError::Install(InstallError::PlatformFailure {
            status: InstallStatus::Storage,
            ..
        })
    ));
    assert!(harness.artifact_path().exists(), "artifact must be kept for the next cycle");
    assert!(harness.launcher.started().is_empty());
    assert_eq!(coordinator.state(), CycleState::Idle);
    harness.assert_no_listener_leaks();
}

#[tokio::test]
async fn test_pending_user_action_fails_the_cycle() {
    let mut harness = Harness::new().await.remote_version(5).await;
    harness.installer = Arc::new(FakeInstaller::new(InstallStatus::PendingUserAction.code()));
    let coordinator = harness.coordinator(4);

    let err = coordinator.run_update_cycle().await.unwrap_err();
    assert_eq!(err.to_string(), "Installation pending user action.");
    assert!(harness.launcher.started().is_empty());
}

#[tokio::test]
async fn test_failed_install_is_retried_from_cache() {
    let harness = Harness::new().await.remote_version(5).await;
    harness.installer.set_status(InstallStatus::Conflict.code());
    let coordinator = harness.coordinator(4);

    let err = coordinator.run_update_cycle().await.unwrap_err();
    assert_eq!(err.to_string(), "Installation conflict.");
    assert!(harness.artifact_path().exists());

    harness.installer.set_status(InstallStatus::Success.code());
    let outcome = coordinator.run_update_cycle().await.unwrap();

    assert!(matches!(outcome, CycleOutcome::Updated { version_code: 5, .. }));
    assert_eq!(harness.downloader.enqueued().len(), 1, "second cycle must not download again");
    assert_eq!(harness.installer.committed().len(), 2);
    assert!(!harness.artifact_path().exists());
    harness.assert_no_listener_leaks();
}

#[tokio::test]
async fn test_unresolved_download_stops_before_install() {
    let mut harness = Harness::new().await.remote_version(5).await;
    harness.downloader = Arc::new(FakeDownloader::new(DownloadBehavior::Unresolved));
    let coordinator = harness.coordinator(4);

    let err = coordinator.run_update_cycle().await.unwrap_err();

    assert!(matches!(err, UpdateError::Fetch(FetchError::DownloadUnresolved { .. })));
    assert!(harness.installer.committed().is_empty());
    assert_eq!(harness.installer.open_sessions(), 0);
    assert_eq!(harness.installer.status_signals().stats().registered, 0);
    harness.assert_no_listener_leaks();
}

#[tokio::test]
async fn test_stream_failure_abandons_session_and_keeps_artifact() {
    let mut harness = Harness::new().await.remote_version(5).await;
    harness.installer = Arc::new(FakeInstaller::new(0).with_stream_failure());
    let coordinator = harness.coordinator(4);

    let err = coordinator.run_update_cycle().await.unwrap_err();

    assert!(matches!(err, UpdateError::Install(InstallError::StreamFailed { .. })));
    assert_eq!(harness.installer.abandoned().len(), 1);
    assert_eq!(harness.installer.open_sessions(), 0);
    assert!(harness.artifact_path().exists());
}

#[tokio::test]
async fn test_unreachable_descriptor_is_network_error() {
    // No descriptor mock is registered, so the server answers 501
    let harness = Harness::new().await;
    let coordinator = harness.coordinator(4);

    let err = coordinator.run_update_cycle().await.unwrap_err();
    assert!(matches!(err, UpdateError::Fetch(FetchError::Network { .. })));
    assert!(harness.downloader.enqueued().is_empty());
}

#[tokio::test]
async fn test_relaunch_failure_is_not_fatal() {
    let mut harness = Harness::new().await.remote_version(5).await;
    harness.launcher = Arc::new(FakeLauncher::new().with_start_failure());
    let coordinator = harness.coordinator(4);

    let outcome = coordinator.run_update_cycle().await.unwrap();
    assert_eq!(
        outcome,
        CycleOutcome::Updated {
            version_code: 5,
            relaunched: false
        }
    );
    assert!(!harness.artifact_path().exists());
}

/// Installer that turns the artifact path into a directory while committing,
/// so the coordinator's cleanup cannot delete it.
struct BlockingCleanupInstaller {
    inner: FakeInstaller,
    artifact: PathBuf,
}

impl PackageInstaller for BlockingCleanupInstaller {
    fn create_session(&self, package: &str) -> io::Result<SessionId> {
        self.inner.create_session(package)
    }

    fn open_write(&self, session: SessionId) -> io::Result<SessionWriter> {
        self.inner.open_write(session)
    }

    fn commit(&self, session: SessionId, callback: InstallCallback) -> io::Result<()> {
        std::fs::remove_file(&self.artifact)?;
        std::fs::create_dir_all(self.artifact.join("occupied"))?;
        self.inner.commit(session, callback)
    }

    fn abandon(&self, session: SessionId) {
        self.inner.abandon(session);
    }

    fn status_signals(&self) -> &SignalHub<appupdate::platform::InstallStatusEvent> {
        self.inner.status_signals()
    }
}

#[tokio::test]
async fn test_cleanup_failure_does_not_change_outcome() {
    let harness = Harness::new().await.remote_version(5).await;
    let installer = Arc::new(BlockingCleanupInstaller {
        inner: FakeInstaller::new(0),
        artifact: harness.artifact_path(),
    });
    let platform = Platform {
        installer: installer.clone(),
        ..harness.platform(4)
    };
    let coordinator = UpdateCoordinator::new(platform, &harness.config).unwrap();

    let outcome = coordinator.run_update_cycle().await.unwrap();

    assert!(matches!(outcome, CycleOutcome::Updated { version_code: 5, .. }));
    assert!(harness.artifact_path().is_dir());
    assert_eq!(installer.inner.committed(), vec![NEW_BUILD.to_vec()]);
}

#[tokio::test]
async fn test_overlapping_cycles_install_once() {
    let harness = Harness::new().await.remote_version(5).await;
    let coordinator = Arc::new(harness.coordinator(4));

    let (first, second) = tokio::join!(coordinator.run_update_cycle(), coordinator.run_update_cycle());

    // The fake registry still reports version 4, so both cycles install; they
    // must do so one after the other without sharing listeners.
    assert!(first.is_ok());
    assert!(second.is_ok());
    assert_eq!(harness.installer.committed().len(), 2);
    assert_eq!(harness.downloader.enqueued().len(), 2);
    harness.assert_no_listener_leaks();
}
