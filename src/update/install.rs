//! Streaming an artifact into the platform installer and awaiting its verdict.

use super::fetcher::UpdateArtifact;
use crate::constants::STREAM_BUFFER_SIZE;
use crate::core::InstallError;
use crate::platform::{InstallCallback, InstallStatusEvent, PackageInstaller, SessionId};
use std::io;
use std::sync::Arc;
use tokio::fs::File;
use tokio::io::{AsyncWriteExt, BufReader};
use tracing::{debug, info, warn};

/// Status reported by the platform installer for a committed session.
///
/// The numeric codes follow the platform installer convention; anything
/// outside the known range is kept as [`InstallStatus::Unknown`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstallStatus {
    /// The user must confirm before the install proceeds (`-1`)
    PendingUserAction,
    /// Installed (`0`)
    Success,
    /// Generic failure (`1`)
    Failure,
    /// Blocked by policy (`2`)
    Blocked,
    /// Aborted (`3`)
    Aborted,
    /// The package is invalid (`4`)
    Invalid,
    /// Conflicts with an installed package (`5`)
    Conflict,
    /// Not enough storage or an I/O failure (`6`)
    Storage,
    /// Incompatible with this system (`7`)
    Incompatible,
    /// Any other code
    Unknown(i32),
}

impl InstallStatus {
    /// Map a platform status code.
    pub fn from_code(code: i32) -> Self {
        match code {
            -1 => Self::PendingUserAction,
            0 => Self::Success,
            1 => Self::Failure,
            2 => Self::Blocked,
            3 => Self::Aborted,
            4 => Self::Invalid,
            5 => Self::Conflict,
            6 => Self::Storage,
            7 => Self::Incompatible,
            other => Self::Unknown(other),
        }
    }

    /// Platform status code.
    pub fn code(self) -> i32 {
        match self {
            Self::PendingUserAction => -1,
            Self::Success => 0,
            Self::Failure => 1,
            Self::Blocked => 2,
            Self::Aborted => 3,
            Self::Invalid => 4,
            Self::Conflict => 5,
            Self::Storage => 6,
            Self::Incompatible => 7,
            Self::Unknown(code) => code,
        }
    }

    /// User-facing message.
    pub fn message(self) -> &'static str {
        match self {
            Self::Success => "Installation successful.",
            Self::Failure => "Installation failed.",
            Self::Aborted => "Installation aborted.",
            Self::Blocked => "Installation blocked.",
            Self::Conflict => "Installation conflict.",
            Self::Incompatible => "Installation incompatible.",
            Self::Invalid => "Installation invalid.",
            Self::Storage => "Installation failed due to storage issues.",
            Self::PendingUserAction => "Installation pending user action.",
            Self::Unknown(_) => "Unknown installation status.",
        }
    }

    /// Only [`InstallStatus::Success`] counts; pending user action does not.
    pub fn is_success(self) -> bool {
        self == Self::Success
    }
}

impl std::fmt::Display for InstallStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.message())
    }
}

/// Result of an install, consumed once by the coordinator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstallOutcome {
    /// The package was installed
    Success,
    /// The package was not installed, with the mapped reason
    Failure(String),
}

impl From<InstallStatus> for InstallOutcome {
    fn from(status: InstallStatus) -> Self {
        if status.is_success() {
            Self::Success
        } else {
            Self::Failure(status.message().to_string())
        }
    }
}

/// Hands an artifact to the platform installer.
pub struct InstallSession {
    installer: Arc<dyn PackageInstaller>,
    package: String,
}

impl InstallSession {
    /// Install stage for `package`.
    pub fn new(installer: Arc<dyn PackageInstaller>, package: impl Into<String>) -> Self {
        Self {
            installer,
            package: package.into(),
        }
    }

    /// Stream `artifact` into a new session, commit it and wait for the result.
    ///
    /// The artifact file is only read; deleting it is up to the caller.
    pub async fn install(&self, artifact: &UpdateArtifact) -> Result<(), InstallError> {
        let session = self.installer.create_session(&self.package).map_err(|e| {
            InstallError::SessionUnavailable {
                package: self.package.clone(),
                reason: e.to_string(),
            }
        })?;
        debug!("Opened install {session} for {}", self.package);

        if let Err(source) = self.stream(session, artifact).await {
            warn!("Streaming into install {session} failed: {source}");
            self.installer.abandon(session);
            return Err(InstallError::StreamFailed {
                source,
            });
        }

        let hub = self.installer.status_signals();
        let mut registration = hub.register();

        if let Err(e) = self.installer.commit(session, InstallCallback::new(session, hub.clone())) {
            registration.unregister();
            self.installer.abandon(session);
            return Err(InstallError::PlatformFailure {
                status: InstallStatus::Failure,
                reason: format!("{} ({e})", InstallStatus::Failure.message()),
            });
        }
        info!("Committed install {session}, waiting for the installer");

        let event = registration.recv_matching(|event: &InstallStatusEvent| event.session == session).await;
        registration.unregister();

        let event = event.ok_or(InstallError::SignalLost)?;
        let status = InstallStatus::from_code(event.status_code);
        debug!("Install {session} reported {status:?} via {:?}", event.kind);

        match InstallOutcome::from(status) {
            InstallOutcome::Success => {
                info!("{}", status.message());
                Ok(())
            }
            InstallOutcome::Failure(reason) => Err(InstallError::PlatformFailure {
                status,
                reason,
            }),
        }
    }

    async fn stream(&self, session: SessionId, artifact: &UpdateArtifact) -> io::Result<u64> {
        let file = File::open(artifact.source.path()).await?;
        let mut reader = BufReader::with_capacity(STREAM_BUFFER_SIZE, file);
        let mut writer = self.installer.open_write(session)?;

        let copied = tokio::io::copy_buf(&mut reader, &mut writer).await?;
        writer.shutdown().await?;
        debug!("Streamed {copied} bytes into install {session}");
        Ok(copied)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::ContentHandle;
    use crate::test_utils::FakeInstaller;
    use tempfile::TempDir;

    fn artifact(temp_dir: &TempDir) -> UpdateArtifact {
        let path = temp_dir.path().join("app.pkg");
        std::fs::write(&path, b"package bytes").unwrap();
        UpdateArtifact {
            local_path: path.clone(),
            source: ContentHandle::from_path(path),
        }
    }

    #[test]
    fn test_status_codes_round_trip() {
        for code in -1..=7 {
            assert_eq!(InstallStatus::from_code(code).code(), code);
        }
        assert_eq!(InstallStatus::from_code(42), InstallStatus::Unknown(42));
    }

    #[test]
    fn test_status_messages() {
        assert_eq!(InstallStatus::Success.message(), "Installation successful.");
        assert_eq!(
            InstallStatus::Storage.message(),
            "Installation failed due to storage issues."
        );
        assert_eq!(
            InstallStatus::PendingUserAction.message(),
            "Installation pending user action."
        );
        assert_eq!(InstallStatus::Unknown(99).message(), "Unknown installation status.");
    }

    #[test]
    fn test_pending_user_action_is_failure() {
        assert_eq!(
            InstallOutcome::from(InstallStatus::PendingUserAction),
            InstallOutcome::Failure("Installation pending user action.".to_string())
        );
        assert_eq!(InstallOutcome::from(InstallStatus::Success), InstallOutcome::Success);
    }

    #[tokio::test]
    async fn test_successful_install() {
        let temp_dir = TempDir::new().unwrap();
        let installer = Arc::new(FakeInstaller::new(InstallStatus::Success.code()));
        let session = InstallSession::new(installer.clone(), "app");

        session.install(&artifact(&temp_dir)).await.unwrap();

        assert_eq!(installer.committed(), vec![b"package bytes".to_vec()]);
        assert!(installer.abandoned().is_empty());
        let stats = installer.status_signals().stats();
        assert_eq!(stats.registered, 1);
        assert_eq!(stats.unregistered, 1);
    }

    #[tokio::test]
    async fn test_platform_failure_maps_reason() {
        let temp_dir = TempDir::new().unwrap();
        let installer = Arc::new(FakeInstaller::new(InstallStatus::Storage.code()));
        let session = InstallSession::new(installer.clone(), "app");

        let err = session.install(&artifact(&temp_dir)).await.unwrap_err();
        match err {
            InstallError::PlatformFailure { status, reason } => {
                assert_eq!(status, InstallStatus::Storage);
                assert_eq!(reason, "Installation failed due to storage issues.");
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(installer.status_signals().stats().active(), 0);
        assert_eq!(installer.status_signals().stats().unregistered, 1);
    }

    #[tokio::test]
    async fn test_stream_failure_abandons_session() {
        let temp_dir = TempDir::new().unwrap();
        let installer = Arc::new(FakeInstaller::new(0).with_stream_failure());
        let session = InstallSession::new(installer.clone(), "app");

        let err = session.install(&artifact(&temp_dir)).await.unwrap_err();
        assert!(matches!(err, InstallError::StreamFailed { .. }));
        assert_eq!(installer.abandoned().len(), 1);
        assert!(installer.committed().is_empty());
        assert_eq!(installer.status_signals().stats().registered, 0);
    }

    #[tokio::test]
    async fn test_missing_artifact_is_stream_failure() {
        let temp_dir = TempDir::new().unwrap();
        let installer = Arc::new(FakeInstaller::new(0));
        let session = InstallSession::new(installer.clone(), "app");
        let missing = temp_dir.path().join("gone.pkg");

        let err = session
            .install(&UpdateArtifact {
                local_path: missing.clone(),
                source: ContentHandle::from_path(missing),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, InstallError::StreamFailed { .. }));
        assert_eq!(installer.abandoned().len(), 1);
    }

    #[tokio::test]
    async fn test_session_refused() {
        let temp_dir = TempDir::new().unwrap();
        let installer = Arc::new(FakeInstaller::new(0).with_session_refused());
        let session = InstallSession::new(installer.clone(), "app");

        let err = session.install(&artifact(&temp_dir)).await.unwrap_err();
        assert!(matches!(err, InstallError::SessionUnavailable { .. }));
    }
}
