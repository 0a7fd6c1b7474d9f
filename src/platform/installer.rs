//! Directory-based package installer.
//!
//! A session stages the package bytes under `<install_dir>/.staging`.
//! Committing moves the staged file over `<install_dir>/<package>` with a
//! single rename on a background task and reports the result through the
//! session's [`InstallCallback`], the way a platform installer answers a
//! commit asynchronously.

use super::{
    InstallCallback, InstallEventKind, InstallStatusEvent, PackageInstaller, SessionId,
    SessionWriter,
};
use crate::constants::STAGING_DIR_NAME;
use crate::update::InstallStatus;
use crate::update::signal::SignalHub;
use dashmap::DashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::fs;
use tracing::{debug, info, warn};

#[derive(Debug, Clone)]
struct StagedSession {
    package: String,
    staging_path: PathBuf,
}

/// Installs packages as files in a directory.
pub struct DirectoryInstaller {
    install_dir: PathBuf,
    next_session: AtomicU64,
    sessions: DashMap<SessionId, StagedSession>,
    signals: SignalHub<InstallStatusEvent>,
}

impl DirectoryInstaller {
    /// Installer placing packages into `install_dir`.
    pub fn new(install_dir: PathBuf) -> Self {
        Self {
            install_dir,
            next_session: AtomicU64::new(1),
            sessions: DashMap::new(),
            signals: SignalHub::new("install-status"),
        }
    }

    /// Path a package is installed to.
    pub fn target_path(&self, package: &str) -> PathBuf {
        self.install_dir.join(format!("{package}{}", std::env::consts::EXE_SUFFIX))
    }

    fn staging_dir(&self) -> PathBuf {
        self.install_dir.join(STAGING_DIR_NAME)
    }

    fn session(&self, session: SessionId) -> io::Result<StagedSession> {
        self.sessions.get(&session).map(|entry| entry.value().clone()).ok_or_else(|| {
            io::Error::new(io::ErrorKind::NotFound, format!("unknown install {session}"))
        })
    }
}

impl PackageInstaller for DirectoryInstaller {
    fn create_session(&self, package: &str) -> io::Result<SessionId> {
        if package.is_empty() || package.contains(['/', '\\']) || package.starts_with('.') {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("invalid package identity '{package}'"),
            ));
        }

        let staging_dir = self.staging_dir();
        std::fs::create_dir_all(&staging_dir)?;

        let session = SessionId(self.next_session.fetch_add(1, Ordering::Relaxed));
        let staging_path = staging_dir.join(format!("{package}-{}.pkg", uuid::Uuid::new_v4()));
        debug!("Created install {session} for '{package}' at {}", staging_path.display());

        self.sessions.insert(
            session,
            StagedSession {
                package: package.to_string(),
                staging_path,
            },
        );
        Ok(session)
    }

    fn open_write(&self, session: SessionId) -> io::Result<SessionWriter> {
        let staged = self.session(session)?;
        let file = std::fs::File::create(&staged.staging_path)?;
        Ok(Box::pin(fs::File::from_std(file)))
    }

    fn commit(&self, session: SessionId, callback: InstallCallback) -> io::Result<()> {
        let runtime = tokio::runtime::Handle::try_current().map_err(io::Error::other)?;
        let (_, staged) = self.sessions.remove(&session).ok_or_else(|| {
            io::Error::new(io::ErrorKind::NotFound, format!("unknown install {session}"))
        })?;

        let target = self.target_path(&staged.package);
        info!("Committing install {session} to {}", target.display());

        runtime.spawn(async move {
            let replacing = fs::try_exists(&target).await.unwrap_or(false);
            let status = match finalize(&staged.staging_path, &target).await {
                Ok(()) => InstallStatus::Success,
                Err(e) => {
                    warn!("Install {session} failed: {e}");
                    discard(&staged.staging_path).await;
                    if e.kind() == io::ErrorKind::InvalidData {
                        InstallStatus::Invalid
                    } else {
                        InstallStatus::Storage
                    }
                }
            };

            let kind = match (status, replacing) {
                (InstallStatus::Success, true) => InstallEventKind::PackageReplaced,
                (InstallStatus::Success, false) => InstallEventKind::PackageAdded,
                _ => InstallEventKind::SessionCommitted,
            };
            callback.deliver(kind, status.code());
        });

        Ok(())
    }

    fn abandon(&self, session: SessionId) {
        if let Some((_, staged)) = self.sessions.remove(&session) {
            debug!("Abandoning install {session}");
            if let Err(e) = std::fs::remove_file(&staged.staging_path) {
                if e.kind() != io::ErrorKind::NotFound {
                    warn!("Failed to remove staged package {}: {e}", staged.staging_path.display());
                }
            }
        }
    }

    fn status_signals(&self) -> &SignalHub<InstallStatusEvent> {
        &self.signals
    }
}

async fn finalize(staging_path: &Path, target: &Path) -> io::Result<()> {
    let staged = fs::metadata(staging_path).await?;
    if staged.len() == 0 {
        return Err(io::Error::new(io::ErrorKind::InvalidData, "staged package is empty"));
    }

    // Preserve the mode of the package being replaced, default to executable
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;

        let mode = match fs::metadata(target).await {
            Ok(existing) => existing.permissions().mode(),
            Err(_) => 0o755,
        };
        fs::set_permissions(staging_path, std::fs::Permissions::from_mode(mode)).await?;
    }

    // A running executable cannot be overwritten on Windows, only renamed
    #[cfg(windows)]
    {
        if fs::try_exists(target).await.unwrap_or(false) {
            let mut previous = target.as_os_str().to_owned();
            previous.push(".old");
            let previous = PathBuf::from(previous);
            let _ = fs::remove_file(&previous).await;
            fs::rename(target, &previous).await?;
        }
    }

    fs::rename(staging_path, target).await
}

async fn discard(staging_path: &Path) {
    if let Err(e) = fs::remove_file(staging_path).await {
        if e.kind() != io::ErrorKind::NotFound {
            debug!("Failed to remove staged package {}: {e}", staging_path.display());
        }
    }
}
