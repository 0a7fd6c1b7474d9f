//! In-memory stand-ins for the platform collaborators.
//!
//! Each fake answers synchronously: the downloader broadcasts completion and
//! the installer delivers its status from inside `enqueue` / `commit`. That
//! only works because the stages register their listener before starting the
//! operation, so the fakes double as a check of that ordering.

use crate::platform::{
    ContentHandle, DownloadComplete, DownloadId, DownloadRequest, Downloader, InstallCallback,
    InstallEventKind, InstallStatusEvent, LaunchTarget, Launcher, PackageInstaller,
    PackageRegistry, SessionId, SessionWriter,
};
use crate::update::signal::SignalHub;
use dashmap::DashMap;
use std::io;
use std::path::PathBuf;
use std::pin::Pin;
use std::sync::atomic::{AtomicI32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use tokio::io::AsyncWrite;

/// Registry reporting a fixed version for one package.
pub struct FakeRegistry {
    package: String,
    version_code: Option<i64>,
}

impl FakeRegistry {
    /// Registry where `package` is installed at `version_code`.
    pub fn new(package: impl Into<String>, version_code: i64) -> Self {
        Self {
            package: package.into(),
            version_code: Some(version_code),
        }
    }

    /// Registry that cannot read any metadata.
    pub fn unavailable() -> Self {
        Self {
            package: String::new(),
            version_code: None,
        }
    }
}

impl PackageRegistry for FakeRegistry {
    fn installed_version(&self, package: &str) -> io::Result<i64> {
        match self.version_code {
            Some(code) if package == self.package => Ok(code),
            _ => Err(io::Error::new(io::ErrorKind::NotFound, format!("{package} is not installed"))),
        }
    }
}

/// What [`FakeDownloader`] does with a request.
#[derive(Debug, Clone)]
pub enum DownloadBehavior {
    /// Write these bytes to the destination and resolve to it
    Succeed(Vec<u8>),
    /// Signal completion but resolve to no content
    Unresolved,
    /// Refuse the request
    RejectEnqueue,
}

/// Downloader completing every request immediately.
pub struct FakeDownloader {
    behavior: DownloadBehavior,
    foreign_signal: bool,
    next_id: AtomicU64,
    requests: Mutex<Vec<DownloadRequest>>,
    finished: DashMap<DownloadId, PathBuf>,
    signals: SignalHub<DownloadComplete>,
}

impl FakeDownloader {
    /// Downloader applying `behavior` to every request.
    pub fn new(behavior: DownloadBehavior) -> Self {
        Self {
            behavior,
            foreign_signal: false,
            next_id: AtomicU64::new(1),
            requests: Mutex::new(Vec::new()),
            finished: DashMap::new(),
            signals: SignalHub::new("fake-download-complete"),
        }
    }

    /// Also broadcast a completion for an unrelated download first.
    pub fn with_foreign_signal(mut self) -> Self {
        self.foreign_signal = true;
        self
    }

    /// Requests received so far.
    pub fn enqueued(&self) -> Vec<DownloadRequest> {
        self.requests.lock().unwrap().clone()
    }
}

impl Downloader for FakeDownloader {
    fn enqueue(&self, request: DownloadRequest) -> io::Result<DownloadId> {
        self.requests.lock().unwrap().push(request.clone());

        let download_id = self.next_id.fetch_add(1, Ordering::Relaxed);
        match &self.behavior {
            DownloadBehavior::RejectEnqueue => {
                return Err(io::Error::other("download queue unavailable"));
            }
            DownloadBehavior::Succeed(bytes) => {
                if let Some(parent) = request.destination.parent() {
                    std::fs::create_dir_all(parent)?;
                }
                std::fs::write(&request.destination, bytes)?;
                self.finished.insert(download_id, request.destination);
            }
            DownloadBehavior::Unresolved => {}
        }

        if self.foreign_signal {
            self.signals.broadcast(DownloadComplete {
                download_id: download_id + 1000,
            });
        }
        self.signals.broadcast(DownloadComplete {
            download_id,
        });
        Ok(download_id)
    }

    fn resolve_content_handle(&self, download_id: DownloadId) -> Option<ContentHandle> {
        self.finished.get(&download_id).map(|entry| ContentHandle::from_path(entry.value()))
    }

    fn completion_signals(&self) -> &SignalHub<DownloadComplete> {
        &self.signals
    }
}

struct BufferWriter(Arc<Mutex<Vec<u8>>>);

impl AsyncWrite for BufferWriter {
    fn poll_write(self: Pin<&mut Self>, _cx: &mut Context<'_>, buf: &[u8]) -> Poll<io::Result<usize>> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Poll::Ready(Ok(buf.len()))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }
}

struct FailingWriter;

impl AsyncWrite for FailingWriter {
    fn poll_write(self: Pin<&mut Self>, _cx: &mut Context<'_>, _buf: &[u8]) -> Poll<io::Result<usize>> {
        Poll::Ready(Err(io::Error::other("no space left on device")))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }
}

/// Installer answering every commit with a configurable status code.
///
/// Before the real result it broadcasts a result for an unrelated session,
/// which listeners must ignore.
pub struct FakeInstaller {
    status_code: AtomicI32,
    stream_failure: bool,
    refuse_sessions: bool,
    next_session: AtomicU64,
    buffers: DashMap<SessionId, Arc<Mutex<Vec<u8>>>>,
    committed: Mutex<Vec<Vec<u8>>>,
    abandoned: Mutex<Vec<SessionId>>,
    signals: SignalHub<InstallStatusEvent>,
}

impl FakeInstaller {
    /// Installer reporting `status_code` for every commit.
    pub fn new(status_code: i32) -> Self {
        Self {
            status_code: AtomicI32::new(status_code),
            stream_failure: false,
            refuse_sessions: false,
            next_session: AtomicU64::new(1),
            buffers: DashMap::new(),
            committed: Mutex::new(Vec::new()),
            abandoned: Mutex::new(Vec::new()),
            signals: SignalHub::new("fake-install-status"),
        }
    }

    /// Session writers fail on the first write.
    pub fn with_stream_failure(mut self) -> Self {
        self.stream_failure = true;
        self
    }

    /// `create_session` always fails.
    pub fn with_session_refused(mut self) -> Self {
        self.refuse_sessions = true;
        self
    }

    /// Change the status reported by later commits.
    pub fn set_status(&self, status_code: i32) {
        self.status_code.store(status_code, Ordering::SeqCst);
    }

    /// Payloads of committed sessions, in commit order.
    pub fn committed(&self) -> Vec<Vec<u8>> {
        self.committed.lock().unwrap().clone()
    }

    /// Sessions that were abandoned.
    pub fn abandoned(&self) -> Vec<SessionId> {
        self.abandoned.lock().unwrap().clone()
    }

    /// Sessions created but neither committed nor abandoned.
    pub fn open_sessions(&self) -> usize {
        self.buffers.len()
    }
}

impl PackageInstaller for FakeInstaller {
    fn create_session(&self, _package: &str) -> io::Result<SessionId> {
        if self.refuse_sessions {
            return Err(io::Error::new(io::ErrorKind::PermissionDenied, "installer unavailable"));
        }
        let session = SessionId(self.next_session.fetch_add(1, Ordering::Relaxed));
        self.buffers.insert(session, Arc::new(Mutex::new(Vec::new())));
        Ok(session)
    }

    fn open_write(&self, session: SessionId) -> io::Result<SessionWriter> {
        let buffer = self
            .buffers
            .get(&session)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, format!("unknown {session}")))?;
        if self.stream_failure {
            Ok(Box::pin(FailingWriter))
        } else {
            Ok(Box::pin(BufferWriter(buffer)))
        }
    }

    fn commit(&self, session: SessionId, callback: InstallCallback) -> io::Result<()> {
        let (_, buffer) = self
            .buffers
            .remove(&session)
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, format!("unknown {session}")))?;
        self.committed.lock().unwrap().push(buffer.lock().unwrap().clone());

        self.signals.broadcast(InstallStatusEvent {
            session: SessionId(u64::MAX),
            kind: InstallEventKind::SessionCommitted,
            status_code: 1,
        });

        let status_code = self.status_code.load(Ordering::SeqCst);
        let kind = if status_code == 0 {
            InstallEventKind::PackageReplaced
        } else {
            InstallEventKind::SessionCommitted
        };
        callback.deliver(kind, status_code);
        Ok(())
    }

    fn abandon(&self, session: SessionId) {
        self.buffers.remove(&session);
        self.abandoned.lock().unwrap().push(session);
    }

    fn status_signals(&self) -> &SignalHub<InstallStatusEvent> {
        &self.signals
    }
}

/// Launcher recording start requests instead of spawning processes.
pub struct FakeLauncher {
    entry_point: Option<LaunchTarget>,
    fail_start: bool,
    started: Mutex<Vec<LaunchTarget>>,
}

impl FakeLauncher {
    /// Launcher with an entry point named `app`.
    pub fn new() -> Self {
        Self {
            entry_point: Some(LaunchTarget {
                program: PathBuf::from("app"),
                args: Vec::new(),
            }),
            fail_start: false,
            started: Mutex::new(Vec::new()),
        }
    }

    /// Launcher for a package without an entry point.
    pub fn without_entry_point() -> Self {
        Self {
            entry_point: None,
            ..Self::new()
        }
    }

    /// Starting the entry point fails.
    pub fn with_start_failure(mut self) -> Self {
        self.fail_start = true;
        self
    }

    /// Targets successfully started.
    pub fn started(&self) -> Vec<LaunchTarget> {
        self.started.lock().unwrap().clone()
    }
}

impl Default for FakeLauncher {
    fn default() -> Self {
        Self::new()
    }
}

impl Launcher for FakeLauncher {
    fn launch_entry_point(&self, _package: &str) -> Option<LaunchTarget> {
        self.entry_point.clone()
    }

    fn start(&self, target: &LaunchTarget) -> io::Result<()> {
        if self.fail_start {
            return Err(io::Error::new(io::ErrorKind::NotFound, "executable missing"));
        }
        self.started.lock().unwrap().push(target.clone());
        Ok(())
    }
}
