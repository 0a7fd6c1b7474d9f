//! Local availability of the update artifact.
//!
//! Reuses a file at the well-known destination, or drives a download and
//! waits for its completion signal.

use crate::core::FetchError;
use crate::platform::{
    ContentHandle, DownloadRequest, Downloader, NetworkTypes, NotificationVisibility,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tracing::{debug, info, warn};

/// A package file on local storage, ready to be installed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateArtifact {
    /// Well-known location of the file
    pub local_path: PathBuf,
    /// Content to read when installing
    pub source: ContentHandle,
}

/// Makes sure the artifact is present locally.
///
/// A file already sitting at the destination is reused without downloading
/// again, so a cycle interrupted between download and install resumes at the
/// install step. The reused file is not verified here; see
/// [`ChecksumVerifier`](super::ChecksumVerifier) for the optional check.
pub struct ArtifactFetcher {
    downloader: Arc<dyn Downloader>,
    artifact_url: String,
    destination: PathBuf,
}

impl ArtifactFetcher {
    /// Fetcher downloading `artifact_url` to `destination`.
    pub fn new(
        downloader: Arc<dyn Downloader>,
        artifact_url: impl Into<String>,
        destination: impl Into<PathBuf>,
    ) -> Self {
        Self {
            downloader,
            artifact_url: artifact_url.into(),
            destination: destination.into(),
        }
    }

    /// Well-known artifact location.
    pub fn destination(&self) -> &Path {
        &self.destination
    }

    /// Return the cached artifact, or download it and wait for completion.
    pub async fn ensure_local(&self) -> Result<UpdateArtifact, FetchError> {
        if self.is_cached().await {
            info!("Artifact already present at {}, reusing it", self.destination.display());
            return Ok(UpdateArtifact {
                local_path: self.destination.clone(),
                source: ContentHandle::from_path(&self.destination),
            });
        }

        // Listen before enqueueing so a fast completion is not missed
        let mut registration = self.downloader.completion_signals().register();

        let request = DownloadRequest {
            url: self.artifact_url.clone(),
            destination: self.destination.clone(),
            network_types: NetworkTypes::WIFI_OR_MOBILE,
            notification: NotificationVisibility::Hidden,
        };
        let download_id = match self.downloader.enqueue(request) {
            Ok(id) => id,
            Err(e) => {
                registration.unregister();
                return Err(FetchError::Network {
                    url: self.artifact_url.clone(),
                    reason: format!("download could not be enqueued: {e}"),
                });
            }
        };
        debug!("Waiting for download {download_id} of {}", self.artifact_url);

        let completed = registration.recv_matching(|signal| signal.download_id == download_id).await;
        registration.unregister();

        if completed.is_none() {
            warn!("Download {download_id} stopped without a completion signal");
            return Err(FetchError::DownloadUnresolved {
                download_id,
            });
        }

        match self.downloader.resolve_content_handle(download_id) {
            Some(source) => {
                info!("Download {download_id} complete: {}", source.path().display());
                Ok(UpdateArtifact {
                    local_path: self.destination.clone(),
                    source,
                })
            }
            None => {
                warn!("Download {download_id} finished without a file");
                Err(FetchError::DownloadUnresolved {
                    download_id,
                })
            }
        }
    }

    async fn is_cached(&self) -> bool {
        match fs::try_exists(&self.destination).await {
            Ok(exists) => exists,
            Err(e) => {
                warn!(
                    "Cannot check for a cached artifact at {}, downloading: {e}",
                    self.destination.display()
                );
                false
            }
        }
    }
}
