//! HTTP download service.
//!
//! [`HttpDownloader`] behaves like an OS download manager: `enqueue` returns
//! immediately with an id, the transfer runs on a background task, and
//! completion is broadcast on the downloader's signal hub whether the
//! transfer succeeded or not. A failed download resolves to no content.
//!
//! Bytes are streamed to `<destination>.part` and renamed into place only
//! after the whole body arrived, so the destination path never holds a
//! truncated artifact.

use super::{ContentHandle, DownloadComplete, DownloadId, DownloadRequest, Downloader};
use crate::constants::PARTIAL_DOWNLOAD_SUFFIX;
use crate::update::signal::SignalHub;
use anyhow::{Context, Result};
use dashmap::DashMap;
use futures::StreamExt;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

/// Download manager backed by `reqwest`.
pub struct HttpDownloader {
    client: reqwest::Client,
    next_id: AtomicU64,
    finished: Arc<DashMap<DownloadId, Option<PathBuf>>>,
    signals: SignalHub<DownloadComplete>,
}

impl HttpDownloader {
    /// Create a downloader using `client` for transfers.
    pub fn new(client: reqwest::Client) -> Self {
        Self {
            client,
            next_id: AtomicU64::new(1),
            finished: Arc::new(DashMap::new()),
            signals: SignalHub::new("download-complete"),
        }
    }
}

impl Downloader for HttpDownloader {
    fn enqueue(&self, request: DownloadRequest) -> io::Result<DownloadId> {
        if !request.network_types.wifi && !request.network_types.mobile {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "download request allows no network type",
            ));
        }
        let runtime = tokio::runtime::Handle::try_current().map_err(io::Error::other)?;

        let download_id = self.next_id.fetch_add(1, Ordering::Relaxed);
        debug!(
            download_id,
            url = %request.url,
            destination = %request.destination.display(),
            notification = ?request.notification,
            "Download enqueued"
        );

        let client = self.client.clone();
        let finished = Arc::clone(&self.finished);
        let signals = self.signals.clone();
        runtime.spawn(async move {
            match fetch_to_file(&client, &request.url, &request.destination).await {
                Ok(bytes) => {
                    info!(download_id, bytes, "Download finished: {}", request.destination.display());
                    finished.insert(download_id, Some(request.destination));
                }
                Err(e) => {
                    warn!(download_id, "Download of {} failed: {e:#}", request.url);
                    finished.insert(download_id, None);
                }
            }
            signals.broadcast(DownloadComplete {
                download_id,
            });
        });

        Ok(download_id)
    }

    /// Resolve and forget a finished download; a second call returns `None`.
    fn resolve_content_handle(&self, download_id: DownloadId) -> Option<ContentHandle> {
        self.finished.remove(&download_id).and_then(|(_, path)| path).map(ContentHandle::from_path)
    }

    fn completion_signals(&self) -> &SignalHub<DownloadComplete> {
        &self.signals
    }
}

fn partial_path(destination: &Path) -> PathBuf {
    let mut name = destination.as_os_str().to_owned();
    name.push(".");
    name.push(PARTIAL_DOWNLOAD_SUFFIX);
    PathBuf::from(name)
}

async fn fetch_to_file(client: &reqwest::Client, url: &str, destination: &Path) -> Result<u64> {
    if let Some(parent) = destination.parent() {
        fs::create_dir_all(parent)
            .await
            .with_context(|| format!("Failed to create download directory: {}", parent.display()))?;
    }

    let partial = partial_path(destination);
    let result = stream_body(client, url, &partial).await;
    match result {
        Ok(written) => {
            fs::rename(&partial, destination).await.with_context(|| {
                format!("Failed to move download into place: {}", destination.display())
            })?;
            Ok(written)
        }
        Err(e) => {
            if let Err(remove_err) = fs::remove_file(&partial).await {
                if remove_err.kind() != io::ErrorKind::NotFound {
                    debug!("Failed to remove partial download {}: {remove_err}", partial.display());
                }
            }
            Err(e)
        }
    }
}

async fn stream_body(client: &reqwest::Client, url: &str, partial: &Path) -> Result<u64> {
    let response = client
        .get(url)
        .send()
        .await
        .and_then(reqwest::Response::error_for_status)
        .with_context(|| format!("Failed to fetch {url}"))?;

    let mut file = fs::File::create(partial)
        .await
        .with_context(|| format!("Failed to create {}", partial.display()))?;

    let mut stream = response.bytes_stream();
    let mut written = 0u64;
    while let Some(chunk) = stream.next().await {
        let chunk = chunk.context("Connection lost during download")?;
        file.write_all(&chunk).await.context("Failed to write download")?;
        written += chunk.len() as u64;
    }
    file.flush().await.context("Failed to flush download")?;
    file.sync_all().await.context("Failed to sync download")?;

    Ok(written)
}
