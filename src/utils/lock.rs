//! Cross-process lock around update cycles.
//!
//! The coordinator serializes cycles inside one process. This lock extends
//! that to separate `appupdate` invocations sharing a download directory, so
//! a `run` started by hand cannot race a `watch` service over the same
//! artifact file.
//!
//! All file operations run in `spawn_blocking` so waiting for the lock never
//! stalls the tokio runtime.

use crate::constants::{MAX_BACKOFF_DELAY_MS, STARTING_BACKOFF_DELAY_MS, default_lock_timeout};
use anyhow::{Context, Result};
use fs4::fs_std::FileExt;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio_retry::strategy::ExponentialBackoff;
use tracing::debug;

/// An exclusive OS file lock, released when dropped.
///
/// The lock file lives at `{dir}/{name}.lock` and is left in place after
/// release; removing it would let a waiter lock an unlinked file while a
/// newcomer locks a fresh one.
///
/// # Example
///
/// ```rust,no_run
/// use appupdate::utils::UpdateLock;
/// use std::path::Path;
///
/// # async fn example() -> anyhow::Result<()> {
/// let _lock = UpdateLock::acquire(Path::new("/var/cache/appupdate"), "update").await?;
/// // run the cycle; the lock is released at the end of the scope
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct UpdateLock {
    _file: Arc<File>,
    lock_name: String,
    lock_path: PathBuf,
}

impl Drop for UpdateLock {
    fn drop(&mut self) {
        debug!(lock_name = %self.lock_name, "Update lock released");
    }
}

impl UpdateLock {
    /// Acquire the lock `name` in `dir`, waiting up to the default timeout.
    pub async fn acquire(dir: &Path, name: &str) -> Result<Self> {
        Self::acquire_with_timeout(dir, name, default_lock_timeout()).await
    }

    /// Acquire the lock, giving up after `timeout`.
    ///
    /// Attempts are non-blocking with exponential backoff from 10ms up to
    /// 500ms between tries.
    pub async fn acquire_with_timeout(dir: &Path, name: &str, timeout: Duration) -> Result<Self> {
        debug!(lock_name = %name, "Waiting for update lock");

        tokio::fs::create_dir_all(dir)
            .await
            .with_context(|| format!("Failed to create lock directory: {}", dir.display()))?;

        let lock_path = dir.join(format!("{name}.lock"));
        let open_path = lock_path.clone();
        let file = tokio::task::spawn_blocking(move || {
            OpenOptions::new().create(true).write(true).truncate(false).open(&open_path)
        })
        .await
        .context("spawn_blocking panicked")?
        .with_context(|| format!("Failed to open lock file: {}", lock_path.display()))?;
        let file = Arc::new(file);

        let start = std::time::Instant::now();
        let backoff = ExponentialBackoff::from_millis(STARTING_BACKOFF_DELAY_MS)
            .max_delay(Duration::from_millis(MAX_BACKOFF_DELAY_MS));

        for delay in backoff {
            let attempt = Arc::clone(&file);
            let locked = tokio::task::spawn_blocking(move || attempt.try_lock_exclusive())
                .await
                .context("spawn_blocking panicked")?;

            if let Ok(true) = locked {
                debug!(
                    lock_name = %name,
                    wait_ms = start.elapsed().as_millis(),
                    "Update lock acquired"
                );
                return Ok(Self {
                    _file: file,
                    lock_name: name.to_string(),
                    lock_path,
                });
            }

            let remaining = timeout.saturating_sub(start.elapsed());
            if remaining.is_zero() {
                break;
            }
            tokio::time::sleep(delay.min(remaining)).await;
        }

        Err(anyhow::anyhow!(
            "Timeout acquiring update lock '{name}' after {timeout:?}; another update may be running"
        ))
    }

    /// Location of the lock file.
    pub fn path(&self) -> &Path {
        &self.lock_path
    }
}
