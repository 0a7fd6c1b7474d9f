use anyhow::{Context, Result};
use sha2::{Digest, Sha256};
use std::path::Path;
use tokio::fs::File;
use tokio::io::AsyncReadExt;
use tracing::{debug, info, warn};

const CHECKSUM_PREFIX: &str = "sha256:";
const READ_CHUNK_SIZE: usize = 64 * 1024;

/// Verifies downloaded artifacts against a published SHA256 checksum.
///
/// Checksums are written as `sha256:<hex>`. Expected values may omit the
/// prefix and may use either letter case.
pub struct ChecksumVerifier;

impl ChecksumVerifier {
    /// Compute the SHA256 checksum of a file.
    ///
    /// The file is hashed in chunks so large artifacts are never held in
    /// memory at once.
    ///
    /// # Examples
    ///
    /// ```rust,no_run
    /// use appupdate::update::ChecksumVerifier;
    /// use std::path::Path;
    ///
    /// # async fn example() -> anyhow::Result<()> {
    /// let checksum = ChecksumVerifier::compute_sha256(Path::new("/path/to/app.pkg")).await?;
    /// println!("{checksum}");
    /// # Ok(())
    /// # }
    /// ```
    pub async fn compute_sha256(file_path: &Path) -> Result<String> {
        debug!("Computing SHA256 checksum for: {}", file_path.display());

        let mut file = File::open(file_path)
            .await
            .with_context(|| format!("Failed to open file: {}", file_path.display()))?;

        let mut hasher = Sha256::new();
        let mut buffer = vec![0u8; READ_CHUNK_SIZE];
        loop {
            let read = file
                .read(&mut buffer)
                .await
                .with_context(|| format!("Failed to read file: {}", file_path.display()))?;
            if read == 0 {
                break;
            }
            hasher.update(&buffer[..read]);
        }

        Ok(format!("{CHECKSUM_PREFIX}{}", hex::encode(hasher.finalize())))
    }

    /// Compare a file with `expected_checksum`.
    ///
    /// Returns `Ok(None)` on a match and `Ok(Some(actual))` on a mismatch, so
    /// the caller decides what a mismatch means.
    pub async fn verify_checksum(file_path: &Path, expected_checksum: &str) -> Result<Option<String>> {
        info!("Verifying checksum for: {}", file_path.display());

        let actual = Self::compute_sha256(file_path).await?;
        if Self::normalize(&actual) == Self::normalize(expected_checksum) {
            info!("Checksum verification successful");
            Ok(None)
        } else {
            warn!("Checksum mismatch for {}: expected {expected_checksum}, got {actual}", file_path.display());
            Ok(Some(actual))
        }
    }

    fn normalize(checksum: &str) -> String {
        let trimmed = checksum.trim();
        let hex = trimmed
            .get(..CHECKSUM_PREFIX.len())
            .filter(|prefix| prefix.eq_ignore_ascii_case(CHECKSUM_PREFIX))
            .map_or(trimmed, |_| &trimmed[CHECKSUM_PREFIX.len()..]);
        hex.to_ascii_lowercase()
    }
}
