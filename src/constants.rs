//! Global constants used throughout the appupdate codebase.
//!
//! Timeouts, retry parameters and well-known names shared across the
//! update pipeline, the host platform implementations and the CLI.

use std::time::Duration;

/// Default interval between periodic update cycles (4 hours).
pub const DEFAULT_CHECK_INTERVAL_SECS: u64 = 4 * 60 * 60;

/// Default timeout applied to every HTTP request (30 seconds).
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// Default file name of the downloaded package artifact.
pub const DEFAULT_ARTIFACT_FILE_NAME: &str = "app.pkg";

/// Default package identity, the agent's own binary.
pub const DEFAULT_PACKAGE: &str = "appupdate";

/// JSON field of the remote version descriptor holding the release number.
pub const VERSION_CODE_FIELD: &str = "version_code";

/// Suffix of a download that is still being written.
pub const PARTIAL_DOWNLOAD_SUFFIX: &str = "part";

/// Name of the staging directory inside the install directory.
pub const STAGING_DIR_NAME: &str = ".staging";

/// Extension of the marker file recording the installed version code.
pub const VERSION_MARKER_SUFFIX: &str = "version";

/// Name of the cross-process update lock file.
pub const UPDATE_LOCK_NAME: &str = "update";

/// Buffer size used when streaming an artifact into an install session.
pub const STREAM_BUFFER_SIZE: usize = 64 * 1024;

/// Timeout for acquiring the cross-process update lock (10 minutes).
///
/// A cycle holding the lock may be waiting on a slow download, so the
/// timeout is generous.
pub fn default_lock_timeout() -> Duration {
    Duration::from_secs(600)
}

/// Maximum backoff delay for lock acquisition retries (500ms).
pub const MAX_BACKOFF_DELAY_MS: u64 = 500;

/// Starting delay for lock acquisition retries (10ms).
pub const STARTING_BACKOFF_DELAY_MS: u64 = 10;
