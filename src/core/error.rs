//! Error handling for appupdate
//!
//! The update pipeline reports failures with three strongly-typed enums:
//! - [`FetchError`] - version check and artifact acquisition failures
//! - [`InstallError`] - failures while staging or committing an install session
//! - [`UpdateError`] - what a whole update cycle returns, wrapping either of the above
//!
//! Every stage returns one of these instead of panicking past its boundary.
//! The CLI converts any error into an [`ErrorContext`] with [`user_friendly_error`]
//! so a failed cycle prints a short message plus a suggestion.
//!
//! # Examples
//!
//! ```rust,no_run
//! use appupdate::core::{FetchError, UpdateError, user_friendly_error};
//!
//! let error = UpdateError::from(FetchError::Malformed {
//!     reason: "missing field `version_code`".to_string(),
//! });
//! let ctx = user_friendly_error(anyhow::Error::from(error));
//! ctx.display();
//! ```

use crate::update::InstallStatus;
use colored::Colorize;
use std::fmt;
use thiserror::Error;

/// Failures while checking the remote version or obtaining the artifact.
#[derive(Error, Debug)]
pub enum FetchError {
    /// Transport failure or non-success HTTP status.
    ///
    /// No retry happens at this layer; the next periodic trigger retries.
    #[error("Network error fetching {url}: {reason}")]
    Network {
        /// URL that was being fetched
        url: String,
        /// Transport or status failure description
        reason: String,
    },

    /// The version descriptor is not valid JSON or lacks an integer `version_code`.
    #[error("Malformed version descriptor: {reason}")]
    Malformed {
        /// What was wrong with the document
        reason: String,
    },

    /// The installed package version could not be read.
    #[error("Installed version of '{package}' is unavailable: {reason}")]
    LocalMetadataUnavailable {
        /// Package identity that was queried
        package: String,
        /// Underlying failure
        reason: String,
    },

    /// The download finished but did not resolve to a content handle.
    #[error("Download {download_id} did not resolve to a local file")]
    DownloadUnresolved {
        /// Downloader identifier of the request
        download_id: u64,
    },

    /// The artifact does not hash to the checksum published with the descriptor.
    #[error("Checksum mismatch for {path}: expected {expected}, got {actual}")]
    ChecksumMismatch {
        /// Artifact that failed verification
        path: String,
        /// Checksum from the descriptor
        expected: String,
        /// Checksum computed locally
        actual: String,
    },
}

/// Failures while handing the artifact to the platform installer.
#[derive(Error, Debug)]
pub enum InstallError {
    /// The installer refused to open a session.
    #[error("Could not open an install session for '{package}': {reason}")]
    SessionUnavailable {
        /// Package identity the session was scoped to
        package: String,
        /// Underlying failure
        reason: String,
    },

    /// Copying the artifact into the session failed; the session was abandoned.
    #[error("Failed to stream artifact into install session: {source}")]
    StreamFailed {
        /// I/O failure during the copy
        #[source]
        source: std::io::Error,
    },

    /// The installer reported a non-success status.
    #[error("{reason}")]
    PlatformFailure {
        /// Status reported by the installer
        status: InstallStatus,
        /// Human readable reason mapped from the status
        reason: String,
    },

    /// The install-result signal source went away before delivering a result.
    #[error("Installer stopped before reporting a result")]
    SignalLost,
}

/// Failure of a whole update cycle.
#[derive(Error, Debug)]
pub enum UpdateError {
    /// Version check or artifact acquisition failed; nothing was installed.
    #[error(transparent)]
    Fetch(#[from] FetchError),

    /// The install stage failed; the artifact is kept for the next cycle.
    #[error(transparent)]
    Install(#[from] InstallError),
}

/// An error with an optional suggestion and details for CLI display.
#[derive(Debug)]
pub struct ErrorContext {
    /// The error message
    pub message: String,
    /// Optional suggestion for resolving the error
    pub suggestion: Option<String>,
    /// Optional additional details
    pub details: Option<String>,
}

impl ErrorContext {
    /// Create a new error context without suggestions or details.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            suggestion: None,
            details: None,
        }
    }

    /// Add a suggestion for resolving the error.
    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }

    /// Add details explaining the error.
    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    /// Print the error to stderr with colors.
    pub fn display(&self) {
        eprintln!("{}: {}", "error".red().bold(), self.message);

        if let Some(details) = &self.details {
            eprintln!("{}: {}", "details".yellow(), details);
        }

        if let Some(suggestion) = &self.suggestion {
            eprintln!("{}: {}", "suggestion".green(), suggestion);
        }
    }
}

impl fmt::Display for ErrorContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)?;

        if let Some(details) = &self.details {
            write!(f, "\nDetails: {details}")?;
        }

        if let Some(suggestion) = &self.suggestion {
            write!(f, "\nSuggestion: {suggestion}")?;
        }

        Ok(())
    }
}

impl std::error::Error for ErrorContext {}

/// Convert any error into an [`ErrorContext`] with a suggestion where one is known.
///
/// Walks the error chain so typed errors wrapped in `anyhow` context are still
/// recognized.
#[must_use]
pub fn user_friendly_error(error: anyhow::Error) -> ErrorContext {
    let message = format!("{error:#}");

    for cause in error.chain() {
        if let Some(update_error) = cause.downcast_ref::<UpdateError>() {
            return match update_error {
                UpdateError::Fetch(fetch) => fetch_context(message, fetch),
                UpdateError::Install(install) => install_context(message, install),
            };
        }
        if let Some(fetch) = cause.downcast_ref::<FetchError>() {
            return fetch_context(message, fetch);
        }
        if let Some(install) = cause.downcast_ref::<InstallError>() {
            return install_context(message, install);
        }
        if let Some(io_error) = cause.downcast_ref::<std::io::Error>() {
            if io_error.kind() == std::io::ErrorKind::PermissionDenied {
                return ErrorContext::new(message).with_suggestion(
                    "Check that the download and install directories are writable by this user",
                );
            }
        }
    }

    ErrorContext::new(message)
}

fn fetch_context(message: String, error: &FetchError) -> ErrorContext {
    let ctx = ErrorContext::new(message);
    match error {
        FetchError::Network { .. } => ctx
            .with_suggestion("Check your network connection and the configured descriptor_url")
            .with_details("The next periodic cycle retries automatically"),
        FetchError::Malformed { .. } => ctx.with_suggestion(
            "The descriptor must be a JSON object with an integer `version_code` field",
        ),
        FetchError::LocalMetadataUnavailable { .. } => ctx.with_suggestion(
            "Set `installed_version_code` or `installed_version` in the [update] config table",
        ),
        FetchError::DownloadUnresolved { .. } => ctx
            .with_suggestion("Check that artifact_url is reachable and the download directory is writable"),
        FetchError::ChecksumMismatch { .. } => ctx
            .with_details("The artifact was removed and will be downloaded again on the next cycle"),
    }
}

fn install_context(message: String, error: &InstallError) -> ErrorContext {
    let ctx = ErrorContext::new(message);
    match error {
        InstallError::PlatformFailure { .. } | InstallError::StreamFailed { .. } => ctx
            .with_details("The downloaded artifact was kept; the next cycle retries the install without downloading again"),
        InstallError::SessionUnavailable { .. } => {
            ctx.with_suggestion("Check that the install directory exists and is writable")
        }
        InstallError::SignalLost => ctx,
    }
}
