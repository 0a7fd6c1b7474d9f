//! The `[update]` table: release channel, storage locations and schedule.

use crate::constants::{
    DEFAULT_ARTIFACT_FILE_NAME, DEFAULT_CHECK_INTERVAL_SECS, DEFAULT_PACKAGE,
    DEFAULT_REQUEST_TIMEOUT_SECS,
};
use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Settings of the `[update]` table.
///
/// Describes where the version descriptor and the artifact live, where the
/// artifact is cached, which package is updated, and how often the periodic
/// trigger runs.
///
/// # TOML Example
/// ```toml
/// [update]
/// descriptor_url = "https://example.com/app/version.json"
/// artifact_url = "https://example.com/app/app.pkg"
/// package = "app"
/// install_dir = "~/.local/bin"
/// check_interval = 14400
/// ```
///
/// Paths accept a leading `~`, which is expanded to the home directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateConfig {
    /// URL of the JSON version descriptor.
    #[serde(default)]
    pub descriptor_url: String,

    /// URL of the package artifact.
    #[serde(default)]
    pub artifact_url: String,

    /// File name of the artifact inside the download directory.
    ///
    /// Together with the download directory this is the well-known
    /// location checked for an already downloaded artifact.
    #[serde(default = "default_artifact_file_name")]
    pub artifact_file_name: String,

    /// Directory downloads are stored in.
    ///
    /// Defaults to `<cache dir>/appupdate/downloads`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub download_dir: Option<String>,

    /// Identity of the package being updated.
    #[serde(default = "default_package")]
    pub package: String,

    /// Directory the package is installed in.
    ///
    /// Defaults to the directory of the running executable.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub install_dir: Option<String>,

    /// Installed semantic version, mapped to a version code.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub installed_version: Option<String>,

    /// Installed version code; takes precedence over `installed_version`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub installed_version_code: Option<i64>,

    /// Command used to relaunch the application after an install.
    ///
    /// Defaults to the installed package executable.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub launch_command: Option<Vec<String>>,

    /// Seconds between periodic update cycles. Default: 4 hours.
    #[serde(default = "default_check_interval")]
    pub check_interval: u64,

    /// Whether to verify the artifact against a `sha256` published in the descriptor.
    #[serde(default = "default_verify_checksum")]
    pub verify_checksum: bool,

    /// Timeout in seconds for version checks and for connecting downloads.
    #[serde(default = "default_request_timeout")]
    pub request_timeout: u64,
}

impl Default for UpdateConfig {
    fn default() -> Self {
        Self {
            descriptor_url: String::new(),
            artifact_url: String::new(),
            artifact_file_name: default_artifact_file_name(),
            download_dir: None,
            package: default_package(),
            install_dir: None,
            installed_version: None,
            installed_version_code: None,
            launch_command: None,
            check_interval: default_check_interval(),
            verify_checksum: default_verify_checksum(),
            request_timeout: default_request_timeout(),
        }
    }
}

fn default_artifact_file_name() -> String {
    DEFAULT_ARTIFACT_FILE_NAME.to_string()
}

fn default_package() -> String {
    DEFAULT_PACKAGE.to_string()
}

fn default_check_interval() -> u64 {
    DEFAULT_CHECK_INTERVAL_SECS
}

fn default_verify_checksum() -> bool {
    true
}

fn default_request_timeout() -> u64 {
    DEFAULT_REQUEST_TIMEOUT_SECS
}

fn expand(path: &str) -> PathBuf {
    PathBuf::from(shellexpand::tilde(path).as_ref())
}

impl UpdateConfig {
    /// Check that the settings needed for an update cycle are present.
    pub fn validate(&self) -> Result<()> {
        if self.descriptor_url.trim().is_empty() {
            bail!("update.descriptor_url is not configured");
        }
        if self.artifact_url.trim().is_empty() {
            bail!("update.artifact_url is not configured");
        }
        if self.artifact_file_name.is_empty()
            || self.artifact_file_name.contains(['/', '\\'])
            || self.artifact_file_name == ".."
        {
            bail!("update.artifact_file_name must be a plain file name");
        }
        if self.package.trim().is_empty() {
            bail!("update.package must not be empty");
        }
        if self.check_interval == 0 {
            bail!("update.check_interval must be greater than zero");
        }
        Ok(())
    }

    /// Directory downloads are stored in.
    pub fn download_dir(&self) -> Result<PathBuf> {
        match &self.download_dir {
            Some(dir) => Ok(expand(dir)),
            None => Ok(dirs::cache_dir()
                .context("Unable to determine cache directory")?
                .join("appupdate")
                .join("downloads")),
        }
    }

    /// Well-known location of the downloaded artifact.
    pub fn artifact_path(&self) -> Result<PathBuf> {
        Ok(self.download_dir()?.join(&self.artifact_file_name))
    }

    /// Directory the package is installed in.
    pub fn install_dir(&self) -> Result<PathBuf> {
        match &self.install_dir {
            Some(dir) => Ok(expand(dir)),
            None => {
                let exe = std::env::current_exe()
                    .context("Unable to determine the running executable")?;
                exe.parent()
                    .map(|parent| parent.to_path_buf())
                    .context("Running executable has no parent directory")
            }
        }
    }

    /// Interval between periodic cycles.
    pub fn check_interval(&self) -> Duration {
        Duration::from_secs(self.check_interval)
    }

    /// Timeout applied to HTTP requests.
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout)
    }
}
