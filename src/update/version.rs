//! Remote version descriptor and the installed-version comparison.
//!
//! An update is due only when the remote `version_code` is strictly greater
//! than the installed one.

use crate::constants::VERSION_CODE_FIELD;
use crate::core::FetchError;
use crate::platform::PackageRegistry;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Remote version descriptor.
///
/// ```json
/// { "version_code": 5, "sha256": "3f0a..." }
/// ```
///
/// Only `version_code` is required. `sha256`, when present, is the expected
/// checksum of the artifact for that release.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionDescriptor {
    /// Release number, strictly increasing across releases
    pub version_code: i64,
    /// Checksum of the release artifact, if published
    pub sha256: Option<String>,
}

impl VersionDescriptor {
    /// Parse a descriptor document.
    pub fn parse(body: &str) -> Result<Self, FetchError> {
        let document: Value = serde_json::from_str(body).map_err(|e| FetchError::Malformed {
            reason: format!("not valid JSON: {e}"),
        })?;

        let field = document.get(VERSION_CODE_FIELD).ok_or_else(|| FetchError::Malformed {
            reason: format!("missing field `{VERSION_CODE_FIELD}`"),
        })?;
        let version_code = field.as_i64().ok_or_else(|| FetchError::Malformed {
            reason: format!("`{VERSION_CODE_FIELD}` must be an integer, found {field}"),
        })?;

        let sha256 = document.get("sha256").and_then(Value::as_str).map(str::to_string);

        Ok(Self {
            version_code,
            sha256,
        })
    }
}

/// Version of the installed package.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LocalVersion {
    /// Installed release number
    pub version_code: i64,
}

/// Result of comparing the remote descriptor with the installed version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionCheck {
    /// Freshly fetched descriptor
    pub remote: VersionDescriptor,
    /// Installed version
    pub local: LocalVersion,
}

impl VersionCheck {
    /// Whether the remote release should be installed.
    pub fn update_available(&self) -> bool {
        is_newer(self.remote.version_code, self.local.version_code)
    }
}

/// `true` iff `remote` is strictly greater than `local`.
///
/// Equal or lower remote versions never trigger an install, which rules out
/// downgrades and reinstall loops.
pub fn is_newer(remote: i64, local: i64) -> bool {
    remote > local
}

/// Fetches the remote descriptor and compares it with the installed version.
pub struct VersionOracle {
    client: reqwest::Client,
    descriptor_url: String,
    package: String,
    registry: Arc<dyn PackageRegistry>,
}

impl VersionOracle {
    /// Oracle for `package`, reading the descriptor at `descriptor_url`.
    pub fn new(
        client: reqwest::Client,
        descriptor_url: impl Into<String>,
        package: impl Into<String>,
        registry: Arc<dyn PackageRegistry>,
    ) -> Self {
        Self {
            client,
            descriptor_url: descriptor_url.into(),
            package: package.into(),
            registry,
        }
    }

    /// Fetch the descriptor and read the installed version.
    pub async fn check(&self) -> Result<VersionCheck, FetchError> {
        let remote = self.fetch_descriptor().await?;
        let local = self.local_version()?;
        debug!(
            "Version check for {}: remote {} / local {}",
            self.package, remote.version_code, local.version_code
        );

        let check = VersionCheck {
            remote,
            local,
        };
        if check.update_available() {
            info!(
                "Update available for {}: {} -> {}",
                self.package, check.local.version_code, check.remote.version_code
            );
        }
        Ok(check)
    }

    /// Whether the remote release is newer than the installed one.
    pub async fn check_update_available(&self) -> Result<bool, FetchError> {
        Ok(self.check().await?.update_available())
    }

    /// Record that `version_code` is now installed.
    ///
    /// A failure is logged only: the install itself already succeeded.
    pub fn record_installed(&self, version_code: i64) {
        if let Err(e) = self.registry.record_installed(&self.package, version_code) {
            warn!("Failed to record installed version {version_code} of {}: {e}", self.package);
        }
    }

    async fn fetch_descriptor(&self) -> Result<VersionDescriptor, FetchError> {
        let network = |e: reqwest::Error| FetchError::Network {
            url: self.descriptor_url.clone(),
            reason: e.to_string(),
        };

        let body = self
            .client
            .get(&self.descriptor_url)
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(network)?
            .text()
            .await
            .map_err(network)?;

        VersionDescriptor::parse(&body)
    }

    fn local_version(&self) -> Result<LocalVersion, FetchError> {
        self.registry
            .installed_version(&self.package)
            .map(|version_code| LocalVersion {
                version_code,
            })
            .map_err(|e| FetchError::LocalMetadataUnavailable {
                package: self.package.clone(),
                reason: e.to_string(),
            })
    }
}
