//! Installed version lookup for the host platform.
//!
//! The version the process was built or configured with is only the starting
//! point. Every successful install is recorded in memory and in a marker file
//! next to the installed package, so later cycles and later processes see the
//! release that is actually on disk.

use super::PackageRegistry;
use crate::config::UpdateConfig;
use crate::constants::VERSION_MARKER_SUFFIX;
use anyhow::{Context, Result};
use semver::Version;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicI64, Ordering};
use tracing::debug;

/// Registry reporting the configured version or the last recorded install.
///
/// The configured version is `installed_version_code`, the semantic version
/// from `installed_version`, or this crate's own package version. A recorded
/// install only ever raises it.
#[derive(Debug)]
pub struct BuildInfoRegistry {
    package: String,
    version_code: AtomicI64,
    marker: Option<PathBuf>,
}

impl BuildInfoRegistry {
    /// Registry for `package` at `version_code`, without a marker file.
    pub fn new(package: impl Into<String>, version_code: i64) -> Self {
        Self {
            package: package.into(),
            version_code: AtomicI64::new(version_code),
            marker: None,
        }
    }

    /// Persist recorded installs to `marker`.
    pub fn with_marker(mut self, marker: impl Into<PathBuf>) -> Self {
        self.marker = Some(marker.into());
        self
    }

    /// Registry for the package and version described by `config`.
    ///
    /// The marker lives at `<install_dir>/.<package>.version`.
    pub fn from_config(config: &UpdateConfig) -> Result<Self> {
        let version_code = match (config.installed_version_code, &config.installed_version) {
            (Some(code), _) => code,
            (None, Some(version)) => version_code_from_semver(version)?,
            (None, None) => version_code_from_semver(env!("CARGO_PKG_VERSION"))?,
        };
        debug!("Configured version code of {}: {}", config.package, version_code);

        let marker = config
            .install_dir()?
            .join(format!(".{}.{VERSION_MARKER_SUFFIX}", config.package));
        Ok(Self::new(config.package.clone(), version_code).with_marker(marker))
    }

    fn ensure_package(&self, package: &str) -> io::Result<()> {
        if package != self.package {
            return Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("package '{package}' is not registered (this process is '{}')", self.package),
            ));
        }
        Ok(())
    }
}

impl PackageRegistry for BuildInfoRegistry {
    fn installed_version(&self, package: &str) -> io::Result<i64> {
        self.ensure_package(package)?;
        let known = self.version_code.load(Ordering::SeqCst);
        let recorded = match &self.marker {
            Some(marker) => read_marker(marker)?,
            None => None,
        };
        Ok(recorded.map_or(known, |recorded| recorded.max(known)))
    }

    fn record_installed(&self, package: &str, version_code: i64) -> io::Result<()> {
        self.ensure_package(package)?;
        self.version_code.fetch_max(version_code, Ordering::SeqCst);

        if let Some(marker) = &self.marker {
            if let Some(parent) = marker.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(marker, version_code.to_string())?;
            debug!("Recorded {package} {version_code} in {}", marker.display());
        }
        Ok(())
    }
}

fn read_marker(marker: &Path) -> io::Result<Option<i64>> {
    let contents = match std::fs::read_to_string(marker) {
        Ok(contents) => contents,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e),
    };
    contents.trim().parse().map(Some).map_err(|e| {
        io::Error::new(
            io::ErrorKind::InvalidData,
            format!("corrupt version marker {}: {e}", marker.display()),
        )
    })
}

/// Map a semantic version onto a monotonically increasing version code.
///
/// `major * 1_000_000 + minor * 1_000 + patch`; minor and patch must stay
/// below 1000 for the ordering to hold.
pub fn version_code_from_semver(version: &str) -> Result<i64> {
    let parsed = Version::parse(version.trim_start_matches('v'))
        .with_context(|| format!("Failed to parse version '{version}'"))?;
    if parsed.minor >= 1_000 || parsed.patch >= 1_000 {
        anyhow::bail!("Version '{version}' cannot be mapped to a version code");
    }
    parsed
        .major
        .checked_mul(1_000_000)
        .and_then(|code| code.checked_add(parsed.minor * 1_000 + parsed.patch))
        .and_then(|code| i64::try_from(code).ok())
        .with_context(|| format!("Version '{version}' is too large"))
}
