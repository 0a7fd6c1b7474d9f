//! Test utilities for appupdate
//!
//! Fakes for the platform collaborators, a configuration builder pointing at
//! a mock HTTP server, and one-time logging setup.
//!
//! # Example
//!
//! ```rust,no_run
//! use appupdate::platform::Platform;
//! use appupdate::test_utils::*;
//! use appupdate::update::UpdateCoordinator;
//! use std::sync::Arc;
//!
//! # fn example(server_url: &str, dir: &std::path::Path) -> anyhow::Result<()> {
//! let config = test_config(server_url, dir);
//! let platform = Platform {
//!     registry: Arc::new(FakeRegistry::new(&config.package, 4)),
//!     downloader: Arc::new(FakeDownloader::new(DownloadBehavior::Succeed(b"pkg".to_vec()))),
//!     installer: Arc::new(FakeInstaller::new(0)),
//!     launcher: Arc::new(FakeLauncher::new()),
//! };
//! let coordinator = UpdateCoordinator::new(platform, &config)?;
//! # Ok(())
//! # }
//! ```

pub mod fakes;

pub use fakes::{DownloadBehavior, FakeDownloader, FakeInstaller, FakeLauncher, FakeRegistry};

use crate::config::UpdateConfig;
use std::path::Path;
use std::sync::Once;
use tracing::Level;
use tracing_subscriber::EnvFilter;

/// Global flag to ensure logging is only initialized once in tests
static INIT_LOGGING: Once = Once::new();

/// Initialize logging for tests.
///
/// Only the first call has an effect. With `level` set it is used as the
/// filter; otherwise `RUST_LOG` is honored, and without either nothing is
/// logged.
///
/// ```bash
/// RUST_LOG=appupdate=debug cargo test
/// ```
pub fn init_test_logging(level: Option<Level>) {
    INIT_LOGGING.call_once(|| {
        let filter = if let Some(level) = level {
            EnvFilter::new(level.to_string())
        } else if std::env::var("RUST_LOG").is_ok() {
            EnvFilter::from_default_env()
        } else {
            return;
        };

        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .with_target(true)
            .with_thread_ids(false)
            .try_init();
    });
}

/// Configuration for package `app` served from `server_url`.
///
/// The descriptor lives at `/version.json` and the artifact at `/app.pkg`.
/// Downloads go to `<dir>/downloads`, installs to `<dir>/install`.
pub fn test_config(server_url: &str, dir: &Path) -> UpdateConfig {
    UpdateConfig {
        descriptor_url: format!("{server_url}/version.json"),
        artifact_url: format!("{server_url}/app.pkg"),
        download_dir: Some(dir.join("downloads").to_string_lossy().into_owned()),
        install_dir: Some(dir.join("install").to_string_lossy().into_owned()),
        package: "app".to_string(),
        request_timeout: 5,
        ..UpdateConfig::default()
    }
}
