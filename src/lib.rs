//! appupdate - self-update agent for an installed application
//!
//! The agent periodically fetches a remote version descriptor, downloads a
//! newer package artifact when one is published, installs it in place and
//! relaunches the application.
//!
//! # Architecture Overview
//!
//! ```text
//! run_update_cycle()
//!   └── VersionOracle::check()          remote version_code > installed?
//!         └── ArtifactFetcher::ensure_local()   reuse cached file or download
//!               └── InstallSession::install()   stream, commit, await result
//!                     └── cleanup + relaunch
//! ```
//!
//! Each stage runs only when the previous one succeeded. A failed install
//! keeps the downloaded artifact so the next cycle installs it without
//! downloading again.
//!
//! # Modules
//!
//! - [`update`] - the pipeline stages and the [`UpdateCoordinator`](update::UpdateCoordinator)
//! - [`platform`] - collaborator traits (registry, downloader, installer, launcher)
//!   and their host implementations
//! - [`config`] - the TOML configuration file
//! - [`core`] - typed errors and user-facing error rendering
//! - [`cli`] - the `appupdate` command line
//! - [`utils`] - cross-process update lock
//!
//! # Configuration
//!
//! ```toml
//! [update]
//! descriptor_url = "https://example.com/app/version.json"
//! artifact_url = "https://example.com/app/app.pkg"
//! package = "app"
//! install_dir = "~/.local/bin"
//! ```
//!
//! # Command-Line Usage
//!
//! ```bash
//! appupdate check          # is a newer version available?
//! appupdate run            # one full update cycle
//! appupdate watch          # every check_interval until Ctrl-C
//! ```

pub mod cli;
pub mod config;
pub mod constants;
pub mod core;
pub mod platform;
pub mod update;
pub mod utils;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
