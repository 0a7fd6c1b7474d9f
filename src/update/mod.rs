//! The update pipeline.
//!
//! One update cycle runs four stages in order, each only if the previous one
//! succeeded:
//!
//! 1. [`VersionOracle`] fetches the remote descriptor and compares it with the
//!    installed version
//! 2. [`ArtifactFetcher`] reuses a cached artifact or downloads a new one
//! 3. [`InstallSession`] streams the artifact into the platform installer
//! 4. [`UpdateCoordinator`] removes the artifact and relaunches the application
//!
//! The downloader and installer answer asynchronously. Stages wait for those
//! answers through [`signal::Registration`] guards, which are released exactly
//! once on every exit path.
//!
//! [`PeriodicTrigger`] runs cycles on an interval for the `watch` command.

pub mod coordinator;
pub mod fetcher;
pub mod install;
pub mod signal;
pub mod trigger;
pub mod verification;
pub mod version;

pub use coordinator::{CycleOutcome, CycleReport, CycleState, UpdateCoordinator};
pub use fetcher::{ArtifactFetcher, UpdateArtifact};
pub use install::{InstallOutcome, InstallSession, InstallStatus};
pub use trigger::PeriodicTrigger;
pub use verification::ChecksumVerifier;
pub use version::{LocalVersion, VersionCheck, VersionDescriptor, VersionOracle};
