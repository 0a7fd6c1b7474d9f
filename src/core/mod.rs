//! Core types shared across appupdate.
//!
//! Currently this is the error taxonomy of the update pipeline and the
//! user-facing error formatting used by the CLI.

pub mod error;

pub use error::{ErrorContext, FetchError, InstallError, UpdateError, user_friendly_error};
