//! Integration test suite for appupdate
//!
//! # Running Integration Tests
//!
//! ```bash
//! cargo test --test integration
//! ```
//!
//! # Test Organization
//!
//! - **scenarios**: full update cycles against in-memory platform fakes
//! - **host_pipeline**: the host downloader and installer against a mock HTTP server
//! - **cli**: the `appupdate` binary

mod cli;
mod host_pipeline;
mod scenarios;
