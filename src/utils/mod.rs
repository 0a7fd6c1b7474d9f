//! Supporting utilities.
//!
//! - [`lock`] - cross-process lock serializing update cycles between invocations

pub mod lock;

pub use lock::UpdateLock;
