//! A local process supervisor with PM2-style ergonomics.

#![warn(unused_crate_dependencies)]
#[cfg(test)]
use assert_cmd as _;
use ctrlc as _;
#[cfg(test)]
use predicates as _;
#[cfg(test)]
use tempfile as _;
use tracing_subscriber as _;

/// CLI parsing.
pub mod cli;

/// The Config Store: durable settings and process registry persistence.
pub mod config;

/// Constants.
pub mod constants;

/// Errors.
pub mod error;

/// Log reading and following.
pub mod logs;

/// The Managed Process: a single supervised child's lifecycle.
pub mod process;

/// Point-in-time process snapshots for `list()`.
pub mod status;

/// The Supervisor: the registry of managed processes and their control API.
pub mod supervisor;

/// Test utils.
#[doc(hidden)]
pub mod test_utils;

/// The File Watcher.
pub mod watcher;
