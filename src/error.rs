//! Error handling for the supervisor.
use thiserror::Error;

/// Errors raised while reading or writing the Config Store (global settings
/// and the process registry).
#[derive(Debug, Error)]
pub enum ConfigStoreError {
    /// Error creating the state directory or one of its subdirectories.
    #[error("failed to create state directory '{path}': {source}")]
    DirCreate {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Error reading a config/registry file from disk.
    #[error("failed to read '{path}': {source}")]
    ReadError {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Error parsing JSON contents of a config/registry file.
    #[error("failed to parse '{path}': {source}")]
    ParseError {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    /// Error during the atomic temp-file-then-rename write sequence.
    #[error("failed to persist '{path}': {source}")]
    WriteError {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Errors raised while operating on a single managed process.
#[derive(Debug, Error)]
pub enum ProcessError {
    /// Error spawning the child.
    #[error("failed to spawn '{name}': {source}")]
    SpawnFailed {
        name: String,
        #[source]
        source: std::io::Error,
    },

    /// Error opening the stdout/stderr log files in append mode.
    #[error("failed to open log file for '{name}': {source}")]
    LogOpenFailed {
        name: String,
        #[source]
        source: std::io::Error,
    },

    /// Error writing the PID file.
    #[error("failed to write pid file for '{name}': {source}")]
    PidFileWrite {
        name: String,
        #[source]
        source: std::io::Error,
    },

    /// Error removing the PID file.
    #[error("failed to remove pid file for '{name}': {source}")]
    PidFileRemove {
        name: String,
        #[source]
        source: std::io::Error,
    },

    /// Error delivering a signal to the process group.
    #[error("failed to signal process group for '{name}': {source}")]
    SignalFailed {
        name: String,
        #[source]
        source: nix::errno::Errno,
    },
}

/// Top-level error type for the Supervisor's internal helpers.
///
/// The public control API (start/stop/restart/...) never lets this escape:
/// it is logged and collapsed into a boolean or count result at the
/// boundary, per the error-handling design.
#[derive(Debug, Error)]
pub enum SupervisorError {
    #[error(transparent)]
    ConfigStore(#[from] ConfigStoreError),

    #[error(transparent)]
    Process(#[from] ProcessError),

    #[error("unknown process '{0}'")]
    UnknownProcess(String),

    #[error("registry lock poisoned")]
    LockPoisoned,
}

impl<T> From<std::sync::PoisonError<T>> for SupervisorError {
    fn from(_: std::sync::PoisonError<T>) -> Self {
        SupervisorError::LockPoisoned
    }
}

/// Errors raised while tailing a process's log file.
#[derive(Debug, Error)]
pub enum LogsError {
    #[error("process '{0}' not found")]
    ProcessNotFound(String),

    #[error("failed to read log file: {0}")]
    ReadFailed(#[from] std::io::Error),
}
