//! Constants and configuration values for the supervisor.
//!
//! Centralizes magic numbers and default values used across the Config
//! Store, Managed Process, Supervisor, and File Watcher.

use std::time::Duration;

// ============================================================================
// State directory layout
// ============================================================================

/// Default state directory, relative to `$HOME`.
pub const DEFAULT_STATE_DIR_NAME: &str = ".pypm2";

/// Name of the global settings file within the state directory.
pub const CONFIG_FILE_NAME: &str = "config.json";

/// Name of the process registry file within the state directory.
pub const REGISTRY_FILE_NAME: &str = "processes.json";

/// Subdirectory holding per-process stdout/stderr logs.
pub const LOGS_SUBDIR: &str = "logs";

/// Subdirectory holding per-process PID files.
pub const PIDS_SUBDIR: &str = "pids";

// ============================================================================
// Global setting defaults
// ============================================================================

pub const DEFAULT_MAX_RESTARTS: u32 = 10;
pub const DEFAULT_RESTART_DELAY_MS: u64 = 1000;
pub const DEFAULT_MAX_MEMORY_RESTART: &str = "1G";
pub const DEFAULT_LOG_LEVEL: &str = "info";
pub const DEFAULT_INTERPRETER: &str = "python";

// ============================================================================
// Process lifecycle timing
// ============================================================================

/// Time to wait for a child to exit after SIGTERM before escalating to SIGKILL.
pub const GRACEFUL_STOP_TIMEOUT: Duration = Duration::from_secs(5);

/// Poll interval while waiting for a child to exit during a graceful stop.
pub const STOP_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Minimum delay enforced between a stop and the following start in `restart()`,
/// regardless of a smaller configured `restart_delay_ms`. Guarantees listeners,
/// locks, and ports held by the prior child are released before respawn.
pub const MIN_RESTART_DELAY: Duration = Duration::from_millis(1000);

/// Interval at which the Supervisor's monitor loop ticks over all processes.
pub const MONITOR_TICK_INTERVAL: Duration = Duration::from_secs(1);

// ============================================================================
// File watcher
// ============================================================================

/// Interval at which a File Watcher re-walks its roots.
pub const WATCHER_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Minimum interval between successive watcher-driven restarts.
pub const WATCHER_DEBOUNCE_WINDOW: Duration = Duration::from_secs(1);

/// File extensions a watcher considers relevant.
pub const WATCH_EXTENSIONS: &[&str] = &[
    ".py", ".pyx", ".json", ".yaml", ".yml", ".toml", ".ini", ".cfg",
];

/// Patterns a watcher ignores even if the extension matches. Entries
/// beginning with `*` match by filename suffix; all others match by
/// substring anywhere in the path.
pub const WATCH_IGNORE_PATTERNS: &[&str] = &[
    "*.log",
    "*.tmp",
    "*.swp",
    "*.pyc",
    "__pycache__",
    ".git",
    "node_modules",
    ".pytest_cache",
    ".coverage",
    "*.pid",
    "*.lock",
];

/// Marker files that terminate the upward walk for default watch-root selection.
pub const PROJECT_MARKER_FILES: &[&str] = &["setup.py", "pyproject.toml"];

/// Project subdirectories included once a marker file is found.
pub const PROJECT_SOURCE_SUBDIRS: &[&str] = &["src", "lib", "app"];

// ============================================================================
// Log following
// ============================================================================

/// Poll interval for `logs --follow`.
pub const LOG_FOLLOW_POLL_INTERVAL: Duration = Duration::from_millis(300);
