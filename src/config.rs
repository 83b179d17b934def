//! The Config Store: durable, atomic persistence of global settings and the
//! process registry under a per-user state directory.
use std::collections::HashMap;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::constants::{
    CONFIG_FILE_NAME, DEFAULT_INTERPRETER, DEFAULT_LOG_LEVEL, DEFAULT_MAX_MEMORY_RESTART,
    DEFAULT_MAX_RESTARTS, DEFAULT_RESTART_DELAY_MS, DEFAULT_STATE_DIR_NAME, LOGS_SUBDIR,
    PIDS_SUBDIR, REGISTRY_FILE_NAME,
};
use crate::error::ConfigStoreError;
use crate::process::ProcessStatus;

/// Global settings, persisted independently of the registry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GlobalSettings {
    #[serde(default = "default_max_restarts")]
    pub max_restarts_default: u32,
    #[serde(default = "default_restart_delay_ms")]
    pub restart_delay_default_ms: u64,
    #[serde(default = "default_max_memory_restart")]
    pub max_memory_restart_default: String,
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_max_restarts() -> u32 {
    DEFAULT_MAX_RESTARTS
}
fn default_restart_delay_ms() -> u64 {
    DEFAULT_RESTART_DELAY_MS
}
fn default_max_memory_restart() -> String {
    DEFAULT_MAX_MEMORY_RESTART.to_string()
}
fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}

impl Default for GlobalSettings {
    fn default() -> Self {
        Self {
            max_restarts_default: default_max_restarts(),
            restart_delay_default_ms: default_restart_delay_ms(),
            max_memory_restart_default: default_max_memory_restart(),
            log_level: default_log_level(),
        }
    }
}

/// Per-process configuration embedded in a registry record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessOptions {
    pub cwd: PathBuf,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub env: HashMap<String, String>,
    #[serde(default = "default_interpreter")]
    pub interpreter: String,
    #[serde(default = "default_max_restarts")]
    pub max_restarts: u32,
    #[serde(default = "default_restart_delay_ms", rename = "restart_delay")]
    pub restart_delay_ms: u64,
    #[serde(default = "default_autorestart")]
    pub autorestart: bool,
    #[serde(default)]
    pub watch: bool,
    #[serde(default)]
    pub max_memory_restart: Option<String>,
}

fn default_interpreter() -> String {
    DEFAULT_INTERPRETER.to_string()
}
fn default_autorestart() -> bool {
    true
}

/// A single registry entry: enough to reconstruct a `ManagedProcess` and to
/// reason about resurrection, but not the transient per-epoch counters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegistryRecord {
    pub script: String,
    pub pid: Option<u32>,
    pub status: ProcessStatus,
    pub options: ProcessOptions,
}

pub type Registry = HashMap<String, RegistryRecord>;

/// Owns the state directory and mediates all durable reads/writes.
#[derive(Debug, Clone)]
pub struct ConfigStore {
    state_dir: PathBuf,
}

impl ConfigStore {
    /// Opens (creating if necessary) the Config Store rooted at `state_dir`.
    pub fn new(state_dir: PathBuf) -> Result<Self, ConfigStoreError> {
        let store = Self { state_dir };
        store.ensure_directories()?;
        Ok(store)
    }

    /// The default state directory: `$HOME/.pypm2`.
    pub fn default_state_dir() -> PathBuf {
        let home = std::env::var_os("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("."));
        home.join(DEFAULT_STATE_DIR_NAME)
    }

    pub fn state_dir(&self) -> &Path {
        &self.state_dir
    }

    pub fn logs_dir(&self) -> PathBuf {
        self.state_dir.join(LOGS_SUBDIR)
    }

    pub fn pids_dir(&self) -> PathBuf {
        self.state_dir.join(PIDS_SUBDIR)
    }

    pub fn log_path(&self, name: &str) -> PathBuf {
        self.logs_dir().join(format!("{name}.log"))
    }

    pub fn error_log_path(&self, name: &str) -> PathBuf {
        self.logs_dir().join(format!("{name}.error.log"))
    }

    pub fn pid_file_path(&self, name: &str) -> PathBuf {
        self.pids_dir().join(format!("{name}.pid"))
    }

    fn config_path(&self) -> PathBuf {
        self.state_dir.join(CONFIG_FILE_NAME)
    }

    fn registry_path(&self) -> PathBuf {
        self.state_dir.join(REGISTRY_FILE_NAME)
    }

    fn ensure_directories(&self) -> Result<(), ConfigStoreError> {
        for dir in [&self.state_dir, &self.logs_dir(), &self.pids_dir()] {
            fs::create_dir_all(dir).map_err(|source| ConfigStoreError::DirCreate {
                path: dir.display().to_string(),
                source,
            })?;
        }
        Ok(())
    }

    /// Loads global settings, falling back to defaults (field-by-field,
    /// via `#[serde(default)]`) on any parse error. Never fails the caller.
    pub fn load_settings(&self) -> GlobalSettings {
        let path = self.config_path();
        match fs::read_to_string(&path) {
            Ok(contents) => serde_json::from_str(&contents).unwrap_or_else(|err| {
                warn!(path = %path.display(), error = %err, "config.json is corrupt, using defaults");
                GlobalSettings::default()
            }),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => GlobalSettings::default(),
            Err(err) => {
                warn!(path = %path.display(), error = %err, "failed to read config.json, using defaults");
                GlobalSettings::default()
            }
        }
    }

    pub fn save_settings(&self, settings: &GlobalSettings) -> Result<(), ConfigStoreError> {
        let path = self.config_path();
        let body = serde_json::to_string_pretty(settings).expect("GlobalSettings always serializes");
        atomic_write(&path, body.as_bytes()).map_err(|source| ConfigStoreError::WriteError {
            path: path.display().to_string(),
            source,
        })
    }

    /// Loads the registry, returning an empty map on a missing or corrupt
    /// file. Corruption is reported via a health signal on stderr rather
    /// than raised to the caller.
    pub fn load_registry(&self) -> Registry {
        let path = self.registry_path();
        match fs::read_to_string(&path) {
            Ok(contents) => serde_json::from_str(&contents).unwrap_or_else(|err| {
                warn!(path = %path.display(), error = %err, "processes.json is corrupt, starting with an empty registry");
                Registry::new()
            }),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Registry::new(),
            Err(err) => {
                warn!(path = %path.display(), error = %err, "failed to read processes.json, starting with an empty registry");
                Registry::new()
            }
        }
    }

    pub fn save_registry(&self, registry: &Registry) -> Result<(), ConfigStoreError> {
        let path = self.registry_path();
        let body =
            serde_json::to_string_pretty(registry).expect("Registry always serializes");
        atomic_write(&path, body.as_bytes()).map_err(|source| ConfigStoreError::WriteError {
            path: path.display().to_string(),
            source,
        })
    }
}

/// Writes `contents` to `path` atomically: serialize to a sibling temp file
/// in the same directory (so the rename is same-filesystem), fsync it, then
/// rename over the destination. A reader never observes a partial write.
fn atomic_write(path: &Path, contents: &[u8]) -> std::io::Result<()> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let tmp_path = dir.join(format!(".{file_name}.tmp"));

    let mut tmp_file = File::create(&tmp_path)?;
    tmp_file.write_all(contents)?;
    tmp_file.sync_all()?;
    drop(tmp_file);

    fs::rename(&tmp_path, path)
}
