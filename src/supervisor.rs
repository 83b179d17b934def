//! The Supervisor: the in-process registry of managed processes and the
//! control API the CLI drives. A per-process singleton in practice, but
//! carries no module-level state — construct it with a state directory.
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};

use tracing::{error, info, warn};

use crate::config::{ConfigStore, Registry};
use crate::constants::MONITOR_TICK_INTERVAL;
use crate::error::SupervisorError;
use crate::logs;
use crate::process::{ManagedProcess, ProcessStatus, StartOptions};
use crate::status::ProcessSnapshot;
use crate::watcher;

type ProcessHandle = Arc<Mutex<ManagedProcess>>;

struct SupervisorInner {
    config_store: ConfigStore,
    registry: Mutex<HashMap<String, ProcessHandle>>,
    watcher_stops: Mutex<HashMap<String, Arc<AtomicBool>>>,
    monitor_shutdown: Arc<AtomicBool>,
    monitor_handle: Mutex<Option<JoinHandle<()>>>,
}

/// Cheaply cloneable handle onto the shared supervisor state; clones share
/// one registry and one monitor thread.
#[derive(Clone)]
pub struct Supervisor(Arc<SupervisorInner>);

impl Supervisor {
    /// Opens the Config Store at `state_dir`, reconciles the on-disk
    /// registry against live PIDs, and starts the monitor loop.
    pub fn new(state_dir: std::path::PathBuf) -> Result<Self, SupervisorError> {
        let config_store = ConfigStore::new(state_dir)?;
        let stored = config_store.load_registry();
        let registry = Self::reconcile_registry(&config_store, &stored);

        let supervisor = Supervisor(Arc::new(SupervisorInner {
            config_store,
            registry: Mutex::new(registry),
            watcher_stops: Mutex::new(HashMap::new()),
            monitor_shutdown: Arc::new(AtomicBool::new(false)),
            monitor_handle: Mutex::new(None),
        }));
        supervisor.spawn_monitor();
        // The watcher's lifetime is tied to the Supervisor, not to a
        // process's online/offline transitions, so every persisted record
        // with `watch=true` gets a fresh watcher here regardless of whether
        // it was just adopted as online or left stopped.
        for (name, record) in &stored {
            if record.options.watch {
                supervisor.attach_watcher(name, std::path::Path::new(&record.script));
            }
        }
        Ok(supervisor)
    }

    /// Adopts any record whose stored PID is still alive as `online` in
    /// place, without spawning anything. This is boot-time reconciliation,
    /// distinct from the explicit `resurrect()` operation, which actually
    /// launches fresh processes.
    fn reconcile_registry(config_store: &ConfigStore, stored: &Registry) -> HashMap<String, ProcessHandle> {
        let mut live = HashMap::with_capacity(stored.len());

        for (name, record) in stored {
            let mut process = ManagedProcess::from_record(name, record, config_store);
            if process.pid.is_some() && process.is_alive() {
                process.status = ProcessStatus::Online;
                info!(name = %name, pid = ?process.pid, "adopted live process at startup");
            } else {
                process.pid = None;
                process.status = ProcessStatus::Stopped;
            }
            live.insert(name.clone(), Arc::new(Mutex::new(process)));
        }

        live
    }

    fn registry(&self) -> Result<MutexGuard<'_, HashMap<String, ProcessHandle>>, SupervisorError> {
        Ok(self.0.registry.lock()?)
    }

    fn snapshot_records(&self) -> Result<Registry, SupervisorError> {
        let registry = self.registry()?;
        let mut out = Registry::with_capacity(registry.len());
        for (name, handle) in registry.iter() {
            let process = handle.lock()?;
            out.insert(name.clone(), process.to_record());
        }
        Ok(out)
    }

    fn flush(&self) {
        match self.snapshot_records() {
            Ok(records) => {
                if let Err(err) = self.0.config_store.save_registry(&records) {
                    error!(error = %err, "failed to persist registry");
                }
            }
            Err(err) => error!(error = %err, "failed to snapshot registry for persistence"),
        }
    }

    fn spawn_monitor(&self) {
        let supervisor = self.clone();
        let shutdown = Arc::clone(&self.0.monitor_shutdown);

        let handle = thread::spawn(move || {
            while !shutdown.load(Ordering::Relaxed) {
                thread::sleep(MONITOR_TICK_INTERVAL);
                if shutdown.load(Ordering::Relaxed) {
                    break;
                }

                let handles: Vec<ProcessHandle> = match supervisor.registry() {
                    Ok(guard) => guard.values().cloned().collect(),
                    Err(_) => continue,
                };
                for handle in handles {
                    if let Ok(mut process) = handle.lock() {
                        process.monitor();
                    }
                }
                supervisor.flush();
            }
        });

        *self.0.monitor_handle.lock().unwrap_or_else(|e| e.into_inner()) = Some(handle);
    }

    /// Stops the monitor loop and joins its thread. Idempotent.
    pub fn shutdown(&self) {
        self.0.monitor_shutdown.store(true, Ordering::Relaxed);
        if let Ok(mut guard) = self.0.monitor_handle.lock() {
            if let Some(handle) = guard.take() {
                let _ = handle.join();
            }
        }
        if let Ok(mut stops) = self.0.watcher_stops.lock() {
            for stop in stops.values() {
                stop.store(true, Ordering::Relaxed);
            }
            stops.clear();
        }
    }

    fn attach_watcher(&self, name: &str, script: &std::path::Path) {
        self.detach_watcher(name);

        let stop = Arc::new(AtomicBool::new(false));
        let roots = watcher::default_roots(script);
        let supervisor = self.clone();
        let name_owned = name.to_string();

        watcher::spawn_watcher(name_owned.clone(), roots, Arc::clone(&stop), move |changed| {
            info!(name = %changed, "file watcher triggered restart");
            supervisor.restart(changed);
        });

        if let Ok(mut stops) = self.0.watcher_stops.lock() {
            stops.insert(name_owned, stop);
        }
    }

    fn detach_watcher(&self, name: &str) {
        if let Ok(mut stops) = self.0.watcher_stops.lock() {
            if let Some(stop) = stops.remove(name) {
                stop.store(true, Ordering::Relaxed);
            }
        }
    }

    /// Registers and starts a new process, or delegates to `restart` (with
    /// the crash-restart budget reset) when `name` is already registered.
    pub fn start(&self, name: &str, script: &str, options: StartOptions) -> bool {
        match self.try_start(name, script, options) {
            Ok(result) => result,
            Err(err) => {
                error!(name = %name, error = %err, "start failed");
                false
            }
        }
    }

    fn try_start(
        &self,
        name: &str,
        script: &str,
        options: StartOptions,
    ) -> Result<bool, SupervisorError> {
        let watch = options.watch;
        let (handle, already_registered) = {
            let mut registry = self.registry()?;
            match registry.entry(name.to_string()) {
                Entry::Occupied(entry) => (Arc::clone(entry.get()), true),
                Entry::Vacant(entry) => {
                    let process = ManagedProcess::new(name, script, options, &self.0.config_store);
                    let handle = Arc::new(Mutex::new(process));
                    entry.insert(Arc::clone(&handle));
                    (handle, false)
                }
            }
        };

        let (result, script_path) = {
            let mut process = handle.lock()?;
            if already_registered {
                // A user-initiated restart always clears the crash budget;
                // the monitor loop never does this on its own paths.
                process.restart_count = 0;
                (process.restart(), process.script.clone())
            } else {
                (process.start(), process.script.clone())
            }
        };

        if watch {
            self.attach_watcher(name, std::path::Path::new(&script_path));
        }

        self.flush();
        Ok(result)
    }

    /// Stops `name`. A no-op success if it is already stopped or errored —
    /// per the control API's delegate-with-no-op-success contract.
    pub fn stop(&self, name: &str, force: bool) -> bool {
        match self.try_with_process(name, |process| {
            if process.status != ProcessStatus::Online {
                return true;
            }
            process.stop(force)
        }) {
            Ok(result) => result,
            Err(err) => {
                error!(name = %name, error = %err, "stop failed");
                false
            }
        }
    }

    pub fn restart(&self, name: &str) -> bool {
        match self.try_with_process(name, |process| {
            process.restart_count = 0;
            process.restart()
        }) {
            Ok(result) => result,
            Err(err) => {
                error!(name = %name, error = %err, "restart failed");
                false
            }
        }
    }

    fn try_with_process(
        &self,
        name: &str,
        f: impl FnOnce(&mut ManagedProcess) -> bool,
    ) -> Result<bool, SupervisorError> {
        let handle = {
            let registry = self.registry()?;
            registry
                .get(name)
                .cloned()
                .ok_or_else(|| SupervisorError::UnknownProcess(name.to_string()))?
        };
        let result = {
            let mut process = handle.lock()?;
            f(&mut process)
        };
        self.flush();
        Ok(result)
    }

    /// Stops (if running) and removes `name` from the registry entirely.
    pub fn delete(&self, name: &str) -> bool {
        self.detach_watcher(name);
        let handle = match self.registry() {
            Ok(mut registry) => registry.remove(name),
            Err(err) => {
                error!(name = %name, error = %err, "delete failed");
                return false;
            }
        };
        let Some(handle) = handle else {
            warn!(name = %name, "delete: process not found");
            return false;
        };
        if let Ok(mut process) = handle.lock() {
            process.stop(false);
        }
        self.flush();
        true
    }

    fn all_names(&self) -> Vec<String> {
        self.registry()
            .map(|registry| registry.keys().cloned().collect())
            .unwrap_or_default()
    }

    pub fn stop_all(&self, force: bool) -> usize {
        self.all_names()
            .iter()
            .filter(|name| self.stop(name, force))
            .count()
    }

    pub fn restart_all(&self) -> usize {
        self.all_names()
            .iter()
            .filter(|name| self.restart(name))
            .count()
    }

    pub fn delete_all(&self) -> usize {
        self.all_names()
            .iter()
            .filter(|name| self.delete(name))
            .count()
    }

    /// Restarts every registered process that is not currently `online`.
    /// Watchers for `watch=true` records are already attached by
    /// `Supervisor::new`, so a restart here does not need to re-attach one.
    pub fn resurrect(&self) -> usize {
        self.all_names()
            .iter()
            .filter(|name| {
                let status = self
                    .registry()
                    .ok()
                    .and_then(|registry| registry.get(*name).cloned())
                    .and_then(|handle| handle.lock().ok().map(|p| p.status));
                matches!(status, Some(s) if s != ProcessStatus::Online)
            })
            .filter(|name| self.restart(name))
            .count()
    }

    /// A point-in-time snapshot of every registered process, sorted by name.
    pub fn list(&self) -> Vec<ProcessSnapshot> {
        let handles: Vec<ProcessHandle> = match self.registry() {
            Ok(registry) => registry.values().cloned().collect(),
            Err(err) => {
                error!(error = %err, "list failed");
                return Vec::new();
            }
        };
        let mut snapshots: Vec<ProcessSnapshot> = handles
            .iter()
            .filter_map(|handle| handle.lock().ok().map(|p| ProcessSnapshot::sample(&p)))
            .collect();
        snapshots.sort_by(|a, b| a.name.cmp(&b.name));
        snapshots
    }

    /// The last `lines` lines of `name`'s stdout log.
    pub fn logs(&self, name: &str, lines: usize) -> Result<Vec<String>, SupervisorError> {
        let path = {
            let registry = self.registry()?;
            let handle = registry
                .get(name)
                .ok_or_else(|| SupervisorError::UnknownProcess(name.to_string()))?;
            let process = handle.lock()?;
            process.log_path().clone()
        };
        logs::tail_lines(&path, lines).map_err(|_| SupervisorError::UnknownProcess(name.to_string()))
    }

    /// Streams newly appended stdout lines for `name` to `on_line` until
    /// `stop` is set or the log file disappears.
    pub fn follow_logs(
        &self,
        name: &str,
        stop: Arc<AtomicBool>,
        on_line: impl FnMut(&str),
    ) -> Result<(), SupervisorError> {
        let path = {
            let registry = self.registry()?;
            let handle = registry
                .get(name)
                .ok_or_else(|| SupervisorError::UnknownProcess(name.to_string()))?;
            let process = handle.lock()?;
            process.log_path().clone()
        };
        logs::follow(&path, stop, on_line);
        Ok(())
    }

    /// Truncates the log files for `name`, or for every registered process
    /// when `name` is `None`.
    pub fn flush_logs(&self, name: Option<&str>) -> bool {
        let targets: Vec<String> = match name {
            Some(name) => vec![name.to_string()],
            None => self.all_names(),
        };
        if targets.is_empty() {
            return name.is_none();
        }

        targets.iter().all(|target| {
            let paths = self.registry().ok().and_then(|registry| {
                registry
                    .get(target)
                    .and_then(|handle| handle.lock().ok())
                    .map(|p| (p.log_path().clone(), p.error_log_path().clone()))
            });
            match paths {
                Some((log_path, error_log_path)) => {
                    logs::flush(&log_path, &error_log_path).is_ok()
                }
                None => false,
            }
        })
    }
}

impl Drop for SupervisorInner {
    fn drop(&mut self) {
        self.monitor_shutdown.store(true, Ordering::Relaxed);
        if let Ok(mut guard) = self.monitor_handle.lock() {
            if let Some(handle) = guard.take() {
                let _ = handle.join();
            }
        }
    }
}
