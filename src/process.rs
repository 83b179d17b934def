//! The Managed Process: owns one child OS process across its full lifecycle
//! and produces its observable metrics.
use std::collections::HashMap;
use std::fs::OpenOptions;
use std::io::Write as _;
use std::os::unix::process::CommandExt;
use std::path::PathBuf;
use std::process::{Child, Command, Stdio};
use std::thread;
use std::time::Duration;

use chrono::{DateTime, Utc};
use nix::sys::signal::{self, Signal};
use nix::unistd::Pid as NixPid;
use serde::{Deserialize, Serialize};
use sysinfo::{Pid as SysPid, ProcessesToUpdate, System};
use tracing::{debug, error, info, warn};

use crate::config::{ConfigStore, ProcessOptions, RegistryRecord};
use crate::constants::{GRACEFUL_STOP_TIMEOUT, MIN_RESTART_DELAY, STOP_POLL_INTERVAL};
use crate::error::ProcessError;

/// Lifecycle state of a [`ManagedProcess`]. Serializes as the lowercase
/// strings used throughout the registry schema and CLI output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessStatus {
    Launching,
    Online,
    Stopping,
    Stopped,
    Errored,
}

impl std::fmt::Display for ProcessStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ProcessStatus::Launching => "launching",
            ProcessStatus::Online => "online",
            ProcessStatus::Stopping => "stopping",
            ProcessStatus::Stopped => "stopped",
            ProcessStatus::Errored => "errored",
        };
        f.write_str(s)
    }
}

/// Parameters accepted by [`ManagedProcess::new`], mirroring the CLI's
/// `start` flags and the registry's `options` object.
#[derive(Debug, Clone)]
pub struct StartOptions {
    pub cwd: PathBuf,
    pub args: Vec<String>,
    pub env: HashMap<String, String>,
    pub interpreter: String,
    pub max_restarts: u32,
    pub restart_delay_ms: u64,
    pub autorestart: bool,
    pub watch: bool,
    pub max_memory_restart: Option<String>,
}

/// One supervised workload: its configuration, its OS child (when owned),
/// and its lifecycle state.
pub struct ManagedProcess {
    pub name: String,
    pub script: String,
    pub interpreter: String,
    pub args: Vec<String>,
    pub env: HashMap<String, String>,
    pub cwd: PathBuf,
    pub autorestart: bool,
    pub max_restarts: u32,
    pub restart_delay_ms: u64,
    pub max_memory_restart: Option<String>,
    pub watch: bool,

    pub pid: Option<u32>,
    pub status: ProcessStatus,
    pub restart_count: u32,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub stopped_at: Option<DateTime<Utc>>,

    log_path: PathBuf,
    error_log_path: PathBuf,
    pid_file_path: PathBuf,

    /// The child handle, present only when this instance spawned the
    /// process itself. Absent after resurrection; liveness and signaling
    /// must not depend on it being present.
    child: Option<Child>,

    /// Whether an invalid `max_memory_restart` string has already produced
    /// a warning this run (warn once per run, per the memory-limit grammar).
    memory_limit_warned: bool,
}

impl ManagedProcess {
    /// Constructs a fresh, not-yet-started `ManagedProcess`.
    pub fn new(name: &str, script: &str, options: StartOptions, store: &ConfigStore) -> Self {
        Self {
            name: name.to_string(),
            script: script.to_string(),
            interpreter: options.interpreter,
            args: options.args,
            env: options.env,
            cwd: options.cwd,
            autorestart: options.autorestart,
            max_restarts: options.max_restarts,
            restart_delay_ms: options.restart_delay_ms,
            max_memory_restart: options.max_memory_restart,
            watch: options.watch,

            pid: None,
            status: ProcessStatus::Stopped,
            restart_count: 0,
            created_at: Utc::now(),
            started_at: None,
            stopped_at: None,

            log_path: store.log_path(name),
            error_log_path: store.error_log_path(name),
            pid_file_path: store.pid_file_path(name),

            child: None,
            memory_limit_warned: false,
        }
    }

    /// Rehydrates a `ManagedProcess` from a registry record at supervisor
    /// boot. The entry has no owned child handle regardless of the
    /// recorded status; [`Supervisor`](crate::supervisor::Supervisor) boot
    /// reconciliation decides whether the stored PID is still alive.
    pub fn from_record(name: &str, record: &RegistryRecord, store: &ConfigStore) -> Self {
        let options = StartOptions {
            cwd: record.options.cwd.clone(),
            args: record.options.args.clone(),
            env: record.options.env.clone(),
            interpreter: record.options.interpreter.clone(),
            max_restarts: record.options.max_restarts,
            restart_delay_ms: record.options.restart_delay_ms,
            autorestart: record.options.autorestart,
            watch: record.options.watch,
            max_memory_restart: record.options.max_memory_restart.clone(),
        };
        let mut process = Self::new(name, &record.script, options, store);
        process.pid = record.pid;
        process.status = ProcessStatus::Stopped;
        process
    }

    pub fn to_record(&self) -> RegistryRecord {
        RegistryRecord {
            script: self.script.clone(),
            pid: self.pid,
            status: self.status,
            options: ProcessOptions {
                cwd: self.cwd.clone(),
                args: self.args.clone(),
                env: self.env.clone(),
                interpreter: self.interpreter.clone(),
                max_restarts: self.max_restarts,
                restart_delay_ms: self.restart_delay_ms,
                autorestart: self.autorestart,
                watch: self.watch,
                max_memory_restart: self.max_memory_restart.clone(),
            },
        }
    }

    pub fn log_path(&self) -> &PathBuf {
        &self.log_path
    }

    pub fn error_log_path(&self) -> &PathBuf {
        &self.error_log_path
    }

    /// Starts the child process. Returns `false` without side effects if
    /// already `online`; on spawn failure (including a non-existent `cwd`,
    /// which is a configuration error, not one this layer should paper
    /// over) the process transitions to `errored` and the failure is
    /// appended to the error log.
    pub fn start(&mut self) -> bool {
        if self.status == ProcessStatus::Online {
            return false;
        }
        self.status = ProcessStatus::Launching;

        match self.try_spawn() {
            Ok(pid) => {
                self.pid = Some(pid);
                self.status = ProcessStatus::Online;
                self.started_at = Some(Utc::now());
                info!(name = %self.name, pid, "process started");
                true
            }
            Err(err) => {
                self.status = ProcessStatus::Errored;
                self.append_error_log(&format!("failed to start process: {err}"));
                error!(name = %self.name, error = %err, "process failed to start");
                false
            }
        }
    }

    fn try_spawn(&mut self) -> Result<u32, ProcessError> {
        let (child, pid) = self.spawn_child()?;
        self.child = Some(child);
        if let Err(err) = self.write_pid_file(pid) {
            warn!(name = %self.name, error = %err, "failed to write pid file");
        }
        Ok(pid)
    }

    fn spawn_child(&self) -> Result<(Child, u32), ProcessError> {
        let open_log = |path: &PathBuf| {
            OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .map_err(|source| ProcessError::LogOpenFailed {
                    name: self.name.clone(),
                    source,
                })
        };
        let log_file = open_log(&self.log_path)?;
        let error_file = open_log(&self.error_log_path)?;

        let mut cmd = if self.interpreter.is_empty() {
            let mut cmd = Command::new(&self.script);
            cmd.args(&self.args);
            cmd
        } else {
            let mut cmd = Command::new(&self.interpreter);
            cmd.arg(&self.script).args(&self.args);
            cmd
        };

        cmd.current_dir(&self.cwd)
            .envs(&self.env)
            .stdin(Stdio::null())
            .stdout(Stdio::from(log_file))
            .stderr(Stdio::from(error_file));

        // Spawn the child as a new session leader so the whole process
        // group it may fork into can be signaled as a unit.
        unsafe {
            cmd.pre_exec(|| {
                libc::setsid();
                Ok(())
            });
        }

        let mut child = cmd.spawn().map_err(|source| ProcessError::SpawnFailed {
            name: self.name.clone(),
            source,
        })?;
        let pid = child.id();
        // Reap immediately if the child exits before we ever observe it
        // alive, so `try_wait` state stays consistent for later polls.
        let _ = child.try_wait();
        Ok((child, pid))
    }

    fn write_pid_file(&self, pid: u32) -> Result<(), ProcessError> {
        std::fs::write(&self.pid_file_path, pid.to_string()).map_err(|source| {
            ProcessError::PidFileWrite {
                name: self.name.clone(),
                source,
            }
        })
    }

    /// Stops the child. Graceful (`force=false`): SIGTERM the process
    /// group, wait up to 5s, escalate to SIGKILL. Forceful: SIGKILL
    /// immediately. No-op (returns `false`) unless currently `online`.
    pub fn stop(&mut self, force: bool) -> bool {
        if self.status != ProcessStatus::Online {
            return false;
        }
        self.status = ProcessStatus::Stopping;

        if let Some(pid) = self.pid {
            if force {
                self.signal_and_log(pid, Signal::SIGKILL);
                self.reap(Some(GRACEFUL_STOP_TIMEOUT));
            } else {
                self.signal_and_log(pid, Signal::SIGTERM);
                let deadline = std::time::Instant::now() + GRACEFUL_STOP_TIMEOUT;
                while std::time::Instant::now() < deadline && self.poll_alive() {
                    thread::sleep(STOP_POLL_INTERVAL);
                }
                if self.poll_alive() {
                    warn!(name = %self.name, pid, "process ignored SIGTERM, sending SIGKILL");
                    self.signal_and_log(pid, Signal::SIGKILL);
                    self.reap(Some(GRACEFUL_STOP_TIMEOUT));
                } else {
                    self.reap(Some(Duration::from_millis(0)));
                }
            }
        }

        self.status = ProcessStatus::Stopped;
        self.stopped_at = Some(Utc::now());
        if let Err(err) = self.remove_pid_file() {
            warn!(name = %self.name, error = %err, "failed to remove pid file");
        }
        self.pid = None;
        self.child = None;
        info!(name = %self.name, "process stopped");
        true
    }

    /// Stops (escalating to force if needed) then starts again after the
    /// restart-delay floor. Does not reset `restart_count` — callers
    /// driving a user-initiated restart reset it themselves before
    /// calling this, per the restart-count reset policy.
    pub fn restart(&mut self) -> bool {
        info!(name = %self.name, "restarting process");

        if self.status == ProcessStatus::Online {
            let pid = self.pid;
            info!(name = %self.name, ?pid, "stopping process before restart");
            if !self.stop(false) {
                error!(name = %self.name, "graceful stop failed, forcing kill");
                self.stop(true);
            }
        }

        let delay = Duration::from_millis(self.restart_delay_ms).max(MIN_RESTART_DELAY);
        thread::sleep(delay);

        self.cleanup_resources();

        info!(name = %self.name, "starting new process instance");
        let result = self.start();
        if result {
            info!(name = %self.name, pid = ?self.pid, "process restarted successfully");
        } else {
            error!(name = %self.name, "failed to restart process");
        }
        result
    }

    /// Invoked once per tick by the Supervisor's monitor loop.
    pub fn monitor(&mut self) {
        if let Some(child) = self.child.as_mut() {
            let _ = child.try_wait();
        }

        if self.status == ProcessStatus::Online && !self.is_alive() {
            self.status = ProcessStatus::Errored;

            if self.autorestart && self.restart_count < self.max_restarts {
                self.restart_count += 1;
                info!(
                    name = %self.name,
                    restart_count = self.restart_count,
                    max_restarts = self.max_restarts,
                    "process crashed, restarting"
                );
                self.restart();
            } else if self.autorestart {
                warn!(name = %self.name, "restart budget exhausted, leaving process errored");
            }
        }

        // Memory-triggered restarts are a separate check, not an `else` of
        // the crash-restart branch above: a process that is still alive
        // but over budget takes this path without touching restart_count.
        if let Some(limit) = self.max_memory_restart.clone() {
            match Self::parse_memory_limit(&limit) {
                Some(limit_mb) => {
                    if let Some(mem_mb) = self.memory_mb() {
                        if mem_mb > limit_mb {
                            info!(
                                name = %self.name,
                                memory_mb = mem_mb,
                                limit_mb,
                                "memory limit exceeded, restarting"
                            );
                            self.restart();
                        }
                    }
                }
                None => {
                    if !self.memory_limit_warned {
                        warn!(name = %self.name, limit = %limit, "invalid max_memory_restart value, skipping memory check");
                        self.memory_limit_warned = true;
                    }
                }
            }
        }
    }

    /// Liveness determined from OS introspection of the recorded PID, not
    /// the owned child handle alone, so a resurrected process can still be
    /// observed.
    pub fn is_alive(&self) -> bool {
        let Some(pid) = self.pid else {
            return false;
        };
        let mut system = System::new();
        system.refresh_processes(ProcessesToUpdate::Some(&[SysPid::from_u32(pid)]), true);
        system.process(SysPid::from_u32(pid)).is_some()
    }

    fn poll_alive(&self) -> bool {
        self.is_alive()
    }

    /// Resident-set size in mebibytes, or `None` if not alive.
    pub fn memory_mb(&self) -> Option<u64> {
        let pid = self.pid?;
        let mut system = System::new();
        system.refresh_processes(ProcessesToUpdate::Some(&[SysPid::from_u32(pid)]), true);
        let process = system.process(SysPid::from_u32(pid))?;
        // sysinfo reports memory() in KiB.
        Some(process.memory() / 1024)
    }

    /// Short-interval CPU percentage, or `None` if not alive.
    pub fn cpu_percent(&self) -> Option<f32> {
        let pid = self.pid?;
        let mut system = System::new();
        system.refresh_processes(ProcessesToUpdate::Some(&[SysPid::from_u32(pid)]), true);
        let process = system.process(SysPid::from_u32(pid))?;
        Some(process.cpu_usage())
    }

    /// Parses the `<integer>[M|G]` memory-limit grammar into mebibytes.
    pub fn parse_memory_limit(limit: &str) -> Option<u64> {
        let limit = limit.trim();
        if let Some(num) = limit.strip_suffix('G').or_else(|| limit.strip_suffix('g')) {
            num.trim().parse::<u64>().ok().map(|gib| gib * 1024)
        } else if let Some(num) = limit.strip_suffix('M').or_else(|| limit.strip_suffix('m')) {
            num.trim().parse::<u64>().ok()
        } else {
            limit.parse::<u64>().ok()
        }
    }

    /// Removes the PID file if present, force-kills any residual process
    /// still holding the remembered PID, then clears `pid`. Run before
    /// every respawn in `restart()` so a slow-dying predecessor cannot be
    /// confused with the next instance.
    fn cleanup_resources(&mut self) {
        if let Err(err) = self.remove_pid_file() {
            warn!(name = %self.name, error = %err, "failed to remove pid file");
        }

        if let Some(pid) = self.pid {
            if self.is_alive() {
                warn!(name = %self.name, pid, "process still running, force killing");
                if let Err(err) = self.signal_group(pid, Signal::SIGKILL) {
                    warn!(name = %self.name, pid, error = %err, "failed to force kill");
                }
                thread::sleep(Duration::from_millis(500));
            }
        }
        self.pid = None;
    }

    fn remove_pid_file(&self) -> Result<(), ProcessError> {
        if !self.pid_file_path.exists() {
            return Ok(());
        }
        std::fs::remove_file(&self.pid_file_path).map_err(|source| ProcessError::PidFileRemove {
            name: self.name.clone(),
            source,
        })
    }

    /// `signal_group`, logging and swallowing any `ProcessError` — the
    /// stop sequence keeps going regardless of a single signal failure.
    fn signal_and_log(&self, pid: u32, sig: Signal) {
        if let Err(err) = self.signal_group(pid, sig) {
            warn!(name = %self.name, pid, ?sig, error = %err, "failed to signal process group");
        }
    }

    /// Sends `signal` to the process group rooted at `pid`. ESRCH (already
    /// gone) is swallowed, matching the stop/kill-race error policy.
    fn signal_group(&self, pid: u32, sig: Signal) -> Result<(), ProcessError> {
        let pgid = match nix::unistd::getpgid(Some(NixPid::from_raw(pid as i32))) {
            Ok(pgid) => pgid,
            Err(nix::errno::Errno::ESRCH) => return Ok(()),
            Err(source) => {
                return Err(ProcessError::SignalFailed {
                    name: self.name.clone(),
                    source,
                });
            }
        };

        // kill(-pgid, sig) is the POSIX killpg equivalent.
        match signal::kill(NixPid::from_raw(-pgid.as_raw()), sig) {
            Ok(()) | Err(nix::errno::Errno::ESRCH) => Ok(()),
            Err(source) => Err(ProcessError::SignalFailed {
                name: self.name.clone(),
                source,
            }),
        }
    }

    /// Opportunistically reaps the owned child handle, if any, within
    /// `timeout`. A no-op when the process was never spawned by this
    /// instance (post-resurrection).
    fn reap(&mut self, timeout: Option<Duration>) {
        let Some(child) = self.child.as_mut() else {
            return;
        };
        if let Some(timeout) = timeout {
            let deadline = std::time::Instant::now() + timeout;
            while std::time::Instant::now() < deadline {
                if matches!(child.try_wait(), Ok(Some(_))) {
                    break;
                }
                thread::sleep(Duration::from_millis(20));
            }
        } else {
            let _ = child.try_wait();
        }
    }

    fn append_error_log(&self, message: &str) {
        let timestamp = Utc::now().format("%Y-%m-%d %H:%M:%S");
        if let Ok(mut file) = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.error_log_path)
        {
            let _ = writeln!(file, "[{timestamp}] ERROR: {message}");
        }
    }
}
