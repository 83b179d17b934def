//! Point-in-time rendering of a [`ManagedProcess`](crate::process::ManagedProcess),
//! as returned by `Supervisor::list`.
use serde::Serialize;

use crate::process::{ManagedProcess, ProcessStatus};

/// A snapshot of one managed process, cheap enough to sample on every
/// `list()` call and serializable directly for `--json` output.
#[derive(Debug, Clone, Serialize)]
pub struct ProcessSnapshot {
    pub name: String,
    pub script: String,
    pub status: ProcessStatus,
    pub pid: Option<u32>,
    pub restart_count: u32,
    pub cpu_percent: Option<f32>,
    pub memory_mb: Option<u64>,
    pub uptime_seconds: Option<i64>,
}

impl ProcessSnapshot {
    pub fn sample(process: &ManagedProcess) -> Self {
        let uptime_seconds = match process.status {
            ProcessStatus::Online => process
                .started_at
                .map(|started| (chrono::Utc::now() - started).num_seconds()),
            _ => None,
        };

        Self {
            name: process.name.clone(),
            script: process.script.clone(),
            status: process.status,
            pid: process.pid,
            restart_count: process.restart_count,
            cpu_percent: process.cpu_percent(),
            memory_mb: process.memory_mb(),
            uptime_seconds,
        }
    }
}
