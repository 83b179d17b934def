#[path = "common/mod.rs"]
mod common;

use std::collections::HashMap;

use tempfile::tempdir;
use warden::process::{ProcessStatus, StartOptions};
use warden::supervisor::Supervisor;

fn sleep_options(cwd: std::path::PathBuf) -> StartOptions {
    StartOptions {
        cwd,
        args: vec!["-c".to_string(), "sleep 30".to_string()],
        env: HashMap::new(),
        interpreter: String::new(),
        max_restarts: 10,
        restart_delay_ms: 50,
        autorestart: false,
        watch: false,
        max_memory_restart: None,
    }
}

#[test]
fn a_live_process_is_adopted_as_online_across_restarts() {
    let temp = tempdir().expect("tempdir");
    let state_dir = temp.path().join("state");

    let first = Supervisor::new(state_dir.clone()).expect("supervisor");
    first.start("persistent", "/bin/sh", sleep_options(temp.path().to_path_buf()));
    let pid = first.list()[0].pid.expect("pid set");
    // Drop without stopping the process: simulates a supervisor crash, the
    // managed child keeps running as an orphan.
    first.shutdown();
    drop(first);

    let second = Supervisor::new(state_dir).expect("reopened supervisor");
    let snapshot = second.list();
    assert_eq!(snapshot.len(), 1);
    assert_eq!(snapshot[0].status, ProcessStatus::Online);
    assert_eq!(snapshot[0].pid, Some(pid));

    second.stop("persistent", true);
    second.shutdown();
}

#[test]
fn a_dead_process_is_loaded_as_stopped_with_no_pid() {
    let temp = tempdir().expect("tempdir");
    let state_dir = temp.path().join("state");

    let first = Supervisor::new(state_dir.clone()).expect("supervisor");
    first.start("short-lived", "/bin/sh", sleep_options(temp.path().to_path_buf()));
    first.stop("short-lived", true);
    first.shutdown();
    drop(first);

    let second = Supervisor::new(state_dir).expect("reopened supervisor");
    let snapshot = second.list();
    assert_eq!(snapshot[0].status, ProcessStatus::Stopped);
    assert_eq!(snapshot[0].pid, None);

    second.shutdown();
}

#[test]
fn registry_file_survives_as_valid_json_after_many_operations() {
    let temp = tempdir().expect("tempdir");
    let state_dir = temp.path().join("state");
    let supervisor = Supervisor::new(state_dir.clone()).expect("supervisor");

    supervisor.start("a", "/bin/sh", sleep_options(temp.path().to_path_buf()));
    supervisor.start("b", "/bin/sh", sleep_options(temp.path().to_path_buf()));
    supervisor.restart("a");
    supervisor.delete("b");
    supervisor.shutdown();

    let raw = std::fs::read_to_string(state_dir.join("processes.json")).expect("read registry");
    let parsed: serde_json::Value = serde_json::from_str(&raw).expect("valid json");
    assert!(parsed.get("a").is_some());
    assert!(parsed.get("b").is_none());
}
