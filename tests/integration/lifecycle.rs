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
fn start_stop_restart_delete_round_trip() {
    let temp = tempdir().expect("tempdir");
    let supervisor = Supervisor::new(temp.path().join("state")).expect("supervisor");

    assert!(supervisor.start("web", "/bin/sh", sleep_options(temp.path().to_path_buf())));
    let before = supervisor.list();
    assert_eq!(before.len(), 1);
    assert_eq!(before[0].status, ProcessStatus::Online);
    let first_pid = before[0].pid.expect("pid set while online");

    assert!(supervisor.restart("web"));
    let after_restart = supervisor.list();
    assert_eq!(after_restart[0].status, ProcessStatus::Online);
    assert_ne!(after_restart[0].pid, Some(first_pid));

    assert!(supervisor.stop("web", true));
    assert_eq!(supervisor.list()[0].status, ProcessStatus::Stopped);

    assert!(supervisor.delete("web"));
    assert!(supervisor.list().is_empty());

    supervisor.shutdown();
}

#[test]
fn stopping_a_process_twice_is_a_noop_the_second_time() {
    let temp = tempdir().expect("tempdir");
    let supervisor = Supervisor::new(temp.path().join("state")).expect("supervisor");

    supervisor.start("worker", "/bin/sh", sleep_options(temp.path().to_path_buf()));
    assert!(supervisor.stop("worker", true));
    // Already stopped: a no-op success, not a failure.
    assert!(supervisor.stop("worker", true));

    supervisor.shutdown();
}

#[test]
fn resurrect_restarts_all_non_online_processes() {
    let temp = tempdir().expect("tempdir");
    let supervisor = Supervisor::new(temp.path().join("state")).expect("supervisor");

    supervisor.start("a", "/bin/sh", sleep_options(temp.path().to_path_buf()));
    supervisor.start("b", "/bin/sh", sleep_options(temp.path().to_path_buf()));
    supervisor.stop("a", true);
    supervisor.stop("b", true);
    assert!(supervisor.list().iter().all(|s| s.status == ProcessStatus::Stopped));

    let resurrected = supervisor.resurrect();
    assert_eq!(resurrected, 2);
    assert!(supervisor.list().iter().all(|s| s.status == ProcessStatus::Online));

    supervisor.stop_all(true);
    supervisor.shutdown();
}

#[test]
fn list_is_sorted_by_name() {
    let temp = tempdir().expect("tempdir");
    let supervisor = Supervisor::new(temp.path().join("state")).expect("supervisor");

    supervisor.start("zeta", "/bin/sh", sleep_options(temp.path().to_path_buf()));
    supervisor.start("alpha", "/bin/sh", sleep_options(temp.path().to_path_buf()));

    let names: Vec<String> = supervisor.list().into_iter().map(|s| s.name).collect();
    assert_eq!(names, vec!["alpha", "zeta"]);

    supervisor.stop_all(true);
    supervisor.shutdown();
}
