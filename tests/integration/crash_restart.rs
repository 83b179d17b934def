#[path = "common/mod.rs"]
mod common;

use std::collections::HashMap;
use std::time::Duration;

use tempfile::tempdir;
use warden::process::{ProcessStatus, StartOptions};
use warden::supervisor::Supervisor;

fn quick_exit_options(cwd: std::path::PathBuf, max_restarts: u32) -> StartOptions {
    StartOptions {
        cwd,
        args: vec!["-c".to_string(), "exit 1".to_string()],
        env: HashMap::new(),
        interpreter: String::new(),
        max_restarts,
        restart_delay_ms: 50,
        autorestart: true,
        watch: false,
        max_memory_restart: None,
    }
}

#[test]
fn crashed_process_is_restarted_and_budget_is_counted() {
    let temp = tempdir().expect("tempdir");
    let supervisor = Supervisor::new(temp.path().join("state")).expect("supervisor");

    supervisor.start("flaky", "/bin/sh", quick_exit_options(temp.path().to_path_buf(), 5));

    common::wait_until(
        || {
            supervisor
                .list()
                .iter()
                .any(|s| s.name == "flaky" && s.restart_count >= 1)
        },
        "restart_count to increase past 0",
    );

    supervisor.stop_all(true);
    supervisor.shutdown();
}

#[test]
fn exhausted_restart_budget_leaves_process_errored() {
    let temp = tempdir().expect("tempdir");
    let supervisor = Supervisor::new(temp.path().join("state")).expect("supervisor");

    supervisor.start("doomed", "/bin/sh", quick_exit_options(temp.path().to_path_buf(), 1));

    common::wait_until(
        || {
            supervisor
                .list()
                .iter()
                .any(|s| s.name == "doomed" && s.status == ProcessStatus::Errored)
        },
        "process to land in errored after exhausting its restart budget",
    );

    // Budget exhausted: no further restarts should occur even after more ticks.
    std::thread::sleep(Duration::from_secs(2));
    let snapshot = supervisor.list();
    let doomed = snapshot.iter().find(|s| s.name == "doomed").expect("present");
    assert_eq!(doomed.status, ProcessStatus::Errored);
    assert!(doomed.restart_count <= 1);

    supervisor.shutdown();
}

#[test]
fn user_initiated_restart_resets_the_crash_budget() {
    let temp = tempdir().expect("tempdir");
    let supervisor = Supervisor::new(temp.path().join("state")).expect("supervisor");

    supervisor.start("doomed", "/bin/sh", quick_exit_options(temp.path().to_path_buf(), 1));
    common::wait_until(
        || {
            supervisor
                .list()
                .iter()
                .any(|s| s.name == "doomed" && s.status == ProcessStatus::Errored)
        },
        "process to exhaust its budget once",
    );

    // Re-starting the same name delegates to restart() and clears restart_count,
    // even though the underlying script still exits immediately.
    supervisor.start("doomed", "/bin/sh", quick_exit_options(temp.path().to_path_buf(), 1));

    let after = supervisor.list();
    let doomed = after.iter().find(|s| s.name == "doomed").expect("present");
    assert_eq!(doomed.restart_count, 0);

    supervisor.shutdown();
}
