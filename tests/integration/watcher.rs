#[path = "common/mod.rs"]
mod common;

use std::collections::HashMap;

use tempfile::tempdir;
use warden::process::StartOptions;
use warden::supervisor::Supervisor;
use warden::watcher::default_roots;

#[test]
fn changing_a_watched_file_triggers_a_restart() {
    let temp = tempdir().expect("tempdir");
    let script = temp.path().join("app.py");
    std::fs::write(&script, "# v1\n").expect("write script");

    let supervisor = Supervisor::new(temp.path().join("state")).expect("supervisor");
    let options = StartOptions {
        cwd: temp.path().to_path_buf(),
        args: vec!["-c".to_string(), "sleep 30".to_string()],
        env: HashMap::new(),
        interpreter: String::new(),
        max_restarts: 10,
        restart_delay_ms: 50,
        autorestart: false,
        watch: true,
        max_memory_restart: None,
    };
    assert!(supervisor.start("watched", script.to_str().expect("utf8 path"), options));

    let first_pid = supervisor.list()[0].pid.expect("pid set while online");

    // Give the watcher a tick to record its baseline mtimes before editing.
    std::thread::sleep(std::time::Duration::from_millis(1200));
    std::fs::write(&script, "# v2\n").expect("rewrite script");

    common::wait_until(
        || {
            supervisor
                .list()
                .first()
                .map(|s| s.pid.is_some() && s.pid != Some(first_pid))
                .unwrap_or(false)
        },
        "watcher to notice the change and restart the process",
    );

    supervisor.stop("watched", true);
    supervisor.shutdown();
}

#[test]
fn default_roots_always_includes_the_scripts_own_directory() {
    let temp = tempdir().expect("tempdir");
    let script = temp.path().join("app.py");
    std::fs::write(&script, "").expect("write script");

    let roots = default_roots(&script);
    assert!(roots.contains(&temp.path().to_path_buf()));
}
