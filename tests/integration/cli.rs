#[path = "common/mod.rs"]
mod common;

use assert_cmd::Command;
use common::HomeEnvGuard;
use predicates::prelude::*;
use tempfile::tempdir;

#[test]
fn start_list_stop_round_trip_through_the_binary() {
    let temp = tempdir().expect("tempdir");
    let home = temp.path().join("home");
    std::fs::create_dir_all(&home).expect("mkdir home");
    let _home = HomeEnvGuard::set(&home);

    Command::cargo_bin("warden")
        .expect("binary built")
        .args(["start", "/bin/sh", "--name", "demo", "--", "-c", "sleep 30"])
        .assert()
        .success()
        .stdout(predicate::str::contains("started 'demo'"));

    Command::cargo_bin("warden")
        .expect("binary built")
        .args(["list", "--json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"name\": \"demo\""))
        .stdout(predicate::str::contains("\"online\""));

    Command::cargo_bin("warden")
        .expect("binary built")
        .args(["stop", "demo", "--force"])
        .assert()
        .success()
        .stdout(predicate::str::contains("stopped 'demo'"));

    Command::cargo_bin("warden")
        .expect("binary built")
        .args(["delete", "demo"])
        .assert()
        .success();
}

#[test]
fn stopping_an_unregistered_process_exits_nonzero() {
    let temp = tempdir().expect("tempdir");
    let home = temp.path().join("home");
    std::fs::create_dir_all(&home).expect("mkdir home");
    let _home = HomeEnvGuard::set(&home);

    Command::cargo_bin("warden")
        .expect("binary built")
        .args(["stop", "ghost"])
        .assert()
        .failure();
}

#[test]
fn list_on_an_empty_registry_reports_no_processes() {
    let temp = tempdir().expect("tempdir");
    let home = temp.path().join("home");
    std::fs::create_dir_all(&home).expect("mkdir home");
    let _home = HomeEnvGuard::set(&home);

    Command::cargo_bin("warden")
        .expect("binary built")
        .arg("list")
        .assert()
        .success()
        .stdout(predicate::str::contains("No processes registered."));
}
