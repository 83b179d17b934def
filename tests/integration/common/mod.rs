#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

/// Sets `HOME` for the lifetime of the guard, serialized against other tests
/// mutating the environment, and restores the previous value on drop.
pub struct HomeEnvGuard {
    previous: Option<String>,
    _lock: std::sync::MutexGuard<'static, ()>,
}

impl HomeEnvGuard {
    pub fn set(home: &Path) -> Self {
        let lock = warden::test_utils::env_lock();
        let previous = std::env::var("HOME").ok();
        unsafe {
            std::env::set_var("HOME", home);
        }
        Self {
            previous,
            _lock: lock,
        }
    }
}

impl Drop for HomeEnvGuard {
    fn drop(&mut self) {
        match &self.previous {
            Some(value) => unsafe { std::env::set_var("HOME", value) },
            None => unsafe { std::env::remove_var("HOME") },
        }
    }
}

/// Polls `path` until it exists and contains at least `expected` lines, or
/// panics after a 5s deadline.
pub fn wait_for_lines(path: &Path, expected: usize) -> Vec<String> {
    let deadline = Instant::now() + Duration::from_secs(5);
    loop {
        if let Ok(content) = std::fs::read_to_string(path) {
            let lines: Vec<String> = content.lines().map(str::to_string).collect();
            if lines.len() >= expected {
                return lines;
            }
        }
        if Instant::now() >= deadline {
            panic!("timed out waiting for {expected} lines in {path:?}");
        }
        std::thread::sleep(Duration::from_millis(100));
    }
}

/// Polls until `predicate` returns true or panics after a 5s deadline.
pub fn wait_until(mut predicate: impl FnMut() -> bool, message: &str) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while !predicate() {
        if Instant::now() >= deadline {
            panic!("timed out waiting for: {message}");
        }
        std::thread::sleep(Duration::from_millis(100));
    }
}

/// A temp dir holding a fake state dir and a writable script under test.
pub fn state_dir_under(root: &Path) -> PathBuf {
    root.join("state")
}
