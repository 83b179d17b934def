//! The File Watcher: polls a set of paths for a Managed Process and
//! triggers a restart on change, debounced.
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Instant, SystemTime};

use tracing::debug;

use crate::constants::{
    PROJECT_MARKER_FILES, PROJECT_SOURCE_SUBDIRS, WATCHER_DEBOUNCE_WINDOW, WATCHER_POLL_INTERVAL,
    WATCH_EXTENSIONS, WATCH_IGNORE_PATTERNS,
};

/// Walks upward from `script`'s parent directory looking for a project
/// marker file; on finding one, also includes its `src/`, `lib/`, `app/`
/// sub-trees when present. Always includes the script's own parent.
pub fn default_roots(script: &Path) -> Vec<PathBuf> {
    let parent = script
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));

    let mut roots = vec![parent.clone()];

    let mut current = parent.as_path();
    loop {
        if PROJECT_MARKER_FILES
            .iter()
            .any(|marker| current.join(marker).is_file())
        {
            for subdir in PROJECT_SOURCE_SUBDIRS {
                let candidate = current.join(subdir);
                if candidate.is_dir() {
                    roots.push(candidate);
                }
            }
            break;
        }
        match current.parent() {
            Some(next) => current = next,
            None => break,
        }
    }

    roots
}

/// True if `path` should be considered by the watcher: its name matches the
/// positive extension set and it matches none of the ignore patterns.
fn is_relevant(path: &Path) -> bool {
    let path_str = path.to_string_lossy();
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    let has_relevant_extension = WATCH_EXTENSIONS.iter().any(|ext| name.ends_with(ext));
    if !has_relevant_extension {
        return false;
    }

    let ignored = WATCH_IGNORE_PATTERNS.iter().any(|pattern| {
        if let Some(suffix) = pattern.strip_prefix('*') {
            name.ends_with(suffix)
        } else {
            path_str.contains(pattern)
        }
    });

    !ignored
}

fn walk(root: &Path, out: &mut Vec<PathBuf>) {
    let Ok(entries) = std::fs::read_dir(root) else {
        return;
    };
    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            let dir_name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            if WATCH_IGNORE_PATTERNS
                .iter()
                .any(|pattern| pattern.trim_start_matches('*') == dir_name)
            {
                continue;
            }
            walk(&path, out);
        } else if is_relevant(&path) {
            out.push(path);
        }
    }
}

/// Spawns a background thread that polls `roots` every tick and invokes
/// `on_change` at most once per [`WATCHER_DEBOUNCE_WINDOW`]. Stops when
/// `stop` is set.
pub fn spawn_watcher<F>(
    name: String,
    roots: Vec<PathBuf>,
    stop: Arc<AtomicBool>,
    on_change: F,
) -> JoinHandle<()>
where
    F: Fn(&str) + Send + 'static,
{
    thread::spawn(move || {
        let mut last_mtimes: HashMap<PathBuf, SystemTime> = HashMap::new();
        let mut last_restart: Option<Instant> = None;

        while !stop.load(Ordering::Relaxed) {
            thread::sleep(WATCHER_POLL_INTERVAL);
            if stop.load(Ordering::Relaxed) {
                break;
            }

            let mut paths = Vec::new();
            for root in &roots {
                walk(root, &mut paths);
            }

            let mut changed = false;
            for path in &paths {
                let Ok(metadata) = std::fs::metadata(path) else {
                    continue;
                };
                let Ok(mtime) = metadata.modified() else {
                    continue;
                };
                match last_mtimes.get(path) {
                    Some(previous) if mtime > *previous => changed = true,
                    None => {} // first observation establishes the baseline, not a change
                    _ => {}
                }
                last_mtimes.insert(path.clone(), mtime);
            }

            if !changed {
                continue;
            }

            let debounced = last_restart
                .map(|t| t.elapsed() < WATCHER_DEBOUNCE_WINDOW)
                .unwrap_or(false);
            if debounced {
                debug!(name = %name, "watcher change suppressed by debounce window");
                continue;
            }

            debug!(name = %name, "watcher detected change, triggering restart");
            last_restart = Some(Instant::now());
            on_change(&name);
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn marker_extension_matches_by_suffix() {
        assert!(is_relevant(Path::new("/app/server.py")));
        assert!(!is_relevant(Path::new("/app/server.pyc")));
    }

    #[test]
    fn ignore_pattern_matches_anywhere_in_path() {
        assert!(!is_relevant(Path::new(
            "/app/node_modules/pkg/index.json"
        )));
    }

    #[test]
    fn wildcard_ignore_pattern_matches_by_filename_suffix() {
        assert!(!is_relevant(Path::new("/app/config.json.lock")));
    }

    #[test]
    fn default_roots_always_includes_script_parent() {
        let temp = tempfile::tempdir().expect("tempdir");
        let script = temp.path().join("app.py");
        std::fs::write(&script, b"").expect("write script");
        let roots = default_roots(&script);
        assert!(roots.contains(&temp.path().to_path_buf()));
    }

    #[test]
    fn default_roots_includes_src_subdir_once_marker_found() {
        let temp = tempfile::tempdir().expect("tempdir");
        std::fs::write(temp.path().join("pyproject.toml"), b"").expect("write marker");
        std::fs::create_dir(temp.path().join("src")).expect("mkdir src");
        let script = temp.path().join("app.py");
        std::fs::write(&script, b"").expect("write script");

        let roots = default_roots(&script);
        assert!(roots.contains(&temp.path().join("src")));
    }
}
