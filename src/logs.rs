//! Reading and following a Managed Process's stdout/stderr log files.
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use tracing::warn;

use crate::constants::LOG_FOLLOW_POLL_INTERVAL;
use crate::error::LogsError;

/// Returns the last `lines` lines of `path`, oldest first. An absent file
/// yields an empty result rather than an error, matching a process that has
/// never produced output yet.
pub fn tail_lines(path: &Path, lines: usize) -> Result<Vec<String>, LogsError> {
    let contents = match std::fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(err) => return Err(LogsError::ReadFailed(err)),
    };

    let all_lines: Vec<&str> = contents.lines().collect();
    let start = all_lines.len().saturating_sub(lines);
    Ok(all_lines[start..].iter().map(|s| s.to_string()).collect())
}

/// Polls `path` for appended bytes and invokes `on_line` with each complete
/// line as it appears, until `stop` is set or the file disappears. Starts
/// from the file's current end, not its beginning.
pub fn follow<F>(path: &Path, stop: Arc<AtomicBool>, mut on_line: F)
where
    F: FnMut(&str),
{
    let mut file = match File::open(path) {
        Ok(file) => file,
        Err(err) => {
            warn!(path = %path.display(), error = %err, "cannot follow log file");
            return;
        }
    };

    let mut offset = file.metadata().map(|m| m.len()).unwrap_or(0);
    let mut carry = String::new();

    while !stop.load(Ordering::Relaxed) {
        thread::sleep(LOG_FOLLOW_POLL_INTERVAL);
        if stop.load(Ordering::Relaxed) {
            break;
        }

        let Ok(metadata) = std::fs::metadata(path) else {
            break; // file disappeared
        };
        let len = metadata.len();
        if len < offset {
            // Truncated (e.g. by flush_logs): restart from the new beginning.
            offset = 0;
            carry.clear();
        }
        if len == offset {
            continue;
        }

        if file.seek(SeekFrom::Start(offset)).is_err() {
            break;
        }
        let mut buf = String::new();
        if file.read_to_string(&mut buf).is_err() {
            break;
        }
        offset = len;

        carry.push_str(&buf);
        while let Some(pos) = carry.find('\n') {
            let line: String = carry.drain(..=pos).collect();
            on_line(line.trim_end_matches('\n'));
        }
    }
}

/// Removes both the stdout and stderr log files for a process. Missing
/// files are not an error. Unlinking rather than truncating in place means
/// a concurrent `logs --follow` observes the file disappear, matching the
/// race it already has to handle.
pub fn flush(log_path: &Path, error_log_path: &Path) -> Result<(), LogsError> {
    for path in [log_path, error_log_path] {
        match std::fs::remove_file(path) {
            Ok(()) => {}
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
            Err(err) => return Err(LogsError::ReadFailed(err)),
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tail_lines_returns_empty_for_missing_file() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("missing.log");
        assert_eq!(tail_lines(&path, 10).expect("tail"), Vec::<String>::new());
    }

    #[test]
    fn tail_lines_returns_last_n_lines_in_order() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("app.log");
        std::fs::write(&path, "one\ntwo\nthree\nfour\n").expect("write");
        assert_eq!(tail_lines(&path, 2).expect("tail"), vec!["three", "four"]);
    }

    #[test]
    fn flush_removes_both_files() {
        let temp = tempfile::tempdir().expect("tempdir");
        let out = temp.path().join("app.log");
        let err = temp.path().join("app.error.log");
        std::fs::write(&out, "stale output").expect("write");
        std::fs::write(&err, "stale error").expect("write");

        flush(&out, &err).expect("flush");

        assert!(!out.exists());
        assert!(!err.exists());
    }

    #[test]
    fn flush_tolerates_missing_files() {
        let temp = tempfile::tempdir().expect("tempdir");
        let out = temp.path().join("app.log");
        let err = temp.path().join("app.error.log");

        flush(&out, &err).expect("flush should not fail on missing files");
    }
}
