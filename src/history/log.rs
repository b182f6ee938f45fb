//! Per-run transcript files.

use chrono::Utc;
use parking_lot::Mutex;
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::warn;

use super::record::RunHistory;
use crate::runner::RunOutput;

/// Append-only log file for one run.
///
/// Every line is written straight to the file so a concurrent tail sees it
/// as soon as the runner emits it.
#[derive(Debug)]
pub struct RunLog {
    path: PathBuf,
    file: Mutex<Option<File>>,
    started: Instant,
}

impl RunLog {
    /// Open the history's log file under `root` and write the header.
    pub fn create(root: &Path, history: &RunHistory) -> io::Result<Self> {
        let path = history.log_path(root);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        let log = Self {
            path,
            file: Mutex::new(Some(file)),
            started: Instant::now(),
        };
        log.line(&format!("Start at {}", Utc::now().format("%Y-%m-%d %H:%M:%S")));
        Ok(log)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write the footer and close the file. Later lines are dropped.
    pub fn close(&self) {
        let elapsed = self.started.elapsed().as_secs_f64();
        self.line(&format!(
            "Finish at {}, elapsed: {:.2}s",
            Utc::now().format("%Y-%m-%d %H:%M:%S"),
            elapsed
        ));
        self.file.lock().take();
    }
}

impl RunOutput for RunLog {
    fn line(&self, text: &str) {
        let mut guard = self.file.lock();
        let Some(file) = guard.as_mut() else {
            return;
        };
        let mut buf = String::with_capacity(text.len() + 1);
        buf.push_str(text);
        buf.push('\n');
        if let Err(err) = file.write_all(buf.as_bytes()).and_then(|_| file.flush()) {
            warn!(path = %self.path.display(), error = %err, "Failed to write run log");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn test_log_lines_are_visible_immediately() {
        let dir = tempfile::tempdir().unwrap();
        let history = RunHistory::new(Uuid::new_v4(), None);
        let log = RunLog::create(dir.path(), &history).unwrap();
        assert_eq!(log.path(), history.log_path(dir.path()));

        log.line("TASK [ping] ***");
        let content = std::fs::read_to_string(log.path()).unwrap();
        assert!(content.starts_with("Start at "));
        assert!(content.ends_with("TASK [ping] ***\n"));

        log.close();
        log.line("dropped");
        let content = std::fs::read_to_string(log.path()).unwrap();
        assert!(content.contains("Finish at "));
        assert!(!content.contains("dropped"));
    }
}
