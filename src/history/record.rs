//! Run history records.

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use uuid::Uuid;

use crate::error::Result;
use crate::runner::{HostResult, RunResult, Summary};

/// One execution of a task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunHistory {
    pub id: Uuid,
    pub task_id: Uuid,
    /// Content version that ran
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_id: Option<Uuid>,
    pub date_start: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_finished: Option<DateTime<Utc>>,
    /// Wall-clock seconds
    #[serde(default)]
    pub timedelta: f64,
    #[serde(default)]
    pub is_finished: bool,
    #[serde(default)]
    pub is_success: bool,
    #[serde(default)]
    pub result: IndexMap<String, HostResult>,
    #[serde(default)]
    pub summary: Summary,
}

impl RunHistory {
    pub fn new(task_id: Uuid, content_id: Option<Uuid>) -> Self {
        Self {
            id: Uuid::new_v4(),
            task_id,
            content_id,
            date_start: Utc::now(),
            date_finished: None,
            timedelta: 0.0,
            is_finished: false,
            is_success: false,
            result: IndexMap::new(),
            summary: Summary::default(),
        }
    }

    /// `<root>/<YYYY-MM-DD>/<id>.log`, dated by the start of the run.
    pub fn log_path(&self, root: &Path) -> PathBuf {
        root.join(self.date_start.format("%Y-%m-%d").to_string())
            .join(format!("{}.log", self.id))
    }

    /// Record the outcome of the run.
    ///
    /// A run that failed as a whole gets a summary with the error message
    /// filed as dark under `all`.
    pub fn finish(&mut self, outcome: Result<RunResult>, elapsed: Duration) {
        match outcome {
            Ok(result) => {
                self.is_success = result.is_success();
                self.result = result.raw;
                self.summary = result.summary;
            }
            Err(err) => {
                self.is_success = false;
                self.result = IndexMap::new();
                self.summary = Summary::failure(err.to_string());
            }
        }
        self.is_finished = true;
        self.date_finished = Some(Utc::now());
        self.timedelta = elapsed.as_secs_f64();
    }

    pub fn success_hosts(&self) -> Vec<&str> {
        self.summary.success_hosts()
    }

    pub fn failed_hosts(&self) -> Vec<&str> {
        self.summary.failed_hosts()
    }
}

/// Aggregate counts over a task's histories.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistorySummary {
    pub total: usize,
    pub success: usize,
    pub failed: usize,
}

impl HistorySummary {
    /// Count runs; unfinished runs are counted in `total` only.
    pub fn from_histories<'a>(histories: impl IntoIterator<Item = &'a RunHistory>) -> Self {
        let mut summary = Self::default();
        for history in histories {
            summary.total += 1;
            if history.is_finished {
                if history.is_success {
                    summary.success += 1;
                } else {
                    summary.failed += 1;
                }
            }
        }
        summary
    }
}
