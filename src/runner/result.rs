//! Structured results of a run.
//!
//! `raw` keeps every action outcome per host; `summary` partitions hosts into
//! contacted (reached, whatever the action outcome) and dark (unreachable).

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Outcome of one action on one host that was reached.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionResult {
    /// Action label
    pub action: String,
    /// Module that ran
    pub module: String,
    /// Exit code
    pub rc: i32,
    #[serde(default)]
    pub stdout: String,
    #[serde(default)]
    pub stderr: String,
    /// True when the action did not succeed
    pub failed: bool,
}

impl ActionResult {
    /// Short message for logs: stderr on failure, stdout otherwise.
    pub fn message(&self) -> &str {
        if self.failed && !self.stderr.trim().is_empty() {
            self.stderr.trim()
        } else {
            self.stdout.trim()
        }
    }
}

/// What the backend reports for one action on one host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecOutcome {
    /// The host was reached and the action ran
    Completed(ActionResult),
    /// The host could not be reached
    Unreachable(String),
}

/// Everything that happened on one host.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostResult {
    #[serde(default)]
    pub actions: Vec<ActionResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unreachable: Option<String>,
}

impl HostResult {
    /// True once the host must not run further actions.
    pub fn is_stopped(&self) -> bool {
        self.unreachable.is_some() || self.has_failure()
    }

    /// True when any action failed.
    pub fn has_failure(&self) -> bool {
        self.actions.iter().any(|a| a.failed)
    }
}

/// Contacted/dark partition of a run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Summary {
    #[serde(default)]
    pub contacted: IndexMap<String, Vec<ActionResult>>,
    #[serde(default)]
    pub dark: IndexMap<String, String>,
}

impl Summary {
    /// Partition raw host results.
    pub fn from_raw(raw: &IndexMap<String, HostResult>) -> Self {
        let mut summary = Self::default();
        for (host, result) in raw {
            match &result.unreachable {
                Some(message) => {
                    summary.dark.insert(host.clone(), message.clone());
                }
                None => {
                    summary.contacted.insert(host.clone(), result.actions.clone());
                }
            }
        }
        summary
    }

    /// Summary of a run that never reached any host.
    pub fn failure(message: impl Into<String>) -> Self {
        let mut summary = Self::default();
        summary.dark.insert("all".to_string(), message.into());
        summary
    }

    /// True when nothing was dark and no contacted host had a failed action.
    pub fn is_success(&self) -> bool {
        self.dark.is_empty()
            && self
                .contacted
                .values()
                .all(|actions| actions.iter().all(|a| !a.failed))
    }

    /// Hosts where every action succeeded.
    pub fn success_hosts(&self) -> Vec<&str> {
        self.contacted
            .iter()
            .filter(|(_, actions)| actions.iter().all(|a| !a.failed))
            .map(|(host, _)| host.as_str())
            .collect()
    }

    /// Hosts that were dark or had a failed action.
    pub fn failed_hosts(&self) -> Vec<&str> {
        self.dark
            .keys()
            .map(String::as_str)
            .chain(
                self.contacted
                    .iter()
                    .filter(|(_, actions)| actions.iter().any(|a| a.failed))
                    .map(|(host, _)| host.as_str()),
            )
            .collect()
    }
}

/// Result of a whole run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunResult {
    pub raw: IndexMap<String, HostResult>,
    pub summary: Summary,
}

impl RunResult {
    pub fn from_raw(raw: IndexMap<String, HostResult>) -> Self {
        let summary = Summary::from_raw(&raw);
        Self { raw, summary }
    }

    /// Fold another run's results into this one.
    pub fn merge(&mut self, other: RunResult) {
        for (host, result) in other.raw {
            let entry = self.raw.entry(host).or_default();
            entry.actions.extend(result.actions);
            if result.unreachable.is_some() {
                entry.unreachable = result.unreachable;
            }
        }
        self.summary = Summary::from_raw(&self.raw);
    }

    pub fn is_success(&self) -> bool {
        self.summary.is_success()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn action(failed: bool) -> ActionResult {
        ActionResult {
            action: "shell: true".into(),
            module: "shell".into(),
            rc: i32::from(failed),
            stdout: String::new(),
            stderr: if failed { "boom".into() } else { String::new() },
            failed,
        }
    }

    #[test]
    fn test_partition() {
        let mut raw = IndexMap::new();
        raw.insert(
            "ok".to_string(),
            HostResult {
                actions: vec![action(false)],
                unreachable: None,
            },
        );
        raw.insert(
            "bad".to_string(),
            HostResult {
                actions: vec![action(true)],
                unreachable: None,
            },
        );
        raw.insert(
            "gone".to_string(),
            HostResult {
                actions: vec![],
                unreachable: Some("timed out".into()),
            },
        );

        let result = RunResult::from_raw(raw);
        assert_eq!(result.summary.contacted.len(), 2);
        assert_eq!(result.summary.dark["gone"], "timed out");
        assert_eq!(result.summary.success_hosts(), vec!["ok"]);
        assert_eq!(result.summary.failed_hosts(), vec!["gone", "bad"]);
        assert!(!result.is_success());
    }

    #[test]
    fn test_failure_summary() {
        let summary = Summary::failure("Inventory is empty.");
        assert_eq!(summary.dark["all"], "Inventory is empty.");
        assert!(!summary.is_success());
    }

    #[test]
    fn test_merge_accumulates_actions() {
        let mut first = RunResult::default();
        let mut raw = IndexMap::new();
        raw.insert(
            "web1".to_string(),
            HostResult {
                actions: vec![action(false)],
                unreachable: None,
            },
        );
        first.merge(RunResult::from_raw(raw.clone()));
        first.merge(RunResult::from_raw(raw));
        assert_eq!(first.raw["web1"].actions.len(), 2);
        assert!(first.is_success());
    }
}
