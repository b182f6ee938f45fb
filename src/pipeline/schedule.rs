//! Periodic schedule registry and the beat loop that drives it.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::queue::WorkerPool;
use crate::error::Result;
use crate::tasks::{Task, Trigger};

/// Name of the job every task entry invokes.
pub const RUN_TASK_ENTRY: &str = "run_adhoc_task";

/// A schedule entry as exposed to operators.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeriodicEntry {
    pub task: String,
    /// Seconds between runs
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interval: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub crontab: Option<String>,
    pub args: Vec<Uuid>,
    pub enabled: bool,
}

impl PeriodicEntry {
    /// Entry that runs `task_id` on `trigger`.
    pub fn for_task(task_id: Uuid, trigger: &Trigger) -> Self {
        let (interval, crontab) = match trigger {
            Trigger::Interval(every) => (Some(every.as_secs().max(1)), None),
            Trigger::Crontab(expr) => (None, Some(expr.clone())),
        };
        Self {
            task: RUN_TASK_ENTRY.to_string(),
            interval,
            crontab,
            args: vec![task_id],
            enabled: true,
        }
    }

    pub fn trigger(&self) -> Option<Trigger> {
        match (&self.interval, &self.crontab) {
            (Some(secs), _) => Some(Trigger::Interval(Duration::from_secs(*secs))),
            (None, Some(expr)) => Trigger::parse_crontab(expr).ok(),
            (None, None) => None,
        }
    }
}

#[derive(Debug, Clone)]
struct Slot {
    entry: PeriodicEntry,
    next_due: Option<DateTime<Utc>>,
    last_fired: Option<DateTime<Utc>>,
}

/// Shared map of named schedule entries.
#[derive(Debug, Default)]
pub struct PeriodicRegistry {
    entries: DashMap<String, Slot>,
}

impl PeriodicRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace an entry.
    ///
    /// Registering an identical entry again keeps its timing; returns
    /// whether anything changed.
    pub fn register(&self, name: impl Into<String>, entry: PeriodicEntry) -> bool {
        let name = name.into();
        if let Some(slot) = self.entries.get(&name) {
            if slot.entry == entry {
                return false;
            }
        }
        info!(entry = %name, enabled = entry.enabled, "Registered periodic entry");
        self.entries.insert(
            name,
            Slot {
                entry,
                next_due: None,
                last_fired: None,
            },
        );
        true
    }

    /// Keep the entry but stop firing it.
    pub fn disable(&self, name: &str) -> bool {
        match self.entries.get_mut(name) {
            Some(mut slot) if slot.entry.enabled => {
                slot.entry.enabled = false;
                slot.next_due = None;
                info!(entry = %name, "Disabled periodic entry");
                true
            }
            _ => false,
        }
    }

    /// Delete the entry.
    pub fn remove(&self, name: &str) -> bool {
        let removed = self.entries.remove(name).is_some();
        if removed {
            info!(entry = %name, "Removed periodic entry");
        }
        removed
    }

    pub fn get(&self, name: &str) -> Option<PeriodicEntry> {
        self.entries.get(name).map(|slot| slot.entry.clone())
    }

    /// All entries sorted by name.
    pub fn entries(&self) -> Vec<(String, PeriodicEntry)> {
        let mut all: Vec<_> = self
            .entries
            .iter()
            .map(|slot| (slot.key().clone(), slot.entry.clone()))
            .collect();
        all.sort_by(|a, b| a.0.cmp(&b.0));
        all
    }

    pub fn last_fired(&self, name: &str) -> Option<DateTime<Utc>> {
        self.entries.get(name).and_then(|slot| slot.last_fired)
    }

    /// Bring a task's entry in line with its periodic settings.
    ///
    /// Scheduled tasks get an enabled entry named after the task; others
    /// have any existing entry disabled.
    pub fn sync_task(&self, task: &Task) -> Result<()> {
        match task.trigger()? {
            Some(trigger) if task.is_scheduled() => {
                self.register(&task.name, PeriodicEntry::for_task(task.id, &trigger));
            }
            _ => {
                self.disable(&task.name);
            }
        }
        Ok(())
    }

    /// Entries due at `now`, as `(name, task id)`; advances their timing.
    ///
    /// A newly registered entry is never due on its first observation.
    pub fn due(&self, now: DateTime<Utc>) -> Vec<(String, Uuid)> {
        let mut due = Vec::new();
        for mut slot in self.entries.iter_mut() {
            if !slot.entry.enabled {
                continue;
            }
            let Some(trigger) = slot.entry.trigger() else {
                continue;
            };
            match slot.next_due {
                None => slot.next_due = trigger.next_after(now),
                Some(at) if at <= now => {
                    slot.next_due = trigger.next_after(now);
                    slot.last_fired = Some(now);
                    if let Some(task_id) = slot.entry.args.first() {
                        due.push((slot.key().clone(), *task_id));
                    }
                }
                Some(_) => {}
            }
        }
        due.sort();
        due
    }
}

/// Spawn the loop that submits due entries to the pool every `tick`.
///
/// The loop ends once the pool stops accepting work.
pub fn spawn_beat(
    registry: Arc<PeriodicRegistry>,
    pool: Arc<WorkerPool>,
    tick: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(tick);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        info!(tick = ?tick, "Beat started");
        loop {
            interval.tick().await;
            for (name, task_id) in registry.due(Utc::now()) {
                match pool.submit(task_id) {
                    Ok(handle) => debug!(entry = %name, %handle, "Beat submitted task"),
                    Err(err) => {
                        warn!(error = %err, "Beat stopping");
                        return;
                    }
                }
            }
        }
    })
}
