//! Task and content records.
//!
//! A [`Task`] is a named, optionally periodic unit of work. Everything that
//! describes *what* the task does lives in a [`Content`] version; a task's
//! current definition is the newest content row recorded for it.

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeSet;
use std::str::FromStr;
use std::time::Duration;
use uuid::Uuid;

use crate::assets::{Asset, AssetDirectory};
use crate::error::{Error, Result};
use crate::inventory::{BecomeSpec, Inventory, InventoryBuilder, InventoryResult};
use crate::runner::{Action, OptionOverrides};

pub(crate) fn default_pattern() -> String {
    "all".to_string()
}

/// When a periodic task fires.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Trigger {
    /// Fixed delay between runs
    Interval(Duration),
    /// Cron expression, normalized to the seconds-first form
    Crontab(String),
}

impl Trigger {
    /// Parse an interval such as `300`, `10s`, `5m`, `1h` or `1d`.
    ///
    /// A bare number is a count of seconds.
    pub fn parse_interval(value: &str) -> Result<Self> {
        let trimmed = value.trim();
        let invalid = |message: String| Error::InvalidInterval {
            value: value.to_string(),
            message,
        };

        let duration = match trimmed.parse::<u64>() {
            Ok(secs) => Duration::from_secs(secs),
            Err(_) => humantime::parse_duration(trimmed).map_err(|e| invalid(e.to_string()))?,
        };
        if duration.is_zero() {
            return Err(invalid("interval must be greater than zero".to_string()));
        }
        Ok(Trigger::Interval(duration))
    }

    /// Parse a crontab expression.
    ///
    /// Five-field crontab lines get a leading seconds field of `0`.
    pub fn parse_crontab(value: &str) -> Result<Self> {
        let trimmed = value.trim();
        let expression = if trimmed.split_whitespace().count() == 5 {
            format!("0 {}", trimmed)
        } else {
            trimmed.to_string()
        };
        cron::Schedule::from_str(&expression).map_err(|e| Error::InvalidCrontab {
            value: value.to_string(),
            message: e.to_string(),
        })?;
        Ok(Trigger::Crontab(expression))
    }

    /// First firing time strictly after `from`.
    pub fn next_after(&self, from: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match self {
            Trigger::Interval(every) => {
                chrono::Duration::from_std(*every).ok().map(|d| from + d)
            }
            Trigger::Crontab(expression) => cron::Schedule::from_str(expression)
                .ok()
                .and_then(|schedule| schedule.after(&from).next()),
        }
    }
}

/// A named unit of work.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub id: Uuid,
    /// Unique name
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interval: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub crontab: Option<String>,
    #[serde(default)]
    pub is_periodic: bool,
    #[serde(default)]
    pub is_deleted: bool,
    #[serde(default)]
    pub comment: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_by: Option<String>,
    pub date_created: DateTime<Utc>,
    pub date_updated: DateTime<Utc>,
}

impl Task {
    pub fn new(name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            interval: None,
            crontab: None,
            is_periodic: false,
            is_deleted: false,
            comment: String::new(),
            created_by: None,
            date_created: now,
            date_updated: now,
        }
    }

    /// The schedule trigger, if one is configured.
    pub fn trigger(&self) -> Result<Option<Trigger>> {
        let interval = self.interval.as_deref().filter(|v| !v.trim().is_empty());
        let crontab = self.crontab.as_deref().filter(|v| !v.trim().is_empty());
        match (interval, crontab) {
            (Some(_), Some(_)) => Err(Error::ConflictingTrigger {
                task: self.name.clone(),
            }),
            (Some(interval), None) => Trigger::parse_interval(interval).map(Some),
            (None, Some(crontab)) => Trigger::parse_crontab(crontab).map(Some),
            (None, None) => Ok(None),
        }
    }

    /// True when the scheduler should fire this task.
    pub fn is_scheduled(&self) -> bool {
        self.is_periodic && !self.is_deleted
    }
}

/// One immutable version of a task's definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Content {
    pub id: Uuid,
    pub task_id: Uuid,
    /// Monotonic per task, starting at 1
    pub version: u32,
    #[serde(default)]
    pub assets: Vec<Uuid>,
    #[serde(default)]
    pub nodes: Vec<Uuid>,
    pub actions: Vec<Action>,
    #[serde(default = "default_pattern")]
    pub pattern: String,
    #[serde(default)]
    pub options: OptionOverrides,
    #[serde(default)]
    pub run_as_admin: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_as: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub r#become: Option<BecomeSpec>,
    #[serde(default)]
    pub vars: IndexMap<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_by: Option<String>,
    pub date_created: DateTime<Utc>,
}

impl Content {
    /// Same actions, pattern, options, credentials and variables.
    ///
    /// Ids, versions, targets, authorship and timestamps are ignored.
    pub fn same_definition(&self, other: &Content) -> bool {
        self.actions == other.actions
            && self.pattern == other.pattern
            && self.options == other.options
            && self.run_as_admin == other.run_as_admin
            && self.run_as == other.run_as
            && self.r#become == other.r#become
            && self.vars == other.vars
    }

    /// Same asset set and same node set, ignoring order and duplicates.
    pub fn same_targets(&self, other: &Content) -> bool {
        as_set(&self.assets) == as_set(&other.assets) && as_set(&self.nodes) == as_set(&other.nodes)
    }

    fn builder<'a>(&self, directory: &'a dyn AssetDirectory) -> InventoryBuilder<'a> {
        InventoryBuilder::new(directory)
            .assets(self.assets.iter().copied())
            .nodes(self.nodes.iter().copied())
            .run_as_admin(self.run_as_admin)
            .run_as(self.run_as.clone())
            .become_spec(self.r#become.clone())
            .vars(self.vars.clone())
    }

    /// Build the inventory this version runs against.
    pub fn inventory(&self, directory: &dyn AssetDirectory) -> InventoryResult<Inventory> {
        self.builder(directory).build()
    }

    /// Every active asset the version targets, directly or through nodes.
    pub fn total_assets(&self, directory: &dyn AssetDirectory) -> Vec<Asset> {
        self.builder(directory).resolve_assets()
    }
}

fn as_set(ids: &[Uuid]) -> BTreeSet<Uuid> {
    ids.iter().copied().collect()
}
