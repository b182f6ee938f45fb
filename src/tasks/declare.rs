//! Idempotent task declaration.
//!
//! Callers state the desired definition of a named task; [`TaskDeclaration::ensure`]
//! creates the task on first use and records a new content version only when
//! the definition or its targets differ from the newest version.

use chrono::Utc;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};
use uuid::Uuid;

use super::model::{default_pattern, Content, Task};
use super::store::TaskStore;
use crate::assets::AssetDirectory;
use crate::error::{Error, Result};
use crate::inventory::{BecomeSpec, Inventory, InventoryResult};
use crate::runner::{Action, OptionOverrides};

/// Desired state of a task and its definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TaskDeclaration {
    pub name: String,
    pub assets: Vec<Uuid>,
    pub nodes: Vec<Uuid>,
    pub actions: Vec<Action>,
    pub pattern: String,
    pub options: OptionOverrides,
    pub run_as_admin: bool,
    pub run_as: Option<String>,
    pub r#become: Option<BecomeSpec>,
    pub vars: IndexMap<String, Value>,
    pub interval: Option<String>,
    pub crontab: Option<String>,
    pub is_periodic: bool,
    pub comment: String,
    pub created_by: Option<String>,
}

impl Default for TaskDeclaration {
    fn default() -> Self {
        Self {
            name: String::new(),
            assets: Vec::new(),
            nodes: Vec::new(),
            actions: Vec::new(),
            pattern: default_pattern(),
            options: OptionOverrides::default(),
            run_as_admin: false,
            run_as: None,
            r#become: None,
            vars: IndexMap::new(),
            interval: None,
            crontab: None,
            is_periodic: false,
            comment: String::new(),
            created_by: None,
        }
    }
}

impl TaskDeclaration {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Reject declarations that could never run.
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(Error::InvalidDeclaration("task name is empty".into()));
        }
        if self.assets.is_empty() && self.nodes.is_empty() {
            return Err(Error::InvalidDeclaration(
                "Must set assets or nodes".into(),
            ));
        }
        if self.actions.is_empty() {
            return Err(Error::InvalidDeclaration("Must set actions".into()));
        }
        for action in &self.actions {
            action.check_args()?;
        }

        let trigger = self.task_fields(Task::new(&self.name)).trigger()?;
        if self.is_periodic && trigger.is_none() {
            return Err(Error::InvalidDeclaration(format!(
                "periodic task '{}' needs an interval or a crontab",
                self.name
            )));
        }
        Ok(())
    }

    /// Copy the task-level fields onto a task row.
    fn task_fields(&self, mut task: Task) -> Task {
        task.interval = self.interval.clone().filter(|v| !v.trim().is_empty());
        task.crontab = self.crontab.clone().filter(|v| !v.trim().is_empty());
        task.is_periodic = self.is_periodic;
        task.comment = self.comment.clone();
        if self.created_by.is_some() {
            task.created_by = self.created_by.clone();
        }
        task
    }

    fn content_for(&self, task_id: Uuid) -> Content {
        Content {
            id: Uuid::new_v4(),
            task_id,
            version: 0,
            assets: self.assets.clone(),
            nodes: self.nodes.clone(),
            actions: self.actions.clone(),
            pattern: self.pattern.clone(),
            options: self.options.clone(),
            run_as_admin: self.run_as_admin,
            run_as: self.run_as.clone(),
            r#become: self.r#become.clone(),
            vars: self.vars.clone(),
            created_by: self.created_by.clone(),
            date_created: Utc::now(),
        }
    }

    /// Inventory the declaration would run against, without storing it.
    pub fn inventory(&self, directory: &dyn AssetDirectory) -> InventoryResult<Inventory> {
        self.content_for(Uuid::nil()).inventory(directory)
    }

    /// Make the store match this declaration.
    ///
    /// Returns the task and whether a new content version was recorded.
    /// Concurrent calls with the same name are serialized by the store.
    pub fn ensure(&self, store: &TaskStore) -> Result<(Task, bool)> {
        self.validate()?;

        store.write(|state| {
            let task = match state.task_by_name_mut(&self.name) {
                Some(existing) => {
                    let updated = self.task_fields(existing.clone());
                    let revived = existing.is_deleted;
                    if updated != *existing || revived {
                        *existing = Task {
                            is_deleted: false,
                            date_updated: Utc::now(),
                            ..updated
                        };
                    }
                    existing.clone()
                }
                None => {
                    let task = self.task_fields(Task::new(&self.name));
                    state.insert_task(task.clone());
                    info!(task = %task.name, id = %task.id, "Created task");
                    task
                }
            };

            let candidate = self.content_for(task.id);
            let changed = match state.latest_content(task.id) {
                Some(latest) => {
                    !latest.same_definition(&candidate) || !latest.same_targets(&candidate)
                }
                None => true,
            };

            if changed {
                let content = state.push_content(candidate);
                info!(task = %task.name, version = content.version, "Recorded new task content");
            } else {
                debug!(task = %task.name, "Task content unchanged");
            }
            Ok((task, changed))
        })
    }
}
