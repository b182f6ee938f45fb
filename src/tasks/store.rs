//! Persistent store for tasks, content versions and run histories.
//!
//! State lives in memory behind a lock and, when a state file is configured,
//! is written back as JSON after every mutation. Writes go to a temporary
//! file in the same directory which is then renamed over the old state.

use indexmap::IndexMap;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use uuid::Uuid;

use super::model::{Content, Task};
use crate::error::{Error, Result};
use crate::history::{HistorySummary, RunHistory};

/// Everything the store persists.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreState {
    tasks: IndexMap<Uuid, Task>,
    contents: Vec<Content>,
    histories: IndexMap<Uuid, RunHistory>,
}

impl StoreState {
    pub fn task(&self, id: Uuid) -> Option<&Task> {
        self.tasks.get(&id)
    }

    pub fn task_by_name(&self, name: &str) -> Option<&Task> {
        self.tasks.values().find(|t| t.name == name)
    }

    pub(crate) fn task_by_name_mut(&mut self, name: &str) -> Option<&mut Task> {
        self.tasks.values_mut().find(|t| t.name == name)
    }

    pub(crate) fn insert_task(&mut self, task: Task) {
        self.tasks.insert(task.id, task);
    }

    /// Newest content of a task. Versions only grow, so the highest wins.
    pub fn latest_content(&self, task_id: Uuid) -> Option<&Content> {
        self.contents
            .iter()
            .filter(|c| c.task_id == task_id)
            .max_by_key(|c| c.version)
    }

    /// Append a content version, assigning the next version number.
    pub(crate) fn push_content(&mut self, mut content: Content) -> Content {
        let next = self
            .contents
            .iter()
            .filter(|c| c.task_id == content.task_id)
            .map(|c| c.version)
            .max()
            .unwrap_or(0)
            + 1;
        content.version = next;
        self.contents.push(content.clone());
        content
    }
}

/// Thread-safe task, content and history store.
#[derive(Debug, Default)]
pub struct TaskStore {
    state: RwLock<StoreState>,
    path: Option<PathBuf>,
}

impl TaskStore {
    /// A store that is never written to disk.
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Open a store backed by a JSON state file, creating it lazily.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let state = if path.exists() {
            let content = std::fs::read_to_string(&path)?;
            let state: StoreState = serde_json::from_str(&content)?;
            info!(
                path = %path.display(),
                tasks = state.tasks.len(),
                histories = state.histories.len(),
                "Loaded task store"
            );
            state
        } else {
            debug!(path = %path.display(), "State file absent, starting empty");
            StoreState::default()
        };

        Ok(Self {
            state: RwLock::new(state),
            path: Some(path),
        })
    }

    /// Path of the backing state file.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Run a mutation under the write lock and persist on success.
    ///
    /// The closure works on a copy which replaces the live state only once
    /// it has been written out, so a failed closure or a failed write
    /// leaves nothing behind.
    pub fn write<T>(&self, f: impl FnOnce(&mut StoreState) -> Result<T>) -> Result<T> {
        let mut state = self.state.write();
        let mut draft = state.clone();
        let value = f(&mut draft)?;
        self.persist(&draft)?;
        *state = draft;
        Ok(value)
    }

    /// Run a query under the read lock.
    pub fn read<T>(&self, f: impl FnOnce(&StoreState) -> T) -> T {
        f(&self.state.read())
    }

    fn persist(&self, state: &StoreState) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        std::fs::create_dir_all(&dir)?;

        let mut tmp = tempfile::NamedTempFile::new_in(&dir)?;
        serde_json::to_writer_pretty(&mut tmp, state)?;
        tmp.write_all(b"\n")?;
        tmp.as_file().sync_all()?;
        tmp.persist(path).map_err(|e| Error::Io(e.error))?;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Tasks
    // ------------------------------------------------------------------

    /// Tasks that are not soft-deleted, in creation order.
    pub fn tasks(&self) -> Vec<Task> {
        self.read(|s| s.tasks.values().filter(|t| !t.is_deleted).cloned().collect())
    }

    /// Every task, including soft-deleted ones.
    pub fn all_tasks(&self) -> Vec<Task> {
        self.read(|s| s.tasks.values().cloned().collect())
    }

    pub fn task(&self, id: Uuid) -> Option<Task> {
        self.read(|s| s.task(id).cloned())
    }

    pub fn task_by_name(&self, name: &str) -> Option<Task> {
        self.read(|s| s.task_by_name(name).cloned())
    }

    /// Look a task up by id, falling back to its name.
    pub fn resolve_task(&self, id_or_name: &str) -> Result<Task> {
        let found = match Uuid::parse_str(id_or_name) {
            Ok(id) => self.task(id),
            Err(_) => None,
        };
        found
            .or_else(|| self.task_by_name(id_or_name))
            .ok_or_else(|| Error::TaskNotFound(id_or_name.to_string()))
    }

    /// Mark a task deleted; its contents and histories stay.
    pub fn soft_delete_task(&self, id: Uuid) -> Result<Task> {
        self.write(|s| {
            let task = s
                .tasks
                .get_mut(&id)
                .ok_or_else(|| Error::TaskNotFound(id.to_string()))?;
            task.is_deleted = true;
            task.date_updated = chrono::Utc::now();
            Ok(task.clone())
        })
    }

    /// Remove a task with all of its contents and histories.
    pub fn delete_task(&self, id: Uuid) -> Result<Task> {
        self.write(|s| {
            let task = s
                .tasks
                .shift_remove(&id)
                .ok_or_else(|| Error::TaskNotFound(id.to_string()))?;
            s.contents.retain(|c| c.task_id != id);
            s.histories.retain(|_, h| h.task_id != id);
            Ok(task)
        })
    }

    // ------------------------------------------------------------------
    // Contents
    // ------------------------------------------------------------------

    pub fn latest_content(&self, task_id: Uuid) -> Option<Content> {
        self.read(|s| s.latest_content(task_id).cloned())
    }

    pub fn content(&self, id: Uuid) -> Option<Content> {
        self.read(|s| s.contents.iter().find(|c| c.id == id).cloned())
    }

    /// All versions of a task, newest first.
    pub fn contents(&self, task_id: Uuid) -> Vec<Content> {
        self.read(|s| {
            let mut contents: Vec<Content> = s
                .contents
                .iter()
                .filter(|c| c.task_id == task_id)
                .cloned()
                .collect();
            contents.sort_by(|a, b| {
                b.date_created
                    .cmp(&a.date_created)
                    .then(b.version.cmp(&a.version))
            });
            contents
        })
    }

    // ------------------------------------------------------------------
    // Histories
    // ------------------------------------------------------------------

    /// Create and store an unfinished history for a run that is starting.
    pub fn create_history(&self, task_id: Uuid, content_id: Option<Uuid>) -> Result<RunHistory> {
        self.write(|s| {
            let history = RunHistory::new(task_id, content_id);
            s.histories.insert(history.id, history.clone());
            Ok(history)
        })
    }

    /// Replace a stored history.
    pub fn update_history(&self, history: &RunHistory) -> Result<()> {
        self.write(|s| match s.histories.get_mut(&history.id) {
            Some(slot) => {
                *slot = history.clone();
                Ok(())
            }
            None => Err(Error::HistoryNotFound(history.id)),
        })
    }

    pub fn history(&self, id: Uuid) -> Option<RunHistory> {
        self.read(|s| s.histories.get(&id).cloned())
    }

    /// Histories of a task, newest first.
    pub fn histories(&self, task_id: Uuid) -> Vec<RunHistory> {
        self.read(|s| {
            let mut histories: Vec<RunHistory> = s
                .histories
                .values()
                .filter(|h| h.task_id == task_id)
                .cloned()
                .collect();
            histories.sort_by(|a, b| b.date_start.cmp(&a.date_start));
            histories
        })
    }

    pub fn latest_history(&self, task_id: Uuid) -> Option<RunHistory> {
        self.histories(task_id).into_iter().next()
    }

    pub fn history_summary(&self, task_id: Uuid) -> HistorySummary {
        self.read(|s| {
            HistorySummary::from_histories(s.histories.values().filter(|h| h.task_id == task_id))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runner::Action;
    use crate::tasks::TaskDeclaration;
    use std::time::Duration;

    fn declaration(name: &str) -> TaskDeclaration {
        TaskDeclaration {
            name: name.to_string(),
            assets: vec![Uuid::new_v4()],
            actions: vec![Action::new("ping", "")],
            ..TaskDeclaration::default()
        }
    }

    #[test]
    fn test_state_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state").join("store.json");

        let store = TaskStore::open(&path).unwrap();
        let (task, _) = declaration("nightly").ensure(&store).unwrap();
        let mut history = store.create_history(task.id, None).unwrap();
        history.finish(Ok(Default::default()), Duration::from_secs(1));
        store.update_history(&history).unwrap();
        drop(store);

        let reopened = TaskStore::open(&path).unwrap();
        assert_eq!(reopened.task_by_name("nightly").unwrap().id, task.id);
        assert_eq!(reopened.latest_content(task.id).unwrap().version, 1);
        assert!(reopened.history(history.id).unwrap().is_success);
    }

    #[test]
    fn test_resolve_task_by_id_or_name() {
        let store = TaskStore::in_memory();
        let (task, _) = declaration("backup").ensure(&store).unwrap();
        assert_eq!(store.resolve_task("backup").unwrap().id, task.id);
        assert_eq!(store.resolve_task(&task.id.to_string()).unwrap().id, task.id);
        assert!(matches!(
            store.resolve_task("nope"),
            Err(Error::TaskNotFound(_))
        ));
    }

    #[test]
    fn test_soft_and_hard_delete() {
        let store = TaskStore::in_memory();
        let (task, _) = declaration("cleanup").ensure(&store).unwrap();
        store.create_history(task.id, None).unwrap();

        store.soft_delete_task(task.id).unwrap();
        assert!(store.tasks().is_empty());
        assert_eq!(store.all_tasks().len(), 1);
        assert_eq!(store.histories(task.id).len(), 1);

        store.delete_task(task.id).unwrap();
        assert!(store.all_tasks().is_empty());
        assert!(store.histories(task.id).is_empty());
        assert!(store.latest_content(task.id).is_none());
    }

    #[test]
    fn test_update_unknown_history() {
        let store = TaskStore::in_memory();
        let history = RunHistory::new(Uuid::new_v4(), None);
        assert!(matches!(
            store.update_history(&history),
            Err(Error::HistoryNotFound(_))
        ));
    }

    #[test]
    fn test_failed_persist_leaves_state_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let state_dir = dir.path().join("state");
        let store = TaskStore::open(state_dir.join("store.json")).unwrap();
        let mut declaration = declaration("rotate");
        let (task, _) = declaration.ensure(&store).unwrap();

        std::fs::remove_dir_all(&state_dir).unwrap();
        std::fs::write(&state_dir, "not a directory").unwrap();

        declaration.actions.push(Action::new("shell", "logrotate -f"));
        assert!(declaration.ensure(&store).is_err());
        assert_eq!(store.latest_content(task.id).unwrap().version, 1);
        assert_eq!(store.read(|s| s.contents.len()), 1);

        std::fs::remove_file(&state_dir).unwrap();
        declaration.ensure(&store).unwrap();
        assert_eq!(store.latest_content(task.id).unwrap().version, 2);
    }

    #[test]
    fn test_latest_content_follows_version_not_clock() {
        let store = TaskStore::in_memory();
        let mut declaration = declaration("sync");
        let (task, _) = declaration.ensure(&store).unwrap();
        declaration.pattern = "web*".to_string();
        declaration.ensure(&store).unwrap();

        store
            .write(|state| {
                let newest = state
                    .contents
                    .iter_mut()
                    .find(|c| c.version == 2)
                    .unwrap();
                newest.date_created -= chrono::Duration::hours(1);
                Ok(())
            })
            .unwrap();

        let latest = store.latest_content(task.id).unwrap();
        assert_eq!(latest.version, 2);
        assert_eq!(latest.pattern, "web*");
    }
}
