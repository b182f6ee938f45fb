//! Wiring of store, pipeline, schedule and log tailing.
//!
//! [`Engine`] is what the CLI and the HTTP API drive. It keeps the schedule
//! registry in step with task declarations and deletions.

use std::path::PathBuf;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{info, warn};
use uuid::Uuid;

use crate::assets::AssetDirectory;
use crate::cache::TtlCache;
use crate::config::Config;
use crate::error::{Error, Result};
use crate::history::{LogTail, RunHistory, TailChunk};
use crate::pipeline::{
    spawn_beat, ConnectivityCallback, JobHandle, PeriodicEntry, PeriodicRegistry, StartupHooks,
    TaskExecutor, WorkerPool,
};
use crate::runner::{BackendFactory, RunnerOptions};
use crate::tasks::{Task, TaskDeclaration, TaskStore};

/// Settings the engine needs, split out of [`Config`].
#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub options: RunnerOptions,
    pub log_root: PathBuf,
    pub workers: usize,
    pub marker_ttl: std::time::Duration,
    pub mark_ttl: std::time::Duration,
    pub beat_tick: std::time::Duration,
    pub startup_tasks: Vec<String>,
}

impl EngineSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            options: config.runner_options(),
            log_root: config.storage.log_root.clone(),
            workers: config.pipeline.workers,
            marker_ttl: config.pipeline.marker_ttl,
            mark_ttl: config.pipeline.mark_ttl,
            beat_tick: config.pipeline.beat_tick,
            startup_tasks: config.pipeline.startup_tasks.clone(),
        }
    }
}

/// The running orchestration engine.
pub struct Engine {
    store: Arc<TaskStore>,
    directory: Arc<dyn AssetDirectory>,
    cache: Arc<TtlCache>,
    registry: Arc<PeriodicRegistry>,
    hooks: Arc<StartupHooks>,
    executor: Arc<TaskExecutor>,
    pool: Arc<WorkerPool>,
    tail: LogTail,
    settings: EngineSettings,
}

impl Engine {
    /// Start the worker pool. Must be called inside a tokio runtime.
    ///
    /// Schedule entries are rebuilt from the stored tasks before the pool
    /// becomes ready.
    pub fn start(
        store: Arc<TaskStore>,
        directory: Arc<dyn AssetDirectory>,
        backends: Arc<dyn BackendFactory>,
        settings: EngineSettings,
    ) -> Result<Self> {
        let cache = Arc::new(TtlCache::new());
        let registry = Arc::new(PeriodicRegistry::new());
        for task in store.tasks() {
            if let Err(err) = registry.sync_task(&task) {
                warn!(task = %task.name, error = %err, "Ignoring invalid schedule");
            }
        }

        let hooks = Arc::new(StartupHooks::new(
            cache.clone(),
            registry.clone(),
            settings.marker_ttl,
        ));
        for name in &settings.startup_tasks {
            let task = store
                .task_by_name(name)
                .ok_or_else(|| Error::TaskNotFound(name.clone()))?;
            hooks.register_startup_task(task.id);
        }

        let executor = Arc::new(TaskExecutor::new(
            store.clone(),
            directory.clone(),
            backends,
            settings.options.clone(),
            settings.log_root.clone(),
        ));
        let pool = WorkerPool::start(executor.clone(), settings.workers, hooks.clone());
        let tail = LogTail::new(cache.clone()).with_mark_ttl(settings.mark_ttl);

        info!(
            tasks = store.tasks().len(),
            schedules = registry.entries().len(),
            "Engine started"
        );
        Ok(Self {
            store,
            directory,
            cache,
            registry,
            hooks,
            executor,
            pool,
            tail,
            settings,
        })
    }

    pub fn store(&self) -> &Arc<TaskStore> {
        &self.store
    }

    pub fn directory(&self) -> &Arc<dyn AssetDirectory> {
        &self.directory
    }

    pub fn cache(&self) -> &Arc<TtlCache> {
        &self.cache
    }

    pub fn registry(&self) -> &Arc<PeriodicRegistry> {
        &self.registry
    }

    pub fn hooks(&self) -> &Arc<StartupHooks> {
        &self.hooks
    }

    pub fn executor(&self) -> &Arc<TaskExecutor> {
        &self.executor
    }

    pub fn pool(&self) -> &Arc<WorkerPool> {
        &self.pool
    }

    /// Declare a task and update its schedule entry.
    pub fn declare(&self, declaration: &TaskDeclaration) -> Result<(Task, bool)> {
        let (task, created) = declaration.ensure(&self.store)?;
        self.registry.sync_task(&task)?;
        Ok((task, created))
    }

    /// Delete a task and its schedule entry.
    pub fn delete_task(&self, task_id: Uuid, hard: bool) -> Result<Task> {
        let task = if hard {
            self.store.delete_task(task_id)?
        } else {
            self.store.soft_delete_task(task_id)?
        };
        self.registry.remove(&task.name);
        Ok(task)
    }

    /// Register a schedule entry that is removed again when the pool stops.
    pub fn register_startup_schedule(&self, name: impl Into<String>, entry: PeriodicEntry) -> bool {
        let name = name.into();
        self.hooks.register_startup_entry(name.clone());
        self.registry.register(name, entry)
    }

    /// Queue a run; connectivity flags are refreshed once it finishes.
    pub fn submit(&self, task_id: Uuid) -> Result<JobHandle> {
        self.pool.submit_with_callback(
            task_id,
            Arc::new(ConnectivityCallback::new(self.cache.clone())),
        )
    }

    /// Next chunk of a history's log.
    pub async fn tail(&self, history_id: Uuid, mark: Option<&str>) -> Result<TailChunk> {
        let history = self
            .store
            .history(history_id)
            .ok_or(Error::HistoryNotFound(history_id))?;
        self.tail_history(&history, mark).await
    }

    /// Next chunk for an already loaded history record.
    ///
    /// The record is re-read first so `is_finished` is observed before the
    /// file is.
    pub async fn tail_history(&self, history: &RunHistory, mark: Option<&str>) -> Result<TailChunk> {
        let is_finished = self
            .store
            .history(history.id)
            .map(|h| h.is_finished)
            .unwrap_or(history.is_finished);
        let path = history.log_path(&self.settings.log_root);
        self.tail.read(&path, is_finished, mark).await
    }

    /// Start the schedule beat.
    pub fn spawn_beat(&self) -> JoinHandle<()> {
        spawn_beat(
            self.registry.clone(),
            self.pool.clone(),
            self.settings.beat_tick,
        )
    }

    /// Stop the pool after draining queued runs.
    pub async fn shutdown(&self) {
        self.pool.shutdown().await;
    }
}
