//! Worker pool lifecycle hooks.
//!
//! Hooks fire once per pool event. When several pools share a cache only
//! one of them handles each event: the first to place the event's marker
//! wins, and the marker expires after a short TTL so a later restart is
//! handled again.

use parking_lot::RwLock;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::execute::RunOutcome;
use super::queue::{JobHandle, WorkerPool};
use super::schedule::PeriodicRegistry;
use crate::cache::TtlCache;

/// Called synchronously by the pool at each lifecycle point.
pub trait PoolLifecycle: Send + Sync {
    /// Workers are up and accepting jobs.
    fn on_pool_ready(&self, _pool: &WorkerPool) {}

    /// The pool is about to stop accepting jobs.
    fn on_pool_shutdown(&self, _pool: &WorkerPool) {}

    fn before_run(&self, _handle: JobHandle, _task_id: Uuid) {}

    fn after_run(&self, _handle: JobHandle, _outcome: &RunOutcome) {}
}

/// No-op lifecycle.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoLifecycle;

impl PoolLifecycle for NoLifecycle {}

/// Startup tasks and startup-only schedule entries.
pub struct StartupHooks {
    cache: Arc<TtlCache>,
    registry: Arc<PeriodicRegistry>,
    marker_ttl: Duration,
    startup_tasks: RwLock<Vec<Uuid>>,
    startup_entries: RwLock<Vec<String>>,
}

impl StartupHooks {
    pub const READY_MARKER: &'static str = "pool_ready_handled";
    pub const SHUTDOWN_MARKER: &'static str = "pool_shutdown_handled";

    pub fn new(cache: Arc<TtlCache>, registry: Arc<PeriodicRegistry>, marker_ttl: Duration) -> Self {
        Self {
            cache,
            registry,
            marker_ttl,
            startup_tasks: RwLock::new(Vec::new()),
            startup_entries: RwLock::new(Vec::new()),
        }
    }

    /// Run `task_id` once when the pool becomes ready.
    pub fn register_startup_task(&self, task_id: Uuid) {
        let mut tasks = self.startup_tasks.write();
        if !tasks.contains(&task_id) {
            tasks.push(task_id);
        }
    }

    /// Remove the named schedule entry when the pool shuts down.
    pub fn register_startup_entry(&self, name: impl Into<String>) {
        let name = name.into();
        let mut entries = self.startup_entries.write();
        if !entries.contains(&name) {
            entries.push(name);
        }
    }

    pub fn startup_tasks(&self) -> Vec<Uuid> {
        self.startup_tasks.read().clone()
    }
}

impl PoolLifecycle for StartupHooks {
    fn on_pool_ready(&self, pool: &WorkerPool) {
        if !self
            .cache
            .set_if_absent(Self::READY_MARKER, 1, Some(self.marker_ttl))
        {
            debug!("Pool ready already handled elsewhere");
            return;
        }
        let tasks = self.startup_tasks();
        info!(count = tasks.len(), "Submitting startup tasks");
        for task_id in tasks {
            if let Err(err) = pool.submit(task_id) {
                warn!(task = %task_id, error = %err, "Could not submit startup task");
            }
        }
    }

    fn on_pool_shutdown(&self, _pool: &WorkerPool) {
        if !self
            .cache
            .set_if_absent(Self::SHUTDOWN_MARKER, 1, Some(self.marker_ttl))
        {
            debug!("Pool shutdown already handled elsewhere");
            return;
        }
        for name in self.startup_entries.read().iter() {
            self.registry.remove(name);
        }
    }

    fn before_run(&self, handle: JobHandle, task_id: Uuid) {
        debug!(%handle, task = %task_id, "Job starting");
    }

    fn after_run(&self, handle: JobHandle, outcome: &RunOutcome) {
        match outcome {
            RunOutcome::Finished { task_name, history } => debug!(
                %handle,
                task = %task_name,
                success = history.is_success,
                "Job finished"
            ),
            RunOutcome::Skipped { task_id, reason } => {
                debug!(%handle, task = %task_id, %reason, "Job skipped")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assets::MemoryDirectory;
    use crate::pipeline::{PeriodicEntry, TaskExecutor};
    use crate::runner::{CommandBackend, ExecutionBackend, RunnerOptions};
    use crate::tasks::TaskStore;

    fn executor() -> Arc<TaskExecutor> {
        Arc::new(TaskExecutor::new(
            Arc::new(TaskStore::in_memory()),
            Arc::new(MemoryDirectory::new()),
            Arc::new(|| -> Arc<dyn ExecutionBackend> { Arc::new(CommandBackend::default()) }),
            RunnerOptions::default(),
            std::env::temp_dir(),
        ))
    }

    fn entry() -> PeriodicEntry {
        PeriodicEntry {
            task: crate::pipeline::RUN_TASK_ENTRY.to_string(),
            interval: Some(60),
            crontab: None,
            args: vec![Uuid::new_v4()],
            enabled: true,
        }
    }

    #[tokio::test]
    async fn test_shutdown_hook_runs_once_per_marker() {
        let cache = Arc::new(TtlCache::new());
        let first_registry = Arc::new(PeriodicRegistry::new());
        let second_registry = Arc::new(PeriodicRegistry::new());
        first_registry.register("cleanup", entry());
        second_registry.register("cleanup", entry());

        let first = Arc::new(StartupHooks::new(
            cache.clone(),
            first_registry.clone(),
            Duration::from_secs(10),
        ));
        let second = Arc::new(StartupHooks::new(
            cache.clone(),
            second_registry.clone(),
            Duration::from_secs(10),
        ));
        first.register_startup_entry("cleanup");
        second.register_startup_entry("cleanup");

        let pool_a = WorkerPool::start(executor(), 1, first);
        let pool_b = WorkerPool::start(executor(), 1, second);
        pool_a.shutdown().await;
        pool_b.shutdown().await;

        assert!(first_registry.get("cleanup").is_none());
        assert!(second_registry.get("cleanup").is_some());
        assert!(cache.get(StartupHooks::SHUTDOWN_MARKER).is_some());
    }

    #[tokio::test]
    async fn test_ready_marker_expires() {
        let cache = Arc::new(TtlCache::new());
        let hooks = Arc::new(StartupHooks::new(
            cache.clone(),
            Arc::new(PeriodicRegistry::new()),
            Duration::from_millis(20),
        ));
        let pool = WorkerPool::start(executor(), 1, hooks);
        assert!(cache.get(StartupHooks::READY_MARKER).is_some());

        tokio::time::sleep(Duration::from_millis(40)).await;
        assert!(cache.get(StartupHooks::READY_MARKER).is_none());
        pool.shutdown().await;
    }

    #[test]
    fn test_startup_registration_is_deduplicated() {
        let hooks = StartupHooks::new(
            Arc::new(TtlCache::new()),
            Arc::new(PeriodicRegistry::new()),
            Duration::from_secs(1),
        );
        let id = Uuid::new_v4();
        hooks.register_startup_task(id);
        hooks.register_startup_task(id);
        assert_eq!(hooks.startup_tasks(), vec![id]);
    }
}
