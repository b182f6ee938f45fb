//! Worker pool consuming queued task runs.

use dashmap::DashMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::{mpsc, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::callbacks::ResultCallback;
use super::execute::{RunOutcome, TaskExecutor};
use super::lifecycle::PoolLifecycle;
use crate::error::{panic_message, Error, Result};

/// Opaque id of a submitted job.
pub type JobHandle = Uuid;

/// Where a submitted job stands.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Running,
    Finished { history_id: Uuid, success: bool },
    Skipped { reason: String },
    /// The job crashed before it could report a history
    Failed { reason: String },
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Finished { .. } | JobStatus::Skipped { .. } | JobStatus::Failed { .. }
        )
    }
}

struct Job {
    handle: JobHandle,
    task_id: Uuid,
    callback: Option<Arc<dyn ResultCallback>>,
}

/// Fixed set of tokio workers pulling from one queue.
pub struct WorkerPool {
    sender: Mutex<Option<mpsc::UnboundedSender<Job>>>,
    statuses: Arc<DashMap<JobHandle, JobStatus>>,
    completed: Arc<Notify>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    lifecycle: Arc<dyn PoolLifecycle>,
}

impl WorkerPool {
    /// Spawn `workers` workers and fire the ready hook.
    pub fn start(
        executor: Arc<TaskExecutor>,
        workers: usize,
        lifecycle: Arc<dyn PoolLifecycle>,
    ) -> Arc<Self> {
        let (tx, rx) = mpsc::unbounded_channel::<Job>();
        let rx = Arc::new(tokio::sync::Mutex::new(rx));
        let statuses = Arc::new(DashMap::new());
        let completed = Arc::new(Notify::new());
        let count = workers.max(1);

        let handles = (0..count)
            .map(|id| {
                tokio::spawn(worker_loop(
                    id,
                    rx.clone(),
                    executor.clone(),
                    statuses.clone(),
                    completed.clone(),
                    lifecycle.clone(),
                ))
            })
            .collect();

        let pool = Arc::new(Self {
            sender: Mutex::new(Some(tx)),
            statuses,
            completed,
            workers: Mutex::new(handles),
            lifecycle,
        });

        info!(workers = count, "Worker pool ready");
        pool.lifecycle.on_pool_ready(&pool);
        pool
    }

    /// Queue a run of `task_id`; returns at once.
    pub fn submit(&self, task_id: Uuid) -> Result<JobHandle> {
        self.enqueue(task_id, None)
    }

    /// Queue a run followed by `callback` on its history.
    pub fn submit_with_callback(
        &self,
        task_id: Uuid,
        callback: Arc<dyn ResultCallback>,
    ) -> Result<JobHandle> {
        self.enqueue(task_id, Some(callback))
    }

    fn enqueue(&self, task_id: Uuid, callback: Option<Arc<dyn ResultCallback>>) -> Result<JobHandle> {
        let handle = Uuid::new_v4();
        let guard = self.sender.lock();
        let sender = guard
            .as_ref()
            .ok_or_else(|| Error::Internal("worker pool is shut down".to_string()))?;

        self.statuses.insert(handle, JobStatus::Pending);
        sender
            .send(Job {
                handle,
                task_id,
                callback,
            })
            .map_err(|_| {
                self.statuses.remove(&handle);
                Error::Internal("worker pool is shut down".to_string())
            })?;
        debug!(%handle, task = %task_id, "Job queued");
        Ok(handle)
    }

    pub fn status(&self, handle: JobHandle) -> Option<JobStatus> {
        self.statuses.get(&handle).map(|s| s.clone())
    }

    /// Wait until the job reaches a terminal status.
    pub async fn wait(&self, handle: JobHandle) -> Option<JobStatus> {
        loop {
            let notified = self.completed.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            match self.status(handle) {
                Some(status) if status.is_terminal() => return Some(status),
                Some(_) => notified.await,
                None => return None,
            }
        }
    }

    pub fn is_running(&self) -> bool {
        self.sender.lock().is_some()
    }

    /// Fire the shutdown hook, stop accepting jobs and drain the queue.
    pub async fn shutdown(&self) {
        self.lifecycle.on_pool_shutdown(self);
        self.sender.lock().take();
        let workers: Vec<_> = std::mem::take(&mut *self.workers.lock());
        for worker in workers {
            if let Err(err) = worker.await {
                warn!(error = %err, "Worker ended abnormally");
            }
        }
        info!("Worker pool stopped");
    }
}

async fn worker_loop(
    id: usize,
    rx: Arc<tokio::sync::Mutex<mpsc::UnboundedReceiver<Job>>>,
    executor: Arc<TaskExecutor>,
    statuses: Arc<DashMap<JobHandle, JobStatus>>,
    completed: Arc<Notify>,
    lifecycle: Arc<dyn PoolLifecycle>,
) {
    debug!(worker = id, "Worker started");
    loop {
        let job = { rx.lock().await.recv().await };
        let Some(job) = job else {
            break;
        };

        statuses.insert(job.handle, JobStatus::Running);
        lifecycle.before_run(job.handle, job.task_id);

        let run = {
            let executor = executor.clone();
            let callback = job.callback.clone();
            let task_id = job.task_id;
            tokio::spawn(async move {
                let outcome = executor.run_task(task_id).await;
                if let (Some(callback), RunOutcome::Finished { task_name, history }) =
                    (&callback, &outcome)
                {
                    callback.on_complete(task_name, history).await;
                }
                outcome
            })
        };

        let status = match run.await {
            Ok(outcome) => {
                lifecycle.after_run(job.handle, &outcome);
                match outcome {
                    RunOutcome::Finished { history, .. } => JobStatus::Finished {
                        history_id: history.id,
                        success: history.is_success,
                    },
                    RunOutcome::Skipped { reason, .. } => JobStatus::Skipped { reason },
                }
            }
            Err(err) => {
                let reason = if err.is_panic() {
                    format!("worker panicked: {}", panic_message(err.into_panic().as_ref()))
                } else {
                    err.to_string()
                };
                error!(worker = id, %reason, "Job crashed");
                JobStatus::Failed { reason }
            }
        };
        statuses.insert(job.handle, status);
        completed.notify_waiters();
    }
    debug!(worker = id, "Worker stopped");
}
