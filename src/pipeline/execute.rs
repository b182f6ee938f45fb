//! Runs one task end to end: inventory, log, runner, history.

use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, instrument};
use uuid::Uuid;

use crate::assets::AssetDirectory;
use crate::error::{panic_message, Error, Result};
use crate::history::{RunHistory, RunLog};
use crate::runner::{AdHocRunner, BackendFactory, RunOutput, RunResult, RunnerOptions};
use crate::tasks::{Content, Task, TaskStore};

/// What a pipeline run produced.
#[derive(Debug, Clone)]
pub enum RunOutcome {
    /// The task or its content could not be found; nothing ran
    Skipped { task_id: Uuid, reason: String },
    /// A history was recorded, successful or not
    Finished { task_name: String, history: RunHistory },
}

impl RunOutcome {
    pub fn history(&self) -> Option<&RunHistory> {
        match self {
            RunOutcome::Finished { history, .. } => Some(history),
            RunOutcome::Skipped { .. } => None,
        }
    }
}

/// Executes stored tasks.
pub struct TaskExecutor {
    store: Arc<TaskStore>,
    directory: Arc<dyn AssetDirectory>,
    backends: Arc<dyn BackendFactory>,
    options: RunnerOptions,
    log_root: PathBuf,
}

impl TaskExecutor {
    pub fn new(
        store: Arc<TaskStore>,
        directory: Arc<dyn AssetDirectory>,
        backends: Arc<dyn BackendFactory>,
        options: RunnerOptions,
        log_root: impl Into<PathBuf>,
    ) -> Self {
        Self {
            store,
            directory,
            backends,
            options,
            log_root: log_root.into(),
        }
    }

    pub fn store(&self) -> &Arc<TaskStore> {
        &self.store
    }

    pub fn log_root(&self) -> &std::path::Path {
        &self.log_root
    }

    /// Run the newest content of a task.
    ///
    /// Unknown or deleted tasks are logged and skipped. Any failure of the
    /// run itself ends up on the returned history.
    #[instrument(skip(self), fields(task = %task_id))]
    pub async fn run_task(&self, task_id: Uuid) -> RunOutcome {
        let task = match self.store.task(task_id) {
            Some(task) if !task.is_deleted => task,
            _ => {
                error!("Task not found, skipping run");
                return RunOutcome::Skipped {
                    task_id,
                    reason: Error::TaskNotFound(task_id.to_string()).to_string(),
                };
            }
        };
        let Some(content) = self.store.latest_content(task_id) else {
            error!(task = %task.name, "Task has no content, skipping run");
            return RunOutcome::Skipped {
                task_id,
                reason: Error::ContentNotFound(task.name).to_string(),
            };
        };

        match self.run_content(&task, &content).await {
            Ok(history) => RunOutcome::Finished {
                task_name: task.name,
                history,
            },
            Err(err) => {
                error!(task = %task.name, error = %err, "Could not record run history");
                RunOutcome::Skipped {
                    task_id,
                    reason: err.to_string(),
                }
            }
        }
    }

    /// Run a specific content version and record its history.
    pub async fn run_content(&self, task: &Task, content: &Content) -> Result<RunHistory> {
        let mut history = self.store.create_history(task.id, Some(content.id))?;
        let started = Instant::now();
        info!(
            task = %task.name,
            version = content.version,
            history = %history.id,
            "Starting run"
        );

        let outcome = match RunLog::create(&self.log_root, &history) {
            Ok(log) => {
                let outcome = AssertUnwindSafe(self.execute(task, content, &log))
                    .catch_unwind()
                    .await
                    .unwrap_or_else(|panic| {
                        Err(Error::Internal(format!(
                            "worker panicked: {}",
                            panic_message(panic.as_ref())
                        )))
                    });
                if let Err(err) = &outcome {
                    log.line(&err.to_string());
                }
                log.close();
                outcome
            }
            Err(err) => Err(Error::from(err)),
        };

        if let Err(err) = &outcome {
            error!(task = %task.name, error = %err, "Run failed");
        }
        history.finish(outcome, started.elapsed());
        self.store.update_history(&history)?;

        info!(
            task = %task.name,
            history = %history.id,
            success = history.is_success,
            elapsed = history.timedelta,
            "Run finished"
        );
        Ok(history)
    }

    async fn execute(&self, task: &Task, content: &Content, log: &RunLog) -> Result<RunResult> {
        let inventory = content.inventory(self.directory.as_ref())?;
        let options = self.options.with_overrides(&content.options);
        let runner = AdHocRunner::new(inventory, options, self.backends.create());
        runner
            .run(&content.actions, &content.pattern, &task.name, log)
            .await
    }
}
