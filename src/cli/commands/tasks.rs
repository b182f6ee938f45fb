//! Task listing, run history and deletion commands

use super::{CommandContext, Runnable};
use anyhow::Result;
use bastion_ops::tasks::Task;
use clap::Parser;

/// Arguments for the tasks command
#[derive(Parser, Debug, Clone)]
pub struct TasksArgs {
    /// Include soft-deleted tasks
    #[arg(long)]
    pub all: bool,
}

/// Arguments for the history command
#[derive(Parser, Debug, Clone)]
pub struct HistoryArgs {
    /// Task id or name
    #[arg(required = true)]
    pub task: String,

    /// Show at most this many runs
    #[arg(long, short = 'n', default_value = "20")]
    pub limit: usize,
}

/// Arguments for the delete command
#[derive(Parser, Debug, Clone)]
pub struct DeleteArgs {
    /// Task id or name
    #[arg(required = true)]
    pub task: String,

    /// Remove contents and run histories as well
    #[arg(long)]
    pub hard: bool,
}

fn trigger_label(task: &Task) -> String {
    match (&task.interval, &task.crontab) {
        _ if !task.is_periodic => "-".to_string(),
        (Some(interval), _) => format!("every {}", interval),
        (None, Some(crontab)) => format!("cron {}", crontab),
        (None, None) => "-".to_string(),
    }
}

#[async_trait::async_trait]
impl Runnable for TasksArgs {
    async fn run(&self, ctx: &mut CommandContext) -> Result<i32> {
        let store = ctx.store()?;
        let tasks = if self.all {
            store.all_tasks()
        } else {
            store.tasks()
        };

        if ctx.output.is_json() {
            ctx.output.json(&tasks)?;
            return Ok(0);
        }

        ctx.output.section("TASKS");
        let rows: Vec<Vec<String>> = tasks
            .iter()
            .map(|task| {
                let summary = store.history_summary(task.id);
                let version = store
                    .latest_content(task.id)
                    .map(|c| format!("v{}", c.version))
                    .unwrap_or_else(|| "-".to_string());
                let last_run = store
                    .latest_history(task.id)
                    .map(|h| h.date_start.format("%Y-%m-%d %H:%M:%S").to_string())
                    .unwrap_or_else(|| "never".to_string());
                let mut name = task.name.clone();
                if task.is_deleted {
                    name.push_str(" (deleted)");
                }
                vec![
                    name,
                    version,
                    trigger_label(task),
                    format!("{}/{}/{}", summary.total, summary.success, summary.failed),
                    last_run,
                ]
            })
            .collect();
        ctx.output.table(
            &["NAME", "VERSION", "SCHEDULE", "RUNS (all/ok/failed)", "LAST RUN"],
            &rows,
        );
        Ok(0)
    }
}

#[async_trait::async_trait]
impl Runnable for HistoryArgs {
    async fn run(&self, ctx: &mut CommandContext) -> Result<i32> {
        let store = ctx.store()?;
        let task = store.resolve_task(&self.task)?;
        let histories: Vec<_> = store
            .histories(task.id)
            .into_iter()
            .take(self.limit)
            .collect();

        if ctx.output.is_json() {
            ctx.output.json(&histories)?;
            return Ok(0);
        }

        ctx.output.section(&format!("HISTORY [{}]", task.name));
        let rows: Vec<Vec<String>> = histories
            .iter()
            .map(|h| {
                let version = h
                    .content_id
                    .and_then(|id| store.content(id))
                    .map(|c| format!("v{}", c.version))
                    .unwrap_or_else(|| "-".to_string());
                let state = match (h.is_finished, h.is_success) {
                    (false, _) => "running",
                    (true, true) => "success",
                    (true, false) => "failed",
                };
                vec![
                    h.id.to_string(),
                    version,
                    h.date_start.format("%Y-%m-%d %H:%M:%S").to_string(),
                    format!("{:.2}s", h.timedelta),
                    state.to_string(),
                ]
            })
            .collect();
        ctx.output
            .table(&["ID", "VERSION", "STARTED", "DURATION", "STATE"], &rows);

        let summary = store.history_summary(task.id);
        ctx.output.plain(&format!(
            "\ntotal: {}  success: {}  failed: {}",
            summary.total, summary.success, summary.failed
        ));
        Ok(0)
    }
}

#[async_trait::async_trait]
impl Runnable for DeleteArgs {
    async fn run(&self, ctx: &mut CommandContext) -> Result<i32> {
        let store = ctx.store()?;
        let task = store.resolve_task(&self.task)?;
        let task = if self.hard {
            store.delete_task(task.id)?
        } else {
            store.soft_delete_task(task.id)?
        };

        if ctx.output.is_json() {
            ctx.output.json(&task)?;
        } else {
            ctx.output.status(
                true,
                "deleted",
                &format!("{}{}", task.name, if self.hard { " (hard)" } else { "" }),
            );
        }
        Ok(0)
    }
}
