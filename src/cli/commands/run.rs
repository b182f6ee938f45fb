//! Run command - run a declared task through the worker pool
//!
//! Submits the task, follows the log of the run it produces and prints the
//! contacted/dark summary once the job is done.

use super::tail::LogPrinter;
use super::{CommandContext, Runnable};
use anyhow::Result;
use bastion_ops::pipeline::JobStatus;
use clap::Parser;
use std::time::Duration;

/// Arguments for the run command
#[derive(Parser, Debug, Clone)]
pub struct RunArgs {
    /// Task id or name
    #[arg(required = true)]
    pub task: String,

    /// Do not stream the run log
    #[arg(long)]
    pub quiet: bool,

    /// Log poll interval
    #[arg(long, default_value = "200ms", value_parser = humantime::parse_duration)]
    pub interval: Duration,
}

#[async_trait::async_trait]
impl Runnable for RunArgs {
    async fn run(&self, ctx: &mut CommandContext) -> Result<i32> {
        let engine = ctx.start_engine()?;
        let store = engine.store().clone();
        let task = ctx.find_task(&store, &self.task)?;

        let previous = store.latest_history(task.id).map(|h| h.id);
        let handle = engine.submit(task.id)?;
        ctx.output.info(&format!("Queued '{}' as job {}", task.name, handle));

        if !self.quiet && !ctx.output.is_json() {
            ctx.output.banner(&format!("RUN {}", task.name));
            // The history record appears once a worker picks the job up.
            let history = loop {
                let current = store
                    .latest_history(task.id)
                    .filter(|h| Some(h.id) != previous);
                if current.is_some() {
                    break current;
                }
                if engine.pool().status(handle).is_some_and(|s| s.is_terminal()) {
                    break None;
                }
                tokio::time::sleep(self.interval).await;
            };

            if let Some(history) = history {
                let mut printer = LogPrinter::new();
                let mut mark: Option<String> = None;
                loop {
                    let chunk = engine.tail_history(&history, mark.as_deref()).await?;
                    let had_data = printer.print(&chunk);
                    if chunk.end {
                        break;
                    }
                    mark = Some(chunk.mark);
                    if !had_data {
                        tokio::time::sleep(self.interval).await;
                    }
                }
            }
        }

        let status = engine.pool().wait(handle).await;
        engine.shutdown().await;

        let exit_code = match status {
            Some(JobStatus::Finished { history_id, success }) => {
                if let Some(history) = store.history(history_id) {
                    if ctx.output.is_json() {
                        ctx.output.json(&history)?;
                    } else {
                        ctx.output.run_summary(&task.name, &history);
                    }
                }
                if success {
                    0
                } else {
                    1
                }
            }
            Some(JobStatus::Skipped { reason }) => {
                ctx.output.error(&format!("Run skipped: {}", reason));
                3
            }
            Some(JobStatus::Failed { reason }) => {
                ctx.output.error(&format!("Run failed: {}", reason));
                1
            }
            Some(JobStatus::Pending | JobStatus::Running) => {
                ctx.output.error("Job did not reach a terminal state");
                1
            }
            None => {
                ctx.output.error("Job disappeared before finishing");
                1
            }
        };
        ctx.output.flush();
        Ok(exit_code)
    }
}
