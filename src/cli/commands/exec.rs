//! Exec and playbook commands - run directly against target hosts
//!
//! Neither command creates a task or a run history: the transcript goes to
//! the terminal and the structured result is printed at the end.

use super::{CommandContext, ConsoleOutput, Runnable, TargetArgs};
use anyhow::Result;
use bastion_ops::runner::{
    CommandRunner, NullOutput, PlaybookRunner, RunOutput, RunResult,
};
use clap::Parser;
use std::path::PathBuf;

/// Arguments for the exec command
#[derive(Parser, Debug, Clone)]
pub struct ExecArgs {
    /// Command line to run
    #[arg(required = true)]
    pub cmd: String,

    #[command(flatten)]
    pub targets: TargetArgs,

    /// Host pattern inside the selection
    #[arg(long, short = 'p', default_value = "all")]
    pub pattern: String,

    /// One of shell, raw, command, script
    #[arg(long, short = 'm')]
    pub module: Option<String>,
}

/// Arguments for the playbook command
#[derive(Parser, Debug, Clone)]
pub struct PlaybookArgs {
    /// Playbook file
    #[arg(required = true)]
    pub file: PathBuf,

    #[command(flatten)]
    pub targets: TargetArgs,
}

/// Print the structured result and pick the exit code.
fn report(ctx: &CommandContext, result: &RunResult) -> Result<i32> {
    if ctx.output.is_json() {
        ctx.output.json(result)?;
    } else {
        for host in result.summary.success_hosts() {
            ctx.output.status(true, "ok", host);
        }
        for host in result.summary.failed_hosts() {
            ctx.output.status(false, "failed", host);
        }
    }
    ctx.output.flush();
    Ok(if result.is_success() { 0 } else { 1 })
}

fn transcript(ctx: &CommandContext) -> Box<dyn RunOutput> {
    if ctx.output.is_json() {
        Box::new(NullOutput)
    } else {
        Box::new(ConsoleOutput::new(ctx.output.use_color()))
    }
}

#[async_trait::async_trait]
impl Runnable for ExecArgs {
    async fn run(&self, ctx: &mut CommandContext) -> Result<i32> {
        let directory = ctx.directory()?;
        let inventory = self.targets.inventory(ctx, directory.as_ref())?;
        let runner = CommandRunner::new(inventory, ctx.runner_options(), ctx.backends().create());

        let output = transcript(ctx);
        let result = runner
            .execute(&self.cmd, &self.pattern, self.module.as_deref(), &*output)
            .await?;
        report(ctx, &result)
    }
}

#[async_trait::async_trait]
impl Runnable for PlaybookArgs {
    async fn run(&self, ctx: &mut CommandContext) -> Result<i32> {
        let directory = ctx.directory()?;
        let inventory = self.targets.inventory(ctx, directory.as_ref())?;
        let runner = PlaybookRunner::new(
            &self.file,
            inventory,
            ctx.runner_options(),
            ctx.backends().create(),
        );

        let output = transcript(ctx);
        let result = runner.run(&*output).await?;
        report(ctx, &result)
    }
}
