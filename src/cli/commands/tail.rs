//! Tail command - follow the log of a run
//!
//! Polls the run log in chunks until the run has finished and every byte
//! has been printed. Works against runs driven by another process, since
//! the history record is re-read from the state file on each poll.

use super::{CommandContext, Runnable};
use anyhow::{Context, Result};
use bastion_ops::cache::TtlCache;
use bastion_ops::history::{LogTail, TailChunk, NOT_FOUND_MESSAGE, WAITING_MESSAGE};
use bastion_ops::tasks::TaskStore;
use clap::Parser;
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

/// Arguments for the tail command
#[derive(Parser, Debug, Clone)]
pub struct TailArgs {
    /// Run history id
    #[arg(required = true)]
    pub history: Uuid,

    /// Poll interval while the run is still going
    #[arg(long, default_value = "500ms", value_parser = humantime::parse_duration)]
    pub interval: Duration,

    /// Print what is there now and exit
    #[arg(long)]
    pub no_follow: bool,
}

/// Writes tail chunks to stdout, showing the waiting notice once.
#[derive(Debug, Default)]
pub struct LogPrinter {
    waiting_shown: bool,
}

impl LogPrinter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Print a chunk; returns true when it carried log text.
    pub fn print(&mut self, chunk: &TailChunk) -> bool {
        if chunk.data == WAITING_MESSAGE {
            if !self.waiting_shown {
                eprint!("{}", WAITING_MESSAGE);
                self.waiting_shown = true;
            }
            return false;
        }
        if chunk.data == NOT_FOUND_MESSAGE {
            eprintln!("{}", NOT_FOUND_MESSAGE);
            return false;
        }
        if chunk.data.is_empty() {
            return false;
        }
        let mut stdout = std::io::stdout();
        let _ = stdout.write_all(chunk.data.replace("\r\n", "\n").as_bytes());
        let _ = stdout.flush();
        true
    }
}

#[async_trait::async_trait]
impl Runnable for TailArgs {
    async fn run(&self, ctx: &mut CommandContext) -> Result<i32> {
        let state_file = ctx.config.storage.state_file.clone();
        let load = || -> Result<_> {
            let store = TaskStore::open(&state_file)
                .with_context(|| format!("Failed to open state file {}", state_file.display()))?;
            store
                .history(self.history)
                .with_context(|| format!("Run history '{}' not found", self.history))
        };

        let history = load()?;
        let path = history.log_path(&ctx.config.storage.log_root);
        let tail = LogTail::new(Arc::new(TtlCache::new())).with_mark_ttl(ctx.config.pipeline.mark_ttl);
        let mut printer = LogPrinter::new();
        let mut mark: Option<String> = None;

        loop {
            let is_finished = self.no_follow || load()?.is_finished;
            let chunk = tail.read(&path, is_finished, mark.as_deref()).await?;
            let had_data = printer.print(&chunk);
            if chunk.end {
                break;
            }
            mark = Some(chunk.mark);
            if !had_data {
                tokio::time::sleep(self.interval).await;
            }
        }

        let history = load()?;
        Ok(if history.is_success { 0 } else { 1 })
    }
}
