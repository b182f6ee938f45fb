//! Serve command - long-running pipeline process
//!
//! Starts the worker pool and the schedule beat, and the HTTP API when the
//! `api` feature is enabled. Stops on Ctrl-C after draining queued runs.

use super::{CommandContext, Runnable};
use anyhow::Result;
use clap::Parser;
use std::net::SocketAddr;
use tracing::info;

/// Arguments for the serve command
#[derive(Parser, Debug, Clone)]
pub struct ServeArgs {
    /// Address to bind the API to
    #[arg(long, short = 'b')]
    pub bind: Option<SocketAddr>,

    /// Do not run periodic tasks
    #[arg(long)]
    pub no_beat: bool,

    /// Number of workers
    #[arg(long, short = 'w')]
    pub workers: Option<usize>,
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "Failed to listen for Ctrl-C");
        std::future::pending::<()>().await;
    }
    info!("Shutdown requested");
}

#[async_trait::async_trait]
impl Runnable for ServeArgs {
    async fn run(&self, ctx: &mut CommandContext) -> Result<i32> {
        if let Some(workers) = self.workers {
            ctx.config.pipeline.workers = workers;
        }
        if let Some(bind) = self.bind {
            ctx.config.server.bind = bind;
        }

        let engine = ctx.start_engine()?;
        let beat = (!self.no_beat).then(|| engine.spawn_beat());

        ctx.output.banner("BASTION-OPS");
        ctx.output.plain(&format!(
            "workers: {}  schedules: {}  state: {}",
            ctx.config.pipeline.workers,
            engine.registry().entries().len(),
            ctx.config.storage.state_file.display()
        ));

        #[cfg(feature = "api")]
        {
            let server = bastion_ops::api::ApiServer::new(engine.clone(), ctx.config.server.clone());
            ctx.output
                .plain(&format!("listening on http://{}", ctx.config.server.bind));
            server.run_with_shutdown(shutdown_signal()).await?;
        }

        #[cfg(not(feature = "api"))]
        shutdown_signal().await;

        if let Some(beat) = beat {
            beat.abort();
        }
        engine.shutdown().await;
        Ok(0)
    }
}
