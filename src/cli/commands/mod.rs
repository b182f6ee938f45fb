//! Subcommands module for bastion-ops CLI
//!
//! This module contains all the subcommand implementations.

pub mod declare;
pub mod exec;
pub mod inventory;
pub mod run;
pub mod serve;
pub mod tail;
pub mod tasks;

use crate::cli::output::OutputFormatter;
use anyhow::{bail, Context, Result};
use bastion_ops::assets::{AssetDirectory, MemoryDirectory};
use bastion_ops::config::Config;
use bastion_ops::engine::{Engine, EngineSettings};
use bastion_ops::inventory::{Inventory, InventoryBuilder};
use bastion_ops::runner::{BackendFactory, CommandBackend, RunOutput, RunnerOptions};
use bastion_ops::tasks::{Task, TaskStore};
use clap::Args;
use colored::Colorize;
use std::sync::Arc;
use uuid::Uuid;

/// Common context shared between commands
pub struct CommandContext {
    /// Configuration
    pub config: Config,
    /// Output formatter
    pub output: OutputFormatter,
    /// Verbosity level
    pub verbosity: u8,
}

impl CommandContext {
    /// Create a new command context from CLI arguments
    pub fn new(cli: &crate::cli::Cli, mut config: Config) -> Self {
        let output = OutputFormatter::new(!cli.no_color, cli.is_json(), cli.verbosity());
        if let Some(assets) = &cli.assets {
            config.storage.assets_file = Some(assets.clone());
        }

        Self {
            config,
            output,
            verbosity: cli.verbosity(),
        }
    }

    /// Load the asset directory named by `--assets` or the config.
    pub fn directory(&self) -> Result<Arc<MemoryDirectory>> {
        match &self.config.storage.assets_file {
            Some(path) => {
                let directory = MemoryDirectory::load(path).with_context(|| {
                    format!("Failed to load asset directory {}", path.display())
                })?;
                Ok(Arc::new(directory))
            }
            None => {
                self.output
                    .warning("No asset directory configured, starting with an empty one");
                Ok(Arc::new(MemoryDirectory::new()))
            }
        }
    }

    /// Open the task store.
    pub fn store(&self) -> Result<Arc<TaskStore>> {
        let path = &self.config.storage.state_file;
        let store = TaskStore::open(path)
            .with_context(|| format!("Failed to open state file {}", path.display()))?;
        Ok(Arc::new(store))
    }

    /// Runner options with the CLI verbosity applied.
    pub fn runner_options(&self) -> RunnerOptions {
        let mut options = self.config.runner_options();
        options.verbosity = options.verbosity.max(self.verbosity);
        options
    }

    pub fn backends(&self) -> Arc<dyn BackendFactory> {
        CommandBackend::factory(self.config.runner.ssh_program.clone())
    }

    /// Start an engine over the configured store and asset directory.
    pub fn start_engine(&self) -> Result<Arc<Engine>> {
        let mut settings = EngineSettings::from_config(&self.config);
        settings.options = self.runner_options();
        let engine = Engine::start(self.store()?, self.directory()?, self.backends(), settings)?;
        Ok(Arc::new(engine))
    }

    /// Look up a live task by id or name.
    pub fn find_task(&self, store: &TaskStore, id_or_name: &str) -> Result<Task> {
        let task = store.resolve_task(id_or_name)?;
        if task.is_deleted {
            bail!("Task '{}' has been deleted", task.name);
        }
        Ok(task)
    }
}

/// Trait for runnable commands
#[async_trait::async_trait]
pub trait Runnable {
    /// Execute the command, returning the process exit code
    async fn run(&self, ctx: &mut CommandContext) -> Result<i32>;
}

/// Host selection shared by the commands that run without a stored task.
#[derive(Args, Debug, Clone, Default)]
pub struct TargetArgs {
    /// Use the targets of a declared task's newest version
    #[arg(long, conflicts_with_all = ["hosts", "nodes"])]
    pub task: Option<String>,

    /// Asset hostnames
    #[arg(long, value_delimiter = ',')]
    pub hosts: Vec<String>,

    /// Node values; every asset below the node is included
    #[arg(long, value_delimiter = ',')]
    pub nodes: Vec<String>,

    /// Connect with each asset's admin user
    #[arg(long)]
    pub run_as_admin: bool,

    /// Connect with this system user
    #[arg(long, conflicts_with = "run_as_admin")]
    pub run_as: Option<String>,
}

impl TargetArgs {
    /// Build the inventory for this selection.
    pub fn inventory(&self, ctx: &CommandContext, directory: &dyn AssetDirectory) -> Result<Inventory> {
        if let Some(name) = &self.task {
            let store = ctx.store()?;
            let task = ctx.find_task(&store, name)?;
            let content = store
                .latest_content(task.id)
                .with_context(|| format!("Task '{}' has no content", task.name))?;
            return Ok(content.inventory(directory)?);
        }

        if self.hosts.is_empty() && self.nodes.is_empty() {
            bail!("Select targets with --task, --hosts or --nodes");
        }
        let assets = resolve_hostnames(directory, &self.hosts)?;
        let nodes = resolve_node_values(directory, &self.nodes)?;
        let inventory = InventoryBuilder::new(directory)
            .assets(assets)
            .nodes(nodes)
            .run_as_admin(self.run_as_admin)
            .run_as(self.run_as.clone())
            .build()?;
        Ok(inventory)
    }
}

/// Map asset hostnames to ids.
pub fn resolve_hostnames(directory: &dyn AssetDirectory, hostnames: &[String]) -> Result<Vec<Uuid>> {
    hostnames
        .iter()
        .map(|name| {
            directory
                .asset_by_hostname(name)
                .map(|asset| asset.id)
                .with_context(|| format!("Unknown asset '{}'", name))
        })
        .collect()
}

/// Map node values to ids.
pub fn resolve_node_values(directory: &dyn AssetDirectory, values: &[String]) -> Result<Vec<Uuid>> {
    values
        .iter()
        .map(|value| {
            directory
                .node_by_value(value)
                .map(|node| node.id)
                .with_context(|| format!("Unknown node '{}'", value))
        })
        .collect()
}

/// Prints run transcript lines as they are produced.
pub struct ConsoleOutput {
    use_color: bool,
}

impl ConsoleOutput {
    pub fn new(use_color: bool) -> Self {
        Self { use_color }
    }
}

impl RunOutput for ConsoleOutput {
    fn line(&self, text: &str) {
        if !self.use_color {
            println!("{}", text);
        } else if text.starts_with("PLAY") || text.starts_with("TASK") {
            println!("{}", text.bold());
        } else if text.starts_with("ok:") {
            println!("{}", text.green());
        } else if text.starts_with("fatal:") || text.starts_with("failed:") {
            println!("{}", text.red());
        } else {
            println!("{}", text);
        }
    }
}
