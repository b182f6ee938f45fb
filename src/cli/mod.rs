//! CLI module for bastion-ops
//!
//! Argument parsing and subcommand dispatch for the `bastion-ops` binary.

pub mod commands;
pub mod output;

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// bastion-ops - task orchestration for bastion-managed hosts
///
/// Declares versioned tasks against the asset tree, runs them through a
/// worker pool and streams the run logs.
#[derive(Parser, Debug, Clone)]
#[command(name = "bastion-ops")]
#[command(version)]
#[command(about = "Versioned task orchestration for bastion-managed hosts", long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Path to configuration file
    #[arg(short = 'c', long, global = true, env = "BASTION_OPS_CONFIG")]
    pub config: Option<PathBuf>,

    /// YAML asset directory (assets, nodes, users, domains)
    #[arg(short = 'a', long, global = true, env = "BASTION_OPS_ASSETS")]
    pub assets: Option<PathBuf>,

    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short = 'v', long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Print machine-readable JSON instead of tables
    #[arg(long, global = true)]
    pub json: bool,

    /// Log line format (overrides the config)
    #[arg(long, global = true, value_enum)]
    pub log_format: Option<LogFormat>,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,
}

/// Format of diagnostic log lines on stderr
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    /// Human-readable lines
    Text,
    /// One JSON object per line
    Json,
}

impl LogFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogFormat::Text => "text",
            LogFormat::Json => "json",
        }
    }
}

/// Available subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Run the worker pool, the schedule beat and the HTTP API
    Serve(commands::serve::ServeArgs),

    /// Declare tasks from a YAML file
    Declare(commands::declare::DeclareArgs),

    /// Run a declared task and stream its log
    Run(commands::run::RunArgs),

    /// Follow the log of a run
    Tail(commands::tail::TailArgs),

    /// List declared tasks
    Tasks(commands::tasks::TasksArgs),

    /// Show the run history of a task
    History(commands::tasks::HistoryArgs),

    /// Delete a task
    Delete(commands::tasks::DeleteArgs),

    /// Show the inventory a task or target selection resolves to
    Inventory(commands::inventory::InventoryArgs),

    /// Run a single command on target hosts without declaring a task
    Exec(commands::exec::ExecArgs),

    /// Run a playbook file on target hosts
    Playbook(commands::exec::PlaybookArgs),
}

impl Cli {
    /// Parse command-line arguments
    pub fn parse_args() -> Self {
        Cli::parse()
    }

    /// Get the effective verbosity level (0-3)
    pub fn verbosity(&self) -> u8 {
        self.verbose.min(3)
    }

    /// Check if JSON output is requested
    pub fn is_json(&self) -> bool {
        self.json
    }
}
