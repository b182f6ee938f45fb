//! # bastion-ops - Task Orchestration for a Bastion Host
//!
//! bastion-ops runs commands and playbooks on the hosts a bastion manages.
//! Operators declare named tasks against assets and asset-tree nodes; every
//! change to a task's definition is kept as a version, runs go through an
//! async worker pool, and each run leaves a history record plus a log that
//! can be tailed while it is written.
//!
//! ## Core Concepts
//!
//! - **Assets**: managed hosts, organised in a tree of nodes, with admin and
//!   system users and optional gateway-fronted network domains
//! - **Inventory**: the hosts and groups a run targets, built from assets
//! - **Runners**: ad-hoc (a list of actions), command and playbook runners
//! - **Tasks**: named, versioned run definitions, declared idempotently
//! - **Pipeline**: worker pool, completion callbacks, lifecycle hooks and
//!   the periodic schedule beat
//! - **History**: per-run records and chunked log tailing
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌──────────────────────────────┐   ┌──────────────────────────────┐
//! │   CLI (clap subcommands)     │   │   HTTP API (axum + JWT)      │
//! └──────────────┬───────────────┘   └──────────────┬───────────────┘
//!                └──────────────┬───────────────────┘
//!                               ▼
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                     Engine (engine.rs)                          │
//! │  TaskStore ─ PeriodicRegistry ─ WorkerPool ─ LogTail ─ TtlCache │
//! └──────────────┬──────────────────────────────────┬───────────────┘
//!                ▼                                  ▼
//! ┌──────────────────────────────┐   ┌──────────────────────────────┐
//! │ InventoryBuilder (assets →   │   │ AdHocRunner / PlaybookRunner │
//! │ hosts, groups, credentials)  │──▶│ → ExecutionBackend (ssh, sh) │
//! └──────────────────────────────┘   └──────────────────────────────┘
//! ```
//!
//! ## Quick Example
//!
//! ```rust,ignore
//! use bastion_ops::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let store = Arc::new(TaskStore::open("state.json")?);
//!     let directory = Arc::new(MemoryDirectory::load("assets.yml")?);
//!     let engine = Engine::start(
//!         store,
//!         directory,
//!         CommandBackend::factory("ssh"),
//!         EngineSettings::from_config(&Config::default()),
//!     )?;
//!
//!     let mut declaration = TaskDeclaration::new("uptime");
//!     declaration.nodes.push(web_node_id);
//!     declaration.actions.push(Action::new("shell", "uptime"));
//!     let (task, _) = engine.declare(&declaration)?;
//!
//!     let handle = engine.submit(task.id)?;
//!     engine.pool().wait(handle).await;
//!     Ok(())
//! }
//! ```

#![warn(clippy::all)]
#![allow(clippy::module_name_repetitions)]

// Re-export commonly used items in prelude
pub mod prelude {
    //! Convenient re-exports of commonly used types and traits.

    pub use std::sync::Arc;

    // Assets and inventory
    pub use crate::assets::{Asset, AssetDirectory, Credential, Domain, MemoryDirectory, Node};
    pub use crate::inventory::{BecomeSpec, Group, Host, Inventory, InventoryBuilder};

    // Runners
    pub use crate::runner::{
        Action, AdHocRunner, BackendFactory, CommandBackend, CommandRunner, ExecutionBackend,
        PlaybookRunner, RunOutput, RunResult, RunnerOptions,
    };

    // Tasks, pipeline and history
    pub use crate::engine::{Engine, EngineSettings};
    pub use crate::history::{LogTail, RunHistory, TailChunk};
    pub use crate::pipeline::{JobHandle, JobStatus, PeriodicRegistry, WorkerPool};
    pub use crate::tasks::{Content, Task, TaskDeclaration, TaskStore};

    // Configuration and errors
    pub use crate::config::Config;
    pub use crate::error::{Error, Result};
}

// ============================================================================
// Core Modules
// ============================================================================

/// Error types and result aliases.
///
/// Errors are classed as configuration, lookup or runtime failures so that
/// callers can decide whether to abort, skip or record them.
pub mod error;

/// Layered configuration (files, environment, defaults).
pub mod config;

/// Shared TTL cache for marks, markers and connectivity flags.
pub mod cache;

// ============================================================================
// Targets
// ============================================================================

/// Asset, node, credential and domain records and the directory trait.
pub mod assets;

/// Inventory model, host patterns and the asset-to-inventory builder.
pub mod inventory;

// ============================================================================
// Execution
// ============================================================================

/// Ad-hoc, command and playbook runners and execution backends.
pub mod runner;

/// Task definitions, content versions and the state store.
pub mod tasks;

/// Run history records and log tailing.
pub mod history;

/// Worker pool, callbacks, lifecycle hooks and the schedule beat.
pub mod pipeline;

/// Facade tying store, pipeline and log tailing together.
pub mod engine;

// ============================================================================
// Outer Surfaces
// ============================================================================

/// REST API server.
#[cfg(feature = "api")]
pub mod api;

// Re-export main types at crate root
pub use engine::Engine;
pub use error::{Error, Result};

/// Returns the current version of bastion-ops.
#[must_use]
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
