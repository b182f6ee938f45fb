//! Error types for the orchestration engine.
//!
//! Errors are grouped the way callers need to treat them: configuration
//! errors fail fast before any remote I/O, backend errors are caught at the
//! pipeline boundary and recorded on a run history, lookup errors are
//! logged and ignored by the pipeline.

use std::path::PathBuf;
use thiserror::Error;
use uuid::Uuid;

use crate::inventory::InventoryError;

/// Result type alias for engine operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Text carried by a panic payload.
pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// The main error type for the engine.
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // Configuration Errors
    // ========================================================================
    /// Target pattern is blank.
    #[error("Pattern `{0}` is not valid!")]
    InvalidPattern(String),

    /// Inventory resolved to zero hosts.
    #[error("Inventory is empty.")]
    EmptyInventory,

    /// Pattern matched nothing in a non-empty inventory.
    #[error("pattern: {pattern} does not match any hosts.")]
    NoHostsMatched {
        /// The pattern that was evaluated
        pattern: String,
    },

    /// A module that needs arguments was declared without any.
    #[error("No argument passed to '{module}' module.")]
    MissingModuleArgs {
        /// Module name
        module: String,
    },

    /// Module is not accepted by a restricted runner.
    #[error("Module should be one of {allowed:?}, got '{module}'")]
    ModuleNotAllowed {
        /// Module name
        module: String,
        /// Modules the runner accepts
        allowed: &'static [&'static str],
    },

    /// Both an interval and a crontab were set on one task.
    #[error("Task '{task}' sets both an interval and a crontab")]
    ConflictingTrigger {
        /// Task name
        task: String,
    },

    /// Interval string could not be parsed.
    #[error("Invalid interval '{value}': {message}")]
    InvalidInterval {
        /// Raw interval value
        value: String,
        /// Parser message
        message: String,
    },

    /// Crontab expression could not be parsed.
    #[error("Invalid crontab '{value}': {message}")]
    InvalidCrontab {
        /// Raw crontab value
        value: String,
        /// Parser message
        message: String,
    },

    /// Declaration is missing required parts.
    #[error("Invalid task declaration: {0}")]
    InvalidDeclaration(String),

    /// Playbook file does not exist.
    #[error("Not found the playbook file: {0}")]
    PlaybookNotFound(PathBuf),

    /// Playbook file exists but is not a list of plays.
    #[error("Failed to parse playbook '{path}': {message}")]
    PlaybookParse {
        /// Path to the playbook file
        path: PathBuf,
        /// Error message
        message: String,
    },

    /// Vault password file does not exist.
    #[error("Vault password file not found: {0}")]
    VaultFileNotFound(PathBuf),

    /// Inventory construction or pattern evaluation failed.
    #[error(transparent)]
    Inventory(#[from] InventoryError),

    /// Invalid configuration value.
    #[error("Configuration error: {0}")]
    Config(String),

    // ========================================================================
    // Backend Errors
    // ========================================================================
    /// The execution backend failed as a whole, not for a single host.
    #[error("Execution backend error: {0}")]
    Backend(String),

    // ========================================================================
    // Lookup Errors
    // ========================================================================
    /// Unknown task id or name.
    #[error("Task '{0}' not found")]
    TaskNotFound(String),

    /// Task exists but has never been given content.
    #[error("Task '{0}' has no content")]
    ContentNotFound(String),

    /// Unknown run history id.
    #[error("Run history '{0}' not found")]
    HistoryNotFound(Uuid),

    // ========================================================================
    // IO and Serialization Errors
    // ========================================================================
    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML error.
    #[error("YAML parse error: {0}")]
    YamlParse(#[from] serde_yaml::Error),

    /// JSON error.
    #[error("JSON parse error: {0}")]
    JsonParse(#[from] serde_json::Error),

    /// Internal invariant violated.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create a no-hosts-matched error.
    pub fn no_hosts_matched(pattern: impl Into<String>) -> Self {
        Self::NoHostsMatched {
            pattern: pattern.into(),
        }
    }

    /// Create a missing-module-arguments error.
    pub fn missing_module_args(module: impl Into<String>) -> Self {
        Self::MissingModuleArgs {
            module: module.into(),
        }
    }

    /// Wrap any backend failure.
    pub fn backend(err: impl std::fmt::Display) -> Self {
        Self::Backend(err.to_string())
    }

    /// True for errors raised before any remote I/O starts.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Error::InvalidPattern(_)
                | Error::EmptyInventory
                | Error::NoHostsMatched { .. }
                | Error::MissingModuleArgs { .. }
                | Error::ModuleNotAllowed { .. }
                | Error::ConflictingTrigger { .. }
                | Error::InvalidInterval { .. }
                | Error::InvalidCrontab { .. }
                | Error::InvalidDeclaration(_)
                | Error::PlaybookNotFound(_)
                | Error::PlaybookParse { .. }
                | Error::VaultFileNotFound(_)
                | Error::Inventory(_)
                | Error::Config(_)
        )
    }

    /// True for unknown task/content/history lookups.
    pub fn is_lookup(&self) -> bool {
        matches!(
            self,
            Error::TaskNotFound(_) | Error::ContentNotFound(_) | Error::HistoryNotFound(_)
        )
    }

    /// Get the exit code for this error.
    pub fn exit_code(&self) -> i32 {
        if self.is_configuration() {
            2
        } else if self.is_lookup() {
            3
        } else {
            1
        }
    }
}
