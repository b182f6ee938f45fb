//! A single module invocation in an ad-hoc run.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Modules that do nothing useful without arguments.
pub const MODULES_REQUIRING_ARGS: &[&str] = &["command", "shell", "raw", "script"];

/// One step of an ad-hoc play.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Action {
    /// Module name
    pub module: String,
    /// Free-form module arguments
    #[serde(default)]
    pub args: String,
    /// Optional display name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl Action {
    pub fn new(module: impl Into<String>, args: impl Into<String>) -> Self {
        Self {
            module: module.into(),
            args: args.into(),
            name: None,
        }
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Label used in run logs.
    pub fn label(&self) -> String {
        match &self.name {
            Some(name) => name.clone(),
            None if self.args.is_empty() => self.module.clone(),
            None => format!("{}: {}", self.module, self.args),
        }
    }

    /// Module name without a collection prefix such as `ansible.builtin.`.
    pub fn short_module(&self) -> &str {
        self.module.rsplit('.').next().unwrap_or(&self.module)
    }

    /// Fail when a module that needs arguments has none.
    pub fn check_args(&self) -> Result<()> {
        if MODULES_REQUIRING_ARGS.contains(&self.short_module()) && self.args.trim().is_empty() {
            return Err(Error::missing_module_args(&self.module));
        }
        Ok(())
    }
}
