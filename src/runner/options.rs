//! Options shared by the ad-hoc and playbook runners.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::error::{Error, Result};

/// Effective settings for one run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunnerOptions {
    /// Output verbosity
    pub verbosity: u8,
    /// Number of hosts acted on in parallel
    pub forks: usize,
    /// Connection timeout
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
    /// Escalation method used when a host enables become without naming one
    pub become_method: String,
    /// Escalation user used when a host enables become without naming one
    pub become_user: String,
    /// Arguments added to every ssh invocation
    pub ssh_common_args: Option<String>,
    /// Arguments appended after the common ones
    pub ssh_extra_args: Option<String>,
    /// Vault password files
    pub vault_password_files: Vec<PathBuf>,
    /// Gather facts before the first action
    pub gather_facts: bool,
}

impl Default for RunnerOptions {
    fn default() -> Self {
        Self {
            verbosity: 0,
            forks: 5,
            timeout: Duration::from_secs(10),
            become_method: "sudo".to_string(),
            become_user: "root".to_string(),
            ssh_common_args: None,
            ssh_extra_args: None,
            vault_password_files: Vec::new(),
            gather_facts: false,
        }
    }
}

impl RunnerOptions {
    /// Apply per-content overrides on top of these options.
    pub fn with_overrides(&self, overrides: &OptionOverrides) -> Self {
        let mut options = self.clone();
        if let Some(verbosity) = overrides.verbosity {
            options.verbosity = verbosity;
        }
        if let Some(forks) = overrides.forks {
            options.forks = forks;
        }
        if let Some(timeout) = overrides.timeout {
            options.timeout = timeout;
        }
        if let Some(method) = &overrides.become_method {
            options.become_method = method.clone();
        }
        if let Some(user) = &overrides.become_user {
            options.become_user = user.clone();
        }
        if overrides.ssh_common_args.is_some() {
            options.ssh_common_args = overrides.ssh_common_args.clone();
        }
        if overrides.ssh_extra_args.is_some() {
            options.ssh_extra_args = overrides.ssh_extra_args.clone();
        }
        if let Some(files) = &overrides.vault_password_files {
            options.vault_password_files = files.clone();
        }
        if let Some(gather) = overrides.gather_facts {
            options.gather_facts = gather;
        }
        options
    }

    /// Reject settings that cannot work, before any host is contacted.
    pub fn validate(&self) -> Result<()> {
        if self.forks == 0 {
            return Err(Error::Config("forks must be at least 1".to_string()));
        }
        if let Some(missing) = self.vault_password_files.iter().find(|p| !p.exists()) {
            return Err(Error::VaultFileNotFound(missing.clone()));
        }
        Ok(())
    }
}

/// Partial runner options stored with a task content snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OptionOverrides {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verbosity: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub forks: Option<usize>,
    #[serde(with = "humantime_serde", skip_serializing_if = "Option::is_none")]
    pub timeout: Option<Duration>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub become_method: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub become_user: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ssh_common_args: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ssh_extra_args: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vault_password_files: Option<Vec<PathBuf>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gather_facts: Option<bool>,
}
