//! Configuration for bastion-ops
//!
//! Handles loading and merging configuration from multiple sources:
//! - Default values
//! - System configuration (/etc/bastion-ops/config.toml)
//! - User configuration (~/.config/bastion-ops/config.toml)
//! - Project configuration (./bastion-ops.toml)
//! - Environment variables
//! - Command-line arguments

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use crate::runner::RunnerOptions;

/// Main configuration structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Defaults for every run
    pub runner: RunnerConfig,

    /// Where state and run logs live
    pub storage: StorageConfig,

    /// Worker pool and scheduler settings
    pub pipeline: PipelineConfig,

    /// HTTP API settings
    pub server: ServerConfig,

    /// Logging settings
    pub logging: LoggingConfig,
}

/// Run defaults, overridable per task content
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunnerConfig {
    /// Hosts worked on in parallel
    pub forks: usize,

    /// SSH connect timeout
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,

    pub become_method: String,
    pub become_user: String,
    pub gather_facts: bool,

    /// ssh client binary
    pub ssh_program: String,

    /// Extra arguments for every ssh connection
    pub ssh_common_args: Option<String>,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        let options = RunnerOptions::default();
        Self {
            forks: options.forks,
            timeout: options.timeout,
            become_method: options.become_method,
            become_user: options.become_user,
            gather_facts: options.gather_facts,
            ssh_program: "ssh".to_string(),
            ssh_common_args: None,
        }
    }
}

/// Storage locations
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// JSON file holding tasks, contents and histories
    pub state_file: PathBuf,

    /// Root of the dated run log tree
    pub log_root: PathBuf,

    /// YAML asset directory loaded at startup
    pub assets_file: Option<PathBuf>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        let base = dirs::data_dir()
            .map(|d| d.join("bastion-ops"))
            .unwrap_or_else(|| PathBuf::from("./data"));
        Self {
            state_file: base.join("state.json"),
            log_root: base.join("logs"),
            assets_file: None,
        }
    }
}

/// Worker pool and schedule settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Number of workers
    pub workers: usize,

    /// Lifetime of the once-per-event lifecycle markers
    #[serde(with = "humantime_serde")]
    pub marker_ttl: Duration,

    /// Lifetime of a log tail mark
    #[serde(with = "humantime_serde")]
    pub mark_ttl: Duration,

    /// How often the beat checks for due entries
    #[serde(with = "humantime_serde")]
    pub beat_tick: Duration,

    /// Task names run once when the pool starts
    pub startup_tasks: Vec<String>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            marker_ttl: Duration::from_secs(10),
            mark_ttl: Duration::from_secs(5),
            beat_tick: Duration::from_secs(1),
            startup_tasks: Vec::new(),
        }
    }
}

/// An account allowed to log into the API
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiUser {
    pub username: String,
    pub password: String,
    #[serde(default)]
    pub roles: Vec<String>,
}

/// HTTP API settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address to bind the server to
    pub bind: SocketAddr,

    /// JWT secret key
    pub jwt_secret: String,

    /// JWT token lifetime
    #[serde(with = "humantime_serde")]
    pub token_lifetime: Duration,

    /// Whether to enable CORS
    pub enable_cors: bool,

    pub users: Vec<ApiUser>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: SocketAddr::from(([127, 0, 0, 1], 8080)),
            jwt_secret: "bastion-ops-secret-change-me".to_string(),
            token_lifetime: Duration::from_secs(3600),
            enable_cors: true,
            users: Vec::new(),
        }
    }
}

/// Logging settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter used when no -v flag is given
    pub level: String,

    /// `text` or `json`
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "text".to_string(),
        }
    }
}

/// `other` when it differs from the default, otherwise `base`.
fn pick<T: PartialEq + Clone>(base: &T, other: &T, default: &T) -> T {
    if other != default {
        other.clone()
    } else {
        base.clone()
    }
}

impl Config {
    /// Load configuration from all sources
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        let mut config = Config::default();

        for path in Self::get_config_paths(config_path) {
            if path.exists() {
                config = config.merge_from_file(&path)?;
            }
        }

        config.apply_env_overrides();

        Ok(config)
    }

    /// Get the list of configuration file paths to check
    fn get_config_paths(explicit_path: Option<&PathBuf>) -> Vec<PathBuf> {
        if let Some(path) = explicit_path {
            return vec![path.clone()];
        }
        if let Ok(env_config) = std::env::var("BASTION_OPS_CONFIG") {
            return vec![PathBuf::from(env_config)];
        }

        let mut paths = vec![PathBuf::from("/etc/bastion-ops/config.toml")];
        if let Some(config_dir) = dirs::config_dir() {
            paths.push(config_dir.join("bastion-ops").join("config.toml"));
        }
        paths.push(PathBuf::from("bastion-ops.toml"));
        paths
    }

    /// Merge configuration from a file
    fn merge_from_file(&self, path: &PathBuf) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let extension = path.extension().and_then(|e| e.to_str()).unwrap_or("");
        let file_config: Config = match extension {
            "yml" | "yaml" => serde_yaml::from_str(&content)
                .with_context(|| format!("Failed to parse config file: {}", path.display()))?,
            "json" => serde_json::from_str(&content)
                .with_context(|| format!("Failed to parse config file: {}", path.display()))?,
            _ => toml::from_str(&content)
                .with_context(|| format!("Failed to parse config file: {}", path.display()))?,
        };

        Ok(self.merge(file_config))
    }

    /// Merge another config into this one; non-default values in `other` win.
    fn merge(&self, other: Config) -> Config {
        let d = Config::default();
        Config {
            runner: RunnerConfig {
                forks: pick(&self.runner.forks, &other.runner.forks, &d.runner.forks),
                timeout: pick(&self.runner.timeout, &other.runner.timeout, &d.runner.timeout),
                become_method: pick(
                    &self.runner.become_method,
                    &other.runner.become_method,
                    &d.runner.become_method,
                ),
                become_user: pick(
                    &self.runner.become_user,
                    &other.runner.become_user,
                    &d.runner.become_user,
                ),
                gather_facts: pick(
                    &self.runner.gather_facts,
                    &other.runner.gather_facts,
                    &d.runner.gather_facts,
                ),
                ssh_program: pick(
                    &self.runner.ssh_program,
                    &other.runner.ssh_program,
                    &d.runner.ssh_program,
                ),
                ssh_common_args: other
                    .runner
                    .ssh_common_args
                    .or_else(|| self.runner.ssh_common_args.clone()),
            },
            storage: StorageConfig {
                state_file: pick(
                    &self.storage.state_file,
                    &other.storage.state_file,
                    &d.storage.state_file,
                ),
                log_root: pick(&self.storage.log_root, &other.storage.log_root, &d.storage.log_root),
                assets_file: other
                    .storage
                    .assets_file
                    .or_else(|| self.storage.assets_file.clone()),
            },
            pipeline: PipelineConfig {
                workers: pick(&self.pipeline.workers, &other.pipeline.workers, &d.pipeline.workers),
                marker_ttl: pick(
                    &self.pipeline.marker_ttl,
                    &other.pipeline.marker_ttl,
                    &d.pipeline.marker_ttl,
                ),
                mark_ttl: pick(&self.pipeline.mark_ttl, &other.pipeline.mark_ttl, &d.pipeline.mark_ttl),
                beat_tick: pick(
                    &self.pipeline.beat_tick,
                    &other.pipeline.beat_tick,
                    &d.pipeline.beat_tick,
                ),
                startup_tasks: pick(
                    &self.pipeline.startup_tasks,
                    &other.pipeline.startup_tasks,
                    &d.pipeline.startup_tasks,
                ),
            },
            server: ServerConfig {
                bind: pick(&self.server.bind, &other.server.bind, &d.server.bind),
                jwt_secret: pick(
                    &self.server.jwt_secret,
                    &other.server.jwt_secret,
                    &d.server.jwt_secret,
                ),
                token_lifetime: pick(
                    &self.server.token_lifetime,
                    &other.server.token_lifetime,
                    &d.server.token_lifetime,
                ),
                enable_cors: pick(
                    &self.server.enable_cors,
                    &other.server.enable_cors,
                    &d.server.enable_cors,
                ),
                users: pick(&self.server.users, &other.server.users, &d.server.users),
            },
            logging: LoggingConfig {
                level: pick(&self.logging.level, &other.logging.level, &d.logging.level),
                format: pick(&self.logging.format, &other.logging.format, &d.logging.format),
            },
        }
    }

    /// Apply environment variable overrides
    fn apply_env_overrides(&mut self) {
        // BASTION_OPS_FORKS
        if let Ok(forks) = std::env::var("BASTION_OPS_FORKS") {
            if let Ok(n) = forks.parse() {
                self.runner.forks = n;
            }
        }

        // BASTION_OPS_TIMEOUT, seconds or a humantime duration
        if let Ok(timeout) = std::env::var("BASTION_OPS_TIMEOUT") {
            let parsed = timeout
                .parse::<u64>()
                .map(Duration::from_secs)
                .ok()
                .or_else(|| humantime::parse_duration(&timeout).ok());
            if let Some(duration) = parsed {
                self.runner.timeout = duration;
            }
        }

        // BASTION_OPS_WORKERS
        if let Ok(workers) = std::env::var("BASTION_OPS_WORKERS") {
            if let Ok(n) = workers.parse() {
                self.pipeline.workers = n;
            }
        }

        // BASTION_OPS_STATE_FILE
        if let Ok(path) = std::env::var("BASTION_OPS_STATE_FILE") {
            self.storage.state_file = PathBuf::from(path);
        }

        // BASTION_OPS_LOG_ROOT
        if let Ok(path) = std::env::var("BASTION_OPS_LOG_ROOT") {
            self.storage.log_root = PathBuf::from(path);
        }

        // BASTION_OPS_ASSETS
        if let Ok(path) = std::env::var("BASTION_OPS_ASSETS") {
            self.storage.assets_file = Some(PathBuf::from(path));
        }

        // BASTION_OPS_BIND
        if let Ok(bind) = std::env::var("BASTION_OPS_BIND") {
            if let Ok(addr) = bind.parse() {
                self.server.bind = addr;
            }
        }

        // BASTION_OPS_JWT_SECRET
        if let Ok(secret) = std::env::var("BASTION_OPS_JWT_SECRET") {
            self.server.jwt_secret = secret;
        }

        // BASTION_OPS_LOG_FORMAT
        if let Ok(format) = std::env::var("BASTION_OPS_LOG_FORMAT") {
            self.logging.format = format;
        }
    }

    /// Run options with config defaults applied
    pub fn runner_options(&self) -> RunnerOptions {
        RunnerOptions {
            forks: self.runner.forks,
            timeout: self.runner.timeout,
            become_method: self.runner.become_method.clone(),
            become_user: self.runner.become_user.clone(),
            ssh_common_args: self.runner.ssh_common_args.clone(),
            gather_facts: self.runner.gather_facts,
            ..RunnerOptions::default()
        }
    }

    /// Load from a specific file
    pub fn from_file(path: impl AsRef<std::path::Path>) -> Result<Self> {
        let path_buf = path.as_ref().to_path_buf();
        Config::default().merge_from_file(&path_buf)
    }
}
