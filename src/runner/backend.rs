//! Remote execution backends.
//!
//! [`CommandBackend`] drives the system `ssh` client (through `sshpass` for
//! password logins) and runs local hosts with `sh -c`. A backend instance is
//! created per run so that [`ExecutionBackend::cleanup`] can drop the files
//! it created without disturbing concurrent runs.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::io::Write as _;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use tempfile::TempDir;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, trace};

use super::action::Action;
use super::options::RunnerOptions;
use super::result::{ActionResult, ExecOutcome};
use crate::error::{Error, Result};
use crate::inventory::{ConnectionType, Host};

/// Executes actions on hosts.
#[async_trait]
pub trait ExecutionBackend: Send + Sync {
    /// Run one action on one host.
    ///
    /// Per-host problems are reported through [`ExecOutcome`]; an `Err`
    /// means the backend itself is unusable and aborts the run.
    async fn execute(
        &self,
        host: &Host,
        action: &Action,
        options: &RunnerOptions,
    ) -> Result<ExecOutcome>;

    /// Release temp files and process handles held for the run.
    async fn cleanup(&self) -> Result<()> {
        Ok(())
    }
}

/// Creates a fresh backend for each run.
pub trait BackendFactory: Send + Sync {
    fn create(&self) -> Arc<dyn ExecutionBackend>;
}

impl<F> BackendFactory for F
where
    F: Fn() -> Arc<dyn ExecutionBackend> + Send + Sync,
{
    fn create(&self) -> Arc<dyn ExecutionBackend> {
        self()
    }
}

/// Exit code ssh uses for connection failures.
const SSH_CONNECT_FAILURE: i32 = 255;

/// sshpass exit codes for a wrong password and an unknown host key.
const SSHPASS_AUTH_FAILURES: [i32; 2] = [5, 6];

/// Backend built on the system ssh client and local shell.
pub struct CommandBackend {
    ssh_program: String,
    workdir: Mutex<Option<TempDir>>,
}

impl CommandBackend {
    pub fn new(ssh_program: impl Into<String>) -> Self {
        Self {
            ssh_program: ssh_program.into(),
            workdir: Mutex::new(None),
        }
    }

    /// Factory producing command backends with the given ssh binary.
    pub fn factory(ssh_program: impl Into<String>) -> Arc<dyn BackendFactory> {
        let ssh_program = ssh_program.into();
        Arc::new(move || -> Arc<dyn ExecutionBackend> {
            Arc::new(CommandBackend::new(ssh_program.clone()))
        })
    }

    /// Write a secret into the run's private work directory.
    fn secret_file(&self, secret: &str) -> Result<PathBuf> {
        let mut guard = self.workdir.lock();
        if guard.is_none() {
            *guard = Some(tempfile::Builder::new().prefix("bastion-ops-").tempdir()?);
        }
        let dir = guard
            .as_ref()
            .ok_or_else(|| Error::Internal("work directory missing".to_string()))?;
        let mut file = tempfile::Builder::new()
            .prefix("pass-")
            .tempfile_in(dir.path())?;
        writeln!(file, "{}", secret)?;
        let (_, path) = file.keep().map_err(|e| Error::Io(e.error))?;
        Ok(path)
    }

    /// Translate an action into a shell command plus optional stdin payload.
    async fn render(action: &Action) -> std::result::Result<(String, Vec<u8>), String> {
        match action.short_module() {
            "ping" => Ok(("echo pong".to_string(), Vec::new())),
            "shell" | "command" | "raw" => Ok((action.args.clone(), Vec::new())),
            "script" => {
                let mut words = shell_words::split(&action.args).map_err(|e| e.to_string())?;
                if words.is_empty() {
                    return Err("script path missing".to_string());
                }
                let path = words.remove(0);
                let body = tokio::fs::read(&path)
                    .await
                    .map_err(|e| format!("Could not read script {}: {}", path, e))?;
                let mut command = String::from("sh -s --");
                for word in &words {
                    command.push(' ');
                    command.push_str(&shell_words::quote(word));
                }
                Ok((command, body))
            }
            other => Err(format!(
                "Module '{}' is not supported by the command backend",
                other
            )),
        }
    }

    /// Wrap a command for privilege escalation.
    fn escalate(command: &str, host: &Host, options: &RunnerOptions) -> (String, Option<String>) {
        let Some(params) = host.become_params(&options.become_method, &options.become_user) else {
            return (command.to_string(), None);
        };
        let quoted = shell_words::quote(command);
        let user = shell_words::quote(&params.user);
        let wrapped = match params.method.as_str() {
            "su" => format!("su - {} -c {}", user, quoted),
            "doas" => format!("doas -u {} sh -c {}", user, quoted),
            _ if params.password.is_some() => {
                format!("sudo -S -p '' -u {} -- sh -c {}", user, quoted)
            }
            _ => format!("sudo -n -u {} -- sh -c {}", user, quoted),
        };
        (wrapped, params.password)
    }

    fn ssh_command(&self, host: &Host, command: &str, options: &RunnerOptions) -> Result<Command> {
        let mut cmd = match host.password() {
            Some(password) => {
                let file = self.secret_file(&password)?;
                let mut c = Command::new("sshpass");
                c.arg("-f").arg(file).arg(&self.ssh_program);
                c
            }
            None => {
                let mut c = Command::new(&self.ssh_program);
                c.arg("-o").arg("BatchMode=yes");
                c
            }
        };

        cmd.arg("-o")
            .arg("StrictHostKeyChecking=no")
            .arg("-o")
            .arg("UserKnownHostsFile=/dev/null")
            .arg("-o")
            .arg(format!("ConnectTimeout={}", options.timeout.as_secs().max(1)))
            .arg("-p")
            .arg(host.port.to_string());

        if let Some(key) = host.private_key_file() {
            cmd.arg("-i").arg(key);
        }

        for extra in [
            host.ssh_common_args(),
            options.ssh_common_args.clone(),
            options.ssh_extra_args.clone(),
        ]
        .into_iter()
        .flatten()
        {
            let words = shell_words::split(&extra)
                .map_err(|e| Error::Config(format!("invalid ssh arguments '{}': {}", extra, e)))?;
            cmd.args(words);
        }

        let target = match host.user() {
            Some(user) => format!("{}@{}", user, host.address),
            None => host.address.clone(),
        };
        cmd.arg(target).arg(command);
        Ok(cmd)
    }
}

impl Default for CommandBackend {
    fn default() -> Self {
        Self::new("ssh")
    }
}

#[async_trait]
impl ExecutionBackend for CommandBackend {
    async fn execute(
        &self,
        host: &Host,
        action: &Action,
        options: &RunnerOptions,
    ) -> Result<ExecOutcome> {
        let (command, body) = match Self::render(action).await {
            Ok(rendered) => rendered,
            Err(message) => {
                return Ok(ExecOutcome::Completed(ActionResult {
                    action: action.label(),
                    module: action.module.clone(),
                    rc: 1,
                    stdout: String::new(),
                    stderr: message,
                    failed: true,
                }))
            }
        };
        let (command, become_pass) = Self::escalate(&command, host, options);
        let connection = host.connection_type();
        debug!(host = %host.name, %connection, module = %action.module, "Executing action");

        let mut cmd = match connection {
            ConnectionType::Local => {
                let mut c = Command::new("sh");
                c.arg("-c").arg(&command);
                c
            }
            ConnectionType::Ssh => self.ssh_command(host, &command, options)?,
        };
        cmd.stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(e) if connection == ConnectionType::Ssh => {
                return Err(Error::backend(format!(
                    "Failed to spawn ssh client: {}",
                    e
                )))
            }
            Err(e) => return Err(Error::backend(format!("Failed to spawn shell: {}", e))),
        };

        if let Some(mut stdin) = child.stdin.take() {
            let mut payload = Vec::new();
            if let Some(password) = become_pass {
                payload.extend_from_slice(password.as_bytes());
                payload.push(b'\n');
            }
            payload.extend_from_slice(&body);
            if !payload.is_empty() {
                if let Err(e) = stdin.write_all(&payload).await {
                    trace!(host = %host.name, error = %e, "stdin closed early");
                }
            }
        }

        let output = child
            .wait_with_output()
            .await
            .map_err(|e| Error::backend(format!("Failed to wait for process: {}", e)))?;

        let rc = output.status.code().unwrap_or(-1);
        let stdout = String::from_utf8_lossy(&output.stdout).to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).to_string();
        trace!(host = %host.name, rc, stdout_len = stdout.len(), "Action completed");

        if connection == ConnectionType::Ssh {
            let auth_failed = host.password().is_some() && SSHPASS_AUTH_FAILURES.contains(&rc);
            if rc == SSH_CONNECT_FAILURE || auth_failed {
                let message = match stderr.trim() {
                    "" => format!("ssh exited with code {}", rc),
                    text => text.to_string(),
                };
                return Ok(ExecOutcome::Unreachable(message));
            }
        }

        Ok(ExecOutcome::Completed(ActionResult {
            action: action.label(),
            module: action.module.clone(),
            rc,
            stdout,
            stderr,
            failed: rc != 0,
        }))
    }

    async fn cleanup(&self) -> Result<()> {
        let workdir = self.workdir.lock().take();
        if let Some(dir) = workdir {
            debug!(path = %dir.path().display(), "Removing backend work directory");
            dir.close()?;
        }
        Ok(())
    }
}
