//! Ad-hoc runner: a list of actions executed as one play.

use futures::future::join_all;
use futures::FutureExt;
use indexmap::IndexMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::action::Action;
use super::backend::ExecutionBackend;
use super::options::RunnerOptions;
use super::result::{ActionResult, ExecOutcome, HostResult, RunResult};
use super::{banner, RunOutput};
use crate::error::{panic_message, Error, Result};
use crate::inventory::{Host, Inventory};

/// Runs actions against the hosts selected by a pattern.
pub struct AdHocRunner {
    inventory: Inventory,
    options: RunnerOptions,
    backend: Arc<dyn ExecutionBackend>,
}

impl AdHocRunner {
    pub fn new(
        inventory: Inventory,
        options: RunnerOptions,
        backend: Arc<dyn ExecutionBackend>,
    ) -> Self {
        Self {
            inventory,
            options,
            backend,
        }
    }

    pub fn inventory(&self) -> &Inventory {
        &self.inventory
    }

    pub fn options(&self) -> &RunnerOptions {
        &self.options
    }

    /// Resolve the pattern, failing when it cannot select anything.
    pub fn check_pattern(&self, pattern: &str) -> Result<Vec<Host>> {
        if pattern.trim().is_empty() {
            return Err(Error::InvalidPattern(pattern.to_string()));
        }
        if self.inventory.is_empty() {
            return Err(Error::EmptyInventory);
        }
        let hosts = self.inventory.get_hosts_for_pattern(pattern)?;
        if hosts.is_empty() {
            return Err(Error::no_hosts_matched(pattern));
        }
        Ok(hosts.into_iter().cloned().collect())
    }

    /// Run the actions as a single play.
    ///
    /// Backend cleanup runs whatever the outcome, validation failures
    /// included.
    pub async fn run(
        &self,
        actions: &[Action],
        pattern: &str,
        play_name: &str,
        output: &dyn RunOutput,
    ) -> Result<RunResult> {
        let result = AssertUnwindSafe(self.run_play(actions, pattern, play_name, output))
            .catch_unwind()
            .await
            .unwrap_or_else(|panic| {
                Err(Error::Internal(format!(
                    "worker panicked: {}",
                    panic_message(panic.as_ref())
                )))
            });
        self.cleanup().await;
        result
    }

    async fn run_play(
        &self,
        actions: &[Action],
        pattern: &str,
        play_name: &str,
        output: &dyn RunOutput,
    ) -> Result<RunResult> {
        let hosts = self.check_pattern(pattern)?;
        for action in actions {
            action.check_args()?;
        }
        self.options.validate()?;

        info!(
            play = %play_name,
            pattern = %pattern,
            hosts = hosts.len(),
            actions = actions.len(),
            "Starting ad-hoc play"
        );
        output.line(&format!(
            "Get matched hosts: {}",
            hosts.iter().map(|h| h.name.as_str()).collect::<Vec<_>>().join(", ")
        ));
        output.line(&banner("PLAY", play_name));

        execute_play(self.backend.as_ref(), &hosts, actions, &self.options, output).await
    }

    pub(crate) async fn cleanup(&self) {
        if let Err(err) = self.backend.cleanup().await {
            warn!(error = %err, "Backend cleanup failed");
        }
    }
}

/// Runs a single shell-like command.
pub struct CommandRunner {
    inner: AdHocRunner,
}

impl CommandRunner {
    /// Modules accepted by [`CommandRunner::execute`].
    pub const MODULES: &'static [&'static str] = &["shell", "raw", "command", "script"];

    pub fn new(
        inventory: Inventory,
        options: RunnerOptions,
        backend: Arc<dyn ExecutionBackend>,
    ) -> Self {
        Self {
            inner: AdHocRunner::new(inventory, options, backend),
        }
    }

    /// Run `cmd` on the hosts matching `pattern` with `module` (default `shell`).
    pub async fn execute(
        &self,
        cmd: &str,
        pattern: &str,
        module: Option<&str>,
        output: &dyn RunOutput,
    ) -> Result<RunResult> {
        let module = module.unwrap_or("shell");
        if !Self::MODULES.contains(&module) {
            self.inner.cleanup().await;
            return Err(Error::ModuleNotAllowed {
                module: module.to_string(),
                allowed: Self::MODULES,
            });
        }

        let targets = self
            .inner
            .inventory()
            .get_hosts_for_pattern(pattern)
            .map(|hosts| {
                hosts
                    .iter()
                    .map(|h| h.name.as_str())
                    .collect::<Vec<_>>()
                    .join(", ")
            })
            .unwrap_or_default();
        let play_name = format!("Run command {} on {}", cmd, targets);

        self.inner
            .run(&[Action::new(module, cmd)], pattern, &play_name, output)
            .await
    }
}

/// Execute actions in order across hosts, `forks` hosts at a time.
///
/// A host that becomes unreachable or fails an action runs nothing further.
/// A backend error aborts the play.
pub(crate) async fn execute_play(
    backend: &dyn ExecutionBackend,
    hosts: &[Host],
    actions: &[Action],
    options: &RunnerOptions,
    output: &dyn RunOutput,
) -> Result<RunResult> {
    let mut raw: IndexMap<String, HostResult> = hosts
        .iter()
        .map(|h| (h.name.clone(), HostResult::default()))
        .collect();
    let forks = options.forks.max(1);

    for action in actions {
        let active: Vec<&Host> = hosts
            .iter()
            .filter(|h| raw.get(&h.name).is_some_and(|r| !r.is_stopped()))
            .collect();

        if active.is_empty() {
            warn!("All hosts have failed, stopping execution");
            output.line("NO MORE HOSTS LEFT");
            break;
        }

        output.line(&banner("TASK", &action.label()));
        debug!(action = %action.label(), hosts = active.len(), "Running action");

        let mut outcomes: Vec<(String, Result<ExecOutcome>)> = Vec::with_capacity(active.len());
        for batch in active.chunks(forks) {
            let results = join_all(
                batch
                    .iter()
                    .map(|host| backend.execute(*host, action, options)),
            )
            .await;
            outcomes.extend(batch.iter().map(|h| h.name.clone()).zip(results));
        }

        for (name, outcome) in outcomes {
            let outcome = outcome.map_err(|err| match err {
                Error::Backend(_) => err,
                other => Error::backend(other),
            })?;
            let entry = raw.entry(name.clone()).or_default();
            match outcome {
                ExecOutcome::Completed(result) => {
                    write_result(output, &name, &result);
                    entry.actions.push(result);
                }
                ExecOutcome::Unreachable(message) => {
                    output.line(&format!("fatal: [{}]: UNREACHABLE! => {}", name, message));
                    entry.unreachable = Some(message);
                }
            }
        }
    }

    output.line(&banner("PLAY RECAP", ""));
    for (name, result) in &raw {
        let ok = result.actions.iter().filter(|a| !a.failed).count();
        let failed = result.actions.len() - ok;
        output.line(&format!(
            "{:<24} : ok={:<4} failed={:<4} unreachable={}",
            name,
            ok,
            failed,
            u8::from(result.unreachable.is_some())
        ));
    }

    Ok(RunResult::from_raw(raw))
}

fn write_result(output: &dyn RunOutput, host: &str, result: &ActionResult) {
    if result.failed {
        output.line(&format!("failed: [{}] => rc={}", host, result.rc));
    } else {
        output.line(&format!("ok: [{}]", host));
    }
    for line in result.message().lines() {
        output.line(&format!("    {}", line));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runner::{BufferOutput, NullOutput};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    #[derive(Default)]
    struct MockBackend {
        calls: AtomicUsize,
        cleaned: AtomicBool,
        fail_backend: bool,
        panic: bool,
        in_flight: AtomicUsize,
        peak: AtomicUsize,
    }

    #[async_trait]
    impl ExecutionBackend for MockBackend {
        async fn execute(
            &self,
            host: &Host,
            action: &Action,
            _options: &RunnerOptions,
        ) -> Result<ExecOutcome> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let running = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(running, Ordering::SeqCst);
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            if self.panic {
                panic!("lost connection pool");
            }
            if self.fail_backend {
                return Err(Error::Internal("process table full".into()));
            }
            if host.name.starts_with("down") {
                return Ok(ExecOutcome::Unreachable("Connection refused".into()));
            }
            let failed = action.args == "false";
            Ok(ExecOutcome::Completed(ActionResult {
                action: action.label(),
                module: action.module.clone(),
                rc: i32::from(failed),
                stdout: format!("{} ran {}", host.name, action.args),
                stderr: String::new(),
                failed,
            }))
        }

        async fn cleanup(&self) -> Result<()> {
            self.cleaned.store(true, Ordering::SeqCst);
            Ok(())
        }
    }

    fn inventory(names: &[&str]) -> Inventory {
        let mut inv = Inventory::new();
        for name in names {
            let mut host = Host::new(*name);
            host.add_to_group("Web");
            inv.add_host(host);
        }
        inv
    }

    #[tokio::test]
    async fn test_zero_match_fails_fast_and_cleans_up() {
        let backend = Arc::new(MockBackend::default());
        let runner = AdHocRunner::new(
            inventory(&["web1"]),
            RunnerOptions::default(),
            backend.clone(),
        );

        let err = runner
            .run(&[Action::new("ping", "")], "db*", "uptime", &NullOutput)
            .await
            .unwrap_err();

        assert!(matches!(err, Error::NoHostsMatched { .. }));
        assert_eq!(backend.calls.load(Ordering::SeqCst), 0);
        assert!(backend.cleaned.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_empty_inventory_and_blank_pattern() {
        let backend = Arc::new(MockBackend::default());
        let runner = AdHocRunner::new(Inventory::new(), RunnerOptions::default(), backend);
        assert!(matches!(runner.check_pattern("all"), Err(Error::EmptyInventory)));
        assert!(matches!(runner.check_pattern(" "), Err(Error::InvalidPattern(_))));
    }

    #[tokio::test]
    async fn test_missing_args_fail_before_io() {
        let backend = Arc::new(MockBackend::default());
        let runner = AdHocRunner::new(
            inventory(&["web1"]),
            RunnerOptions::default(),
            backend.clone(),
        );
        let err = runner
            .run(
                &[Action::new("ping", ""), Action::new("shell", "")],
                "all",
                "bad",
                &NullOutput,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, Error::MissingModuleArgs { .. }));
        assert_eq!(backend.calls.load(Ordering::SeqCst), 0);
        assert!(backend.cleaned.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_partition_and_stop_on_failure() {
        let backend = Arc::new(MockBackend::default());
        let runner = AdHocRunner::new(
            inventory(&["web1", "down1"]),
            RunnerOptions::default(),
            backend.clone(),
        );
        let output = BufferOutput::new();
        let result = runner
            .run(
                &[Action::new("shell", "false"), Action::new("shell", "uptime")],
                "Web",
                "two steps",
                &output,
            )
            .await
            .unwrap();

        assert_eq!(result.summary.dark["down1"], "Connection refused");
        assert_eq!(result.summary.contacted["web1"].len(), 1);
        assert!(result.raw["web1"].has_failure());
        assert!(!result.is_success());
        // web1 failed and down1 went dark on the first action
        assert_eq!(backend.calls.load(Ordering::SeqCst), 2);

        let lines = output.lines();
        assert!(lines.iter().any(|l| l.starts_with("PLAY [two steps]")));
        assert!(lines.iter().any(|l| l.contains("UNREACHABLE!")));
        assert!(lines.iter().any(|l| l == "NO MORE HOSTS LEFT"));
    }

    #[tokio::test]
    async fn test_backend_error_is_wrapped() {
        let backend = Arc::new(MockBackend {
            fail_backend: true,
            ..Default::default()
        });
        let runner = AdHocRunner::new(
            inventory(&["web1"]),
            RunnerOptions::default(),
            backend.clone(),
        );
        let err = runner
            .run(&[Action::new("ping", "")], "all", "x", &NullOutput)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Backend(msg) if msg.contains("process table full")));
        assert!(backend.cleaned.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_command_runner_restricts_modules() {
        let backend = Arc::new(MockBackend::default());
        let runner = CommandRunner::new(
            inventory(&["web1"]),
            RunnerOptions::default(),
            backend.clone(),
        );

        let err = runner
            .execute("ls", "all", Some("copy"), &NullOutput)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::ModuleNotAllowed { .. }));
        assert!(backend.cleaned.load(Ordering::SeqCst));

        let result = runner.execute("ls", "all", None, &NullOutput).await.unwrap();
        assert_eq!(result.summary.contacted["web1"][0].module, "shell");
    }

    #[tokio::test]
    async fn test_forks_bounds_concurrent_hosts() {
        let backend = Arc::new(MockBackend::default());
        let options = RunnerOptions {
            forks: 2,
            ..RunnerOptions::default()
        };
        let runner = AdHocRunner::new(
            inventory(&["web1", "web2", "web3", "web4", "web5"]),
            options,
            backend.clone(),
        );

        let result = runner
            .run(&[Action::new("shell", "uptime")], "Web", "fan out", &NullOutput)
            .await
            .unwrap();

        assert_eq!(result.summary.contacted.len(), 5);
        assert_eq!(backend.calls.load(Ordering::SeqCst), 5);
        assert_eq!(backend.peak.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_play_runs_on_spawned_task() {
        let backend = Arc::new(MockBackend::default());
        let runner = Arc::new(AdHocRunner::new(
            inventory(&["web1", "web2"]),
            RunnerOptions::default(),
            backend.clone(),
        ));

        let handle = tokio::spawn(async move {
            runner
                .run(&[Action::new("shell", "uptime")], "all", "spawned", &NullOutput)
                .await
        });
        let result = handle.await.unwrap().unwrap();
        assert!(result.is_success());
    }

    #[tokio::test]
    async fn test_panic_becomes_error_and_cleans_up() {
        let backend = Arc::new(MockBackend {
            panic: true,
            ..Default::default()
        });
        let runner = AdHocRunner::new(
            inventory(&["web1"]),
            RunnerOptions::default(),
            backend.clone(),
        );
        let err = runner
            .run(&[Action::new("ping", "")], "all", "x", &NullOutput)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("worker panicked: lost connection pool"));
        assert!(backend.cleaned.load(Ordering::SeqCst));
    }
}
