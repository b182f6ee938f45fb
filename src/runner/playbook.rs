//! Playbook runner: executes a pre-authored YAML playbook.
//!
//! Each play's `hosts` pattern is resolved against the inventory and its
//! tasks run through the same play executor ad-hoc runs use. Results from
//! every play are accumulated into one [`RunResult`].

use serde::Deserialize;
use serde_yaml::{Mapping, Value};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

use super::action::Action;
use super::adhoc::execute_play;
use super::backend::ExecutionBackend;
use super::options::RunnerOptions;
use super::result::RunResult;
use super::{banner, RunOutput};
use crate::error::{Error, Result};
use crate::inventory::{Host, Inventory};

/// Task keywords that are not module names.
const TASK_KEYWORDS: &[&str] = &[
    "name",
    "become",
    "become_user",
    "become_method",
    "when",
    "register",
    "ignore_errors",
    "tags",
    "vars",
    "changed_when",
    "failed_when",
    "environment",
    "args",
];

/// A play as written in the playbook file.
#[derive(Debug, Clone, Deserialize)]
struct RawPlay {
    #[serde(default)]
    name: Option<String>,
    hosts: String,
    #[serde(default)]
    tasks: Vec<Mapping>,
}

/// A parsed play.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Play {
    pub name: String,
    pub hosts: String,
    pub actions: Vec<Action>,
}

/// Parse a playbook document into plays.
pub fn parse_playbook(content: &str, path: &Path) -> Result<Vec<Play>> {
    let parse_err = |message: String| Error::PlaybookParse {
        path: path.to_path_buf(),
        message,
    };

    let raw: Vec<RawPlay> = serde_yaml::from_str(content).map_err(|e| parse_err(e.to_string()))?;

    raw.into_iter()
        .enumerate()
        .map(|(index, play)| {
            let actions = play
                .tasks
                .iter()
                .map(task_to_action)
                .collect::<std::result::Result<Vec<_>, String>>()
                .map_err(&parse_err)?;
            Ok(Play {
                name: play.name.unwrap_or_else(|| format!("play {}", index + 1)),
                hosts: play.hosts,
                actions,
            })
        })
        .collect()
}

fn task_to_action(task: &Mapping) -> std::result::Result<Action, String> {
    let name = task.get("name").and_then(Value::as_str).map(String::from);

    let mut modules = task.iter().filter_map(|(key, value)| {
        let key = key.as_str()?;
        (!TASK_KEYWORDS.contains(&key)).then_some((key, value))
    });

    let (module, value) = modules
        .next()
        .ok_or_else(|| format!("task {:?} has no module", name))?;
    if let Some((extra, _)) = modules.next() {
        return Err(format!(
            "task {:?} names more than one module ({}, {})",
            name, module, extra
        ));
    }

    let args = match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Mapping(map) => match map.get("cmd").and_then(Value::as_str) {
            Some(cmd) => cmd.to_string(),
            None => map
                .iter()
                .filter_map(|(k, v)| Some(format!("{}={}", k.as_str()?, scalar(v))))
                .collect::<Vec<_>>()
                .join(" "),
        },
        other => scalar(other),
    };

    let mut action = Action::new(module, args);
    action.name = name;
    Ok(action)
}

fn scalar(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::Null => String::new(),
        other => serde_yaml::to_string(other)
            .map(|s| s.trim().to_string())
            .unwrap_or_default(),
    }
}

/// Runs a playbook file against an inventory.
pub struct PlaybookRunner {
    inventory: Inventory,
    options: RunnerOptions,
    backend: Arc<dyn ExecutionBackend>,
    playbook_path: PathBuf,
}

impl PlaybookRunner {
    pub fn new(
        playbook_path: impl Into<PathBuf>,
        inventory: Inventory,
        options: RunnerOptions,
        backend: Arc<dyn ExecutionBackend>,
    ) -> Self {
        Self {
            inventory,
            options,
            backend,
            playbook_path: playbook_path.into(),
        }
    }

    /// Run every play. Backend cleanup always runs.
    pub async fn run(&self, output: &dyn RunOutput) -> Result<RunResult> {
        let result = self.run_plays(output).await;
        if let Err(err) = self.backend.cleanup().await {
            warn!(error = %err, "Backend cleanup failed");
        }
        result
    }

    async fn run_plays(&self, output: &dyn RunOutput) -> Result<RunResult> {
        if !self.playbook_path.is_file() {
            return Err(Error::PlaybookNotFound(self.playbook_path.clone()));
        }
        if self.inventory.is_empty() {
            return Err(Error::EmptyInventory);
        }
        self.options.validate()?;

        let content = tokio::fs::read_to_string(&self.playbook_path).await?;
        let plays = parse_playbook(&content, &self.playbook_path)?;
        for action in plays.iter().flat_map(|p| &p.actions) {
            action.check_args()?;
        }

        info!(
            playbook = %self.playbook_path.display(),
            plays = plays.len(),
            "Starting playbook"
        );

        let mut total = RunResult::default();
        for play in &plays {
            output.line(&banner("PLAY", &play.name));
            let hosts: Vec<Host> = self
                .inventory
                .get_hosts_for_pattern(&play.hosts)?
                .into_iter()
                .cloned()
                .collect();
            if hosts.is_empty() {
                output.line("skipping: no hosts matched");
                continue;
            }
            let result = execute_play(
                self.backend.as_ref(),
                &hosts,
                &play.actions,
                &self.options,
                output,
            )
            .await?;
            total.merge(result);
        }

        Ok(total)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runner::{ActionResult, ExecOutcome, NullOutput};
    use async_trait::async_trait;
    use pretty_assertions::assert_eq;
    use std::sync::atomic::{AtomicBool, Ordering};

    #[derive(Default)]
    struct EchoBackend {
        cleaned: AtomicBool,
    }

    #[async_trait]
    impl ExecutionBackend for EchoBackend {
        async fn execute(
            &self,
            _host: &Host,
            action: &Action,
            _options: &RunnerOptions,
        ) -> Result<ExecOutcome> {
            Ok(ExecOutcome::Completed(ActionResult {
                action: action.label(),
                module: action.module.clone(),
                rc: 0,
                stdout: action.args.clone(),
                stderr: String::new(),
                failed: false,
            }))
        }

        async fn cleanup(&self) -> Result<()> {
            self.cleaned.store(true, Ordering::SeqCst);
            Ok(())
        }
    }

    const PLAYBOOK: &str = r#"
- name: web tier
  hosts: Web
  tasks:
    - name: uptime
      shell: uptime
    - ping:
- hosts: db*
  tasks:
    - ansible.builtin.command:
        cmd: whoami
      become: true
"#;

    fn inventory() -> Inventory {
        let mut inv = Inventory::new();
        let mut web = Host::new("web1");
        web.add_to_group("Web");
        inv.add_host(web);
        inv.add_host(Host::new("db1"));
        inv
    }

    #[test]
    fn test_parse_playbook() {
        let plays = parse_playbook(PLAYBOOK, Path::new("site.yml")).unwrap();
        assert_eq!(plays.len(), 2);
        assert_eq!(
            plays[0].actions,
            vec![
                Action::new("shell", "uptime").named("uptime"),
                Action::new("ping", ""),
            ]
        );
        assert_eq!(plays[1].name, "play 2");
        assert_eq!(plays[1].actions[0].module, "ansible.builtin.command");
        assert_eq!(plays[1].actions[0].args, "whoami");
    }

    #[test]
    fn test_parse_rejects_two_modules() {
        let doc = "- hosts: all\n  tasks:\n    - shell: ls\n      command: ls\n";
        assert!(matches!(
            parse_playbook(doc, Path::new("x.yml")),
            Err(Error::PlaybookParse { .. })
        ));
    }

    #[tokio::test]
    async fn test_missing_playbook_fails_and_cleans_up() {
        let backend = Arc::new(EchoBackend::default());
        let runner = PlaybookRunner::new(
            "/nonexistent/site.yml",
            inventory(),
            RunnerOptions::default(),
            backend.clone(),
        );
        let err = runner.run(&NullOutput).await.unwrap_err();
        assert!(matches!(err, Error::PlaybookNotFound(_)));
        assert!(backend.cleaned.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_results_accumulate_across_plays() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("site.yml");
        std::fs::write(&path, PLAYBOOK).unwrap();

        let runner = PlaybookRunner::new(
            &path,
            inventory(),
            RunnerOptions::default(),
            Arc::new(EchoBackend::default()),
        );
        let result = runner.run(&NullOutput).await.unwrap();

        assert_eq!(result.raw["web1"].actions.len(), 2);
        assert_eq!(result.raw["db1"].actions.len(), 1);
        assert!(result.is_success());
    }

    #[tokio::test]
    async fn test_empty_inventory_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("site.yml");
        std::fs::write(&path, PLAYBOOK).unwrap();

        let runner = PlaybookRunner::new(
            &path,
            Inventory::new(),
            RunnerOptions::default(),
            Arc::new(EchoBackend::default()),
        );
        assert!(matches!(
            runner.run(&NullOutput).await,
            Err(Error::EmptyInventory)
        ));
    }
}
