//! Command-line tests running the built binary.

use assert_cmd::Command;
use predicates::prelude::*;
use serde_json::Value;
use std::path::Path;
use tempfile::TempDir;

const ASSETS: &str = r#"
nodes:
  - id: 6f1c3f0e-8d7a-4f43-9a43-0d1e1c0c0a01
    value: Web
assets:
  - id: 6f1c3f0e-8d7a-4f43-9a43-0d1e1c0c0a02
    hostname: web1
    ip: 10.0.0.5
    admin_user: ops-admin
    nodes: [6f1c3f0e-8d7a-4f43-9a43-0d1e1c0c0a01]
  - id: 6f1c3f0e-8d7a-4f43-9a43-0d1e1c0c0a03
    hostname: web2
    ip: 10.0.0.6
    admin_user: ops-admin
    nodes: [6f1c3f0e-8d7a-4f43-9a43-0d1e1c0c0a01]
admin_users:
  - name: ops-admin
    username: ops
    password: hunter2
"#;

const TASKS: &str = r#"
tasks:
  - name: web-uptime
    groups: [Web]
    run_as_admin: true
    actions:
      - module: shell
        args: uptime
  - name: nightly
    hosts: [web1]
    interval: 1d
    is_periodic: true
    actions:
      - module: ping
"#;

/// Temporary config, asset directory and declaration file.
struct Workspace {
    dir: TempDir,
}

impl Workspace {
    fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("assets.yml"), ASSETS).unwrap();
        std::fs::write(dir.path().join("tasks.yml"), TASKS).unwrap();
        std::fs::write(dir.path().join("config.toml"), "").unwrap();
        Self { dir }
    }

    fn path(&self, name: &str) -> std::path::PathBuf {
        self.dir.path().join(name)
    }

    fn cmd(&self) -> Command {
        let mut cmd = Command::cargo_bin("bastion-ops").unwrap();
        cmd.env("BASTION_OPS_CONFIG", self.path("config.toml"))
            .env("BASTION_OPS_ASSETS", self.path("assets.yml"))
            .env("BASTION_OPS_STATE_FILE", self.path("state.json"))
            .env("BASTION_OPS_LOG_ROOT", self.path("logs"))
            .env("NO_COLOR", "1")
            .env_remove("RUST_LOG");
        cmd
    }

    fn json(&self, args: &[&str]) -> Value {
        let output = self.cmd().arg("--json").args(args).output().unwrap();
        assert!(
            output.status.success(),
            "{}",
            String::from_utf8_lossy(&output.stderr)
        );
        serde_json::from_slice(&output.stdout).unwrap()
    }
}

fn declare(ws: &Workspace, file: &Path) -> Value {
    ws.json(&["declare", file.to_str().unwrap()])
}

#[test]
fn test_help_lists_commands() {
    Command::cargo_bin("bastion-ops")
        .unwrap()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("declare"))
        .stdout(predicate::str::contains("tail"))
        .stdout(predicate::str::contains("serve"));
}

#[test]
fn test_version() {
    Command::cargo_bin("bastion-ops")
        .unwrap()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains(env!("CARGO_PKG_VERSION")));
}

#[test]
fn test_declare_is_idempotent() {
    let ws = Workspace::new();

    let first = declare(&ws, &ws.path("tasks.yml"));
    assert_eq!(first[0]["task"], "web-uptime");
    assert_eq!(first[0]["version"], 1);
    assert_eq!(first[0]["created"], true);
    assert_eq!(first[1]["task"], "nightly");

    let second = declare(&ws, &ws.path("tasks.yml"));
    assert_eq!(second[0]["created"], false);
    assert_eq!(second[1]["created"], false);

    let tasks = ws.json(&["tasks"]);
    assert_eq!(tasks.as_array().unwrap().len(), 2);
}

#[test]
fn test_declare_unknown_host_fails() {
    let ws = Workspace::new();
    let file = ws.path("bad.yml");
    std::fs::write(
        &file,
        "tasks:\n  - name: t\n    hosts: [nope]\n    actions: [{module: ping}]\n",
    )
    .unwrap();

    ws.cmd()
        .args(["declare", file.to_str().unwrap()])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Unknown asset 'nope'"));
}

#[test]
fn test_conflicting_trigger_is_a_configuration_error() {
    let ws = Workspace::new();
    let file = ws.path("conflict.yml");
    std::fs::write(
        &file,
        "tasks:\n  - name: t\n    hosts: [web1]\n    interval: 5m\n    crontab: '*/5 * * * *'\n    is_periodic: true\n    actions: [{module: ping}]\n",
    )
    .unwrap();

    ws.cmd()
        .args(["declare", file.to_str().unwrap()])
        .assert()
        .code(2);
    assert_eq!(ws.json(&["tasks"]).as_array().unwrap().len(), 0);
}

#[test]
fn test_inventory_from_declaration_file_masks_passwords() {
    let ws = Workspace::new();
    let output = ws
        .cmd()
        .args(["inventory", ws.path("tasks.yml").to_str().unwrap()])
        .output()
        .unwrap();
    assert!(output.status.success());

    let inventory: Value = serde_json::from_slice(&output.stdout).unwrap();
    let vars = &inventory["_meta"]["hostvars"]["web1"];
    assert_eq!(vars["ansible_user"], "ops");
    assert_eq!(vars["ansible_password"], "********");
    assert!(inventory["_meta"]["hostvars"]["web2"].is_object());
}

#[test]
fn test_delete_then_history_of_unknown_task() {
    let ws = Workspace::new();
    declare(&ws, &ws.path("tasks.yml"));

    let deleted = ws.json(&["delete", "nightly"]);
    assert_eq!(deleted["is_deleted"], true);
    assert_eq!(ws.json(&["tasks"]).as_array().unwrap().len(), 1);
    assert_eq!(ws.json(&["tasks", "--all"]).as_array().unwrap().len(), 2);

    ws.cmd()
        .args(["history", "missing"])
        .assert()
        .code(3)
        .stderr(predicate::str::contains("missing"));
}
