//! Shared test utilities and fixtures for the bastion-ops test suite.
//!
//! This module provides:
//! - A scriptable [`MockBackend`] implementing `ExecutionBackend`
//! - A small asset directory fixture with nodes, credentials and a domain
//! - An engine harness backed by a temporary state file and log root
//!
//! # Usage
//!
//! ```rust,ignore
//! mod common;
//! use common::*;
//! ```

#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tempfile::TempDir;
use uuid::Uuid;

use bastion_ops::assets::{Asset, Credential, Domain, Gateway, MemoryDirectory, Node};
use bastion_ops::engine::{Engine, EngineSettings};
use bastion_ops::inventory::Host;
use bastion_ops::runner::{
    Action, ActionResult, BackendFactory, ExecOutcome, ExecutionBackend, RunnerOptions,
};
use bastion_ops::tasks::{TaskDeclaration, TaskStore};
use bastion_ops::Result;

// ============================================================================
// Mock Backend
// ============================================================================

/// Backend whose behaviour is scripted per host name.
#[derive(Default)]
pub struct MockBackend {
    /// Hosts reported as unreachable
    pub unreachable: HashSet<String>,
    /// Hosts whose actions exit non-zero
    pub failing: HashSet<String>,
    /// Delay before each action completes
    pub delay: Option<Duration>,
    /// `(host, action label)` in execution order
    pub calls: Mutex<Vec<(String, String)>>,
    pub cleanups: AtomicUsize,
}

impl MockBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_unreachable(mut self, host: &str) -> Self {
        self.unreachable.insert(host.to_string());
        self
    }

    pub fn with_failing(mut self, host: &str) -> Self {
        self.failing.insert(host.to_string());
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }

    pub fn hosts_called(&self) -> Vec<String> {
        self.calls.lock().iter().map(|(h, _)| h.clone()).collect()
    }
}

#[async_trait]
impl ExecutionBackend for MockBackend {
    async fn execute(
        &self,
        host: &Host,
        action: &Action,
        _options: &RunnerOptions,
    ) -> Result<ExecOutcome> {
        self.calls
            .lock()
            .push((host.name.clone(), action.label()));
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.unreachable.contains(&host.name) {
            return Ok(ExecOutcome::Unreachable(
                "ssh: connect to host port 22: Connection refused".to_string(),
            ));
        }
        let failed = self.failing.contains(&host.name);
        Ok(ExecOutcome::Completed(ActionResult {
            action: action.label(),
            module: action.module.clone(),
            rc: i32::from(failed),
            stdout: format!("{}: {}", host.name, action.args),
            stderr: if failed { "exit 1".to_string() } else { String::new() },
            failed,
        }))
    }

    async fn cleanup(&self) -> Result<()> {
        self.cleanups.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Factory handing out one shared mock so tests can inspect calls.
pub fn shared_factory(backend: Arc<MockBackend>) -> Arc<dyn BackendFactory> {
    Arc::new(move || -> Arc<dyn ExecutionBackend> { backend.clone() })
}

// ============================================================================
// Asset Fixture
// ============================================================================

/// Ids of the fixture records.
pub struct Fixture {
    pub directory: Arc<MemoryDirectory>,
    pub web_node: Uuid,
    pub db_node: Uuid,
    pub web1: Uuid,
    pub web2: Uuid,
    pub web3: Uuid,
    pub db1: Uuid,
}

/// `Default/Web` holds web1..web3 (web1 with admin `admin-a`, web2 with
/// `admin-b`); `Default/DB` holds db1, which sits in a gateway domain.
pub fn fixture() -> Fixture {
    let mut directory = MemoryDirectory::new();

    let root = Node {
        id: Uuid::new_v4(),
        value: "Default".to_string(),
        parent: None,
    };
    let web = Node {
        id: Uuid::new_v4(),
        value: "Web".to_string(),
        parent: Some(root.id),
    };
    let db = Node {
        id: Uuid::new_v4(),
        value: "DB".to_string(),
        parent: Some(root.id),
    };

    let domain = Domain {
        id: Uuid::new_v4(),
        name: "dmz".to_string(),
        gateways: vec![Gateway {
            ip: "192.168.10.1".to_string(),
            port: 2222,
            username: "jump".to_string(),
            password: Some("jump-pass".to_string()),
            private_key_file: None,
            is_active: true,
        }],
    };

    let mut web1 = Asset::new("web1", "10.0.0.1");
    web1.nodes.push(web.id);
    web1.admin_user = Some("admin-a".to_string());
    let mut web2 = Asset::new("web2", "10.0.0.2");
    web2.nodes.push(web.id);
    web2.admin_user = Some("admin-b".to_string());
    let mut web3 = Asset::new("web3", "10.0.0.3");
    web3.nodes.push(web.id);
    web3.admin_user = Some("admin-a".to_string());
    let mut db1 = Asset::new("db1", "10.0.1.1");
    db1.nodes.push(db.id);
    db1.domain = Some(domain.id);
    db1.admin_user = Some("admin-b".to_string());

    directory.add_admin_user(Credential::new("admin-a", "alice").with_password("alice-pass"));
    directory.add_admin_user(Credential::new("admin-b", "bob").with_private_key("/keys/bob"));
    directory.add_system_user(Credential::new("deploy", "deploy").with_password("deploy-pass"));
    directory.add_domain(domain);

    let ids = (web.id, db.id, web1.id, web2.id, web3.id, db1.id);

    directory.add_node(root);
    directory.add_node(web);
    directory.add_node(db);
    directory.add_asset(web1);
    directory.add_asset(web2);
    directory.add_asset(web3);
    directory.add_asset(db1);

    Fixture {
        directory: Arc::new(directory),
        web_node: ids.0,
        db_node: ids.1,
        web1: ids.2,
        web2: ids.3,
        web3: ids.4,
        db1: ids.5,
    }
}

/// Declaration running `uptime` on the Web node.
pub fn web_uptime(fixture: &Fixture) -> TaskDeclaration {
    TaskDeclaration {
        name: "web-uptime".to_string(),
        nodes: vec![fixture.web_node],
        actions: vec![Action::new("shell", "uptime")],
        run_as_admin: true,
        ..TaskDeclaration::default()
    }
}

// ============================================================================
// Engine Harness
// ============================================================================

/// A started engine with its temporary storage.
pub struct Harness {
    pub engine: Arc<Engine>,
    pub backend: Arc<MockBackend>,
    pub fixture: Fixture,
    pub dir: TempDir,
}

impl Harness {
    pub fn store(&self) -> &Arc<TaskStore> {
        self.engine.store()
    }
}

pub fn settings(dir: &TempDir) -> EngineSettings {
    EngineSettings {
        options: RunnerOptions::default(),
        log_root: dir.path().join("logs"),
        workers: 2,
        marker_ttl: Duration::from_secs(10),
        mark_ttl: Duration::from_secs(5),
        beat_tick: Duration::from_millis(50),
        startup_tasks: Vec::new(),
    }
}

/// Start an engine over a fresh state file. Needs a tokio runtime.
pub fn harness(backend: MockBackend) -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(TaskStore::open(dir.path().join("state.json")).unwrap());
    let fixture = fixture();
    let backend = Arc::new(backend);
    let engine = Engine::start(
        store,
        fixture.directory.clone(),
        shared_factory(backend.clone()),
        settings(&dir),
    )
    .unwrap();

    Harness {
        engine: Arc::new(engine),
        backend,
        fixture,
        dir,
    }
}
