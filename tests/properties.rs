//! End-to-end checks of the engine's core guarantees:
//! declaration idempotency and versioning, inventory construction,
//! log tailing order and fail-fast validation.

mod common;

use std::io::Write;
use std::sync::Arc;

use pretty_assertions::assert_eq;
use serde_json::json;

use bastion_ops::assets::AssetDirectory;
use bastion_ops::cache::TtlCache;
use bastion_ops::history::{LogTail, TailChunk};
use bastion_ops::pipeline::{RunOutcome, TaskExecutor};
use bastion_ops::runner::{Action, AdHocRunner, NullOutput, RunnerOptions};
use bastion_ops::tasks::{TaskDeclaration, TaskStore};
use bastion_ops::Error;

use common::*;

// ============================================================================
// Declaration and versioning
// ============================================================================

#[test]
fn test_identical_declaration_creates_one_content() {
    let fixture = fixture();
    let store = TaskStore::in_memory();
    let declaration = web_uptime(&fixture);

    let (first, created) = declaration.ensure(&store).unwrap();
    assert!(created);
    let (second, created) = declaration.ensure(&store).unwrap();
    assert!(!created);

    assert_eq!(first.id, second.id);
    assert_eq!(store.contents(first.id).len(), 1);
}

#[test]
fn test_changes_create_new_versions() {
    let fixture = fixture();
    let store = TaskStore::in_memory();
    let mut declaration = web_uptime(&fixture);
    let (task, _) = declaration.ensure(&store).unwrap();
    let v1 = store.latest_content(task.id).unwrap();

    declaration.actions.push(Action::new("shell", "df -h"));
    assert!(declaration.ensure(&store).unwrap().1);
    let v2 = store.latest_content(task.id).unwrap();

    declaration.pattern = "web1".to_string();
    assert!(declaration.ensure(&store).unwrap().1);
    let v3 = store.latest_content(task.id).unwrap();

    declaration.assets.push(fixture.db1);
    assert!(declaration.ensure(&store).unwrap().1);
    let v4 = store.latest_content(task.id).unwrap();

    assert_eq!(
        vec![v1.version, v2.version, v3.version, v4.version],
        vec![1, 2, 3, 4]
    );
    assert_eq!(v4.assets, vec![fixture.db1]);

    // Earlier snapshots stay retrievable and untouched
    let old = store.content(v1.id).unwrap();
    assert_eq!(old.actions, vec![Action::new("shell", "uptime")]);
    assert_eq!(old.pattern, "all");
    assert_eq!(store.contents(task.id).len(), 4);
}

#[test]
fn test_target_order_does_not_count_as_change() {
    let fixture = fixture();
    let store = TaskStore::in_memory();
    let mut declaration = web_uptime(&fixture);
    declaration.assets = vec![fixture.web1, fixture.db1];
    declaration.ensure(&store).unwrap();

    declaration.assets = vec![fixture.db1, fixture.web1];
    assert!(!declaration.ensure(&store).unwrap().1);
}

#[test]
fn test_interval_and_crontab_are_exclusive() {
    let fixture = fixture();
    let store = TaskStore::in_memory();
    let declaration = TaskDeclaration {
        interval: Some("10m".to_string()),
        crontab: Some("*/5 * * * *".to_string()),
        is_periodic: true,
        ..web_uptime(&fixture)
    };

    let err = declaration.ensure(&store).unwrap_err();
    assert!(matches!(err, Error::ConflictingTrigger { .. }));
    assert!(err.is_configuration());
    assert!(store.task_by_name("web-uptime").is_none());
}

// ============================================================================
// Inventory construction
// ============================================================================

#[test]
fn test_node_and_direct_asset_are_deduplicated() {
    let fixture = fixture();
    let declaration = TaskDeclaration {
        assets: vec![fixture.web1],
        ..web_uptime(&fixture)
    };

    let inventory = declaration.inventory(fixture.directory.as_ref()).unwrap();
    let mut names: Vec<&str> = inventory.hosts().map(|h| h.name.as_str()).collect();
    names.sort_unstable();
    assert_eq!(names, vec!["web1", "web2", "web3"]);
    for host in inventory.hosts() {
        assert!(host.in_group("Web"), "{} not in Web", host.name);
    }
    assert!(inventory.get_group("Web").is_some());
}

#[test]
fn test_admin_credentials_resolved_per_host() {
    let fixture = fixture();
    let declaration = TaskDeclaration {
        nodes: vec![],
        assets: vec![fixture.web1, fixture.web2],
        ..web_uptime(&fixture)
    };
    let inventory = declaration.inventory(fixture.directory.as_ref()).unwrap();

    let web1 = inventory.get_host("web1").unwrap();
    assert_eq!(web1.user().as_deref(), Some("alice"));
    assert_eq!(web1.password().as_deref(), Some("alice-pass"));
    assert_eq!(web1.private_key_file(), None);

    let web2 = inventory.get_host("web2").unwrap();
    assert_eq!(web2.user().as_deref(), Some("bob"));
    assert_eq!(web2.password(), None);
    assert_eq!(web2.private_key_file().as_deref(), Some("/keys/bob"));
}

#[test]
fn test_domain_host_gets_proxy_and_group() {
    let fixture = fixture();
    let declaration = TaskDeclaration {
        nodes: vec![fixture.db_node],
        ..web_uptime(&fixture)
    };
    let inventory = declaration.inventory(fixture.directory.as_ref()).unwrap();

    let db1 = inventory.get_host("db1").unwrap();
    assert!(db1.in_group("DB"));
    assert!(db1.in_group("domain_dmz"));
    assert_eq!(db1.get_var("domain"), Some(&json!("dmz")));
    let proxy = db1.ssh_common_args().unwrap();
    assert!(proxy.contains("ProxyCommand=sshpass -p jump-pass ssh -p 2222 jump@192.168.10.1 -W %h:%p -q"));
}

#[test]
fn test_shared_system_user_applies_to_every_host() {
    let fixture = fixture();
    let declaration = TaskDeclaration {
        run_as_admin: false,
        run_as: Some("deploy".to_string()),
        ..web_uptime(&fixture)
    };
    let inventory = declaration.inventory(fixture.directory.as_ref()).unwrap();
    assert_eq!(inventory.host_count(), 3);
    for host in inventory.hosts() {
        assert_eq!(host.user().as_deref(), Some("deploy"));
    }
    assert_eq!(
        fixture.directory.node_assets(fixture.web_node).len(),
        inventory.host_count()
    );
}

// ============================================================================
// Log tailing
// ============================================================================

fn mark_offset(cache: &TtlCache, chunk: &TailChunk) -> u64 {
    cache
        .get_as::<u64>(&format!("log_tail_mark_{}", chunk.mark))
        .unwrap()
}

#[tokio::test]
async fn test_tail_reproduces_log_in_order() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("run.log");
    let cache = Arc::new(TtlCache::new());
    let tail = LogTail::new(cache.clone());

    let mut file = std::fs::File::create(&path).unwrap();
    let mut expected = String::new();
    let mut received = String::new();
    let mut mark: Option<String> = None;
    let mut last_offset = 0;

    for round in 0..40 {
        // Writer appends while the reader keeps polling
        let line = format!("round {} ünïcödé {}\n", round, "x".repeat(round * 37));
        file.write_all(line.as_bytes()).unwrap();
        file.flush().unwrap();
        expected.push_str(&line);

        let chunk = tail.read(&path, false, mark.as_deref()).await.unwrap();
        assert!(!chunk.end);
        let offset = mark_offset(&cache, &chunk);
        assert!(offset >= last_offset);
        last_offset = offset;
        received.push_str(&chunk.data.replace("\r\n", "\n"));
        mark = Some(chunk.mark);
    }

    loop {
        let chunk = tail.read(&path, true, mark.as_deref()).await.unwrap();
        received.push_str(&chunk.data.replace("\r\n", "\n"));
        if chunk.end {
            break;
        }
        let offset = mark_offset(&cache, &chunk);
        assert!(offset >= last_offset);
        last_offset = offset;
        mark = Some(chunk.mark);
    }

    assert!(expected.len() > 10 * 1024);
    assert_eq!(received, expected);
    assert_eq!(last_offset as usize, expected.len());
}

#[tokio::test]
async fn test_end_waits_for_last_buffered_line() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("run.log");
    std::fs::write(&path, "Start\n").unwrap();
    let tail = LogTail::new(Arc::new(TtlCache::new()));

    let first = tail.read(&path, false, None).await.unwrap();
    assert_eq!(first.data, "Start\r\n");

    // The run finishes with one line the reader has not seen yet
    let mut file = std::fs::OpenOptions::new().append(true).open(&path).unwrap();
    file.write_all(b"Finish\n").unwrap();

    let second = tail.read(&path, true, Some(&first.mark)).await.unwrap();
    assert_eq!(second.data, "Finish\r\n");
    assert!(!second.end);

    let third = tail.read(&path, true, Some(&second.mark)).await.unwrap();
    assert_eq!(third.data, "");
    assert!(third.end);
}

#[tokio::test]
async fn test_missing_log_waits_then_reports_not_found() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("2024-01-01").join("missing.log");
    let tail = LogTail::new(Arc::new(TtlCache::new()));

    let waiting = tail.read(&path, false, Some("abc")).await.unwrap();
    assert_eq!(waiting.data, "Waiting ...\n");
    assert!(!waiting.end);
    assert_eq!(waiting.mark, "abc");

    let gone = tail.read(&path, true, Some("abc")).await.unwrap();
    assert_eq!(gone.data, "Not found the log");
    assert!(gone.end);
}

// ============================================================================
// Fail-fast validation
// ============================================================================

#[tokio::test]
async fn test_zero_host_pattern_fails_before_any_connection() {
    let fixture = fixture();
    let declaration = web_uptime(&fixture);
    let inventory = declaration.inventory(fixture.directory.as_ref()).unwrap();
    let backend = Arc::new(MockBackend::new());
    let runner = AdHocRunner::new(inventory, RunnerOptions::default(), backend.clone());

    let err = runner
        .run(&declaration.actions, "db*", "uptime", &NullOutput)
        .await
        .unwrap_err();
    assert!(err.is_configuration());
    assert_eq!(err.to_string(), "pattern: db* does not match any hosts.");
    assert_eq!(backend.call_count(), 0);
    assert_eq!(backend.cleanups.load(std::sync::atomic::Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_failed_validation_is_recorded_without_host_entries() {
    let fixture = fixture();
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(TaskStore::in_memory());
    let backend = Arc::new(MockBackend::new());
    let declaration = TaskDeclaration {
        pattern: "db*".to_string(),
        ..web_uptime(&fixture)
    };
    let (task, _) = declaration.ensure(&store).unwrap();

    let executor = TaskExecutor::new(
        store.clone(),
        fixture.directory.clone(),
        shared_factory(backend.clone()),
        RunnerOptions::default(),
        dir.path(),
    );
    let outcome = executor.run_task(task.id).await;

    let RunOutcome::Finished { history, .. } = outcome else {
        panic!("run was skipped");
    };
    assert!(history.is_finished);
    assert!(!history.is_success);
    assert!(history.result.is_empty());
    assert!(history.summary.contacted.is_empty());
    assert_eq!(history.summary.dark.keys().collect::<Vec<_>>(), vec!["all"]);
    assert_eq!(backend.call_count(), 0);

    let log = std::fs::read_to_string(history.log_path(dir.path())).unwrap();
    assert!(log.contains("pattern: db* does not match any hosts."));
}
