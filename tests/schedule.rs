//! Periodic scheduling through the engine and its beat.

mod common;

use std::time::Duration;

use chrono::{TimeZone, Utc};
use pretty_assertions::assert_eq;

use bastion_ops::pipeline::{PeriodicEntry, PeriodicRegistry, RUN_TASK_ENTRY};
use bastion_ops::tasks::{TaskDeclaration, Trigger};

use common::*;

fn periodic(h: &Harness, interval: &str) -> TaskDeclaration {
    TaskDeclaration {
        interval: Some(interval.to_string()),
        is_periodic: true,
        ..web_uptime(&h.fixture)
    }
}

#[tokio::test]
async fn test_declared_interval_registers_entry() {
    let h = harness(MockBackend::new());
    let (task, _) = h.engine.declare(&periodic(&h, "300")).unwrap();

    let entry = h.engine.registry().get("web-uptime").unwrap();
    assert_eq!(
        entry,
        PeriodicEntry {
            task: RUN_TASK_ENTRY.to_string(),
            interval: Some(300),
            crontab: None,
            args: vec![task.id],
            enabled: true,
        }
    );

    h.engine.shutdown().await;
}

#[tokio::test]
async fn test_five_field_crontab_gains_seconds() {
    let h = harness(MockBackend::new());
    let declaration = TaskDeclaration {
        crontab: Some("*/5 * * * *".to_string()),
        is_periodic: true,
        ..web_uptime(&h.fixture)
    };
    h.engine.declare(&declaration).unwrap();

    let entry = h.engine.registry().get("web-uptime").unwrap();
    assert_eq!(entry.crontab.as_deref(), Some("0 */5 * * * *"));
    assert_eq!(entry.interval, None);

    h.engine.shutdown().await;
}

#[tokio::test]
async fn test_beat_runs_periodic_task() {
    let h = harness(MockBackend::new());
    let (task, _) = h.engine.declare(&periodic(&h, "1s")).unwrap();
    let beat = h.engine.spawn_beat();

    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while h.store().histories(task.id).is_empty() {
        assert!(
            tokio::time::Instant::now() < deadline,
            "periodic task never ran"
        );
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    assert!(h.engine.registry().last_fired("web-uptime").is_some());

    beat.abort();
    h.engine.shutdown().await;
}

#[tokio::test]
async fn test_turning_off_periodic_disables_entry() {
    let h = harness(MockBackend::new());
    let mut declaration = periodic(&h, "10m");
    h.engine.declare(&declaration).unwrap();

    declaration.is_periodic = false;
    h.engine.declare(&declaration).unwrap();
    let entry = h.engine.registry().get("web-uptime").unwrap();
    assert!(!entry.enabled);

    h.engine.shutdown().await;
}

#[tokio::test]
async fn test_deleting_task_removes_entry() {
    let h = harness(MockBackend::new());
    let (task, _) = h.engine.declare(&periodic(&h, "10m")).unwrap();
    assert!(h.engine.registry().get("web-uptime").is_some());

    h.engine.delete_task(task.id, true).unwrap();
    assert!(h.engine.registry().get("web-uptime").is_none());
    assert!(h.store().task(task.id).is_none());

    h.engine.shutdown().await;
}

#[tokio::test]
async fn test_schedule_rebuilt_from_store_on_restart() {
    let h = harness(MockBackend::new());
    let (task, _) = h.engine.declare(&periodic(&h, "2h")).unwrap();
    h.engine.shutdown().await;

    let restarted = bastion_ops::Engine::start(
        h.engine.store().clone(),
        h.fixture.directory.clone(),
        shared_factory(h.backend.clone()),
        settings(&h.dir),
    )
    .unwrap();
    let entry = restarted.registry().get("web-uptime").unwrap();
    assert_eq!(entry.args, vec![task.id]);
    assert_eq!(entry.interval, Some(7200));

    restarted.shutdown().await;
}

#[test]
fn test_periodic_without_trigger_is_rejected() {
    let fixture = fixture();
    let store = bastion_ops::tasks::TaskStore::in_memory();
    let declaration = TaskDeclaration {
        is_periodic: true,
        ..web_uptime(&fixture)
    };
    let err = declaration.ensure(&store).unwrap_err();
    assert!(err.is_configuration());
}

#[test]
fn test_due_fires_interval_entries_in_step() {
    let registry = PeriodicRegistry::new();
    let trigger = Trigger::parse_interval("60").unwrap();
    let task_id = uuid::Uuid::new_v4();
    registry.register("heartbeat", PeriodicEntry::for_task(task_id, &trigger));

    let t0 = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
    assert!(registry.due(t0).is_empty());
    assert!(registry.due(t0 + chrono::Duration::seconds(30)).is_empty());
    assert_eq!(
        registry.due(t0 + chrono::Duration::seconds(60)),
        vec![("heartbeat".to_string(), task_id)]
    );
    assert!(registry.due(t0 + chrono::Duration::seconds(90)).is_empty());
    assert_eq!(
        registry.last_fired("heartbeat"),
        Some(t0 + chrono::Duration::seconds(60))
    );

    assert!(registry.disable("heartbeat"));
    assert!(registry.due(t0 + chrono::Duration::seconds(600)).is_empty());
}
