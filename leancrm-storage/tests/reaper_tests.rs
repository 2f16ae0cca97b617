//! Reaper sweep tests.

use chrono::Utc;
use leancrm_core::EphemeralIdentity;
use leancrm_storage::{DemoSandbox, Reaper, StoreLayout};
use leancrm_test_utils::{backdate, set_mtime, write_empty, Sandbox};
use std::fs;
use std::time::{Duration, SystemTime};

const HOUR: Duration = Duration::from_secs(60 * 60);

fn reaper(sandbox: &Sandbox) -> (Reaper, StoreLayout) {
    let layout = StoreLayout::from_config(&sandbox.demo_config());
    (Reaper::new(layout.clone()), layout)
}

#[tokio::test]
async fn sweep_deletes_stale_and_keeps_recent_stores() {
    let sandbox = Sandbox::new().unwrap();
    let demo = DemoSandbox::new(sandbox.demo_config());
    let stale = demo
        .route(&EphemeralIdentity::session("stale").unwrap(), true)
        .await
        .unwrap();
    let fresh = demo
        .route(&EphemeralIdentity::session("fresh").unwrap(), true)
        .await
        .unwrap();
    backdate(&stale.record.location.path, 61).unwrap();
    backdate(&fresh.record.location.path, 10).unwrap();

    let report = demo.sweep(HOUR).await.unwrap();

    assert_eq!(report.deleted_stores, 1);
    assert_eq!(report.deleted_upload_dirs, 1);
    assert!(report.errors.is_empty());
    assert!(!stale.record.location.path.exists());
    assert!(!stale.record.location.upload_dir.exists());
    assert!(fresh.record.location.path.exists());
    assert!(fresh.record.location.upload_dir.exists());

    let again = demo.sweep(HOUR).await.unwrap();
    assert!(again.is_noop());
    assert!(again.errors.is_empty());
}

#[test]
fn sweep_on_missing_directories_is_noop() {
    let sandbox = Sandbox::new().unwrap();
    let (reaper, _) = reaper(&sandbox);

    let report = reaper.sweep(HOUR, Utc::now());

    assert!(report.is_noop());
    assert!(report.errors.is_empty());
}

#[test]
fn sweep_covers_token_stores() {
    let sandbox = Sandbox::new().unwrap();
    let (reaper, layout) = reaper(&sandbox);
    let location = layout.token_location(uuid::Uuid::new_v4());
    write_empty(&location.path).unwrap();
    fs::create_dir_all(&location.upload_dir).unwrap();
    backdate(&location.path, 120).unwrap();

    let report = reaper.sweep(HOUR, Utc::now());

    assert_eq!(report.deleted_stores, 1);
    assert_eq!(report.deleted_upload_dirs, 1);
    assert!(!location.path.exists());
}

#[test]
fn sweep_skips_fresh_provisioning_artifacts() {
    let sandbox = Sandbox::new().unwrap();
    let (reaper, layout) = reaper(&sandbox);
    let in_flight = layout.sessions_dir().join(".provisioning-abc123.sqlite");
    let abandoned = layout.sessions_dir().join(".provisioning-def456.sqlite");
    write_empty(&in_flight).unwrap();
    write_empty(&abandoned).unwrap();
    backdate(&abandoned, 120).unwrap();

    let report = reaper.sweep(HOUR, Utc::now());

    assert_eq!(report.deleted_stores, 0);
    assert_eq!(report.deleted_temp_artifacts, 1);
    assert!(in_flight.exists());
    assert!(!abandoned.exists());
}

#[test]
fn sweep_removes_only_orphaned_stale_upload_dirs() {
    let sandbox = Sandbox::new().unwrap();
    let (reaper, layout) = reaper(&sandbox);

    let live = layout.session_location("live");
    write_empty(&live.path).unwrap();
    fs::create_dir_all(&live.upload_dir).unwrap();
    backdate(&live.upload_dir, 300).unwrap();

    let orphan_old = layout.upload_dir("session_gone");
    fs::create_dir_all(&orphan_old).unwrap();
    backdate(&orphan_old, 300).unwrap();

    let orphan_new = layout.upload_dir("session_recent");
    fs::create_dir_all(&orphan_new).unwrap();

    let report = reaper.sweep(HOUR, Utc::now());

    assert_eq!(report.deleted_stores, 0);
    assert_eq!(report.deleted_upload_dirs, 1);
    assert!(live.upload_dir.exists());
    assert!(!orphan_old.exists());
    assert!(orphan_new.exists());
}

#[test]
fn sweep_removes_sidecar_files_with_store() {
    let sandbox = Sandbox::new().unwrap();
    let (reaper, layout) = reaper(&sandbox);
    let location = layout.session_location("wal");
    let wal = location.path.with_extension("sqlite-wal");
    write_empty(&location.path).unwrap();
    write_empty(&wal).unwrap();
    set_mtime(&location.path, SystemTime::UNIX_EPOCH + Duration::from_secs(60)).unwrap();

    let report = reaper.sweep(HOUR, Utc::now());

    assert_eq!(report.deleted_stores, 1);
    assert!(!wal.exists());
}

#[tokio::test]
async fn sweep_evicts_lapsed_tokens() {
    let sandbox = Sandbox::new().unwrap();
    let mut config = sandbox.demo_config();
    config.token_ttl = Duration::from_millis(50);
    let demo = DemoSandbox::new(config);

    demo.issue_token().await.unwrap();
    tokio::time::sleep(Duration::from_millis(120)).await;

    let report = demo.sweep(HOUR).await.unwrap();
    assert_eq!(report.evicted_tokens, 1);
    assert!(demo.tokens().is_empty());
    assert_eq!(report.deleted_stores, 0);
}
