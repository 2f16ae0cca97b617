//! Routing, provisioning and token lifecycle tests for the demo sandbox.

use chrono::{Duration as ChronoDuration, Utc};
use leancrm_core::{DemoError, EphemeralIdentity, IdentityMode};
use leancrm_storage::{
    route_blocking, verify_store, DemoSandbox, IdentityRegistry, StoreProvisioner, REQUIRED_TABLES,
};
use leancrm_test_utils::assertions::{assert_disabled, assert_expired, assert_not_found};
use leancrm_test_utils::generators::arb_session_identity;
use leancrm_test_utils::{backdate, Sandbox};
use proptest::prelude::*;
use rusqlite::Connection;
use std::collections::HashSet;

fn sandbox_with(sandbox: &Sandbox) -> DemoSandbox {
    DemoSandbox::new(sandbox.demo_config())
}

fn table_names(path: &std::path::Path) -> HashSet<String> {
    let conn = Connection::open(path).unwrap();
    let mut stmt = conn
        .prepare("SELECT name FROM sqlite_master WHERE type = 'table'")
        .unwrap();
    let names = stmt.query_map([], |row| row.get::<_, String>(0)).unwrap();
    names.collect::<Result<_, _>>().unwrap()
}

#[tokio::test]
async fn bootstrap_request_provisions_complete_store() {
    let sandbox = Sandbox::new().unwrap();
    let demo = sandbox_with(&sandbox);
    let identity = EphemeralIdentity::session("fresh-session").unwrap();

    let resolution = demo.route(&identity, true).await.unwrap();

    assert!(resolution.provisioned);
    let path = &resolution.record.location.path;
    verify_store(path).unwrap();
    let tables = table_names(path);
    for table in REQUIRED_TABLES {
        assert!(tables.contains(table), "missing {}", table);
    }
    assert!(resolution.record.location.upload_dir.is_dir());
}

#[tokio::test]
async fn non_bootstrap_request_without_store_is_not_initialized() {
    let sandbox = Sandbox::new().unwrap();
    let demo = sandbox_with(&sandbox);
    let identity = EphemeralIdentity::session("unknown").unwrap();

    let result = demo.route(&identity, false).await;

    assert_not_found(&result);
    assert!(sandbox.store_files().is_empty());
}

#[tokio::test]
async fn disabled_sandbox_refuses_everything() {
    let sandbox = Sandbox::new().unwrap();
    let demo = DemoSandbox::new(sandbox.disabled_config());
    let identity = EphemeralIdentity::session("anyone").unwrap();

    assert_disabled(&demo.route(&identity, true).await);
    assert_disabled(&demo.issue_token().await);
    assert_disabled(&demo.sweep(std::time::Duration::from_secs(60)).await);
}

#[tokio::test]
async fn subsequent_request_reuses_store() {
    let sandbox = Sandbox::new().unwrap();
    let demo = sandbox_with(&sandbox);
    let identity = EphemeralIdentity::session("returning").unwrap();

    let first = demo.route(&identity, true).await.unwrap();
    let second = demo.route(&identity, false).await.unwrap();

    assert!(!second.provisioned);
    assert_eq!(first.record.location, second.record.location);
    assert_eq!(sandbox.store_files().len(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_first_requests_share_one_store() {
    let sandbox = Sandbox::new().unwrap();
    let demo = sandbox_with(&sandbox);
    let identity = EphemeralIdentity::session("racing").unwrap();

    let mut handles = Vec::new();
    for _ in 0..8 {
        let demo = demo.clone();
        let identity = identity.clone();
        handles.push(tokio::spawn(async move { demo.route(&identity, true).await }));
    }

    let mut provisioned = 0;
    let mut paths = HashSet::new();
    for handle in handles {
        let resolution = handle.await.unwrap().unwrap();
        if resolution.provisioned {
            provisioned += 1;
        }
        paths.insert(resolution.record.location.path.clone());
    }

    assert_eq!(provisioned, 1);
    assert_eq!(paths.len(), 1);
    assert_eq!(sandbox.store_files().len(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn racing_provisioners_without_lock_still_commit_once() {
    let sandbox = Sandbox::new().unwrap();
    let demo = sandbox_with(&sandbox);
    let registry = demo.registry_for(IdentityMode::Session);
    let identity = EphemeralIdentity::session("unlocked").unwrap();
    let location = registry.locate(&identity, Utc::now()).unwrap().unwrap();

    let mut handles = Vec::new();
    for _ in 0..6 {
        let location = location.clone();
        handles.push(tokio::task::spawn_blocking(move || {
            StoreProvisioner::script_only(None).provision(&location)
        }));
    }
    let mut created = 0;
    for handle in handles {
        if handle.await.unwrap().unwrap().is_created() {
            created += 1;
        }
    }

    assert_eq!(created, 1);
    assert_eq!(sandbox.store_files().len(), 1);
    verify_store(&location.path).unwrap();
}

#[test]
fn session_store_expires_strictly_after_ttl() {
    let sandbox = Sandbox::new().unwrap();
    let demo = sandbox_with(&sandbox);
    let registry = demo.registry_for(IdentityMode::Session);
    let provisioner = StoreProvisioner::script_only(None);
    let identity = EphemeralIdentity::session("boundary").unwrap();

    let t0 = Utc::now();
    let created = route_blocking(&*registry, &provisioner, &identity, true, t0).unwrap();
    let touched_at = created.record.last_touched_at;
    let ttl = ChronoDuration::minutes(60);

    let just_before = touched_at + ttl - ChronoDuration::seconds(1);
    let still_alive =
        route_blocking(&*registry, &provisioner, &identity, false, just_before).unwrap();
    assert!(!still_alive.provisioned);

    // The touch above slid the window forward from `just_before`.
    let after_slide = still_alive.record.last_touched_at + ttl + ChronoDuration::seconds(1);
    let expired = route_blocking(&*registry, &provisioner, &identity, false, after_slide);
    assert_expired(&expired);
    assert!(!created.record.location.path.exists());
    assert!(!created.record.location.upload_dir.exists());

    let after = route_blocking(&*registry, &provisioner, &identity, false, after_slide);
    assert_not_found(&after);
}

#[tokio::test]
async fn idle_session_store_is_destroyed_on_access() {
    let sandbox = Sandbox::new().unwrap();
    let demo = sandbox_with(&sandbox);
    let identity = EphemeralIdentity::session("sleepy").unwrap();

    let resolution = demo.route(&identity, true).await.unwrap();
    backdate(&resolution.record.location.path, 61).unwrap();

    let result = demo.route(&identity, false).await;
    assert!(matches!(result, Err(DemoError::SessionExpired)));
    assert!(sandbox.store_files().is_empty());
}

#[tokio::test]
async fn expired_session_can_bootstrap_again() {
    let sandbox = Sandbox::new().unwrap();
    let demo = sandbox_with(&sandbox);
    let identity = EphemeralIdentity::session("phoenix").unwrap();

    let resolution = demo.route(&identity, true).await.unwrap();
    backdate(&resolution.record.location.path, 90).unwrap();
    assert_expired(&demo.route(&identity, true).await);

    let reborn = demo.route(&identity, true).await.unwrap();
    assert!(reborn.provisioned);
}

#[tokio::test]
async fn issued_token_resolves_to_its_store() {
    let sandbox = Sandbox::new().unwrap();
    let demo = sandbox_with(&sandbox);

    let issued = demo.issue_token().await.unwrap();
    assert_eq!(issued.token().len(), 86);
    assert_eq!(issued.expires_in_secs, 30 * 60);
    assert!(issued.location.path.is_file());
    assert!(issued.location.path.starts_with(sandbox.demo_config().tokens_dir()));

    let resolution = demo.route(&issued.identity, false).await.unwrap();
    assert_eq!(resolution.record.location, issued.location);
    assert_eq!(resolution.record.expires_at, issued.expires_at);
}

#[test]
fn token_lookup_after_ttl_is_not_found_but_store_remains() {
    let sandbox = Sandbox::new().unwrap();
    let demo = sandbox_with(&sandbox);
    let registry = demo.registry_for(IdentityMode::Token);
    let provisioner = StoreProvisioner::script_only(None);

    let (identity, location) = demo.tokens().mint().unwrap();
    provisioner.provision(&location).unwrap();
    let t0 = Utc::now();
    registry.register(&identity, location.clone(), t0).unwrap();

    let within = route_blocking(
        &*registry,
        &provisioner,
        &identity,
        false,
        t0 + ChronoDuration::minutes(29),
    );
    assert!(within.is_ok());

    let after = route_blocking(
        &*registry,
        &provisioner,
        &identity,
        false,
        t0 + ChronoDuration::minutes(31),
    );
    assert_not_found(&after);
    assert!(location.path.exists());
}

#[tokio::test]
async fn identities_never_share_stores() {
    let sandbox = Sandbox::new().unwrap();
    let demo = sandbox_with(&sandbox);

    let a = demo.issue_token().await.unwrap();
    let b = demo.issue_token().await.unwrap();
    let session = EphemeralIdentity::session(a.token()).unwrap();
    let s = demo.route(&session, true).await.unwrap();

    let paths: HashSet<_> = [&a.location.path, &b.location.path, &s.record.location.path]
        .into_iter()
        .collect();
    assert_eq!(paths.len(), 3);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(8))]

    #[test]
    fn prop_provisioned_store_is_complete(identity in arb_session_identity()) {
        let sandbox = Sandbox::new().unwrap();
        let demo = sandbox_with(&sandbox);
        let registry = demo.registry_for(IdentityMode::Session);
        let provisioner = StoreProvisioner::script_only(None);

        let resolution = route_blocking(&*registry, &provisioner, &identity, true, Utc::now()).unwrap();
        let resolved = registry.resolve(&identity, Utc::now()).unwrap();

        prop_assert!(resolved.is_some());
        prop_assert_eq!(resolved.unwrap().location, resolution.record.location.clone());
        prop_assert!(verify_store(&resolution.record.location.path).is_ok());
    }
}
