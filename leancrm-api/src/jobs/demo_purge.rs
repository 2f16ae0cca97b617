//! Demo Purge Background Task
//!
//! Runs the reaper on a fixed interval while demo mode is on. Each cycle
//! deletes session and token stores idle for longer than the purge TTL, their
//! upload directories, abandoned provisioning files, and lapsed token cache
//! entries. A store in active use is never older than the TTL, so sweeping
//! concurrently with live requests is safe.

use leancrm_core::DemoConfig;
use leancrm_storage::{DemoSandbox, SweepReport};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{interval, MissedTickBehavior};

use crate::telemetry::METRICS;

// ============================================================================
// CONFIGURATION
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DemoPurgeConfig {
    /// How often to sweep (default: 5 minutes)
    pub interval: Duration,

    /// Idle age after which a store is reclaimed (default: 60 minutes)
    pub ttl: Duration,
}

impl Default for DemoPurgeConfig {
    fn default() -> Self {
        Self::from_demo_config(&DemoConfig::default())
    }
}

impl DemoPurgeConfig {
    /// Take the interval and TTL from the demo configuration
    /// (`LEANCRM_DEMO_PURGE_INTERVAL_SECS`, `LEANCRM_DEMO_PURGE_TTL_MINUTES`).
    pub fn from_demo_config(config: &DemoConfig) -> Self {
        Self {
            interval: config.purge_interval,
            ttl: config.purge_ttl,
        }
    }

    /// Short interval and TTL for development and testing.
    pub fn development() -> Self {
        Self {
            interval: Duration::from_secs(10),
            ttl: Duration::from_secs(120),
        }
    }
}

// ============================================================================
// METRICS
// ============================================================================

/// Counters for the lifetime of one purge task.
#[derive(Debug, Default)]
pub struct DemoPurgeMetrics {
    pub sweeps: AtomicU64,
    pub stores_deleted: AtomicU64,
    pub upload_dirs_deleted: AtomicU64,
    pub temp_artifacts_deleted: AtomicU64,
    pub tokens_evicted: AtomicU64,
    pub errors: AtomicU64,
}

impl DemoPurgeMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    fn record(&self, report: &SweepReport) {
        self.sweeps.fetch_add(1, Ordering::Relaxed);
        self.stores_deleted
            .fetch_add(report.deleted_stores, Ordering::Relaxed);
        self.upload_dirs_deleted
            .fetch_add(report.deleted_upload_dirs, Ordering::Relaxed);
        self.temp_artifacts_deleted
            .fetch_add(report.deleted_temp_artifacts, Ordering::Relaxed);
        self.tokens_evicted
            .fetch_add(report.evicted_tokens, Ordering::Relaxed);
        self.errors
            .fetch_add(report.errors.len() as u64, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> DemoPurgeSnapshot {
        DemoPurgeSnapshot {
            sweeps: self.sweeps.load(Ordering::Relaxed),
            stores_deleted: self.stores_deleted.load(Ordering::Relaxed),
            upload_dirs_deleted: self.upload_dirs_deleted.load(Ordering::Relaxed),
            temp_artifacts_deleted: self.temp_artifacts_deleted.load(Ordering::Relaxed),
            tokens_evicted: self.tokens_evicted.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DemoPurgeSnapshot {
    pub sweeps: u64,
    pub stores_deleted: u64,
    pub upload_dirs_deleted: u64,
    pub temp_artifacts_deleted: u64,
    pub tokens_evicted: u64,
    pub errors: u64,
}

// ============================================================================
// BACKGROUND TASK
// ============================================================================

/// Sweep on every tick until `shutdown_rx` flips to `true`.
///
/// The first tick fires immediately, so stores left over from a previous run
/// are reclaimed at startup.
pub async fn demo_purge_task(
    sandbox: DemoSandbox,
    config: DemoPurgeConfig,
    mut shutdown_rx: watch::Receiver<bool>,
) -> Arc<DemoPurgeMetrics> {
    let metrics = Arc::new(DemoPurgeMetrics::new());

    let mut purge_interval = interval(config.interval);
    purge_interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

    tracing::info!(
        interval_secs = config.interval.as_secs(),
        ttl_secs = config.ttl.as_secs(),
        "Demo purge task started"
    );

    loop {
        tokio::select! {
            _ = shutdown_rx.changed() => {
                if *shutdown_rx.borrow() {
                    tracing::info!("Demo purge task shutting down");
                    break;
                }
            }

            _ = purge_interval.tick() => {
                purge_once(&sandbox, config.ttl, &metrics).await;
            }
        }
    }

    let snapshot = metrics.snapshot();
    tracing::info!(
        sweeps = snapshot.sweeps,
        stores_deleted = snapshot.stores_deleted,
        tokens_evicted = snapshot.tokens_evicted,
        errors = snapshot.errors,
        "Demo purge task completed"
    );

    metrics
}

/// Run one sweep and record its outcome.
async fn purge_once(sandbox: &DemoSandbox, ttl: Duration, metrics: &DemoPurgeMetrics) {
    let report = match sandbox.sweep(ttl).await {
        Ok(report) => report,
        Err(e) => {
            tracing::error!(error = %e, "Demo purge sweep failed");
            metrics.errors.fetch_add(1, Ordering::Relaxed);
            return;
        }
    };

    metrics.record(&report);
    if let Ok(m) = METRICS.as_ref() {
        m.record_sweep(&report);
    }

    for error in &report.errors {
        tracing::warn!(error = %error, "Demo purge could not remove path");
    }

    if report.is_noop() {
        tracing::trace!("Demo purge cycle completed with nothing to remove");
    } else {
        tracing::info!(
            stores = report.deleted_stores,
            upload_dirs = report.deleted_upload_dirs,
            temp_artifacts = report.deleted_temp_artifacts,
            tokens = report.evicted_tokens,
            "Demo purge cycle completed"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use leancrm_test_utils::{backdate, write_empty, Sandbox};

    #[test]
    fn test_config_follows_demo_config() {
        let mut demo = DemoConfig::default();
        demo.purge_interval = Duration::from_secs(42);
        demo.purge_ttl = Duration::from_secs(600);

        let config = DemoPurgeConfig::from_demo_config(&demo);
        assert_eq!(config.interval, Duration::from_secs(42));
        assert_eq!(config.ttl, Duration::from_secs(600));
    }

    #[tokio::test]
    async fn test_task_sweeps_stale_stores_and_stops_on_shutdown() {
        let fixture = Sandbox::new().unwrap();
        let config = fixture.demo_config();
        let stale = config.sessions_dir().join("session_stale.sqlite");
        let fresh = config.sessions_dir().join("session_fresh.sqlite");
        write_empty(&stale).unwrap();
        write_empty(&fresh).unwrap();
        backdate(&stale, 90).unwrap();

        let sandbox = DemoSandbox::new(config);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let purge = DemoPurgeConfig {
            interval: Duration::from_secs(3600),
            ttl: Duration::from_secs(60 * 60),
        };
        let handle = tokio::spawn(demo_purge_task(sandbox, purge, shutdown_rx));

        // The immediate first tick performs one sweep.
        for _ in 0..50 {
            if !stale.exists() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        shutdown_tx.send(true).unwrap();
        let metrics = handle.await.unwrap();

        assert!(!stale.exists());
        assert!(fresh.exists());
        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.sweeps, 1);
        assert_eq!(snapshot.stores_deleted, 1);
        assert_eq!(snapshot.errors, 0);
    }

    #[tokio::test]
    async fn test_disabled_sandbox_counts_an_error() {
        let fixture = Sandbox::new().unwrap();
        let sandbox = DemoSandbox::new(fixture.disabled_config());
        let metrics = DemoPurgeMetrics::new();

        purge_once(&sandbox, Duration::from_secs(60), &metrics).await;

        assert_eq!(metrics.snapshot().errors, 1);
        assert_eq!(metrics.snapshot().sweeps, 0);
    }
}
