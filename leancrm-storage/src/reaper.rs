//! Reaper
//!
//! Out-of-band sweep that reclaims stores idle for longer than a TTL.
//! Idempotent: sweeping an empty or already clean tree is a no-op.

use chrono::{DateTime, Utc};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::layout::{
    is_temp_artifact, modified_at, remove_dir_if_exists, remove_store_file, store_key, StoreLayout,
};

/// Outcome of one sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub deleted_stores: u64,
    pub deleted_upload_dirs: u64,
    /// Abandoned `.provisioning-*` files removed.
    pub deleted_temp_artifacts: u64,
    /// Lapsed token cache entries dropped alongside the sweep.
    pub evicted_tokens: u64,
    /// One message per path that could not be removed.
    pub errors: Vec<String>,
}

impl SweepReport {
    pub fn is_noop(&self) -> bool {
        self.deleted_stores == 0
            && self.deleted_upload_dirs == 0
            && self.deleted_temp_artifacts == 0
            && self.evicted_tokens == 0
    }
}

#[derive(Debug, Clone)]
pub struct Reaper {
    layout: StoreLayout,
}

impl Reaper {
    pub fn new(layout: StoreLayout) -> Self {
        Self { layout }
    }

    /// Delete every store last modified before `now - ttl`, its upload
    /// directory, stale provisioning leftovers, and orphaned upload
    /// directories past the same cutoff.
    ///
    /// Blocking: run it on the blocking pool.
    pub fn sweep(&self, ttl: Duration, now: DateTime<Utc>) -> SweepReport {
        let cutoff = now - leancrm_core::to_chrono(ttl);
        let mut report = SweepReport::default();

        for dir in self.layout.store_dirs() {
            for path in list(dir, &mut report) {
                if !path.is_file() {
                    continue;
                }
                let Some(mtime) = modified_or_report(&path, &mut report) else {
                    continue;
                };
                if mtime >= cutoff {
                    continue;
                }

                if is_temp_artifact(&path) {
                    match fs::remove_file(&path) {
                        Ok(()) => {
                            report.deleted_temp_artifacts += 1;
                            tracing::info!(path = %path.display(), "Removed stale provisioning artifact");
                        }
                        Err(e) => record_error(&mut report, &path, e),
                    }
                    continue;
                }

                let Some(key) = store_key(&path) else {
                    continue;
                };
                match remove_if_still_idle(&path, cutoff) {
                    Ok(true) => {
                        report.deleted_stores += 1;
                        tracing::info!(store = %key, idle_since = %mtime, "Deleted expired demo store");
                    }
                    Ok(false) => continue,
                    Err(e) => {
                        record_error(&mut report, &path, e);
                        continue;
                    }
                }
                let upload_dir = self.layout.upload_dir(&key);
                match remove_dir_if_exists(&upload_dir) {
                    Ok(true) => report.deleted_upload_dirs += 1,
                    Ok(false) => {}
                    Err(e) => record_error(&mut report, &upload_dir, e),
                }
            }
        }

        for path in list(self.layout.uploads_dir(), &mut report) {
            if !path.is_dir() {
                continue;
            }
            let Some(key) = path.file_name().and_then(|n| n.to_str()).map(str::to_string) else {
                continue;
            };
            if self.layout.has_store(&key) {
                continue;
            }
            let Some(mtime) = modified_or_report(&path, &mut report) else {
                continue;
            };
            if mtime >= cutoff {
                continue;
            }
            match remove_dir_if_exists(&path) {
                Ok(true) => {
                    report.deleted_upload_dirs += 1;
                    tracing::info!(upload_dir = %key, "Deleted orphaned upload directory");
                }
                Ok(false) => {}
                Err(e) => record_error(&mut report, &path, e),
            }
        }

        report
    }
}

fn list(dir: &Path, report: &mut SweepReport) -> Vec<PathBuf> {
    match fs::read_dir(dir) {
        Ok(entries) => entries
            .filter_map(|entry| match entry {
                Ok(entry) => Some(entry.path()),
                Err(e) => {
                    record_error(report, dir, e);
                    None
                }
            })
            .collect(),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
        Err(e) => {
            record_error(report, dir, e);
            Vec::new()
        }
    }
}

fn modified_or_report(path: &Path, report: &mut SweepReport) -> Option<DateTime<Utc>> {
    match modified_at(path) {
        Ok(mtime) => Some(mtime),
        // Removed by someone else between listing and stat.
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
        Err(e) => {
            record_error(report, path, e);
            None
        }
    }
}

/// Delete a store listed as idle unless a request touched it after the
/// listing. A live store must never be removed from under its session.
fn remove_if_still_idle(path: &Path, cutoff: DateTime<Utc>) -> std::io::Result<bool> {
    match modified_at(path) {
        Ok(mtime) if mtime >= cutoff => {
            tracing::debug!(path = %path.display(), "Store touched during sweep, keeping it");
            return Ok(false);
        }
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(false),
        Err(e) => return Err(e),
    }
    remove_store_file(path)
}

fn record_error(report: &mut SweepReport, path: &Path, err: std::io::Error) {
    tracing::warn!(path = %path.display(), error = %err, "Reaper could not process path");
    report.errors.push(format!("{}: {}", path.display(), err));
}
