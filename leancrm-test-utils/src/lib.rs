//! LeanCRM Test Utilities
//!
//! Shared test infrastructure for the LeanCRM workspace:
//! - Sandboxed storage roots backed by temp directories
//! - Helpers for backdating store files
//! - Proptest generators for identities and TTLs
//! - Assertions for demo errors

pub use leancrm_core::{DemoConfig, DemoError, DemoResult, EphemeralIdentity, IdentityMode};

use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tempfile::TempDir;

// ============================================================================
// SANDBOX
// ============================================================================

/// A temporary storage root, removed on drop.
#[derive(Debug)]
pub struct Sandbox {
    dir: TempDir,
}

impl Sandbox {
    pub fn new() -> io::Result<Self> {
        Ok(Self {
            dir: tempfile::Builder::new().prefix("leancrm-test-").tempdir()?,
        })
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    /// Demo-enabled config rooted in this sandbox.
    pub fn demo_config(&self) -> DemoConfig {
        DemoConfig::enabled_at(self.root())
    }

    /// Demo-disabled config rooted in this sandbox.
    pub fn disabled_config(&self) -> DemoConfig {
        DemoConfig::with_storage_root(self.root())
    }

    /// Every committed store file under the sandbox's mode directories.
    pub fn store_files(&self) -> Vec<PathBuf> {
        let config = self.demo_config();
        let mut files = Vec::new();
        for dir in [config.sessions_dir(), config.tokens_dir()] {
            if let Ok(entries) = fs::read_dir(&dir) {
                for entry in entries.flatten() {
                    let path = entry.path();
                    let name = entry.file_name().to_string_lossy().to_string();
                    if name.ends_with(".sqlite") && !name.starts_with('.') {
                        files.push(path);
                    }
                }
            }
        }
        files.sort();
        files
    }
}

// ============================================================================
// FILE TIMESTAMPS
// ============================================================================

/// Set a file's mtime to `minutes` ago.
pub fn backdate(path: &Path, minutes: u64) -> io::Result<()> {
    let when = SystemTime::now()
        .checked_sub(Duration::from_secs(minutes * 60))
        .unwrap_or(SystemTime::UNIX_EPOCH);
    set_mtime(path, when)
}

/// Set a file or directory's mtime.
pub fn set_mtime(path: &Path, when: SystemTime) -> io::Result<()> {
    let file = if path.is_dir() {
        File::open(path)?
    } else {
        OpenOptions::new().append(true).open(path)?
    };
    file.set_modified(when)
}

/// Write an empty file, creating parents.
pub fn write_empty(path: &Path) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, b"")
}

// ============================================================================
// PROPTEST GENERATORS
// ============================================================================

pub mod generators {
    //! Proptest strategies for demo sandbox types.

    use super::*;
    use proptest::prelude::*;

    /// Session ids as a session layer would hand them out.
    pub fn arb_session_id() -> impl Strategy<Value = String> {
        "[A-Za-z0-9]{40}"
    }

    pub fn arb_session_identity() -> impl Strategy<Value = EphemeralIdentity> {
        arb_session_id().prop_filter_map("valid session id", |id| {
            EphemeralIdentity::session(id).ok()
        })
    }

    pub fn arb_token_identity() -> impl Strategy<Value = EphemeralIdentity> {
        "[A-Za-z0-9_-]{86}".prop_filter_map("valid token", |t| EphemeralIdentity::token(t).ok())
    }

    pub fn arb_identity() -> impl Strategy<Value = EphemeralIdentity> {
        prop_oneof![arb_session_identity(), arb_token_identity()]
    }

    /// TTLs between one minute and a day.
    pub fn arb_ttl_minutes() -> impl Strategy<Value = i64> {
        1i64..1440
    }
}

// ============================================================================
// ASSERTIONS
// ============================================================================

pub mod assertions {
    //! Assertions for demo sandbox results.

    use super::*;

    #[track_caller]
    pub fn assert_not_found<T: std::fmt::Debug>(result: &DemoResult<T>) {
        match result {
            Err(DemoError::IdentityNotFound) => {}
            other => panic!("Expected IdentityNotFound, got: {:?}", other),
        }
    }

    #[track_caller]
    pub fn assert_expired<T: std::fmt::Debug>(result: &DemoResult<T>) {
        match result {
            Err(DemoError::SessionExpired) => {}
            other => panic!("Expected SessionExpired, got: {:?}", other),
        }
    }

    #[track_caller]
    pub fn assert_disabled<T: std::fmt::Debug>(result: &DemoResult<T>) {
        match result {
            Err(DemoError::DemoModeDisabled) => {}
            other => panic!("Expected DemoModeDisabled, got: {:?}", other),
        }
    }
}
