//! On-disk layout of demo stores and the file operations shared by the
//! registries and the reaper.

use chrono::{DateTime, Utc};
use leancrm_core::{DemoConfig, StoreLocation};
use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use uuid::Uuid;

/// Extension of committed store files.
pub const STORE_EXTENSION: &str = "sqlite";

/// Prefix of in-flight provisioning artifacts. Anything carrying it is
/// treated as absent by lookups.
pub const TEMP_PREFIX: &str = ".provisioning-";

const SESSION_PREFIX: &str = "session_";

/// SQLite sidecar suffixes removed together with a store.
const SIDECAR_SUFFIXES: [&str; 3] = ["-journal", "-wal", "-shm"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreLayout {
    sessions_dir: PathBuf,
    tokens_dir: PathBuf,
    uploads_dir: PathBuf,
}

impl StoreLayout {
    pub fn from_config(config: &DemoConfig) -> Self {
        Self {
            sessions_dir: config.sessions_dir(),
            tokens_dir: config.tokens_dir(),
            uploads_dir: config.uploads_dir(),
        }
    }

    pub fn sessions_dir(&self) -> &Path {
        &self.sessions_dir
    }

    pub fn tokens_dir(&self) -> &Path {
        &self.tokens_dir
    }

    pub fn uploads_dir(&self) -> &Path {
        &self.uploads_dir
    }

    /// `demo_databases/session_<id>.sqlite`
    pub fn session_location(&self, session_id: &str) -> StoreLocation {
        self.location_in(&self.sessions_dir, format!("{}{}", SESSION_PREFIX, session_id))
    }

    /// `app/demo/tokens/<uuid>.sqlite`
    pub fn token_location(&self, store_id: Uuid) -> StoreLocation {
        self.location_in(&self.tokens_dir, store_id.to_string())
    }

    pub fn upload_dir(&self, key: &str) -> PathBuf {
        self.uploads_dir.join(key)
    }

    /// Directories that hold committed stores.
    pub fn store_dirs(&self) -> [&Path; 2] {
        [&self.sessions_dir, &self.tokens_dir]
    }

    /// Whether a committed store exists for `key` in either mode directory.
    pub fn has_store(&self, key: &str) -> bool {
        self.store_dirs()
            .iter()
            .any(|dir| store_file(dir, key).is_file())
    }

    fn location_in(&self, dir: &Path, key: String) -> StoreLocation {
        let path = store_file(dir, &key);
        let upload_dir = self.upload_dir(&key);
        StoreLocation::new(key, path, upload_dir)
    }
}

fn store_file(dir: &Path, key: &str) -> PathBuf {
    dir.join(format!("{}.{}", key, STORE_EXTENSION))
}

/// Key of a committed store file, or `None` for temp artifacts and
/// unrelated files.
pub fn store_key(path: &Path) -> Option<String> {
    if path.extension().and_then(|e| e.to_str()) != Some(STORE_EXTENSION) {
        return None;
    }
    let stem = path.file_stem()?.to_str()?;
    if stem.is_empty() || stem.starts_with(TEMP_PREFIX) {
        return None;
    }
    Some(stem.to_string())
}

pub fn is_temp_artifact(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .map(|n| n.starts_with(TEMP_PREFIX))
        .unwrap_or(false)
}

// ============================================================================
// FILE TIMESTAMPS
// ============================================================================

pub fn modified_at(path: &Path) -> io::Result<DateTime<Utc>> {
    let modified = fs::metadata(path)?.modified()?;
    Ok(DateTime::<Utc>::from(modified))
}

/// Move the file's mtime forward to `now`. A later mtime is left alone so
/// that an out-of-order request never rewinds activity.
pub fn touch_monotonic(path: &Path, now: DateTime<Utc>) -> io::Result<DateTime<Utc>> {
    let current = modified_at(path)?;
    if now <= current {
        return Ok(current);
    }
    let file: File = OpenOptions::new().append(true).open(path)?;
    file.set_modified(SystemTime::from(now))?;
    Ok(now)
}

// ============================================================================
// REMOVAL
// ============================================================================

/// Remove a store file and its SQLite sidecars. Returns whether the main
/// file existed.
pub fn remove_store_file(path: &Path) -> io::Result<bool> {
    let existed = match fs::remove_file(path) {
        Ok(()) => true,
        Err(e) if e.kind() == io::ErrorKind::NotFound => false,
        Err(e) => return Err(e),
    };
    for suffix in SIDECAR_SUFFIXES {
        let mut sidecar = path.as_os_str().to_owned();
        sidecar.push(suffix);
        match fs::remove_file(PathBuf::from(sidecar)) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(e),
        }
    }
    Ok(existed)
}

/// Remove a directory tree. Returns whether it existed.
pub fn remove_dir_if_exists(path: &Path) -> io::Result<bool> {
    match fs::remove_dir_all(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e),
    }
}
