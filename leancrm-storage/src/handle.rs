//! Request-scoped store handles.
//!
//! A handle names exactly one store. Request handlers receive it through the
//! request's extensions and open their own connection on the blocking pool;
//! nothing about the active store is process-global.

use leancrm_core::{IdentityMode, StoreRecord};
use rusqlite::{Connection, OpenFlags};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Blocking task failed: {0}")]
    Task(String),
}

/// Which store a request is bound to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreBinding {
    /// The configured application store (demo mode off).
    Default,
    /// An ephemeral demo store.
    Demo {
        mode: IdentityMode,
        /// Identity fingerprint, safe to log.
        identity: String,
        key: String,
    },
}

#[derive(Debug, Clone)]
pub struct StoreHandle {
    path: Arc<PathBuf>,
    binding: StoreBinding,
}

impl StoreHandle {
    pub fn default_store(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Arc::new(path.into()),
            binding: StoreBinding::Default,
        }
    }

    pub fn for_record(record: &StoreRecord) -> Self {
        Self {
            path: Arc::new(record.location.path.clone()),
            binding: StoreBinding::Demo {
                mode: record.identity.mode(),
                identity: record.identity.fingerprint(),
                key: record.location.key.clone(),
            },
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn binding(&self) -> &StoreBinding {
        &self.binding
    }

    /// Open a connection. Never creates the database: a vanished store is
    /// an error rather than a silently empty one.
    pub fn open_blocking(&self) -> Result<Connection, StoreError> {
        let conn = Connection::open_with_flags(
            self.path.as_path(),
            OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        Ok(conn)
    }

    /// Run `f` against a fresh connection on the blocking pool.
    pub async fn with_connection<F, T>(&self, f: F) -> Result<T, StoreError>
    where
        F: FnOnce(&mut Connection) -> Result<T, rusqlite::Error> + Send + 'static,
        T: Send + 'static,
    {
        let handle = self.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = handle.open_blocking()?;
            f(&mut conn).map_err(StoreError::from)
        })
        .await
        .map_err(|e| StoreError::Task(e.to_string()))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{apply_scripts, SCHEMA_SQL, SEED_SQL};

    #[tokio::test]
    async fn test_with_connection_reads_store() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.sqlite");
        let mut conn = Connection::open(&path).unwrap();
        apply_scripts(&mut conn, SCHEMA_SQL, SEED_SQL).unwrap();
        drop(conn);

        let handle = StoreHandle::default_store(&path);
        let count: i64 = handle
            .with_connection(|conn| conn.query_row("SELECT COUNT(*) FROM companies", [], |r| r.get(0)))
            .await
            .unwrap();
        assert_eq!(count, 2);
        assert_eq!(handle.binding(), &StoreBinding::Default);
    }

    #[tokio::test]
    async fn test_missing_store_is_not_created() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vanished.sqlite");
        let handle = StoreHandle::default_store(&path);

        let result = handle.with_connection(|_| Ok(())).await;
        assert!(matches!(result, Err(StoreError::Sqlite(_))));
        assert!(!path.exists());
    }
}
