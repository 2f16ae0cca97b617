//! Schema and seed scripts for demo stores, plus the completeness check run
//! before a store is committed.

use leancrm_core::ProvisionError;
use rusqlite::Connection;
use std::collections::HashSet;
use std::path::Path;

/// Built-in DDL, ordered parents before children before join tables.
pub const SCHEMA_SQL: &str = include_str!("../sql/demo_schema.sql");

/// Baseline demo rows.
pub const SEED_SQL: &str = include_str!("../sql/demo_seed.sql");

/// Tables every store must carry before it may serve requests.
pub const REQUIRED_TABLES: [&str; 12] = [
    "users",
    "personal_access_tokens",
    "companies",
    "contacts",
    "deals",
    "activities",
    "notes",
    "permissions",
    "roles",
    "model_has_permissions",
    "model_has_roles",
    "role_has_permissions",
];

/// Apply `schema` and `seed` to an open connection as one transaction.
///
/// Nothing is left behind on failure: the transaction rolls back when it is
/// dropped uncommitted.
pub fn apply_scripts(conn: &mut Connection, schema: &str, seed: &str) -> Result<(), ProvisionError> {
    conn.execute_batch("PRAGMA foreign_keys = ON;")
        .map_err(schema_failed)?;
    let tx = conn.transaction().map_err(schema_failed)?;
    tx.execute_batch(schema).map_err(schema_failed)?;
    tx.execute_batch(seed).map_err(schema_failed)?;
    tx.commit().map_err(schema_failed)
}

/// Create any missing tables in an existing database without seeding it.
/// Used for the default store when demo mode is off.
pub fn ensure_schema(path: &Path) -> Result<(), ProvisionError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).map_err(|e| ProvisionError::TargetNotWritable {
                path: parent.to_path_buf(),
                reason: e.to_string(),
            })?;
        }
    }
    let mut conn = Connection::open(path).map_err(|e| ProvisionError::TargetNotWritable {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;
    apply_scripts(&mut conn, SCHEMA_SQL, "")?;
    verify_store(path)
}

/// Check that every required table exists and no foreign key is dangling.
pub fn verify_store(path: &Path) -> Result<(), ProvisionError> {
    let conn = Connection::open(path).map_err(schema_failed)?;

    let present: HashSet<String> = {
        let mut stmt = conn
            .prepare("SELECT name FROM sqlite_master WHERE type = 'table'")
            .map_err(schema_failed)?;
        let names = stmt
            .query_map([], |row| row.get::<_, String>(0))
            .map_err(schema_failed)?;
        names
            .collect::<Result<HashSet<_>, _>>()
            .map_err(schema_failed)?
    };

    let missing: Vec<String> = REQUIRED_TABLES
        .iter()
        .filter(|table| !present.contains(**table))
        .map(|table| table.to_string())
        .collect();
    if !missing.is_empty() {
        return Err(ProvisionError::IncompleteSchema {
            path: path.to_path_buf(),
            missing,
        });
    }

    let violations = {
        let mut stmt = conn
            .prepare("PRAGMA foreign_key_check")
            .map_err(schema_failed)?;
        let mut rows = stmt.query([]).map_err(schema_failed)?;
        let mut count = 0usize;
        while rows.next().map_err(schema_failed)?.is_some() {
            count += 1;
        }
        count
    };
    if violations > 0 {
        return Err(ProvisionError::ForeignKeyViolations {
            path: path.to_path_buf(),
            violations,
        });
    }

    Ok(())
}

fn schema_failed(err: rusqlite::Error) -> ProvisionError {
    ProvisionError::SchemaFailed {
        reason: err.to_string(),
    }
}
