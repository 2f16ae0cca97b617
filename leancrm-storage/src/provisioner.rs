//! Store Provisioner
//!
//! Builds a complete store under a temporary name next to its final
//! location, verifies it, and commits it with a no-clobber rename. A caller
//! that loses the rename race reuses the winner's store.

use leancrm_core::{DemoConfig, ProvisionError, StoreLocation};
use rusqlite::Connection;
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

use crate::layout::{STORE_EXTENSION, TEMP_PREFIX};
use crate::schema::{apply_scripts, verify_store, SCHEMA_SQL, SEED_SQL};

/// Where a new store's contents came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProvisionSource {
    Template,
    Script,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProvisionOutcome {
    /// This call committed a new store.
    Created(ProvisionSource),
    /// A committed store was already in place.
    Reused,
}

impl ProvisionOutcome {
    pub fn is_created(&self) -> bool {
        matches!(self, ProvisionOutcome::Created(_))
    }
}

#[derive(Debug, Clone)]
pub struct StoreProvisioner {
    template_path: Option<PathBuf>,
    schema_path: Option<PathBuf>,
}

impl StoreProvisioner {
    pub fn new(template_path: Option<PathBuf>, schema_path: Option<PathBuf>) -> Self {
        Self {
            template_path,
            schema_path,
        }
    }

    pub fn from_config(config: &DemoConfig) -> Self {
        Self::new(Some(config.template_path.clone()), config.schema_path.clone())
    }

    /// Provisioner that always runs the schema script, ignoring any template.
    pub fn script_only(schema_path: Option<PathBuf>) -> Self {
        Self::new(None, schema_path)
    }

    /// Create the store at `location` unless one is already committed there.
    ///
    /// Blocking: run it on the blocking pool.
    pub fn provision(&self, location: &StoreLocation) -> Result<ProvisionOutcome, ProvisionError> {
        if location.exists() {
            ensure_dir(&location.upload_dir)?;
            return Ok(ProvisionOutcome::Reused);
        }

        let target_dir = location
            .path
            .parent()
            .ok_or_else(|| ProvisionError::TargetNotWritable {
                path: location.path.clone(),
                reason: "store path has no parent directory".to_string(),
            })?;
        ensure_dir(target_dir)?;

        let mut staged = tempfile::Builder::new()
            .prefix(TEMP_PREFIX)
            .suffix(&format!(".{}", STORE_EXTENSION))
            .tempfile_in(target_dir)
            .map_err(|e| not_writable(target_dir, e))?;

        let source = match self.usable_template() {
            Some(template) => {
                copy_template(template, &mut staged)?;
                ProvisionSource::Template
            }
            None => {
                let schema = self.schema_script()?;
                let mut conn = Connection::open(staged.path()).map_err(|e| {
                    ProvisionError::TargetNotWritable {
                        path: staged.path().to_path_buf(),
                        reason: e.to_string(),
                    }
                })?;
                apply_scripts(&mut conn, &schema, SEED_SQL)?;
                conn.close().map_err(|(_, e)| ProvisionError::SchemaFailed {
                    reason: e.to_string(),
                })?;
                ProvisionSource::Script
            }
        };

        verify_store(staged.path())?;
        ensure_dir(&location.upload_dir)?;

        match staged.persist_noclobber(&location.path) {
            Ok(_) => {
                tracing::debug!(
                    store = %location.key,
                    source = ?source,
                    "Committed demo store"
                );
                Ok(ProvisionOutcome::Created(source))
            }
            Err(e) if e.error.kind() == io::ErrorKind::AlreadyExists => {
                tracing::debug!(store = %location.key, "Store committed concurrently, reusing it");
                Ok(ProvisionOutcome::Reused)
            }
            Err(e) => Err(not_writable(&location.path, e.error)),
        }
    }

    fn usable_template(&self) -> Option<&Path> {
        self.template_path
            .as_deref()
            .filter(|path| path.is_file())
    }

    fn schema_script(&self) -> Result<String, ProvisionError> {
        match &self.schema_path {
            Some(path) => fs::read_to_string(path).map_err(|e| ProvisionError::SchemaUnreadable {
                path: path.clone(),
                reason: e.to_string(),
            }),
            None => Ok(SCHEMA_SQL.to_string()),
        }
    }
}

/// Write a fully provisioned store to `target`, replacing any existing file.
/// Later provisioning copies it instead of running the scripts.
pub fn build_template(target: &Path, schema_path: Option<PathBuf>) -> Result<(), ProvisionError> {
    let dir = target
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    ensure_dir(dir)?;

    let staged = tempfile::Builder::new()
        .prefix(TEMP_PREFIX)
        .suffix(&format!(".{}", STORE_EXTENSION))
        .tempfile_in(dir)
        .map_err(|e| not_writable(dir, e))?;

    let schema = StoreProvisioner::script_only(schema_path).schema_script()?;
    let mut conn = Connection::open(staged.path()).map_err(|e| ProvisionError::TargetNotWritable {
        path: staged.path().to_path_buf(),
        reason: e.to_string(),
    })?;
    apply_scripts(&mut conn, &schema, SEED_SQL)?;
    conn.close().map_err(|(_, e)| ProvisionError::SchemaFailed {
        reason: e.to_string(),
    })?;
    verify_store(staged.path())?;

    staged
        .persist(target)
        .map_err(|e| not_writable(target, e.error))?;
    Ok(())
}

fn copy_template(template: &Path, staged: &mut NamedTempFile) -> Result<(), ProvisionError> {
    let mut source = File::open(template).map_err(|e| ProvisionError::TemplateUnreadable {
        path: template.to_path_buf(),
        reason: e.to_string(),
    })?;
    io::copy(&mut source, staged.as_file_mut()).map_err(|e| ProvisionError::TemplateUnreadable {
        path: template.to_path_buf(),
        reason: e.to_string(),
    })?;
    staged
        .as_file()
        .sync_all()
        .map_err(|e| not_writable(staged.path(), e))
}

fn ensure_dir(path: &Path) -> Result<(), ProvisionError> {
    fs::create_dir_all(path).map_err(|e| not_writable(path, e))
}

fn not_writable(path: &Path, err: io::Error) -> ProvisionError {
    ProvisionError::TargetNotWritable {
        path: path.to_path_buf(),
        reason: err.to_string(),
    }
}
