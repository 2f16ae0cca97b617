//! Error types for demo sandbox operations

use std::path::PathBuf;
use thiserror::Error;

/// Failures while building a store for an identity.
///
/// Any of these means the store was never committed: callers must not route
/// requests to the target location.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ProvisionError {
    #[error("Template store {path:?} is unreadable: {reason}")]
    TemplateUnreadable { path: PathBuf, reason: String },

    #[error("Schema script {path:?} is unreadable: {reason}")]
    SchemaUnreadable { path: PathBuf, reason: String },

    #[error("Target {path:?} is not writable: {reason}")]
    TargetNotWritable { path: PathBuf, reason: String },

    #[error("Schema application failed: {reason}")]
    SchemaFailed { reason: String },

    #[error("Store {path:?} is missing tables {missing:?}")]
    IncompleteSchema { path: PathBuf, missing: Vec<String> },

    #[error("Store {path:?} has {violations} foreign key violations")]
    ForeignKeyViolations { path: PathBuf, violations: usize },
}

/// Failures reading or updating registry state.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("Failed to read store metadata at {path:?}: {reason}")]
    Metadata { path: PathBuf, reason: String },

    #[error("Failed to touch store at {path:?}: {reason}")]
    Touch { path: PathBuf, reason: String },

    #[error("Failed to remove {path:?}: {reason}")]
    Remove { path: PathBuf, reason: String },
}

/// Configuration errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },
}

/// Top-level error for the demo sandbox.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DemoError {
    #[error("Demo mode is not enabled")]
    DemoModeDisabled,

    #[error("Demo session not initialized")]
    IdentityNotFound,

    #[error("Demo session expired")]
    SessionExpired,

    #[error("Invalid identity: {reason}")]
    InvalidIdentity { reason: String },

    #[error("Blocking task failed: {reason}")]
    TaskFailed { reason: String },

    #[error(transparent)]
    Provision(#[from] ProvisionError),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Result alias for demo sandbox operations.
pub type DemoResult<T> = Result<T, DemoError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provision_error_wraps_into_demo_error() {
        let err: DemoError = ProvisionError::SchemaFailed {
            reason: "near \"CREAT\": syntax error".to_string(),
        }
        .into();
        assert!(matches!(err, DemoError::Provision(_)));
        assert!(err.to_string().contains("syntax error"));
    }

    #[test]
    fn test_incomplete_schema_lists_missing_tables() {
        let err = ProvisionError::IncompleteSchema {
            path: PathBuf::from("/tmp/x.sqlite"),
            missing: vec!["deals".to_string(), "notes".to_string()],
        };
        let msg = err.to_string();
        assert!(msg.contains("deals"));
        assert!(msg.contains("notes"));
    }

    #[test]
    fn test_expiry_messages() {
        assert_eq!(DemoError::SessionExpired.to_string(), "Demo session expired");
        assert_eq!(DemoError::DemoModeDisabled.to_string(), "Demo mode is not enabled");
    }
}
