//! Demo sandbox configuration
//!
//! Loaded from environment variables with defaults suitable for local
//! development. All store paths hang off a single storage root:
//!
//! ```text
//! <root>/demo_databases/session_<id>.sqlite
//! <root>/app/demo/tokens/<uuid>.sqlite
//! <root>/app/demo/uploads/<store key>/
//! <root>/app/demo/template.sqlite
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::ConfigError;
use crate::identity::IdentityMode;

const DEFAULT_STORAGE_ROOT: &str = "storage";
const DEFAULT_SESSION_COOKIE: &str = "leancrm_session";
const DEFAULT_SESSION_TTL_MINUTES: u64 = 60;
const DEFAULT_TOKEN_TTL_MINUTES: u64 = 30;
const DEFAULT_PURGE_INTERVAL_SECS: u64 = 300;
const DEFAULT_PURGE_TTL_MINUTES: u64 = 60;

// ============================================================================
// DEMO CONFIGURATION
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DemoConfig {
    /// Global demo-mode switch. When off, requests use the default store.
    pub enabled: bool,

    pub storage_root: PathBuf,

    /// Store used by every request when demo mode is off.
    pub default_database_path: PathBuf,

    /// Pre-built store copied byte-for-byte when present.
    pub template_path: PathBuf,

    /// Optional DDL script replacing the built-in schema.
    pub schema_path: Option<PathBuf>,

    /// Sliding idle window for session stores.
    pub session_ttl: Duration,

    /// Fixed lifetime of issued tokens.
    pub token_ttl: Duration,

    pub session_cookie: String,

    /// Interval of the in-process purge task.
    pub purge_interval: Duration,

    /// Idle age after which the purge task reclaims a store.
    pub purge_ttl: Duration,
}

impl Default for DemoConfig {
    fn default() -> Self {
        Self::with_storage_root(DEFAULT_STORAGE_ROOT)
    }
}

impl DemoConfig {
    /// Defaults rooted at `root`. Demo mode stays off.
    pub fn with_storage_root(root: impl AsRef<Path>) -> Self {
        let root = root.as_ref().to_path_buf();
        Self {
            enabled: false,
            default_database_path: root.join("leancrm.sqlite"),
            template_path: root.join("app").join("demo").join("template.sqlite"),
            schema_path: None,
            session_ttl: Duration::from_secs(DEFAULT_SESSION_TTL_MINUTES * 60),
            token_ttl: Duration::from_secs(DEFAULT_TOKEN_TTL_MINUTES * 60),
            session_cookie: DEFAULT_SESSION_COOKIE.to_string(),
            purge_interval: Duration::from_secs(DEFAULT_PURGE_INTERVAL_SECS),
            purge_ttl: Duration::from_secs(DEFAULT_PURGE_TTL_MINUTES * 60),
            storage_root: root,
        }
    }

    /// Enabled configuration rooted at `root`, used by tests and tooling.
    pub fn enabled_at(root: impl AsRef<Path>) -> Self {
        Self {
            enabled: true,
            ..Self::with_storage_root(root)
        }
    }

    /// Create DemoConfig from environment variables.
    ///
    /// Environment variables:
    /// - `LEANCRM_DEMO`: "true"/"1" enables demo mode (default: false)
    /// - `LEANCRM_STORAGE_PATH`: storage root (default: storage)
    /// - `LEANCRM_DATABASE_PATH`: default store (default: <root>/leancrm.sqlite)
    /// - `LEANCRM_DEMO_TEMPLATE_PATH`: template store (default: <root>/app/demo/template.sqlite)
    /// - `LEANCRM_DEMO_SCHEMA_PATH`: DDL script override (default: built-in)
    /// - `LEANCRM_DEMO_SESSION_TTL_MINUTES`: session idle window (default: 60)
    /// - `LEANCRM_DEMO_TOKEN_TTL_MINUTES`: token lifetime (default: 30)
    /// - `LEANCRM_SESSION_COOKIE`: session cookie name (default: leancrm_session)
    /// - `LEANCRM_DEMO_PURGE_INTERVAL_SECS`: purge task interval (default: 300)
    /// - `LEANCRM_DEMO_PURGE_TTL_MINUTES`: purge task TTL (default: 60)
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup. `from_env` passes the process
    /// environment.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let root = lookup("LEANCRM_STORAGE_PATH")
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_STORAGE_ROOT.to_string());
        let defaults = Self::with_storage_root(root);

        let enabled = lookup("LEANCRM_DEMO")
            .map(|s| matches!(s.trim().to_lowercase().as_str(), "true" | "1" | "yes"))
            .unwrap_or(false);

        let minutes = |key: &str, default: u64| {
            lookup(key)
                .and_then(|s| s.trim().parse::<u64>().ok())
                .map(|m| Duration::from_secs(m.saturating_mul(60)))
                .unwrap_or(Duration::from_secs(default * 60))
        };

        Self {
            enabled,
            default_database_path: lookup("LEANCRM_DATABASE_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.default_database_path),
            template_path: lookup("LEANCRM_DEMO_TEMPLATE_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.template_path),
            schema_path: lookup("LEANCRM_DEMO_SCHEMA_PATH")
                .filter(|s| !s.trim().is_empty())
                .map(PathBuf::from),
            session_ttl: minutes("LEANCRM_DEMO_SESSION_TTL_MINUTES", DEFAULT_SESSION_TTL_MINUTES),
            token_ttl: minutes("LEANCRM_DEMO_TOKEN_TTL_MINUTES", DEFAULT_TOKEN_TTL_MINUTES),
            session_cookie: lookup("LEANCRM_SESSION_COOKIE")
                .filter(|s| !s.trim().is_empty())
                .unwrap_or(defaults.session_cookie),
            purge_interval: lookup("LEANCRM_DEMO_PURGE_INTERVAL_SECS")
                .and_then(|s| s.trim().parse::<u64>().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.purge_interval),
            purge_ttl: minutes("LEANCRM_DEMO_PURGE_TTL_MINUTES", DEFAULT_PURGE_TTL_MINUTES),
            storage_root: defaults.storage_root,
        }
    }

    /// Reject configurations that would expire stores immediately.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let checks = [
            ("session_ttl", self.session_ttl),
            ("token_ttl", self.token_ttl),
            ("purge_interval", self.purge_interval),
            ("purge_ttl", self.purge_ttl),
        ];
        for (field, value) in checks {
            if value.is_zero() {
                return Err(ConfigError::InvalidValue {
                    field: field.to_string(),
                    reason: "must be greater than zero".to_string(),
                });
            }
        }
        if self.session_cookie.is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "session_cookie".to_string(),
                reason: "must not be empty".to_string(),
            });
        }
        Ok(())
    }

    pub fn sessions_dir(&self) -> PathBuf {
        self.storage_root.join("demo_databases")
    }

    pub fn tokens_dir(&self) -> PathBuf {
        self.storage_root.join("app").join("demo").join("tokens")
    }

    pub fn uploads_dir(&self) -> PathBuf {
        self.storage_root.join("app").join("demo").join("uploads")
    }

    /// TTL applied to identities of the given mode.
    pub fn ttl_for(&self, mode: IdentityMode) -> Duration {
        match mode {
            IdentityMode::Session => self.session_ttl,
            IdentityMode::Token => self.token_ttl,
        }
    }

    /// Same as [`ttl_for`](Self::ttl_for), as a chrono duration for record math.
    pub fn chrono_ttl_for(&self, mode: IdentityMode) -> chrono::Duration {
        to_chrono(self.ttl_for(mode))
    }
}

/// Convert a std duration, saturating at chrono's maximum.
pub fn to_chrono(duration: Duration) -> chrono::Duration {
    chrono::Duration::from_std(duration).unwrap_or(chrono::Duration::MAX)
}
