//! API Configuration Module
//!
//! CORS and rate limiting settings. Demo sandbox settings live in
//! [`leancrm_core::DemoConfig`]. Configuration is loaded from environment
//! variables with defaults suitable for development.

// ============================================================================
// API CONFIGURATION
// ============================================================================

#[derive(Debug, Clone)]
pub struct ApiConfig {
    // ========================================================================
    // CORS Configuration
    // ========================================================================
    /// Allowed CORS origins (comma-separated in env var).
    /// Empty means allow all origins (dev mode).
    pub cors_origins: Vec<String>,

    /// Whether to allow credentials in CORS requests.
    pub cors_allow_credentials: bool,

    /// Max age for CORS preflight cache in seconds.
    pub cors_max_age_secs: u64,

    // ========================================================================
    // Rate Limiting Configuration
    // ========================================================================
    pub rate_limit_enabled: bool,

    /// Requests per minute for API routes, per identity or client IP.
    pub rate_limit_api: u32,

    /// Requests per minute for auth routes, per identity or client IP.
    pub rate_limit_auth: u32,

    /// Burst capacity on top of the per-minute quota.
    pub rate_limit_burst: u32,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            cors_origins: Vec::new(),
            cors_allow_credentials: false,
            cors_max_age_secs: 86400,

            rate_limit_enabled: true,
            rate_limit_api: 60,
            rate_limit_auth: 5,
            rate_limit_burst: 0,
        }
    }
}

impl ApiConfig {
    /// Create ApiConfig from environment variables.
    ///
    /// Environment variables:
    /// - `LEANCRM_CORS_ORIGINS`: Comma-separated allowed origins (empty = allow all)
    /// - `LEANCRM_CORS_ALLOW_CREDENTIALS`: "true" or "false" (default: false)
    /// - `LEANCRM_CORS_MAX_AGE_SECS`: Preflight cache duration (default: 86400)
    /// - `LEANCRM_RATE_LIMIT_ENABLED`: "true" or "false" (default: true)
    /// - `LEANCRM_RATE_LIMIT_API`: Requests per minute on API routes (default: 60)
    /// - `LEANCRM_RATE_LIMIT_AUTH`: Requests per minute on auth routes (default: 5)
    /// - `LEANCRM_RATE_LIMIT_BURST`: Extra burst capacity (default: 0)
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let cors_origins = lookup("LEANCRM_CORS_ORIGINS")
            .map(|s| {
                s.split(',')
                    .map(|o| o.trim().to_string())
                    .filter(|o| !o.is_empty())
                    .collect()
            })
            .unwrap_or_default();

        let cors_allow_credentials = lookup("LEANCRM_CORS_ALLOW_CREDENTIALS")
            .map(|s| s.to_lowercase() == "true")
            .unwrap_or(defaults.cors_allow_credentials);

        let cors_max_age_secs = lookup("LEANCRM_CORS_MAX_AGE_SECS")
            .and_then(|s| s.parse().ok())
            .unwrap_or(defaults.cors_max_age_secs);

        let rate_limit_enabled = lookup("LEANCRM_RATE_LIMIT_ENABLED")
            .map(|s| s.to_lowercase() != "false")
            .unwrap_or(defaults.rate_limit_enabled);

        let rate_limit_api = lookup("LEANCRM_RATE_LIMIT_API")
            .and_then(|s| s.parse().ok())
            .unwrap_or(defaults.rate_limit_api);

        let rate_limit_auth = lookup("LEANCRM_RATE_LIMIT_AUTH")
            .and_then(|s| s.parse().ok())
            .unwrap_or(defaults.rate_limit_auth);

        let rate_limit_burst = lookup("LEANCRM_RATE_LIMIT_BURST")
            .and_then(|s| s.parse().ok())
            .unwrap_or(defaults.rate_limit_burst);

        Self {
            cors_origins,
            cors_allow_credentials,
            cors_max_age_secs,
            rate_limit_enabled,
            rate_limit_api,
            rate_limit_auth,
            rate_limit_burst,
        }
    }

    /// Rate limiting switched off, for tests that drive many requests.
    pub fn unthrottled() -> Self {
        Self {
            rate_limit_enabled: false,
            ..Self::default()
        }
    }
}
