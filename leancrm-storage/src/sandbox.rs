//! Demo Sandbox
//!
//! Ties the provisioner, both registries, the identity locks and the reaper
//! together behind the three operations the HTTP layer needs: route a
//! request's identity to its store, issue a token, and sweep.

use chrono::{DateTime, Utc};
use leancrm_core::{
    DemoConfig, DemoError, DemoResult, EphemeralIdentity, IdentityMode, StoreLocation, StoreRecord,
};
use std::sync::Arc;
use std::time::Duration;

use crate::layout::StoreLayout;
use crate::locks::IdentityLocks;
use crate::provisioner::{ProvisionOutcome, StoreProvisioner};
use crate::reaper::{Reaper, SweepReport};
use crate::registry::{FsTimestampRegistry, IdentityRegistry, TokenCacheRegistry};

/// Result of routing one request.
#[derive(Debug, Clone)]
pub struct Resolution {
    pub record: StoreRecord,
    /// Whether this request created the store.
    pub provisioned: bool,
}

/// A newly issued demo token and its store.
#[derive(Debug, Clone)]
pub struct IssuedToken {
    pub identity: EphemeralIdentity,
    pub location: StoreLocation,
    pub expires_at: DateTime<Utc>,
    pub expires_in_secs: u64,
}

impl IssuedToken {
    pub fn token(&self) -> &str {
        self.identity.expose()
    }
}

#[derive(Debug, Clone)]
pub struct DemoSandbox {
    config: Arc<DemoConfig>,
    provisioner: Arc<StoreProvisioner>,
    sessions: Arc<FsTimestampRegistry>,
    tokens: Arc<TokenCacheRegistry>,
    reaper: Arc<Reaper>,
    locks: IdentityLocks,
}

impl DemoSandbox {
    pub fn new(config: DemoConfig) -> Self {
        let provisioner = StoreProvisioner::from_config(&config);
        Self::with_provisioner(config, provisioner)
    }

    pub fn with_provisioner(config: DemoConfig, provisioner: StoreProvisioner) -> Self {
        let layout = StoreLayout::from_config(&config);
        let sessions = FsTimestampRegistry::new(
            layout.clone(),
            config.chrono_ttl_for(IdentityMode::Session),
        );
        let tokens =
            TokenCacheRegistry::new(layout.clone(), config.chrono_ttl_for(IdentityMode::Token));
        Self {
            config: Arc::new(config),
            provisioner: Arc::new(provisioner),
            sessions: Arc::new(sessions),
            tokens: Arc::new(tokens),
            reaper: Arc::new(Reaper::new(layout)),
            locks: IdentityLocks::new(),
        }
    }

    pub fn config(&self) -> &DemoConfig {
        &self.config
    }

    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    pub fn tokens(&self) -> &TokenCacheRegistry {
        &self.tokens
    }

    pub fn registry_for(&self, mode: IdentityMode) -> Arc<dyn IdentityRegistry> {
        match mode {
            IdentityMode::Session => self.sessions.clone() as Arc<dyn IdentityRegistry>,
            IdentityMode::Token => self.tokens.clone() as Arc<dyn IdentityRegistry>,
        }
    }

    /// Resolve `identity` to its store, provisioning it when `bootstrap` is
    /// set and none exists.
    ///
    /// Fails with `IdentityNotFound` for an unknown identity outside
    /// bootstrap, and with `SessionExpired` after destroying a store whose
    /// window has lapsed. Concurrent calls for one identity are serialized,
    /// so at most one of them provisions.
    pub async fn route(
        &self,
        identity: &EphemeralIdentity,
        bootstrap: bool,
    ) -> DemoResult<Resolution> {
        if !self.config.enabled {
            return Err(DemoError::DemoModeDisabled);
        }

        let _guard = self.locks.acquire(identity).await;
        let registry = self.registry_for(identity.mode());
        let provisioner = Arc::clone(&self.provisioner);
        let identity = identity.clone();

        tokio::task::spawn_blocking(move || {
            route_blocking(&*registry, &provisioner, &identity, bootstrap, Utc::now())
        })
        .await
        .map_err(|e| DemoError::TaskFailed {
            reason: e.to_string(),
        })?
    }

    /// Issue a token and provision its store before returning it.
    pub async fn issue_token(&self) -> DemoResult<IssuedToken> {
        if !self.config.enabled {
            return Err(DemoError::DemoModeDisabled);
        }

        let (identity, location) = self.tokens.mint()?;
        let provisioner = Arc::clone(&self.provisioner);
        let target = location.clone();
        let outcome = tokio::task::spawn_blocking(move || provisioner.provision(&target))
            .await
            .map_err(|e| DemoError::TaskFailed {
                reason: e.to_string(),
            })??;

        let now = Utc::now();
        let record = self.tokens.register(&identity, location.clone(), now)?;
        tracing::info!(
            identity = %identity,
            store = %location.key,
            created = outcome.is_created(),
            "Issued demo token"
        );

        Ok(IssuedToken {
            identity,
            location,
            expires_at: record.expires_at,
            expires_in_secs: self.config.token_ttl.as_secs(),
        })
    }

    /// Run the reaper with `ttl` and drop lapsed token entries.
    pub async fn sweep(&self, ttl: Duration) -> DemoResult<SweepReport> {
        if !self.config.enabled {
            return Err(DemoError::DemoModeDisabled);
        }

        let reaper = Arc::clone(&self.reaper);
        let now = Utc::now();
        let mut report = tokio::task::spawn_blocking(move || reaper.sweep(ttl, now))
            .await
            .map_err(|e| DemoError::TaskFailed {
                reason: e.to_string(),
            })?;
        report.evicted_tokens = self.tokens.evict_expired(now) as u64;
        Ok(report)
    }

    /// Blocking variant of [`sweep`](Self::sweep) for the CLI.
    pub fn sweep_blocking(&self, ttl: Duration, now: DateTime<Utc>) -> DemoResult<SweepReport> {
        if !self.config.enabled {
            return Err(DemoError::DemoModeDisabled);
        }
        let mut report = self.reaper.sweep(ttl, now);
        report.evicted_tokens = self.tokens.evict_expired(now) as u64;
        Ok(report)
    }
}

/// The routing decision for one identity. Caller holds the identity lock.
pub fn route_blocking(
    registry: &dyn IdentityRegistry,
    provisioner: &StoreProvisioner,
    identity: &EphemeralIdentity,
    bootstrap: bool,
    now: DateTime<Utc>,
) -> DemoResult<Resolution> {
    if let Some(mut record) = registry.resolve(identity, now)? {
        if record.is_expired(now) {
            let idle = record.idle_for(now);
            registry.invalidate(identity)?;
            tracing::info!(
                identity = %identity,
                store = %record.location.key,
                elapsed_secs = idle.num_seconds(),
                "Demo store expired, destroyed at access"
            );
            return Err(DemoError::SessionExpired);
        }

        registry.touch(identity, now)?;
        record.touch(now, registry.ttl());
        return Ok(Resolution {
            record,
            provisioned: false,
        });
    }

    if !bootstrap {
        return Err(DemoError::IdentityNotFound);
    }

    let location = registry
        .locate(identity, now)?
        .ok_or(DemoError::IdentityNotFound)?;
    let outcome = provisioner.provision(&location)?;
    let record = registry.register(identity, location, now)?;
    if let ProvisionOutcome::Created(source) = outcome {
        tracing::info!(
            identity = %identity,
            store = %record.location.key,
            source = ?source,
            "Provisioned demo store"
        );
    }

    Ok(Resolution {
        record,
        provisioned: outcome.is_created(),
    })
}
