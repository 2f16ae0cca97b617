//! Identity Registry
//!
//! Maps an ephemeral identity to its store. Two backends share one trait:
//!
//! - [`FsTimestampRegistry`] for session identities: no registry state at
//!   all, the store file's existence and mtime are the record.
//! - [`TokenCacheRegistry`] for issued tokens: a process-wide cache whose
//!   entries disappear at their fixed expiry.
//!
//! Every method does blocking filesystem work and is meant to be called
//! from the blocking pool while the caller holds the identity's lock.

mod fs_timestamp;
mod token_cache;

pub use fs_timestamp::FsTimestampRegistry;
pub use token_cache::{generate_token, TokenCacheRegistry, TOKEN_BYTES};

use chrono::{DateTime, Utc};
use leancrm_core::{EphemeralIdentity, IdentityMode, RegistryError, StoreLocation, StoreRecord};

pub trait IdentityRegistry: Send + Sync {
    /// Addressing mode this registry serves.
    fn mode(&self) -> IdentityMode;

    /// Idle window or fixed lifetime applied to records.
    fn ttl(&self) -> chrono::Duration;

    /// Where the identity's store lives or would be created. `None` when the
    /// registry does not know the identity.
    fn locate(
        &self,
        identity: &EphemeralIdentity,
        now: DateTime<Utc>,
    ) -> Result<Option<StoreLocation>, RegistryError>;

    /// Current record for a committed store. `None` covers unknown
    /// identities, lapsed registry entries, and missing store files.
    ///
    /// The returned record may already be expired; deciding what to do about
    /// that is the caller's job.
    fn resolve(
        &self,
        identity: &EphemeralIdentity,
        now: DateTime<Utc>,
    ) -> Result<Option<StoreRecord>, RegistryError>;

    /// Record a freshly provisioned store.
    fn register(
        &self,
        identity: &EphemeralIdentity,
        location: StoreLocation,
        now: DateTime<Utc>,
    ) -> Result<StoreRecord, RegistryError>;

    /// Refresh activity. Never moves the last-touched time backward.
    fn touch(&self, identity: &EphemeralIdentity, now: DateTime<Utc>) -> Result<(), RegistryError>;

    /// Forget the identity and delete its store and upload directory.
    fn invalidate(&self, identity: &EphemeralIdentity) -> Result<(), RegistryError>;
}

pub(crate) fn remove_location(location: &StoreLocation) -> Result<(), RegistryError> {
    crate::layout::remove_store_file(&location.path).map_err(|e| RegistryError::Remove {
        path: location.path.clone(),
        reason: e.to_string(),
    })?;
    crate::layout::remove_dir_if_exists(&location.upload_dir).map_err(|e| RegistryError::Remove {
        path: location.upload_dir.clone(),
        reason: e.to_string(),
    })?;
    Ok(())
}
