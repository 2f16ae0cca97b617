use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use leancrm_core::{EphemeralIdentity, IdentityMode, RegistryError, StoreLocation, StoreRecord};
use rand::RngCore;
use std::io;
use uuid::Uuid;

use super::{remove_location, IdentityRegistry};
use crate::layout::{touch_monotonic, StoreLayout};

/// Random bytes behind each issued token.
pub const TOKEN_BYTES: usize = 64;

/// Generate a URL-safe demo token carrying [`TOKEN_BYTES`] of entropy.
pub fn generate_token() -> String {
    let mut bytes = [0u8; TOKEN_BYTES];
    rand::rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Process-wide token registry with fixed per-entry expiry.
///
/// Expired entries are evicted on lookup and by [`evict_expired`]; once gone
/// the token is unknown even if its store file still exists on disk.
///
/// [`evict_expired`]: TokenCacheRegistry::evict_expired
#[derive(Debug)]
pub struct TokenCacheRegistry {
    layout: StoreLayout,
    ttl: chrono::Duration,
    entries: DashMap<String, StoreRecord>,
}

impl TokenCacheRegistry {
    pub fn new(layout: StoreLayout, ttl: chrono::Duration) -> Self {
        Self {
            layout,
            ttl,
            entries: DashMap::new(),
        }
    }

    /// Fresh token identity and the location its store will occupy.
    /// Nothing is recorded until [`IdentityRegistry::register`].
    pub fn mint(&self) -> Result<(EphemeralIdentity, StoreLocation), RegistryError> {
        let identity =
            EphemeralIdentity::token(generate_token()).map_err(|e| RegistryError::Metadata {
                path: self.layout.tokens_dir().to_path_buf(),
                reason: e.to_string(),
            })?;
        let location = self.layout.token_location(Uuid::new_v4());
        Ok((identity, location))
    }

    /// Drop lapsed entries. Returns how many were removed.
    pub fn evict_expired(&self, now: DateTime<Utc>) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, record| !record.is_expired(now));
        before.saturating_sub(self.entries.len())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Live entry for `identity`, evicting it first if it has lapsed.
    fn live_entry(&self, identity: &EphemeralIdentity, now: DateTime<Utc>) -> Option<StoreRecord> {
        let EphemeralIdentity::Token(token) = identity else {
            return None;
        };
        if self
            .entries
            .remove_if(token, |_, record| record.is_expired(now))
            .is_some()
        {
            tracing::debug!(identity = %identity, "Token entry lapsed");
            return None;
        }
        self.entries.get(token).map(|entry| entry.value().clone())
    }
}

impl IdentityRegistry for TokenCacheRegistry {
    fn mode(&self) -> IdentityMode {
        IdentityMode::Token
    }

    fn ttl(&self) -> chrono::Duration {
        self.ttl
    }

    fn locate(
        &self,
        identity: &EphemeralIdentity,
        now: DateTime<Utc>,
    ) -> Result<Option<StoreLocation>, RegistryError> {
        Ok(self.live_entry(identity, now).map(|record| record.location))
    }

    fn resolve(
        &self,
        identity: &EphemeralIdentity,
        now: DateTime<Utc>,
    ) -> Result<Option<StoreRecord>, RegistryError> {
        Ok(self
            .live_entry(identity, now)
            .filter(|record| record.location.exists()))
    }

    fn register(
        &self,
        identity: &EphemeralIdentity,
        location: StoreLocation,
        now: DateTime<Utc>,
    ) -> Result<StoreRecord, RegistryError> {
        let EphemeralIdentity::Token(token) = identity else {
            return Err(RegistryError::Metadata {
                path: location.path,
                reason: "session identity offered to the token registry".to_string(),
            });
        };
        let record = match self.live_entry(identity, now) {
            Some(existing) if existing.location == location => existing,
            _ => StoreRecord::new(identity.clone(), location, now, self.ttl),
        };
        self.entries.insert(token.clone(), record.clone());
        Ok(record)
    }

    fn touch(&self, identity: &EphemeralIdentity, now: DateTime<Utc>) -> Result<(), RegistryError> {
        let EphemeralIdentity::Token(token) = identity else {
            return Ok(());
        };
        let path = match self.entries.get_mut(token) {
            Some(mut entry) => {
                entry.touch(now, self.ttl);
                entry.location.path.clone()
            }
            None => return Ok(()),
        };
        // Keeps the reaper from reclaiming a store that is still in use.
        match touch_monotonic(&path, now) {
            Ok(_) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(RegistryError::Touch {
                path,
                reason: e.to_string(),
            }),
        }
    }

    fn invalidate(&self, identity: &EphemeralIdentity) -> Result<(), RegistryError> {
        let EphemeralIdentity::Token(token) = identity else {
            return Ok(());
        };
        match self.entries.remove(token) {
            Some((_, record)) => remove_location(&record.location),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use leancrm_core::DemoConfig;
    use std::fs;

    fn registry(root: &std::path::Path) -> TokenCacheRegistry {
        let layout = StoreLayout::from_config(&DemoConfig::with_storage_root(root));
        TokenCacheRegistry::new(layout, Duration::minutes(30))
    }

    fn register_with_file(registry: &TokenCacheRegistry, now: DateTime<Utc>) -> EphemeralIdentity {
        let (identity, location) = registry.mint().unwrap();
        fs::create_dir_all(location.path.parent().unwrap()).unwrap();
        fs::write(&location.path, b"").unwrap();
        registry.register(&identity, location, now).unwrap();
        identity
    }

    #[test]
    fn test_generated_token_shape() {
        let token = generate_token();
        assert_eq!(token.len(), 86);
        assert!(token
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
        assert_ne!(token, generate_token());
    }

    #[test]
    fn test_lookup_within_ttl() {
        let root = tempfile::tempdir().unwrap();
        let registry = registry(root.path());
        let now = Utc::now();
        let identity = register_with_file(&registry, now);

        let record = registry
            .resolve(&identity, now + Duration::minutes(29))
            .unwrap()
            .unwrap();
        assert_eq!(record.expires_at, now + Duration::minutes(30));
    }

    #[test]
    fn test_lookup_after_ttl_is_not_found_but_file_remains() {
        let root = tempfile::tempdir().unwrap();
        let registry = registry(root.path());
        let now = Utc::now();
        let identity = register_with_file(&registry, now);
        let path = registry.locate(&identity, now).unwrap().unwrap().path;

        let later = now + Duration::minutes(31);
        assert!(registry.resolve(&identity, later).unwrap().is_none());
        assert!(registry.locate(&identity, later).unwrap().is_none());
        assert!(registry.is_empty());
        assert!(path.exists());
    }

    #[test]
    fn test_touch_does_not_extend_token_lifetime() {
        let root = tempfile::tempdir().unwrap();
        let registry = registry(root.path());
        let now = Utc::now();
        let identity = register_with_file(&registry, now);

        registry.touch(&identity, now + Duration::minutes(20)).unwrap();
        let record = registry
            .resolve(&identity, now + Duration::minutes(25))
            .unwrap()
            .unwrap();
        assert_eq!(record.expires_at, now + Duration::minutes(30));
        assert_eq!(record.last_touched_at, now + Duration::minutes(20));
    }

    #[test]
    fn test_evict_expired() {
        let root = tempfile::tempdir().unwrap();
        let registry = registry(root.path());
        let now = Utc::now();
        register_with_file(&registry, now - Duration::minutes(45));
        register_with_file(&registry, now);

        assert_eq!(registry.evict_expired(now), 1);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_unknown_token() {
        let root = tempfile::tempdir().unwrap();
        let registry = registry(root.path());
        let stranger = EphemeralIdentity::token(generate_token()).unwrap();
        assert!(registry.resolve(&stranger, Utc::now()).unwrap().is_none());
        registry.touch(&stranger, Utc::now()).unwrap();
    }
}
