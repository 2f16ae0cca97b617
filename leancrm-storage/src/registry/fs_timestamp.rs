use chrono::{DateTime, Utc};
use leancrm_core::{EphemeralIdentity, IdentityMode, RegistryError, StoreLocation, StoreRecord};
use std::io;

use super::{remove_location, IdentityRegistry};
use crate::layout::{modified_at, touch_monotonic, StoreLayout};

/// Session registry backed by store file mtimes.
#[derive(Debug, Clone)]
pub struct FsTimestampRegistry {
    layout: StoreLayout,
    ttl: chrono::Duration,
}

impl FsTimestampRegistry {
    pub fn new(layout: StoreLayout, ttl: chrono::Duration) -> Self {
        Self { layout, ttl }
    }

    fn location(&self, identity: &EphemeralIdentity) -> Option<StoreLocation> {
        match identity {
            EphemeralIdentity::Session(id) => Some(self.layout.session_location(id)),
            EphemeralIdentity::Token(_) => None,
        }
    }
}

impl IdentityRegistry for FsTimestampRegistry {
    fn mode(&self) -> IdentityMode {
        IdentityMode::Session
    }

    fn ttl(&self) -> chrono::Duration {
        self.ttl
    }

    fn locate(
        &self,
        identity: &EphemeralIdentity,
        _now: DateTime<Utc>,
    ) -> Result<Option<StoreLocation>, RegistryError> {
        Ok(self.location(identity))
    }

    fn resolve(
        &self,
        identity: &EphemeralIdentity,
        _now: DateTime<Utc>,
    ) -> Result<Option<StoreRecord>, RegistryError> {
        let Some(location) = self.location(identity) else {
            return Ok(None);
        };
        match modified_at(&location.path) {
            Ok(last_touched) => Ok(Some(StoreRecord::from_last_touch(
                identity.clone(),
                location,
                last_touched,
                self.ttl,
            ))),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(RegistryError::Metadata {
                path: location.path,
                reason: e.to_string(),
            }),
        }
    }

    fn register(
        &self,
        identity: &EphemeralIdentity,
        location: StoreLocation,
        now: DateTime<Utc>,
    ) -> Result<StoreRecord, RegistryError> {
        let touched = touch_monotonic(&location.path, now).map_err(|e| RegistryError::Touch {
            path: location.path.clone(),
            reason: e.to_string(),
        })?;
        Ok(StoreRecord::from_last_touch(
            identity.clone(),
            location,
            touched,
            self.ttl,
        ))
    }

    fn touch(&self, identity: &EphemeralIdentity, now: DateTime<Utc>) -> Result<(), RegistryError> {
        let Some(location) = self.location(identity) else {
            return Ok(());
        };
        touch_monotonic(&location.path, now)
            .map(|_| ())
            .map_err(|e| RegistryError::Touch {
                path: location.path,
                reason: e.to_string(),
            })
    }

    fn invalidate(&self, identity: &EphemeralIdentity) -> Result<(), RegistryError> {
        match self.location(identity) {
            Some(location) => remove_location(&location),
            None => Ok(()),
        }
    }
}
