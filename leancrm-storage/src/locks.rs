//! Per-identity async locks.
//!
//! Serializes resolve-or-provision for one identity. Different identities
//! never contend. Map entries are dropped once the last holder or waiter
//! lets go, so the map only holds identities with work in flight.

use dashmap::DashMap;
use leancrm_core::EphemeralIdentity;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

#[derive(Debug, Clone, Default)]
pub struct IdentityLocks {
    inner: Arc<DashMap<String, Arc<Mutex<()>>>>,
}

impl IdentityLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `identity`.
    pub async fn acquire(&self, identity: &EphemeralIdentity) -> IdentityGuard {
        let key = identity.lock_key();
        let mutex = self
            .inner
            .entry(key.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .value()
            .clone();
        let guard = mutex.lock_owned().await;
        IdentityGuard {
            guard: Some(guard),
            key,
            locks: Arc::clone(&self.inner),
        }
    }

    /// Identities currently locked or waited on.
    pub fn in_flight(&self) -> usize {
        self.inner.len()
    }
}

/// Held for the duration of one identity's critical section.
#[derive(Debug)]
pub struct IdentityGuard {
    guard: Option<OwnedMutexGuard<()>>,
    key: String,
    locks: Arc<DashMap<String, Arc<Mutex<()>>>>,
}

impl Drop for IdentityGuard {
    fn drop(&mut self) {
        drop(self.guard.take());
        self.locks
            .remove_if(&self.key, |_, mutex| Arc::strong_count(mutex) == 1);
    }
}
