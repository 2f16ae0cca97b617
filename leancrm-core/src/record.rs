//! Store locations and registry records

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::identity::{EphemeralIdentity, IdentityMode};

/// Where a store lives on disk.
///
/// `key` names the store inside its mode directory and is also the name of
/// its upload directory.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StoreLocation {
    pub key: String,
    pub path: PathBuf,
    pub upload_dir: PathBuf,
}

impl StoreLocation {
    pub fn new(key: impl Into<String>, path: PathBuf, upload_dir: PathBuf) -> Self {
        Self {
            key: key.into(),
            path,
            upload_dir,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.is_file()
    }
}

/// How a record's expiry reacts to a touch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExpiryPolicy {
    /// Every touch pushes `expires_at` to `last_touched_at + ttl`.
    Sliding,
    /// `expires_at` is fixed at creation.
    Fixed,
}

impl From<IdentityMode> for ExpiryPolicy {
    fn from(mode: IdentityMode) -> Self {
        match mode {
            IdentityMode::Session => ExpiryPolicy::Sliding,
            IdentityMode::Token => ExpiryPolicy::Fixed,
        }
    }
}

/// Registry entry for one identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreRecord {
    pub identity: EphemeralIdentity,
    pub location: StoreLocation,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub last_touched_at: DateTime<Utc>,
    pub policy: ExpiryPolicy,
}

impl StoreRecord {
    /// Fresh record created at `now`.
    pub fn new(
        identity: EphemeralIdentity,
        location: StoreLocation,
        now: DateTime<Utc>,
        ttl: Duration,
    ) -> Self {
        let policy = ExpiryPolicy::from(identity.mode());
        Self {
            identity,
            location,
            created_at: now,
            expires_at: deadline(now, ttl),
            last_touched_at: now,
            policy,
        }
    }

    /// Record whose only known timestamp is the last activity, as with
    /// mtime-backed session stores.
    pub fn from_last_touch(
        identity: EphemeralIdentity,
        location: StoreLocation,
        last_touched_at: DateTime<Utc>,
        ttl: Duration,
    ) -> Self {
        let policy = ExpiryPolicy::from(identity.mode());
        Self {
            identity,
            location,
            created_at: last_touched_at,
            expires_at: deadline(last_touched_at, ttl),
            last_touched_at,
            policy,
        }
    }

    /// Expired strictly after the deadline; a request exactly at
    /// `expires_at` is still served.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }

    /// Time since last activity, clamped at zero for skewed clocks.
    pub fn idle_for(&self, now: DateTime<Utc>) -> Duration {
        let elapsed = now.signed_duration_since(self.last_touched_at);
        if elapsed < Duration::zero() {
            Duration::zero()
        } else {
            elapsed
        }
    }

    /// Refresh activity. Never moves `last_touched_at` backward.
    pub fn touch(&mut self, now: DateTime<Utc>, ttl: Duration) {
        if now > self.last_touched_at {
            self.last_touched_at = now;
        }
        if self.policy == ExpiryPolicy::Sliding {
            let candidate = deadline(self.last_touched_at, ttl);
            if candidate > self.expires_at {
                self.expires_at = candidate;
            }
        }
    }
}

fn deadline(from: DateTime<Utc>, ttl: Duration) -> DateTime<Utc> {
    from.checked_add_signed(ttl).unwrap_or(DateTime::<Utc>::MAX_UTC)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn location() -> StoreLocation {
        StoreLocation::new(
            "session_abc",
            PathBuf::from("/tmp/session_abc.sqlite"),
            PathBuf::from("/tmp/uploads/session_abc"),
        )
    }

    fn session() -> EphemeralIdentity {
        EphemeralIdentity::session("abc").unwrap()
    }

    fn token() -> EphemeralIdentity {
        EphemeralIdentity::token("t".repeat(86)).unwrap()
    }

    #[test]
    fn test_expiry_boundary() {
        let t0 = Utc::now();
        let ttl = Duration::minutes(60);
        let record = StoreRecord::new(session(), location(), t0, ttl);

        assert!(!record.is_expired(t0 + ttl - Duration::milliseconds(1)));
        assert!(!record.is_expired(t0 + ttl));
        assert!(record.is_expired(t0 + ttl + Duration::milliseconds(1)));
    }

    #[test]
    fn test_sliding_touch_extends_expiry() {
        let t0 = Utc::now();
        let ttl = Duration::minutes(60);
        let mut record = StoreRecord::new(session(), location(), t0, ttl);
        record.touch(t0 + Duration::minutes(50), ttl);

        assert!(!record.is_expired(t0 + Duration::minutes(100)));
        assert_eq!(record.expires_at, t0 + Duration::minutes(110));
    }

    #[test]
    fn test_fixed_touch_keeps_expiry() {
        let t0 = Utc::now();
        let ttl = Duration::minutes(30);
        let mut record = StoreRecord::new(token(), location(), t0, ttl);
        record.touch(t0 + Duration::minutes(20), ttl);

        assert_eq!(record.expires_at, t0 + ttl);
        assert_eq!(record.last_touched_at, t0 + Duration::minutes(20));
    }

    #[test]
    fn test_late_touch_does_not_rewind() {
        let t0 = Utc::now();
        let ttl = Duration::minutes(60);
        let mut record = StoreRecord::new(session(), location(), t0, ttl);
        record.touch(t0 + Duration::minutes(10), ttl);
        record.touch(t0 + Duration::minutes(5), ttl);

        assert_eq!(record.last_touched_at, t0 + Duration::minutes(10));
        assert_eq!(record.expires_at, t0 + Duration::minutes(70));
    }

    #[test]
    fn test_huge_ttl_saturates() {
        let record = StoreRecord::new(session(), location(), Utc::now(), Duration::MAX);
        assert_eq!(record.expires_at, DateTime::<Utc>::MAX_UTC);
    }

    proptest! {
        #[test]
        fn prop_touch_is_monotonic(offsets in proptest::collection::vec(0i64..100_000, 1..20)) {
            let t0 = Utc::now();
            let ttl = Duration::minutes(60);
            let mut record = StoreRecord::new(session(), location(), t0, ttl);
            let mut previous = record.last_touched_at;
            for offset in offsets {
                record.touch(t0 + Duration::seconds(offset), ttl);
                prop_assert!(record.last_touched_at >= previous);
                prop_assert!(record.expires_at - record.last_touched_at <= ttl);
                previous = record.last_touched_at;
            }
        }

        #[test]
        fn prop_lifetime_bounded_by_ttl(minutes in 1i64..10_000) {
            let t0 = Utc::now();
            let ttl = Duration::minutes(minutes);
            let record = StoreRecord::new(token(), location(), t0, ttl);
            prop_assert!(record.expires_at - record.created_at <= ttl);
        }
    }
}
