//! Ephemeral identities
//!
//! An identity is the key a demo tenant is known by: either the session id
//! handed out by the session layer, or an issued demo token. Both are secrets,
//! so `Debug` and `Display` only ever show a short fingerprint.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

use crate::error::DemoError;

/// Longest session id accepted from a cookie.
pub const MAX_SESSION_ID_LEN: usize = 128;

/// Token length bounds (characters).
pub const MIN_TOKEN_LEN: usize = 32;
pub const MAX_TOKEN_LEN: usize = 256;

/// Number of hex characters shown in fingerprints.
const FINGERPRINT_LEN: usize = 12;

/// How an identity was established.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdentityMode {
    /// Implicit registration through the caller's session id.
    Session,
    /// Explicit registration through `POST /demo/token`.
    Token,
}

impl IdentityMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            IdentityMode::Session => "session",
            IdentityMode::Token => "token",
        }
    }
}

impl fmt::Display for IdentityMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A short-lived key identifying one isolated demo tenant.
#[derive(Clone, PartialEq, Eq, Hash)]
pub enum EphemeralIdentity {
    Session(String),
    Token(String),
}

impl EphemeralIdentity {
    /// Build a session identity, rejecting ids that are unsafe as file names.
    pub fn session(id: impl Into<String>) -> Result<Self, DemoError> {
        let id = id.into();
        if id.is_empty() || id.len() > MAX_SESSION_ID_LEN {
            return Err(DemoError::InvalidIdentity {
                reason: format!("session id must be 1..={} characters", MAX_SESSION_ID_LEN),
            });
        }
        if !id.chars().all(is_key_char) {
            return Err(DemoError::InvalidIdentity {
                reason: "session id may only contain [A-Za-z0-9_-]".to_string(),
            });
        }
        Ok(Self::Session(id))
    }

    /// Build a token identity from a header value.
    pub fn token(token: impl Into<String>) -> Result<Self, DemoError> {
        let token = token.into();
        if token.len() < MIN_TOKEN_LEN || token.len() > MAX_TOKEN_LEN {
            return Err(DemoError::InvalidIdentity {
                reason: format!(
                    "token must be {}..={} characters",
                    MIN_TOKEN_LEN, MAX_TOKEN_LEN
                ),
            });
        }
        if !token.chars().all(is_key_char) {
            return Err(DemoError::InvalidIdentity {
                reason: "token may only contain [A-Za-z0-9_-]".to_string(),
            });
        }
        Ok(Self::Token(token))
    }

    pub fn mode(&self) -> IdentityMode {
        match self {
            EphemeralIdentity::Session(_) => IdentityMode::Session,
            EphemeralIdentity::Token(_) => IdentityMode::Token,
        }
    }

    /// The raw secret. Only for header/cookie round-trips and registry keys.
    pub fn expose(&self) -> &str {
        match self {
            EphemeralIdentity::Session(id) => id,
            EphemeralIdentity::Token(token) => token,
        }
    }

    /// Key used for per-identity locks; unique across both modes.
    pub fn lock_key(&self) -> String {
        format!("{}:{}", self.mode().as_str(), self.expose())
    }

    /// Loggable fingerprint: truncated SHA-256 of the lock key.
    pub fn fingerprint(&self) -> String {
        let digest = Sha256::digest(self.lock_key().as_bytes());
        let mut encoded = hex::encode(digest);
        encoded.truncate(FINGERPRINT_LEN);
        encoded
    }
}

fn is_key_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '-' || c == '_'
}

impl fmt::Debug for EphemeralIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EphemeralIdentity")
            .field("mode", &self.mode())
            .field("fingerprint", &self.fingerprint())
            .finish()
    }
}

impl fmt::Display for EphemeralIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.mode(), self.fingerprint())
    }
}
