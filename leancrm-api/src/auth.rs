//! Credential helpers for the registration endpoint.
//!
//! Passwords are stored as `sha256$<salt hex>$<digest hex>`. Access tokens
//! follow the personal-access-token layout: the caller receives
//! `<token id>|<secret>` and the store keeps only the SHA-256 of the secret.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use rand::RngCore;
use sha2::{Digest, Sha256};

const SALT_BYTES: usize = 16;
const TOKEN_SECRET_BYTES: usize = 30;

/// Minimum accepted password length.
pub const MIN_PASSWORD_LEN: usize = 8;

fn digest(salt: &[u8], password: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(salt);
    hasher.update(password.as_bytes());
    hex::encode(hasher.finalize())
}

pub fn hash_password(password: &str) -> String {
    let mut salt = [0u8; SALT_BYTES];
    rand::rng().fill_bytes(&mut salt);
    format!("sha256${}${}", hex::encode(salt), digest(&salt, password))
}

/// A fresh token secret and the hash to persist for it.
pub fn generate_token_secret() -> (String, String) {
    let mut bytes = [0u8; TOKEN_SECRET_BYTES];
    rand::rng().fill_bytes(&mut bytes);
    let secret = URL_SAFE_NO_PAD.encode(bytes);
    let hash = hex::encode(Sha256::digest(secret.as_bytes()));
    (secret, hash)
}

/// The bearer token handed to the caller.
pub fn format_access_token(token_id: i64, secret: &str) -> String {
    format!("{}|{}", token_id, secret)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_password_hash_layout() {
        let stored = hash_password("correct horse");
        let parts: Vec<&str> = stored.split('$').collect();
        assert_eq!(parts[0], "sha256");
        let salt = hex::decode(parts[1]).unwrap();
        assert_eq!(salt.len(), SALT_BYTES);
        assert_eq!(parts[2], digest(&salt, "correct horse"));
        assert_ne!(parts[2], digest(&salt, "wrong horse"));
    }

    #[test]
    fn test_password_hashes_are_salted() {
        assert_ne!(hash_password("same"), hash_password("same"));
    }

    #[test]
    fn test_token_secret_hash() {
        let (secret, hash) = generate_token_secret();
        assert_eq!(secret.len(), 40);
        assert_eq!(hash.len(), 64);
        assert_eq!(hash, hex::encode(Sha256::digest(secret.as_bytes())));
        assert_eq!(format_access_token(7, &secret), format!("7|{}", secret));
    }
}
