// Opaque token generation and hashing

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use rand::RngCore;
use secrecy::{ExposeSecret, Secret};
use sha2::{Digest, Sha256};
use std::fmt;
use subtle::ConstantTimeEq;

/// Random bytes behind every opaque token
pub const TOKEN_BYTES: usize = 32;

/// Token hash - SHA-256 hash of an opaque token (64-character hex string)
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TokenHash(String);

impl TokenHash {
    /// Hash a plaintext token.
    ///
    /// The hash is deterministic, so it doubles as the lookup key.
    pub fn from_token(token: &str) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(token.as_bytes());
        Self(hex::encode(hasher.finalize()))
    }

    /// Wrap an existing hash string (64 hex characters)
    pub fn from_hash_string(hash_str: &str) -> Result<Self, String> {
        if hash_str.len() != 64 {
            return Err(format!("Invalid hash length: expected 64, got {}", hash_str.len()));
        }
        if !hash_str.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err("Invalid hash format: must be 64 hex characters".to_string());
        }
        Ok(Self(hash_str.to_ascii_lowercase()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Constant-time comparison against a stored hash
    pub fn matches(&self, stored: &str) -> bool {
        self.0.as_bytes().ct_eq(stored.as_bytes()).into()
    }
}

impl fmt::Display for TokenHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Plaintext opaque token (refresh, password reset, email confirmation,
/// e-voucher presentation). Never logged.
#[derive(Clone)]
pub struct OpaqueToken(Secret<String>);

impl OpaqueToken {
    /// Fresh token: 32 random bytes, base64url without padding
    pub fn generate() -> Self {
        let mut bytes = [0u8; TOKEN_BYTES];
        rand::thread_rng().fill_bytes(&mut bytes);
        Self(Secret::new(URL_SAFE_NO_PAD.encode(bytes)))
    }

    pub fn new(token: &str) -> Self {
        Self(Secret::new(token.to_string()))
    }

    pub fn hash(&self) -> TokenHash {
        TokenHash::from_token(self.expose_secret())
    }

    /// Expose the plaintext (use with caution)
    pub fn expose_secret(&self) -> &str {
        self.0.expose_secret()
    }
}

impl fmt::Debug for OpaqueToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpaqueToken")
            .field("token", &"<REDACTED>")
            .finish()
    }
}

impl fmt::Display for OpaqueToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<REDACTED>")
    }
}
