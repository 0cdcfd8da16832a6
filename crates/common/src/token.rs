//! Short-lived access tokens proving a recent QR scan.

use chrono::{DateTime, Duration, Utc};
use rand::{rngs::OsRng, RngCore};
use serde::{Deserialize, Serialize};

/// Entropy per token value, before hex encoding.
const TOKEN_BYTES: usize = 32;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessToken {
    /// Opaque, unguessable value (hex)
    pub value: String,

    pub issued_at: DateTime<Utc>,

    /// Always `issued_at + validity window`
    pub expires_at: DateTime<Utc>,
}

impl AccessToken {
    /// Mint a token with a fresh random value from the OS entropy source.
    pub fn generate(now: DateTime<Utc>, validity: Duration) -> Self {
        let mut bytes = [0u8; TOKEN_BYTES];
        OsRng.fill_bytes(&mut bytes);

        Self {
            value: hex::encode(bytes),
            issued_at: now,
            expires_at: now + validity,
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }

    /// Whole seconds left before expiry, zero once expired.
    pub fn remaining_seconds(&self, now: DateTime<Utc>) -> i64 {
        (self.expires_at - now).num_seconds().max(0)
    }

    pub fn validity_seconds(&self) -> i64 {
        (self.expires_at - self.issued_at).num_seconds()
    }

    /// Cheap shape check so obviously malformed input never reaches the registry.
    pub fn is_well_formed(value: &str) -> bool {
        value.len() == TOKEN_BYTES * 2 && value.bytes().all(|b| b.is_ascii_hexdigit())
    }
}

/// Result of validating a token value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenStatus {
    pub valid: bool,
    pub remaining_seconds: Option<i64>,
}

impl TokenStatus {
    pub fn valid(remaining_seconds: i64) -> Self {
        Self {
            valid: true,
            remaining_seconds: Some(remaining_seconds),
        }
    }

    /// Unknown and expired tokens are deliberately indistinguishable.
    pub fn invalid() -> Self {
        Self {
            valid: false,
            remaining_seconds: None,
        }
    }
}
