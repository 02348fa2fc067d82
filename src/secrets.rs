//! Write-only secret handling
//!
//! The remote platform never echoes secrets back after they are written, so
//! state keeps a SHA-256 fingerprint of the last applied value under a memo
//! attribute named `<attribute>_hash`. Diffing compares fingerprints, never
//! plaintext.

use std::fmt;

use serde::{Deserialize, Serialize, Serializer};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Suffix of the memo attribute storing a secret's fingerprint.
pub const HASH_SUFFIX: &str = "_hash";

/// Placeholder used whenever a sensitive value would otherwise be rendered.
pub const SENSITIVE_PLACEHOLDER: &str = "(sensitive value)";

/// What a [`SecretString`] serializes and debug-prints as.
pub const REDACTED: &str = "[REDACTED]";

/// Secret string that is wiped from memory on drop and never printed.
/// Deserializes from a plain string, serializes as [`REDACTED`].
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop, Deserialize)]
#[serde(transparent)]
pub struct SecretString(String);

impl SecretString {
    pub fn new<S: Into<String>>(value: S) -> Self {
        Self(value.into())
    }

    /// Borrow the plaintext. Callers must not log the result.
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for SecretString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SecretString({REDACTED})")
    }
}

impl Serialize for SecretString {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(REDACTED)
    }
}

impl From<&str> for SecretString {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for SecretString {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

/// Name of the memo attribute for `attribute`.
pub fn hash_key(attribute: &str) -> String {
    format!("{attribute}{HASH_SUFFIX}")
}

/// One-way fingerprint of a secret, lowercase hex SHA-256.
pub fn fingerprint(secret: &str) -> String {
    hex::encode(Sha256::digest(secret.as_bytes()))
}

/// Whether `secret` hashes to the stored fingerprint.
pub fn fingerprint_matches(stored: &str, secret: &str) -> bool {
    let computed = fingerprint(secret);
    computed.as_bytes().ct_eq(stored.as_bytes()).into()
}

/// Diff suppression rule for sensitive attributes: a declared value shows no
/// diff while its fingerprint equals the memo kept in state.
pub fn suppress_secret_diff(memo: Option<&str>, declared: &str) -> bool {
    !SecretMemo::new(declared, memo).drifted()
}

/// Fingerprint pair tracked per secret field: what the declaration currently
/// holds and what was last written to the remote system.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecretMemo {
    pub configured: String,
    pub last_applied: Option<String>,
}

impl SecretMemo {
    pub fn new(declared: &str, last_applied: Option<&str>) -> Self {
        Self {
            configured: fingerprint(declared),
            last_applied: last_applied
                .filter(|value| !value.is_empty())
                .map(str::to_string),
        }
    }

    /// True when the declared secret differs from the last applied one, or
    /// when nothing has been applied yet.
    pub fn drifted(&self) -> bool {
        match &self.last_applied {
            Some(applied) => !bool::from(self.configured.as_bytes().ct_eq(applied.as_bytes())),
            None => true,
        }
    }
}
