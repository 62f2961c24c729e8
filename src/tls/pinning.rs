//! Public key pinning primitives.
//!
//! The pin is `base64(sha256(RSA2048_SPKI_HEADER || raw_public_key))`, which
//! equals the SHA-256 of the DER `SubjectPublicKeyInfo` for an RSA-2048 key.
//! This is the same value produced by:
//!
//! ```text
//! openssl x509 -in cert.pem -pubkey -noout \
//!   | openssl pkey -pubin -outform der \
//!   | openssl dgst -sha256 -binary | base64
//! ```
//!
//! A single pin is configured per process with [`set_pinned_key_hash`] before
//! any client is constructed. Once installed it never changes.

use std::sync::OnceLock;

use base64::prelude::*;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

use crate::error::ConfigError;

/// ASN.1 `SubjectPublicKeyInfo` prefix for a 2048-bit RSA key.
pub const RSA2048_SPKI_HEADER: [u8; 24] = [
    0x30, 0x82, 0x01, 0x22, 0x30, 0x0D, 0x06, 0x09, 0x2A, 0x86, 0x48, 0x86, 0xF7, 0x0D, 0x01, 0x01,
    0x01, 0x05, 0x00, 0x03, 0x82, 0x01, 0x0F, 0x00,
];

const SHA256_LEN: usize = 32;

static PINNED_KEY_HASH: OnceLock<PinnedKeyHash> = OnceLock::new();

/// Computes the pin value for a raw public key.
///
/// # Example
///
/// ```rust
/// use api_service::tls::public_key_hash;
///
/// let hash = public_key_hash(b"raw key bytes");
/// assert_eq!(hash.len(), 44); // Base64 of 32 bytes
/// ```
#[must_use]
pub fn public_key_hash(raw_key: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(RSA2048_SPKI_HEADER);
    hasher.update(raw_key);
    BASE64_STANDARD.encode(hasher.finalize())
}

/// A validated base64 SHA-256 public key digest.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PinnedKeyHash(String);

impl PinnedKeyHash {
    /// Creates a new validated pin.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidPinnedKeyHash`] if the value is not the
    /// standard base64 encoding of 32 bytes.
    pub fn new(hash: impl Into<String>) -> Result<Self, ConfigError> {
        let hash = hash.into().trim().to_string();

        match BASE64_STANDARD.decode(&hash) {
            Ok(digest) if digest.len() == SHA256_LEN => Ok(Self(hash)),
            _ => Err(ConfigError::InvalidPinnedKeyHash { hash }),
        }
    }

    /// Returns `true` if `raw_key` hashes to this pin.
    ///
    /// The comparison is constant-time.
    #[must_use]
    pub fn matches(&self, raw_key: &[u8]) -> bool {
        let computed = public_key_hash(raw_key);
        computed.as_bytes().ct_eq(self.0.as_bytes()).into()
    }
}

impl AsRef<str> for PinnedKeyHash {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Installs the process-wide pinned key hash.
///
/// An empty value leaves pinning disabled. Installing the same value again is
/// accepted; installing a different one is rejected.
///
/// # Errors
///
/// Returns [`ConfigError::InvalidPinnedKeyHash`] for a malformed value and
/// [`ConfigError::PinnedKeyHashAlreadySet`] when a different pin is already
/// installed.
pub fn set_pinned_key_hash(hash: &str) -> Result<(), ConfigError> {
    if hash.trim().is_empty() {
        return Ok(());
    }

    let pin = PinnedKeyHash::new(hash)?;
    let installed = PINNED_KEY_HASH.get_or_init(|| pin.clone());

    if *installed == pin {
        Ok(())
    } else {
        tracing::warn!("Ignoring attempt to replace the configured pinned key hash");
        Err(ConfigError::PinnedKeyHashAlreadySet)
    }
}

/// Returns the process-wide pinned key hash, if one was installed.
#[must_use]
pub fn pinned_key_hash() -> Option<&'static PinnedKeyHash> {
    PINNED_KEY_HASH.get()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_public_key_hash_is_base64_sha256() {
        let hash = public_key_hash(&[0u8; 270]);
        assert_eq!(hash.len(), 44);
        assert_eq!(BASE64_STANDARD.decode(&hash).unwrap().len(), 32);
    }

    #[test]
    fn test_public_key_hash_includes_header() {
        let mut hasher = Sha256::new();
        hasher.update(b"key");
        let without_header = BASE64_STANDARD.encode(hasher.finalize());

        assert_ne!(public_key_hash(b"key"), without_header);
    }

    #[test]
    fn test_pinned_key_hash_matches_its_key() {
        let pin = PinnedKeyHash::new(public_key_hash(b"server key")).unwrap();

        assert!(pin.matches(b"server key"));
        assert!(!pin.matches(b"another key"));
    }

    #[test]
    fn test_pinned_key_hash_rejects_malformed_values() {
        assert!(matches!(
            PinnedKeyHash::new("not base64!"),
            Err(ConfigError::InvalidPinnedKeyHash { .. })
        ));
        // Valid base64, wrong digest length
        assert!(PinnedKeyHash::new("c2hvcnQ=").is_err());
    }

    #[test]
    fn test_empty_pin_leaves_pinning_disabled() {
        assert!(set_pinned_key_hash("").is_ok());
        assert!(set_pinned_key_hash("   ").is_ok());
    }
}
