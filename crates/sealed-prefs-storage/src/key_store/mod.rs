//! Key-store capability consumed by the proxy.
//!
//! A key store owns asymmetric key pairs addressed by alias. Callers only ever
//! see handles: the public half carries the (non-secret) public key bytes, the
//! private half carries nothing but the alias, so secret material never leaves
//! the store.

use chrono::{DateTime, Months, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod memory;
pub mod os_keyring;
mod software;

pub use memory::InMemoryKeyStore;
pub use os_keyring::KeyringKeyStore;

#[derive(Debug, Error)]
pub enum KeyStoreError {
    /// The key store cannot be reached right now.
    #[error("key store unavailable: {0}")]
    Unavailable(String),
    #[error("no key pair stored under alias {alias}")]
    AliasNotFound { alias: String },
    #[error("transformation {transformation} is not supported by provider {provider}")]
    UnsupportedTransformation {
        transformation: String,
        provider: String,
    },
    #[error("keyring error: {0}")]
    Keyring(String),
    #[error("decode error: {0}")]
    Decode(String),
    #[error("generation error: {0}")]
    Generation(String),
    #[error("cipher error: {0}")]
    Cipher(String),
}

/// Self-signed certificate metadata bound to a key pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CertificateInfo {
    pub subject: String,
    pub serial: u64,
    pub not_before: DateTime<Utc>,
    pub not_after: DateTime<Utc>,
}

impl CertificateInfo {
    pub fn is_valid_at(&self, at: DateTime<Utc>) -> bool {
        self.not_before <= at && at <= self.not_after
    }
}

/// Parameters for generating a key pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyPairSpec {
    pub alias: String,
    pub certificate: CertificateInfo,
}

impl KeyPairSpec {
    /// Spec whose validity window starts now and ends `validity_years` later.
    pub fn starting_now(
        alias: impl Into<String>,
        subject: impl Into<String>,
        serial: u64,
        validity_years: u32,
    ) -> Result<Self, KeyStoreError> {
        let not_before = Utc::now();
        let not_after = not_before
            .checked_add_months(Months::new(validity_years.saturating_mul(12)))
            .ok_or_else(|| {
                KeyStoreError::Generation(format!(
                    "validity of {validity_years} years overflows the calendar"
                ))
            })?;

        Ok(Self {
            alias: alias.into(),
            certificate: CertificateInfo {
                subject: subject.into(),
                serial,
                not_before,
                not_after,
            },
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublicKeyHandle {
    alias: String,
    bytes: [u8; 32],
}

impl PublicKeyHandle {
    pub fn new(alias: impl Into<String>, bytes: [u8; 32]) -> Self {
        Self {
            alias: alias.into(),
            bytes,
        }
    }

    pub fn alias(&self) -> &str {
        &self.alias
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.bytes
    }
}

/// Opaque reference to a private key held by a key store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrivateKeyHandle {
    alias: String,
}

impl PrivateKeyHandle {
    pub fn new(alias: impl Into<String>) -> Self {
        Self {
            alias: alias.into(),
        }
    }

    pub fn alias(&self) -> &str {
        &self.alias
    }
}

/// Key pair as returned by [`KeyStore::key_pair`]. Resolve it per operation
/// rather than caching it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyPairEntry {
    pub public_key: PublicKeyHandle,
    pub private_key: PrivateKeyHandle,
    pub certificate: CertificateInfo,
}

/// Platform key store (OS keyring in production; memory in tests).
pub trait KeyStore: Send + Sync {
    /// Whether this store implements `transformation` under `provider`.
    fn supports(&self, transformation: &str, provider: &str) -> bool;

    fn contains_alias(&self, alias: &str) -> Result<bool, KeyStoreError>;

    /// Generate a key pair under `spec.alias`, replacing any existing one.
    fn generate_key_pair(&self, spec: &KeyPairSpec) -> Result<(), KeyStoreError>;

    fn key_pair(&self, alias: &str) -> Result<KeyPairEntry, KeyStoreError>;

    fn encrypt_bytes(
        &self,
        key: &PublicKeyHandle,
        plaintext: &[u8],
    ) -> Result<Vec<u8>, KeyStoreError>;

    fn decrypt_bytes(
        &self,
        key: &PrivateKeyHandle,
        ciphertext: &[u8],
    ) -> Result<Vec<u8>, KeyStoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spec_validity_spans_requested_years() {
        let spec = KeyPairSpec::starting_now("alias", "CN=test", 1, 10).expect("spec");
        let cert = &spec.certificate;

        assert_eq!(cert.serial, 1);
        assert_eq!(cert.subject, "CN=test");
        assert!(cert.is_valid_at(Utc::now()));
        let days = (cert.not_after - cert.not_before).num_days();
        assert!((3650..=3653).contains(&days), "unexpected span: {days}");
    }
}
