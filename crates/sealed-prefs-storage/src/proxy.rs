//! Encrypt/decrypt pipeline over the configured key store.

use std::{
    io::{self, Read, Write},
    string::FromUtf8Error,
    sync::{
        atomic::{AtomicU64, Ordering},
        Mutex, PoisonError,
    },
};

use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::Utc;
use thiserror::Error;
use tracing::{debug, instrument, warn};

use crate::{
    cipher::Cipher,
    constants::{
        KEYSTORE_ALIAS, KEYSTORE_CERTIFICATE_SERIAL, KEYSTORE_CERTIFICATE_SUBJECT,
        KEYSTORE_CERTIFICATE_VALIDITY_YEARS, KEYSTORE_PROVIDER, KEYSTORE_TRANSFORMATION,
    },
    key_store::{KeyPairEntry, KeyPairSpec, KeyStore, KeyStoreError},
};

/// Serializes the check-then-generate key-pair bootstrap across the process.
static BOOTSTRAP: Mutex<()> = Mutex::new(());

#[derive(Debug, Error)]
pub enum ProxyError {
    #[error(transparent)]
    KeyStore(#[from] KeyStoreError),
    #[error("ciphertext is not valid base64: {0}")]
    Encoding(#[from] base64::DecodeError),
    #[error("decrypted bytes are not valid UTF-8: {0}")]
    Utf8(#[from] FromUtf8Error),
    #[error("cipher stream failed: {0}")]
    Io(#[from] io::Error),
}

/// Turns strings into base64 ciphertext sealed to the key pair under
/// [`KEYSTORE_ALIAS`], generating that key pair on first use.
///
/// [`encrypt`](Self::encrypt) and [`decrypt`](Self::decrypt) fail open: on any
/// crypto failure they log a warning and return their input unchanged, so the
/// store keeps working (with plaintext) while the key store is unavailable.
/// Use the `try_` variants to fail closed instead.
pub struct KeyStoreProxy<K: KeyStore> {
    key_store: K,
    fail_open: AtomicU64,
}

impl<K: KeyStore> KeyStoreProxy<K> {
    pub fn new(key_store: K) -> Self {
        Self {
            key_store,
            fail_open: AtomicU64::new(0),
        }
    }

    pub fn key_store(&self) -> &K {
        &self.key_store
    }

    /// How many times encrypt or decrypt returned its input unchanged.
    pub fn fail_open_count(&self) -> u64 {
        self.fail_open.load(Ordering::Relaxed)
    }

    pub fn encrypt(&self, plaintext: &str) -> String {
        match self.try_encrypt(plaintext) {
            Ok(ciphertext) => ciphertext,
            Err(err) => {
                self.fail_open.fetch_add(1, Ordering::Relaxed);
                warn!(
                    error = %err,
                    len = plaintext.len(),
                    "encryption failed, value will be stored unencrypted"
                );
                debug!(value = plaintext, "unencrypted value");
                plaintext.to_string()
            }
        }
    }

    pub fn decrypt(&self, ciphertext: &str) -> String {
        match self.try_decrypt(ciphertext) {
            Ok(plaintext) => plaintext,
            Err(err) => {
                self.fail_open.fetch_add(1, Ordering::Relaxed);
                warn!(
                    error = %err,
                    len = ciphertext.len(),
                    "decryption failed, returning stored value as-is"
                );
                debug!(value = ciphertext, "undecryptable value");
                ciphertext.to_string()
            }
        }
    }

    #[instrument(skip_all)]
    pub fn try_encrypt(&self, plaintext: &str) -> Result<String, ProxyError> {
        let entry = self.key_pair_entry()?;
        let cipher = self.cipher()?;

        let mut stream = cipher.encrypting_writer(entry.public_key, Vec::new());
        stream.write_all(plaintext.as_bytes())?;
        let ciphertext = stream.finish()?;

        Ok(STANDARD.encode(ciphertext))
    }

    #[instrument(skip_all)]
    pub fn try_decrypt(&self, ciphertext: &str) -> Result<String, ProxyError> {
        let bytes = STANDARD.decode(ciphertext)?;
        let entry = self.key_pair_entry()?;
        let cipher = self.cipher()?;

        let mut stream = cipher.decrypting_reader(entry.private_key, bytes.as_slice());
        let mut plaintext = Vec::new();
        stream.read_to_end(&mut plaintext)?;

        Ok(String::from_utf8(plaintext)?)
    }

    /// Resolve the key pair, generating it first if the alias is missing.
    /// Never cached: every call goes back to the key store.
    fn key_pair_entry(&self) -> Result<KeyPairEntry, KeyStoreError> {
        {
            let _guard = BOOTSTRAP.lock().unwrap_or_else(PoisonError::into_inner);
            if !self.key_store.contains_alias(KEYSTORE_ALIAS)? {
                let spec = KeyPairSpec::starting_now(
                    KEYSTORE_ALIAS,
                    KEYSTORE_CERTIFICATE_SUBJECT,
                    KEYSTORE_CERTIFICATE_SERIAL,
                    KEYSTORE_CERTIFICATE_VALIDITY_YEARS,
                )?;
                self.key_store.generate_key_pair(&spec)?;
                debug!(alias = KEYSTORE_ALIAS, "generated key pair");
            }
        }

        let entry = self.key_store.key_pair(KEYSTORE_ALIAS)?;
        if !entry.certificate.is_valid_at(Utc::now()) {
            warn!(
                not_after = %entry.certificate.not_after,
                "key pair certificate is outside its validity window"
            );
        }
        Ok(entry)
    }

    fn cipher(&self) -> Result<Cipher<'_, K>, KeyStoreError> {
        Cipher::get_instance(&self.key_store, KEYSTORE_TRANSFORMATION, KEYSTORE_PROVIDER)
    }
}

#[cfg(test)]
mod tests {
    use std::{sync::Arc, thread};

    use super::*;
    use crate::key_store::InMemoryKeyStore;

    #[test]
    fn encrypt_round_trips_and_hides_plaintext() {
        let proxy = KeyStoreProxy::new(InMemoryKeyStore::new());

        let ciphertext = proxy.encrypt("hello");
        assert_ne!(ciphertext, "hello");
        assert!(STANDARD.decode(&ciphertext).is_ok());
        assert_eq!(proxy.decrypt(&ciphertext), "hello");
        assert_eq!(proxy.fail_open_count(), 0);
    }

    #[test]
    fn empty_and_unicode_strings_round_trip() {
        let proxy = KeyStoreProxy::new(InMemoryKeyStore::new());
        for value in ["", "grüße, 世界 🚀"] {
            let ciphertext = proxy.try_encrypt(value).expect("encrypt");
            assert!(!ciphertext.is_empty());
            assert_eq!(proxy.try_decrypt(&ciphertext).expect("decrypt"), value);
        }
    }

    #[test]
    fn key_pair_is_generated_lazily_and_once() {
        let store = InMemoryKeyStore::new();
        let proxy = KeyStoreProxy::new(store.clone());
        assert_eq!(store.generated_count(), 0);

        proxy.encrypt("a");
        proxy.encrypt("b");
        assert_eq!(store.generated_count(), 1);
        assert!(store.contains_alias(KEYSTORE_ALIAS).expect("contains"));
    }

    #[test]
    fn generated_key_pair_carries_the_configured_certificate() {
        let store = InMemoryKeyStore::new();
        let proxy = KeyStoreProxy::new(store.clone());
        let before = Utc::now();
        proxy.try_encrypt("a").expect("encrypt");
        let after = Utc::now();

        let certificate = store.key_pair(KEYSTORE_ALIAS).expect("key pair").certificate;
        assert_eq!(certificate.subject, KEYSTORE_CERTIFICATE_SUBJECT);
        assert_eq!(certificate.serial, KEYSTORE_CERTIFICATE_SERIAL);
        assert!(before <= certificate.not_before && certificate.not_before <= after);
        assert_eq!(
            certificate.not_before.checked_add_months(chrono::Months::new(
                KEYSTORE_CERTIFICATE_VALIDITY_YEARS * 12
            )),
            Some(certificate.not_after)
        );
        assert!(certificate.is_valid_at(Utc::now()));
    }

    #[test]
    fn concurrent_first_use_generates_one_key_pair() {
        let store = InMemoryKeyStore::new();
        let proxy = Arc::new(KeyStoreProxy::new(store.clone()));

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let proxy = Arc::clone(&proxy);
                thread::spawn(move || {
                    let plaintext = format!("value-{i}");
                    (plaintext.clone(), proxy.encrypt(&plaintext))
                })
            })
            .collect();

        for handle in handles {
            let (plaintext, ciphertext) = handle.join().expect("thread");
            assert_eq!(proxy.decrypt(&ciphertext), plaintext);
        }
        assert_eq!(store.generated_count(), 1);
        assert_eq!(proxy.fail_open_count(), 0);
    }

    #[test]
    fn unavailable_key_store_fails_open() {
        let proxy = KeyStoreProxy::new(InMemoryKeyStore::unavailable());

        let stored = proxy.encrypt("plain");
        assert_eq!(stored, "plain");
        assert_eq!(proxy.decrypt(&stored), "plain");
        assert_eq!(proxy.fail_open_count(), 2);

        let err = proxy.try_encrypt("plain").expect_err("fail closed");
        assert!(matches!(
            err,
            ProxyError::KeyStore(KeyStoreError::Unavailable(_))
        ));
    }

    #[test]
    fn values_written_unencrypted_are_read_back_as_is() {
        let proxy = KeyStoreProxy::new(InMemoryKeyStore::new());

        // Valid base64 but not an envelope, and not base64 at all.
        assert_eq!(proxy.decrypt("abcd"), "abcd");
        assert_eq!(proxy.decrypt("not base64!"), "not base64!");
        assert!(matches!(
            proxy.try_decrypt("not base64!"),
            Err(ProxyError::Encoding(_))
        ));
    }

    #[test]
    fn ciphertext_from_another_key_pair_is_not_decrypted() {
        let first = KeyStoreProxy::new(InMemoryKeyStore::new());
        let second = KeyStoreProxy::new(InMemoryKeyStore::new());

        let ciphertext = first.encrypt("secret");
        assert_eq!(second.decrypt(&ciphertext), ciphertext);
        assert_eq!(second.fail_open_count(), 1);
    }
}
