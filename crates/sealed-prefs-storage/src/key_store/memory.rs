use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc, Mutex, MutexGuard,
    },
};

use super::{
    software::{self, SoftwareKeyPair},
    KeyPairEntry, KeyPairSpec, KeyStore, KeyStoreError, PrivateKeyHandle, PublicKeyHandle,
};

/// In-memory key store for tests and ephemeral sessions.
///
/// Can be switched off to simulate a secure element that is temporarily
/// unavailable: every operation then fails with [`KeyStoreError::Unavailable`].
#[derive(Clone)]
pub struct InMemoryKeyStore {
    pairs: Arc<Mutex<HashMap<String, SoftwareKeyPair>>>,
    available: Arc<AtomicBool>,
    generated: Arc<AtomicUsize>,
}

impl Default for InMemoryKeyStore {
    fn default() -> Self {
        Self {
            pairs: Arc::default(),
            available: Arc::new(AtomicBool::new(true)),
            generated: Arc::default(),
        }
    }
}

impl InMemoryKeyStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store that fails every operation until switched back on.
    pub fn unavailable() -> Self {
        let store = Self::default();
        store.set_available(false);
        store
    }

    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Number of key pairs generated so far.
    pub fn generated_count(&self) -> usize {
        self.generated.load(Ordering::SeqCst)
    }

    fn ensure_available(&self) -> Result<(), KeyStoreError> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(KeyStoreError::Unavailable(
                "in-memory key store switched off".to_string(),
            ))
        }
    }

    fn pairs(&self) -> Result<MutexGuard<'_, HashMap<String, SoftwareKeyPair>>, KeyStoreError> {
        self.ensure_available()?;
        self.pairs
            .lock()
            .map_err(|err| KeyStoreError::Unavailable(format!("lock poisoned: {err}")))
    }

    fn with_pair<T>(
        &self,
        alias: &str,
        f: impl FnOnce(&SoftwareKeyPair) -> Result<T, KeyStoreError>,
    ) -> Result<T, KeyStoreError> {
        let pairs = self.pairs()?;
        let pair = pairs.get(alias).ok_or_else(|| KeyStoreError::AliasNotFound {
            alias: alias.to_string(),
        })?;
        f(pair)
    }
}

impl KeyStore for InMemoryKeyStore {
    fn supports(&self, transformation: &str, provider: &str) -> bool {
        software::supports(transformation, provider)
    }

    fn contains_alias(&self, alias: &str) -> Result<bool, KeyStoreError> {
        Ok(self.pairs()?.contains_key(alias))
    }

    fn generate_key_pair(&self, spec: &KeyPairSpec) -> Result<(), KeyStoreError> {
        let pair = SoftwareKeyPair::generate(spec);
        self.pairs()?.insert(spec.alias.clone(), pair);
        self.generated.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn key_pair(&self, alias: &str) -> Result<KeyPairEntry, KeyStoreError> {
        self.with_pair(alias, |pair| Ok(pair.entry(alias)))
    }

    fn encrypt_bytes(
        &self,
        key: &PublicKeyHandle,
        plaintext: &[u8],
    ) -> Result<Vec<u8>, KeyStoreError> {
        self.ensure_available()?;
        software::seal_to(key, plaintext)
    }

    fn decrypt_bytes(
        &self,
        key: &PrivateKeyHandle,
        ciphertext: &[u8],
    ) -> Result<Vec<u8>, KeyStoreError> {
        self.with_pair(key.alias(), |pair| pair.open(ciphertext))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(alias: &str) -> KeyPairSpec {
        KeyPairSpec::starting_now(alias, "CN=test", 1, 1).expect("spec")
    }

    #[test]
    fn generated_pair_encrypts_and_decrypts() {
        let store = InMemoryKeyStore::new();
        assert!(!store.contains_alias("a").expect("contains"));

        store.generate_key_pair(&spec("a")).expect("generate");
        assert!(store.contains_alias("a").expect("contains"));

        let entry = store.key_pair("a").expect("key pair");
        let sealed = store
            .encrypt_bytes(&entry.public_key, b"value")
            .expect("encrypt");
        let opened = store
            .decrypt_bytes(&entry.private_key, &sealed)
            .expect("decrypt");
        assert_eq!(opened, b"value");
        assert_eq!(store.generated_count(), 1);
    }

    #[test]
    fn missing_alias_is_reported() {
        let store = InMemoryKeyStore::new();
        let err = store.key_pair("nope").expect_err("alias missing");
        assert!(matches!(err, KeyStoreError::AliasNotFound { .. }));
    }

    #[test]
    fn switched_off_store_fails_every_call() {
        let store = InMemoryKeyStore::new();
        store.generate_key_pair(&spec("a")).expect("generate");
        let entry = store.key_pair("a").expect("key pair");

        store.set_available(false);
        assert!(matches!(
            store.contains_alias("a"),
            Err(KeyStoreError::Unavailable(_))
        ));
        assert!(matches!(
            store.encrypt_bytes(&entry.public_key, b"x"),
            Err(KeyStoreError::Unavailable(_))
        ));
        assert!(matches!(
            store.decrypt_bytes(&entry.private_key, b"x"),
            Err(KeyStoreError::Unavailable(_))
        ));

        store.set_available(true);
        assert!(store.encrypt_bytes(&entry.public_key, b"x").is_ok());
    }
}
