use std::{
    collections::{BTreeMap, BTreeSet},
    fmt::Display,
    str::FromStr,
    sync::Arc,
};

use sealed_prefs_core::{
    ChangeListener, KeyValueStore, ListenerId, StoreEditor, StoreError, StoredValue, ValueKind,
};
use tracing::instrument;

use crate::{key_store::KeyStore, proxy::KeyStoreProxy};

/// Key-value store that encrypts every value before handing it to a plain
/// backing store and decrypts on the way out. Keys are stored as-is.
///
/// Typed values are stored as the ciphertext of their canonical string form,
/// so the backing store only ever holds strings and string sets.
pub struct EncryptedStore<B: KeyValueStore, K: KeyStore> {
    backing: B,
    proxy: Arc<KeyStoreProxy<K>>,
}

impl<B: KeyValueStore, K: KeyStore> EncryptedStore<B, K> {
    pub fn new(backing: B, key_store: K) -> Self {
        Self::with_proxy(backing, Arc::new(KeyStoreProxy::new(key_store)))
    }

    pub fn with_proxy(backing: B, proxy: Arc<KeyStoreProxy<K>>) -> Self {
        Self { backing, proxy }
    }

    pub fn backing(&self) -> &B {
        &self.backing
    }

    pub fn proxy(&self) -> &Arc<KeyStoreProxy<K>> {
        &self.proxy
    }

    fn decrypt_string(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self
            .backing
            .get_string(key)?
            .map(|ciphertext| self.proxy.decrypt(&ciphertext)))
    }

    /// Decrypt, then parse. A malformed value is an error, never a default.
    fn decrypt_parsed<T>(&self, key: &str, expected: ValueKind) -> Result<Option<T>, StoreError>
    where
        T: FromStr,
        T::Err: Display,
    {
        let Some(plaintext) = self.decrypt_string(key)? else {
            return Ok(None);
        };
        plaintext
            .parse::<T>()
            .map(Some)
            .map_err(|err| StoreError::Parse {
                key: key.to_string(),
                expected,
                reason: err.to_string(),
            })
    }
}

impl<B: KeyValueStore, K: KeyStore> KeyValueStore for EncryptedStore<B, K> {
    type Editor = EncryptedStoreEditor<B::Editor, K>;

    #[instrument(skip_all)]
    fn get_all(&self) -> Result<BTreeMap<String, StoredValue>, StoreError> {
        let entries = self.backing.get_all()?;
        Ok(entries
            .into_iter()
            .map(|(key, value)| {
                let decrypted = match value {
                    StoredValue::String(ciphertext) => {
                        StoredValue::String(self.proxy.decrypt(&ciphertext))
                    }
                    StoredValue::StringSet(ciphertexts) => StoredValue::StringSet(
                        ciphertexts
                            .iter()
                            .map(|ciphertext| self.proxy.decrypt(ciphertext))
                            .collect(),
                    ),
                    // Written around this store, so never encrypted.
                    other => StoredValue::String(other.canonical_string().unwrap_or_default()),
                };
                (key, decrypted)
            })
            .collect())
    }

    #[instrument(skip_all, fields(key = %key))]
    fn get_string(&self, key: &str) -> Result<Option<String>, StoreError> {
        self.decrypt_string(key)
    }

    #[instrument(skip_all, fields(key = %key))]
    fn get_string_set(&self, key: &str) -> Result<Option<BTreeSet<String>>, StoreError> {
        Ok(self.backing.get_string_set(key)?.map(|ciphertexts| {
            ciphertexts
                .iter()
                .map(|ciphertext| self.proxy.decrypt(ciphertext))
                .collect()
        }))
    }

    #[instrument(skip_all, fields(key = %key))]
    fn get_i32(&self, key: &str) -> Result<Option<i32>, StoreError> {
        self.decrypt_parsed(key, ValueKind::Int)
    }

    #[instrument(skip_all, fields(key = %key))]
    fn get_i64(&self, key: &str) -> Result<Option<i64>, StoreError> {
        self.decrypt_parsed(key, ValueKind::Long)
    }

    #[instrument(skip_all, fields(key = %key))]
    fn get_f32(&self, key: &str) -> Result<Option<f32>, StoreError> {
        self.decrypt_parsed(key, ValueKind::Float)
    }

    #[instrument(skip_all, fields(key = %key))]
    fn get_bool(&self, key: &str) -> Result<Option<bool>, StoreError> {
        self.decrypt_parsed(key, ValueKind::Bool)
    }

    fn contains(&self, key: &str) -> bool {
        self.backing.contains(key)
    }

    fn edit(&self) -> Self::Editor {
        EncryptedStoreEditor {
            inner: self.backing.edit(),
            proxy: Arc::clone(&self.proxy),
        }
    }

    fn register_listener(&self, listener: Arc<dyn ChangeListener>) -> ListenerId {
        self.backing.register_listener(listener)
    }

    fn unregister_listener(&self, id: ListenerId) -> bool {
        self.backing.unregister_listener(id)
    }
}

/// Edit transaction that encrypts each value as it is staged.
pub struct EncryptedStoreEditor<E: StoreEditor, K: KeyStore> {
    inner: E,
    proxy: Arc<KeyStoreProxy<K>>,
}

impl<E: StoreEditor, K: KeyStore> EncryptedStoreEditor<E, K> {
    fn encrypt_and_put(mut self, key: &str, value: &str) -> Self {
        let ciphertext = self.proxy.encrypt(value);
        self.inner = self.inner.put_string(key, &ciphertext);
        self
    }
}

impl<E: StoreEditor, K: KeyStore> StoreEditor for EncryptedStoreEditor<E, K> {
    fn put_string(self, key: &str, value: &str) -> Self {
        self.encrypt_and_put(key, value)
    }

    fn put_string_set(mut self, key: &str, values: BTreeSet<String>) -> Self {
        let ciphertexts = values
            .iter()
            .map(|value| self.proxy.encrypt(value))
            .collect();
        self.inner = self.inner.put_string_set(key, ciphertexts);
        self
    }

    fn put_i32(self, key: &str, value: i32) -> Self {
        self.encrypt_and_put(key, &value.to_string())
    }

    fn put_i64(self, key: &str, value: i64) -> Self {
        self.encrypt_and_put(key, &value.to_string())
    }

    fn put_f32(self, key: &str, value: f32) -> Self {
        self.encrypt_and_put(key, &value.to_string())
    }

    fn put_bool(self, key: &str, value: bool) -> Self {
        self.encrypt_and_put(key, &value.to_string())
    }

    fn remove(mut self, key: &str) -> Self {
        self.inner = self.inner.remove(key);
        self
    }

    fn clear(mut self) -> Self {
        self.inner = self.inner.clear();
        self
    }

    fn commit(self) -> Result<(), StoreError> {
        self.inner.commit()
    }

    fn apply(self) {
        self.inner.apply()
    }
}
