use tracing::{debug, instrument};

use super::{
    software::{self, SoftwareKeyPair},
    KeyPairEntry, KeyPairSpec, KeyStore, KeyStoreError, PrivateKeyHandle, PublicKeyHandle,
};

/// OS keyring-backed key store. Uses the `keyring` crate to persist each key
/// pair as one credential: service is the key-store instance name, account is
/// the alias.
pub struct KeyringKeyStore {
    service: String,
}

impl KeyringKeyStore {
    pub fn new(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
        }
    }

    fn entry(&self, alias: &str) -> Result<keyring::Entry, KeyStoreError> {
        keyring::Entry::new(&self.service, alias).map_err(|e| KeyStoreError::Keyring(e.to_string()))
    }

    fn load(&self, alias: &str) -> Result<SoftwareKeyPair, KeyStoreError> {
        match self.entry(alias)?.get_password() {
            Ok(secret) => SoftwareKeyPair::from_json(&zeroize::Zeroizing::new(secret)),
            Err(keyring::Error::NoEntry) => Err(KeyStoreError::AliasNotFound {
                alias: alias.to_string(),
            }),
            Err(err) => Err(keyring_err(err)),
        }
    }
}

impl KeyStore for KeyringKeyStore {
    fn supports(&self, transformation: &str, provider: &str) -> bool {
        software::supports(transformation, provider)
    }

    #[instrument(skip(self))]
    fn contains_alias(&self, alias: &str) -> Result<bool, KeyStoreError> {
        match self.entry(alias)?.get_password() {
            Ok(_) => Ok(true),
            Err(keyring::Error::NoEntry) => Ok(false),
            Err(err) => Err(keyring_err(err)),
        }
    }

    #[instrument(skip_all, fields(alias = %spec.alias))]
    fn generate_key_pair(&self, spec: &KeyPairSpec) -> Result<(), KeyStoreError> {
        let pair = SoftwareKeyPair::generate(spec);
        self.entry(&spec.alias)?
            .set_password(&pair.to_json()?)
            .map_err(keyring_err)?;
        debug!(service = %self.service, "stored new key pair in keyring");
        Ok(())
    }

    fn key_pair(&self, alias: &str) -> Result<KeyPairEntry, KeyStoreError> {
        Ok(self.load(alias)?.entry(alias))
    }

    fn encrypt_bytes(
        &self,
        key: &PublicKeyHandle,
        plaintext: &[u8],
    ) -> Result<Vec<u8>, KeyStoreError> {
        software::seal_to(key, plaintext)
    }

    fn decrypt_bytes(
        &self,
        key: &PrivateKeyHandle,
        ciphertext: &[u8],
    ) -> Result<Vec<u8>, KeyStoreError> {
        self.load(key.alias())?.open(ciphertext)
    }
}

fn keyring_err(err: keyring::Error) -> KeyStoreError {
    match err {
        keyring::Error::NoStorageAccess(inner) | keyring::Error::PlatformFailure(inner) => {
            KeyStoreError::Unavailable(inner.to_string())
        }
        other => KeyStoreError::Keyring(other.to_string()),
    }
}
