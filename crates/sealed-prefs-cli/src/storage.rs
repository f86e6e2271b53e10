use std::path::PathBuf;

use color_eyre::Result;
use dirs::data_dir;
use sealed_prefs_storage::{
    constants::KEYSTORE_NAME, encrypted_store::EncryptedStore, file_store::FileKeyValueStore,
    key_store::KeyringKeyStore,
};
use tracing::debug;

#[cfg(test)]
use sealed_prefs_storage::key_store::InMemoryKeyStore;

use crate::config::Config;

pub type ProductionStore = EncryptedStore<FileKeyValueStore, KeyringKeyStore>;

/// Resolve the default data directory.
pub fn default_data_dir() -> Result<PathBuf> {
    let base = data_dir().ok_or_else(|| color_eyre::eyre::eyre!("no data dir available"))?;
    Ok(base.join("sealed-prefs"))
}

/// Path of the store file, honouring config overrides.
pub fn store_path(config: &Config) -> Result<PathBuf> {
    let root = match &config.data_dir {
        Some(root) => root.clone(),
        None => default_data_dir()?,
    };
    Ok(root.join(format!("{}.json", config.store_name())))
}

/// Build the encrypted store backed by a file and the OS keychain.
pub fn store_from_config(config: &Config) -> Result<ProductionStore> {
    let path = store_path(config)?;
    debug!(?path, "initializing encrypted store");
    let backing = FileKeyValueStore::open(path)?;
    Ok(EncryptedStore::new(backing, KeyringKeyStore::new(KEYSTORE_NAME)))
}

/// Helper for tests to construct a store rooted at a temp dir with an in-memory key store.
#[cfg(test)]
pub fn test_store(root: impl Into<PathBuf>) -> EncryptedStore<FileKeyValueStore, InMemoryKeyStore> {
    test_store_with(root, InMemoryKeyStore::new())
}

#[cfg(test)]
pub fn test_store_with<K: sealed_prefs_storage::key_store::KeyStore>(
    root: impl Into<PathBuf>,
    key_store: K,
) -> EncryptedStore<FileKeyValueStore, K> {
    let backing = FileKeyValueStore::open(root.into().join("prefs.json")).expect("open test store");
    EncryptedStore::new(backing, key_store)
}
