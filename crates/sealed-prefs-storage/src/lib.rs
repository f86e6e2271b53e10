//! Encrypted-at-rest key-value storage.
//!
//! Values are sealed to an X25519 key pair that lives in a [`key_store::KeyStore`]
//! (OS keyring in production; memory in tests). [`proxy::KeyStoreProxy`] owns the
//! key-pair lifecycle and the byte pipeline, [`encrypted_store::EncryptedStore`]
//! wraps any plain `KeyValueStore` with it, and [`file_store::FileKeyValueStore`]
//! is the durable plain store.

pub mod cipher;
pub mod constants;
pub mod encrypted_store;
pub mod file_store;
pub mod key_store;
pub mod proxy;
mod sealed_box;
