use std::{
    collections::{BTreeMap, BTreeSet},
    sync::Arc,
};

use thiserror::Error;

use crate::{
    listener::{ChangeListener, ListenerId},
    value::{StoredValue, ValueKind},
};

pub mod memory;
pub mod state;

/// Errors produced by key-value store implementations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum StoreError {
    /// The stored value has a different type than the one requested.
    #[error("value for key {key} is a {found}, not a {expected}")]
    TypeMismatch {
        key: String,
        expected: ValueKind,
        found: ValueKind,
    },
    /// A string value could not be converted to the requested type.
    #[error("value for key {key} is not a valid {expected}: {reason}")]
    Parse {
        key: String,
        expected: ValueKind,
        reason: String,
    },
    /// Underlying storage failure.
    #[error("storage failure: {reason}")]
    Storage { reason: String },
}

/// One staged mutation of an edit transaction.
#[derive(Debug, Clone, PartialEq)]
pub enum PendingOp {
    Put { key: String, value: StoredValue },
    Remove { key: String },
    Clear,
}

/// Typed, string-keyed store with batched edits.
///
/// Implemented by plain backing stores and by the encrypting decorator, so
/// callers cannot tell the two apart.
pub trait KeyValueStore: Send + Sync {
    type Editor: StoreEditor;

    /// Every entry in the store. Empty when nothing was ever written.
    fn get_all(&self) -> Result<BTreeMap<String, StoredValue>, StoreError>;

    fn get_string(&self, key: &str) -> Result<Option<String>, StoreError>;

    fn get_string_set(&self, key: &str) -> Result<Option<BTreeSet<String>>, StoreError>;

    fn get_i32(&self, key: &str) -> Result<Option<i32>, StoreError>;

    fn get_i64(&self, key: &str) -> Result<Option<i64>, StoreError>;

    fn get_f32(&self, key: &str) -> Result<Option<f32>, StoreError>;

    fn get_bool(&self, key: &str) -> Result<Option<bool>, StoreError>;

    fn contains(&self, key: &str) -> bool;

    /// Start a new edit transaction. Nothing is visible until it is committed.
    fn edit(&self) -> Self::Editor;

    fn register_listener(&self, listener: Arc<dyn ChangeListener>) -> ListenerId;

    /// Returns `false` if the id was not registered.
    fn unregister_listener(&self, id: ListenerId) -> bool;

    fn get_string_or(&self, key: &str, default: &str) -> Result<String, StoreError> {
        Ok(self
            .get_string(key)?
            .unwrap_or_else(|| default.to_string()))
    }

    fn get_string_set_or(
        &self,
        key: &str,
        default: BTreeSet<String>,
    ) -> Result<BTreeSet<String>, StoreError> {
        Ok(self.get_string_set(key)?.unwrap_or(default))
    }

    fn get_i32_or(&self, key: &str, default: i32) -> Result<i32, StoreError> {
        Ok(self.get_i32(key)?.unwrap_or(default))
    }

    fn get_i64_or(&self, key: &str, default: i64) -> Result<i64, StoreError> {
        Ok(self.get_i64(key)?.unwrap_or(default))
    }

    fn get_f32_or(&self, key: &str, default: f32) -> Result<f32, StoreError> {
        Ok(self.get_f32(key)?.unwrap_or(default))
    }

    fn get_bool_or(&self, key: &str, default: bool) -> Result<bool, StoreError> {
        Ok(self.get_bool(key)?.unwrap_or(default))
    }
}

/// Builder for an edit transaction. Operations apply in the order staged.
pub trait StoreEditor: Send + Sized {
    fn put_string(self, key: &str, value: &str) -> Self;

    fn put_string_set(self, key: &str, values: BTreeSet<String>) -> Self;

    fn put_i32(self, key: &str, value: i32) -> Self;

    fn put_i64(self, key: &str, value: i64) -> Self;

    fn put_f32(self, key: &str, value: f32) -> Self;

    fn put_bool(self, key: &str, value: bool) -> Self;

    fn remove(self, key: &str) -> Self;

    fn clear(self) -> Self;

    /// Apply all staged operations atomically and block until they are durable.
    fn commit(self) -> Result<(), StoreError>;

    /// Apply all staged operations without waiting for durability.
    /// Failures are logged, never reported.
    fn apply(self);
}

pub(crate) fn lock_err<E: std::fmt::Display>(err: E) -> StoreError {
    StoreError::Storage {
        reason: format!("lock poisoned: {err}"),
    }
}
