use std::{
    collections::{BTreeMap, BTreeSet},
    sync::Arc,
};

use tracing::debug;

use crate::{
    listener::{ChangeListener, ListenerId, Listeners},
    store::{PendingOp, StoreError},
    value::{StoredValue, ValueKind},
};

/// Entries and listeners of a plain store. Backing stores keep one of these
/// behind a mutex and run every transaction through [`StoreState::apply_ops`].
#[derive(Default)]
pub struct StoreState {
    entries: BTreeMap<String, StoredValue>,
    listeners: Listeners,
}

impl StoreState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_entries(entries: BTreeMap<String, StoredValue>) -> Self {
        Self {
            entries,
            listeners: Listeners::default(),
        }
    }

    pub fn entries(&self) -> &BTreeMap<String, StoredValue> {
        &self.entries
    }

    pub fn into_entries(self) -> BTreeMap<String, StoredValue> {
        self.entries
    }

    /// Swap in a new set of entries, keeping registered listeners.
    pub fn replace_entries(&mut self, entries: BTreeMap<String, StoredValue>) {
        self.entries = entries;
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Apply staged operations in order. Returns the changed keys in the
    /// order they changed; `None` marks a clear.
    pub fn apply_ops(&mut self, ops: Vec<PendingOp>) -> Vec<Option<String>> {
        let mut changed = Vec::with_capacity(ops.len());
        for op in ops {
            match op {
                PendingOp::Put { key, value } => {
                    self.entries.insert(key.clone(), value);
                    changed.push(Some(key));
                }
                PendingOp::Remove { key } => {
                    if self.entries.remove(&key).is_some() {
                        changed.push(Some(key));
                    }
                }
                PendingOp::Clear => {
                    if !self.entries.is_empty() {
                        self.entries.clear();
                        changed.push(None);
                    }
                }
            }
        }
        debug!(changes = changed.len(), "applied edit transaction");
        changed
    }

    pub fn register_listener(&mut self, listener: Arc<dyn ChangeListener>) -> ListenerId {
        self.listeners.register(listener)
    }

    pub fn unregister_listener(&mut self, id: ListenerId) -> bool {
        self.listeners.unregister(id)
    }

    pub fn listeners(&self) -> Vec<Arc<dyn ChangeListener>> {
        self.listeners.snapshot()
    }

    pub fn get_string(&self, key: &str) -> Result<Option<String>, StoreError> {
        self.lookup(key, ValueKind::String, |v| match v {
            StoredValue::String(s) => Some(s.clone()),
            _ => None,
        })
    }

    pub fn get_string_set(&self, key: &str) -> Result<Option<BTreeSet<String>>, StoreError> {
        self.lookup(key, ValueKind::StringSet, |v| match v {
            StoredValue::StringSet(s) => Some(s.clone()),
            _ => None,
        })
    }

    pub fn get_i32(&self, key: &str) -> Result<Option<i32>, StoreError> {
        self.lookup(key, ValueKind::Int, |v| match v {
            StoredValue::Int(n) => Some(*n),
            _ => None,
        })
    }

    pub fn get_i64(&self, key: &str) -> Result<Option<i64>, StoreError> {
        self.lookup(key, ValueKind::Long, |v| match v {
            StoredValue::Long(n) => Some(*n),
            _ => None,
        })
    }

    pub fn get_f32(&self, key: &str) -> Result<Option<f32>, StoreError> {
        self.lookup(key, ValueKind::Float, |v| match v {
            StoredValue::Float(n) => Some(*n),
            _ => None,
        })
    }

    pub fn get_bool(&self, key: &str) -> Result<Option<bool>, StoreError> {
        self.lookup(key, ValueKind::Bool, |v| match v {
            StoredValue::Bool(b) => Some(*b),
            _ => None,
        })
    }

    fn lookup<T>(
        &self,
        key: &str,
        expected: ValueKind,
        extract: impl FnOnce(&StoredValue) -> Option<T>,
    ) -> Result<Option<T>, StoreError> {
        let Some(value) = self.entries.get(key) else {
            return Ok(None);
        };
        extract(value)
            .map(Some)
            .ok_or_else(|| StoreError::TypeMismatch {
                key: key.to_string(),
                expected,
                found: value.kind(),
            })
    }
}

/// Deliver change notifications. Call this after releasing the state lock so
/// listeners may read the store.
pub fn notify(listeners: &[Arc<dyn ChangeListener>], changed: &[Option<String>]) {
    for key in changed {
        for listener in listeners {
            listener.on_changed(key.as_deref());
        }
    }
}
