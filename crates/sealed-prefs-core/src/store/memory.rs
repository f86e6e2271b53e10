use std::{
    collections::{BTreeMap, BTreeSet},
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use crate::{
    listener::{ChangeListener, ListenerId},
    store::{
        lock_err,
        state::{notify, StoreState},
        KeyValueStore, PendingOp, StoreEditor, StoreError,
    },
    value::StoredValue,
};

/// Plain, non-durable key-value store for tests and ephemeral sessions.
/// Values are held as-is; wrap it in an encrypting store to protect them.
#[derive(Default, Clone)]
pub struct InMemoryKeyValueStore {
    inner: Arc<Mutex<StoreState>>,
}

impl InMemoryKeyValueStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> Result<MutexGuard<'_, StoreState>, StoreError> {
        self.inner.lock().map_err(lock_err)
    }

    fn state_lossy(&self) -> MutexGuard<'_, StoreState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl KeyValueStore for InMemoryKeyValueStore {
    type Editor = InMemoryEditor;

    fn get_all(&self) -> Result<BTreeMap<String, StoredValue>, StoreError> {
        Ok(self.state()?.entries().clone())
    }

    fn get_string(&self, key: &str) -> Result<Option<String>, StoreError> {
        self.state()?.get_string(key)
    }

    fn get_string_set(&self, key: &str) -> Result<Option<BTreeSet<String>>, StoreError> {
        self.state()?.get_string_set(key)
    }

    fn get_i32(&self, key: &str) -> Result<Option<i32>, StoreError> {
        self.state()?.get_i32(key)
    }

    fn get_i64(&self, key: &str) -> Result<Option<i64>, StoreError> {
        self.state()?.get_i64(key)
    }

    fn get_f32(&self, key: &str) -> Result<Option<f32>, StoreError> {
        self.state()?.get_f32(key)
    }

    fn get_bool(&self, key: &str) -> Result<Option<bool>, StoreError> {
        self.state()?.get_bool(key)
    }

    fn contains(&self, key: &str) -> bool {
        self.state_lossy().contains(key)
    }

    fn edit(&self) -> InMemoryEditor {
        InMemoryEditor {
            inner: Arc::clone(&self.inner),
            ops: Vec::new(),
        }
    }

    fn register_listener(&self, listener: Arc<dyn ChangeListener>) -> ListenerId {
        self.state_lossy().register_listener(listener)
    }

    fn unregister_listener(&self, id: ListenerId) -> bool {
        self.state_lossy().unregister_listener(id)
    }
}

/// Edit transaction for [`InMemoryKeyValueStore`].
pub struct InMemoryEditor {
    inner: Arc<Mutex<StoreState>>,
    ops: Vec<PendingOp>,
}

impl InMemoryEditor {
    fn put(mut self, key: &str, value: StoredValue) -> Self {
        self.ops.push(PendingOp::Put {
            key: key.to_string(),
            value,
        });
        self
    }
}

impl StoreEditor for InMemoryEditor {
    fn put_string(self, key: &str, value: &str) -> Self {
        self.put(key, StoredValue::String(value.to_string()))
    }

    fn put_string_set(self, key: &str, values: BTreeSet<String>) -> Self {
        self.put(key, StoredValue::StringSet(values))
    }

    fn put_i32(self, key: &str, value: i32) -> Self {
        self.put(key, StoredValue::Int(value))
    }

    fn put_i64(self, key: &str, value: i64) -> Self {
        self.put(key, StoredValue::Long(value))
    }

    fn put_f32(self, key: &str, value: f32) -> Self {
        self.put(key, StoredValue::Float(value))
    }

    fn put_bool(self, key: &str, value: bool) -> Self {
        self.put(key, StoredValue::Bool(value))
    }

    fn remove(mut self, key: &str) -> Self {
        self.ops.push(PendingOp::Remove {
            key: key.to_string(),
        });
        self
    }

    fn clear(mut self) -> Self {
        self.ops.push(PendingOp::Clear);
        self
    }

    fn commit(self) -> Result<(), StoreError> {
        let (listeners, changed) = {
            let mut state = self.inner.lock().map_err(lock_err)?;
            let changed = state.apply_ops(self.ops);
            (state.listeners(), changed)
        };
        notify(&listeners, &changed);
        Ok(())
    }

    fn apply(self) {
        // Nothing to persist, so apply and commit are the same.
        if let Err(err) = self.commit() {
            tracing::warn!(error = %err, "in-memory apply failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    #[test]
    fn staged_edits_are_invisible_until_commit() {
        let store = InMemoryKeyValueStore::new();
        let editor = store.edit().put_string("k", "v");
        assert!(!store.contains("k"));

        editor.commit().expect("commit");
        assert_eq!(store.get_string_or("k", "default").expect("get"), "v");
    }

    #[test]
    fn dropped_editor_discards_changes() {
        let store = InMemoryKeyValueStore::new();
        drop(store.edit().put_i32("n", 1));
        assert!(!store.contains("n"));
        assert_eq!(store.get_i32_or("n", -1).expect("get"), -1);
    }

    #[test]
    fn listeners_see_each_changed_key() {
        let store = InMemoryKeyValueStore::new();
        let seen = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&seen);
        let id = store.register_listener(Arc::new(move |_key: Option<&str>| {
            counter.fetch_add(1, Ordering::SeqCst);
        }));

        store
            .edit()
            .put_string("a", "1")
            .put_bool("b", true)
            .commit()
            .expect("commit");
        assert_eq!(seen.load(Ordering::SeqCst), 2);

        assert!(store.unregister_listener(id));
        store.edit().remove("a").commit().expect("commit");
        assert_eq!(seen.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn clear_empties_store() {
        let store = InMemoryKeyValueStore::new();
        store
            .edit()
            .put_i64("a", 3)
            .put_f32("b", 1.5)
            .commit()
            .expect("commit");
        store.edit().clear().apply();

        assert!(store.get_all().expect("get_all").is_empty());
        assert!(!store.contains("a"));
    }
}
