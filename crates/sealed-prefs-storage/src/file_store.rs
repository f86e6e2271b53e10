use std::{
    collections::{BTreeMap, BTreeSet},
    fs::{self, File},
    io::{Read, Write},
    path::{Path, PathBuf},
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    thread,
};

use anyhow::Context;
use sealed_prefs_core::{
    store::state::notify, ChangeListener, KeyValueStore, ListenerId, PendingOp, StoreEditor,
    StoreError, StoreState, StoredValue,
};
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use tracing::{debug, instrument, warn};

const DOCUMENT_VERSION: u32 = 1;

/// Plain key-value store persisted as one JSON document.
///
/// Reads are served from memory. Every write replaces the document atomically
/// (temp file + rename), so a crash leaves either the old or the new state.
/// Wrap it in an `EncryptedStore` to keep values encrypted on disk.
#[derive(Clone)]
pub struct FileKeyValueStore {
    path: PathBuf,
    state: Arc<Mutex<StoreState>>,
    /// Held for the whole read-modify-write of a commit and by background writers.
    write_lock: Arc<Mutex<()>>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Document {
    version: u32,
    entries: BTreeMap<String, StoredValue>,
}

impl FileKeyValueStore {
    /// Open the store at `path`, starting empty if the file does not exist.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let entries = match read_document(&path)? {
            Some(doc) => doc.entries,
            None => BTreeMap::new(),
        };
        debug!(?path, entries = entries.len(), "opened file store");

        Ok(Self {
            path,
            state: Arc::new(Mutex::new(StoreState::from_entries(entries))),
            write_lock: Arc::new(Mutex::new(())),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Block until the current in-memory state is on disk.
    pub fn flush(&self) -> Result<(), StoreError> {
        let _write = self.write_lock.lock().map_err(lock_err)?;
        let entries = self.state()?.entries().clone();
        write_document(&self.path, entries)
    }

    fn state(&self) -> Result<MutexGuard<'_, StoreState>, StoreError> {
        self.state.lock().map_err(lock_err)
    }

    fn state_lossy(&self) -> MutexGuard<'_, StoreState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn commit_ops(&self, ops: Vec<PendingOp>) -> Result<(), StoreError> {
        let write = self.write_lock.lock().map_err(lock_err)?;

        let mut staged = StoreState::from_entries(self.state()?.entries().clone());
        let changed = staged.apply_ops(ops);
        let entries = staged.into_entries();
        write_document(&self.path, entries.clone())?;

        let listeners = {
            let mut state = self.state()?;
            state.replace_entries(entries);
            state.listeners()
        };
        drop(write);
        notify(&listeners, &changed);
        Ok(())
    }

    fn apply_ops(&self, ops: Vec<PendingOp>) {
        let (listeners, changed) = {
            // Keeps an in-flight commit from overwriting this change with its older snapshot.
            let _write = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);
            let mut state = self.state_lossy();
            let changed = state.apply_ops(ops);
            (state.listeners(), changed)
        };
        notify(&listeners, &changed);

        let store = self.clone();
        let spawned = thread::Builder::new()
            .name("sealed-prefs-writer".to_string())
            .spawn(move || store.persist_in_background());
        if let Err(err) = spawned {
            warn!(error = %err, "could not spawn background writer, writing inline");
            self.persist_in_background();
        }
    }

    fn persist_in_background(&self) {
        if let Err(err) = self.persist_latest() {
            warn!(path = ?self.path, error = %format!("{err:#}"), "background write failed");
        }
    }

    fn persist_latest(&self) -> anyhow::Result<()> {
        let _write = self
            .write_lock
            .lock()
            .map_err(|e| anyhow::anyhow!("write lock poisoned: {e}"))?;
        // Snapshot under the write lock so the newest state always lands last.
        let entries = self.state_lossy().entries().clone();
        write_document(&self.path, entries)
            .with_context(|| format!("persisting {}", self.path.display()))
    }
}

impl KeyValueStore for FileKeyValueStore {
    type Editor = FileEditor;

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

    fn edit(&self) -> FileEditor {
        FileEditor {
            store: self.clone(),
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

/// Edit transaction for [`FileKeyValueStore`].
pub struct FileEditor {
    store: FileKeyValueStore,
    ops: Vec<PendingOp>,
}

impl FileEditor {
    fn put(mut self, key: &str, value: StoredValue) -> Self {
        self.ops.push(PendingOp::Put {
            key: key.to_string(),
            value,
        });
        self
    }
}

impl StoreEditor for FileEditor {
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

    #[instrument(skip_all, fields(ops = self.ops.len()))]
    fn commit(self) -> Result<(), StoreError> {
        self.store.commit_ops(self.ops)
    }

    #[instrument(skip_all, fields(ops = self.ops.len()))]
    fn apply(self) {
        self.store.apply_ops(self.ops)
    }
}

fn write_document(path: &Path, entries: BTreeMap<String, StoredValue>) -> Result<(), StoreError> {
    let parent = path.parent().ok_or_else(|| StoreError::Storage {
        reason: "invalid storage path".to_string(),
    })?;
    fs::create_dir_all(parent).map_err(storage_err)?;

    let doc = Document {
        version: DOCUMENT_VERSION,
        entries,
    };
    let mut tmp = NamedTempFile::new_in(parent).map_err(storage_err)?;
    let json = serde_json::to_vec(&doc).map_err(storage_err)?;
    tmp.write_all(&json).map_err(storage_err)?;
    tmp.flush().map_err(storage_err)?;
    tmp.as_file().sync_all().map_err(storage_err)?;
    tmp.persist(path).map_err(|e| storage_err(e.error))?;
    Ok(())
}

fn read_document(path: &Path) -> Result<Option<Document>, StoreError> {
    let mut file = match File::open(path) {
        Ok(file) => file,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(err) => return Err(storage_err(err)),
    };

    let mut buf = Vec::new();
    file.read_to_end(&mut buf).map_err(storage_err)?;
    if buf.iter().all(u8::is_ascii_whitespace) {
        return Ok(None);
    }

    let doc: Document = serde_json::from_slice(&buf).map_err(storage_err)?;
    if doc.version != DOCUMENT_VERSION {
        return Err(StoreError::Storage {
            reason: format!("unsupported document version {}", doc.version),
        });
    }
    Ok(Some(doc))
}

fn storage_err<E: ToString>(err: E) -> StoreError {
    StoreError::Storage {
        reason: err.to_string(),
    }
}

fn lock_err<E: std::fmt::Display>(err: E) -> StoreError {
    StoreError::Storage {
        reason: format!("lock poisoned: {err}"),
    }
}
