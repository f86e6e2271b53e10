//! Core abstractions for sealed-prefs: the key-value store contract shared by
//! plain backing stores and the encrypting decorator, plus an in-memory store.
//! This crate carries no crypto dependencies.

pub mod listener;
pub mod store;
pub mod value;

pub use listener::{ChangeListener, ListenerId};
pub use store::{
    memory::InMemoryKeyValueStore, state::StoreState, KeyValueStore, PendingOp, StoreEditor,
    StoreError,
};
pub use value::{StoredValue, ValueKind};
