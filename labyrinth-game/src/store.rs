//! Persistence of the meta-state over a plain key-value transport.

use serde_json::{Map, Value};
use std::cell::RefCell;
use std::collections::HashMap;
use std::convert::Infallible;
use std::rc::Rc;
use thiserror::Error;

use crate::constants::META_STORAGE_KEY;
use crate::meta::{apply_auto_unlocks, MetaState};
use crate::progression::ProgressionCatalog;

/// Trait for abstracting the get/set persistence transport
/// Platform-specific implementations should provide this
pub trait KeyValueStore {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Read the value stored under `key`
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be read.
    fn get(&self, key: &str) -> Result<Option<String>, Self::Error>;

    /// Store `value` under `key`, replacing any previous value
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be written.
    fn set(&self, key: &str, value: &str) -> Result<(), Self::Error>;
}

/// In-memory store; clones share the same entries.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    entries: Rc<RefCell<HashMap<String, String>>>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    type Error = Infallible;

    fn get(&self, key: &str) -> Result<Option<String>, Self::Error> {
        Ok(self.entries.borrow().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), Self::Error> {
        self.entries
            .borrow_mut()
            .insert(key.to_string(), value.to_string());
        Ok(())
    }
}

#[derive(Debug, Error)]
pub enum StoreError<E>
where
    E: std::error::Error + 'static,
{
    #[error("storage backend failed")]
    Backend(#[source] E),
    #[error("failed to serialize meta state: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Rebuild a meta-state from a persisted blob.
///
/// Each known field is taken from the blob when it is present and well formed, and
/// defaulted otherwise. Unknown fields are ignored. An unreadable blob yields a fresh state.
#[must_use]
pub fn merge_meta(raw: &str) -> MetaState {
    let stored = match serde_json::from_str::<Value>(raw) {
        Ok(Value::Object(map)) => map,
        Ok(other) => {
            log::warn!("persisted meta state is not an object ({other}); starting fresh");
            return MetaState::default();
        }
        Err(err) => {
            log::warn!("persisted meta state is corrupted ({err}); starting fresh");
            return MetaState::default();
        }
    };

    let mut merged = Map::new();
    for (key, value) in stored {
        let mut single = Map::new();
        single.insert(key.clone(), value.clone());
        if serde_json::from_value::<MetaState>(Value::Object(single)).is_ok() {
            merged.insert(key, value);
        } else {
            log::warn!("ignoring malformed meta field `{key}`");
        }
    }

    serde_json::from_value(Value::Object(merged)).unwrap_or_else(|err| {
        log::warn!("could not rebuild meta state ({err}); starting fresh");
        MetaState::default()
    })
}

/// Loads, saves and commits the meta-state under one storage key.
#[derive(Debug, Clone)]
pub struct MetaProgressionStore<S> {
    store: S,
    key: String,
}

impl<S: KeyValueStore> MetaProgressionStore<S> {
    pub fn new(store: S) -> Self {
        Self::with_key(store, META_STORAGE_KEY)
    }

    pub fn with_key(store: S, key: impl Into<String>) -> Self {
        Self {
            store,
            key: key.into(),
        }
    }

    /// Load the persisted meta-state, or a fresh one when nothing usable is stored.
    ///
    /// # Errors
    ///
    /// Returns an error only if the backend read fails.
    pub fn load(&self) -> Result<MetaState, StoreError<S::Error>> {
        let raw = self.store.get(&self.key).map_err(StoreError::Backend)?;
        Ok(raw.as_deref().map(merge_meta).unwrap_or_default())
    }

    /// Persist the meta-state.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or the backend write fails.
    pub fn save(&self, meta: &MetaState) -> Result<(), StoreError<S::Error>> {
        let blob = serde_json::to_string(meta)?;
        self.store.set(&self.key, &blob).map_err(StoreError::Backend)
    }

    /// Grant derivable auto-unlocks and persist, returning the newly granted ids.
    ///
    /// # Errors
    ///
    /// Returns an error if the save fails.
    pub fn commit(
        &self,
        meta: &mut MetaState,
        catalog: &ProgressionCatalog,
    ) -> Result<Vec<String>, StoreError<S::Error>> {
        let granted = apply_auto_unlocks(meta, catalog);
        self.save(meta)?;
        Ok(granted)
    }

    /// Replace the persisted state with a fresh one.
    ///
    /// # Errors
    ///
    /// Returns an error if the save fails.
    pub fn reset(&self) -> Result<MetaState, StoreError<S::Error>> {
        let fresh = MetaState::default();
        self.save(&fresh)?;
        Ok(fresh)
    }

    pub const fn backend(&self) -> &S {
        &self.store
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::meta::{EndCause, LastRun};
    use crate::{DataLoader, StaticDataLoader};
    use std::io;

    fn populated() -> MetaState {
        let mut meta = MetaState {
            runs: 12,
            escapes: 4,
            kp: 17,
            best_floor: 5,
            total_events: 140,
            total_deaths: 8,
            title: Some("t02".into()),
            last_run: Some(LastRun {
                cause: EndCause::Health,
                floor: 3,
                ending: None,
                hp: 0,
                mn: 12,
                inf: 22,
            }),
            ..MetaState::default()
        };
        meta.unlocked.extend(["u1".to_string(), "u31".to_string()]);
        meta.endings.insert("scholar".into());
        meta.cleared_difficulties.insert("easy".into());
        meta
    }

    #[test]
    fn save_then_load_round_trips() {
        let store = MetaProgressionStore::new(MemoryStore::new());
        let meta = populated();
        store.save(&meta).unwrap();
        assert_eq!(store.load().unwrap(), meta);
    }

    #[test]
    fn missing_blob_loads_fresh() {
        let store = MetaProgressionStore::new(MemoryStore::new());
        assert_eq!(store.load().unwrap(), MetaState::default());
    }

    #[test]
    fn corrupted_blob_loads_fresh() {
        let backend = MemoryStore::new();
        backend.set(META_STORAGE_KEY, "{not json").unwrap();
        let store = MetaProgressionStore::new(backend.clone());
        assert_eq!(store.load().unwrap(), MetaState::default());

        backend.set(META_STORAGE_KEY, "[1, 2]").unwrap();
        assert_eq!(store.load().unwrap(), MetaState::default());
    }

    #[test]
    fn merge_takes_known_keys_and_defaults_the_rest() {
        let meta = merge_meta(r#"{"runs": 3, "kp": "lots", "escapes": 1, "legacy_flag": true}"#);
        assert_eq!(meta.runs, 3);
        assert_eq!(meta.escapes, 1);
        assert_eq!(meta.kp, 0);
        assert!(meta.unlocked.is_empty());
        assert_eq!(meta.last_run, None);
    }

    #[test]
    fn commit_applies_auto_unlocks_before_saving() {
        let catalog = StaticDataLoader.load_progression().unwrap();
        let store = MetaProgressionStore::new(MemoryStore::new());
        let mut meta = MetaState::default();
        meta.cleared_difficulties.insert("easy".into());
        let granted = store.commit(&mut meta, &catalog).unwrap();
        assert_eq!(granted, vec!["u31".to_string()]);
        assert!(store.load().unwrap().unlocked.contains("u31"));
        assert!(store.commit(&mut meta, &catalog).unwrap().is_empty());
    }

    #[test]
    fn reset_overwrites_persisted_state() {
        let store = MetaProgressionStore::new(MemoryStore::new());
        store.save(&populated()).unwrap();
        assert_eq!(store.reset().unwrap(), MetaState::default());
        assert_eq!(store.load().unwrap(), MetaState::default());
    }

    struct BrokenStore;

    impl KeyValueStore for BrokenStore {
        type Error = io::Error;

        fn get(&self, _key: &str) -> Result<Option<String>, Self::Error> {
            Err(io::Error::other("disk unplugged"))
        }

        fn set(&self, _key: &str, _value: &str) -> Result<(), Self::Error> {
            Err(io::Error::other("disk unplugged"))
        }
    }

    #[test]
    fn backend_failures_surface() {
        let store = MetaProgressionStore::new(BrokenStore);
        assert!(matches!(store.load(), Err(StoreError::Backend(_))));
        assert!(matches!(
            store.save(&MetaState::default()),
            Err(StoreError::Backend(_))
        ));
    }
}
