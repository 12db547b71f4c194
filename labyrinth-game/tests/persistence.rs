use std::cell::RefCell;
use std::collections::HashMap;
use std::io;
use std::rc::Rc;

use labyrinth_game::constants::META_STORAGE_KEY;
use labyrinth_game::{
    EndCause, GameEngine, KeyValueStore, LastRun, MemoryStore, MetaProgressionStore, MetaState,
    StaticDataLoader, StoreError, active_title,
};

/// Store that counts writes and can be switched off.
#[derive(Clone, Default)]
struct FlakyStore {
    inner: Rc<RefCell<HashMap<String, String>>>,
    writes: Rc<RefCell<usize>>,
    offline: Rc<RefCell<bool>>,
}

impl KeyValueStore for FlakyStore {
    type Error = io::Error;

    fn get(&self, key: &str) -> Result<Option<String>, Self::Error> {
        if *self.offline.borrow() {
            return Err(io::Error::other("offline"));
        }
        Ok(self.inner.borrow().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), Self::Error> {
        if *self.offline.borrow() {
            return Err(io::Error::other("offline"));
        }
        *self.writes.borrow_mut() += 1;
        self.inner
            .borrow_mut()
            .insert(key.to_string(), value.to_string());
        Ok(())
    }
}

fn veteran() -> MetaState {
    let mut meta = MetaState {
        runs: 21,
        escapes: 9,
        kp: 14,
        best_floor: 5,
        total_events: 250,
        total_deaths: 12,
        title: Some("t06".into()),
        last_run: Some(LastRun {
            cause: EndCause::Escape,
            floor: 5,
            ending: Some("scholar".into()),
            hp: 31,
            mn: 12,
            inf: 44,
        }),
        ..MetaState::default()
    };
    meta.unlocked.extend(["u1", "u2", "u31", "u36"].map(String::from));
    meta.endings.extend(["scholar", "standard"].map(String::from));
    meta.cleared_difficulties.extend(["easy", "normal"].map(String::from));
    meta
}

#[test]
fn meta_survives_a_new_engine_on_the_same_backend() {
    let backend = MemoryStore::new();
    let first = GameEngine::new(StaticDataLoader, backend.clone()).unwrap();
    let mut meta = first.load_meta().unwrap();
    first.start_run(&mut meta, "easy").unwrap();
    first.start_run(&mut meta, "easy").unwrap();

    let second = GameEngine::new(StaticDataLoader, backend).unwrap();
    let reloaded = second.load_meta().unwrap();
    assert_eq!(reloaded, meta);
    assert_eq!(reloaded.runs, 2);
}

#[test]
fn round_trip_preserves_every_field() {
    let store = MetaProgressionStore::new(MemoryStore::new());
    let meta = veteran();
    store.save(&meta).unwrap();
    assert_eq!(store.load().unwrap(), meta);
}

#[test]
fn partial_blob_keeps_good_fields() {
    let backend = MemoryStore::new();
    backend
        .set(
            META_STORAGE_KEY,
            r#"{"runs": 7, "escapes": -1, "unlocked": ["u1", "u2"], "endings": "oops",
                "last_run": {"cause": "mental", "floor": 2, "ending": null, "hp": 4, "mn": 0, "inf": 9}}"#,
        )
        .unwrap();
    let meta = MetaProgressionStore::new(backend).load().unwrap();
    assert_eq!(meta.runs, 7);
    assert_eq!(meta.escapes, 0);
    assert_eq!(meta.unlocked.len(), 2);
    assert!(meta.endings.is_empty());
    assert_eq!(meta.last_run.unwrap().cause, EndCause::Mental);
}

#[test]
fn commits_write_once_per_mutation() {
    let backend = FlakyStore::default();
    let engine = GameEngine::new(StaticDataLoader, backend.clone()).unwrap();
    let mut meta = engine.load_meta().unwrap();
    engine.start_run(&mut meta, "normal").unwrap();
    assert_eq!(*backend.writes.borrow(), 1);
    meta.kp = 3;
    engine.purchase(&mut meta, "u1").unwrap();
    assert_eq!(*backend.writes.borrow(), 2);
    assert!(engine.purchase(&mut meta, "u1").is_err());
    assert_eq!(*backend.writes.borrow(), 2);
}

#[test]
fn backend_outage_is_reported_not_swallowed() {
    let backend = FlakyStore::default();
    let engine = GameEngine::new(StaticDataLoader, backend.clone()).unwrap();
    *backend.offline.borrow_mut() = true;
    assert!(matches!(engine.load_meta(), Err(StoreError::Backend(_))));
    let mut meta = MetaState::default();
    assert!(engine.start_run(&mut meta, "easy").is_err());
}

#[test]
fn reset_wipes_progress_and_titles() {
    let backend = MemoryStore::new();
    let engine = GameEngine::new(StaticDataLoader, backend).unwrap();
    engine.store().save(&veteran()).unwrap();
    let loaded = engine.load_meta().unwrap();
    assert_eq!(active_title(&loaded, engine.progression()).unwrap().id, "t06");

    let fresh = engine.reset().unwrap();
    assert_eq!(fresh, MetaState::default());
    assert_eq!(engine.load_meta().unwrap(), MetaState::default());
    assert_eq!(active_title(&fresh, engine.progression()).unwrap().id, "t00");
}
