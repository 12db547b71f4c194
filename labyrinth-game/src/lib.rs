//! Labyrinth Echo Game Engine
//!
//! Platform-agnostic rule and state engine for the Labyrinth Echo text roguelite.
//! This crate resolves choices, drives runs and keeps cross-run progression
//! without UI or platform-specific dependencies.

pub mod choice;
pub mod condition;
pub mod constants;
pub mod data;
pub mod drain;
pub mod effects;
pub mod endings;
pub mod events;
pub mod meta;
pub mod modifiers;
pub mod numbers;
pub mod player;
pub mod progression;
pub mod run;
pub mod store;
pub mod titles;

use anyhow::{Context, anyhow};
use rand::SeedableRng;
use rand_chacha::ChaCha20Rng;
use std::sync::Arc;

// Re-export commonly used types
pub use choice::{ChoiceError, ChoiceResult, ImpactClass, classify_impact, process_choice, resolve_outcome};
pub use condition::{Comparison, Condition};
pub use data::{
    CatalogError, CatalogIssue, Choice, Event, EventCatalog, EventKind, Outcome, OutcomeFlag,
    Status, validate_events,
};
pub use drain::{Drain, DrainResult, compute_drain, status_tick};
pub use effects::{EffectKey, EffectState, EffectValue, MergeKind, aggregate};
pub use endings::{EndingContext, EndingCriterion, EndingDef, determine_ending};
pub use events::{find_chain_event, pick_event};
pub use meta::{
    EndCause, LastRun, MetaPredicate, MetaState, UnlockError, apply_auto_unlocks, check_purchase,
    derive_auto_unlocks, purchase_unlock,
};
pub use modifiers::apply_modifiers;
pub use player::{Deltas, Player, Resource, apply_to_player, create_player};
pub use progression::{
    DifficultyDef, ProgressionCatalog, TitleDef, UnlockCategory, UnlockDef, UnlockRequirement,
};
pub use run::{ChoiceReport, LogEntry, RunController, RunEnd, RunError, RunPhase, RunStep};
pub use store::{KeyValueStore, MemoryStore, MetaProgressionStore, StoreError, merge_meta};
pub use titles::{TitleError, active_title, select_title, unlocked_titles};

/// Trait for abstracting data loading operations
/// Platform-specific implementations should provide this
pub trait DataLoader {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Load the event catalog from the platform-specific source
    ///
    /// # Errors
    ///
    /// Returns an error if the catalog cannot be loaded or fails validation.
    fn load_event_catalog(&self) -> Result<EventCatalog, Self::Error>;

    /// Load difficulties, unlocks, endings and titles
    ///
    /// # Errors
    ///
    /// Returns an error if the catalog cannot be loaded or fails validation.
    fn load_progression(&self) -> Result<ProgressionCatalog, Self::Error>;
}

const EVENTS_JSON: &str = include_str!("../assets/data/events.json");
const PROGRESSION_JSON: &str = include_str!("../assets/data/progression.json");

/// Loader for the catalogs compiled into the crate.
#[derive(Debug, Clone, Copy, Default)]
pub struct StaticDataLoader;

impl DataLoader for StaticDataLoader {
    type Error = CatalogError;

    fn load_event_catalog(&self) -> Result<EventCatalog, Self::Error> {
        EventCatalog::from_json(EVENTS_JSON)
    }

    fn load_progression(&self) -> Result<ProgressionCatalog, Self::Error> {
        ProgressionCatalog::from_json(PROGRESSION_JSON)
    }
}

/// Deterministic generator for a run seed.
#[must_use]
pub fn seeded_rng(seed: u64) -> ChaCha20Rng {
    ChaCha20Rng::seed_from_u64(seed)
}

/// Main game engine tying catalogs, runs and persisted progression together
pub struct GameEngine<L, S>
where
    L: DataLoader,
    S: KeyValueStore,
{
    data_loader: L,
    store: MetaProgressionStore<S>,
    events: Arc<EventCatalog>,
    progression: Arc<ProgressionCatalog>,
}

impl<L, S> GameEngine<L, S>
where
    L: DataLoader,
    S: KeyValueStore,
{
    /// Create an engine, loading both catalogs up front
    ///
    /// # Errors
    ///
    /// Returns an error if either catalog cannot be loaded.
    pub fn new(data_loader: L, storage: S) -> Result<Self, L::Error> {
        let events = Arc::new(data_loader.load_event_catalog()?);
        let progression = Arc::new(data_loader.load_progression()?);
        log::debug!(
            "loaded {} events and {} unlocks",
            events.len(),
            progression.unlocks().len()
        );
        Ok(Self {
            data_loader,
            store: MetaProgressionStore::new(storage),
            events,
            progression,
        })
    }

    /// Re-read both catalogs from the loader
    ///
    /// # Errors
    ///
    /// Returns an error if either catalog cannot be loaded; the old catalogs stay in place.
    pub fn reload(&mut self) -> Result<(), L::Error> {
        let events = self.data_loader.load_event_catalog()?;
        let progression = self.data_loader.load_progression()?;
        self.events = Arc::new(events);
        self.progression = Arc::new(progression);
        Ok(())
    }

    #[must_use]
    pub fn events(&self) -> &EventCatalog {
        &self.events
    }

    #[must_use]
    pub fn progression(&self) -> &ProgressionCatalog {
        &self.progression
    }

    #[must_use]
    pub const fn store(&self) -> &MetaProgressionStore<S> {
        &self.store
    }

    /// Load the persisted meta-state
    ///
    /// # Errors
    ///
    /// Returns an error if the storage backend cannot be read.
    pub fn load_meta(&self) -> Result<MetaState, StoreError<S::Error>> {
        self.store.load()
    }

    /// Unlock effects currently owned by `meta`
    #[must_use]
    pub fn effects_for(&self, meta: &MetaState) -> EffectState {
        aggregate(meta.unlocked.iter(), self.progression.unlocks())
    }

    /// Count a new run and build its controller
    ///
    /// # Errors
    ///
    /// Returns an error for an unknown difficulty or a failed save.
    pub fn start_run(&self, meta: &mut MetaState, difficulty_id: &str) -> anyhow::Result<RunController> {
        let difficulty = self
            .progression
            .difficulty(difficulty_id)
            .cloned()
            .ok_or_else(|| anyhow!("unknown difficulty `{difficulty_id}`"))?;
        meta.record_run_start();
        self.store
            .commit(meta, &self.progression)
            .context("saving run start")?;
        log::info!("run {} started on {}", meta.runs, difficulty.id);
        Ok(RunController::start(
            Arc::clone(&self.events),
            Arc::clone(&self.progression),
            difficulty,
            self.effects_for(meta),
        ))
    }

    /// Resolve a choice on `run` and book the decision in `meta`
    ///
    /// Finishing decisions also book the run end. Returns the report and any
    /// auto-unlocks granted by the commit.
    ///
    /// # Errors
    ///
    /// Returns an error if the choice is invalid or saving fails.
    pub fn choose(
        &self,
        run: &mut RunController,
        meta: &mut MetaState,
        index: usize,
    ) -> anyhow::Result<(ChoiceReport, Vec<String>)> {
        let report = run.choose(index)?;
        meta.record_event();
        if let Some(end) = &report.end {
            meta.record_run_end(run.difficulty(), end);
            log::info!(
                "run ended on floor {} by {} after {} decisions",
                end.floor,
                end.cause,
                end.decisions
            );
        }
        let granted = self
            .store
            .commit(meta, &self.progression)
            .context("saving decision")?;
        Ok((report, granted))
    }

    /// Book a run that ended without a decision, such as boss exhaustion
    ///
    /// # Errors
    ///
    /// Returns an error if saving fails.
    pub fn finish_run(
        &self,
        meta: &mut MetaState,
        difficulty: &DifficultyDef,
        end: &RunEnd,
    ) -> anyhow::Result<Vec<String>> {
        meta.record_run_end(difficulty, end);
        let granted = self
            .store
            .commit(meta, &self.progression)
            .context("saving run end")?;
        Ok(granted)
    }

    /// Buy an unlock and persist the result
    ///
    /// # Errors
    ///
    /// Returns an error if the purchase is refused or saving fails.
    pub fn purchase(&self, meta: &mut MetaState, unlock_id: &str) -> anyhow::Result<Vec<String>> {
        purchase_unlock(meta, &self.progression, unlock_id)?;
        let granted = self
            .store
            .commit(meta, &self.progression)
            .with_context(|| format!("saving purchase of {unlock_id}"))?;
        Ok(granted)
    }

    /// Select a display title and persist the choice
    ///
    /// # Errors
    ///
    /// Returns an error if the title is unknown or unearned, or saving fails.
    pub fn select_title(&self, meta: &mut MetaState, title_id: &str) -> anyhow::Result<()> {
        select_title(meta, &self.progression, title_id)?;
        self.store.save(meta).context("saving title")?;
        Ok(())
    }

    /// Wipe persisted progression
    ///
    /// # Errors
    ///
    /// Returns an error if saving fails.
    pub fn reset(&self) -> Result<MetaState, StoreError<S::Error>> {
        self.store.reset()
    }
}
