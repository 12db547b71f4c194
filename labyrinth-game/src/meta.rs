//! Cross-run meta progression: counters, collections, auto-unlocks and purchases.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use thiserror::Error;

use crate::endings::EndingDef;
use crate::player::Player;
use crate::progression::{DifficultyDef, ProgressionCatalog, UnlockCategory};
use crate::run::RunEnd;

/// Why a run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EndCause {
    Escape,
    /// hp reached zero.
    Health,
    /// mn reached zero while hp held.
    Mental,
    /// Boss attempts or floor events ran out.
    Exhausted,
}

impl EndCause {
    #[must_use]
    pub const fn is_death(self) -> bool {
        !matches!(self, Self::Escape)
    }
}

impl fmt::Display for EndCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Escape => "escape",
            Self::Health => "health",
            Self::Mental => "mental",
            Self::Exhausted => "exhausted",
        })
    }
}

/// Summary of the most recent finished run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LastRun {
    pub cause: EndCause,
    pub floor: u32,
    pub ending: Option<String>,
    pub hp: i32,
    pub mn: i32,
    pub inf: i32,
}

impl LastRun {
    fn new(cause: EndCause, floor: u32, ending: Option<String>, player: &Player) -> Self {
        Self {
            cause,
            floor,
            ending,
            hp: player.hp,
            mn: player.mn,
            inf: player.inf,
        }
    }
}

/// Persisted cross-run state.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MetaState {
    pub runs: u32,
    pub escapes: u32,
    pub kp: u32,
    pub unlocked: BTreeSet<String>,
    pub best_floor: u32,
    pub total_events: u32,
    pub endings: BTreeSet<String>,
    pub cleared_difficulties: BTreeSet<String>,
    pub total_deaths: u32,
    pub last_run: Option<LastRun>,
    pub title: Option<String>,
}

impl MetaState {
    pub fn record_run_start(&mut self) {
        self.runs += 1;
    }

    pub fn record_event(&mut self) {
        self.total_events += 1;
    }

    pub fn record_escape(
        &mut self,
        difficulty: &DifficultyDef,
        ending: &EndingDef,
        floor: u32,
        player: &Player,
    ) {
        self.escapes += 1;
        self.kp += difficulty.kp_win + ending.bonus_kp;
        self.best_floor = self.best_floor.max(floor);
        self.endings.insert(ending.id.clone());
        self.cleared_difficulties.insert(difficulty.id.clone());
        self.last_run = Some(LastRun::new(
            EndCause::Escape,
            floor,
            Some(ending.id.clone()),
            player,
        ));
    }

    pub fn record_death(
        &mut self,
        difficulty: &DifficultyDef,
        cause: EndCause,
        floor: u32,
        player: &Player,
    ) {
        self.kp += difficulty.kp_death;
        self.best_floor = self.best_floor.max(floor);
        self.total_deaths += 1;
        self.last_run = Some(LastRun::new(cause, floor, None, player));
    }

    /// Book a finished run as an escape or a death.
    pub fn record_run_end(&mut self, difficulty: &DifficultyDef, end: &RunEnd) {
        match (end.cause, end.ending.as_ref()) {
            (EndCause::Escape, Some(ending)) => {
                self.record_escape(difficulty, ending, end.floor, &end.player);
            }
            (EndCause::Escape, None) => {
                log::warn!("escape without an ending; booking it as a plain clear");
                self.escapes += 1;
                self.kp += difficulty.kp_win;
                self.best_floor = self.best_floor.max(end.floor);
                self.cleared_difficulties.insert(difficulty.id.clone());
                self.last_run = Some(LastRun::new(EndCause::Escape, end.floor, None, &end.player));
            }
            (cause, _) => self.record_death(difficulty, cause, end.floor, &end.player),
        }
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// Milestone predicate over the meta-state.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetaPredicate {
    MinRuns(u32),
    MinEscapes(u32),
    MinDeaths(u32),
    MinEvents(u32),
    MinEndings(usize),
    MinUnlocks(usize),
    DifficultyCleared(String),
    DifficultiesCleared(Vec<String>),
    EndingCollected(String),
}

impl MetaPredicate {
    #[must_use]
    pub fn holds(&self, meta: &MetaState) -> bool {
        match self {
            Self::MinRuns(n) => meta.runs >= *n,
            Self::MinEscapes(n) => meta.escapes >= *n,
            Self::MinDeaths(n) => meta.total_deaths >= *n,
            Self::MinEvents(n) => meta.total_events >= *n,
            Self::MinEndings(n) => meta.endings.len() >= *n,
            Self::MinUnlocks(n) => meta.unlocked.len() >= *n,
            Self::DifficultyCleared(id) => meta.cleared_difficulties.contains(id),
            Self::DifficultiesCleared(ids) => {
                ids.iter().all(|id| meta.cleared_difficulties.contains(id))
            }
            Self::EndingCollected(id) => meta.endings.contains(id),
        }
    }

    /// Catalog ids this predicate refers to, tagged with their kind.
    #[must_use]
    pub fn references(&self) -> Vec<(&'static str, &str)> {
        match self {
            Self::DifficultyCleared(id) => vec![("difficulty", id.as_str())],
            Self::DifficultiesCleared(ids) => ids.iter().map(|id| ("difficulty", id.as_str())).collect(),
            Self::EndingCollected(id) => vec![("ending", id.as_str())],
            _ => Vec::new(),
        }
    }
}

/// Automatic unlocks whose requirement holds but which are not owned yet.
#[must_use]
pub fn derive_auto_unlocks(meta: &MetaState, catalog: &ProgressionCatalog) -> Vec<String> {
    catalog
        .unlocks()
        .iter()
        .filter(|unlock| !unlock.category.is_purchasable())
        .filter(|unlock| !meta.unlocked.contains(&unlock.id))
        .filter(|unlock| {
            unlock
                .requirement
                .as_ref()
                .is_some_and(|requirement| requirement.is_met(meta))
        })
        .map(|unlock| unlock.id.clone())
        .collect()
}

/// Grant every derivable automatic unlock, returning the newly granted ids.
pub fn apply_auto_unlocks(meta: &mut MetaState, catalog: &ProgressionCatalog) -> Vec<String> {
    let granted = derive_auto_unlocks(meta, catalog);
    for id in &granted {
        log::debug!("auto-unlocked {id}");
        meta.unlocked.insert(id.clone());
    }
    granted
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UnlockError {
    #[error("unknown unlock `{0}`")]
    Unknown(String),
    #[error("unlock `{0}` is already owned")]
    AlreadyOwned(String),
    #[error("{category} unlock `{id}` cannot be bought")]
    NotPurchasable { id: String, category: UnlockCategory },
    #[error("unlock `{id}` requires clearing `{gate}` first")]
    Locked { id: String, gate: String },
    #[error("unlock `{id}` costs {cost} kp but only {available} kp are available")]
    InsufficientKp { id: String, cost: u32, available: u32 },
}

/// Whether `id` could be bought right now.
///
/// # Errors
///
/// Returns the reason the purchase would be refused.
pub fn check_purchase(meta: &MetaState, catalog: &ProgressionCatalog, id: &str) -> Result<u32, UnlockError> {
    let unlock = catalog
        .unlock(id)
        .ok_or_else(|| UnlockError::Unknown(id.to_string()))?;
    if meta.unlocked.contains(id) {
        return Err(UnlockError::AlreadyOwned(id.to_string()));
    }
    if !unlock.category.is_purchasable() {
        return Err(UnlockError::NotPurchasable {
            id: id.to_string(),
            category: unlock.category,
        });
    }
    if let Some(gate) = &unlock.gate
        && !meta.cleared_difficulties.contains(gate)
    {
        return Err(UnlockError::Locked {
            id: id.to_string(),
            gate: gate.clone(),
        });
    }
    if meta.kp < unlock.cost {
        return Err(UnlockError::InsufficientKp {
            id: id.to_string(),
            cost: unlock.cost,
            available: meta.kp,
        });
    }
    Ok(unlock.cost)
}

/// Spend knowledge points on an unlock.
///
/// # Errors
///
/// Refuses unknown, owned, automatic, gated or unaffordable unlocks.
pub fn purchase_unlock(meta: &mut MetaState, catalog: &ProgressionCatalog, id: &str) -> Result<(), UnlockError> {
    let cost = check_purchase(meta, catalog, id)?;
    meta.kp -= cost;
    meta.unlocked.insert(id.to_string());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::endings::EndingDef;
    use crate::progression::fixtures::{difficulty, unlock};
    use crate::progression::UnlockRequirement;

    fn catalog() -> ProgressionCatalog {
        let mut special = unlock("u21", &[]);
        special.category = UnlockCategory::Special;
        special.gate = Some("abyss".into());
        special.cost = 35;
        let mut trophy = unlock("u31", &[]);
        trophy.category = UnlockCategory::Trophy;
        trophy.cost = 0;
        trophy.requirement = Some(UnlockRequirement::Difficulty("easy".into()));
        let mut ending_trophy = unlock("u35", &[]);
        ending_trophy.category = UnlockCategory::Trophy;
        ending_trophy.requirement = Some(UnlockRequirement::Ending("standard".into()));
        let mut achieve = unlock("u36", &[]);
        achieve.category = UnlockCategory::Achieve;
        achieve.requirement = Some(UnlockRequirement::Achievement(MetaPredicate::MinRuns(2)));
        ProgressionCatalog::from_parts(
            vec![difficulty("easy", 12, 8, 0, 0.7), difficulty("abyss", -25, -20, -5, 1.8)],
            vec![unlock("u1", &[]), special, trophy, ending_trophy, achieve],
            vec![standard()],
            Vec::new(),
        )
        .unwrap()
    }

    fn standard() -> EndingDef {
        EndingDef {
            id: "standard".into(),
            name: "Survivor".into(),
            description: String::new(),
            bonus_kp: 0,
            criteria: Vec::new(),
        }
    }

    #[test]
    fn escape_and_death_bookkeeping() {
        let easy = difficulty("easy", 12, 8, 0, 0.7);
        let mut ending = standard();
        ending.bonus_kp = 2;
        let player = Player::new(67, 43, 5);
        let mut meta = MetaState::default();
        meta.record_run_start();
        meta.record_event();
        meta.record_escape(&easy, &ending, 5, &player);
        assert_eq!((meta.runs, meta.escapes, meta.kp, meta.best_floor), (1, 1, 5, 5));
        assert!(meta.endings.contains("standard"));
        assert!(meta.cleared_difficulties.contains("easy"));
        assert_eq!(meta.last_run.as_ref().unwrap().ending.as_deref(), Some("standard"));

        meta.record_death(&easy, EndCause::Mental, 2, &player);
        assert_eq!((meta.kp, meta.best_floor, meta.total_deaths), (6, 5, 1));
        let last = meta.last_run.clone().unwrap();
        assert_eq!(last.cause, EndCause::Mental);
        assert_eq!(last.ending, None);

        meta.reset();
        assert_eq!(meta, MetaState::default());
    }

    #[test]
    fn run_end_dispatches_on_cause() {
        let hard = difficulty("hard", -15, -12, -3, 1.35);
        let mut ending = standard();
        ending.bonus_kp = 2;
        let player = Player::new(40, 23, 12);
        let mut meta = MetaState::default();

        meta.record_run_end(
            &hard,
            &RunEnd {
                cause: EndCause::Escape,
                ending: Some(ending),
                floor: 5,
                player: player.clone(),
                decisions: 16,
            },
        );
        meta.record_run_end(
            &hard,
            &RunEnd {
                cause: EndCause::Exhausted,
                ending: None,
                floor: 5,
                player,
                decisions: 21,
            },
        );
        assert_eq!((meta.escapes, meta.total_deaths, meta.kp), (1, 1, 6));
        assert_eq!(meta.last_run.unwrap().cause, EndCause::Exhausted);
        assert!(meta.cleared_difficulties.contains("hard"));
    }

    #[test]
    fn predicates_cover_counters_and_sets() {
        let mut meta = MetaState {
            runs: 5,
            escapes: 1,
            total_deaths: 4,
            total_events: 80,
            ..MetaState::default()
        };
        meta.cleared_difficulties.extend(["easy".to_string(), "normal".to_string()]);
        meta.endings.insert("scholar".into());
        assert!(MetaPredicate::MinRuns(5).holds(&meta));
        assert!(!MetaPredicate::MinRuns(6).holds(&meta));
        assert!(MetaPredicate::MinEvents(80).holds(&meta));
        assert!(MetaPredicate::MinDeaths(4).holds(&meta));
        assert!(MetaPredicate::MinEndings(1).holds(&meta));
        assert!(!MetaPredicate::MinUnlocks(1).holds(&meta));
        assert!(MetaPredicate::DifficultiesCleared(vec!["easy".into(), "normal".into()]).holds(&meta));
        assert!(!MetaPredicate::DifficultiesCleared(vec!["easy".into(), "hard".into()]).holds(&meta));
        assert!(MetaPredicate::EndingCollected("scholar".into()).holds(&meta));
    }

    #[test]
    fn auto_unlock_derivation_is_idempotent() {
        let catalog = catalog();
        let mut meta = MetaState {
            runs: 2,
            ..MetaState::default()
        };
        meta.cleared_difficulties.insert("easy".into());
        meta.endings.insert("standard".into());
        let granted = apply_auto_unlocks(&mut meta, &catalog);
        assert_eq!(granted, vec!["u31".to_string(), "u35".to_string(), "u36".to_string()]);
        assert!(derive_auto_unlocks(&meta, &catalog).is_empty());
        assert!(apply_auto_unlocks(&mut meta, &catalog).is_empty());
        assert!(!meta.unlocked.contains("u21"), "special unlocks are never automatic");
    }

    #[test]
    fn purchase_rules() {
        let catalog = catalog();
        let mut meta = MetaState {
            kp: 40,
            ..MetaState::default()
        };
        assert_eq!(
            purchase_unlock(&mut meta, &catalog, "u99"),
            Err(UnlockError::Unknown("u99".into()))
        );
        assert_eq!(
            purchase_unlock(&mut meta, &catalog, "u31"),
            Err(UnlockError::NotPurchasable {
                id: "u31".into(),
                category: UnlockCategory::Trophy
            })
        );
        assert_eq!(
            purchase_unlock(&mut meta, &catalog, "u21"),
            Err(UnlockError::Locked {
                id: "u21".into(),
                gate: "abyss".into()
            })
        );
        purchase_unlock(&mut meta, &catalog, "u1").unwrap();
        assert_eq!(meta.kp, 37);
        assert_eq!(
            purchase_unlock(&mut meta, &catalog, "u1"),
            Err(UnlockError::AlreadyOwned("u1".into()))
        );

        meta.cleared_difficulties.insert("abyss".into());
        meta.kp = 20;
        assert_eq!(
            purchase_unlock(&mut meta, &catalog, "u21"),
            Err(UnlockError::InsufficientKp {
                id: "u21".into(),
                cost: 35,
                available: 20
            })
        );
        meta.kp = 35;
        purchase_unlock(&mut meta, &catalog, "u21").unwrap();
        assert_eq!(meta.kp, 0);
    }

    #[test]
    fn predicates_serialize_externally_tagged() {
        let json = serde_json::to_string(&MetaPredicate::MinRuns(3)).unwrap();
        assert_eq!(json, r#"{"min_runs":3}"#);
        let all: MetaPredicate =
            serde_json::from_str(r#"{"difficulties_cleared":["easy","normal"]}"#).unwrap();
        assert_eq!(all.references(), vec![("difficulty", "easy"), ("difficulty", "normal")]);
    }
}
