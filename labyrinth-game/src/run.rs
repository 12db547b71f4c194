//! Run controller: floor and step counters, chains, shortcuts and the boss retry loop.

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

use crate::choice::{process_choice, ChoiceError, ImpactClass};
use crate::constants::{BOSS_EVENT_ID, BOSS_INTERLUDE_EVENTS, EVENTS_PER_FLOOR, MAX_BOSS_ATTEMPTS, MAX_FLOOR};
use crate::data::{Event, EventCatalog, OutcomeFlag};
use crate::drain::Drain;
use crate::effects::{EffectKey, EffectState};
use crate::endings::{determine_ending, EndingContext, EndingDef};
use crate::events::{find_chain_event, pick_event};
use crate::meta::{EndCause, MetaState};
use crate::numbers::ceil_half;
use crate::player::{create_player, Deltas, Player};
use crate::progression::{DifficultyDef, ProgressionCatalog};

/// Where the run currently stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunPhase {
    FloorIntro(u32),
    Event,
    Result,
    Finished,
}

impl fmt::Display for RunPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::FloorIntro(floor) => write!(f, "floor intro {floor}"),
            Self::Event => f.write_str("event"),
            Self::Result => f.write_str("result"),
            Self::Finished => f.write_str("finished"),
        }
    }
}

/// What the caller should present next.
#[derive(Debug, Clone, PartialEq)]
pub enum RunStep {
    FloorIntro(u32),
    Event(String),
    Finished(RunEnd),
}

/// Terminal summary of a run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunEnd {
    pub cause: EndCause,
    /// Set for escapes only.
    pub ending: Option<EndingDef>,
    pub floor: u32,
    pub player: Player,
    pub decisions: usize,
}

/// One decision in the run log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    pub floor: u32,
    pub step: u32,
    pub event: String,
    pub choice: String,
    pub hp: i32,
    pub mn: i32,
    pub inf: i32,
}

/// Owned result of one decision, for presentation.
#[derive(Debug, Clone, PartialEq)]
pub struct ChoiceReport {
    pub event_id: String,
    pub choice: String,
    pub outcome: String,
    pub deltas: Deltas,
    pub flag: Option<OutcomeFlag>,
    pub status_flag: Option<OutcomeFlag>,
    pub chain_id: Option<String>,
    pub drain: Option<Drain>,
    pub impact: ImpactClass,
    /// Second life pulled the player back from zero on this decision.
    pub revived: bool,
    pub player: Player,
    pub end: Option<RunEnd>,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RunError {
    #[error("cannot {action} during {phase}")]
    UnexpectedPhase {
        action: &'static str,
        phase: RunPhase,
    },
    #[error("the run has already finished")]
    Finished,
    #[error("event `{0}` is not in the catalog")]
    MissingEvent(String),
    #[error(transparent)]
    Choice(#[from] ChoiceError),
}

/// Percentage of the descent completed, capped at 100.
#[must_use]
pub fn progress(floor: u32, step: u32) -> f64 {
    let done = f64::from(floor.saturating_sub(1) * EVENTS_PER_FLOOR + step);
    let total = f64::from(MAX_FLOOR * EVENTS_PER_FLOOR);
    (done / total * 100.0).min(100.0)
}

#[derive(Debug, Clone)]
pub struct RunController {
    events: Arc<EventCatalog>,
    progression: Arc<ProgressionCatalog>,
    difficulty: DifficultyDef,
    effects: EffectState,
    player: Player,
    floor: u32,
    step: u32,
    used_ids: Vec<String>,
    log: Vec<LogEntry>,
    current: Option<String>,
    pending_chain: Option<String>,
    last_flag: Option<OutcomeFlag>,
    second_life_used: bool,
    phase: RunPhase,
    end: Option<RunEnd>,
}

impl RunController {
    /// Begin a run at the first floor intro.
    #[must_use]
    pub fn start(
        events: Arc<EventCatalog>,
        progression: Arc<ProgressionCatalog>,
        difficulty: DifficultyDef,
        effects: EffectState,
    ) -> Self {
        let player = create_player(&difficulty, &effects);
        Self {
            events,
            progression,
            difficulty,
            effects,
            player,
            floor: 1,
            step: 0,
            used_ids: Vec::new(),
            log: Vec::new(),
            current: None,
            pending_chain: None,
            last_flag: None,
            second_life_used: false,
            phase: RunPhase::FloorIntro(1),
            end: None,
        }
    }

    /// Leave the floor intro and present the first event of the floor.
    ///
    /// # Errors
    ///
    /// Fails unless the run is at a floor intro.
    pub fn enter_floor<R: Rng>(&mut self, meta: &MetaState, rng: &mut R) -> Result<RunStep, RunError> {
        self.expect_phase("enter a floor", |phase| matches!(phase, RunPhase::FloorIntro(_)))?;
        if let Some(step) = self.continue_chain() {
            return Ok(step);
        }
        Ok(self.present_open_event(meta, rng))
    }

    /// Resolve a choice of the current event.
    ///
    /// # Errors
    ///
    /// Fails when no event is awaiting a choice or `index` is not a valid choice.
    pub fn choose(&mut self, index: usize) -> Result<ChoiceReport, RunError> {
        self.expect_phase("choose", |phase| phase == RunPhase::Event)?;
        let events = Arc::clone(&self.events);
        let event = self.current_in(&events)?;
        let result = process_choice(event, index, &self.player, &self.effects, &self.difficulty)?;

        let mut player = result.player.clone();
        let mut revived = false;
        if self.effects.flag(EffectKey::SecondLife) && !self.second_life_used && player.is_dead() {
            player.hp = player.hp.max(ceil_half(player.max_hp));
            player.mn = player.mn.max(ceil_half(player.max_mn));
            self.second_life_used = true;
            revived = true;
            log::debug!("second life revived the player on floor {}", self.floor);
        }

        self.log.push(LogEntry {
            floor: self.floor,
            step: self.step + 1,
            event: event.id.clone(),
            choice: result.choice.text.clone(),
            hp: result.deltas.hp,
            mn: result.deltas.mn,
            inf: result.deltas.inf,
        });
        self.player = player;
        self.last_flag = result.outcome.flag.clone();
        self.pending_chain = result.chain_id.map(str::to_string);
        self.phase = RunPhase::Result;

        let end = if result.outcome.flag == Some(OutcomeFlag::Escape) {
            Some(self.finish_escape())
        } else if self.player.is_dead() {
            let cause = if self.player.hp <= 0 {
                EndCause::Health
            } else {
                EndCause::Mental
            };
            Some(self.finish(cause))
        } else {
            None
        };

        Ok(ChoiceReport {
            event_id: event.id.clone(),
            choice: result.choice.text.clone(),
            outcome: result.outcome.text.clone(),
            deltas: result.deltas,
            flag: result.outcome.flag.clone(),
            status_flag: result.status_flag.cloned(),
            chain_id: self.pending_chain.clone(),
            drain: result.drain,
            impact: result.impact,
            revived,
            player: self.player.clone(),
            end,
        })
    }

    /// Move on from a resolved event.
    ///
    /// # Errors
    ///
    /// Fails unless the run is showing a result.
    pub fn proceed<R: Rng>(&mut self, meta: &MetaState, rng: &mut R) -> Result<RunStep, RunError> {
        self.expect_phase("proceed", |phase| phase == RunPhase::Result)?;
        self.step += 1;
        if let Some(id) = self.current.take() {
            self.used_ids.push(id);
        }

        if let Some(step) = self.continue_chain() {
            return Ok(step);
        }

        let shortcut = self.last_flag.take() == Some(OutcomeFlag::Shortcut);
        let next_floor = if shortcut {
            (self.floor + 2).min(MAX_FLOOR)
        } else if self.step >= EVENTS_PER_FLOOR {
            self.floor + 1
        } else {
            self.floor
        };

        if next_floor > self.floor && next_floor <= MAX_FLOOR {
            self.floor = next_floor;
            self.step = 0;
            self.phase = RunPhase::FloorIntro(next_floor);
            return Ok(RunStep::FloorIntro(next_floor));
        }

        if next_floor > MAX_FLOOR {
            return Ok(self.boss_or_interlude(meta, rng));
        }

        Ok(self.present_open_event(meta, rng))
    }

    fn boss_or_interlude<R: Rng>(&mut self, meta: &MetaState, rng: &mut R) -> RunStep {
        let boss_present = self.events.boss().is_some();
        let attempts = self.boss_attempts();
        if boss_present && attempts == 0 {
            return self.present(BOSS_EVENT_ID.to_string());
        }

        let since_boss = self
            .used_ids
            .iter()
            .rposition(|id| id == BOSS_EVENT_ID)
            .map_or(self.used_ids.len(), |idx| self.used_ids.len() - idx - 1);
        if attempts < MAX_BOSS_ATTEMPTS && since_boss < BOSS_INTERLUDE_EVENTS {
            let events = Arc::clone(&self.events);
            if let Some(next) = pick_event(
                events.events(),
                self.floor,
                &self.used_ids,
                meta,
                &self.effects,
                rng,
            ) {
                return self.present(next.id.clone());
            }
        }
        if attempts < MAX_BOSS_ATTEMPTS && boss_present {
            log::debug!("boss retry {} of {MAX_BOSS_ATTEMPTS}", attempts + 1);
            return self.present(BOSS_EVENT_ID.to_string());
        }

        log::debug!("boss attempts exhausted after {attempts} tries");
        RunStep::Finished(self.finish(EndCause::Exhausted))
    }

    fn present_open_event<R: Rng>(&mut self, meta: &MetaState, rng: &mut R) -> RunStep {
        let events = Arc::clone(&self.events);
        match pick_event(
            events.events(),
            self.floor,
            &self.used_ids,
            meta,
            &self.effects,
            rng,
        ) {
            Some(event) => self.present(event.id.clone()),
            None => {
                log::warn!("floor {} ran out of events; ending the run", self.floor);
                RunStep::Finished(self.finish(EndCause::Exhausted))
            }
        }
    }

    fn continue_chain(&mut self) -> Option<RunStep> {
        let target = self.pending_chain.take()?;
        if find_chain_event(self.events.events(), &target).is_some() {
            log::debug!("continuing chain into {target}");
            Some(self.present(target))
        } else {
            log::warn!("chain target `{target}` is missing; continuing normally");
            None
        }
    }

    fn present(&mut self, id: String) -> RunStep {
        self.current = Some(id.clone());
        self.phase = RunPhase::Event;
        RunStep::Event(id)
    }

    /// Called after the deciding choice is logged; endings judge the log before it.
    fn finish_escape(&mut self) -> RunEnd {
        let ctx = EndingContext {
            player: &self.player,
            log_len: self.log.len().saturating_sub(1),
            difficulty: &self.difficulty,
        };
        let ending = determine_ending(self.progression.endings(), &ctx).cloned();
        let mut end = self.finish(EndCause::Escape);
        end.ending = ending;
        self.end = Some(end.clone());
        end
    }

    fn finish(&mut self, cause: EndCause) -> RunEnd {
        let end = RunEnd {
            cause,
            ending: None,
            floor: self.floor,
            player: self.player.clone(),
            decisions: self.log.len(),
        };
        self.phase = RunPhase::Finished;
        self.end = Some(end.clone());
        end
    }

    fn expect_phase(&self, action: &'static str, allowed: impl Fn(RunPhase) -> bool) -> Result<(), RunError> {
        if self.phase == RunPhase::Finished {
            return Err(RunError::Finished);
        }
        if allowed(self.phase) {
            Ok(())
        } else {
            Err(RunError::UnexpectedPhase {
                action,
                phase: self.phase,
            })
        }
    }

    fn current_in<'a>(&self, events: &'a EventCatalog) -> Result<&'a Event, RunError> {
        let id = self
            .current
            .as_deref()
            .ok_or(RunError::UnexpectedPhase {
                action: "choose",
                phase: self.phase,
            })?;
        events
            .get(id)
            .ok_or_else(|| RunError::MissingEvent(id.to_string()))
    }

    #[must_use]
    pub fn current_event(&self) -> Option<&Event> {
        self.current.as_deref().and_then(|id| self.events.get(id))
    }

    #[must_use]
    pub fn boss_attempts(&self) -> usize {
        self.used_ids.iter().filter(|id| *id == BOSS_EVENT_ID).count()
    }

    #[must_use]
    pub const fn player(&self) -> &Player {
        &self.player
    }

    #[must_use]
    pub const fn floor(&self) -> u32 {
        self.floor
    }

    #[must_use]
    pub const fn step(&self) -> u32 {
        self.step
    }

    #[must_use]
    pub const fn phase(&self) -> RunPhase {
        self.phase
    }

    #[must_use]
    pub fn log(&self) -> &[LogEntry] {
        &self.log
    }

    #[must_use]
    pub fn used_ids(&self) -> &[String] {
        &self.used_ids
    }

    #[must_use]
    pub fn pending_chain(&self) -> Option<&str> {
        self.pending_chain.as_deref()
    }

    #[must_use]
    pub const fn difficulty(&self) -> &DifficultyDef {
        &self.difficulty
    }

    #[must_use]
    pub const fn effects(&self) -> &EffectState {
        &self.effects
    }

    #[must_use]
    pub const fn second_life_used(&self) -> bool {
        self.second_life_used
    }

    #[must_use]
    pub const fn end(&self) -> Option<&RunEnd> {
        self.end.as_ref()
    }

    #[must_use]
    pub const fn is_finished(&self) -> bool {
        matches!(self.phase, RunPhase::Finished)
    }

    #[must_use]
    pub fn progress(&self) -> f64 {
        progress(self.floor, self.step)
    }
}
