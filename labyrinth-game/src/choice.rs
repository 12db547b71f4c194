//! Choice processing: resolve, modify, apply, drain, classify.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::data::{Choice, Event, Outcome, OutcomeFlag, Status};
use crate::constants::{BIG_DAMAGE_HP, HEAVY_MENTAL_DAMAGE_MN};
use crate::drain::{compute_drain, Drain};
use crate::effects::{EffectKey, EffectState};
use crate::modifiers::apply_modifiers;
use crate::player::{apply_to_player, Deltas, Player};
use crate::progression::DifficultyDef;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChoiceError {
    #[error("choice index {index} is out of range for event `{event}` with {len} choice(s)")]
    IndexOutOfRange {
        event: String,
        index: usize,
        len: usize,
    },
    #[error("choice `{0}` has no outcomes")]
    NoOutcomes(String),
}

/// Feedback class of a decision's net impact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImpactClass {
    BigDamage,
    Damage,
    Heal,
    None,
}

#[must_use]
pub const fn classify_impact(hp: i32, mn: i32) -> ImpactClass {
    if hp <= BIG_DAMAGE_HP {
        ImpactClass::BigDamage
    } else if hp < 0 || mn <= HEAVY_MENTAL_DAMAGE_MN {
        ImpactClass::Damage
    } else if hp > 0 {
        ImpactClass::Heal
    } else {
        ImpactClass::None
    }
}

/// Pick the outcome that applies to `choice`.
///
/// The first non-default outcome whose condition holds wins, then the first `default`,
/// then the first outcome of the list.
///
/// # Errors
///
/// Returns [`ChoiceError::NoOutcomes`] when the choice has no outcomes at all.
pub fn resolve_outcome<'c>(
    choice: &'c Choice,
    player: &Player,
    effects: &EffectState,
) -> Result<&'c Outcome, ChoiceError> {
    choice
        .outcomes
        .iter()
        .find(|o| !o.condition.is_default() && o.condition.evaluate(player, effects))
        .or_else(|| choice.outcomes.iter().find(|o| o.condition.is_default()))
        .or_else(|| choice.outcomes.first())
        .ok_or_else(|| ChoiceError::NoOutcomes(choice.text.clone()))
}

/// Everything a single decision produced. Borrowed parts point into the event.
#[derive(Debug, Clone, PartialEq)]
pub struct ChoiceResult<'e> {
    pub choice: &'e Choice,
    pub outcome: &'e Outcome,
    pub deltas: Deltas,
    pub chain_id: Option<&'e str>,
    /// Flag applied to the player; `None` for chains and suppressed curses.
    pub status_flag: Option<&'e OutcomeFlag>,
    pub player: Player,
    pub drain: Option<Drain>,
    pub impact: ImpactClass,
}

/// Run one player decision through the full pipeline without side effects.
///
/// # Errors
///
/// Fails when `index` does not name a choice of `event` or the choice has no outcomes.
pub fn process_choice<'e>(
    event: &'e Event,
    index: usize,
    player: &Player,
    effects: &EffectState,
    difficulty: &DifficultyDef,
) -> Result<ChoiceResult<'e>, ChoiceError> {
    let choice = event
        .choices
        .get(index)
        .ok_or_else(|| ChoiceError::IndexOutOfRange {
            event: event.id.clone(),
            index,
            len: event.choices.len(),
        })?;
    let outcome = resolve_outcome(choice, player, effects)?;
    let deltas = apply_modifiers(outcome, effects, difficulty, &player.status);

    let chain_id = outcome.flag.as_ref().and_then(OutcomeFlag::chain_target);
    let status_flag = match outcome.flag.as_ref() {
        _ if chain_id.is_some() => None,
        Some(OutcomeFlag::AddStatus(Status::Cursed)) if effects.flag(EffectKey::CurseImmune) => {
            None
        }
        flag => flag,
    };

    let updated = apply_to_player(player, deltas, status_flag);
    let drained = compute_drain(&updated, effects, difficulty);

    Ok(ChoiceResult {
        choice,
        outcome,
        deltas,
        chain_id,
        status_flag,
        player: drained.player,
        drain: drained.drain,
        impact: classify_impact(deltas.hp, deltas.mn),
    })
}
