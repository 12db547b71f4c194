//! Outcome modifier pipeline.
//!
//! Steps run in a fixed order, each rounding on its own:
//! 1. heal multiplier on positive hp, damage reduction on negative hp
//! 2. difficulty damage multiplier on negative hp and mn (skipped at exactly 1)
//! 3. information multiplier on positive inf
//! 4. mental damage reduction on negative mn
//! 5. curse halves positive inf

use crate::constants::{CURSE_INFO_FACTOR, FLOAT_EPSILON};
use crate::data::{Outcome, Status};
use crate::effects::{EffectKey, EffectState};
use crate::numbers::scale_round;
use crate::player::Deltas;
use crate::progression::DifficultyDef;

/// Turn raw outcome deltas into the deltas actually applied to the player.
#[must_use]
pub fn apply_modifiers(
    outcome: &Outcome,
    effects: &EffectState,
    difficulty: &DifficultyDef,
    status: &[Status],
) -> Deltas {
    let mut hp = outcome.hp;
    let mut mn = outcome.mn;
    let mut inf = outcome.inf;

    if hp > 0 {
        hp = scale_round(hp, effects.amount(EffectKey::HealMult));
    }
    if hp < 0 {
        hp = scale_round(hp, effects.amount(EffectKey::HpReduce));
    }

    if (difficulty.dmg_mult - 1.0).abs() > FLOAT_EPSILON {
        if hp < 0 {
            hp = scale_round(hp, difficulty.dmg_mult);
        }
        if mn < 0 {
            mn = scale_round(mn, difficulty.dmg_mult);
        }
    }

    if inf > 0 {
        inf = scale_round(inf, effects.amount(EffectKey::InfoMult));
    }
    if mn < 0 {
        mn = scale_round(mn, effects.amount(EffectKey::MnReduce));
    }

    if inf > 0 && status.contains(&Status::Cursed) {
        inf = scale_round(inf, CURSE_INFO_FACTOR);
    }

    Deltas { hp, mn, inf }
}
