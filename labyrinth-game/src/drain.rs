//! Passive per-decision resource drain: difficulty drain plus status ticks.

use serde::{Deserialize, Serialize};

use crate::constants::{BLEED_REDUCE_FACTOR, BLEEDING_TICK_HP, FEAR_TICK_MN};
use crate::data::Status;
use crate::effects::{EffectKey, EffectState};
use crate::numbers::scale_round;
use crate::player::Player;
use crate::progression::DifficultyDef;

/// Amount drained in one decision.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Drain {
    pub hp: i32,
    pub mn: i32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DrainResult {
    pub player: Player,
    /// `None` when nothing was drained, so callers can skip drain feedback.
    pub drain: Option<Drain>,
}

/// Passive tick for a status, if it has one.
#[must_use]
pub const fn status_tick(status: Status) -> Option<Drain> {
    match status {
        Status::Bleeding => Some(Drain {
            hp: BLEEDING_TICK_HP,
            mn: 0,
        }),
        Status::Fear => Some(Drain {
            hp: 0,
            mn: FEAR_TICK_MN,
        }),
        Status::Injured | Status::Confused | Status::Cursed => None,
    }
}

#[must_use]
pub fn compute_drain(player: &Player, effects: &EffectState, difficulty: &DifficultyDef) -> DrainResult {
    let mut total = Drain {
        hp: 0,
        mn: if effects.flag(EffectKey::DrainImmune) {
            0
        } else {
            difficulty.drain_mod
        },
    };

    for &status in &player.status {
        let Some(tick) = status_tick(status) else {
            continue;
        };
        let hp = if status == Status::Bleeding && effects.flag(EffectKey::BleedReduce) {
            scale_round(tick.hp, BLEED_REDUCE_FACTOR)
        } else {
            tick.hp
        };
        total.hp += hp;
        total.mn += tick.mn;
    }

    if total == Drain::default() {
        return DrainResult {
            player: player.clone(),
            drain: None,
        };
    }

    let mut next = player.clone();
    next.hp = (player.hp + total.hp).clamp(0, player.max_hp);
    next.mn = (player.mn + total.mn).clamp(0, player.max_mn);
    DrainResult {
        player: next,
        drain: Some(total),
    }
}
