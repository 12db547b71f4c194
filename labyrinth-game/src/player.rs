//! Player record and the clamped state transition applied after every outcome.

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use std::fmt;

use crate::constants::{BASE_HP, BASE_INF, BASE_MN};
use crate::data::{OutcomeFlag, Status};
use crate::effects::{EffectKey, EffectState};
use crate::progression::DifficultyDef;

pub type StatusSet = SmallVec<[Status; 4]>;

/// The three resources a player tracks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Resource {
    Hp,
    Mn,
    Inf,
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Hp => "hp",
            Self::Mn => "mn",
            Self::Inf => "inf",
        })
    }
}

/// Resource changes produced by an outcome after modifiers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Deltas {
    pub hp: i32,
    pub mn: i32,
    pub inf: i32,
}

impl Deltas {
    #[must_use]
    pub const fn new(hp: i32, mn: i32, inf: i32) -> Self {
        Self { hp, mn, inf }
    }

    #[must_use]
    pub const fn is_zero(&self) -> bool {
        self.hp == 0 && self.mn == 0 && self.inf == 0
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Player {
    pub hp: i32,
    pub max_hp: i32,
    pub mn: i32,
    pub max_mn: i32,
    pub inf: i32,
    #[serde(default)]
    pub status: StatusSet,
}

impl Player {
    /// A player at full resources with no status.
    #[must_use]
    pub fn new(max_hp: i32, max_mn: i32, inf: i32) -> Self {
        Self {
            hp: max_hp,
            max_hp,
            mn: max_mn,
            max_mn,
            inf,
            status: StatusSet::new(),
        }
    }

    #[must_use]
    pub fn has_status(&self, status: Status) -> bool {
        self.status.contains(&status)
    }

    #[must_use]
    pub fn resource(&self, resource: Resource) -> i32 {
        match resource {
            Resource::Hp => self.hp,
            Resource::Mn => self.mn,
            Resource::Inf => self.inf,
        }
    }

    #[must_use]
    pub const fn is_dead(&self) -> bool {
        self.hp <= 0 || self.mn <= 0
    }
}

/// Build the starting player for a run. Starting hp and mn never drop below 1.
#[must_use]
pub fn create_player(difficulty: &DifficultyDef, effects: &EffectState) -> Player {
    let max_hp = (BASE_HP + effects.bonus(EffectKey::HpBonus) + difficulty.hp_mod).max(1);
    let max_mn = (BASE_MN + effects.bonus(EffectKey::MentalBonus) + difficulty.mn_mod).max(1);
    let inf = (BASE_INF + effects.bonus(EffectKey::InfoBonus)).max(0);
    Player::new(max_hp, max_mn, inf)
}

/// Apply deltas and an optional status flag, returning a new clamped player.
#[must_use]
pub fn apply_to_player(player: &Player, deltas: Deltas, flag: Option<&OutcomeFlag>) -> Player {
    let mut next = player.clone();
    match flag {
        Some(OutcomeFlag::AddStatus(status)) if !next.has_status(*status) => {
            next.status.push(*status);
        }
        Some(OutcomeFlag::RemoveStatus(status)) => next.status.retain(|s| s != status),
        _ => {}
    }
    next.hp = player.hp.saturating_add(deltas.hp).clamp(0, player.max_hp);
    next.mn = player.mn.saturating_add(deltas.mn).clamp(0, player.max_mn);
    next.inf = player.inf.saturating_add(deltas.inf).max(0);
    next
}
