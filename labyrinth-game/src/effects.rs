//! Permanent effect keys and the aggregate effect state built from owned unlocks.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::numbers::round_f64_to_i32;
use crate::progression::UnlockDef;

/// How values for one effect key combine when several unlocks provide it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MergeKind {
    /// Values sum, starting from 0.
    Additive,
    /// Values multiply, starting from 1.
    Multiplicative,
    /// Any `true` wins; a later `false` never clears it.
    Latch,
}

impl MergeKind {
    #[must_use]
    pub const fn identity(self) -> EffectValue {
        match self {
            Self::Additive => EffectValue::Amount(0.0),
            Self::Multiplicative => EffectValue::Amount(1.0),
            Self::Latch => EffectValue::Flag(false),
        }
    }

    /// Combine two values of this kind, or `None` when either has the wrong shape.
    #[must_use]
    pub fn merge(self, acc: EffectValue, value: EffectValue) -> Option<EffectValue> {
        match (self, acc, value) {
            (Self::Additive, EffectValue::Amount(a), EffectValue::Amount(b)) => {
                Some(EffectValue::Amount(a + b))
            }
            (Self::Multiplicative, EffectValue::Amount(a), EffectValue::Amount(b)) => {
                Some(EffectValue::Amount(a * b))
            }
            (Self::Latch, EffectValue::Flag(a), EffectValue::Flag(b)) => {
                Some(EffectValue::Flag(a || b))
            }
            _ => None,
        }
    }

    #[must_use]
    pub const fn accepts(self, value: EffectValue) -> bool {
        matches!(
            (self, value),
            (Self::Additive | Self::Multiplicative, EffectValue::Amount(_))
                | (Self::Latch, EffectValue::Flag(_))
        )
    }
}

/// A single effect value as written in the unlock catalog.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EffectValue {
    Flag(bool),
    Amount(f64),
}

/// Every permanent effect an unlock can grant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EffectKey {
    HpBonus,
    MentalBonus,
    InfoBonus,
    InfoMult,
    HealMult,
    MnReduce,
    HpReduce,
    DangerSense,
    BleedReduce,
    DrainImmune,
    CurseImmune,
    SecondLife,
    ChainBoost,
    Negotiator,
    MentalSense,
}

impl EffectKey {
    pub const ALL: [Self; 15] = [
        Self::HpBonus,
        Self::MentalBonus,
        Self::InfoBonus,
        Self::InfoMult,
        Self::HealMult,
        Self::MnReduce,
        Self::HpReduce,
        Self::DangerSense,
        Self::BleedReduce,
        Self::DrainImmune,
        Self::CurseImmune,
        Self::SecondLife,
        Self::ChainBoost,
        Self::Negotiator,
        Self::MentalSense,
    ];
    pub const COUNT: usize = Self::ALL.len();

    #[must_use]
    pub const fn merge_kind(self) -> MergeKind {
        match self {
            Self::HpBonus | Self::MentalBonus | Self::InfoBonus => MergeKind::Additive,
            Self::InfoMult | Self::HealMult | Self::MnReduce | Self::HpReduce => {
                MergeKind::Multiplicative
            }
            Self::DangerSense
            | Self::BleedReduce
            | Self::DrainImmune
            | Self::CurseImmune
            | Self::SecondLife
            | Self::ChainBoost
            | Self::Negotiator
            | Self::MentalSense => MergeKind::Latch,
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::HpBonus => "hp_bonus",
            Self::MentalBonus => "mental_bonus",
            Self::InfoBonus => "info_bonus",
            Self::InfoMult => "info_mult",
            Self::HealMult => "heal_mult",
            Self::MnReduce => "mn_reduce",
            Self::HpReduce => "hp_reduce",
            Self::DangerSense => "danger_sense",
            Self::BleedReduce => "bleed_reduce",
            Self::DrainImmune => "drain_immune",
            Self::CurseImmune => "curse_immune",
            Self::SecondLife => "second_life",
            Self::ChainBoost => "chain_boost",
            Self::Negotiator => "negotiator",
            Self::MentalSense => "mental_sense",
        }
    }

    const fn slot(self) -> usize {
        self as usize
    }
}

impl fmt::Display for EffectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Aggregated permanent effects. Every key is always populated.
#[derive(Debug, Clone, PartialEq)]
pub struct EffectState {
    values: [EffectValue; EffectKey::COUNT],
}

impl Default for EffectState {
    fn default() -> Self {
        Self {
            values: EffectKey::ALL.map(|key| key.merge_kind().identity()),
        }
    }
}

impl EffectState {
    #[must_use]
    pub const fn get(&self, key: EffectKey) -> EffectValue {
        self.values[key.slot()]
    }

    /// Numeric value of an additive or multiplicative key.
    #[must_use]
    pub fn amount(&self, key: EffectKey) -> f64 {
        match self.get(key) {
            EffectValue::Amount(value) => value,
            EffectValue::Flag(_) => 0.0,
        }
    }

    /// Additive key rounded to a whole resource bonus.
    #[must_use]
    pub fn bonus(&self, key: EffectKey) -> i32 {
        round_f64_to_i32(self.amount(key))
    }

    #[must_use]
    pub const fn flag(&self, key: EffectKey) -> bool {
        matches!(self.get(key), EffectValue::Flag(true))
    }

    /// Merge `value` into `key`; returns `false` when the value has the wrong shape.
    pub fn apply(&mut self, key: EffectKey, value: EffectValue) -> bool {
        let slot = &mut self.values[key.slot()];
        match key.merge_kind().merge(*slot, value) {
            Some(merged) => {
                *slot = merged;
                true
            }
            None => false,
        }
    }

    /// Builder form of [`EffectState::apply`]; mistyped values are ignored.
    #[must_use]
    pub fn with(mut self, key: EffectKey, value: EffectValue) -> Self {
        self.apply(key, value);
        self
    }

    /// Per-key merge of two aggregates.
    #[must_use]
    pub fn combine(&self, other: &Self) -> Self {
        let mut merged = self.clone();
        for key in EffectKey::ALL {
            merged.apply(key, other.get(key));
        }
        merged
    }

    pub fn iter(&self) -> impl Iterator<Item = (EffectKey, EffectValue)> + '_ {
        EffectKey::ALL.into_iter().map(|key| (key, self.get(key)))
    }
}

/// Build the effect state for a set of owned unlock ids.
///
/// Unknown ids are skipped. The result depends only on the set of ids, not their order.
pub fn aggregate<I>(unlock_ids: I, unlocks: &[UnlockDef]) -> EffectState
where
    I: IntoIterator,
    I::Item: AsRef<str>,
{
    let mut state = EffectState::default();
    for id in unlock_ids {
        let id = id.as_ref();
        let Some(unlock) = unlocks.iter().find(|unlock| unlock.id == id) else {
            continue;
        };
        for (&key, &value) in &unlock.effects {
            if !state.apply(key, value) {
                log::warn!("unlock `{id}` gives `{key}` a mistyped value {value:?}; ignored");
            }
        }
    }
    state
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progression::fixtures::unlock;

    fn catalog() -> Vec<UnlockDef> {
        vec![
            unlock("u1", &[(EffectKey::InfoBonus, EffectValue::Amount(3.0))]),
            unlock("u2", &[(EffectKey::HpBonus, EffectValue::Amount(5.0))]),
            unlock("u4", &[(EffectKey::InfoMult, EffectValue::Amount(1.1))]),
            unlock("u6", &[(EffectKey::DangerSense, EffectValue::Flag(true))]),
            unlock(
                "u11",
                &[
                    (EffectKey::InfoBonus, EffectValue::Amount(5.0)),
                    (EffectKey::InfoMult, EffectValue::Amount(1.15)),
                ],
            ),
            unlock("off", &[(EffectKey::DangerSense, EffectValue::Flag(false))]),
            unlock("broken", &[(EffectKey::HealMult, EffectValue::Flag(true))]),
        ]
    }

    #[test]
    fn empty_aggregate_is_default() {
        let state = aggregate(Vec::<String>::new(), &catalog());
        assert_eq!(state, EffectState::default());
        assert!((state.amount(EffectKey::HealMult) - 1.0).abs() < f64::EPSILON);
        assert!(state.amount(EffectKey::HpBonus).abs() < f64::EPSILON);
        assert!(!state.flag(EffectKey::SecondLife));
        assert_eq!(state.iter().count(), EffectKey::COUNT);
    }

    #[test]
    fn merge_kinds_follow_table() {
        let state = aggregate(["u1", "u11", "u4", "u6"], &catalog());
        assert_eq!(state.bonus(EffectKey::InfoBonus), 8);
        assert!((state.amount(EffectKey::InfoMult) - 1.1 * 1.15).abs() < 1e-12);
        assert!(state.flag(EffectKey::DangerSense));
    }

    #[test]
    fn latch_never_reverts() {
        let forward = aggregate(["u6", "off"], &catalog());
        let backward = aggregate(["off", "u6"], &catalog());
        assert!(forward.flag(EffectKey::DangerSense));
        assert_eq!(forward, backward);
    }

    #[test]
    fn unknown_and_mistyped_entries_are_skipped() {
        let state = aggregate(["nope", "broken", "u2"], &catalog());
        assert_eq!(state.bonus(EffectKey::HpBonus), 5);
        assert_eq!(state.get(EffectKey::HealMult), EffectValue::Amount(1.0));
    }

    #[test]
    fn disjoint_sets_combine_per_key() {
        let units = catalog();
        let a = aggregate(["u1", "u6"], &units);
        let b = aggregate(["u2", "u4"], &units);
        let union = aggregate(["u1", "u6", "u2", "u4"], &units);
        assert_eq!(a.combine(&b), union);
        assert_eq!(b.combine(&a), union);
    }

    #[test]
    fn merge_rejects_mismatched_shapes() {
        assert_eq!(
            MergeKind::Latch.merge(EffectValue::Flag(false), EffectValue::Amount(1.0)),
            None
        );
        assert!(MergeKind::Additive.accepts(EffectValue::Amount(2.0)));
        assert!(!MergeKind::Multiplicative.accepts(EffectValue::Flag(true)));
    }

    #[test]
    fn effect_values_parse_untagged() {
        let flag: EffectValue = serde_json::from_str("true").unwrap();
        let amount: EffectValue = serde_json::from_str("1.12").unwrap();
        let whole: EffectValue = serde_json::from_str("5").unwrap();
        assert_eq!(flag, EffectValue::Flag(true));
        assert_eq!(amount, EffectValue::Amount(1.12));
        assert_eq!(whole, EffectValue::Amount(5.0));
    }
}
