//! Ending classification for escaped runs
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::data::Status;
use crate::player::Player;
use crate::progression::DifficultyDef;

/// One predicate over the final run state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EndingCriterion {
    /// Run was played on this difficulty.
    Difficulty(String),
    /// hp strictly above this fraction of max hp.
    HpAbove(f64),
    /// mn strictly above this fraction of max mn.
    MnAbove(f64),
    /// hp at most this fraction of max hp, and still above zero.
    HpAtMost(f64),
    /// mn at most this fraction of max mn, and still above zero.
    MnAtMost(f64),
    InfAbove(i32),
    InfAtLeast(i32),
    HasStatus(Status),
    AnyStatus,
    /// Run log has at least this many entries.
    LogAtLeast(usize),
    AnyOf(Vec<EndingCriterion>),
    AllOf(Vec<EndingCriterion>),
}

/// Final state an ending is classified from.
#[derive(Debug, Clone, Copy)]
pub struct EndingContext<'a> {
    pub player: &'a Player,
    /// Decisions logged before the escaping one.
    pub log_len: usize,
    pub difficulty: &'a DifficultyDef,
}

impl EndingCriterion {
    #[must_use]
    pub fn holds(&self, ctx: &EndingContext<'_>) -> bool {
        let p = ctx.player;
        match self {
            Self::Difficulty(id) => ctx.difficulty.id == *id,
            Self::HpAbove(fraction) => f64::from(p.hp) > f64::from(p.max_hp) * fraction,
            Self::MnAbove(fraction) => f64::from(p.mn) > f64::from(p.max_mn) * fraction,
            Self::HpAtMost(fraction) => p.hp > 0 && f64::from(p.hp) <= f64::from(p.max_hp) * fraction,
            Self::MnAtMost(fraction) => p.mn > 0 && f64::from(p.mn) <= f64::from(p.max_mn) * fraction,
            Self::InfAbove(n) => p.inf > *n,
            Self::InfAtLeast(n) => p.inf >= *n,
            Self::HasStatus(status) => p.has_status(*status),
            Self::AnyStatus => !p.status.is_empty(),
            Self::LogAtLeast(n) => ctx.log_len >= *n,
            Self::AnyOf(inner) => inner.iter().any(|c| c.holds(ctx)),
            Self::AllOf(inner) => inner.iter().all(|c| c.holds(ctx)),
        }
    }

    fn collect_difficulties<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            Self::Difficulty(id) => out.push(id),
            Self::AnyOf(inner) | Self::AllOf(inner) => {
                for criterion in inner {
                    criterion.collect_difficulties(out);
                }
            }
            _ => {}
        }
    }
}

/// A catalog ending rule. Every criterion must hold for the ending to apply.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EndingDef {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub bonus_kp: u32,
    #[serde(default)]
    pub criteria: Vec<EndingCriterion>,
}

impl EndingDef {
    #[must_use]
    pub fn matches(&self, ctx: &EndingContext<'_>) -> bool {
        self.criteria.iter().all(|criterion| criterion.holds(ctx))
    }

    /// Difficulty ids referenced anywhere in the criteria.
    #[must_use]
    pub fn difficulty_refs(&self) -> Vec<&str> {
        let mut refs = Vec::new();
        for criterion in &self.criteria {
            criterion.collect_difficulties(&mut refs);
        }
        refs
    }
}

impl fmt::Display for EndingDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// Pick the first matching ending, falling back to the last entry.
///
/// Returns `None` only for an empty table.
#[must_use]
pub fn determine_ending<'a>(endings: &'a [EndingDef], ctx: &EndingContext<'_>) -> Option<&'a EndingDef> {
    endings
        .iter()
        .find(|ending| ending.matches(ctx))
        .or_else(|| endings.last())
}
