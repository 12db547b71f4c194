//! Outcome conditions: a tiny grammar parsed once at load time.
//!
//! Accepted forms are `default`, `status:<name>`, and `<hp|mn|inf><'>'|'<'><integer>`.
//! A status name outside the known set parses to [`Condition::UnknownStatus`], which never
//! holds since no player can carry it. Anything else parses to [`Condition::Unrecognized`],
//! which evaluates as passing so content written for newer rule sets still loads.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::constants::{
    DANGER_SENSE_HP_BONUS, DANGER_SENSE_HP_THRESHOLD, MENTAL_SENSE_MN_BONUS,
    MENTAL_SENSE_MN_THRESHOLD, NEGOTIATOR_MN_BONUS,
};
use crate::data::Status;
use crate::effects::{EffectKey, EffectState};
use crate::player::{Player, Resource};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Comparison {
    Above,
    Below,
}

impl Comparison {
    const fn symbol(self) -> char {
        match self {
            Self::Above => '>',
            Self::Below => '<',
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Condition {
    Default,
    Status(Status),
    Threshold {
        resource: Resource,
        comparison: Comparison,
        value: i32,
    },
    /// `status:<name>` naming a status the engine does not know.
    UnknownStatus(String),
    Unrecognized(String),
}

impl Condition {
    #[must_use]
    pub fn parse(raw: &str) -> Self {
        if raw == "default" {
            return Self::Default;
        }
        if let Some(name) = raw.strip_prefix("status:") {
            return name
                .parse()
                .map_or_else(|()| Self::UnknownStatus(name.to_string()), Self::Status);
        }
        parse_threshold(raw).unwrap_or_else(|| Self::Unrecognized(raw.to_string()))
    }

    #[must_use]
    pub const fn is_default(&self) -> bool {
        matches!(self, Self::Default)
    }

    /// Evaluate against the current player, softening thresholds with owned effects.
    #[must_use]
    pub fn evaluate(&self, player: &Player, effects: &EffectState) -> bool {
        match self {
            Self::Default => true,
            Self::Status(status) => player.has_status(*status),
            Self::Threshold {
                resource,
                comparison: Comparison::Above,
                value,
            } => softened(*resource, player, effects) > *value,
            Self::Threshold {
                resource,
                comparison: Comparison::Below,
                value,
            } => player.resource(*resource) < *value,
            Self::UnknownStatus(_) => false,
            Self::Unrecognized(raw) => {
                log::warn!("unrecognized condition {raw:?}; treating as satisfied");
                true
            }
        }
    }
}

/// Effective resource value for a `>` check. The real player is never changed.
fn softened(resource: Resource, player: &Player, effects: &EffectState) -> i32 {
    match resource {
        Resource::Hp => {
            if effects.flag(EffectKey::DangerSense) && player.hp < DANGER_SENSE_HP_THRESHOLD {
                player.hp + DANGER_SENSE_HP_BONUS
            } else {
                player.hp
            }
        }
        Resource::Mn => {
            let mut mn = player.mn;
            if effects.flag(EffectKey::Negotiator) {
                mn += NEGOTIATOR_MN_BONUS;
            }
            if effects.flag(EffectKey::MentalSense) && player.mn < MENTAL_SENSE_MN_THRESHOLD {
                mn += MENTAL_SENSE_MN_BONUS;
            }
            mn
        }
        Resource::Inf => player.inf,
    }
}

fn parse_threshold(raw: &str) -> Option<Condition> {
    let split = raw.find(['>', '<'])?;
    let (name, rest) = raw.split_at(split);
    let resource = match name {
        "hp" => Resource::Hp,
        "mn" => Resource::Mn,
        "inf" => Resource::Inf,
        _ => return None,
    };
    let mut chars = rest.chars();
    let comparison = match chars.next()? {
        '>' => Comparison::Above,
        '<' => Comparison::Below,
        _ => return None,
    };
    let value = chars.as_str().parse().ok()?;
    Some(Condition::Threshold {
        resource,
        comparison,
        value,
    })
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Default => f.write_str("default"),
            Self::Status(status) => write!(f, "status:{status}"),
            Self::Threshold {
                resource,
                comparison,
                value,
            } => write!(f, "{resource}{}{value}", comparison.symbol()),
            Self::UnknownStatus(name) => write!(f, "status:{name}"),
            Self::Unrecognized(raw) => f.write_str(raw),
        }
    }
}

impl From<String> for Condition {
    fn from(value: String) -> Self {
        Self::parse(&value)
    }
}

impl From<Condition> for String {
    fn from(value: Condition) -> Self {
        value.to_string()
    }
}
