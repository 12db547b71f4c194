use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::condition::Condition;
use crate::constants::{BOSS_EVENT_ID, MAX_FLOOR};
use crate::meta::MetaPredicate;

/// Lingering conditions a player can carry between events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Injured,
    Confused,
    Bleeding,
    Fear,
    Cursed,
}

impl Status {
    pub const ALL: [Self; 5] = [
        Self::Injured,
        Self::Confused,
        Self::Bleeding,
        Self::Fear,
        Self::Cursed,
    ];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Injured => "injured",
            Self::Confused => "confused",
            Self::Bleeding => "bleeding",
            Self::Fear => "fear",
            Self::Cursed => "cursed",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Status {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or(())
    }
}

/// Presentation tag of an event. Boss events are never drawn from the open pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    Exploration,
    Encounter,
    Trap,
    Rest,
    Boss,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unrecognized outcome flag `{0}`")]
pub struct FlagParseError(pub String);

/// Side effect attached to an outcome beyond its resource deltas.
///
/// Strings that match no known flag deserialize to [`OutcomeFlag::Unknown`] so that
/// [`validate_events`] can report them alongside every other catalog issue.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum OutcomeFlag {
    AddStatus(Status),
    RemoveStatus(Status),
    Chain(String),
    Shortcut,
    Escape,
    /// Raw text of a flag the engine does not understand. Has no effect when applied.
    Unknown(String),
}

impl OutcomeFlag {
    /// Event id this flag continues into, if it is a chain flag.
    #[must_use]
    pub fn chain_target(&self) -> Option<&str> {
        match self {
            Self::Chain(target) => Some(target.as_str()),
            _ => None,
        }
    }
}

impl fmt::Display for OutcomeFlag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AddStatus(status) => write!(f, "add:{status}"),
            Self::RemoveStatus(status) => write!(f, "remove:{status}"),
            Self::Chain(target) => write!(f, "chain:{target}"),
            Self::Shortcut => f.write_str("shortcut"),
            Self::Escape => f.write_str("escape"),
            Self::Unknown(raw) => f.write_str(raw),
        }
    }
}

impl FromStr for OutcomeFlag {
    type Err = FlagParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || FlagParseError(s.to_string());
        match s {
            "shortcut" => return Ok(Self::Shortcut),
            "escape" => return Ok(Self::Escape),
            _ => {}
        }
        if let Some(name) = s.strip_prefix("add:") {
            return name.parse().map(Self::AddStatus).map_err(|()| invalid());
        }
        if let Some(name) = s.strip_prefix("remove:") {
            return name.parse().map(Self::RemoveStatus).map_err(|()| invalid());
        }
        match s.strip_prefix("chain:") {
            Some(target) if !target.is_empty() => Ok(Self::Chain(target.to_string())),
            _ => Err(invalid()),
        }
    }
}

impl From<String> for OutcomeFlag {
    fn from(value: String) -> Self {
        value.parse().unwrap_or(Self::Unknown(value))
    }
}

impl From<OutcomeFlag> for String {
    fn from(value: OutcomeFlag) -> Self {
        value.to_string()
    }
}

/// One possible result of a choice, guarded by a condition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Outcome {
    pub condition: Condition,
    pub text: String,
    #[serde(default)]
    pub hp: i32,
    #[serde(default)]
    pub mn: i32,
    #[serde(default)]
    pub inf: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub flag: Option<OutcomeFlag>,
}

/// A choice within an event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Choice {
    pub text: String,
    #[serde(default)]
    pub outcomes: Vec<Outcome>,
}

/// An event in the labyrinth
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    pub id: String,
    #[serde(default)]
    pub floors: Vec<u32>,
    #[serde(rename = "type")]
    pub kind: EventKind,
    pub situation: String,
    #[serde(default)]
    pub choices: Vec<Choice>,
    #[serde(default)]
    pub chain_only: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requires: Option<MetaPredicate>,
}

impl Event {
    /// Whether any outcome of this event continues into a chain event.
    #[must_use]
    pub fn can_chain(&self) -> bool {
        self.outcomes()
            .any(|outcome| outcome.flag.as_ref().is_some_and(|f| f.chain_target().is_some()))
    }

    #[must_use]
    pub fn appears_on(&self, floor: u32) -> bool {
        self.floors.contains(&floor)
    }

    fn outcomes(&self) -> impl Iterator<Item = &Outcome> {
        self.choices.iter().flat_map(|choice| choice.outcomes.iter())
    }
}

/// Structural problem found while validating content catalogs.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CatalogIssue {
    #[error("event #{index} has an empty id")]
    MissingId { index: usize },
    #[error("event `{0}` is defined more than once")]
    DuplicateId(String),
    #[error("event `{0}` lists no floors")]
    NoFloors(String),
    #[error("event `{id}` lists floor {floor} outside 1..={max}", max = MAX_FLOOR)]
    FloorOutOfRange { id: String, floor: u32 },
    #[error("event `{0}` has no situation text")]
    MissingSituation(String),
    #[error("event `{0}` has no choices")]
    NoChoices(String),
    #[error("event `{id}` choice #{choice} has no text")]
    MissingChoiceText { id: String, choice: usize },
    #[error("event `{id}` choice #{choice} has no outcomes")]
    NoOutcomes { id: String, choice: usize },
    #[error("event `{id}` choice #{choice} outcome #{outcome} has no result text")]
    MissingResultText {
        id: String,
        choice: usize,
        outcome: usize,
    },
    #[error("event `{id}` choice #{choice} outcome #{outcome} has unknown flag `{raw}`")]
    UnknownFlag {
        id: String,
        choice: usize,
        outcome: usize,
        raw: String,
    },
    #[error("event `{id}` choice #{choice} has several outcomes but no `default`")]
    MissingDefault { id: String, choice: usize },
    #[error("event `{id}` chains to unknown event `{target}`")]
    UnknownChainTarget { id: String, target: String },
    #[error("event `{id}` chains to `{target}`, which is not chain-only")]
    ChainTargetNotChainOnly { id: String, target: String },
    #[error("chain-only event `{0}` is never referenced by a chain flag")]
    UnreferencedChainOnly(String),
    #[error("boss event `{0}` is missing")]
    MissingBoss(String),
    #[error("boss event `{0}` must use the `boss` type")]
    BossKindMismatch(String),
    #[error("{kind} id `{id}` is defined more than once")]
    DuplicateEntry { kind: &'static str, id: String },
    #[error("`{owner}` references unknown {kind} `{target}`")]
    UnknownReference {
        owner: String,
        kind: &'static str,
        target: String,
    },
    #[error("unlock `{unlock}` is gated on unknown difficulty `{target}`")]
    UnknownGate { unlock: String, target: String },
    #[error("unlock `{unlock}` gives `{key}` a value of the wrong kind")]
    EffectKindMismatch { unlock: String, key: String },
    #[error("{category} unlock `{0}` has no auto-unlock requirement", category = .1)]
    MissingRequirement(String, &'static str),
    #[error("catalog defines no {0}")]
    Empty(&'static str),
}

/// Errors raised while loading content catalogs.
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("failed to parse catalog: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("catalog failed validation with {} issue(s): {}", .0.len(), render_issues(.0))]
    Invalid(Vec<CatalogIssue>),
}

fn render_issues(issues: &[CatalogIssue]) -> String {
    issues
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Container for all event data, validated on construction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventCatalog {
    events: Vec<Event>,
}

impl EventCatalog {
    /// Load an event catalog from a JSON string.
    ///
    /// # Errors
    ///
    /// Returns an error if the JSON cannot be parsed or the content fails validation.
    pub fn from_json(json: &str) -> Result<Self, CatalogError> {
        let catalog: Self = serde_json::from_str(json)?;
        Self::from_events(catalog.events)
    }

    /// Build a catalog from pre-parsed events.
    ///
    /// # Errors
    ///
    /// Returns every structural issue found in the events.
    pub fn from_events(events: Vec<Event>) -> Result<Self, CatalogError> {
        let issues = validate_events(&events);
        if issues.is_empty() {
            Ok(Self { events })
        } else {
            Err(CatalogError::Invalid(issues))
        }
    }

    #[must_use]
    pub fn events(&self) -> &[Event] {
        &self.events
    }

    #[must_use]
    pub fn get(&self, id: &str) -> Option<&Event> {
        self.events.iter().find(|event| event.id == id)
    }

    #[must_use]
    pub fn boss(&self) -> Option<&Event> {
        self.get(BOSS_EVENT_ID)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.events.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

/// Collect every structural issue in an event list.
#[must_use]
pub fn validate_events(events: &[Event]) -> Vec<CatalogIssue> {
    let mut issues = Vec::new();
    let mut seen: HashSet<&str> = HashSet::new();
    let by_id: HashMap<&str, &Event> = events.iter().map(|e| (e.id.as_str(), e)).collect();
    let mut referenced: HashSet<&str> = HashSet::new();

    for (index, event) in events.iter().enumerate() {
        if event.id.trim().is_empty() {
            issues.push(CatalogIssue::MissingId { index });
        } else if !seen.insert(event.id.as_str()) {
            issues.push(CatalogIssue::DuplicateId(event.id.clone()));
        }
        check_event_shape(event, &mut issues);

        for outcome in event.outcomes() {
            match &outcome.condition {
                Condition::Unrecognized(raw) => log::warn!(
                    "event `{}` uses unrecognized condition {raw:?}; it will always pass",
                    event.id
                ),
                Condition::UnknownStatus(name) => log::warn!(
                    "event `{}` checks unknown status `{name}`; it will never pass",
                    event.id
                ),
                _ => {}
            }
            let Some(target) = outcome.flag.as_ref().and_then(OutcomeFlag::chain_target) else {
                continue;
            };
            referenced.insert(target);
            match by_id.get(target) {
                None => issues.push(CatalogIssue::UnknownChainTarget {
                    id: event.id.clone(),
                    target: target.to_string(),
                }),
                Some(next) if !next.chain_only => {
                    issues.push(CatalogIssue::ChainTargetNotChainOnly {
                        id: event.id.clone(),
                        target: target.to_string(),
                    });
                }
                Some(_) => {}
            }
        }
    }

    for event in events.iter().filter(|e| e.chain_only) {
        if !referenced.contains(event.id.as_str()) {
            issues.push(CatalogIssue::UnreferencedChainOnly(event.id.clone()));
        }
    }

    match by_id.get(BOSS_EVENT_ID) {
        None => issues.push(CatalogIssue::MissingBoss(BOSS_EVENT_ID.to_string())),
        Some(boss) if boss.kind != EventKind::Boss => {
            issues.push(CatalogIssue::BossKindMismatch(BOSS_EVENT_ID.to_string()));
        }
        Some(_) => {}
    }

    issues
}

fn check_event_shape(event: &Event, issues: &mut Vec<CatalogIssue>) {
    let id = || event.id.clone();
    if event.floors.is_empty() {
        issues.push(CatalogIssue::NoFloors(id()));
    }
    for &floor in &event.floors {
        if !(1..=MAX_FLOOR).contains(&floor) {
            issues.push(CatalogIssue::FloorOutOfRange { id: id(), floor });
        }
    }
    if event.situation.trim().is_empty() {
        issues.push(CatalogIssue::MissingSituation(id()));
    }
    if event.choices.is_empty() {
        issues.push(CatalogIssue::NoChoices(id()));
    }
    for (choice_idx, choice) in event.choices.iter().enumerate() {
        if choice.text.trim().is_empty() {
            issues.push(CatalogIssue::MissingChoiceText {
                id: id(),
                choice: choice_idx,
            });
        }
        if choice.outcomes.is_empty() {
            issues.push(CatalogIssue::NoOutcomes {
                id: id(),
                choice: choice_idx,
            });
        }
        if choice.outcomes.len() > 1 && !choice.outcomes.iter().any(|o| o.condition.is_default()) {
            issues.push(CatalogIssue::MissingDefault {
                id: id(),
                choice: choice_idx,
            });
        }
        for (outcome_idx, outcome) in choice.outcomes.iter().enumerate() {
            if outcome.text.trim().is_empty() {
                issues.push(CatalogIssue::MissingResultText {
                    id: id(),
                    choice: choice_idx,
                    outcome: outcome_idx,
                });
            }
            if let Some(OutcomeFlag::Unknown(raw)) = &outcome.flag {
                issues.push(CatalogIssue::UnknownFlag {
                    id: id(),
                    choice: choice_idx,
                    outcome: outcome_idx,
                    raw: raw.clone(),
                });
            }
        }
    }
}
