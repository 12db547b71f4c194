//! Static progression catalog: difficulties, unlocks, endings and titles.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fmt;

use crate::data::{CatalogError, CatalogIssue};
use crate::effects::{EffectKey, EffectValue};
use crate::endings::EndingDef;
use crate::meta::{MetaPredicate, MetaState};

/// A selectable difficulty and its modifiers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DifficultyDef {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub hp_mod: i32,
    #[serde(default)]
    pub mn_mod: i32,
    /// Passive mental drain per decision, zero or negative.
    #[serde(default)]
    pub drain_mod: i32,
    pub dmg_mult: f64,
    pub kp_death: u32,
    pub kp_win: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnlockCategory {
    /// Bought with knowledge points at any time.
    Basic,
    /// Bought once the gating difficulty has been cleared.
    Special,
    /// Granted automatically for clearing a difficulty or collecting an ending.
    Trophy,
    /// Granted automatically when a meta-state milestone is reached.
    Achieve,
}

impl UnlockCategory {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Basic => "basic",
            Self::Special => "special",
            Self::Trophy => "trophy",
            Self::Achieve => "achieve",
        }
    }

    #[must_use]
    pub const fn is_purchasable(self) -> bool {
        matches!(self, Self::Basic | Self::Special)
    }
}

impl fmt::Display for UnlockCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Condition under which an automatic unlock is granted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnlockRequirement {
    Difficulty(String),
    Ending(String),
    Achievement(MetaPredicate),
}

impl UnlockRequirement {
    #[must_use]
    pub fn is_met(&self, meta: &MetaState) -> bool {
        match self {
            Self::Difficulty(id) => meta.cleared_difficulties.contains(id),
            Self::Ending(id) => meta.endings.contains(id),
            Self::Achievement(predicate) => predicate.holds(meta),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnlockDef {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub cost: u32,
    pub category: UnlockCategory,
    #[serde(default)]
    pub effects: BTreeMap<EffectKey, EffectValue>,
    /// Difficulty that must be cleared before a special unlock can be bought.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gate: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requirement: Option<UnlockRequirement>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TitleDef {
    pub id: String,
    pub name: String,
    /// `None` means the title is always earned.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requires: Option<MetaPredicate>,
}

impl TitleDef {
    #[must_use]
    pub fn is_earned(&self, meta: &MetaState) -> bool {
        self.requires
            .as_ref()
            .is_none_or(|predicate| predicate.holds(meta))
    }
}

/// Validated progression content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressionCatalog {
    difficulties: Vec<DifficultyDef>,
    unlocks: Vec<UnlockDef>,
    endings: Vec<EndingDef>,
    titles: Vec<TitleDef>,
}

impl ProgressionCatalog {
    /// Load and validate a progression catalog from JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if the JSON cannot be parsed or the content fails validation.
    pub fn from_json(json: &str) -> Result<Self, CatalogError> {
        let catalog: Self = serde_json::from_str(json)?;
        catalog.validated()
    }

    /// Build a catalog from parts, validating cross references.
    ///
    /// # Errors
    ///
    /// Returns every issue found in the parts.
    pub fn from_parts(
        difficulties: Vec<DifficultyDef>,
        unlocks: Vec<UnlockDef>,
        endings: Vec<EndingDef>,
        titles: Vec<TitleDef>,
    ) -> Result<Self, CatalogError> {
        Self {
            difficulties,
            unlocks,
            endings,
            titles,
        }
        .validated()
    }

    fn validated(self) -> Result<Self, CatalogError> {
        let issues = self.validate();
        if issues.is_empty() {
            Ok(self)
        } else {
            Err(CatalogError::Invalid(issues))
        }
    }

    /// Collect every structural issue in the catalog.
    #[must_use]
    pub fn validate(&self) -> Vec<CatalogIssue> {
        let mut issues = Vec::new();
        if self.difficulties.is_empty() {
            issues.push(CatalogIssue::Empty("difficulties"));
        }
        if self.endings.is_empty() {
            issues.push(CatalogIssue::Empty("endings"));
        }
        push_duplicates("difficulty", self.difficulties.iter().map(|d| d.id.as_str()), &mut issues);
        push_duplicates("unlock", self.unlocks.iter().map(|u| u.id.as_str()), &mut issues);
        push_duplicates("ending", self.endings.iter().map(|e| e.id.as_str()), &mut issues);
        push_duplicates("title", self.titles.iter().map(|t| t.id.as_str()), &mut issues);

        for unlock in &self.unlocks {
            self.check_unlock(unlock, &mut issues);
        }
        for ending in &self.endings {
            for target in ending.difficulty_refs() {
                self.check_reference(&ending.id, "difficulty", target, &mut issues);
            }
        }
        for title in &self.titles {
            if let Some(predicate) = &title.requires {
                self.check_predicate(&title.id, predicate, &mut issues);
            }
        }
        issues
    }

    fn check_unlock(&self, unlock: &UnlockDef, issues: &mut Vec<CatalogIssue>) {
        for (key, value) in &unlock.effects {
            if !key.merge_kind().accepts(*value) {
                issues.push(CatalogIssue::EffectKindMismatch {
                    unlock: unlock.id.clone(),
                    key: key.to_string(),
                });
            }
        }
        if let Some(gate) = &unlock.gate
            && self.difficulty(gate).is_none()
        {
            issues.push(CatalogIssue::UnknownGate {
                unlock: unlock.id.clone(),
                target: gate.clone(),
            });
        }
        match (&unlock.requirement, unlock.category) {
            (None, UnlockCategory::Trophy | UnlockCategory::Achieve) => {
                issues.push(CatalogIssue::MissingRequirement(
                    unlock.id.clone(),
                    unlock.category.as_str(),
                ));
            }
            (Some(UnlockRequirement::Difficulty(target)), _) => {
                self.check_reference(&unlock.id, "difficulty", target, issues);
            }
            (Some(UnlockRequirement::Ending(target)), _) => {
                self.check_reference(&unlock.id, "ending", target, issues);
            }
            (Some(UnlockRequirement::Achievement(predicate)), _) => {
                self.check_predicate(&unlock.id, predicate, issues);
            }
            (None, _) => {}
        }
    }

    fn check_predicate(&self, owner: &str, predicate: &MetaPredicate, issues: &mut Vec<CatalogIssue>) {
        for (kind, target) in predicate.references() {
            self.check_reference(owner, kind, target, issues);
        }
    }

    fn check_reference(
        &self,
        owner: &str,
        kind: &'static str,
        target: &str,
        issues: &mut Vec<CatalogIssue>,
    ) {
        let known = match kind {
            "difficulty" => self.difficulty(target).is_some(),
            _ => self.ending(target).is_some(),
        };
        if !known {
            issues.push(CatalogIssue::UnknownReference {
                owner: owner.to_string(),
                kind,
                target: target.to_string(),
            });
        }
    }

    #[must_use]
    pub fn difficulties(&self) -> &[DifficultyDef] {
        &self.difficulties
    }

    #[must_use]
    pub fn unlocks(&self) -> &[UnlockDef] {
        &self.unlocks
    }

    #[must_use]
    pub fn endings(&self) -> &[EndingDef] {
        &self.endings
    }

    #[must_use]
    pub fn titles(&self) -> &[TitleDef] {
        &self.titles
    }

    #[must_use]
    pub fn difficulty(&self, id: &str) -> Option<&DifficultyDef> {
        self.difficulties.iter().find(|d| d.id == id)
    }

    #[must_use]
    pub fn unlock(&self, id: &str) -> Option<&UnlockDef> {
        self.unlocks.iter().find(|u| u.id == id)
    }

    #[must_use]
    pub fn ending(&self, id: &str) -> Option<&EndingDef> {
        self.endings.iter().find(|e| e.id == id)
    }

    #[must_use]
    pub fn title(&self, id: &str) -> Option<&TitleDef> {
        self.titles.iter().find(|t| t.id == id)
    }
}

fn push_duplicates<'a>(
    kind: &'static str,
    ids: impl Iterator<Item = &'a str>,
    issues: &mut Vec<CatalogIssue>,
) {
    let mut seen = HashSet::new();
    for id in ids {
        if !seen.insert(id) {
            issues.push(CatalogIssue::DuplicateEntry {
                kind,
                id: id.to_string(),
            });
        }
    }
}
