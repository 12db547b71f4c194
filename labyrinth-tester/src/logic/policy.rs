use std::fmt;

use clap::ValueEnum;
use labyrinth_game::{
    DifficultyDef, EffectState, Event, OutcomeFlag, Player, ProgressionCatalog, process_choice,
};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha20Rng;
use serde::Serialize;

/// Decision returned by a [`PlayerPolicy`]
#[derive(Debug, Clone)]
pub struct PolicyDecision {
    pub choice_index: usize,
    pub rationale: Option<String>,
}

impl PolicyDecision {
    #[must_use]
    pub fn new(choice_index: usize, rationale: Option<String>) -> Self {
        Self {
            choice_index,
            rationale,
        }
    }
}

/// What a policy may look at before choosing.
#[derive(Debug, Clone, Copy)]
pub struct DecisionView<'a> {
    pub event: &'a Event,
    pub player: &'a Player,
    pub effects: &'a EffectState,
    pub difficulty: &'a DifficultyDef,
}

/// Policy interface for automated play strategies.
pub trait PlayerPolicy {
    /// Name used for logging/debug output.
    fn name(&self) -> &'static str;

    /// Select a choice for the active event.
    fn pick_choice(&mut self, view: &DecisionView<'_>) -> PolicyDecision;
}

/// Built-in choice strategies for automated runs.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, ValueEnum, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicyKind {
    /// Always take the first choice
    First,
    /// Uniformly random choice
    Random,
    /// Keep hp and mn as high as possible
    Cautious,
    /// Chase information, avoiding outright death
    Greedy,
}

impl PolicyKind {
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            PolicyKind::First => "First",
            PolicyKind::Random => "Random",
            PolicyKind::Cautious => "Cautious",
            PolicyKind::Greedy => "Greedy",
        }
    }

    #[must_use]
    pub fn create_policy(self, seed: u64) -> Box<dyn PlayerPolicy> {
        match self {
            PolicyKind::First => Box::new(FirstPolicy),
            PolicyKind::Random => Box::new(RandomPolicy::new(seed)),
            PolicyKind::Cautious => Box::new(CautiousPolicy),
            PolicyKind::Greedy => Box::new(GreedyPolicy),
        }
    }
}

impl fmt::Display for PolicyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

struct FirstPolicy;
struct CautiousPolicy;
struct GreedyPolicy;

struct RandomPolicy {
    rng: ChaCha20Rng,
}

impl RandomPolicy {
    fn new(seed: u64) -> Self {
        Self {
            rng: ChaCha20Rng::seed_from_u64(seed),
        }
    }
}

/// Predicted result of one choice. Outcome resolution is deterministic, so this is exact.
#[derive(Debug, Clone, Copy)]
struct Preview {
    index: usize,
    escapes: bool,
    dies: bool,
    hp: i32,
    mn: i32,
    inf: i32,
}

fn previews(view: &DecisionView<'_>) -> Vec<Preview> {
    (0..view.event.choices.len())
        .filter_map(|index| {
            let result =
                process_choice(view.event, index, view.player, view.effects, view.difficulty).ok()?;
            Some(Preview {
                index,
                escapes: result.outcome.flag == Some(OutcomeFlag::Escape),
                dies: result.player.is_dead(),
                hp: result.player.hp,
                mn: result.player.mn,
                inf: result.player.inf,
            })
        })
        .collect()
}

fn best_by<K: Ord>(view: &DecisionView<'_>, key: impl Fn(&Preview) -> K) -> Option<Preview> {
    let all = previews(view);
    all.iter()
        .copied()
        .find(|p| p.escapes)
        .or_else(|| all.iter().copied().max_by_key(|p| key(p)))
}

impl PlayerPolicy for FirstPolicy {
    fn name(&self) -> &'static str {
        "First"
    }

    fn pick_choice(&mut self, _view: &DecisionView<'_>) -> PolicyDecision {
        PolicyDecision::new(0, None)
    }
}

impl PlayerPolicy for RandomPolicy {
    fn name(&self) -> &'static str {
        "Random"
    }

    fn pick_choice(&mut self, view: &DecisionView<'_>) -> PolicyDecision {
        let len = view.event.choices.len().max(1);
        PolicyDecision::new(self.rng.gen_range(0..len), None)
    }
}

impl PlayerPolicy for CautiousPolicy {
    fn name(&self) -> &'static str {
        "Cautious"
    }

    fn pick_choice(&mut self, view: &DecisionView<'_>) -> PolicyDecision {
        // Lexicographic: survive, then the weaker of hp and mn, then their sum.
        best_by(view, |p| (!p.dies, p.hp.min(p.mn), p.hp + p.mn)).map_or_else(
            || PolicyDecision::new(0, None),
            |p| PolicyDecision::new(p.index, Some(format!("hp {} mn {}", p.hp, p.mn))),
        )
    }
}

impl PlayerPolicy for GreedyPolicy {
    fn name(&self) -> &'static str {
        "Greedy"
    }

    fn pick_choice(&mut self, view: &DecisionView<'_>) -> PolicyDecision {
        best_by(view, |p| (!p.dies, p.inf, p.hp + p.mn)).map_or_else(
            || PolicyDecision::new(0, None),
            |p| PolicyDecision::new(p.index, Some(format!("inf {}", p.inf))),
        )
    }
}

/// Every difficulty id in catalog order, for listings.
#[must_use]
pub fn difficulty_ids(catalog: &ProgressionCatalog) -> Vec<&str> {
    catalog.difficulties().iter().map(|d| d.id.as_str()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use labyrinth_game::{DataLoader, StaticDataLoader};

    fn event(json: &str) -> Event {
        serde_json::from_str(json).unwrap()
    }

    fn normal() -> DifficultyDef {
        StaticDataLoader
            .load_progression()
            .unwrap()
            .difficulty("normal")
            .unwrap()
            .clone()
    }

    fn fork() -> Event {
        event(
            r#"{"id": "fork", "floors": [1], "type": "trap", "situation": "two doors",
                "choices": [
                    {"text": "left", "outcomes": [{"condition": "default", "text": "ow", "hp": -30, "inf": 9}]},
                    {"text": "right", "outcomes": [{"condition": "default", "text": "calm", "mn": 2, "inf": 1}]},
                    {"text": "down", "outcomes": [{"condition": "default", "text": "fall", "hp": -99, "inf": 20}]}
                ]}"#,
        )
    }

    #[test]
    fn cautious_and_greedy_disagree() {
        let event = fork();
        let player = Player::new(55, 35, 5);
        let effects = EffectState::default();
        let difficulty = normal();
        let view = DecisionView {
            event: &event,
            player: &player,
            effects: &effects,
            difficulty: &difficulty,
        };
        assert_eq!(PolicyKind::Cautious.create_policy(1).pick_choice(&view).choice_index, 1);
        // The richest door kills, so greedy settles for the next best.
        assert_eq!(PolicyKind::Greedy.create_policy(1).pick_choice(&view).choice_index, 0);
        assert_eq!(PolicyKind::First.create_policy(1).pick_choice(&view).choice_index, 0);
    }

    #[test]
    fn escape_always_wins_for_planning_policies() {
        let event = event(
            r#"{"id": "exit", "floors": [5], "type": "boss", "situation": "a door",
                "choices": [
                    {"text": "rest", "outcomes": [{"condition": "default", "text": "zz", "hp": 10, "mn": 10}]},
                    {"text": "leave", "outcomes": [{"condition": "default", "text": "out", "hp": -5, "flag": "escape"}]}
                ]}"#,
        );
        let player = Player::new(55, 35, 5);
        let effects = EffectState::default();
        let difficulty = normal();
        let view = DecisionView {
            event: &event,
            player: &player,
            effects: &effects,
            difficulty: &difficulty,
        };
        for kind in [PolicyKind::Cautious, PolicyKind::Greedy] {
            assert_eq!(kind.create_policy(0).pick_choice(&view).choice_index, 1, "{kind}");
        }
    }

    #[test]
    fn random_policy_is_seeded() {
        let event = fork();
        let player = Player::new(55, 35, 5);
        let effects = EffectState::default();
        let difficulty = normal();
        let view = DecisionView {
            event: &event,
            player: &player,
            effects: &effects,
            difficulty: &difficulty,
        };
        let picks = |seed| {
            let mut policy = PolicyKind::Random.create_policy(seed);
            (0..16)
                .map(|_| policy.pick_choice(&view).choice_index)
                .collect::<Vec<_>>()
        };
        assert_eq!(picks(42), picks(42));
        assert!(picks(42).iter().all(|idx| *idx < 3));
    }
}
