use std::fmt;

use anyhow::{Context, Result, anyhow, bail, ensure};
use labyrinth_game::constants::{MAX_BOSS_ATTEMPTS, MAX_FLOOR};
use labyrinth_game::{
    EndCause, GameEngine, MemoryStore, MetaState, ProgressionCatalog, RunController, RunEnd,
    RunStep, StaticDataLoader, check_purchase, seeded_rng,
};
use rand_chacha::ChaCha20Rng;
use serde::Serialize;

use super::policy::{DecisionView, PlayerPolicy, PolicyKind};

/// Upper bound on decisions in one run before the tester calls it a hang.
const MAX_DECISIONS_PER_RUN: usize = 64;

type Engine = GameEngine<StaticDataLoader, MemoryStore>;

/// Which difficulty each run of a campaign uses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DifficultyPlan {
    Fixed(String),
    /// Lowest difficulty not yet cleared, staying on the hardest once all are.
    Ladder,
}

impl DifficultyPlan {
    #[must_use]
    pub fn parse(raw: &str) -> Self {
        if raw.eq_ignore_ascii_case("ladder") {
            Self::Ladder
        } else {
            Self::Fixed(raw.to_string())
        }
    }

    fn resolve(&self, meta: &MetaState, catalog: &ProgressionCatalog) -> Result<String> {
        match self {
            Self::Fixed(id) => catalog
                .difficulty(id)
                .map(|d| d.id.clone())
                .ok_or_else(|| anyhow!("unknown difficulty `{id}`")),
            Self::Ladder => catalog
                .difficulties()
                .iter()
                .find(|d| !meta.cleared_difficulties.contains(&d.id))
                .or_else(|| catalog.difficulties().last())
                .map(|d| d.id.clone())
                .ok_or_else(|| anyhow!("no difficulties loaded")),
        }
    }
}

impl fmt::Display for DifficultyPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Fixed(id) => f.write_str(id),
            Self::Ladder => f.write_str("ladder"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CampaignConfig {
    pub plan: DifficultyPlan,
    pub runs: usize,
    pub policy: PolicyKind,
    /// Spend knowledge points between runs.
    pub shop: bool,
}

/// One finished run inside a campaign.
#[derive(Debug, Clone, Serialize)]
pub struct RunRecord {
    pub run: usize,
    pub difficulty: String,
    pub cause: EndCause,
    pub ending: Option<String>,
    pub floor: u32,
    pub decisions: usize,
    pub hp: i32,
    pub mn: i32,
    pub inf: i32,
    pub revived: bool,
    pub kp_after: u32,
}

/// Everything a campaign produced.
#[derive(Debug, Clone, Serialize)]
pub struct CampaignOutcome {
    pub seed: u64,
    pub records: Vec<RunRecord>,
    pub purchases: Vec<String>,
    pub auto_unlocks: Vec<String>,
    pub final_kp: u32,
    pub unlocked: usize,
    pub endings: Vec<String>,
    pub cleared: Vec<String>,
}

/// Play `config.runs` consecutive runs against a fresh in-memory store.
///
/// # Errors
///
/// Fails when the engine refuses a step or breaks one of its bookkeeping contracts.
pub fn run_campaign(config: &CampaignConfig, seed: u64) -> Result<CampaignOutcome> {
    let engine = GameEngine::new(StaticDataLoader, MemoryStore::new()).context("loading catalogs")?;
    let mut meta = engine.load_meta().context("loading meta-progression")?;
    let mut rng = seeded_rng(seed);
    let mut policy = config.policy.create_policy(seed);
    let mut outcome = CampaignOutcome {
        seed,
        records: Vec::with_capacity(config.runs),
        purchases: Vec::new(),
        auto_unlocks: Vec::new(),
        final_kp: 0,
        unlocked: 0,
        endings: Vec::new(),
        cleared: Vec::new(),
    };

    for run_index in 0..config.runs {
        let difficulty = config.plan.resolve(&meta, engine.progression())?;
        let mut run = engine.start_run(&mut meta, &difficulty)?;
        let (end, granted) = play_run(&engine, &mut meta, &mut run, &mut rng, policy.as_mut())
            .with_context(|| format!("seed {seed} run {run_index} on {difficulty}"))?;
        verify_run(&meta, &run, &end, run_index)?;
        outcome.auto_unlocks.extend(granted);

        if config.shop {
            outcome.purchases.extend(shop(&engine, &mut meta)?);
        }

        outcome.records.push(RunRecord {
            run: run_index,
            difficulty,
            cause: end.cause,
            ending: end.ending.as_ref().map(|e| e.id.clone()),
            floor: end.floor,
            decisions: end.decisions,
            hp: end.player.hp,
            mn: end.player.mn,
            inf: end.player.inf,
            revived: run.second_life_used(),
            kp_after: meta.kp,
        });
    }

    let stored = engine.load_meta().context("reloading meta-progression")?;
    ensure!(stored == meta, "persisted meta-progression diverged from memory");

    outcome.final_kp = meta.kp;
    outcome.unlocked = meta.unlocked.len();
    outcome.endings = meta.endings.iter().cloned().collect();
    outcome.cleared = meta.cleared_difficulties.iter().cloned().collect();
    Ok(outcome)
}

fn play_run(
    engine: &Engine,
    meta: &mut MetaState,
    run: &mut RunController,
    rng: &mut ChaCha20Rng,
    policy: &mut dyn PlayerPolicy,
) -> Result<(RunEnd, Vec<String>)> {
    let mut granted = Vec::new();
    let mut step = run.enter_floor(meta, rng)?;
    loop {
        if run.log().len() > MAX_DECISIONS_PER_RUN {
            bail!("run did not finish after {MAX_DECISIONS_PER_RUN} decisions");
        }
        step = match step {
            RunStep::FloorIntro(_) => run.enter_floor(meta, rng)?,
            RunStep::Event(id) => {
                let decision = {
                    let event = run
                        .current_event()
                        .ok_or_else(|| anyhow!("event `{id}` is not in the catalog"))?;
                    policy.pick_choice(&DecisionView {
                        event,
                        player: run.player(),
                        effects: run.effects(),
                        difficulty: run.difficulty(),
                    })
                };
                if let Some(why) = &decision.rationale {
                    log::debug!("{} picks {} on {id}: {why}", policy.name(), decision.choice_index);
                }
                let (report, unlocked) = engine.choose(run, meta, decision.choice_index)?;
                granted.extend(unlocked);
                let player = &report.player;
                ensure!(
                    (0..=player.max_hp).contains(&player.hp) && (0..=player.max_mn).contains(&player.mn),
                    "resources left their bounds after {id}: {player:?}"
                );
                if let Some(end) = report.end {
                    return Ok((end, granted));
                }
                run.proceed(meta, rng)?
            }
            RunStep::Finished(end) => {
                let difficulty = run.difficulty().clone();
                granted.extend(engine.finish_run(meta, &difficulty, &end)?);
                return Ok((end, granted));
            }
        };
    }
}

fn verify_run(meta: &MetaState, run: &RunController, end: &RunEnd, run_index: usize) -> Result<()> {
    ensure!(
        meta.escapes + meta.total_deaths == meta.runs,
        "run {run_index}: {} escapes + {} deaths != {} runs",
        meta.escapes,
        meta.total_deaths,
        meta.runs
    );
    ensure!(
        (1..=MAX_FLOOR).contains(&end.floor),
        "run {run_index}: ended on floor {}",
        end.floor
    );
    ensure!(
        run.boss_attempts() <= MAX_BOSS_ATTEMPTS,
        "run {run_index}: {} boss attempts",
        run.boss_attempts()
    );
    ensure!(
        end.decisions == run.log().len(),
        "run {run_index}: end reports {} decisions, log has {}",
        end.decisions,
        run.log().len()
    );
    ensure!(
        end.cause == EndCause::Escape || end.ending.is_none(),
        "run {run_index}: {} carries an ending",
        end.cause
    );
    Ok(())
}

/// Buy the cheapest purchasable unlock until nothing is affordable.
fn shop(engine: &Engine, meta: &mut MetaState) -> Result<Vec<String>> {
    let mut bought = Vec::new();
    loop {
        let cheapest = engine
            .progression()
            .unlocks()
            .iter()
            .filter_map(|u| check_purchase(meta, engine.progression(), &u.id).ok().map(|cost| (cost, u.id.clone())))
            .min();
        let Some((_, id)) = cheapest else {
            return Ok(bought);
        };
        engine.purchase(meta, &id)?;
        bought.push(id);
    }
}
