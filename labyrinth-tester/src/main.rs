mod logic;
mod util;

use std::fs::File;
use std::io::{BufWriter, Write, stdout};
use std::path::PathBuf;
use std::time::Instant;

use anyhow::{Context, Result};
use clap::Parser;
use colored::Colorize;
use labyrinth_game::{DataLoader, StaticDataLoader};

use logic::{
    CampaignConfig, CampaignFailure, DifficultyPlan, PolicyKind, SimulationReport,
    SimulationSummary, difficulty_ids, resolve_seed_inputs, run_campaign,
};
use util::split_csv;

/// Spacing between campaign seeds derived from one base seed.
const ITERATION_SEED_STRIDE: u64 = 0x9E37_79B9_7F4A_7C15;

#[derive(Debug, Parser)]
#[command(name = "labyrinth-tester", version = "0.1.0")]
#[command(about = "Headless campaign simulation for Labyrinth Echo")]
struct Args {
    /// Seeds to run (comma-separated; decimal, 0x-hex, or a..b ranges)
    #[arg(long, default_value = "1337")]
    seeds: String,

    /// Campaigns per seed
    #[arg(long, default_value_t = 1)]
    iterations: usize,

    /// Runs per campaign
    #[arg(long, default_value_t = 10)]
    runs: usize,

    /// Difficulty id, or `ladder` to climb after each clear
    #[arg(long, default_value = "ladder")]
    difficulty: String,

    /// Choice strategy
    #[arg(long, value_enum, default_value_t = PolicyKind::Cautious)]
    policy: PolicyKind,

    /// Never spend knowledge points between runs
    #[arg(long)]
    no_shop: bool,

    /// List difficulties and exit
    #[arg(long)]
    list_difficulties: bool,

    /// Output report format
    #[arg(long, default_value = "console")]
    #[arg(value_parser = ["json", "console"])]
    report: String,

    /// Include every run of every campaign in the report
    #[arg(short, long)]
    verbose: bool,

    /// Optional path to write the report output instead of stdout
    #[arg(long)]
    output: Option<PathBuf>,
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    if maybe_list_difficulties(&args)? {
        return Ok(());
    }

    if args.report != "json" || args.output.is_some() {
        announce_banner();
    }

    let start_time = Instant::now();
    let seeds = resolve_seed_inputs(&split_csv(&args.seeds))?;
    let report = simulate(&args, &campaign_config(&args), &seeds);
    write_report(&args, &report, start_time)?;

    if !report.passed() {
        std::process::exit(1);
    }
    Ok(())
}

fn maybe_list_difficulties(args: &Args) -> Result<bool> {
    if !args.list_difficulties {
        return Ok(false);
    }
    let catalog = StaticDataLoader
        .load_progression()
        .context("loading progression catalog")?;
    let mut output_target = OutputTarget::new(args.output.clone())?;
    writeln!(output_target.writer(), "Available difficulties:")?;
    for id in difficulty_ids(&catalog) {
        if let Some(def) = catalog.difficulty(id) {
            writeln!(output_target.writer(), "  {id:10} - {}", def.name)?;
        }
    }
    writeln!(output_target.writer(), "  {:10} - lowest uncleared difficulty", "ladder")?;
    output_target.flush_inner()?;
    Ok(true)
}

fn campaign_config(args: &Args) -> CampaignConfig {
    CampaignConfig {
        plan: DifficultyPlan::parse(&args.difficulty),
        runs: args.runs,
        policy: args.policy,
        shop: !args.no_shop,
    }
}

fn announce_banner() {
    println!("{}", "🌀 Labyrinth Echo Campaign Tester".bright_cyan().bold());
    println!("{}", "=================================".cyan());
}

fn campaign_seeds(seeds: &[u64], iterations: usize) -> Vec<u64> {
    seeds
        .iter()
        .flat_map(|seed| {
            (0..iterations.max(1) as u64)
                .map(move |i| seed.wrapping_add(i.wrapping_mul(ITERATION_SEED_STRIDE)))
        })
        .collect()
}

fn simulate(args: &Args, config: &CampaignConfig, seeds: &[u64]) -> SimulationReport {
    let mut outcomes = Vec::new();
    let mut failures = Vec::new();
    for seed in campaign_seeds(seeds, args.iterations) {
        match run_campaign(config, seed) {
            Ok(outcome) => {
                log::info!(
                    "seed {seed}: {} runs, {} kp, {} unlocks",
                    outcome.records.len(),
                    outcome.final_kp,
                    outcome.unlocked
                );
                outcomes.push(outcome);
            }
            Err(err) => {
                log::error!("seed {seed} failed: {err:#}");
                failures.push(CampaignFailure {
                    seed,
                    error: format!("{err:#}"),
                });
            }
        }
    }

    SimulationReport {
        policy: config.policy,
        difficulty: config.plan.to_string(),
        runs_per_campaign: config.runs,
        summary: SimulationSummary::from_outcomes(&outcomes),
        failures,
        campaigns: if args.verbose { outcomes } else { Vec::new() },
    }
}

fn write_report_body(
    args: &Args,
    report: &SimulationReport,
    output: &mut OutputTarget,
    start_time: Instant,
) -> Result<()> {
    match args.report.as_str() {
        "json" => logic::reports::generate_json_report(output.writer(), report)?,
        _ => {
            logic::reports::generate_console_report(
                output.writer(),
                report,
                start_time.elapsed(),
            )?;
            writeln!(output.writer())?;
            writeln!(output.writer(), "🏁 Total time: {:?}", start_time.elapsed())?;
        }
    }
    Ok(())
}

fn write_report(args: &Args, report: &SimulationReport, start_time: Instant) -> Result<()> {
    let mut output_target = OutputTarget::new(args.output.clone())?;
    write_report_body(args, report, &mut output_target, start_time)?;
    output_target.flush_inner()?;
    Ok(())
}

enum OutputTarget {
    Stdout(BufWriter<std::io::Stdout>),
    File(BufWriter<File>),
}

impl OutputTarget {
    fn new(path: Option<PathBuf>) -> Result<Self> {
        if let Some(path) = path {
            let file = File::create(&path)
                .with_context(|| format!("failed to create {}", path.display()))?;
            Ok(Self::File(BufWriter::new(file)))
        } else {
            Ok(Self::Stdout(BufWriter::new(stdout())))
        }
    }

    fn writer(&mut self) -> &mut dyn Write {
        match self {
            Self::Stdout(w) => w,
            Self::File(w) => w,
        }
    }

    fn flush_inner(&mut self) -> std::io::Result<()> {
        match self {
            Self::Stdout(w) => w.flush(),
            Self::File(w) => w.flush(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_args() -> Args {
        Args {
            seeds: "5".into(),
            iterations: 1,
            runs: 3,
            difficulty: "easy".into(),
            policy: PolicyKind::Cautious,
            no_shop: false,
            list_difficulties: false,
            report: "json".into(),
            verbose: true,
            output: None,
        }
    }

    #[test]
    fn iterations_fan_out_distinct_seeds() {
        let seeds = campaign_seeds(&[1, 2], 3);
        assert_eq!(seeds.len(), 6);
        assert_eq!(seeds[0], 1);
        assert_eq!(seeds[3], 2);
        let unique: std::collections::HashSet<_> = seeds.iter().collect();
        assert_eq!(unique.len(), 6);
        assert_eq!(campaign_seeds(&[9], 0), vec![9]);
    }

    #[test]
    fn simulate_collects_campaigns_when_verbose() {
        let args = base_args();
        let report = simulate(&args, &campaign_config(&args), &[5, 6]);
        assert!(report.passed());
        assert_eq!(report.summary.campaigns, 2);
        assert_eq!(report.summary.runs, 6);
        assert_eq!(report.campaigns.len(), 2);

        let quiet = Args {
            verbose: false,
            ..base_args()
        };
        assert!(simulate(&quiet, &campaign_config(&quiet), &[5]).campaigns.is_empty());
    }

    #[test]
    fn simulate_reports_engine_refusals_as_failures() {
        let args = Args {
            difficulty: "nightmare".into(),
            ..base_args()
        };
        let report = simulate(&args, &campaign_config(&args), &[1]);
        assert!(!report.passed());
        assert_eq!(report.failures[0].seed, 1);
        assert!(report.failures[0].error.contains("nightmare"));
    }

    #[test]
    fn write_report_emits_json_to_file() {
        let path = std::env::temp_dir().join(format!("labyrinth-main-{}.json", std::process::id()));
        let args = Args {
            output: Some(path.clone()),
            ..base_args()
        };
        let report = simulate(&args, &campaign_config(&args), &[5]);
        write_report(&args, &report, Instant::now()).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        let value: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value["difficulty"], "easy");
        let _ = std::fs::remove_file(path);
    }

    #[test]
    fn list_difficulties_writes_catalog() {
        let path = std::env::temp_dir().join(format!("labyrinth-list-{}.txt", std::process::id()));
        let args = Args {
            list_difficulties: true,
            output: Some(path.clone()),
            ..base_args()
        };
        assert!(maybe_list_difficulties(&args).unwrap());
        let text = std::fs::read_to_string(&path).unwrap();
        for id in ["easy", "normal", "hard", "abyss", "ladder"] {
            assert!(text.contains(id), "{id} missing from {text}");
        }
        let _ = std::fs::remove_file(path);
        assert!(!maybe_list_difficulties(&base_args()).unwrap());
    }
}
