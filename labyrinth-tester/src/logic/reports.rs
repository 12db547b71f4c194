use std::collections::BTreeMap;
use std::io::Write;
use std::time::Duration;

use anyhow::Result;
use colored::Colorize;
use labyrinth_game::EndCause;
use serde::Serialize;

use super::policy::PolicyKind;
use super::simulation::CampaignOutcome;

/// A seed whose campaign broke an engine contract.
#[derive(Debug, Clone, Serialize)]
pub struct CampaignFailure {
    pub seed: u64,
    pub error: String,
}

/// Aggregate statistics across every simulated run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SimulationSummary {
    pub campaigns: usize,
    pub runs: usize,
    pub escapes: usize,
    pub deaths: BTreeMap<String, usize>,
    pub endings: BTreeMap<String, usize>,
    pub escape_rate: f64,
    pub avg_floor: f64,
    pub avg_decisions: f64,
    pub revivals: usize,
    pub avg_final_kp: f64,
    pub avg_unlocked: f64,
}

#[allow(clippy::cast_precision_loss)]
fn mean(total: f64, count: usize) -> f64 {
    if count == 0 { 0.0 } else { total / count as f64 }
}

impl SimulationSummary {
    #[must_use]
    pub fn from_outcomes(outcomes: &[CampaignOutcome]) -> Self {
        let mut summary = Self {
            campaigns: outcomes.len(),
            ..Self::default()
        };
        let mut floors = 0.0;
        let mut decisions = 0.0;
        for record in outcomes.iter().flat_map(|o| &o.records) {
            summary.runs += 1;
            floors += f64::from(record.floor);
            decisions += f64::from(u32::try_from(record.decisions).unwrap_or(u32::MAX));
            if record.revived {
                summary.revivals += 1;
            }
            match record.cause {
                EndCause::Escape => {
                    summary.escapes += 1;
                    if let Some(ending) = &record.ending {
                        *summary.endings.entry(ending.clone()).or_insert(0) += 1;
                    }
                }
                cause => *summary.deaths.entry(cause.to_string()).or_insert(0) += 1,
            }
        }
        #[allow(clippy::cast_precision_loss)]
        {
            summary.escape_rate = mean(summary.escapes as f64, summary.runs) * 100.0;
            summary.avg_unlocked = mean(
                outcomes.iter().map(|o| o.unlocked as f64).sum(),
                outcomes.len(),
            );
        }
        summary.avg_floor = mean(floors, summary.runs);
        summary.avg_decisions = mean(decisions, summary.runs);
        summary.avg_final_kp = mean(
            outcomes.iter().map(|o| f64::from(o.final_kp)).sum(),
            outcomes.len(),
        );
        summary
    }
}

/// Complete report payload, shared by every output format.
#[derive(Debug, Clone, Serialize)]
pub struct SimulationReport {
    pub policy: PolicyKind,
    pub difficulty: String,
    pub runs_per_campaign: usize,
    pub summary: SimulationSummary,
    pub failures: Vec<CampaignFailure>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub campaigns: Vec<CampaignOutcome>,
}

impl SimulationReport {
    #[must_use]
    pub fn passed(&self) -> bool {
        self.failures.is_empty()
    }
}

pub fn generate_console_report<W: Write + ?Sized>(
    writer: &mut W,
    report: &SimulationReport,
    total_duration: Duration,
) -> Result<()> {
    let summary = &report.summary;
    writeln!(writer)?;
    writeln!(writer, "{}", "📊 Simulation Summary".bright_cyan().bold())?;
    writeln!(writer, "{}", "=====================".cyan())?;
    writeln!(
        writer,
        "Policy: {}  Difficulty: {}  Runs per campaign: {}",
        report.policy, report.difficulty, report.runs_per_campaign
    )?;
    writeln!(writer, "Campaigns: {}  Runs: {}", summary.campaigns, summary.runs)?;
    writeln!(
        writer,
        "Escapes: {} ({:.1}%)",
        summary.escapes.to_string().green(),
        summary.escape_rate
    )?;
    for (cause, count) in &summary.deaths {
        writeln!(writer, "Deaths ({cause}): {}", count.to_string().red())?;
    }
    writeln!(writer, "Second-life revivals: {}", summary.revivals)?;
    writeln!(writer, "Average floor reached: {:.2}", summary.avg_floor)?;
    writeln!(writer, "Average decisions per run: {:.1}", summary.avg_decisions)?;
    writeln!(writer, "Average final KP: {:.1}", summary.avg_final_kp)?;
    writeln!(writer, "Average unlocks owned: {:.1}", summary.avg_unlocked)?;
    writeln!(writer, "Total time: {total_duration:?}")?;

    if !summary.endings.is_empty() {
        writeln!(writer)?;
        writeln!(writer, "{}", "🏆 Endings".bright_yellow().bold())?;
        writeln!(writer, "{}", "==========".yellow())?;
        for (ending, count) in &summary.endings {
            writeln!(writer, "  {ending:16} {count}")?;
        }
    }

    for campaign in &report.campaigns {
        writeln!(writer)?;
        writeln!(writer, "{}", format!("Seed {}", campaign.seed).bold())?;
        for record in &campaign.records {
            let cause = match record.cause {
                EndCause::Escape => record.cause.to_string().green(),
                _ => record.cause.to_string().red(),
            };
            writeln!(
                writer,
                "   #{:<3} {:7} {} floor {} after {} decisions{}",
                record.run,
                record.difficulty,
                cause,
                record.floor,
                record.decisions,
                record
                    .ending
                    .as_deref()
                    .map(|e| format!(" [{e}]"))
                    .unwrap_or_default()
            )?;
        }
        if !campaign.purchases.is_empty() {
            writeln!(writer, "   Purchased: {}", campaign.purchases.join(", "))?;
        }
    }

    if !report.failures.is_empty() {
        writeln!(writer)?;
        writeln!(writer, "{}", "❌ Failures".red().bold())?;
        for failure in &report.failures {
            writeln!(writer, "   • seed {}: {}", failure.seed, failure.error.red())?;
        }
    }
    Ok(())
}

pub fn generate_json_report<W: Write + ?Sized>(writer: &mut W, report: &SimulationReport) -> Result<()> {
    serde_json::to_writer_pretty(&mut *writer, report)?;
    writeln!(writer)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logic::simulation::RunRecord;

    fn record(run: usize, cause: EndCause, ending: Option<&str>, floor: u32) -> RunRecord {
        RunRecord {
            run,
            difficulty: "easy".into(),
            cause,
            ending: ending.map(String::from),
            floor,
            decisions: 10,
            hp: 10,
            mn: 10,
            inf: 10,
            revived: false,
            kp_after: 3,
        }
    }

    fn outcome() -> CampaignOutcome {
        CampaignOutcome {
            seed: 9,
            records: vec![
                record(0, EndCause::Escape, Some("standard"), 5),
                record(1, EndCause::Health, None, 2),
                record(2, EndCause::Mental, None, 3),
                record(3, EndCause::Escape, Some("standard"), 5),
            ],
            purchases: vec!["u1".into()],
            auto_unlocks: Vec::new(),
            final_kp: 4,
            unlocked: 2,
            endings: vec!["standard".into()],
            cleared: vec!["easy".into()],
        }
    }

    fn report(failures: Vec<CampaignFailure>) -> SimulationReport {
        let campaigns = vec![outcome()];
        SimulationReport {
            policy: PolicyKind::Cautious,
            difficulty: "easy".into(),
            runs_per_campaign: 4,
            summary: SimulationSummary::from_outcomes(&campaigns),
            failures,
            campaigns,
        }
    }

    #[test]
    fn summary_counts_causes_and_endings() {
        let summary = SimulationSummary::from_outcomes(&[outcome()]);
        assert_eq!(summary.runs, 4);
        assert_eq!(summary.escapes, 2);
        assert_eq!(summary.deaths.get("health"), Some(&1));
        assert_eq!(summary.deaths.get("mental"), Some(&1));
        assert_eq!(summary.endings.get("standard"), Some(&2));
        assert!((summary.escape_rate - 50.0).abs() < f64::EPSILON);
        assert!((summary.avg_floor - 3.75).abs() < f64::EPSILON);
    }

    #[test]
    fn empty_summary_has_no_nans() {
        let summary = SimulationSummary::from_outcomes(&[]);
        assert_eq!(summary.runs, 0);
        assert!(summary.avg_floor.abs() < f64::EPSILON);
        assert!(summary.escape_rate.abs() < f64::EPSILON);
    }

    #[test]
    fn json_report_is_parseable() {
        let mut buffer = Vec::new();
        generate_json_report(&mut buffer, &report(Vec::new())).unwrap();
        let value: serde_json::Value = serde_json::from_slice(&buffer).unwrap();
        assert_eq!(value["policy"], "cautious");
        assert_eq!(value["summary"]["runs"], 4);
        assert_eq!(value["campaigns"][0]["records"][1]["cause"], "health");
    }

    #[test]
    fn console_report_lists_failures() {
        colored::control::set_override(false);
        let failing = report(vec![CampaignFailure {
            seed: 9,
            error: "boom".into(),
        }]);
        assert!(!failing.passed());
        let mut buffer = Vec::new();
        generate_console_report(&mut buffer, &failing, Duration::from_millis(5)).unwrap();
        let text = String::from_utf8(buffer).unwrap();
        assert!(text.contains("Escapes: 2 (50.0%)"));
        assert!(text.contains("seed 9: boom"));
        assert!(text.contains("[standard]"));
    }
}
