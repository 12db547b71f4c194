pub mod policy;
pub mod reports;
pub mod seeds;
pub mod simulation;

pub use policy::{PolicyKind, difficulty_ids};
pub use reports::{CampaignFailure, SimulationReport, SimulationSummary};
pub use seeds::resolve_seed_inputs;
pub use simulation::{CampaignConfig, DifficultyPlan, run_campaign};
