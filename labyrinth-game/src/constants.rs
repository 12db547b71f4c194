//! Centralized balance and tuning constants for Labyrinth Echo game logic.
//!
//! These values define the deterministic math for the rule engine. Keeping them
//! together ensures that gameplay can only be adjusted via code changes reviewed
//! in version control, rather than through external JSON assets.

// Run structure ------------------------------------------------------------
pub const EVENTS_PER_FLOOR: u32 = 3;
pub const MAX_FLOOR: u32 = 5;
pub const BOSS_EVENT_ID: &str = "e030";
pub const MAX_BOSS_ATTEMPTS: usize = 3;
pub const BOSS_INTERLUDE_EVENTS: usize = 2;

// Starting resources -------------------------------------------------------
pub const BASE_HP: i32 = 55;
pub const BASE_MN: i32 = 35;
pub const BASE_INF: i32 = 5;

// Condition softening ------------------------------------------------------
pub(crate) const DANGER_SENSE_HP_THRESHOLD: i32 = 30;
pub(crate) const DANGER_SENSE_HP_BONUS: i32 = 20;
pub(crate) const NEGOTIATOR_MN_BONUS: i32 = 8;
pub(crate) const MENTAL_SENSE_MN_THRESHOLD: i32 = 25;
pub(crate) const MENTAL_SENSE_MN_BONUS: i32 = 15;

// Modifier pipeline --------------------------------------------------------
pub(crate) const CURSE_INFO_FACTOR: f64 = 0.5;
pub(crate) const FLOAT_EPSILON: f64 = 1e-9;

// Status ticks -------------------------------------------------------------
pub(crate) const BLEEDING_TICK_HP: i32 = -5;
pub(crate) const FEAR_TICK_MN: i32 = -4;
pub(crate) const BLEED_REDUCE_FACTOR: f64 = 0.5;

// Impact classification ----------------------------------------------------
pub(crate) const BIG_DAMAGE_HP: i32 = -16;
pub(crate) const HEAVY_MENTAL_DAMAGE_MN: i32 = -11;

// Persistence --------------------------------------------------------------
pub const META_STORAGE_KEY: &str = "labyrinth-echo.meta";
