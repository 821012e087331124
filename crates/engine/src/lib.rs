//! Move-command generation for boxing rounds.
//!
//! The generator turns the current complexity, intensity and round into one
//! spoken instruction plus the time the performer gets to execute it. Tier
//! selection depends only on the complexity score; everything random goes
//! through [`RandomSource`] so callers can inject a seeded or scripted source.

use rand::{rngs::StdRng, Rng, RngCore, SeedableRng};
use shared::domain::{clamp_score, MoveCommand};
use tracing::trace;

/// Pause appended after every numbered call.
pub const PAUSE_MS: u64 = 1500;
pub const DEFENSE_MS: u64 = 1500;
/// Time per punch in a numbered call; index 3 means a three-punch count.
pub const MOVE_UNIT_MS: u64 = 1000;
pub const COMBO_ELEMENT_MS: u64 = 1500;

/// Highest complexity still served by the intermediate tier.
pub const INTERMEDIATE_CEILING: f64 = 0.4;
pub const BROKEN_COMBO_PROBABILITY: f64 = 0.5;
pub const MIN_COMBO_MOVES: usize = 2;
pub const MAX_COMBO_MOVES: usize = 4;

pub const MOVE_NAMES: [&str; 4] = [
    "Left straight punch",
    "Right straight punch",
    "Left hook",
    "Right uppercut",
];

/// Short names called inside broken combos.
pub const COMBO_MOVES: [&str; 4] = ["Left straight", "Right straight", "Left hook", "Right uppercut"];

const DEFENSE_PREFIX: &str = "Defense and ";
const DEFENSE_CALL: &str = "Defense";

pub trait RandomSource {
    /// Uniform sample in `[0.0, 1.0)`.
    fn unit(&mut self) -> f64;
    /// Uniform index in `0..len`. `len` is never zero.
    fn index(&mut self, len: usize) -> usize;
}

impl<R: RngCore + ?Sized> RandomSource for R {
    fn unit(&mut self) -> f64 {
        self.random::<f64>()
    }

    fn index(&mut self, len: usize) -> usize {
        self.random_range(0..len)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tier {
    /// A single numeral.
    Basic,
    /// A numeral, sometimes preceded by a defensive movement.
    Intermediate,
    /// Named multi-move combos half of the time, intermediate calls otherwise.
    Advanced,
}

impl Tier {
    pub fn for_complexity(complexity: f64) -> Self {
        let complexity = clamp_score(complexity);
        if complexity == 0.0 {
            Tier::Basic
        } else if complexity <= INTERMEDIATE_CEILING {
            Tier::Intermediate
        } else {
            Tier::Advanced
        }
    }
}

/// Human-readable name of a numbered move (1-based).
pub fn move_name(index: u8) -> Option<&'static str> {
    MOVE_NAMES.get(usize::from(index).checked_sub(1)?).copied()
}

/// Produces the next command. Scores are clamped into `[0.0, 1.0]` first and
/// echoed back on the command; `round` is carried through untouched.
pub fn generate<R: RandomSource + ?Sized>(
    rng: &mut R,
    complexity: f64,
    intensity: f64,
    round: u8,
) -> MoveCommand {
    let complexity = clamp_score(complexity);
    let intensity = clamp_score(intensity);

    let (command, duration_ms) = match Tier::for_complexity(complexity) {
        Tier::Basic => numbered_call(rng),
        Tier::Intermediate => defended_call(rng, intensity),
        Tier::Advanced => {
            if rng.unit() < BROKEN_COMBO_PROBABILITY {
                broken_combo(rng, intensity)
            } else {
                defended_call(rng, intensity)
            }
        }
    };
    trace!(complexity, intensity, round, %command, duration_ms, "generated move");

    MoveCommand {
        command,
        complexity_score: complexity,
        intensity_score: intensity,
        duration_ms,
        round_number: round,
    }
}

fn pick_move_index<R: RandomSource + ?Sized>(rng: &mut R) -> u64 {
    rng.index(MOVE_NAMES.len()) as u64 + 1
}

fn numbered_call<R: RandomSource + ?Sized>(rng: &mut R) -> (String, u64) {
    let index = pick_move_index(rng);
    (index.to_string(), index * MOVE_UNIT_MS + PAUSE_MS)
}

fn defended_call<R: RandomSource + ?Sized>(rng: &mut R, intensity: f64) -> (String, u64) {
    if rng.unit() < intensity {
        let index = pick_move_index(rng);
        (
            format!("{DEFENSE_PREFIX}{index}"),
            DEFENSE_MS + index * MOVE_UNIT_MS + PAUSE_MS,
        )
    } else {
        numbered_call(rng)
    }
}

fn broken_combo<R: RandomSource + ?Sized>(rng: &mut R, intensity: f64) -> (String, u64) {
    let count = MIN_COMBO_MOVES + rng.index(MAX_COMBO_MOVES - MIN_COMBO_MOVES + 1);
    let mut combo = Vec::with_capacity(count + 1);
    if rng.unit() < intensity {
        combo.push(DEFENSE_CALL);
    }
    for _ in 0..count {
        combo.push(COMBO_MOVES[rng.index(COMBO_MOVES.len())]);
    }
    let duration_ms = combo.len() as u64 * COMBO_ELEMENT_MS;
    (combo.join(", "), duration_ms)
}

/// Owns a random source and hands out commands. Holds no workout state.
pub struct MoveGenerator<R = StdRng> {
    rng: R,
}

impl MoveGenerator<StdRng> {
    pub fn from_entropy() -> Self {
        Self::new(StdRng::from_os_rng())
    }

    pub fn seeded(seed: u64) -> Self {
        Self::new(StdRng::seed_from_u64(seed))
    }
}

impl<R: RandomSource> MoveGenerator<R> {
    pub fn new(rng: R) -> Self {
        Self { rng }
    }

    pub fn generate(&mut self, complexity: f64, intensity: f64, round: u8) -> MoveCommand {
        generate(&mut self.rng, complexity, intensity, round)
    }
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
