//! Run control: seed, horizon and repetitions.

use serde::{Deserialize, Serialize};
use validator::Validate;

#[derive(Debug, Serialize, Deserialize, Validate, Clone, PartialEq)]
#[serde(default)]
pub struct SimulationConfig {
    /// Seed of every random generator of the scenario.
    pub seed: u64,

    /// Simulated seconds per run.
    #[validate(range(exclusive_min = 0.0, message = "duration must be positive"))]
    pub duration: f64,

    /// Repetitions of the same scenario, separated by a reset.
    #[validate(range(min = 1, max = 10_000))]
    pub runs: u32,

    /// Hash every fired event so runs can be compared.
    pub trace: bool,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            seed: 42,
            duration: 10.0,
            runs: 1,
            trace: true,
        }
    }
}
