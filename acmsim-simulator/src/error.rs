use thiserror::Error;

use acmsim_config::ConfigError;
use acmsim_core::SimulationError;
use acmsim_link::LinkError;
use acmsim_sched::ScheduleError;

/// Failures while building or running a scenario.
#[derive(Debug, Error)]
pub enum SimulatorError {
    #[error("Invalid scenario: {0}")]
    Scenario(String),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Link(#[from] LinkError),

    #[error(transparent)]
    Schedule(#[from] ScheduleError),

    #[error("Simulation failed: {0}")]
    Simulation(#[from] SimulationError),

    #[error("Report serialization failed: {0}")]
    Report(#[from] serde_yaml::Error),
}
