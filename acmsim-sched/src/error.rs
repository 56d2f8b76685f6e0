use thiserror::Error;

use acmsim_core::SimulationError;
use acmsim_link::ModcodId;

/// Errors raised while planning or committing frames.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ScheduleError {
    /// The knapsack state table outgrew its bound.
    #[error("Knapsack state table for {modcod} exceeded {limit} states")]
    CapacityExceeded { modcod: ModcodId, limit: usize },

    #[error("Invalid scheduler configuration: {0}")]
    InvalidConfiguration(String),

    /// A strategy handed back a plan without a MODCOD.
    #[error("Fill plan has no MODCOD")]
    UnsetModcod,

    /// A strategy handed back a plan larger than its frame.
    #[error("Fill plan of {volume} bytes overflows {modcod} ({capacity} bytes)")]
    Overflow {
        modcod: ModcodId,
        volume: usize,
        capacity: usize,
    },
}

impl From<ScheduleError> for SimulationError {
    fn from(err: ScheduleError) -> Self {
        SimulationError::Component(Box::new(err))
    }
}
