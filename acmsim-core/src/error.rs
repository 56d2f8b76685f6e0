use thiserror::Error;

/// Errors that abort a simulation run.
///
/// Event callbacks return `Result<(), SimulationError>`; the first error stops
/// `run_until`/`run_until_exhausted` and is handed back to the caller.
#[derive(Debug, Error)]
pub enum SimulationError {
    #[error("Event processing error: {0}")]
    Processing(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Component(#[from] Box<dyn std::error::Error + Send + Sync>),
}
