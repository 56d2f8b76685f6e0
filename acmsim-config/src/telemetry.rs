//! Logging and metrics output.

use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::validation;

#[derive(Debug, Serialize, Deserialize, Validate, Clone, PartialEq)]
#[serde(default)]
pub struct TelemetryConfig {
    /// Default `tracing` level, overridden by `RUST_LOG`.
    #[validate(custom(function = validation::validate_log_level))]
    pub log_level: String,

    /// Print the Prometheus text exposition after the runs.
    pub metrics: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: "info".into(),
            metrics: false,
        }
    }
}
