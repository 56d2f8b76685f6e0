//! Synthetic traffic sources.
//!
//! A source feeds one queue: `(modcod, qos)` for the ACM schedulers, source
//! `qos` for Round Robin and DRR (which ignore `modcod`).

use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::validation;

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ArrivalConfig {
    /// One packet every `1 / rate` seconds.
    Constant,
    /// Exponential inter-arrival times of mean `1 / rate`.
    #[default]
    Poisson,
}

/// Packet sizes in bytes, uniform over `[min, max]`.
#[derive(Debug, Serialize, Deserialize, Validate, Clone, Copy, PartialEq, Eq)]
#[validate(schema(function = validation::validate_size_range))]
pub struct SizeConfig {
    #[validate(range(min = 1))]
    pub min: usize,
    #[validate(range(min = 1))]
    pub max: usize,
}

impl SizeConfig {
    pub fn fixed(size: usize) -> Self {
        Self {
            min: size,
            max: size,
        }
    }

    pub fn is_fixed(&self) -> bool {
        self.min == self.max
    }
}

#[derive(Debug, Serialize, Deserialize, Validate, Clone, PartialEq)]
#[validate(schema(function = validation::validate_source_window))]
pub struct SourceConfig {
    #[serde(default)]
    pub modcod: usize,
    #[serde(default)]
    pub qos: usize,
    #[serde(default)]
    pub arrival: ArrivalConfig,
    /// Packets per second.
    #[validate(range(exclusive_min = 0.0))]
    pub rate: f64,
    #[validate(nested)]
    pub size: SizeConfig,
    /// First arrival date, in seconds.
    #[serde(default)]
    #[validate(range(min = 0.0))]
    pub start: f64,
    /// No arrival after this date.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop: Option<f64>,
}

#[derive(Debug, Serialize, Deserialize, Validate, Clone, PartialEq)]
#[serde(default)]
pub struct TrafficConfig {
    #[validate(nested)]
    pub sources: Vec<SourceConfig>,
}

impl Default for TrafficConfig {
    fn default() -> Self {
        let source = |modcod, qos, rate, size| SourceConfig {
            modcod,
            qos,
            arrival: ArrivalConfig::Poisson,
            rate,
            size,
            start: 0.0,
            stop: None,
        };
        Self {
            sources: vec![
                source(0, 0, 2_000.0, SizeConfig::fixed(188)),
                source(1, 1, 1_500.0, SizeConfig { min: 64, max: 1500 }),
                source(3, 1, 1_000.0, SizeConfig { min: 64, max: 1500 }),
            ],
        }
    }
}
