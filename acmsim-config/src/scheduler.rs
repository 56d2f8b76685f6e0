//! Scheduler selection and tuning.

use std::fmt;

use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::validation;

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum Algorithm {
    #[default]
    Utility,
    Knapsack,
    KnapsackBounded,
    Batch,
    RoundRobin,
    Drr,
}

impl Algorithm {
    pub fn as_str(self) -> &'static str {
        match self {
            Algorithm::Utility => "utility",
            Algorithm::Knapsack => "knapsack",
            Algorithm::KnapsackBounded => "knapsack_bounded",
            Algorithm::Batch => "batch",
            Algorithm::RoundRobin => "round_robin",
            Algorithm::Drr => "drr",
        }
    }

    /// Whether the algorithm fills frames on an ACM link, as opposed to
    /// feeding packets to a simplex link.
    pub fn is_acm(self) -> bool {
        !matches!(self, Algorithm::RoundRobin | Algorithm::Drr)
    }
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum UtilityKindConfig {
    Log,
    #[default]
    Linear,
    Exp,
    ExpNormalized,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum WeightModeConfig {
    #[default]
    Utility,
    Length,
    UtilityThenLength,
    LengthThenDuration,
}

/// Utility function of one queue. Without `modcod`, applies to the QoS class
/// on every MODCOD.
#[derive(Debug, Serialize, Deserialize, Validate, Clone, PartialEq)]
pub struct QosConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modcod: Option<usize>,
    pub qos: usize,
    #[serde(default)]
    pub kind: UtilityKindConfig,
    #[validate(range(min = 0.0))]
    pub beta: f64,
    #[serde(default)]
    pub rmin: f64,
    /// Rate estimate at the start of every run, in bit/s.
    #[serde(default)]
    #[validate(range(min = 0.0))]
    pub initial_rate: f64,
}

#[derive(Debug, Serialize, Deserialize, Validate, Clone, PartialEq)]
#[serde(default)]
pub struct KnapsackConfig {
    /// Bound of the state table.
    #[validate(range(min = 1))]
    pub max_states: usize,
}

impl Default for KnapsackConfig {
    fn default() -> Self {
        Self { max_states: 16_384 }
    }
}

#[derive(Debug, Serialize, Deserialize, Validate, Clone, PartialEq)]
#[serde(default)]
pub struct BatchSettings {
    /// Minimum air time planned per epoch, in seconds.
    #[validate(range(exclusive_min = 0.0))]
    pub epoch_min_duration: f64,
    pub weight_mode: WeightModeConfig,
    #[validate(range(min = 1, max = 4096))]
    pub max_sequence_len: usize,
    pub work_conserving: bool,
}

impl Default for BatchSettings {
    fn default() -> Self {
        Self {
            epoch_min_duration: 0.1,
            weight_mode: WeightModeConfig::Utility,
            max_sequence_len: 64,
            work_conserving: true,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Validate, Clone, PartialEq)]
#[serde(default)]
pub struct DrrConfig {
    /// Bytes credited per round to sources without an entry in `quanta`.
    #[validate(range(min = 1))]
    pub quantum: usize,
    #[validate(custom(function = validation::validate_quanta))]
    pub quanta: Vec<usize>,
}

impl Default for DrrConfig {
    fn default() -> Self {
        Self {
            quantum: 1500,
            quanta: Vec::new(),
        }
    }
}

impl DrrConfig {
    pub fn quantum_of(&self, source: usize) -> usize {
        self.quanta.get(source).copied().unwrap_or(self.quantum)
    }
}

#[derive(Debug, Serialize, Deserialize, Validate, Clone, PartialEq)]
#[serde(default)]
#[validate(schema(function = validation::validate_qos_classes))]
pub struct SchedulerConfig {
    pub algorithm: Algorithm,

    /// QoS classes per MODCOD, or sources of Round Robin and DRR.
    #[validate(range(min = 1, max = 64))]
    pub nb_qos: usize,

    /// Weight of the previous estimate in the rate EMA.
    #[validate(range(min = 0.0, max = 1.0))]
    pub rate_ema_alpha: f64,

    /// Let frames carry packets of faster MODCODs.
    pub downgrade: bool,

    #[validate(nested)]
    pub knapsack: KnapsackConfig,

    #[validate(nested)]
    pub batch: BatchSettings,

    #[validate(nested)]
    pub drr: DrrConfig,

    #[validate(nested)]
    pub qos: Vec<QosConfig>,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            algorithm: Algorithm::Utility,
            nb_qos: 2,
            rate_ema_alpha: 0.9,
            downgrade: false,
            knapsack: KnapsackConfig::default(),
            batch: BatchSettings::default(),
            drr: DrrConfig::default(),
            qos: vec![
                QosConfig {
                    modcod: None,
                    qos: 0,
                    kind: UtilityKindConfig::Linear,
                    beta: 2.0,
                    rmin: 0.0,
                    initial_rate: 0.0,
                },
                QosConfig {
                    modcod: None,
                    qos: 1,
                    kind: UtilityKindConfig::Linear,
                    beta: 1.0,
                    rmin: 0.0,
                    initial_rate: 0.0,
                },
            ],
        }
    }
}
