//! # acmsim Configuration System
//!
//! Hierarchical configuration for a simulation scenario: the link, the
//! scheduler under test, the offered traffic and the run control.
//!
//! ## Sources
//! Later sources override earlier ones:
//! 1. Built-in defaults (a runnable four-MODCOD DVB-S2 scenario)
//! 2. A YAML file (`config/acmsim.yaml` unless a path is given)
//! 3. `ACMSIM_*` environment variables, `__` separating nested keys
//!    (`ACMSIM_SCHEDULER__ALGORITHM=batch`)
//!
//! The merged result is validated before it is returned.

#![warn(unsafe_code)]
#![deny(rustdoc::broken_intra_doc_links)]

use std::path::{Path, PathBuf};

use figment::{
    providers::{Env, Format, Serialized, Yaml},
    Figment,
};
use serde::{Deserialize, Serialize};
use validator::Validate;

mod error;
mod link;
mod scheduler;
mod simulation;
mod telemetry;
mod traffic;
mod validation;

pub use error::ConfigError;
pub use link::{FrameSizeConfig, LinkConfig, ModcodConfig};
pub use scheduler::{
    Algorithm, BatchSettings, DrrConfig, KnapsackConfig, QosConfig, SchedulerConfig,
    UtilityKindConfig, WeightModeConfig,
};
pub use simulation::SimulationConfig;
pub use telemetry::TelemetryConfig;
pub use traffic::{ArrivalConfig, SizeConfig, SourceConfig, TrafficConfig};

/// Default configuration file, relative to the working directory.
pub const DEFAULT_PATH: &str = "config/acmsim.yaml";

/// Prefix of the environment overrides.
pub const ENV_PREFIX: &str = "ACMSIM_";

/// Top-level configuration of one scenario.
#[derive(Debug, Serialize, Deserialize, Validate, Default, Clone, PartialEq)]
#[serde(default)]
#[validate(schema(function = validation::validate_queues))]
pub struct AcmSimConfig {
    /// Seed, horizon and repetitions.
    #[validate(nested)]
    pub simulation: SimulationConfig,

    /// MODCOD table and link rates.
    #[validate(nested)]
    pub link: LinkConfig,

    /// Scheduler under test and its tuning.
    #[validate(nested)]
    pub scheduler: SchedulerConfig,

    /// Offered load.
    #[validate(nested)]
    pub traffic: TrafficConfig,

    /// Log level and metrics output.
    #[validate(nested)]
    pub telemetry: TelemetryConfig,
}

impl AcmSimConfig {
    /// Loads defaults, then `config/acmsim.yaml` if present, then the
    /// environment.
    pub fn load() -> Result<Self, ConfigError> {
        let mut figment = Figment::from(Serialized::defaults(AcmSimConfig::default()));
        if Path::new(DEFAULT_PATH).exists() {
            figment = figment.merge(Yaml::file(DEFAULT_PATH));
        }
        Self::finish(figment)
    }

    /// Same as [`load`](Self::load) with an explicit file, which must exist.
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ConfigError::FileNotFound(PathBuf::from(path)));
        }
        let figment =
            Figment::from(Serialized::defaults(AcmSimConfig::default())).merge(Yaml::file(path));
        Self::finish(figment)
    }

    /// Parses a YAML document over the defaults, without environment
    /// overrides.
    pub fn from_yaml_str(yaml: &str) -> Result<Self, ConfigError> {
        let config: Self = Figment::from(Serialized::defaults(AcmSimConfig::default()))
            .merge(Yaml::string(yaml))
            .extract()?;
        config.validate()?;
        Ok(config)
    }

    /// Validates a configuration built in code.
    pub fn check(&self) -> Result<(), ConfigError> {
        self.validate().map_err(ConfigError::from)
    }

    fn finish(figment: Figment) -> Result<Self, ConfigError> {
        figment
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()
            .map_err(ConfigError::from)
            .and_then(|config: Self| {
                config.validate()?;
                Ok(config)
            })
    }
}
