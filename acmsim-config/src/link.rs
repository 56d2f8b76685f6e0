//! Link model parameters.
//!
//! MODCODs are listed from the most robust to the fastest. An entry naming a
//! DVB-S2 MODCOD (`"8PSK 3/4"`) gets its payload and duration from the symbol
//! rate; an entry giving both `payload_bits` and `transmission_time` is taken
//! as is.

use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::validation;

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum FrameSizeConfig {
    #[default]
    Normal,
    Short,
}

#[derive(Debug, Serialize, Deserialize, Validate, Clone, PartialEq)]
#[validate(schema(function = validation::validate_modcod))]
pub struct ModcodConfig {
    #[validate(length(min = 1, message = "MODCOD name cannot be empty"))]
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload_bits: Option<u64>,

    /// Frame duration in seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transmission_time: Option<f64>,
}

impl ModcodConfig {
    pub fn named(name: &str) -> Self {
        Self {
            name: name.to_string(),
            payload_bits: None,
            transmission_time: None,
        }
    }

    /// Payload and duration, when both are given explicitly.
    pub fn explicit(&self) -> Option<(u64, f64)> {
        self.payload_bits.zip(self.transmission_time)
    }
}

#[derive(Debug, Serialize, Deserialize, Validate, Clone, PartialEq)]
#[serde(default)]
pub struct LinkConfig {
    /// Symbols per second of the DVB-S2 carrier.
    #[validate(range(exclusive_min = 0.0))]
    pub symbol_rate: f64,

    pub frame_size: FrameSizeConfig,

    pub pilots: bool,

    #[validate(length(min = 1, message = "at least one MODCOD is required"), nested)]
    pub modcods: Vec<ModcodConfig>,

    /// Bit rate of the simplex link used by Round Robin and DRR.
    #[validate(range(exclusive_min = 0.0))]
    pub simplex_bit_rate: f64,

    /// Keep a record of every frame sent.
    pub record_frames: bool,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            symbol_rate: 27.5e6,
            frame_size: FrameSizeConfig::Normal,
            pilots: false,
            modcods: ["QPSK 1/2", "QPSK 3/4", "8PSK 2/3", "16APSK 3/4"]
                .into_iter()
                .map(ModcodConfig::named)
                .collect(),
            simplex_bit_rate: 2.0e6,
            record_frames: false,
        }
    }
}
