//! Run and simulation reports.

use serde::Serialize;

use crate::error::SimulatorError;
use acmsim_core::SimTime;
use acmsim_telemetry::metrics::RunTotals;
use acmsim_telemetry::Summary;

/// Outcome of one repetition.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunReport {
    pub run: u32,
    pub seed: u64,
    pub duration: SimTime,
    pub events_fired: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trace_hash: Option<String>,
    pub pdus_generated: u64,
    pub bytes_generated: u64,
    pub pdus_sent: u64,
    pub bytes_sent: u64,
    /// Frames on an ACM link, packets on a simplex link.
    pub frames_sent: u64,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub frames_per_modcod: Vec<u64>,
    /// Packets still queued at the end of the run.
    pub queued_pdus: usize,
    pub offered_load_bps: f64,
    pub throughput_bps: f64,
    pub utilisation: f64,
    /// Payload over capacity of the frames sent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fill: Option<Summary>,
    pub epochs: u64,
    pub starved_epochs: u64,
    /// Per source service of Round Robin (packets) and DRR (bytes).
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub served: Vec<u64>,
}

impl RunReport {
    pub fn totals(&self) -> RunTotals {
        RunTotals {
            events_fired: self.events_fired,
            pdus_generated: self.pdus_generated,
            frames_sent: self.frames_sent,
            bytes_sent: self.bytes_sent,
            epochs: self.epochs,
            starved_epochs: self.starved_epochs,
        }
    }
}

/// Every repetition of a scenario.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SimulationReport {
    pub algorithm: String,
    pub duration: SimTime,
    pub mean_throughput_bps: f64,
    pub mean_utilisation: f64,
    pub runs: Vec<RunReport>,
}

impl SimulationReport {
    pub fn new(algorithm: impl Into<String>, duration: SimTime, runs: Vec<RunReport>) -> Self {
        let mean = |f: fn(&RunReport) -> f64| {
            if runs.is_empty() {
                0.0
            } else {
                runs.iter().map(f).sum::<f64>() / runs.len() as f64
            }
        };
        Self {
            algorithm: algorithm.into(),
            duration,
            mean_throughput_bps: mean(|r| r.throughput_bps),
            mean_utilisation: mean(|r| r.utilisation),
            runs,
        }
    }

    pub fn to_yaml(&self) -> Result<String, SimulatorError> {
        Ok(serde_yaml::to_string(self)?)
    }
}
