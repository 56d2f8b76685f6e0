//! # acmsim-telemetry
//!
//! Logging setup, Prometheus metrics and the probe implementations handed to
//! simulated components.

pub mod logging;
pub mod metrics;
pub mod probes;

pub use logging::EventLogger;
pub use metrics::MetricsRecorder;
pub use probes::{CounterProbe, HistogramProbe, Summary, SummaryProbe};
