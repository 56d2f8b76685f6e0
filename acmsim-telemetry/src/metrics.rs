//! ## acmsim-telemetry::metrics
//! **Prometheus registry of a simulation process**
//!
//! Counters are fed once per run from the component statistics, the fill
//! histogram live through a [`HistogramProbe`](crate::probes::HistogramProbe).

use prometheus::{Encoder, Histogram, HistogramOpts, IntCounter, Registry, TextEncoder};

#[derive(Debug, Clone)]
pub struct MetricsRecorder {
    pub registry: Registry,
    pub runs: IntCounter,
    pub events_fired: IntCounter,
    pub pdus_generated: IntCounter,
    pub frames_sent: IntCounter,
    pub bytes_sent: IntCounter,
    pub epochs: IntCounter,
    pub starved_epochs: IntCounter,
    pub frame_fill: Histogram,
}

/// Totals of one run, as fed to [`MetricsRecorder::record_run`].
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RunTotals {
    pub events_fired: u64,
    pub pdus_generated: u64,
    pub frames_sent: u64,
    pub bytes_sent: u64,
    pub epochs: u64,
    pub starved_epochs: u64,
}

fn counter(registry: &Registry, name: &str, help: &str) -> Result<IntCounter, prometheus::Error> {
    let counter = IntCounter::new(name, help)?;
    registry.register(Box::new(counter.clone()))?;
    Ok(counter)
}

impl MetricsRecorder {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();
        let frame_fill = Histogram::with_opts(
            HistogramOpts::new("acmsim_frame_fill_ratio", "Payload over capacity of sent frames")
                .buckets(vec![0.1, 0.25, 0.5, 0.75, 0.9, 0.95, 0.99, 1.0]),
        )?;
        registry.register(Box::new(frame_fill.clone()))?;

        Ok(Self {
            runs: counter(&registry, "acmsim_runs_total", "Completed simulation runs")?,
            events_fired: counter(&registry, "acmsim_events_fired_total", "Events fired")?,
            pdus_generated: counter(
                &registry,
                "acmsim_pdus_generated_total",
                "PDUs produced by traffic sources",
            )?,
            frames_sent: counter(&registry, "acmsim_frames_sent_total", "Frames put on the air")?,
            bytes_sent: counter(&registry, "acmsim_bytes_sent_total", "Payload bytes sent")?,
            epochs: counter(&registry, "acmsim_epochs_total", "Batch epochs planned")?,
            starved_epochs: counter(
                &registry,
                "acmsim_starved_epochs_total",
                "Batch epochs shorter than their minimum duration",
            )?,
            frame_fill,
            registry,
        })
    }

    pub fn record_run(&self, totals: &RunTotals) {
        self.runs.inc();
        self.events_fired.inc_by(totals.events_fired);
        self.pdus_generated.inc_by(totals.pdus_generated);
        self.frames_sent.inc_by(totals.frames_sent);
        self.bytes_sent.inc_by(totals.bytes_sent);
        self.epochs.inc_by(totals.epochs);
        self.starved_epochs.inc_by(totals.starved_epochs);
    }

    /// Text exposition of every registered metric.
    pub fn gather_metrics(&self) -> Result<String, prometheus::Error> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::<u8>::new();
        encoder.encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}
