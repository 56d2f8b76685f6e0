//! Probe implementations.
//!
//! [`SummaryProbe`] keeps running statistics in memory; [`HistogramProbe`]
//! and [`CounterProbe`] forward samples to Prometheus metrics.

use std::cell::Cell;

use prometheus::{Histogram, IntCounter};
use serde::Serialize;

use acmsim_core::probe::Probe;

/// Snapshot of a [`SummaryProbe`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct Summary {
    pub count: u64,
    pub sum: f64,
    pub mean: f64,
    pub min: f64,
    pub max: f64,
}

/// Count, sum, min and max of the values sampled.
#[derive(Debug, Default)]
pub struct SummaryProbe {
    count: Cell<u64>,
    sum: Cell<f64>,
    min: Cell<f64>,
    max: Cell<f64>,
}

impl SummaryProbe {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn count(&self) -> u64 {
        self.count.get()
    }

    pub fn mean(&self) -> f64 {
        match self.count.get() {
            0 => 0.0,
            n => self.sum.get() / n as f64,
        }
    }

    pub fn summary(&self) -> Summary {
        Summary {
            count: self.count.get(),
            sum: self.sum.get(),
            mean: self.mean(),
            min: self.min.get(),
            max: self.max.get(),
        }
    }
}

impl Probe for SummaryProbe {
    fn sample(&self, value: f64) {
        let first = self.count.get() == 0;
        self.count.set(self.count.get() + 1);
        self.sum.set(self.sum.get() + value);
        if first || value < self.min.get() {
            self.min.set(value);
        }
        if first || value > self.max.get() {
            self.max.set(value);
        }
    }

    fn reset(&self) {
        self.count.set(0);
        self.sum.set(0.0);
        self.min.set(0.0);
        self.max.set(0.0);
    }
}

/// Observes every sample into a Prometheus histogram.
#[derive(Debug, Clone)]
pub struct HistogramProbe(pub Histogram);

impl Probe for HistogramProbe {
    fn sample(&self, value: f64) {
        self.0.observe(value);
    }
}

/// Counts occurrences in a Prometheus counter.
#[derive(Debug, Clone)]
pub struct CounterProbe(pub IntCounter);

impl Probe for CounterProbe {
    fn sample(&self, _value: f64) {
        self.0.inc();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use prometheus::HistogramOpts;

    #[test]
    fn summary_tracks_extremes() {
        let probe = SummaryProbe::new();
        assert_eq!(probe.mean(), 0.0);
        for value in [3.0, -1.0, 4.0] {
            probe.sample(value);
        }
        let summary = probe.summary();
        assert_eq!(summary.count, 3);
        assert_eq!(summary.min, -1.0);
        assert_eq!(summary.max, 4.0);
        assert_eq!(summary.mean, 2.0);

        probe.reset();
        assert_eq!(probe.summary(), Summary::default());
    }

    #[test]
    fn prometheus_probes_forward_samples() {
        let histogram = Histogram::with_opts(HistogramOpts::new("h", "help")).unwrap();
        let counter = IntCounter::new("c", "help").unwrap();
        let (h, c) = (HistogramProbe(histogram.clone()), CounterProbe(counter.clone()));
        h.sample(0.5);
        c.sample_event();
        c.sample(12.0);
        assert_eq!(histogram.get_sample_count(), 1);
        assert_eq!(counter.get(), 2);
    }
}
