//! ## acmsim-sched::qos
//! **Per-queue QoS descriptors and utility functions**
//!
//! Every (MODCOD, QoS) queue carries a utility function of its measured
//! throughput. Schedulers rank queues by the derivative of that function:
//! the marginal gain of one more bit sent.
//!
//! | kind            | utility                      | derivative                      |
//! |-----------------|------------------------------|---------------------------------|
//! | `Log`           | `beta * ln(r)`               | `beta / r`                      |
//! | `Linear`        | `beta * r`                   | `beta`                          |
//! | `Exp`           | `r - e^(beta * (rmin - r))`  | `1 + beta * e^(beta * (rmin - r))` |
//! | `ExpNormalized` | `Exp` on `r / r_ref`         | `Exp` derivative on `r / r_ref` |
//!
//! `r_ref` is the bit rate of MODCOD 0, so `rmin` of an `ExpNormalized` queue
//! is expressed in the same normalized unit.

use acmsim_link::{ModcodId, ModcodTable};

/// Lowest rate fed to the `Log` utility, in bit/s.
pub const MIN_RATE: f64 = 1.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UtilityKind {
    Log,
    #[default]
    Linear,
    Exp,
    ExpNormalized,
}

#[derive(Debug, Clone, PartialEq)]
pub struct QosDescriptor {
    kind: UtilityKind,
    beta: f64,
    rmin: f64,
    initial_rate: f64,
    measured_rate: f64,
}

impl Default for QosDescriptor {
    fn default() -> Self {
        Self::new(UtilityKind::Linear, 1.0, 0.0)
    }
}

impl QosDescriptor {
    pub fn new(kind: UtilityKind, beta: f64, rmin: f64) -> Self {
        Self {
            kind,
            beta,
            rmin,
            initial_rate: 0.0,
            measured_rate: 0.0,
        }
    }

    /// Sets the rate the EMA starts from (and returns to on reset).
    pub fn with_initial_rate(mut self, rate: f64) -> Self {
        self.initial_rate = rate;
        self.measured_rate = rate;
        self
    }

    pub fn kind(&self) -> UtilityKind {
        self.kind
    }

    pub fn beta(&self) -> f64 {
        self.beta
    }

    pub fn rmin(&self) -> f64 {
        self.rmin
    }

    /// Exponential moving average of the throughput, in bit/s.
    pub fn measured_rate(&self) -> f64 {
        self.measured_rate
    }

    /// Marginal utility at the current measured rate.
    pub fn derivative(&self, reference_rate: f64) -> f64 {
        let rate = self.measured_rate;
        match self.kind {
            UtilityKind::Log => self.beta / rate.max(MIN_RATE),
            UtilityKind::Linear => self.beta,
            UtilityKind::Exp => 1.0 + self.beta * (self.beta * (self.rmin - rate)).exp(),
            UtilityKind::ExpNormalized => {
                let rate = rate / reference_rate;
                1.0 + self.beta * (self.beta * (self.rmin - rate)).exp()
            }
        }
    }

    /// Utility at the current measured rate.
    pub fn utility(&self, reference_rate: f64) -> f64 {
        let rate = self.measured_rate;
        match self.kind {
            UtilityKind::Log => self.beta * rate.max(MIN_RATE).ln(),
            UtilityKind::Linear => self.beta * rate,
            UtilityKind::Exp => rate - (self.beta * (self.rmin - rate)).exp(),
            UtilityKind::ExpNormalized => {
                let rate = rate / reference_rate;
                rate - (self.beta * (self.rmin - rate)).exp()
            }
        }
    }

    /// Folds one observation window into the measured rate.
    pub fn update_rate(&mut self, alpha: f64, instantaneous: f64) {
        self.measured_rate = alpha * self.measured_rate + (1.0 - alpha) * instantaneous;
    }

    pub fn reset(&mut self) {
        self.measured_rate = self.initial_rate;
    }
}

/// QoS descriptors of every (MODCOD, QoS) queue.
#[derive(Debug, Clone)]
pub struct QosGrid {
    descriptors: Vec<QosDescriptor>,
    nb_qos: usize,
    reference_rate: f64,
}

impl QosGrid {
    /// Creates a grid of default (linear, `beta = 1`) descriptors.
    pub fn new(modcods: &ModcodTable, nb_qos: usize) -> Self {
        let reference_rate = modcods
            .iter()
            .next()
            .map(|(_, modcod)| modcod.bit_rate())
            .unwrap_or(1.0);
        Self {
            descriptors: vec![QosDescriptor::default(); modcods.len() * nb_qos],
            nb_qos,
            reference_rate,
        }
    }

    fn slot(&self, modcod: ModcodId, qos: usize) -> usize {
        assert!(qos < self.nb_qos, "QoS {qos} out of range");
        modcod.index() * self.nb_qos + qos
    }

    pub fn get(&self, modcod: ModcodId, qos: usize) -> &QosDescriptor {
        &self.descriptors[self.slot(modcod, qos)]
    }

    pub fn set(&mut self, modcod: ModcodId, qos: usize, descriptor: QosDescriptor) {
        let slot = self.slot(modcod, qos);
        self.descriptors[slot] = descriptor;
    }

    /// Bit rate of MODCOD 0, the normalization base of `ExpNormalized`.
    pub fn reference_rate(&self) -> f64 {
        self.reference_rate
    }

    pub fn derivative(&self, modcod: ModcodId, qos: usize) -> f64 {
        self.get(modcod, qos).derivative(self.reference_rate)
    }

    /// Sum of every queue's utility.
    pub fn total_utility(&self) -> f64 {
        self.descriptors
            .iter()
            .map(|d| d.utility(self.reference_rate))
            .sum()
    }

    /// Updates every queue's EMA after a frame of `duration` seconds.
    /// `bits_sent` is indexed like the grid; queues absent from the frame
    /// observe a zero rate.
    pub fn record_frame(&mut self, bits_sent: &[u64], duration: f64, alpha: f64) {
        debug_assert_eq!(bits_sent.len(), self.descriptors.len());
        if duration <= 0.0 {
            return;
        }
        for (descriptor, bits) in self.descriptors.iter_mut().zip(bits_sent) {
            descriptor.update_rate(alpha, *bits as f64 / duration);
        }
    }

    pub fn reset(&mut self) {
        self.descriptors.iter_mut().for_each(QosDescriptor::reset);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use acmsim_link::Modcod;

    fn table() -> ModcodTable {
        ModcodTable::new(vec![
            Modcod::new("a", 8_000, 0.01),
            Modcod::new("b", 16_000, 0.01),
        ])
        .unwrap()
    }

    #[test]
    fn log_derivative_floors_the_rate() {
        let qos = QosDescriptor::new(UtilityKind::Log, 2.0, 0.0);
        assert_eq!(qos.derivative(1.0), 2.0);
        let qos = qos.with_initial_rate(4.0);
        assert_eq!(qos.derivative(1.0), 0.5);
    }

    #[test]
    fn exp_derivative_peaks_below_rmin() {
        let below = QosDescriptor::new(UtilityKind::Exp, 1.0, 10.0).with_initial_rate(5.0);
        let above = QosDescriptor::new(UtilityKind::Exp, 1.0, 10.0).with_initial_rate(20.0);
        assert!(below.derivative(1.0) > above.derivative(1.0));
        assert!((above.derivative(1.0) - 1.0).abs() < 1e-3);
    }

    #[test]
    fn normalized_exp_uses_reference_rate() {
        let grid = QosGrid::new(&table(), 1);
        assert_eq!(grid.reference_rate(), 800_000.0);

        let qos = QosDescriptor::new(UtilityKind::ExpNormalized, 1.0, 0.5)
            .with_initial_rate(400_000.0);
        assert!((qos.derivative(800_000.0) - 2.0).abs() < 1e-12);
    }

    #[test]
    fn ema_moves_towards_observation_and_resets() {
        let mut grid = QosGrid::new(&table(), 2);
        grid.set(
            ModcodId::new(1),
            1,
            QosDescriptor::new(UtilityKind::Log, 1.0, 0.0).with_initial_rate(100.0),
        );
        grid.record_frame(&[0, 0, 0, 1000], 0.1, 0.5);
        assert_eq!(grid.get(ModcodId::new(1), 1).measured_rate(), 5050.0);
        assert_eq!(grid.get(ModcodId::new(0), 0).measured_rate(), 0.0);

        grid.reset();
        assert_eq!(grid.get(ModcodId::new(1), 1).measured_rate(), 100.0);
    }
}
