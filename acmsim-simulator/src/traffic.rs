//! ## acmsim-simulator::traffic
//! **Synthetic traffic sources**
//!
//! A [`TrafficSource`] produces packets for one queue, spaced by constant or
//! exponential inter-arrival times, and hands them to a [`PduSink`]. Each
//! arrival event schedules the next one. Sources restart from their first
//! arrival date with a fresh generator on every simulation reset, so a run
//! only depends on its seed.

use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Exp};
use tracing::trace;

use crate::error::SimulatorError;
use acmsim_config::{ArrivalConfig, SourceConfig};
use acmsim_core::events::Event;
use acmsim_core::pdu::Pdu;
use acmsim_core::{SimTime, Simulation, SimulationError};

/// Where generated packets go.
pub trait PduSink {
    fn deliver(
        &self,
        sim: &mut Simulation,
        modcod: usize,
        qos: usize,
        pdu: Pdu,
    ) -> Result<(), SimulationError>;
}

#[derive(Debug, Clone)]
pub enum Arrivals {
    Constant { period: SimTime },
    Poisson(Exp<f64>),
}

impl Arrivals {
    /// `rate` packets per second, evenly spaced.
    pub fn constant(rate: f64) -> Result<Self, SimulatorError> {
        if !(rate > 0.0) {
            return Err(SimulatorError::Scenario(format!(
                "arrival rate must be positive, got {rate}"
            )));
        }
        Ok(Arrivals::Constant { period: 1.0 / rate })
    }

    /// `rate` packets per second on average, exponential gaps.
    pub fn poisson(rate: f64) -> Result<Self, SimulatorError> {
        if !(rate > 0.0) {
            return Err(SimulatorError::Scenario(format!(
                "arrival rate must be positive, got {rate}"
            )));
        }
        Exp::new(rate)
            .map(Arrivals::Poisson)
            .map_err(|e| SimulatorError::Scenario(format!("arrival rate {rate}: {e}")))
    }

    fn next_gap(&self, rng: &mut SmallRng) -> SimTime {
        match self {
            Arrivals::Constant { period } => *period,
            Arrivals::Poisson(exp) => exp.sample(rng),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketSizes {
    Fixed(usize),
    Uniform { min: usize, max: usize },
}

impl PacketSizes {
    pub fn max(&self) -> usize {
        match *self {
            PacketSizes::Fixed(size) => size,
            PacketSizes::Uniform { max, .. } => max,
        }
    }

    fn sample(&self, rng: &mut SmallRng) -> usize {
        match *self {
            PacketSizes::Fixed(size) => size,
            PacketSizes::Uniform { min, max } => rng.random_range(min..=max),
        }
    }
}

/// Packet and byte counts of every source of a scenario. Also hands out
/// packet identifiers, unique within a run.
#[derive(Debug, Default)]
pub struct TrafficCounters {
    pdus: Cell<u64>,
    bytes: Cell<u64>,
}

impl TrafficCounters {
    pub fn new() -> Self {
        Self::default()
    }

    fn record(&self, size: usize) -> u64 {
        let id = self.pdus.get();
        self.pdus.set(id + 1);
        self.bytes.set(self.bytes.get() + size as u64);
        id
    }

    pub fn pdus(&self) -> u64 {
        self.pdus.get()
    }

    pub fn bytes(&self) -> u64 {
        self.bytes.get()
    }

    pub fn reset(&self) {
        self.pdus.set(0);
        self.bytes.set(0);
    }
}

pub struct TrafficSource {
    index: usize,
    modcod: usize,
    qos: usize,
    arrivals: Arrivals,
    sizes: PacketSizes,
    start: SimTime,
    stop: Option<SimTime>,
    rng: SmallRng,
    generated: u64,
    counters: Rc<TrafficCounters>,
    sink: Rc<dyn PduSink>,
    me: Weak<RefCell<TrafficSource>>,
}

impl TrafficSource {
    #[allow(clippy::too_many_arguments)]
    pub fn new_shared(
        index: usize,
        modcod: usize,
        qos: usize,
        arrivals: Arrivals,
        sizes: PacketSizes,
        window: (SimTime, Option<SimTime>),
        counters: Rc<TrafficCounters>,
        sink: Rc<dyn PduSink>,
    ) -> Rc<RefCell<Self>> {
        Rc::new_cyclic(|me| {
            RefCell::new(Self {
                index,
                modcod,
                qos,
                arrivals,
                sizes,
                start: window.0,
                stop: window.1,
                rng: SmallRng::seed_from_u64(0),
                generated: 0,
                counters,
                sink,
                me: me.clone(),
            })
        })
    }

    pub fn from_config(
        index: usize,
        config: &SourceConfig,
        counters: Rc<TrafficCounters>,
        sink: Rc<dyn PduSink>,
    ) -> Result<Rc<RefCell<Self>>, SimulatorError> {
        let arrivals = match config.arrival {
            ArrivalConfig::Constant => Arrivals::constant(config.rate)?,
            ArrivalConfig::Poisson => Arrivals::poisson(config.rate)?,
        };
        let sizes = if config.size.is_fixed() {
            PacketSizes::Fixed(config.size.min)
        } else {
            PacketSizes::Uniform {
                min: config.size.min,
                max: config.size.max,
            }
        };
        Ok(Self::new_shared(
            index,
            config.modcod,
            config.qos,
            arrivals,
            sizes,
            (config.start, config.stop),
            counters,
            sink,
        ))
    }

    pub fn target(&self) -> (usize, usize) {
        (self.modcod, self.qos)
    }

    pub fn sizes(&self) -> PacketSizes {
        self.sizes
    }

    /// Packets produced since the last start.
    pub fn generated(&self) -> u64 {
        self.generated
    }

    /// Seed of source `index` within a run seeded with `seed`.
    pub fn stream_seed(seed: u64, index: usize) -> u64 {
        seed ^ (index as u64 + 1).wrapping_mul(0x9E37_79B9_7F4A_7C15)
    }

    /// Reseeds the source and schedules its first arrival.
    pub fn start(&mut self, sim: &mut Simulation, seed: u64) {
        self.rng = SmallRng::seed_from_u64(Self::stream_seed(seed, self.index));
        self.generated = 0;
        let first = self.start.max(sim.now());
        self.schedule(sim, first);
    }

    /// Restarts the source after every reset of `sim`, seeded from `seed`.
    pub fn restart_with(this: &Rc<RefCell<Self>>, sim: &mut Simulation, seed: Rc<Cell<u64>>) {
        let me = Rc::downgrade(this);
        sim.on_reset(move |sim| {
            if let Some(source) = me.upgrade() {
                source.borrow_mut().start(sim, seed.get());
            }
        });
    }

    fn schedule(&self, sim: &mut Simulation, at: SimTime) {
        if self.stop.is_some_and(|stop| at > stop) {
            return;
        }
        let me = self.me.clone();
        sim.insert(
            Event::new(at, move |sim| match me.upgrade() {
                Some(source) => source.borrow_mut().arrive(sim),
                None => Ok(()),
            })
            .labeled("traffic arrival"),
        );
    }

    fn arrive(&mut self, sim: &mut Simulation) -> Result<(), SimulationError> {
        let now = sim.now();
        let size = self.sizes.sample(&mut self.rng);
        let pdu = Pdu::new(self.counters.record(size), size, now);
        self.generated += 1;
        trace!(source = self.index, id = pdu.id(), size, "arrival");

        let next = now + self.arrivals.next_gap(&mut self.rng);
        self.schedule(sim, next);
        self.sink.deliver(sim, self.modcod, self.qos, pdu)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Keeps everything delivered.
    #[derive(Default)]
    pub(crate) struct Collect(pub RefCell<Vec<(usize, usize, Pdu)>>);

    impl PduSink for Collect {
        fn deliver(
            &self,
            _sim: &mut Simulation,
            modcod: usize,
            qos: usize,
            pdu: Pdu,
        ) -> Result<(), SimulationError> {
            self.0.borrow_mut().push((modcod, qos, pdu));
            Ok(())
        }
    }

    fn source(
        arrivals: Arrivals,
        sizes: PacketSizes,
        window: (SimTime, Option<SimTime>),
    ) -> (Rc<RefCell<TrafficSource>>, Rc<Collect>, Rc<TrafficCounters>) {
        let sink = Rc::new(Collect::default());
        let counters = Rc::new(TrafficCounters::new());
        let source = TrafficSource::new_shared(
            0,
            1,
            2,
            arrivals,
            sizes,
            window,
            counters.clone(),
            sink.clone(),
        );
        (source, sink, counters)
    }

    #[test]
    fn constant_arrivals_are_evenly_spaced() {
        let mut sim = Simulation::new();
        let (source, sink, counters) = source(
            Arrivals::constant(4.0).unwrap(),
            PacketSizes::Fixed(100),
            (0.5, None),
        );
        source.borrow_mut().start(&mut sim, 1);
        sim.run_until(1.5).unwrap();

        let delivered = sink.0.borrow();
        let dates = delivered.iter().map(|(_, _, p)| p.created()).collect::<Vec<_>>();
        assert_eq!(dates, [0.5, 0.75, 1.0, 1.25, 1.5]);
        assert!(delivered.iter().all(|(m, q, _)| (*m, *q) == (1, 2)));
        assert_eq!(counters.pdus(), 5);
        assert_eq!(counters.bytes(), 500);
        assert_eq!(source.borrow().generated(), 5);
    }

    #[test]
    fn no_arrival_after_stop() {
        let mut sim = Simulation::new();
        let (source, sink, _) = source(
            Arrivals::constant(10.0).unwrap(),
            PacketSizes::Fixed(100),
            (0.0, Some(0.25)),
        );
        source.borrow_mut().start(&mut sim, 1);
        sim.run_until_exhausted().unwrap();
        assert!(sink.0.borrow().iter().all(|(_, _, p)| p.created() <= 0.25));
        assert_eq!(sim.pending(), 0);
    }

    #[test]
    fn poisson_rate_is_respected() {
        let mut sim = Simulation::new();
        let (source, _, counters) = source(
            Arrivals::poisson(1000.0).unwrap(),
            PacketSizes::Uniform { min: 64, max: 1500 },
            (0.0, None),
        );
        source.borrow_mut().start(&mut sim, 3);
        sim.run_until(10.0).unwrap();

        let pdus = counters.pdus() as f64;
        assert!((pdus - 10_000.0).abs() < 500.0, "{pdus} arrivals");
        let mean_size = counters.bytes() as f64 / pdus;
        assert!((mean_size - 782.0).abs() < 30.0, "mean size {mean_size}");
    }

    #[test]
    fn uniform_sizes_stay_in_range() {
        let mut sim = Simulation::new();
        let (source, sink, _) = source(
            Arrivals::constant(100.0).unwrap(),
            PacketSizes::Uniform { min: 10, max: 20 },
            (0.0, None),
        );
        source.borrow_mut().start(&mut sim, 9);
        sim.run_until(1.0).unwrap();
        assert!(sink
            .0
            .borrow()
            .iter()
            .all(|(_, _, p)| (10..=20).contains(&p.size())));
    }

    #[test]
    fn same_seed_same_traffic() {
        let draw = |seed| {
            let mut sim = Simulation::new();
            let (source, sink, _) = source(
                Arrivals::poisson(200.0).unwrap(),
                PacketSizes::Uniform { min: 1, max: 1000 },
                (0.0, None),
            );
            source.borrow_mut().start(&mut sim, seed);
            sim.run_until(1.0).unwrap();
            let delivered = sink
                .0
                .borrow()
                .iter()
                .map(|(_, _, p)| (p.created(), p.size()))
                .collect::<Vec<_>>();
            delivered
        };
        assert_eq!(draw(5), draw(5));
        assert_ne!(draw(5), draw(6));
    }

    #[test]
    fn rejects_non_positive_rate() {
        assert!(Arrivals::constant(0.0).is_err());
        assert!(Arrivals::poisson(-1.0).is_err());
    }
}
