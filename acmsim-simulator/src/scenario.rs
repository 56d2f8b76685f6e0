//! ## acmsim-simulator::scenario
//! **Wiring a configuration into a runnable model**
//!
//! ACM algorithms get a DVB-S2 link fed by an [`AcmScheduler`]; Round Robin
//! and DRR get a simplex link pulling from the scheduler. Every component
//! registers a reset hook, in this order: traffic counters, link, scheduler,
//! probes, then the sources, which schedule their first arrival.

use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

use tracing::debug;

use crate::error::SimulatorError;
use crate::report::RunReport;
use crate::traffic::{PduSink, TrafficCounters, TrafficSource};
use acmsim_config::{
    AcmSimConfig, Algorithm, FrameSizeConfig, LinkConfig, SchedulerConfig, UtilityKindConfig,
    WeightModeConfig,
};
use acmsim_core::pdu::{Pdu, PduSource};
use acmsim_core::probe::{Probe, ProbeHandle};
use acmsim_core::queue::PduQueue;
use acmsim_core::{SimTime, Simulation, SimulationError};
use acmsim_link::{dvb_s2_modcod, AcmLink, DvbS2Link, FrameSize, Modcod, ModcodId, ModcodTable};
use acmsim_link::SimplexLink;
use acmsim_sched::{
    AcmConfig, AcmProbes, AcmScheduler, Batch, BatchConfig, DeficitRoundRobin, Knapsack,
    KnapsackMode, QosDescriptor, RoundRobin, ScheduleStrategy, UtilityGreedy, UtilityKind,
    WeightMode,
};
use acmsim_telemetry::{HistogramProbe, MetricsRecorder, SummaryProbe};

/// Epoch counters of a strategy, zero for strategies without epochs.
pub trait EpochCounters {
    fn epochs(&self) -> (u64, u64) {
        (0, 0)
    }
}

impl EpochCounters for UtilityGreedy {}

impl EpochCounters for Knapsack {}

impl EpochCounters for Batch {
    fn epochs(&self) -> (u64, u64) {
        (self.nb_epoch(), self.nb_epoch_starvation())
    }
}

/// A packet scheduler in front of a simplex link.
pub trait SourceScheduler: PduSource {
    /// Queues `pdu` on source `source`. Returns `false` if it was dropped.
    fn enqueue(&mut self, source: usize, pdu: Pdu) -> bool;

    fn queued(&self) -> usize;

    fn served(&self) -> Vec<u64>;

    fn clear(&mut self);
}

impl SourceScheduler for RoundRobin {
    fn enqueue(&mut self, source: usize, pdu: Pdu) -> bool {
        self.process_pdu(source, pdu)
    }

    fn queued(&self) -> usize {
        (0..self.nb_sources()).map(|i| self.source(i).length()).sum()
    }

    fn served(&self) -> Vec<u64> {
        RoundRobin::served(self).to_vec()
    }

    fn clear(&mut self) {
        self.reset();
    }
}

impl SourceScheduler for DeficitRoundRobin {
    fn enqueue(&mut self, source: usize, pdu: Pdu) -> bool {
        self.process_pdu(source, pdu)
    }

    fn queued(&self) -> usize {
        (0..self.nb_sources()).map(|i| self.source(i).length()).sum()
    }

    fn served(&self) -> Vec<u64> {
        self.served_bytes()
    }

    fn clear(&mut self) {
        self.reset();
    }
}

/// What the scenario reads back from its link model after a run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ModelTotals {
    pub pdus_sent: u64,
    pub bytes_sent: u64,
    pub frames_sent: u64,
    pub frames_per_modcod: Vec<u64>,
    pub queued_pdus: usize,
    pub utilisation: f64,
    pub epochs: u64,
    pub starved_epochs: u64,
    pub served: Vec<u64>,
}

/// A link and the scheduler feeding it.
pub trait LinkModel {
    fn algorithm(&self) -> &'static str;

    /// Seed of the scheduler's own generator from the next reset on.
    fn reseed(&self, seed: u64);

    fn totals(&self, now: SimTime) -> ModelTotals;
}

struct AcmModel<S> {
    scheduler: Rc<RefCell<AcmScheduler<S>>>,
    link: Rc<RefCell<DvbS2Link>>,
}

impl<S: ScheduleStrategy + 'static> PduSink for AcmModel<S> {
    fn deliver(
        &self,
        sim: &mut Simulation,
        modcod: usize,
        qos: usize,
        pdu: Pdu,
    ) -> Result<(), SimulationError> {
        self.scheduler
            .borrow_mut()
            .process_pdu(sim, ModcodId::new(modcod), qos, pdu)
            .map_err(SimulationError::from)
    }
}

impl<S: ScheduleStrategy + EpochCounters + 'static> LinkModel for AcmModel<S> {
    fn algorithm(&self) -> &'static str {
        self.scheduler.borrow().strategy().name()
    }

    fn reseed(&self, seed: u64) {
        self.scheduler.borrow_mut().set_seed(seed);
    }

    fn totals(&self, now: SimTime) -> ModelTotals {
        let scheduler = self.scheduler.borrow();
        let link = self.link.borrow();
        let (epochs, starved_epochs) = scheduler.strategy().epochs();
        ModelTotals {
            pdus_sent: scheduler.stats().pdus,
            bytes_sent: link.stats().bytes,
            frames_sent: link.stats().frames,
            frames_per_modcod: link.stats().frames_per_modcod.clone(),
            queued_pdus: scheduler.core().queues().total_length(),
            utilisation: link.utilisation(now),
            epochs,
            starved_epochs,
            served: Vec::new(),
        }
    }
}

struct SimplexModel<P> {
    name: &'static str,
    scheduler: Rc<RefCell<P>>,
    link: Rc<RefCell<SimplexLink>>,
}

impl<P: SourceScheduler> PduSink for SimplexModel<P> {
    fn deliver(
        &self,
        sim: &mut Simulation,
        _modcod: usize,
        qos: usize,
        pdu: Pdu,
    ) -> Result<(), SimulationError> {
        let accepted = self.scheduler.borrow_mut().enqueue(qos, pdu);
        if accepted {
            self.link.borrow_mut().notify_pdu_available(sim);
        }
        Ok(())
    }
}

impl<P: SourceScheduler> LinkModel for SimplexModel<P> {
    fn algorithm(&self) -> &'static str {
        self.name
    }

    fn reseed(&self, _seed: u64) {}

    fn totals(&self, now: SimTime) -> ModelTotals {
        let link = self.link.borrow();
        let scheduler = self.scheduler.borrow();
        ModelTotals {
            pdus_sent: link.sent(),
            bytes_sent: link.bytes(),
            frames_sent: link.sent(),
            frames_per_modcod: Vec::new(),
            queued_pdus: scheduler.queued(),
            utilisation: link.utilisation(now),
            epochs: 0,
            starved_epochs: 0,
            served: scheduler.served(),
        }
    }
}

/// Builds the MODCOD table of `link`, resolving DVB-S2 names.
pub fn modcod_table(link: &LinkConfig) -> Result<ModcodTable, SimulatorError> {
    let frame = match link.frame_size {
        FrameSizeConfig::Normal => FrameSize::Normal,
        FrameSizeConfig::Short => FrameSize::Short,
    };
    let modcods = link
        .modcods
        .iter()
        .map(|m| match m.explicit() {
            Some((bits, time)) => Ok(Modcod::new(m.name.as_str(), bits, time)),
            None => dvb_s2_modcod(&m.name, link.symbol_rate, frame, link.pilots),
        })
        .collect::<Result<Vec<_>, _>>()?;
    Ok(ModcodTable::new(modcods)?)
}

fn utility_kind(kind: UtilityKindConfig) -> UtilityKind {
    match kind {
        UtilityKindConfig::Log => UtilityKind::Log,
        UtilityKindConfig::Linear => UtilityKind::Linear,
        UtilityKindConfig::Exp => UtilityKind::Exp,
        UtilityKindConfig::ExpNormalized => UtilityKind::ExpNormalized,
    }
}

fn weight_mode(mode: WeightModeConfig) -> WeightMode {
    match mode {
        WeightModeConfig::Utility => WeightMode::Utility,
        WeightModeConfig::Length => WeightMode::Length,
        WeightModeConfig::UtilityThenLength => WeightMode::UtilityThenLength,
        WeightModeConfig::LengthThenDuration => WeightMode::LengthThenDuration,
    }
}

/// A configured model, its traffic and the simulation driving them.
pub struct Scenario {
    config: AcmSimConfig,
    sim: Simulation,
    model: Rc<dyn LinkModel>,
    sources: Vec<Rc<RefCell<TrafficSource>>>,
    counters: Rc<TrafficCounters>,
    seed: Rc<Cell<u64>>,
    fill: Option<Rc<SummaryProbe>>,
}

impl Scenario {
    /// Builds the model described by `config`. With `metrics`, frame fill
    /// ratios are also observed into its histogram.
    pub fn build(
        config: &AcmSimConfig,
        metrics: Option<&MetricsRecorder>,
    ) -> Result<Self, SimulatorError> {
        config.check()?;
        let mut sim = if config.simulation.trace {
            Simulation::with_trace()
        } else {
            Simulation::new()
        };
        let counters = Rc::new(TrafficCounters::new());
        let seed = Rc::new(Cell::new(config.simulation.seed));
        {
            let counters = Rc::downgrade(&counters);
            sim.on_reset(move |_| {
                if let Some(counters) = counters.upgrade() {
                    counters.reset();
                }
            });
        }

        let scheduler = &config.scheduler;
        let (model, sink, fill): (Rc<dyn LinkModel>, Rc<dyn PduSink>, _) =
            if scheduler.algorithm.is_acm() {
                let table = modcod_table(&config.link)?;
                check_sizes(config, &table)?;
                let fill = Rc::new(SummaryProbe::new());
                let histogram = metrics
                    .map(|m| Rc::new(HistogramProbe(m.frame_fill.clone())) as ProbeHandle);
                let parts = AcmParts {
                    table,
                    fill: fill.clone(),
                    histogram,
                };
                let (model, sink) = match scheduler.algorithm {
                    Algorithm::Knapsack => acm_model(
                        &mut sim,
                        config,
                        parts,
                        Knapsack::new(KnapsackMode::Exhaustive, scheduler.knapsack.max_states)?,
                    )?,
                    Algorithm::KnapsackBounded => acm_model(
                        &mut sim,
                        config,
                        parts,
                        Knapsack::new(KnapsackMode::Bounded, scheduler.knapsack.max_states)?,
                    )?,
                    Algorithm::Batch => acm_model(
                        &mut sim,
                        config,
                        parts,
                        Batch::new(batch_config(scheduler))?,
                    )?,
                    _ => acm_model(&mut sim, config, parts, UtilityGreedy::new())?,
                };
                (model, sink, Some(fill))
            } else {
                let (model, sink) = if scheduler.algorithm == Algorithm::Drr {
                    let mut drr = DeficitRoundRobin::new();
                    for source in 0..scheduler.nb_qos {
                        drr.add_source(scheduler.drr.quantum_of(source))?;
                    }
                    simplex_model(&mut sim, config, "drr", drr)?
                } else {
                    let rr = RoundRobin::new(scheduler.nb_qos);
                    simplex_model(&mut sim, config, "round_robin", rr)?
                };
                (model, sink, None)
            };

        let sources = config
            .traffic
            .sources
            .iter()
            .enumerate()
            .map(|(index, source)| {
                let source =
                    TrafficSource::from_config(index, source, counters.clone(), sink.clone())?;
                TrafficSource::restart_with(&source, &mut sim, seed.clone());
                Ok(source)
            })
            .collect::<Result<Vec<_>, SimulatorError>>()?;

        debug!(
            algorithm = model.algorithm(),
            sources = sources.len(),
            "scenario built"
        );
        Ok(Self {
            config: config.clone(),
            sim,
            model,
            sources,
            counters,
            seed,
            fill,
        })
    }

    pub fn config(&self) -> &AcmSimConfig {
        &self.config
    }

    pub fn algorithm(&self) -> &'static str {
        self.model.algorithm()
    }

    pub fn simulation(&self) -> &Simulation {
        &self.sim
    }

    pub fn sources(&self) -> &[Rc<RefCell<TrafficSource>>] {
        &self.sources
    }

    /// Resets everything, seeds the run with `seed` and simulates
    /// `duration` seconds.
    pub fn run(&mut self, seed: u64, duration: SimTime) -> Result<(), SimulatorError> {
        self.seed.set(seed);
        self.model.reseed(seed);
        self.sim.reset();
        self.sim.run_until(duration)?;
        Ok(())
    }

    /// Report of the last run.
    pub fn report(&self, run: u32, seed: u64) -> RunReport {
        let now = self.sim.now();
        let totals = self.model.totals(now);
        let rate = |bytes: u64| {
            if now > 0.0 {
                bytes as f64 * 8.0 / now
            } else {
                0.0
            }
        };
        RunReport {
            run,
            seed,
            duration: now,
            events_fired: self.sim.status().fired,
            trace_hash: self.sim.trace_hash(),
            pdus_generated: self.counters.pdus(),
            bytes_generated: self.counters.bytes(),
            pdus_sent: totals.pdus_sent,
            bytes_sent: totals.bytes_sent,
            frames_sent: totals.frames_sent,
            frames_per_modcod: totals.frames_per_modcod,
            queued_pdus: totals.queued_pdus,
            offered_load_bps: rate(self.counters.bytes()),
            throughput_bps: rate(totals.bytes_sent),
            utilisation: totals.utilisation,
            fill: self.fill.as_ref().map(|f| f.summary()),
            epochs: totals.epochs,
            starved_epochs: totals.starved_epochs,
            served: totals.served,
        }
    }
}

/// A packet larger than its MODCOD's frame would never be sent.
fn check_sizes(config: &AcmSimConfig, table: &ModcodTable) -> Result<(), SimulatorError> {
    for (index, source) in config.traffic.sources.iter().enumerate() {
        let Some(modcod) = table.get(ModcodId::new(source.modcod)) else {
            return Err(SimulatorError::Scenario(format!(
                "source {index} feeds MODCOD {} but the link has {}",
                source.modcod,
                table.len()
            )));
        };
        let capacity = modcod.payload_bytes();
        if source.size.max > capacity {
            return Err(SimulatorError::Scenario(format!(
                "source {index} sends packets up to {} bytes but MODCOD {} carries {capacity}",
                source.size.max, source.modcod
            )));
        }
    }
    Ok(())
}

fn batch_config(scheduler: &SchedulerConfig) -> BatchConfig {
    BatchConfig {
        epoch_min_duration: scheduler.batch.epoch_min_duration,
        weight_mode: weight_mode(scheduler.batch.weight_mode),
        max_sequence_len: scheduler.batch.max_sequence_len,
        work_conserving: scheduler.batch.work_conserving,
    }
}

struct AcmParts {
    table: ModcodTable,
    fill: Rc<SummaryProbe>,
    histogram: Option<ProbeHandle>,
}

fn acm_model<S>(
    sim: &mut Simulation,
    config: &AcmSimConfig,
    parts: AcmParts,
    strategy: S,
) -> Result<(Rc<dyn LinkModel>, Rc<dyn PduSink>), SimulatorError>
where
    S: ScheduleStrategy + EpochCounters + 'static,
{
    let mut link = DvbS2Link::new(parts.table);
    if config.link.record_frames {
        link = link.recording();
    }
    let fill: ProbeHandle = parts.fill.clone();
    link.set_fill_probe(Some(fill));
    let link = Rc::new(RefCell::new(link));
    {
        let link = Rc::downgrade(&link);
        sim.on_reset(move |_| {
            if let Some(link) = link.upgrade() {
                link.borrow_mut().reset();
            }
        });
    }

    let scheduler = &config.scheduler;
    let acm = AcmConfig {
        nb_qos: scheduler.nb_qos,
        downgrade: scheduler.downgrade,
        rate_ema_alpha: scheduler.rate_ema_alpha,
        seed: config.simulation.seed,
    };
    let dyn_link: Rc<RefCell<dyn AcmLink>> = link.clone();
    let acm_scheduler = AcmScheduler::new_shared(dyn_link, acm, strategy)?;
    {
        let mut acm_scheduler = acm_scheduler.borrow_mut();
        let nb_modcod = config.link.modcods.len();
        for qos in &scheduler.qos {
            let descriptor = QosDescriptor::new(utility_kind(qos.kind), qos.beta, qos.rmin)
                .with_initial_rate(qos.initial_rate);
            let modcods = match qos.modcod {
                Some(m) => m..m + 1,
                None => 0..nb_modcod,
            };
            for m in modcods {
                acm_scheduler.set_qos(ModcodId::new(m), qos.qos, descriptor.clone());
            }
        }
        acm_scheduler.set_probes(AcmProbes {
            fill: parts.histogram,
            ..AcmProbes::default()
        });
    }
    AcmScheduler::reset_with(&acm_scheduler, sim);
    reset_probe(sim, &parts.fill);

    let model = Rc::new(AcmModel {
        scheduler: acm_scheduler,
        link,
    });
    let sink: Rc<dyn PduSink> = model.clone();
    let model: Rc<dyn LinkModel> = model;
    Ok((model, sink))
}

fn simplex_model<P>(
    sim: &mut Simulation,
    config: &AcmSimConfig,
    name: &'static str,
    scheduler: P,
) -> Result<(Rc<dyn LinkModel>, Rc<dyn PduSink>), SimulatorError>
where
    P: SourceScheduler + 'static,
{
    let scheduler = Rc::new(RefCell::new(scheduler));
    let source: Rc<RefCell<dyn PduSource>> = scheduler.clone();
    let link = SimplexLink::new_shared(config.link.simplex_bit_rate, source)?;
    {
        let link: Weak<RefCell<SimplexLink>> = Rc::downgrade(&link);
        let scheduler = Rc::downgrade(&scheduler);
        sim.on_reset(move |_| {
            if let Some(link) = link.upgrade() {
                link.borrow_mut().reset();
            }
            if let Some(scheduler) = scheduler.upgrade() {
                scheduler.borrow_mut().clear();
            }
        });
    }

    let model = Rc::new(SimplexModel {
        name,
        scheduler,
        link,
    });
    let sink: Rc<dyn PduSink> = model.clone();
    let model: Rc<dyn LinkModel> = model;
    Ok((model, sink))
}

fn reset_probe(sim: &mut Simulation, probe: &Rc<SummaryProbe>) {
    let probe = Rc::downgrade(probe);
    sim.on_reset(move |_| {
        if let Some(probe) = probe.upgrade() {
            probe.reset();
        }
    });
}
