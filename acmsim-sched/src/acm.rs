//! ## acmsim-sched::acm
//! **Generic ACM scheduling framework**
//!
//! [`AcmScheduler`] owns one queue per (MODCOD, QoS) pair and feeds an
//! [`AcmLink`]. Each time the link is free it asks its [`ScheduleStrategy`]
//! for a [`FillPlan`], commits it (extracts the planned packets, updates the
//! QoS rate estimates) and sends the resulting frame. The end of every
//! transmission schedules the next frame request.
//!
//! State machine:
//! ```text
//!   Idle --pdu--> Building --frame sent / nothing to send--> Pending | Idle
//!   Pending --link free--> Building
//! ```

use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};

use rand::rngs::SmallRng;
use rand::SeedableRng;
use tracing::{debug, trace};

use crate::error::ScheduleError;
use crate::grid::QueueGrid;
use crate::plan::FillPlan;
use crate::qos::{QosDescriptor, QosGrid};
use acmsim_core::events::Event;
use acmsim_core::pdu::Pdu;
use acmsim_core::probe::{Probe, ProbeHandle};
use acmsim_core::queue::PduQueue;
use acmsim_core::{SimTime, Simulation, SimulationError};
use acmsim_link::{AcmLink, BbFrame, ModcodId, ModcodTable};

/// Framework settings shared by every strategy.
#[derive(Debug, Clone, PartialEq)]
pub struct AcmConfig {
    /// QoS classes per MODCOD.
    pub nb_qos: usize,
    /// Lets a frame carry packets of faster MODCODs.
    pub downgrade: bool,
    /// Weight of the previous estimate in the rate EMA.
    pub rate_ema_alpha: f64,
    /// Seed of the tie-breaking generator, reapplied on reset.
    pub seed: u64,
}

impl Default for AcmConfig {
    fn default() -> Self {
        Self {
            nb_qos: 1,
            downgrade: false,
            rate_ema_alpha: 0.9,
            seed: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcmState {
    Idle,
    Pending,
    Building,
}

impl fmt::Display for AcmState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AcmState::Idle => "idle",
            AcmState::Pending => "pending",
            AcmState::Building => "building",
        };
        f.write_str(name)
    }
}

/// Counters since the last reset.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AcmStats {
    pub frames: u64,
    pub pdus: u64,
    pub bytes: u64,
    pub interest: f64,
    pub frames_per_modcod: Vec<u64>,
    /// Link opportunities that produced no frame.
    pub empty_decisions: u64,
    pub wake_ups: u64,
}

/// Optional probes sampled on every committed frame.
#[derive(Default, Clone)]
pub struct AcmProbes {
    pub volume: Option<ProbeHandle>,
    pub fill: Option<ProbeHandle>,
    pub interest: Option<ProbeHandle>,
    pub packets: Option<ProbeHandle>,
}

/// What a strategy sees while computing a plan.
pub struct ScheduleContext<'a> {
    pub now: SimTime,
    pub modcods: &'a ModcodTable,
    pub queues: &'a QueueGrid,
    pub qos: &'a QosGrid,
    pub rng: &'a mut SmallRng,
    pub downgrade: bool,
}

impl ScheduleContext<'_> {
    pub fn nb_modcod(&self) -> usize {
        self.modcods.len()
    }

    pub fn nb_qos(&self) -> usize {
        self.queues.nb_qos()
    }

    /// Payload bytes of a frame of `modcod`.
    pub fn capacity(&self, modcod: ModcodId) -> usize {
        (self.modcods.payload_bits(modcod) / 8) as usize
    }

    /// Queues a frame of `frame` may carry: its own, plus those of every
    /// faster MODCOD when downgrading is on.
    pub fn eligible(&self, frame: ModcodId) -> Vec<(ModcodId, usize)> {
        let nb_qos = self.nb_qos();
        self.modcods
            .ids()
            .filter(|m| *m == frame || (self.downgrade && *m > frame))
            .flat_map(|m| (0..nb_qos).map(move |q| (m, q)))
            .collect()
    }

    /// Interest of sending `size` bytes of queue `(modcod, qos)`.
    pub fn gain(&self, modcod: ModcodId, qos: usize, size: usize) -> f64 {
        size as f64 * 8.0 * self.qos.derivative(modcod, qos)
    }

    pub fn plan(&self, modcod: ModcodId) -> FillPlan {
        FillPlan::for_modcod(modcod, self.nb_modcod(), self.nb_qos())
    }
}

/// Queues, QoS state and statistics of an ACM scheduler. Strategies receive
/// it in their hooks.
pub struct AcmCore {
    modcods: ModcodTable,
    queues: QueueGrid,
    qos: QosGrid,
    rng: SmallRng,
    config: AcmConfig,
    pending: bool,
    best: Option<FillPlan>,
    stats: AcmStats,
    probes: AcmProbes,
}

impl AcmCore {
    pub fn new(modcods: ModcodTable, config: AcmConfig) -> Result<Self, ScheduleError> {
        if config.nb_qos == 0 {
            return Err(ScheduleError::InvalidConfiguration(
                "at least one QoS class is required".into(),
            ));
        }
        if !(0.0..=1.0).contains(&config.rate_ema_alpha) {
            return Err(ScheduleError::InvalidConfiguration(format!(
                "rate EMA coefficient {} outside [0, 1]",
                config.rate_ema_alpha
            )));
        }
        let queues = QueueGrid::new(modcods.len(), config.nb_qos);
        let qos = QosGrid::new(&modcods, config.nb_qos);
        let stats = AcmStats {
            frames_per_modcod: vec![0; modcods.len()],
            ..AcmStats::default()
        };
        Ok(Self {
            rng: SmallRng::seed_from_u64(config.seed),
            modcods,
            queues,
            qos,
            config,
            pending: false,
            best: None,
            stats,
            probes: AcmProbes::default(),
        })
    }

    pub fn modcods(&self) -> &ModcodTable {
        &self.modcods
    }

    pub fn queues(&self) -> &QueueGrid {
        &self.queues
    }

    pub fn queues_mut(&mut self) -> &mut QueueGrid {
        &mut self.queues
    }

    pub fn qos(&self) -> &QosGrid {
        &self.qos
    }

    pub fn qos_mut(&mut self) -> &mut QosGrid {
        &mut self.qos
    }

    pub fn config(&self) -> &AcmConfig {
        &self.config
    }

    /// Whether some queued packet is not yet promised to a frame.
    pub fn pending(&self) -> bool {
        self.pending
    }

    /// Last committed plan.
    pub fn best(&self) -> Option<&FillPlan> {
        self.best.as_ref()
    }

    pub fn stats(&self) -> &AcmStats {
        &self.stats
    }

    /// Appends `pdu` to queue `(modcod, qos)`. Returns `false` if it was
    /// dropped.
    pub fn enqueue(&mut self, modcod: ModcodId, qos: usize, pdu: Pdu) -> bool {
        self.queues.queue_mut(modcod, qos).push(pdu)
    }

    pub fn context(&mut self, now: SimTime) -> ScheduleContext<'_> {
        ScheduleContext {
            now,
            modcods: &self.modcods,
            queues: &self.queues,
            qos: &self.qos,
            rng: &mut self.rng,
            downgrade: self.config.downgrade,
        }
    }

    /// Turns `plan` into a frame: extracts the planned packets and folds the
    /// frame into every queue's rate estimate.
    ///
    /// # Panics
    ///
    /// Panics if the plan books more packets than a queue holds, which means
    /// two plans booked the same packets.
    pub fn commit(&mut self, plan: &FillPlan, now: SimTime) -> Result<BbFrame, ScheduleError> {
        let modcod = plan.modcod().ok_or(ScheduleError::UnsetModcod)?;
        let payload_bits = self.modcods.payload_bits(modcod);
        if plan.volume() as u64 * 8 > payload_bits {
            return Err(ScheduleError::Overflow {
                modcod,
                volume: plan.volume(),
                capacity: (payload_bits / 8) as usize,
            });
        }

        let mut frame = BbFrame::new(modcod, now);
        let mut bits_sent = vec![0u64; self.modcods.len() * self.config.nb_qos];
        for (m, q, count) in plan.counts() {
            let slot = self.queues.slot(m, q);
            let queue = self.queues.queue_mut(m, q);
            assert!(
                queue.length() >= count,
                "plan books {count} packets of queue ({m}, {q}) which holds {}",
                queue.length()
            );
            for pdu in std::iter::from_fn(|| queue.extract_front()).take(count) {
                bits_sent[slot] += pdu.size() as u64 * 8;
                frame.push(pdu);
            }
        }
        debug_assert_eq!(frame.volume(), plan.volume());

        let duration = self.modcods.transmission_time(modcod);
        self.qos
            .record_frame(&bits_sent, duration, self.config.rate_ema_alpha);

        self.stats.frames += 1;
        self.stats.pdus += frame.pdus().len() as u64;
        self.stats.bytes += frame.volume() as u64;
        self.stats.interest += plan.interest();
        self.stats.frames_per_modcod[modcod.index()] += 1;
        self.probes.volume.sample(frame.volume() as f64);
        self.probes
            .fill
            .sample(frame.volume() as f64 * 8.0 / payload_bits as f64);
        self.probes.interest.sample(plan.interest());
        self.probes.packets.sample(frame.pdus().len() as f64);

        debug!(
            modcod = %modcod,
            volume = frame.volume(),
            interest = plan.interest(),
            pdus = frame.pdus().len(),
            "frame committed"
        );
        self.best = Some(plan.clone());
        Ok(frame)
    }

    fn reset(&mut self) {
        self.queues.reset();
        self.qos.reset();
        self.rng = SmallRng::seed_from_u64(self.config.seed);
        self.pending = false;
        self.best = None;
        self.stats = AcmStats {
            frames_per_modcod: vec![0; self.modcods.len()],
            ..AcmStats::default()
        };
    }
}

/// A frame filling policy plugged into [`AcmScheduler`].
///
/// Only [`name`](Self::name) and [`schedule`](Self::schedule) are required.
/// The `process_pdu`, `build_frame` and `get_frame` hooks default to the
/// generic framework behavior and may be overridden.
pub trait ScheduleStrategy {
    fn name(&self) -> &'static str;

    /// Computes the plan of the next frame, `None` if nothing should be sent.
    fn schedule(
        &mut self,
        ctx: &mut ScheduleContext<'_>,
    ) -> Result<Option<FillPlan>, ScheduleError>;

    /// Packets of `(modcod, qos)` already promised to future frames.
    fn reserved(&self, _modcod: ModcodId, _qos: usize) -> usize {
        0
    }

    /// Whether frames computed earlier are still waiting to be sent.
    fn has_planned_frames(&self) -> bool {
        false
    }

    /// Date at which the strategy wants to be asked again after declining
    /// to produce a frame.
    fn wake_up_at(&self) -> Option<SimTime> {
        None
    }

    fn on_reset(&mut self) {}

    /// Stores an arriving packet. Returns `false` if it was dropped.
    fn process_pdu(&mut self, core: &mut AcmCore, modcod: ModcodId, qos: usize, pdu: Pdu) -> bool {
        core.enqueue(modcod, qos, pdu)
    }

    /// Plans and commits one frame.
    fn build_frame(
        &mut self,
        core: &mut AcmCore,
        now: SimTime,
    ) -> Result<Option<BbFrame>, ScheduleError> {
        let plan = self.schedule(&mut core.context(now))?;
        match plan {
            Some(plan) if !plan.is_empty() => core.commit(&plan, now).map(Some),
            _ => Ok(None),
        }
    }

    /// Called on every transmit opportunity.
    fn get_frame(
        &mut self,
        core: &mut AcmCore,
        now: SimTime,
    ) -> Result<Option<BbFrame>, ScheduleError> {
        if !core.pending() && !self.has_planned_frames() {
            return Ok(None);
        }
        self.build_frame(core, now)
    }
}

impl<S: ScheduleStrategy + ?Sized> ScheduleStrategy for Box<S> {
    fn name(&self) -> &'static str {
        (**self).name()
    }

    fn schedule(
        &mut self,
        ctx: &mut ScheduleContext<'_>,
    ) -> Result<Option<FillPlan>, ScheduleError> {
        (**self).schedule(ctx)
    }

    fn reserved(&self, modcod: ModcodId, qos: usize) -> usize {
        (**self).reserved(modcod, qos)
    }

    fn has_planned_frames(&self) -> bool {
        (**self).has_planned_frames()
    }

    fn wake_up_at(&self) -> Option<SimTime> {
        (**self).wake_up_at()
    }

    fn on_reset(&mut self) {
        (**self).on_reset()
    }

    fn process_pdu(&mut self, core: &mut AcmCore, modcod: ModcodId, qos: usize, pdu: Pdu) -> bool {
        (**self).process_pdu(core, modcod, qos, pdu)
    }

    fn build_frame(
        &mut self,
        core: &mut AcmCore,
        now: SimTime,
    ) -> Result<Option<BbFrame>, ScheduleError> {
        (**self).build_frame(core, now)
    }

    fn get_frame(
        &mut self,
        core: &mut AcmCore,
        now: SimTime,
    ) -> Result<Option<BbFrame>, ScheduleError> {
        (**self).get_frame(core, now)
    }
}

/// Drives an [`AcmLink`] with frames planned by `S`.
pub struct AcmScheduler<S> {
    core: AcmCore,
    strategy: S,
    link: Rc<RefCell<dyn AcmLink>>,
    state: AcmState,
    wake_up: Option<SimTime>,
    me: Weak<RefCell<Self>>,
}

impl<S: ScheduleStrategy + 'static> AcmScheduler<S> {
    pub fn new_shared(
        link: Rc<RefCell<dyn AcmLink>>,
        config: AcmConfig,
        strategy: S,
    ) -> Result<Rc<RefCell<Self>>, ScheduleError> {
        let modcods = link.borrow().modcods().clone();
        let core = AcmCore::new(modcods, config)?;
        Ok(Rc::new_cyclic(|me| {
            RefCell::new(Self {
                core,
                strategy,
                link,
                state: AcmState::Idle,
                wake_up: None,
                me: me.clone(),
            })
        }))
    }

    /// Resets the scheduler whenever `sim` is reset.
    pub fn reset_with(this: &Rc<RefCell<Self>>, sim: &mut Simulation) {
        let me = Rc::downgrade(this);
        sim.on_reset(move |_| {
            if let Some(scheduler) = me.upgrade() {
                scheduler.borrow_mut().reset();
            }
        });
    }

    pub fn core(&self) -> &AcmCore {
        &self.core
    }

    pub fn strategy(&self) -> &S {
        &self.strategy
    }

    pub fn strategy_mut(&mut self) -> &mut S {
        &mut self.strategy
    }

    pub fn state(&self) -> AcmState {
        self.state
    }

    pub fn stats(&self) -> &AcmStats {
        self.core.stats()
    }

    pub fn set_qos(&mut self, modcod: ModcodId, qos: usize, descriptor: QosDescriptor) {
        self.core.qos.set(modcod, qos, descriptor);
    }

    pub fn set_probes(&mut self, probes: AcmProbes) {
        self.core.probes = probes;
    }

    /// Seed of the tie-breaking generator from the next reset on.
    pub fn set_seed(&mut self, seed: u64) {
        self.core.config.seed = seed;
    }

    /// Queues `pdu` for `(modcod, qos)` and sends a frame if the link is
    /// free.
    pub fn process_pdu(
        &mut self,
        sim: &mut Simulation,
        modcod: ModcodId,
        qos: usize,
        pdu: Pdu,
    ) -> Result<(), ScheduleError> {
        trace!(id = pdu.id(), size = pdu.size(), modcod = %modcod, qos, "pdu queued");
        if self.strategy.process_pdu(&mut self.core, modcod, qos, pdu) {
            self.notify_pdu_available(sim)?;
        }
        Ok(())
    }

    pub fn notify_pdu_available(&mut self, sim: &mut Simulation) -> Result<(), ScheduleError> {
        self.core.pending = true;
        self.try_send(sim)
    }

    /// Transmit opportunity signalled by the link.
    pub fn link_requests_frame(&mut self, sim: &mut Simulation) -> Result<(), ScheduleError> {
        self.try_send(sim)
    }

    fn wake_up(&mut self, sim: &mut Simulation) -> Result<(), ScheduleError> {
        self.wake_up = None;
        self.core.stats.wake_ups += 1;
        self.try_send(sim)
    }

    fn try_send(&mut self, sim: &mut Simulation) -> Result<(), ScheduleError> {
        let now = sim.now();
        if !self.link.borrow().available(now) {
            if self.core.pending {
                self.state = AcmState::Pending;
            }
            return Ok(());
        }

        self.state = AcmState::Building;
        let frame = self.strategy.get_frame(&mut self.core, now)?;
        self.core.pending = self.has_unreserved();

        match frame {
            Some(frame) => {
                let end = self.link.borrow_mut().send(sim, frame);
                self.request_at(sim, end, false);
            }
            None => {
                self.core.stats.empty_decisions += 1;
                if let Some(at) = self.strategy.wake_up_at() {
                    if at > now && self.core.pending && self.wake_up.is_none() {
                        debug!(strategy = self.strategy.name(), at, "wake-up requested");
                        self.wake_up = Some(at);
                        self.request_at(sim, at, true);
                    }
                }
            }
        }

        self.state = if self.core.pending || self.strategy.has_planned_frames() {
            AcmState::Pending
        } else {
            AcmState::Idle
        };
        Ok(())
    }

    fn has_unreserved(&self) -> bool {
        self.core
            .queues
            .iter()
            .any(|(m, q, queue)| queue.length() > self.strategy.reserved(m, q))
    }

    fn request_at(&self, sim: &mut Simulation, at: SimTime, wake_up: bool) {
        let me = self.me.clone();
        let label = if wake_up {
            "acm wake-up"
        } else {
            "acm frame request"
        };
        sim.insert(
            Event::new(at, move |sim| {
                let Some(scheduler) = me.upgrade() else {
                    return Ok(());
                };
                let mut scheduler = scheduler.borrow_mut();
                let result = if wake_up {
                    scheduler.wake_up(sim)
                } else {
                    scheduler.link_requests_frame(sim)
                };
                result.map_err(SimulationError::from)
            })
            .labeled(label),
        );
    }

    /// Empties queues, restores QoS rates and resets the strategy.
    pub fn reset(&mut self) {
        self.core.reset();
        self.strategy.on_reset();
        self.state = AcmState::Idle;
        self.wake_up = None;
    }
}
