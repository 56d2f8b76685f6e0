//! ## acmsim-sched::batch
//! **Multi-frame epoch planning**
//!
//! Instead of deciding frame by frame, [`Batch`] plans a whole epoch of at
//! least `epoch_min_duration` seconds of air time at once:
//!
//! 1. every non-empty queue gets a weight (see [`WeightMode`]), normalized to
//!    sum to one;
//! 2. a queue's bit budget is its share of what its MODCOD can carry during
//!    the epoch, capped by what it holds;
//! 3. the weighted pass walks MODCODs and queues from random offsets and packs
//!    packets into frames of the queue's own MODCOD while budgets last;
//! 4. the filler pass tops every frame up with any packet that still fits,
//!    budgets ignored.
//!
//! The planned frames are then handed out one per link request. A queue's
//! packets are always spread over frames in plan order, so committing the
//! plans one after the other extracts exactly the packets planned.

use rand::Rng;
use tracing::{debug, warn};

use crate::acm::{ScheduleContext, ScheduleStrategy};
use crate::error::ScheduleError;
use crate::plan::{FillPlan, Sequence};
use acmsim_core::queue::PduQueue;
use acmsim_core::SimTime;
use acmsim_link::ModcodId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WeightMode {
    /// Utility derivative.
    #[default]
    Utility,
    /// Queued bytes.
    Length,
    /// Utility derivative times queued bytes.
    UtilityThenLength,
    /// Queued bytes times the air time of one bit on the queue's MODCOD.
    LengthThenDuration,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BatchConfig {
    pub epoch_min_duration: SimTime,
    pub weight_mode: WeightMode,
    pub max_sequence_len: usize,
    /// When off, a new epoch never starts before the previous one lasted
    /// `epoch_min_duration`.
    pub work_conserving: bool,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            epoch_min_duration: 0.1,
            weight_mode: WeightMode::Utility,
            max_sequence_len: 64,
            work_conserving: true,
        }
    }
}

/// What the last epoch planned, indexed like the queue grid.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EpochReport {
    pub start: SimTime,
    pub weights: Vec<f64>,
    pub budget_bits: Vec<f64>,
    pub initial_bits: Vec<u64>,
    pub reserved_bits: Vec<u64>,
    pub frames: usize,
    pub planned_duration: SimTime,
    pub interest: f64,
}

#[derive(Debug, Clone)]
pub struct Batch {
    config: BatchConfig,
    sequence: Sequence,
    epoch_start: Option<SimTime>,
    nb_epoch: u64,
    nb_epoch_starvation: u64,
    last_epoch: EpochReport,
}

impl Batch {
    pub fn new(config: BatchConfig) -> Result<Self, ScheduleError> {
        if !(config.epoch_min_duration > 0.0) {
            return Err(ScheduleError::InvalidConfiguration(format!(
                "epoch duration must be positive, got {}",
                config.epoch_min_duration
            )));
        }
        if config.max_sequence_len == 0 {
            return Err(ScheduleError::InvalidConfiguration(
                "a sequence needs room for at least one frame".into(),
            ));
        }
        Ok(Self {
            sequence: Sequence::new(config.max_sequence_len),
            config,
            epoch_start: None,
            nb_epoch: 0,
            nb_epoch_starvation: 0,
            last_epoch: EpochReport::default(),
        })
    }

    pub fn config(&self) -> &BatchConfig {
        &self.config
    }

    pub fn sequence(&self) -> &Sequence {
        &self.sequence
    }

    pub fn nb_epoch(&self) -> u64 {
        self.nb_epoch
    }

    /// Epochs whose frames did not fill `epoch_min_duration`.
    pub fn nb_epoch_starvation(&self) -> u64 {
        self.nb_epoch_starvation
    }

    pub fn last_epoch(&self) -> &EpochReport {
        &self.last_epoch
    }

    fn weights(&self, ctx: &ScheduleContext<'_>) -> Vec<f64> {
        let mut weights = ctx
            .queues
            .iter()
            .map(|(m, q, queue)| {
                let bytes = queue.byte_length() as f64;
                if bytes == 0.0 {
                    return 0.0;
                }
                match self.config.weight_mode {
                    WeightMode::Utility => ctx.qos.derivative(m, q),
                    WeightMode::Length => bytes,
                    WeightMode::UtilityThenLength => ctx.qos.derivative(m, q) * bytes,
                    WeightMode::LengthThenDuration => {
                        bytes * ctx.modcods.transmission_time(m)
                            / ctx.modcods.payload_bits(m) as f64
                    }
                }
            })
            .collect::<Vec<_>>();

        let total: f64 = weights.iter().sum();
        if total > 0.0 && total.is_finite() {
            weights.iter_mut().for_each(|w| *w /= total);
        } else {
            let active = ctx.queues.iter().filter(|(_, _, q)| !q.is_empty()).count();
            for ((_, _, queue), w) in ctx.queues.iter().zip(weights.iter_mut()) {
                *w = if queue.is_empty() {
                    0.0
                } else {
                    1.0 / active as f64
                };
            }
        }
        weights
    }

    /// Plans the frames of a new epoch starting at `ctx.now`.
    fn plan_epoch(&mut self, ctx: &mut ScheduleContext<'_>) {
        self.sequence.clear();
        let nb_modcod = ctx.nb_modcod();
        let nb_qos = ctx.nb_qos();
        let slot = |m: ModcodId, q: usize| m.index() * nb_qos + q;

        let initial_bits = ctx
            .queues
            .iter()
            .map(|(_, _, queue)| queue.byte_length() as u64 * 8)
            .collect::<Vec<_>>();
        if initial_bits.iter().all(|bits| *bits == 0) {
            return;
        }
        let weights = self.weights(ctx);
        let mut budgets = ctx
            .queues
            .iter()
            .map(|(m, q, _)| {
                let s = slot(m, q);
                let share = weights[s] * ctx.modcods.payload_bits(m) as f64
                    * self.config.epoch_min_duration
                    / ctx.modcods.transmission_time(m);
                share.min(initial_bits[s] as f64)
            })
            .collect::<Vec<_>>();
        let budget_bits = budgets.clone();

        let mut taken = vec![0usize; budgets.len()];
        let mut reserved_bits = vec![0u64; budgets.len()];
        // Index of the last frame holding packets of each queue.
        let mut last_frame: Vec<Option<usize>> = vec![None; budgets.len()];

        let modcod_offset = ctx.rng.random_range(0..nb_modcod);
        let qos_offset = ctx.rng.random_range(0..nb_qos);
        'weighted: for i in 0..nb_modcod {
            let m = ModcodId::new((modcod_offset + i) % nb_modcod);
            if (0..nb_qos).all(|q| budgets[slot(m, q)] <= 0.0) {
                continue;
            }
            let capacity = ctx.capacity(m);
            if !self.sequence.push(ctx.plan(m)) {
                break;
            }
            for j in 0..nb_qos {
                let q = (qos_offset + j) % nb_qos;
                let s = slot(m, q);
                let queue = ctx.queues.queue(m, q);
                while budgets[s] > 0.0 {
                    let Some(size) = queue.size_of(taken[s] + 1) else {
                        break;
                    };
                    if size > capacity {
                        break;
                    }
                    let fits = self
                        .sequence
                        .plans()
                        .last()
                        .is_some_and(|frame| frame.fits(size, capacity));
                    if !fits {
                        if !self.sequence.push(ctx.plan(m)) {
                            break 'weighted;
                        }
                        continue;
                    }
                    if let Some(frame) = self.sequence.last_mut() {
                        frame.add(m, q, size, size as f64 * weights[s]);
                    }
                    taken[s] += 1;
                    reserved_bits[s] += size as u64 * 8;
                    budgets[s] -= size as f64 * 8.0;
                    last_frame[s] = Some(self.sequence.position() - 1);
                }
            }
        }

        for index in 0..self.sequence.position() {
            let Some(frame_modcod) = self.sequence.plans()[index].modcod() else {
                continue;
            };
            let capacity = ctx.capacity(frame_modcod);
            for (m, q) in ctx.eligible(frame_modcod) {
                let s = slot(m, q);
                // Later frames already hold this queue's next packets.
                if last_frame[s].is_some_and(|last| last > index) {
                    continue;
                }
                let queue = ctx.queues.queue(m, q);
                let frame = &mut self.sequence.plans_mut()[index];
                while let Some(size) = queue.size_of(taken[s] + 1) {
                    if !frame.fits(size, capacity) {
                        break;
                    }
                    frame.add(m, q, size, size as f64 * weights[s]);
                    taken[s] += 1;
                    reserved_bits[s] += size as u64 * 8;
                    last_frame[s] = Some(index);
                }
            }
        }
        self.sequence.retain_non_empty();

        let planned_duration = self.sequence.planned_duration(ctx.modcods);
        let interest: f64 = self.sequence.plans().iter().map(FillPlan::interest).sum();
        self.nb_epoch += 1;
        self.epoch_start = Some(ctx.now);
        if planned_duration < self.config.epoch_min_duration {
            self.nb_epoch_starvation += 1;
            warn!(
                epoch = self.nb_epoch,
                planned_duration,
                min_duration = self.config.epoch_min_duration,
                "epoch starved"
            );
        }
        debug!(
            epoch = self.nb_epoch,
            frames = self.sequence.position(),
            planned_duration,
            interest,
            "epoch planned"
        );
        self.last_epoch = EpochReport {
            start: ctx.now,
            weights,
            budget_bits,
            initial_bits,
            reserved_bits,
            frames: self.sequence.position(),
            planned_duration,
            interest,
        };
    }
}

impl ScheduleStrategy for Batch {
    fn name(&self) -> &'static str {
        "batch"
    }

    fn schedule(
        &mut self,
        ctx: &mut ScheduleContext<'_>,
    ) -> Result<Option<FillPlan>, ScheduleError> {
        if self.sequence.is_drained() {
            if !self.config.work_conserving
                && self
                    .epoch_start
                    .is_some_and(|start| ctx.now < start + self.config.epoch_min_duration)
            {
                return Ok(None);
            }
            self.plan_epoch(ctx);
        }
        Ok(self.sequence.take_next())
    }

    fn reserved(&self, modcod: ModcodId, qos: usize) -> usize {
        self.sequence.reserved(modcod, qos)
    }

    fn has_planned_frames(&self) -> bool {
        !self.sequence.is_drained()
    }

    fn wake_up_at(&self) -> Option<SimTime> {
        if self.config.work_conserving || !self.sequence.is_drained() {
            return None;
        }
        self.epoch_start
            .map(|start| start + self.config.epoch_min_duration)
    }

    fn on_reset(&mut self) {
        self.sequence.clear();
        self.epoch_start = None;
        self.nb_epoch = 0;
        self.nb_epoch_starvation = 0;
        self.last_epoch = EpochReport::default();
    }
}
