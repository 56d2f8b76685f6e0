//! ## acmsim-sched::plan
//! **Fill plans and frame sequences**
//!
//! A [`FillPlan`] says how many head packets of each queue go into one frame.
//! Packets are taken in FIFO order when the plan is committed, so a count is
//! enough to name them. A [`Sequence`] holds the plans of several frames
//! computed ahead of time; the packets of a queue are split between its plans
//! in plan order, each plan taking the next `count` packets after those of
//! the plans before it.

use acmsim_link::{ModcodId, ModcodTable};

#[derive(Debug, Clone, PartialEq)]
pub struct FillPlan {
    modcod: Option<ModcodId>,
    counts: Vec<usize>,
    nb_qos: usize,
    volume: usize,
    interest: f64,
    choice_count: u32,
    visited: bool,
}

impl FillPlan {
    /// An empty plan with no MODCOD chosen yet.
    pub fn blank(nb_modcod: usize, nb_qos: usize) -> Self {
        Self {
            modcod: None,
            counts: vec![0; nb_modcod * nb_qos],
            nb_qos,
            volume: 0,
            interest: 0.0,
            choice_count: 0,
            visited: false,
        }
    }

    pub fn for_modcod(modcod: ModcodId, nb_modcod: usize, nb_qos: usize) -> Self {
        let mut plan = Self::blank(nb_modcod, nb_qos);
        plan.modcod = Some(modcod);
        plan
    }

    pub fn modcod(&self) -> Option<ModcodId> {
        self.modcod
    }

    pub fn set_modcod(&mut self, modcod: ModcodId) {
        self.modcod = Some(modcod);
    }

    pub fn count(&self, modcod: ModcodId, qos: usize) -> usize {
        self.counts[modcod.index() * self.nb_qos + qos]
    }

    /// Adds one `size`-byte packet of queue `(modcod, qos)` worth `gain`.
    pub fn add(&mut self, modcod: ModcodId, qos: usize, size: usize, gain: f64) {
        self.counts[modcod.index() * self.nb_qos + qos] += 1;
        self.volume += size;
        self.interest += gain;
    }

    /// Payload bytes.
    pub fn volume(&self) -> usize {
        self.volume
    }

    pub fn interest(&self) -> f64 {
        self.interest
    }

    /// Number of equivalent alternatives met while building this plan.
    pub fn choice_count(&self) -> u32 {
        self.choice_count
    }

    pub(crate) fn set_choice_count(&mut self, choice_count: u32) {
        self.choice_count = choice_count;
    }

    pub fn visited(&self) -> bool {
        self.visited
    }

    pub fn mark_visited(&mut self) {
        self.visited = true;
    }

    pub fn packet_count(&self) -> usize {
        self.counts.iter().sum()
    }

    pub fn is_empty(&self) -> bool {
        self.volume == 0
    }

    /// Non-zero counts as `(modcod, qos, count)`, MODCOD-major.
    pub fn counts(&self) -> impl Iterator<Item = (ModcodId, usize, usize)> + '_ {
        let nb_qos = self.nb_qos;
        self.counts
            .iter()
            .enumerate()
            .filter(|(_, count)| **count > 0)
            .map(move |(slot, count)| (ModcodId::new(slot / nb_qos), slot % nb_qos, *count))
    }

    /// Whether `extra` more bytes still fit in a frame of `capacity` bytes.
    pub fn fits(&self, extra: usize, capacity: usize) -> bool {
        self.volume + extra <= capacity
    }

    /// Preferred over `other`: higher interest, then larger volume.
    pub fn better_than(&self, other: &FillPlan) -> bool {
        self.interest > other.interest
            || (self.interest == other.interest && self.volume > other.volume)
    }
}

/// Plans of the frames of one epoch, sent in order.
#[derive(Debug, Clone)]
pub struct Sequence {
    plans: Vec<FillPlan>,
    max_len: usize,
    next_to_send: usize,
}

impl Sequence {
    pub fn new(max_len: usize) -> Self {
        Self {
            plans: Vec::with_capacity(max_len),
            max_len,
            next_to_send: 0,
        }
    }

    pub fn clear(&mut self) {
        self.plans.clear();
        self.next_to_send = 0;
    }

    /// Number of plans computed.
    pub fn position(&self) -> usize {
        self.plans.len()
    }

    /// Number of plans already handed out.
    pub fn next_to_send(&self) -> usize {
        self.next_to_send
    }

    pub fn max_len(&self) -> usize {
        self.max_len
    }

    pub fn is_full(&self) -> bool {
        self.plans.len() >= self.max_len
    }

    pub fn is_drained(&self) -> bool {
        self.next_to_send >= self.plans.len()
    }

    /// Appends a plan. Returns `false` when the sequence is full.
    pub fn push(&mut self, plan: FillPlan) -> bool {
        if self.is_full() {
            return false;
        }
        self.plans.push(plan);
        true
    }

    pub fn plans(&self) -> &[FillPlan] {
        &self.plans
    }

    pub fn plans_mut(&mut self) -> &mut [FillPlan] {
        &mut self.plans
    }

    pub fn last_mut(&mut self) -> Option<&mut FillPlan> {
        self.plans.last_mut()
    }

    /// Drops plans that ended up with no packet.
    pub fn retain_non_empty(&mut self) {
        debug_assert_eq!(self.next_to_send, 0);
        self.plans.retain(|plan| !plan.is_empty());
    }

    /// Hands out the next plan. The sequence empties itself once every plan
    /// has been handed out.
    pub fn take_next(&mut self) -> Option<FillPlan> {
        let plan = self.plans.get(self.next_to_send).cloned()?;
        self.next_to_send += 1;
        if self.is_drained() {
            self.clear();
        }
        Some(plan)
    }

    /// Packets of `(modcod, qos)` promised to plans not yet handed out.
    pub fn reserved(&self, modcod: ModcodId, qos: usize) -> usize {
        self.plans[self.next_to_send..]
            .iter()
            .map(|plan| plan.count(modcod, qos))
            .sum()
    }

    /// Air time of every plan computed.
    pub fn planned_duration(&self, modcods: &ModcodTable) -> f64 {
        self.plans
            .iter()
            .filter_map(FillPlan::modcod)
            .map(|modcod| modcods.transmission_time(modcod))
            .sum()
    }
}
