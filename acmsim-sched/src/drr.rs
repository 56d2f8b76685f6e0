//! ## acmsim-sched::drr
//! **Deficit Round Robin**
//!
//! Each source has a quantum of bytes credited to its deficit counter once
//! per round; a source may send its head packet when the packet fits in its
//! deficit. Rounds in which nobody could send are skipped: a new round
//! credits every active source with as many quanta as the most advanced of
//! them needs to send, so each call emits a packet whenever one is queued.
//!
//! Only non-empty sources are active. A source that drains leaves the active
//! list with its deficit cleared; one that gets a packet again joins at the
//! tail.

use std::collections::VecDeque;

use tracing::trace;

use crate::error::ScheduleError;
use acmsim_core::pdu::{Pdu, PduSource};
use acmsim_core::queue::{FifoQueue, PduQueue};

struct DrrSource {
    queue: FifoQueue,
    quantum: usize,
    deficit: usize,
    active: bool,
    served_bytes: u64,
}

#[derive(Default)]
pub struct DeficitRoundRobin {
    sources: Vec<DrrSource>,
    active: VecDeque<usize>,
    position: usize,
    round_in_progress: bool,
    rounds: u64,
}

impl DeficitRoundRobin {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a source crediting `quantum` bytes per round. Returns its index.
    pub fn add_source(&mut self, quantum: usize) -> Result<usize, ScheduleError> {
        self.add_source_with(FifoQueue::new(), quantum)
    }

    pub fn add_source_with(
        &mut self,
        queue: FifoQueue,
        quantum: usize,
    ) -> Result<usize, ScheduleError> {
        if quantum == 0 {
            return Err(ScheduleError::InvalidConfiguration(
                "DRR quantum must be at least one byte".into(),
            ));
        }
        self.sources.push(DrrSource {
            queue,
            quantum,
            deficit: 0,
            active: false,
            served_bytes: 0,
        });
        Ok(self.sources.len() - 1)
    }

    pub fn nb_sources(&self) -> usize {
        self.sources.len()
    }

    pub fn source(&self, index: usize) -> &FifoQueue {
        &self.sources[index].queue
    }

    pub fn deficit(&self, index: usize) -> usize {
        self.sources[index].deficit
    }

    pub fn is_active(&self, index: usize) -> bool {
        self.sources[index].active
    }

    /// Bytes sent per source since the last reset.
    pub fn served_bytes(&self) -> Vec<u64> {
        self.sources.iter().map(|s| s.served_bytes).collect()
    }

    /// Rounds credited since the last reset.
    pub fn rounds(&self) -> u64 {
        self.rounds
    }

    /// Queues `pdu` on source `index`. Returns `false` if it was dropped.
    pub fn process_pdu(&mut self, index: usize, pdu: Pdu) -> bool {
        let accepted = self.sources[index].queue.push(pdu);
        self.activate(index);
        accepted
    }

    fn activate(&mut self, index: usize) {
        let source = &mut self.sources[index];
        if !source.active && !source.queue.is_empty() {
            source.active = true;
            self.active.push_back(index);
        }
    }

    /// Credits every active source with the smallest number of quanta that
    /// lets at least one of them send.
    fn start_round(&mut self) {
        let rounds = self
            .active
            .iter()
            .filter_map(|&index| {
                let source = &self.sources[index];
                let head = source.queue.size_of(1)?;
                Some(head.saturating_sub(source.deficit).div_ceil(source.quantum))
            })
            .min()
            .unwrap_or(0);
        for &index in &self.active {
            let source = &mut self.sources[index];
            source.deficit += rounds * source.quantum;
        }
        self.rounds += rounds as u64;
        self.round_in_progress = true;
        trace!(rounds, "drr round started");
    }

    /// One walk over the active list from the saved position. Returns the
    /// first packet a source can afford.
    fn walk(&mut self) -> Option<Pdu> {
        for _ in 0..self.active.len() {
            if self.position >= self.active.len() {
                self.position = 0;
            }
            let index = self.active[self.position];
            let source = &mut self.sources[index];
            match source.queue.size_of(1) {
                Some(head) if head <= source.deficit => {
                    let pdu = source.queue.extract_front()?;
                    source.deficit -= head;
                    source.served_bytes += head as u64;
                    if source.queue.is_empty() {
                        source.deficit = 0;
                        source.active = false;
                        self.active.remove(self.position);
                    }
                    trace!(source = index, id = pdu.id(), "drr pick");
                    return Some(pdu);
                }
                _ => self.position += 1,
            }
        }
        None
    }

    pub fn reset(&mut self) {
        for source in &mut self.sources {
            source.queue.reset();
            source.deficit = 0;
            source.active = false;
            source.served_bytes = 0;
        }
        self.active.clear();
        self.position = 0;
        self.round_in_progress = false;
        self.rounds = 0;
    }
}

impl PduSource for DeficitRoundRobin {
    fn get_pdu(&mut self) -> Option<Pdu> {
        for index in 0..self.sources.len() {
            self.activate(index);
        }
        if self.active.is_empty() {
            return None;
        }
        if self.round_in_progress {
            if let Some(pdu) = self.walk() {
                return Some(pdu);
            }
        }
        // A full lap without emission ends the round.
        self.start_round();
        self.walk()
    }

    fn has_pdu(&self) -> bool {
        self.sources.iter().any(|s| !s.queue.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn drr(quanta: &[usize]) -> DeficitRoundRobin {
        let mut drr = DeficitRoundRobin::new();
        for quantum in quanta {
            drr.add_source(*quantum).unwrap();
        }
        drr
    }

    #[test]
    fn quanta_share_bytes() {
        let mut drr = drr(&[1500, 500]);
        let mut id = 0;
        for _ in 0..40 {
            drr.process_pdu(0, Pdu::new(id, 500, 0.0));
            drr.process_pdu(1, Pdu::new(id + 1, 500, 0.0));
            id += 2;
        }
        for _ in 0..40 {
            assert!(drr.get_pdu().is_some());
        }
        let served = drr.served_bytes();
        // Three packets of source 0 for every packet of source 1.
        assert_eq!(served, [15_000, 5_000]);
    }

    #[test]
    fn skips_empty_rounds() {
        let mut drr = drr(&[100]);
        drr.process_pdu(0, Pdu::new(1, 1000, 0.0));
        assert_eq!(drr.get_pdu().map(|p| p.id()), Some(1));
        assert_eq!(drr.rounds(), 10);
        assert_eq!(drr.deficit(0), 0);
        assert!(!drr.is_active(0));
        assert!(drr.get_pdu().is_none());
    }

    #[test]
    fn drained_source_rejoins_at_the_tail() {
        let mut drr = drr(&[100, 100, 100]);
        drr.process_pdu(0, Pdu::new(1, 100, 0.0));
        drr.process_pdu(1, Pdu::new(2, 100, 0.0));
        assert_eq!(drr.get_pdu().map(|p| p.id()), Some(1));
        drr.process_pdu(0, Pdu::new(3, 100, 0.0));
        drr.process_pdu(2, Pdu::new(4, 100, 0.0));
        let rest = std::iter::from_fn(|| drr.get_pdu())
            .map(|p| p.id())
            .collect::<Vec<_>>();
        assert_eq!(rest, [2, 3, 4]);
    }

    #[test]
    fn rejects_zero_quantum() {
        assert!(DeficitRoundRobin::new().add_source(0).is_err());
    }

    #[derive(Debug, Clone)]
    enum Op {
        Push { source: usize, size: usize },
        Pull,
    }

    fn op() -> impl Strategy<Value = Op> {
        prop_oneof![
            (0usize..3, 1usize..3000).prop_map(|(source, size)| Op::Push { source, size }),
            Just(Op::Pull),
        ]
    }

    proptest! {
        #[test]
        fn empty_sources_hold_no_deficit(
            quanta in prop::collection::vec(1usize..2000, 3),
            ops in prop::collection::vec(op(), 1..200),
        ) {
            let mut drr = drr(&quanta);
            let mut id = 0;
            for op in ops {
                match op {
                    Op::Push { source, size } => {
                        drr.process_pdu(source, Pdu::new(id, size, 0.0));
                        id += 1;
                    }
                    Op::Pull => {
                        let had = drr.has_pdu();
                        prop_assert_eq!(drr.get_pdu().is_some(), had);
                    }
                }
                for index in 0..drr.nb_sources() {
                    let empty = drr.source(index).is_empty();
                    prop_assert_eq!(drr.is_active(index), !empty);
                    if empty {
                        prop_assert_eq!(drr.deficit(index), 0);
                    }
                }
            }
        }
    }
}
