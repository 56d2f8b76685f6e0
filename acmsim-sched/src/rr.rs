//! Round Robin over PDU sources.

use tracing::trace;

use acmsim_core::pdu::{Pdu, PduSource};
use acmsim_core::queue::FifoQueue;

/// Serves its sources one packet at a time, in circular order.
#[derive(Default)]
pub struct RoundRobin {
    sources: Vec<FifoQueue>,
    last_served: Option<usize>,
    served: Vec<u64>,
}

impl RoundRobin {
    pub fn new(nb_sources: usize) -> Self {
        let mut rr = Self::default();
        for _ in 0..nb_sources {
            rr.add_source(FifoQueue::new());
        }
        rr
    }

    /// Adds a source and returns its index.
    pub fn add_source(&mut self, queue: FifoQueue) -> usize {
        self.sources.push(queue);
        self.served.push(0);
        self.sources.len() - 1
    }

    pub fn nb_sources(&self) -> usize {
        self.sources.len()
    }

    pub fn source(&self, index: usize) -> &FifoQueue {
        &self.sources[index]
    }

    /// Queues `pdu` on source `index`. Returns `false` if it was dropped.
    pub fn process_pdu(&mut self, index: usize, pdu: Pdu) -> bool {
        self.sources[index].push(pdu)
    }

    /// Packets served per source since the last reset.
    pub fn served(&self) -> &[u64] {
        &self.served
    }

    pub fn reset(&mut self) {
        self.sources.iter_mut().for_each(FifoQueue::reset);
        self.served.iter_mut().for_each(|n| *n = 0);
        self.last_served = None;
    }
}

impl PduSource for RoundRobin {
    fn get_pdu(&mut self) -> Option<Pdu> {
        let n = self.sources.len();
        let start = self.last_served.map_or(0, |last| last + 1);
        for k in 0..n {
            let index = (start + k) % n;
            if let Some(pdu) = self.sources[index].get_pdu() {
                trace!(source = index, id = pdu.id(), "round robin pick");
                self.last_served = Some(index);
                self.served[index] += 1;
                return Some(pdu);
            }
        }
        None
    }

    fn has_pdu(&self) -> bool {
        self.sources.iter().any(PduSource::has_pdu)
    }
}
