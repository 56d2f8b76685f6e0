//! Queue storage of an ACM scheduler, one FIFO per (MODCOD, QoS) pair.

use acmsim_core::queue::{FifoQueue, PduQueue};
use acmsim_link::ModcodId;

pub struct QueueGrid {
    queues: Vec<FifoQueue>,
    nb_modcod: usize,
    nb_qos: usize,
}

impl QueueGrid {
    pub fn new(nb_modcod: usize, nb_qos: usize) -> Self {
        Self {
            queues: (0..nb_modcod * nb_qos).map(|_| FifoQueue::new()).collect(),
            nb_modcod,
            nb_qos,
        }
    }

    pub fn nb_modcod(&self) -> usize {
        self.nb_modcod
    }

    pub fn nb_qos(&self) -> usize {
        self.nb_qos
    }

    /// Flat index of a queue, the layout used by plans and QoS grids.
    pub fn slot(&self, modcod: ModcodId, qos: usize) -> usize {
        assert!(
            modcod.index() < self.nb_modcod && qos < self.nb_qos,
            "queue ({modcod}, {qos}) out of range"
        );
        modcod.index() * self.nb_qos + qos
    }

    pub fn queue(&self, modcod: ModcodId, qos: usize) -> &FifoQueue {
        &self.queues[self.slot(modcod, qos)]
    }

    pub fn queue_mut(&mut self, modcod: ModcodId, qos: usize) -> &mut FifoQueue {
        let slot = self.slot(modcod, qos);
        &mut self.queues[slot]
    }

    /// Every queue with its coordinates, MODCOD-major.
    pub fn iter(&self) -> impl Iterator<Item = (ModcodId, usize, &FifoQueue)> {
        let nb_qos = self.nb_qos;
        self.queues
            .iter()
            .enumerate()
            .map(move |(slot, queue)| (ModcodId::new(slot / nb_qos), slot % nb_qos, queue))
    }

    pub fn total_length(&self) -> usize {
        self.queues.iter().map(PduQueue::length).sum()
    }

    pub fn total_bytes(&self) -> usize {
        self.queues.iter().map(PduQueue::byte_length).sum()
    }

    pub fn reset(&mut self) {
        self.queues.iter_mut().for_each(FifoQueue::reset);
    }
}
