//! ## acmsim-core::queue
//! **PDU queues**
//!
//! [`PduQueue`] is the read/extract contract schedulers rely on. Positions are
//! 1-indexed from the head, as in "the 3rd packet of the queue".
//! [`FifoQueue`] is the in-memory implementation with an optional drop-tail
//! bound.

use std::collections::VecDeque;

use tracing::trace;

use crate::pdu::{Pdu, PduSource};
use crate::probe::{Probe, ProbeHandle};

/// What a scheduler may observe and take from a queue.
pub trait PduQueue {
    /// Number of queued packets.
    fn length(&self) -> usize;

    /// Total queued bytes.
    fn byte_length(&self) -> usize;

    /// Bytes held by the first `first_n` packets (clamped to the length).
    fn cumulative_size(&self, first_n: usize) -> usize;

    /// Size of the `nth` packet, 1-indexed.
    fn size_of(&self, nth: usize) -> Option<usize>;

    /// Identifier of the `nth` packet, 1-indexed.
    fn id_of(&self, nth: usize) -> Option<u64>;

    /// Removes the head packet.
    fn extract_front(&mut self) -> Option<Pdu>;

    fn is_empty(&self) -> bool {
        self.length() == 0
    }
}

/// FIFO packet storage.
#[derive(Default)]
pub struct FifoQueue {
    pdus: VecDeque<Pdu>,
    bytes: usize,
    max_len: Option<usize>,
    inserted: u64,
    extracted: u64,
    dropped: u64,
    insert_probe: Option<ProbeHandle>,
    extract_probe: Option<ProbeHandle>,
    drop_probe: Option<ProbeHandle>,
}

impl FifoQueue {
    /// Creates an unbounded queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a queue dropping new arrivals once `max_len` packets are held.
    pub fn bounded(max_len: usize) -> Self {
        Self {
            max_len: Some(max_len),
            ..Self::default()
        }
    }

    /// Appends a packet. Returns `false` if the queue was full and the packet
    /// was dropped.
    pub fn push(&mut self, pdu: Pdu) -> bool {
        if self.max_len.is_some_and(|max| self.pdus.len() >= max) {
            self.dropped += 1;
            self.drop_probe.sample(pdu.size() as f64);
            trace!(id = pdu.id(), "queue full, packet dropped");
            return false;
        }
        self.inserted += 1;
        self.bytes += pdu.size();
        self.insert_probe.sample(pdu.size() as f64);
        self.pdus.push_back(pdu);
        true
    }

    /// Iterates over queued packets from head to tail.
    pub fn iter(&self) -> impl Iterator<Item = &Pdu> {
        self.pdus.iter()
    }

    pub fn inserted(&self) -> u64 {
        self.inserted
    }

    pub fn extracted(&self) -> u64 {
        self.extracted
    }

    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    /// Probe sampled with the size of every accepted packet.
    pub fn set_insert_probe(&mut self, probe: Option<ProbeHandle>) {
        self.insert_probe = probe;
    }

    /// Probe sampled with the size of every extracted packet.
    pub fn set_extract_probe(&mut self, probe: Option<ProbeHandle>) {
        self.extract_probe = probe;
    }

    /// Probe sampled with the size of every dropped packet.
    pub fn set_drop_probe(&mut self, probe: Option<ProbeHandle>) {
        self.drop_probe = probe;
    }

    /// Empties the queue and clears its counters. Probes stay attached.
    pub fn reset(&mut self) {
        self.pdus.clear();
        self.bytes = 0;
        self.inserted = 0;
        self.extracted = 0;
        self.dropped = 0;
    }
}

impl PduQueue for FifoQueue {
    fn length(&self) -> usize {
        self.pdus.len()
    }

    fn byte_length(&self) -> usize {
        self.bytes
    }

    fn cumulative_size(&self, first_n: usize) -> usize {
        self.pdus.iter().take(first_n).map(Pdu::size).sum()
    }

    fn size_of(&self, nth: usize) -> Option<usize> {
        nth.checked_sub(1)
            .and_then(|i| self.pdus.get(i))
            .map(Pdu::size)
    }

    fn id_of(&self, nth: usize) -> Option<u64> {
        nth.checked_sub(1)
            .and_then(|i| self.pdus.get(i))
            .map(Pdu::id)
    }

    fn extract_front(&mut self) -> Option<Pdu> {
        let pdu = self.pdus.pop_front()?;
        self.bytes -= pdu.size();
        self.extracted += 1;
        self.extract_probe.sample(pdu.size() as f64);
        Some(pdu)
    }
}

impl PduSource for FifoQueue {
    fn get_pdu(&mut self) -> Option<Pdu> {
        self.extract_front()
    }

    fn has_pdu(&self) -> bool {
        !self.pdus.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn queue_of(sizes: &[usize]) -> FifoQueue {
        let mut queue = FifoQueue::new();
        for (id, size) in sizes.iter().enumerate() {
            queue.push(Pdu::new(id as u64, *size, 0.0));
        }
        queue
    }

    #[test]
    fn introspection_is_one_indexed() {
        let queue = queue_of(&[64, 1500, 40]);
        assert_eq!(queue.length(), 3);
        assert_eq!(queue.byte_length(), 1604);
        assert_eq!(queue.size_of(1), Some(64));
        assert_eq!(queue.size_of(3), Some(40));
        assert_eq!(queue.size_of(0), None);
        assert_eq!(queue.size_of(4), None);
        assert_eq!(queue.id_of(2), Some(1));
    }

    #[test]
    fn cumulative_size_clamps_to_length() {
        let queue = queue_of(&[64, 64, 1500]);
        assert_eq!(queue.cumulative_size(0), 0);
        assert_eq!(queue.cumulative_size(2), 128);
        assert_eq!(queue.cumulative_size(10), 1628);
    }

    #[test]
    fn extraction_is_fifo() {
        let mut queue = queue_of(&[10, 20, 30]);
        assert_eq!(queue.extract_front().map(|p| p.size()), Some(10));
        assert_eq!(queue.get_pdu().map(|p| p.size()), Some(20));
        assert!(queue.has_pdu());
        assert_eq!(queue.size_of(1), Some(30));
        assert_eq!(queue.byte_length(), 30);
        assert_eq!(queue.extracted(), 2);
    }

    #[test]
    fn bounded_queue_drops_tail() {
        let mut queue = FifoQueue::bounded(2);
        assert!(queue.push(Pdu::new(1, 100, 0.0)));
        assert!(queue.push(Pdu::new(2, 100, 0.0)));
        assert!(!queue.push(Pdu::new(3, 100, 0.0)));
        assert_eq!(queue.length(), 2);
        assert_eq!(queue.dropped(), 1);
    }

    #[test]
    fn reset_empties_and_clears_counters() {
        let mut queue = queue_of(&[1, 2, 3]);
        queue.extract_front();
        queue.reset();
        assert!(queue.is_empty());
        assert_eq!(queue.byte_length(), 0);
        assert_eq!(queue.inserted(), 0);
        assert_eq!(queue.extracted(), 0);
    }
}
