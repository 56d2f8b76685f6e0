//! Protocol data units.

use crate::time::SimTime;

/// A packet flowing through queues, schedulers and links.
#[derive(Debug, Clone, PartialEq)]
pub struct Pdu {
    id: u64,
    size: usize,
    created: SimTime,
}

impl Pdu {
    /// Creates a PDU of `size` bytes.
    ///
    /// # Panics
    ///
    /// Panics on a zero size: schedulers rely on every packet consuming
    /// frame capacity.
    pub fn new(id: u64, size: usize, created: SimTime) -> Self {
        assert!(size > 0, "PDU {id} has zero size");
        Self { id, size, created }
    }

    #[inline]
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Size in bytes.
    #[inline]
    pub fn size(&self) -> usize {
        self.size
    }

    #[inline]
    pub fn created(&self) -> SimTime {
        self.created
    }
}

/// Anything a scheduler or a link can pull packets from.
pub trait PduSource {
    /// Removes and returns the next packet, if any.
    fn get_pdu(&mut self) -> Option<Pdu>;

    /// Whether `get_pdu` would return a packet.
    fn has_pdu(&self) -> bool;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accessors() {
        let pdu = Pdu::new(7, 1500, 0.25);
        assert_eq!(pdu.id(), 7);
        assert_eq!(pdu.size(), 1500);
        assert_eq!(pdu.created(), 0.25);
    }

    #[test]
    #[should_panic(expected = "zero size")]
    fn zero_sized_pdu_is_rejected() {
        let _ = Pdu::new(1, 0, 0.0);
    }
}
