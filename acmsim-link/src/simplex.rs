//! Fixed-rate simplex link pulling packets from a [`PduSource`].
//!
//! Used in front of the Round Robin and DRR schedulers: whenever the channel
//! goes idle the link asks its source for the next packet.

use std::cell::RefCell;
use std::rc::{Rc, Weak};

use tracing::trace;

use crate::error::LinkError;
use acmsim_core::pdu::PduSource;
use acmsim_core::probe::{Probe, ProbeHandle};
use acmsim_core::time::transmission_time;
use acmsim_core::{SimTime, Simulation};

/// Point-to-point link with a constant bit rate.
pub struct SimplexLink {
    bit_rate: f64,
    busy_until: SimTime,
    busy_time: SimTime,
    /// An end-of-transmission event is pending.
    tx_scheduled: bool,
    source: Rc<RefCell<dyn PduSource>>,
    me: Weak<RefCell<SimplexLink>>,
    sent: u64,
    bytes: u64,
    sent_ids: Option<Vec<u64>>,
    size_probe: Option<ProbeHandle>,
}

impl SimplexLink {
    /// Creates a link draining `source` at `bit_rate` bit/s.
    pub fn new_shared(
        bit_rate: f64,
        source: Rc<RefCell<dyn PduSource>>,
    ) -> Result<Rc<RefCell<Self>>, LinkError> {
        if !(bit_rate > 0.0) {
            return Err(LinkError::InvalidRate(bit_rate));
        }
        Ok(Rc::new_cyclic(|me| {
            RefCell::new(Self {
                bit_rate,
                busy_until: 0.0,
                busy_time: 0.0,
                tx_scheduled: false,
                source,
                me: me.clone(),
                sent: 0,
                bytes: 0,
                sent_ids: None,
                size_probe: None,
            })
        }))
    }

    /// Remembers the id of every packet sent, in order.
    pub fn record_ids(&mut self) {
        self.sent_ids = Some(Vec::new());
    }

    pub fn set_size_probe(&mut self, probe: Option<ProbeHandle>) {
        self.size_probe = probe;
    }

    /// Idle and not about to pull from its own end-of-transmission event.
    pub fn available(&self, now: SimTime) -> bool {
        !self.tx_scheduled && self.busy_until <= now
    }

    pub fn busy_until(&self) -> SimTime {
        self.busy_until
    }

    /// Fraction of `[0, now]` spent transmitting.
    pub fn utilisation(&self, now: SimTime) -> f64 {
        if now > 0.0 {
            let ahead = (self.busy_until - now).max(0.0);
            (self.busy_time - ahead) / now
        } else {
            0.0
        }
    }

    /// Tells the link its source has something to send. Starts a
    /// transmission right away if the channel is idle.
    ///
    /// The caller must not hold a borrow of the source.
    pub fn notify_pdu_available(&mut self, sim: &mut Simulation) {
        if self.available(sim.now()) {
            self.pull(sim);
        }
    }

    fn end_of_transmission(&mut self, sim: &mut Simulation) {
        self.tx_scheduled = false;
        if self.available(sim.now()) {
            self.pull(sim);
        }
    }

    fn pull(&mut self, sim: &mut Simulation) {
        let Some(pdu) = self.source.borrow_mut().get_pdu() else {
            return;
        };
        let duration = transmission_time(pdu.size(), self.bit_rate);
        self.busy_until = sim.now() + duration;
        self.busy_time += duration;
        self.sent += 1;
        self.bytes += pdu.size() as u64;
        self.size_probe.sample(pdu.size() as f64);
        if let Some(ids) = self.sent_ids.as_mut() {
            ids.push(pdu.id());
        }
        trace!(id = pdu.id(), until = self.busy_until, "pdu on air");

        let me = self.me.clone();
        self.tx_scheduled = true;
        sim.schedule_at(self.busy_until, move |sim| {
            if let Some(link) = me.upgrade() {
                link.borrow_mut().end_of_transmission(sim);
            }
            Ok(())
        });
    }

    pub fn sent(&self) -> u64 {
        self.sent
    }

    pub fn bytes(&self) -> u64 {
        self.bytes
    }

    pub fn sent_ids(&self) -> &[u64] {
        self.sent_ids.as_deref().unwrap_or_default()
    }

    pub fn reset(&mut self) {
        self.busy_until = 0.0;
        self.busy_time = 0.0;
        self.tx_scheduled = false;
        self.sent = 0;
        self.bytes = 0;
        if let Some(ids) = self.sent_ids.as_mut() {
            ids.clear();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use acmsim_core::pdu::Pdu;
    use acmsim_core::queue::{FifoQueue, PduQueue};

    #[test]
    fn drains_its_source_back_to_back() {
        let mut sim = Simulation::new();
        let queue = Rc::new(RefCell::new(FifoQueue::new()));
        for id in 0..3 {
            queue.borrow_mut().push(Pdu::new(id, 1000, 0.0));
        }
        let link = SimplexLink::new_shared(8_000.0, queue.clone()).unwrap();
        link.borrow_mut().record_ids();

        link.borrow_mut().notify_pdu_available(&mut sim);
        sim.run_until_exhausted().unwrap();

        let link = link.borrow();
        assert_eq!(link.sent(), 3);
        assert_eq!(link.sent_ids(), [0, 1, 2]);
        // Three 1000-byte packets at 8 kbit/s, the last end-of-transmission
        // wake-up finds the queue empty.
        assert_eq!(sim.now(), 3.0);
        assert!(queue.borrow().is_empty());
    }

    #[test]
    fn busy_link_ignores_notifications() {
        let mut sim = Simulation::new();
        let queue = Rc::new(RefCell::new(FifoQueue::new()));
        queue.borrow_mut().push(Pdu::new(1, 1000, 0.0));
        queue.borrow_mut().push(Pdu::new(2, 1000, 0.0));
        let link = SimplexLink::new_shared(8_000.0, queue.clone()).unwrap();

        link.borrow_mut().notify_pdu_available(&mut sim);
        link.borrow_mut().notify_pdu_available(&mut sim);
        assert_eq!(link.borrow().sent(), 1);
    }

    #[test]
    fn arrival_at_end_of_transmission_waits_for_the_link() {
        let mut sim = Simulation::new();
        let queue = Rc::new(RefCell::new(FifoQueue::new()));
        queue.borrow_mut().push(Pdu::new(0, 1000, 0.0));
        queue.borrow_mut().push(Pdu::new(1, 1000, 0.0));
        let link = SimplexLink::new_shared(8_000.0, queue.clone()).unwrap();
        link.borrow_mut().record_ids();

        // Inserted before the link's own end-of-transmission event at 1.0.
        {
            let queue = queue.clone();
            let link = link.clone();
            sim.schedule_at(1.0, move |sim| {
                queue.borrow_mut().push(Pdu::new(2, 1000, 1.0));
                link.borrow_mut().notify_pdu_available(sim);
                Ok(())
            });
        }
        link.borrow_mut().notify_pdu_available(&mut sim);

        sim.run_until(1.5).unwrap();
        assert_eq!(link.borrow().sent(), 2);
        assert_eq!(link.borrow().busy_until(), 2.0);

        sim.run_until_exhausted().unwrap();
        let link = link.borrow();
        assert_eq!(link.sent_ids(), [0, 1, 2]);
        assert_eq!(sim.now(), 3.0);
        assert_eq!(link.utilisation(sim.now()), 1.0);
    }

    #[test]
    fn utilisation_counts_only_elapsed_airtime() {
        let mut sim = Simulation::new();
        let queue = Rc::new(RefCell::new(FifoQueue::new()));
        queue.borrow_mut().push(Pdu::new(0, 1000, 0.0));
        let link = SimplexLink::new_shared(8_000.0, queue).unwrap();
        link.borrow_mut().notify_pdu_available(&mut sim);

        sim.run_until(0.5).unwrap();
        assert_eq!(link.borrow().utilisation(0.5), 1.0);
        sim.run_until(4.0).unwrap();
        assert_eq!(link.borrow().utilisation(4.0), 0.25);
    }

    #[test]
    fn rejects_non_positive_rate() {
        let queue = Rc::new(RefCell::new(FifoQueue::new()));
        assert!(SimplexLink::new_shared(0.0, queue).is_err());
    }
}
