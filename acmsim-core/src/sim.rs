//! ## acmsim-core::sim
//! **Simulation clock and event loop**
//!
//! [`Simulation`] owns the event file, the current date and the list of reset
//! callbacks. It is created once per simulated system and handed by `&mut`
//! reference to every callback, so components never need a global.
//!
//! Lifecycle: `new → insert/run → reset → run again → …`.

use std::fmt;

use tracing::{debug, instrument, trace, warn};

use crate::error::SimulationError;
use crate::events::{Event, EventFile};
use crate::time::SimTime;

/// Callback invoked by [`Simulation::reset`]. It may insert new events.
pub type ResetHook = Box<dyn FnMut(&mut Simulation)>;

/// Snapshot of the simulation counters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SimulationStatus {
    pub now: SimTime,
    pub pending: usize,
    /// Events fired since the last reset.
    pub fired: u64,
    /// Events inserted since the last reset.
    pub inserted: u64,
    /// Events fired since creation, across resets.
    pub total_fired: u64,
    pub resets: u64,
}

impl fmt::Display for SimulationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "t={:.6}s pending={} fired={} inserted={} (total fired {}, {} resets)",
            self.now, self.pending, self.fired, self.inserted, self.total_fired, self.resets
        )
    }
}

/// Discrete-event simulation context.
pub struct Simulation {
    now: SimTime,
    events: EventFile,
    reset_hooks: Vec<ResetHook>,
    fired: u64,
    inserted: u64,
    total_fired: u64,
    resets: u64,
    trace: Option<blake3::Hasher>,
}

impl Default for Simulation {
    fn default() -> Self {
        Self::new()
    }
}

impl Simulation {
    pub fn new() -> Self {
        Self {
            now: 0.0,
            events: EventFile::new(),
            reset_hooks: Vec::new(),
            fired: 0,
            inserted: 0,
            total_fired: 0,
            resets: 0,
            trace: None,
        }
    }

    /// Creates a simulation that hashes every fired event (date and label).
    /// Two runs firing the same events at the same dates share a digest.
    pub fn with_trace() -> Self {
        Self {
            trace: Some(blake3::Hasher::new()),
            ..Self::new()
        }
    }

    /// Current simulated date.
    #[inline]
    pub fn now(&self) -> SimTime {
        self.now
    }

    /// Number of events waiting to fire.
    #[inline]
    pub fn pending(&self) -> usize {
        self.events.len()
    }

    /// Inserts an event.
    ///
    /// # Panics
    ///
    /// Panics if the event date is before the current date. Scheduling into
    /// the past is a programming error and the run cannot continue.
    pub fn insert(&mut self, event: Event) {
        assert!(
            event.date() >= self.now,
            "event '{}' inserted at {} but simulation time is already {}",
            event.label(),
            event.date(),
            self.now
        );
        trace!(label = event.label(), date = event.date(), "event inserted");
        self.inserted += 1;
        self.events.insert(event);
    }

    /// Schedules `run` at an absolute date.
    pub fn schedule_at<F>(&mut self, date: SimTime, run: F)
    where
        F: FnMut(&mut Simulation) -> Result<(), SimulationError> + 'static,
    {
        self.insert(Event::new(date, run));
    }

    /// Schedules `run` after `delay` seconds.
    pub fn schedule_in<F>(&mut self, delay: SimTime, run: F)
    where
        F: FnMut(&mut Simulation) -> Result<(), SimulationError> + 'static,
    {
        let date = self.now + delay;
        self.schedule_at(date, run);
    }

    /// Registers a callback run on every [`reset`](Self::reset), after the
    /// event file has been purged. Callbacks run in registration order.
    pub fn on_reset<F>(&mut self, hook: F)
    where
        F: FnMut(&mut Simulation) + 'static,
    {
        self.reset_hooks.push(Box::new(hook));
    }

    /// Fires every event dated at or before `until`, then moves the clock to
    /// `until`.
    ///
    /// Stops at the first callback error; the clock then stays at the date of
    /// the failing event.
    #[instrument(level = "debug", skip(self), fields(now = self.now))]
    pub fn run_until(&mut self, until: SimTime) -> Result<(), SimulationError> {
        while let Some(date) = self.events.peek_date() {
            if date > until {
                break;
            }
            self.fire_next()?;
        }
        if self.now < until {
            self.now = until;
        }
        debug!(status = %self.status(), "run_until complete");
        Ok(())
    }

    /// Fires events until none are left.
    #[instrument(level = "debug", skip(self), fields(now = self.now))]
    pub fn run_until_exhausted(&mut self) -> Result<(), SimulationError> {
        while !self.events.is_empty() {
            self.fire_next()?;
        }
        debug!(status = %self.status(), "event file exhausted");
        Ok(())
    }

    fn fire_next(&mut self) -> Result<(), SimulationError> {
        let Some(mut event) = self.events.extract() else {
            return Ok(());
        };
        self.now = event.date();
        self.fired += 1;
        self.total_fired += 1;
        if let Some(trace) = self.trace.as_mut() {
            trace.update(&event.date().to_bits().to_le_bytes());
            trace.update(event.label().as_bytes());
        }
        trace!(label = event.label(), date = self.now, "event fired");

        event.fire(self)?;

        if event.rearm() {
            self.insert(event);
        }
        Ok(())
    }

    /// Returns the simulation to its freshly created state.
    ///
    /// Pending events are dropped without firing, the clock goes back to 0,
    /// per-run counters and the trace are cleared, then every reset callback
    /// runs. Only `total_fired` and `resets` survive.
    pub fn reset(&mut self) {
        let dropped = self.events.purge();
        if dropped > 0 {
            warn!(dropped, now = self.now, "reset purged pending events");
        }
        self.now = 0.0;
        self.fired = 0;
        self.inserted = 0;
        self.resets += 1;
        if self.trace.is_some() {
            self.trace = Some(blake3::Hasher::new());
        }

        let mut hooks = std::mem::take(&mut self.reset_hooks);
        for hook in hooks.iter_mut() {
            hook(self);
        }
        // Hooks registered while resetting go after the existing ones.
        hooks.append(&mut self.reset_hooks);
        self.reset_hooks = hooks;
        debug!(hooks = self.reset_hooks.len(), "simulation reset");
    }

    pub fn status(&self) -> SimulationStatus {
        SimulationStatus {
            now: self.now,
            pending: self.events.len(),
            fired: self.fired,
            inserted: self.inserted,
            total_fired: self.total_fired,
            resets: self.resets,
        }
    }

    /// Hex digest of the events fired since the last reset, if tracing is on.
    pub fn trace_hash(&self) -> Option<String> {
        self.trace
            .as_ref()
            .map(|hasher| hex::encode(hasher.finalize().as_bytes()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::cell::RefCell;
    use std::rc::Rc;
    use tracing_test::traced_test;

    type Log = Rc<RefCell<Vec<(SimTime, u32)>>>;

    fn recording(log: &Log, date: SimTime, tag: u32) -> Event {
        let log = Rc::clone(log);
        Event::new(date, move |sim| {
            log.borrow_mut().push((sim.now(), tag));
            Ok(())
        })
    }

    #[test]
    fn fires_in_date_order_and_fifo_on_ties() {
        let mut sim = Simulation::new();
        let log = Log::default();
        sim.insert(recording(&log, 2.0, 1));
        sim.insert(recording(&log, 1.0, 2));
        sim.insert(recording(&log, 2.0, 3));
        sim.insert(recording(&log, 0.5, 4));

        sim.run_until_exhausted().unwrap();
        assert_eq!(*log.borrow(), [(0.5, 4), (1.0, 2), (2.0, 1), (2.0, 3)]);
        assert_eq!(sim.now(), 2.0);
    }

    #[test]
    fn run_until_stops_at_bound() {
        let mut sim = Simulation::new();
        let log = Log::default();
        sim.insert(recording(&log, 1.0, 1));
        sim.insert(recording(&log, 3.0, 2));

        sim.run_until(2.0).unwrap();
        assert_eq!(*log.borrow(), [(1.0, 1)]);
        assert_eq!(sim.now(), 2.0);
        assert_eq!(sim.pending(), 1);

        sim.run_until(3.0).unwrap();
        assert_eq!(log.borrow().len(), 2);
    }

    #[test]
    fn periodic_event_reinserts_itself() {
        let mut sim = Simulation::new();
        let ticks = Rc::new(RefCell::new(Vec::new()));
        let seen = Rc::clone(&ticks);
        sim.insert(Event::periodic(0.0, 0.25, move |sim| {
            seen.borrow_mut().push(sim.now());
            Ok(())
        }));

        sim.run_until(1.0).unwrap();
        assert_eq!(*ticks.borrow(), [0.0, 0.25, 0.5, 0.75, 1.0]);
        // The next occurrence is still pending.
        assert_eq!(sim.pending(), 1);
    }

    #[test]
    fn callbacks_can_schedule_more_events() {
        let mut sim = Simulation::new();
        let count = Rc::new(RefCell::new(0u32));
        let c = Rc::clone(&count);
        sim.schedule_at(1.0, move |sim| {
            *c.borrow_mut() += 1;
            let c = Rc::clone(&c);
            sim.schedule_in(0.5, move |_| {
                *c.borrow_mut() += 10;
                Ok(())
            });
            Ok(())
        });
        sim.run_until_exhausted().unwrap();
        assert_eq!(*count.borrow(), 11);
        assert_eq!(sim.now(), 1.5);
    }

    #[test]
    fn event_with_data_mutates_its_payload() {
        let mut sim = Simulation::new();
        let out = Rc::new(RefCell::new(0u64));
        let o = Rc::clone(&out);
        sim.insert(Event::with_data(41u64, 1.0, move |_, data| {
            *data += 1;
            *o.borrow_mut() = *data;
            Ok(())
        }));
        sim.run_until_exhausted().unwrap();
        assert_eq!(*out.borrow(), 42);
    }

    #[test]
    #[should_panic(expected = "inserted at")]
    fn inserting_in_the_past_panics() {
        let mut sim = Simulation::new();
        sim.run_until(5.0).unwrap();
        sim.insert(Event::new(4.0, |_| Ok(())));
    }

    #[test]
    fn creating_a_past_event_is_legal_until_inserted() {
        let mut sim = Simulation::new();
        sim.run_until(5.0).unwrap();
        let event = Event::new(1.0, |_| Ok(()));
        assert_eq!(event.date(), 1.0);
        assert_eq!(sim.pending(), 0);
    }

    #[test]
    fn callback_error_stops_the_run() {
        let mut sim = Simulation::new();
        let log = Log::default();
        sim.schedule_at(1.0, |_| Err(SimulationError::Processing("boom".into())));
        sim.insert(recording(&log, 2.0, 1));

        let err = sim.run_until_exhausted().unwrap_err();
        assert!(matches!(err, SimulationError::Processing(_)));
        assert!(log.borrow().is_empty());
        assert_eq!(sim.now(), 1.0);
    }

    #[traced_test]
    #[test]
    fn reset_purges_and_runs_hooks_in_order() {
        let mut sim = Simulation::new();
        let order = Rc::new(RefCell::new(Vec::new()));
        for tag in ["queues", "probes", "scheduler"] {
            let order = Rc::clone(&order);
            sim.on_reset(move |_| order.borrow_mut().push(tag));
        }
        sim.schedule_at(1.0, |_| Ok(()));
        sim.schedule_at(10.0, |_| Ok(()));
        sim.run_until(2.0).unwrap();

        sim.reset();
        assert_eq!(sim.pending(), 0);
        assert_eq!(sim.now(), 0.0);
        assert_eq!(*order.borrow(), ["queues", "probes", "scheduler"]);
        assert!(logs_contain("reset purged pending events"));

        let status = sim.status();
        assert_eq!(status.fired, 0);
        assert_eq!(status.total_fired, 1);
        assert_eq!(status.resets, 1);
    }

    #[test]
    fn reset_hooks_may_insert_events() {
        let mut sim = Simulation::new();
        let restarted = Rc::new(RefCell::new(false));
        let r = Rc::clone(&restarted);
        sim.on_reset(move |sim| {
            let r = Rc::clone(&r);
            sim.schedule_at(0.1, move |_| {
                *r.borrow_mut() = true;
                Ok(())
            });
        });
        sim.reset();
        assert_eq!(sim.pending(), 1);
        sim.run_until_exhausted().unwrap();
        assert!(*restarted.borrow());
    }

    #[test]
    fn reset_reproduces_the_same_trace() {
        fn populate(sim: &mut Simulation) {
            sim.insert(Event::periodic(0.0, 0.3, |_| Ok(())).labeled("tick"));
            sim.insert(Event::new(0.7, |_| Ok(())).labeled("once"));
        }

        let mut sim = Simulation::with_trace();
        sim.on_reset(populate);
        populate(&mut sim);
        sim.run_until(2.0).unwrap();
        let first = sim.trace_hash().unwrap();
        let first_fired = sim.status().fired;

        sim.reset();
        sim.run_until(2.0).unwrap();
        assert_eq!(sim.trace_hash().unwrap(), first);
        assert_eq!(sim.status().fired, first_fired);
    }

    proptest! {
        #[test]
        fn dates_fire_in_non_decreasing_order(dates in prop::collection::vec(0.0f64..1_000.0, 1..200)) {
            let mut sim = Simulation::new();
            let log = Log::default();
            for (i, date) in dates.iter().enumerate() {
                sim.insert(recording(&log, *date, i as u32));
            }
            sim.run_until_exhausted().unwrap();

            let log = log.borrow();
            prop_assert_eq!(log.len(), dates.len());
            for pair in log.windows(2) {
                prop_assert!(pair[0].0 <= pair[1].0);
                if pair[0].0 == pair[1].0 {
                    prop_assert!(pair[0].1 < pair[1].1);
                }
            }
        }
    }
}
