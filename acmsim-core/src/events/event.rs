//! One-shot and periodic events.

use std::fmt;

use crate::error::SimulationError;
use crate::sim::Simulation;
use crate::time::SimTime;

/// Callback run when an event fires. Data the callback needs is captured by
/// the closure itself.
pub type EventAction = Box<dyn FnMut(&mut Simulation) -> Result<(), SimulationError>>;

/// A unit of simulated work: a callback and the date it must run at.
///
/// Creating an event with a date in the past is legal; inserting it into a
/// [`Simulation`] whose clock already passed that date is not.
pub struct Event {
    date: SimTime,
    period: Option<SimTime>,
    label: &'static str,
    run: EventAction,
}

impl Event {
    /// Creates a one-shot event.
    pub fn new<F>(date: SimTime, run: F) -> Self
    where
        F: FnMut(&mut Simulation) -> Result<(), SimulationError> + 'static,
    {
        Self {
            date,
            period: None,
            label: "event",
            run: Box::new(run),
        }
    }

    /// Creates a one-shot event owning an opaque `data` value handed to the
    /// callback on every firing.
    pub fn with_data<T, F>(data: T, date: SimTime, mut run: F) -> Self
    where
        T: 'static,
        F: FnMut(&mut Simulation, &mut T) -> Result<(), SimulationError> + 'static,
    {
        let mut data = data;
        Self::new(date, move |sim| run(sim, &mut data))
    }

    /// Creates an event that fires at `date`, then every `period` seconds.
    ///
    /// # Panics
    ///
    /// Panics if `period` is not strictly positive: such an event would fire
    /// forever without time advancing.
    pub fn periodic<F>(date: SimTime, period: SimTime, run: F) -> Self
    where
        F: FnMut(&mut Simulation) -> Result<(), SimulationError> + 'static,
    {
        assert!(period > 0.0, "periodic event needs a positive period, got {period}");
        Self {
            period: Some(period),
            ..Self::new(date, run)
        }
    }

    /// Attaches a static label, used in logs and in the trace hash.
    pub fn labeled(mut self, label: &'static str) -> Self {
        self.label = label;
        self
    }

    #[inline]
    pub fn date(&self) -> SimTime {
        self.date
    }

    #[inline]
    pub fn period(&self) -> Option<SimTime> {
        self.period
    }

    #[inline]
    pub fn is_periodic(&self) -> bool {
        self.period.is_some()
    }

    #[inline]
    pub fn label(&self) -> &'static str {
        self.label
    }

    pub(crate) fn fire(&mut self, sim: &mut Simulation) -> Result<(), SimulationError> {
        (self.run)(sim)
    }

    /// Moves a periodic event to its next date. Returns `false` for one-shot
    /// events, which are dropped after firing.
    pub(crate) fn rearm(&mut self) -> bool {
        match self.period {
            Some(period) => {
                self.date += period;
                true
            }
            None => false,
        }
    }
}

impl fmt::Debug for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Event")
            .field("label", &self.label)
            .field("date", &self.date)
            .field("period", &self.period)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn periodic_event_rearms() {
        let mut event = Event::periodic(1.0, 0.5, |_| Ok(()));
        assert!(event.is_periodic());
        assert!(event.rearm());
        assert_eq!(event.date(), 1.5);
        assert!(event.rearm());
        assert_eq!(event.date(), 2.0);
    }

    #[test]
    fn one_shot_event_does_not_rearm() {
        let mut event = Event::new(3.0, |_| Ok(())).labeled("once");
        assert_eq!(event.label(), "once");
        assert!(!event.rearm());
        assert_eq!(event.date(), 3.0);
    }

    #[test]
    #[should_panic]
    fn zero_period_is_rejected() {
        let _ = Event::periodic(0.0, 0.0, |_| Ok(()));
    }
}
