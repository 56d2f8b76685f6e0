//! ## acmsim-core::probe
//! **Fire-and-forget statistics sinks**
//!
//! Components hold an `Option<ProbeHandle>` and call `sample` on it without
//! caring whether anything is attached: `Option<P>` is itself a probe that
//! ignores samples when empty.

use std::rc::Rc;

/// Observer receiving scalar samples.
pub trait Probe {
    fn sample(&self, value: f64);

    /// Records an occurrence with no associated value.
    fn sample_event(&self) {
        self.sample(1.0);
    }

    /// Forgets everything sampled so far.
    fn reset(&self) {}
}

/// Shared handle to a probe.
pub type ProbeHandle = Rc<dyn Probe>;

impl<P: Probe + ?Sized> Probe for Rc<P> {
    fn sample(&self, value: f64) {
        (**self).sample(value)
    }

    fn sample_event(&self) {
        (**self).sample_event()
    }

    fn reset(&self) {
        (**self).reset()
    }
}

impl<P: Probe> Probe for Option<P> {
    fn sample(&self, value: f64) {
        if let Some(probe) = self {
            probe.sample(value);
        }
    }

    fn sample_event(&self) {
        if let Some(probe) = self {
            probe.sample_event();
        }
    }

    fn reset(&self) {
        if let Some(probe) = self {
            probe.reset();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[derive(Default)]
    struct Sum(Cell<f64>);

    impl Probe for Sum {
        fn sample(&self, value: f64) {
            self.0.set(self.0.get() + value);
        }

        fn reset(&self) {
            self.0.set(0.0);
        }
    }

    #[test]
    fn none_probe_is_a_no_op() {
        let probe: Option<ProbeHandle> = None;
        probe.sample(3.0);
        probe.sample_event();
        probe.reset();
    }

    #[test]
    fn shared_probe_sees_every_sample() {
        let sum = Rc::new(Sum::default());
        let handle: Option<ProbeHandle> = Some(sum.clone());
        handle.sample(2.0);
        handle.sample_event();
        assert_eq!(sum.0.get(), 3.0);
        handle.reset();
        assert_eq!(sum.0.get(), 0.0);
    }
}
