//! # acmsim-core
//!
//! Foundation layer for the link simulator: the discrete-event kernel and the
//! packet/queue/probe abstractions every other crate builds on.
//!
//! ### Key Submodules:
//! - `events`: one-shot and periodic events, date-ordered event file
//! - `sim`: the simulation clock driving events and the reset protocol
//! - `time`: simulated time helpers
//! - `pdu`, `queue`: protocol data units and FIFO storage
//! - `probe`: fire-and-forget statistics sinks
//!
//! Everything here is single-threaded: components share state through
//! `Rc<RefCell<_>>` and are handed `&mut Simulation` while an event fires.

pub mod error;
pub mod events;
pub mod pdu;
pub mod probe;
pub mod queue;
pub mod sim;
pub mod time;

pub mod prelude {
    pub use crate::error::*;
    pub use crate::events::*;
    pub use crate::pdu::*;
    pub use crate::probe::*;
    pub use crate::queue::*;
    pub use crate::sim::*;
    pub use crate::time::*;
}

pub use error::SimulationError;
pub use sim::Simulation;
pub use time::SimTime;
