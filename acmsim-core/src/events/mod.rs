//! ## acmsim-core::events
//! **Events and the date-ordered event file**
//!
//! An [`Event`] is a boxed callback plus a date (and an optional period). The
//! [`EventFile`] keeps pending events sorted by date, FIFO among equal dates.

pub mod event;
pub mod file;

pub use event::{Event, EventAction};
pub use file::EventFile;
