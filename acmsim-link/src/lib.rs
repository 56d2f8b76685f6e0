//! # acmsim-link
//!
//! Link models consumed by the schedulers.
//!
//! ### Key Submodules:
//! - `modcod`: MODCOD profiles and the ordered, immutable MODCOD table
//! - `frame`: baseband frames packed by ACM schedulers
//! - `dvb_s2`: the ACM link contract and a DVB-S2 forward link
//! - `simplex`: a constant-rate link pulling single PDUs from a source

pub mod dvb_s2;
pub mod error;
pub mod frame;
pub mod modcod;
pub mod simplex;

pub use dvb_s2::{AcmLink, DvbS2Link, LinkStats};
pub use error::LinkError;
pub use frame::{BbFrame, FrameRecord};
pub use modcod::{dvb_s2_modcod, FrameSize, Modcod, ModcodId, ModcodTable};
pub use simplex::SimplexLink;
