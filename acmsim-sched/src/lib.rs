//! # acmsim-sched
//!
//! Link schedulers.
//!
//! ### Key Submodules:
//! - `acm`: the generic ACM framework and the [`ScheduleStrategy`] trait
//! - `utility`, `knapsack`, `batch`: frame filling strategies
//! - `rr`, `drr`: packet-by-packet schedulers feeding a simplex link
//! - `qos`: utility functions and rate estimates
//! - `plan`: fill plans and multi-frame sequences

pub mod acm;
pub mod batch;
pub mod drr;
pub mod error;
pub mod grid;
pub mod knapsack;
pub mod plan;
pub mod qos;
pub mod rr;
pub mod utility;

pub use acm::{
    AcmConfig, AcmCore, AcmProbes, AcmScheduler, AcmState, ScheduleContext, ScheduleStrategy,
};
pub use batch::{Batch, BatchConfig, WeightMode};
pub use drr::DeficitRoundRobin;
pub use error::ScheduleError;
pub use knapsack::{Knapsack, KnapsackMode};
pub use plan::{FillPlan, Sequence};
pub use qos::{QosDescriptor, UtilityKind};
pub use rr::RoundRobin;
pub use utility::UtilityGreedy;
