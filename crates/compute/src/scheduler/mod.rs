//! Multiprocessor time-sliced scheduler.
//!
//! Schedule units become [`SimThread`]s in one shared [`WorkQueue`]. A fixed
//! set of processors pops from it, charges slices of at most one quantum and
//! records every slice, completion and busy millisecond. Under
//! [`SchedulingPolicy::RoundRobin`](threadsim_core::SchedulingPolicy) a unit
//! goes back to the tail after each slice; otherwise a processor keeps it
//! until it finishes.

pub mod clock;
pub mod error;
pub mod metrics;
pub mod queue;
pub mod runner;
pub mod types;

pub use clock::{clock_for, Clock, VirtualClock, WallClock};
pub use error::SchedulerError;
pub use metrics::SchedulerMetrics;
pub use queue::{QueueError, WorkQueue};
pub use runner::Scheduler;
pub use types::{SchedulerReport, SimThread, SliceRecord, UnitCompletion};
