//! Scheduler runner -- processor pool and slice execution.
//!
//! - `core`: Scheduler struct, constructor and shutdown signalling
//! - `execution`: the run itself and the per-processor slice loop

mod core;
mod execution;

pub use self::core::Scheduler;
