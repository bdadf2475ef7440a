//! Dependency-driven concurrent execution of sub-task DAGs.

pub mod executor;
pub mod pool;
#[cfg(test)]
mod tests;

pub use executor::{diamond_subtasks, DagError, DagExecutor, DagReport, SubTask, SubTaskTiming};
pub use pool::{DagJob, JobOutcome, PoolError, ProcessorPool};
