pub mod dag;
pub mod scheduler;

pub use dag::{
    diamond_subtasks, DagError, DagExecutor, DagJob, DagReport, JobOutcome, PoolError,
    ProcessorPool, SubTask,
};
pub use scheduler::{
    Clock, Scheduler, SchedulerError, SchedulerMetrics, SchedulerReport, SimThread, SliceRecord,
    UnitCompletion, VirtualClock, WallClock, WorkQueue,
};
