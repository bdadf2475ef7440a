use std::sync::Mutex;
use std::thread;

use tracing::{error, info, warn};

use crate::scheduler::{QueueError, WorkQueue};

use super::executor::{DagError, DagExecutor, DagReport, SubTask};

/// A whole DAG submitted to the pool as one job.
#[derive(Debug)]
pub struct DagJob {
    pub id: usize,
    pub subtasks: Vec<SubTask>,
}

impl DagJob {
    pub fn new(id: usize, subtasks: Vec<SubTask>) -> Self {
        Self { id, subtasks }
    }
}

/// How one job ended and which processor ran it.
#[derive(Debug)]
pub struct JobOutcome {
    pub job_id: usize,
    pub processor: usize,
    pub result: Result<DagReport, DagError>,
}

#[derive(Debug, thiserror::Error)]
pub enum PoolError {
    #[error("processor pool needs at least one processor")]
    NoProcessors,
    #[error("failed to spawn processor thread: {0}")]
    Spawn(#[from] std::io::Error),
    #[error(transparent)]
    Queue(#[from] QueueError),
    #[error("processor {0} panicked")]
    ProcessorPanicked(usize),
}

/// Fixed set of processor threads sharing one blocking job queue.
///
/// Every processor pops a [`DagJob`], runs it through a [`DagExecutor`] and
/// goes back for more until the queue is drained.
#[derive(Debug, Clone)]
pub struct ProcessorPool {
    processors: usize,
}

impl ProcessorPool {
    pub fn new(processors: usize) -> Self {
        Self { processors }
    }

    pub fn processors(&self) -> usize {
        self.processors
    }

    /// Run every job and return the outcomes ordered by job id.
    ///
    /// A failing DAG is reported in its outcome; it does not stop the other
    /// jobs.
    pub fn run(&self, jobs: Vec<DagJob>) -> Result<Vec<JobOutcome>, PoolError> {
        if self.processors == 0 {
            return Err(PoolError::NoProcessors);
        }
        info!(processors = self.processors, jobs = jobs.len(), "Processor pool starting");

        let queue = WorkQueue::with_items(jobs);
        let outcomes: Mutex<Vec<JobOutcome>> = Mutex::new(Vec::new());

        thread::scope(|scope| -> Result<(), PoolError> {
            let mut handles = Vec::with_capacity(self.processors);
            for processor in 0..self.processors {
                let queue = &queue;
                let outcomes = &outcomes;
                let handle = thread::Builder::new()
                    .name(format!("dag-processor-{}", processor))
                    .spawn_scoped(scope, move || processor_loop(processor, queue, outcomes))?;
                handles.push((processor, handle));
            }

            let mut first_error = None;
            for (processor, handle) in handles {
                let result = match handle.join() {
                    Ok(r) => r.map_err(PoolError::from),
                    Err(_) => Err(PoolError::ProcessorPanicked(processor)),
                };
                if let Err(e) = result {
                    error!(processor, "Processor failed: {}", e);
                    // Wake anyone still blocked on the queue.
                    if let Err(close_err) = queue.close() {
                        warn!(processor, "Failed to close job queue: {}", close_err);
                    }
                    first_error.get_or_insert(e);
                }
            }
            first_error.map_or(Ok(()), Err)
        })?;

        let mut outcomes = outcomes.into_inner().unwrap_or_else(|poisoned| poisoned.into_inner());
        outcomes.sort_by_key(|o| o.job_id);

        let failed = outcomes.iter().filter(|o| o.result.is_err()).count();
        info!(jobs = outcomes.len(), failed, "Processor pool finished");
        Ok(outcomes)
    }
}

fn processor_loop(
    processor: usize,
    queue: &WorkQueue<DagJob>,
    outcomes: &Mutex<Vec<JobOutcome>>,
) -> Result<(), QueueError> {
    while let Some(job) = queue.pop()? {
        info!(processor, job = job.id, "Processor picked up DAG job");
        let executor = DagExecutor::named(format!("job-{}", job.id));
        let result = executor.execute(job.subtasks);
        if let Err(e) = &result {
            error!(processor, job = job.id, "DAG job failed: {}", e);
        }
        let outcome = JobOutcome {
            job_id: job.id,
            processor,
            result,
        };
        match outcomes.lock() {
            Ok(mut o) => o.push(outcome),
            Err(poisoned) => {
                warn!(processor, job = job.id, "Outcome list lock poisoned: {}", poisoned);
                poisoned.into_inner().push(outcome);
            }
        }
        queue.complete_one()?;
    }
    Ok(())
}
